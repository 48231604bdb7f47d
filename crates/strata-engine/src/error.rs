use thiserror::Error;

/// Failure of a single call to the inference service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The service answered with a non-200 status.
    #[error("inference service returned {status}: {detail}")]
    Inference { status: u16, detail: String },

    /// No HTTP status was obtained (connection refused, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// 200 with a body that is not a prediction resource.
    #[error("invalid prediction payload: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Text shown to the user. Service-provided details pass through verbatim.
    pub fn detail(&self) -> String {
        match self {
            Self::Inference { detail, .. } => detail.clone(),
            Self::Transport(_) | Self::Decode(_) => self.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("submission in progress")]
    SubmissionInProgress,

    #[error("prediction {id} failed: {detail}")]
    PredictionFailed { id: String, detail: String },

    #[error("prediction {id} did not settle within {seconds:.1}s")]
    PollTimeout { id: String, seconds: f64 },
}

impl ChainError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Value recorded as `Session.error`.
    pub fn session_message(&self) -> String {
        match self {
            Self::Gateway(err) => err.detail(),
            Self::PredictionFailed { detail, .. } => detail.clone(),
            _ => self.to_string(),
        }
    }

    /// Short label used in event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Gateway(GatewayError::Inference { .. }) => "inference",
            Self::Gateway(GatewayError::Transport(_)) => "transport",
            Self::Gateway(GatewayError::Decode(_)) => "decode",
            Self::SubmissionInProgress => "submission_in_progress",
            Self::PredictionFailed { .. } => "prediction_failed",
            Self::PollTimeout { .. } => "poll_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChainError, GatewayError};

    #[test]
    fn inference_detail_passes_through_verbatim() {
        let err = ChainError::from(GatewayError::Inference {
            status: 500,
            detail: "no person detected".to_string(),
        });
        assert_eq!(err.session_message(), "no person detected");
        assert_eq!(err.kind(), "inference");
    }

    #[test]
    fn transport_detail_is_synthesized_locally() {
        let err = ChainError::from(GatewayError::Transport("connection refused".to_string()));
        assert_eq!(err.session_message(), "transport error: connection refused");
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn poll_timeout_message_mentions_seconds() {
        let err = ChainError::PollTimeout {
            id: "p-1".to_string(),
            seconds: 2.0,
        };
        assert_eq!(
            err.session_message(),
            "prediction p-1 did not settle within 2.0s"
        );
    }
}
