use serde::Serialize;

use crate::predictions::{Prediction, PredictionStore};

/// Raw bytes of a user-supplied base image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upload {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl Upload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: None,
        }
    }

    pub fn named(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: Some(file_name.into()),
        }
    }
}

/// The next edit the user wants to apply. Not part of the chain until a
/// submission with it succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingInput {
    pub upload: Option<Upload>,
    pub mask: Option<String>,
}

impl PendingInput {
    pub fn upload(upload: Upload) -> Self {
        Self {
            upload: Some(upload),
            mask: None,
        }
    }

    pub fn mask(mask: impl Into<String>) -> Self {
        Self {
            upload: None,
            mask: Some(mask.into()),
        }
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.upload.is_none()
            && self
                .mask
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub chain: PredictionStore,
    pub pending: Option<PendingInput>,
    pub error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty() && self.pending.is_none() && self.error.is_none()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            chain: self.chain.to_vec(),
            pending: self.pending.clone(),
            error: self.error.clone(),
        }
    }
}

/// Read-only snapshot handed to the rendering consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub chain: Vec<Prediction>,
    pub pending: Option<PendingInput>,
    pub error: Option<String>,
}

impl SessionView {
    pub fn latest_output(&self) -> Option<&str> {
        self.chain
            .iter()
            .rev()
            .find_map(|prediction| prediction.output.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingInput, Session, Upload};

    #[test]
    fn pending_input_emptiness() {
        assert!(PendingInput::default().is_empty());
        assert!(PendingInput::mask("   ").is_empty());
        assert!(!PendingInput::mask("data:image/png;base64,AAAA").is_empty());
        assert!(!PendingInput::upload(Upload::new(vec![1])).is_empty());
    }

    #[test]
    fn new_session_is_empty() {
        let session = Session::new();
        assert!(session.is_empty());
        let view = session.view();
        assert!(view.chain.is_empty());
        assert_eq!(view.latest_output(), None);
    }
}
