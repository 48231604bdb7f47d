use std::thread;
use std::time::{Duration, Instant};

use strata_contracts::predictions::{PredictionResource, PredictionStatus};

use crate::error::ChainError;
use crate::gateway::InferenceGateway;

/// Caller-side polling policy for predictions that settle asynchronously.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(1.0, 120.0)
    }
}

impl PollPolicy {
    /// Seconds; interval is clamped to 0.05..=5, timeout to 1..=600.
    pub fn new(interval_s: f64, timeout_s: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(clamp_seconds(interval_s, 1.0, 0.05, 5.0)),
            timeout: Duration::from_secs_f64(clamp_seconds(timeout_s, 120.0, 1.0, 600.0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn clamp_seconds(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

/// Fetches `id` until it reaches a terminal status.
///
/// Returns the succeeded resource; failed and canceled predictions become
/// [`ChainError::PredictionFailed`].
pub fn poll_until_settled(
    gateway: &dyn InferenceGateway,
    id: &str,
    policy: PollPolicy,
) -> Result<PredictionResource, ChainError> {
    let started = Instant::now();
    loop {
        let resource = gateway.fetch_result(id)?;
        let status = resource.status();
        if status == PredictionStatus::Succeeded {
            return Ok(resource);
        }
        if status.is_terminal() {
            return Err(failed(id, &resource));
        }
        if started.elapsed() >= policy.timeout {
            return Err(ChainError::PollTimeout {
                id: id.to_string(),
                seconds: policy.timeout.as_secs_f64(),
            });
        }
        thread::sleep(policy.interval);
    }
}

pub(crate) fn failed(id: &str, resource: &PredictionResource) -> ChainError {
    let detail = resource
        .error_text()
        .unwrap_or_else(|| format!("prediction {}", resource.status().as_str()));
    ChainError::PredictionFailed {
        id: id.to_string(),
        detail,
    }
}
