use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use strata_contracts::events::{BaseSource, EventWriter, SessionEvent};
use strata_contracts::predictions::{
    Prediction, PredictionInput, PredictionStatus, PredictionStore,
};
use strata_contracts::resources::{Blob, BlobRegistry, ResourceHandle, ResourceJanitor};
use strata_contracts::session::{PendingInput, Session, SessionView};

use crate::data_uri;
use crate::error::{ChainError, GatewayError};
use crate::gateway::InferenceGateway;
use crate::poll::{self, PollPolicy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    pub poll: PollPolicy,
    /// Move data-URI outputs into the local blob registry and record the
    /// `blob:` handle in the chain instead of the inline payload.
    pub localize_outputs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            localize_outputs: true,
        }
    }
}

#[derive(Debug, Clone)]
struct SubmissionPlan {
    base_ref: String,
    send_ref: String,
    source: BaseSource,
    mask: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Session,
    in_flight: bool,
}

/// Owns the session and is the only thing that mutates it.
///
/// Submissions are single-flight: while one is waiting on the gateway, another
/// `submit_edit` is rejected and `reset` blocks until it settles.
pub struct ChainOrchestrator {
    gateway: Arc<dyn InferenceGateway>,
    config: OrchestratorConfig,
    state: Mutex<SessionState>,
    settled: Condvar,
    blobs: BlobRegistry,
    janitor: ResourceJanitor,
    events: Option<EventWriter>,
}

impl ChainOrchestrator {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self::with_config(gateway, OrchestratorConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn InferenceGateway>, config: OrchestratorConfig) -> Self {
        let blobs = BlobRegistry::new();
        Self {
            gateway,
            config,
            state: Mutex::new(SessionState::default()),
            settled: Condvar::new(),
            janitor: ResourceJanitor::new(blobs.clone()),
            blobs,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self.emit(SessionEvent::SessionStarted {
            localize_outputs: self.config.localize_outputs,
            poll_interval_s: self.config.poll.interval().as_secs_f64(),
            poll_timeout_s: self.config.poll.timeout().as_secs_f64(),
        });
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    pub fn session(&self) -> SessionView {
        self.lock_state().session.view()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_state().in_flight
    }

    pub fn latest_output(&self) -> Option<String> {
        self.lock_state()
            .session
            .chain
            .latest_output()
            .map(str::to_string)
    }

    /// Stages the next edit without submitting it.
    pub fn set_pending(&self, pending: PendingInput) -> Result<(), ChainError> {
        let mut state = self.lock_state();
        if state.in_flight {
            return Err(ChainError::SubmissionInProgress);
        }
        state.session.pending = if pending.is_empty() {
            None
        } else {
            Some(pending)
        };
        Ok(())
    }

    /// Resubmits the staged input, e.g. after a failed submission.
    pub fn submit_pending(&self) -> Result<SessionView, ChainError> {
        let pending = self.lock_state().session.pending.clone();
        match pending {
            Some(pending) => self.submit_edit(pending),
            None => Err(ChainError::input("nothing to submit: no pending input")),
        }
    }

    /// Sends one edit to the gateway and appends the result to the chain.
    ///
    /// Input and single-flight rejections leave the session untouched. Gateway
    /// and prediction failures are recorded as `Session.error`, keep the pending
    /// input for resubmission, and never add a chain entry.
    pub fn submit_edit(&self, pending: PendingInput) -> Result<SessionView, ChainError> {
        if pending.is_empty() {
            return Err(ChainError::input(
                "nothing to submit: upload an image or draw a mask",
            ));
        }

        let plan = {
            let mut state = self.lock_state();
            if state.in_flight {
                return Err(ChainError::SubmissionInProgress);
            }
            let plan = self.plan_submission(&pending, &state.session.chain)?;
            state.session.pending = Some(pending);
            state.in_flight = true;
            plan
        };
        let mut in_flight = InFlight {
            orchestrator: self,
            armed: true,
        };

        self.emit(SessionEvent::SubmissionStarted {
            base_source: plan.source,
            base_digest: reference_digest(&plan.base_ref),
            has_mask: plan.mask.is_some(),
        });

        let outcome = self
            .run_inference(&plan.send_ref)
            .map(|(id, output)| (id, self.localize(output)));

        let view = {
            let mut state = self.lock_state();
            match &outcome {
                Ok((id, output)) => {
                    state.session.chain.append(Prediction::succeeded(
                        id.clone(),
                        PredictionInput {
                            image: plan.base_ref.clone(),
                            mask: plan.mask.clone(),
                        },
                        output.clone(),
                    ));
                    state.session.pending = None;
                    state.session.error = None;
                }
                Err(err) => {
                    state.session.error = Some(err.session_message());
                }
            }
            state.in_flight = false;
            in_flight.armed = false;
            self.settled.notify_all();
            state.session.view()
        };

        match outcome {
            Ok((id, output)) => {
                self.emit(SessionEvent::PredictionAppended {
                    prediction_id: id,
                    chain_len: view.chain.len(),
                    output_local: ResourceHandle::new(output).is_local(),
                });
                Ok(view)
            }
            Err(err) => {
                self.emit(SessionEvent::SubmissionFailed {
                    kind: err.kind().to_string(),
                    detail: err.session_message(),
                    chain_len: view.chain.len(),
                });
                Err(err)
            }
        }
    }

    /// Clears chain, pending input and error after releasing every local
    /// output handle. Waits for an in-flight submission to settle first.
    /// Returns the number of handles released.
    pub fn reset(&self) -> usize {
        let mut state = self.lock_state();
        while state.in_flight {
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.session.is_empty() {
            return 0;
        }
        let chain_len = state.session.chain.len();
        let released = self.janitor.release(state.session.chain.output_handles());
        state.session.chain.clear();
        state.session.pending = None;
        state.session.error = None;
        drop(state);

        self.emit(SessionEvent::SessionReset {
            chain_len,
            released,
        });
        released
    }

    /// Bytes behind a chain output for rendering. Local handles resolve
    /// through the registry and data URIs are decoded; remote URLs yield
    /// `None` and are fetched by the consumer.
    pub fn resolve_output(&self, reference: &str) -> Option<Blob> {
        let handle = ResourceHandle::new(reference);
        if handle.is_local() {
            return self.blobs.resolve(&handle);
        }
        if data_uri::is_data_uri(reference) {
            return data_uri::decode(reference).ok().map(|decoded| Blob {
                bytes: decoded.bytes,
                mime_type: decoded.mime_type,
            });
        }
        None
    }

    /// Base image rule: an upload always wins; otherwise a mask edits the
    /// last output; otherwise there is nothing to edit.
    fn plan_submission(
        &self,
        pending: &PendingInput,
        chain: &PredictionStore,
    ) -> Result<SubmissionPlan, ChainError> {
        let (base_ref, source) = if let Some(upload) = &pending.upload {
            if upload.bytes.is_empty() {
                return Err(ChainError::input("uploaded image is empty"));
            }
            (data_uri::encode_sniffed(&upload.bytes), BaseSource::Upload)
        } else if let Some(last) = chain.latest_output() {
            (last.to_string(), BaseSource::LastOutput)
        } else {
            return Err(ChainError::input(
                "no base image available: upload an image before drawing a mask",
            ));
        };
        let send_ref = self.resolve_for_send(&base_ref)?;
        let mask = pending
            .mask
            .as_deref()
            .map(str::trim)
            .filter(|mask| !mask.is_empty())
            .map(str::to_string);
        Ok(SubmissionPlan {
            base_ref,
            send_ref,
            source,
            mask,
        })
    }

    fn resolve_for_send(&self, base_ref: &str) -> Result<String, ChainError> {
        let handle = ResourceHandle::new(base_ref);
        if !handle.is_local() {
            return Ok(base_ref.to_string());
        }
        self.blobs
            .resolve(&handle)
            .map(|blob| data_uri::encode(&blob.bytes, &blob.mime_type))
            .ok_or_else(|| {
                ChainError::input(format!("base image {handle} is no longer available"))
            })
    }

    fn run_inference(&self, send_ref: &str) -> Result<(String, String), ChainError> {
        let mut resource = self.gateway.detect(send_ref)?;
        let mut id = resource.id_or_local();
        if resource.status().is_pending() {
            let Some(service_id) = resource.id() else {
                return Err(GatewayError::Decode(
                    "pending prediction returned without an id".to_string(),
                )
                .into());
            };
            resource =
                poll::poll_until_settled(self.gateway.as_ref(), &service_id, self.config.poll)?;
            id = service_id;
        }
        if resource.status() != PredictionStatus::Succeeded {
            return Err(poll::failed(&id, &resource));
        }
        let output = resource.output_ref().ok_or_else(|| {
            ChainError::from(GatewayError::Decode(format!(
                "prediction {id} returned no output"
            )))
        })?;
        Ok((id, output))
    }

    fn localize(&self, output: String) -> String {
        if !self.config.localize_outputs || !data_uri::is_data_uri(&output) {
            return output;
        }
        match data_uri::decode(&output) {
            Ok(decoded) => self
                .blobs
                .allocate(decoded.bytes, decoded.mime_type)
                .into_string(),
            Err(_) => output,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.emit(event) {
            eprintln!("strata: failed to write session event: {err:#}");
        }
    }
}

/// Clears the in-flight flag if a submission unwinds before settling. The
/// pending input stays staged and the session records the abort.
struct InFlight<'a> {
    orchestrator: &'a ChainOrchestrator,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.orchestrator.lock_state();
        state.in_flight = false;
        state.session.error = Some(SUBMISSION_ABORTED.to_string());
        self.orchestrator.settled.notify_all();
    }
}

const SUBMISSION_ABORTED: &str = "submission aborted before the gateway answered";

fn reference_digest(reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
