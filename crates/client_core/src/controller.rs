//! Validate -> confirm -> generate state machine.

use std::{fmt, sync::Arc, time::Duration};

use gateway::{CallBudget, GatewayError};
use shared::{
    domain::{GeneratedArtifact, OrderInput},
    protocol::{OrderRequest, Warning},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    backend::OrderBackend,
    gate::{ConfirmationGate, PendingAction},
};

pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(180);

const TIMEOUT_NOTICE: &str = "Request timed out. The care plan generation is taking longer than expected. Please try again or check the backend logs.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    AwaitingConfirmation,
    Generating,
    Succeeded,
    Failed(SubmissionError),
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Validating => "validating",
            SubmissionState::AwaitingConfirmation => "awaiting_confirmation",
            SubmissionState::Generating => "generating",
            SubmissionState::Succeeded => "succeeded",
            SubmissionState::Failed(_) => "failed",
        }
    }

    /// True while a network call is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SubmissionState::Validating | SubmissionState::Generating
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Validate,
    Generate,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStage::Validate => f.write_str("validation"),
            SubmissionStage::Generate => f.write_str("generation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("network error during {stage}: {message}")]
    Network {
        stage: SubmissionStage,
        message: String,
    },
    #[error("care plan generation exceeded its {}s budget", .budget.as_secs())]
    Timeout { budget: Duration },
    #[error("care plan generation was cancelled")]
    Cancelled,
    #[error("backend error during {stage} (status {status}): {message}")]
    Backend {
        stage: SubmissionStage,
        status: u16,
        message: String,
    },
    #[error("order rejected by backend: {message}")]
    ValidationFailure {
        status: Option<u16>,
        message: String,
    },
}

impl SubmissionError {
    fn from_gateway(stage: SubmissionStage, err: GatewayError) -> Self {
        match err {
            GatewayError::Network { message, .. } => SubmissionError::Network { stage, message },
            GatewayError::InvalidUrl { url, message } => SubmissionError::Network {
                stage,
                message: format!("{url}: {message}"),
            },
            GatewayError::Timeout { budget, .. } => SubmissionError::Timeout { budget },
            GatewayError::Cancelled { .. } => SubmissionError::Cancelled,
            GatewayError::Backend { status: 400, message } if stage == SubmissionStage::Validate => {
                SubmissionError::ValidationFailure {
                    status: Some(400),
                    message,
                }
            }
            GatewayError::Backend { status, message } => SubmissionError::Backend {
                stage,
                status,
                message,
            },
            GatewayError::Decode { status, message } => SubmissionError::Backend {
                stage,
                status,
                message: format!("unexpected response body: {message}"),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SubmissionError::Backend { status, .. } => Some(*status),
            SubmissionError::ValidationFailure { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SubmissionError::Timeout { .. })
    }

    /// Text for the blocking notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Timeout { .. } => TIMEOUT_NOTICE.to_string(),
            SubmissionError::Cancelled => "Care plan generation was cancelled.".to_string(),
            SubmissionError::Network { message, .. } => {
                format!("Could not reach the care plan service ({message}). Please try again.")
            }
            SubmissionError::Backend {
                stage: SubmissionStage::Validate,
                status,
                message,
            } => format!("Failed to validate order (status {status}): {message}"),
            SubmissionError::Backend {
                stage: SubmissionStage::Generate,
                status,
                message,
            } => format!("Failed to generate care plan (status {status}): {message}"),
            SubmissionError::ValidationFailure { message, .. } => {
                format!("The order was rejected: {message}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubmissionEvent {
    StateChanged {
        submission_id: Uuid,
        state: SubmissionState,
    },
    WarningsRaised {
        submission_id: Uuid,
        warnings: Vec<Warning>,
    },
    ArtifactReady {
        submission_id: Uuid,
        artifact: GeneratedArtifact,
    },
    ErrorSurfaced {
        submission_id: Uuid,
        error: SubmissionError,
    },
}

/// Owns the submission state, the confirmation gate and the latest artifact.
///
/// Operations take `&mut self`; a second submission cannot start while one
/// is awaiting the backend. Observers use [`SubmissionController::subscribe_events`].
pub struct SubmissionController {
    backend: Arc<dyn OrderBackend>,
    generate_timeout: Duration,
    state: SubmissionState,
    gate: ConfirmationGate,
    artifact: Option<GeneratedArtifact>,
    last_error: Option<SubmissionError>,
    submission_id: Uuid,
    events: broadcast::Sender<SubmissionEvent>,
}

impl SubmissionController {
    pub fn new(backend: Arc<dyn OrderBackend>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            backend,
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            state: SubmissionState::Idle,
            gate: ConfirmationGate::new(),
            artifact: None,
            last_error: None,
            submission_id: Uuid::nil(),
            events,
        }
    }

    pub fn with_generate_timeout(mut self, generate_timeout: Duration) -> Self {
        self.generate_timeout = generate_timeout;
        self
    }

    pub fn generate_timeout(&self) -> Duration {
        self.generate_timeout
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn warnings(&self) -> &[Warning] {
        self.gate.warnings()
    }

    pub fn artifact(&self) -> Option<&GeneratedArtifact> {
        self.artifact.as_ref()
    }

    /// Most recent error, including validation-stage errors that leave the
    /// controller `Idle`. Cleared by the next `submit`.
    pub fn last_error(&self) -> Option<&SubmissionError> {
        self.last_error.as_ref()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.events.subscribe()
    }

    /// Starts a fresh cycle. Any pending action from a previous cycle is
    /// dropped first.
    pub async fn submit(&mut self, input: OrderInput) {
        self.submission_id = Uuid::new_v4();
        self.last_error = None;
        if self.gate.cancel() {
            debug!("discarded pending action from previous submission");
        }

        let span = info_span!(
            "submission",
            submission_id = %self.submission_id,
            mrn = %input.patient.mrn,
        );
        self.validate_then_generate(input).instrument(span).await;
    }

    /// Resumes generation for the pending action. No-op when nothing is armed.
    pub async fn proceed(&mut self) {
        let Some(input) = self.gate.proceed() else {
            debug!("proceed ignored: no pending action");
            return;
        };

        let span = info_span!(
            "submission",
            submission_id = %self.submission_id,
            mrn = %input.patient.mrn,
        );
        async {
            info!("user chose to proceed despite warnings");
            self.generate(OrderRequest::from(&input)).await;
        }
        .instrument(span)
        .await;
    }

    /// Drops the pending action without calling the backend.
    pub fn cancel(&mut self) {
        if !self.gate.cancel() {
            debug!("cancel ignored: no pending action");
            return;
        }
        info!(submission_id = %self.submission_id, "user cancelled submission at warning gate");
        self.transition(SubmissionState::Idle);
    }

    async fn validate_then_generate(&mut self, input: OrderInput) {
        self.transition(SubmissionState::Validating);
        let request = OrderRequest::from(&input);
        info!(
            npi = %input.provider.npi,
            medication = %input.medication_name,
            "validating order"
        );

        let outcome = match self.backend.validate(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let error = SubmissionError::from_gateway(SubmissionStage::Validate, err);
                self.reject(error);
                return;
            }
        };

        if !outcome.valid {
            self.reject(SubmissionError::ValidationFailure {
                status: None,
                message: "backend reported the order as invalid".to_string(),
            });
            return;
        }

        if !outcome.warnings.is_empty() {
            warn!(
                warnings = outcome.warnings.len(),
                "validation raised warnings; awaiting confirmation"
            );
            self.artifact = None;
            self.emit(SubmissionEvent::WarningsRaised {
                submission_id: self.submission_id,
                warnings: outcome.warnings.clone(),
            });
            self.gate.arm(PendingAction::new(input, outcome.warnings));
            self.transition(SubmissionState::AwaitingConfirmation);
            return;
        }

        info!("validation clean; generating care plan");
        self.generate(request).await;
    }

    async fn generate(&mut self, request: OrderRequest) {
        self.transition(SubmissionState::Generating);

        let result = {
            let budget = CallBudget::new(self.generate_timeout);
            self.backend.generate(&request, &budget).await
        };

        match result {
            Ok(response) => {
                let artifact = GeneratedArtifact::from(response);
                info!(
                    order_id = %artifact.order_id,
                    care_plan_len = artifact.care_plan_text.len(),
                    "care plan ready"
                );
                self.artifact = Some(artifact.clone());
                self.emit(SubmissionEvent::ArtifactReady {
                    submission_id: self.submission_id,
                    artifact,
                });
                self.transition(SubmissionState::Succeeded);
            }
            Err(err) => {
                let error = SubmissionError::from_gateway(SubmissionStage::Generate, err);
                error!(error = %error, status = ?error.status(), "care plan generation failed");
                self.surface(error.clone());
                self.transition(SubmissionState::Failed(error));
            }
        }
    }

    fn reject(&mut self, error: SubmissionError) {
        error!(error = %error, status = ?error.status(), "order validation failed");
        self.surface(error);
        self.transition(SubmissionState::Idle);
    }

    fn surface(&mut self, error: SubmissionError) {
        self.last_error = Some(error.clone());
        self.emit(SubmissionEvent::ErrorSurfaced {
            submission_id: self.submission_id,
            error,
        });
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!(from = self.state.name(), to = next.name(), "submission state change");
        self.state = next.clone();
        self.emit(SubmissionEvent::StateChanged {
            submission_id: self.submission_id,
            state: next,
        });
    }

    fn emit(&self, event: SubmissionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
