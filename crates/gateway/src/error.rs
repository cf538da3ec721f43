use std::time::Duration;

use thiserror::Error;

/// Uniform failure shape for every call the gateway forwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("{endpoint} did not respond within {}s", .budget.as_secs_f64())]
    Timeout { endpoint: String, budget: Duration },
    #[error("{endpoint} was cancelled before a response arrived")]
    Cancelled { endpoint: String },
    #[error("backend returned status {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("could not decode response (status {status}): {message}")]
    Decode { status: u16, message: String },
    #[error("invalid backend url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl GatewayError {
    /// HTTP status observed from the backend, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Backend { status, .. } | GatewayError::Decode { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }
}
