//! Deadline and cancellation for a single outbound call.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

use crate::error::GatewayError;

/// Stand-in deadline for limits too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Bounds one gateway call in wall-clock time.
///
/// The budget owns a drop guard over its token, so leaving the scope that
/// created it cancels anything still listening on [`CallBudget::token`].
/// [`CallBudget::run`] races the call against the deadline and the token;
/// whichever loses is dropped, which aborts an in-flight HTTP request.
pub struct CallBudget {
    limit: Duration,
    deadline: Instant,
    token: CancellationToken,
    _release: DropGuard,
}

impl CallBudget {
    pub fn new(limit: Duration) -> Self {
        let token = CancellationToken::new();
        let now = Instant::now();
        Self {
            limit,
            deadline: now.checked_add(limit).unwrap_or(now + FAR_FUTURE),
            _release: token.clone().drop_guard(),
            token,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn run<T, F>(&self, endpoint: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(GatewayError::Cancelled {
                endpoint: endpoint.to_string(),
            }),
            result = call => result,
            _ = tokio::time::sleep_until(self.deadline) => {
                self.token.cancel();
                warn!(endpoint, budget_secs = self.limit.as_secs_f64(), "call budget expired; request aborted");
                Err(GatewayError::Timeout {
                    endpoint: endpoint.to_string(),
                    budget: self.limit,
                })
            }
        }
    }
}
