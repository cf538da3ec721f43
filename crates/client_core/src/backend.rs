use async_trait::async_trait;
use gateway::{CallBudget, GatewayError, HttpGateway};
use shared::protocol::{CarePlanResponse, OrderRequest, ValidationOutcome};

/// The two backend calls the submission workflow depends on.
///
/// Implementations must honor `budget` on `generate` (typically through
/// [`CallBudget::run`]) so an expired budget drops the in-flight request.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn validate(&self, order: &OrderRequest) -> Result<ValidationOutcome, GatewayError>;
    async fn generate(
        &self,
        order: &OrderRequest,
        budget: &CallBudget,
    ) -> Result<CarePlanResponse, GatewayError>;
}

#[async_trait]
impl OrderBackend for HttpGateway {
    async fn validate(&self, order: &OrderRequest) -> Result<ValidationOutcome, GatewayError> {
        HttpGateway::validate(self, order).await
    }

    async fn generate(
        &self,
        order: &OrderRequest,
        budget: &CallBudget,
    ) -> Result<CarePlanResponse, GatewayError> {
        HttpGateway::generate(self, order, budget).await
    }
}
