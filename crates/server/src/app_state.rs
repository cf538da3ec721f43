use std::time::Duration;

use gateway::HttpGateway;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gateway: HttpGateway,
    pub(crate) upstream_timeout: Option<Duration>,
    pub(crate) max_body_bytes: usize,
}
