//! Forwards order traffic to the care plan backend and normalizes whatever
//! comes back into either a decoded body or a [`GatewayError`].

use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    error::error_message_from_body,
    protocol::{
        export_filename, CarePlanResponse, ExportFilters, ExportFormat, ExportStats,
        OrderRequest, ValidationOutcome,
    },
};
use tracing::{debug, info, warn};
use url::Url;

mod budget;
mod error;

pub use budget::CallBudget;
pub use error::GatewayError;
pub use tokio_util::sync::CancellationToken;

pub const VALIDATE_ENDPOINT: &str = "orders/validate";
pub const GENERATE_ENDPOINT: &str = "orders/generate";
pub const EXPORT_ENDPOINT: &str = "orders/export";
pub const EXPORT_STATS_ENDPOINT: &str = "orders/export/stats";

/// A decoded JSON response and the status it arrived with.
#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    pub status: u16,
    pub body: Value,
}

impl Forwarded {
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, GatewayError> {
        serde_json::from_value(self.body).map_err(|e| GatewayError::Decode {
            status: self.status,
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Parses a base URL and gives it a trailing slash so relative endpoints
/// append instead of replacing the last path segment.
pub fn normalize_base_url(raw: &str) -> Result<Url, GatewayError> {
    let raw = raw.trim();
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| GatewayError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(GatewayError::InvalidUrl {
            url: raw.to_string(),
            message: "url cannot be used as a base".to_string(),
        });
    }
    Ok(url)
}

/// Stateless HTTP forwarder. Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    http: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder, GatewayError> {
        let url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| GatewayError::InvalidUrl {
                url: format!("{}{endpoint}", self.base_url),
                message: e.to_string(),
            })?;
        Ok(self.http.request(method, url))
    }

    /// POSTs `payload` as JSON to `endpoint` and returns the decoded JSON body
    /// together with the backend's status.
    pub async fn forward<P>(&self, endpoint: &str, payload: &P) -> Result<Forwarded, GatewayError>
    where
        P: Serialize + ?Sized,
    {
        let request = self.request(Method::POST, endpoint)?.json(payload);
        let response = send(endpoint, request).await?;
        read_json(endpoint, response).await
    }

    /// GETs `endpoint` with `query` appended and returns the decoded JSON body.
    pub async fn fetch<Q>(&self, endpoint: &str, query: &Q) -> Result<Forwarded, GatewayError>
    where
        Q: Serialize + ?Sized,
    {
        let request = self.request(Method::GET, endpoint)?.query(query);
        let response = send(endpoint, request).await?;
        read_json(endpoint, response).await
    }

    /// POSTs `payload` and hands back the backend's status and JSON body
    /// whether or not the status is a success. Only bodies that are not
    /// JSON become errors.
    pub async fn relay<P>(&self, endpoint: &str, payload: &P) -> Result<Forwarded, GatewayError>
    where
        P: Serialize + ?Sized,
    {
        let request = self.request(Method::POST, endpoint)?.json(payload);
        let response = send(endpoint, request).await?;
        read_any_json(endpoint, response).await
    }

    /// GET counterpart of [`HttpGateway::relay`].
    pub async fn relay_query<Q>(&self, endpoint: &str, query: &Q) -> Result<Forwarded, GatewayError>
    where
        Q: Serialize + ?Sized,
    {
        let request = self.request(Method::GET, endpoint)?.query(query);
        let response = send(endpoint, request).await?;
        read_any_json(endpoint, response).await
    }

    /// Like [`HttpGateway::forward`], bounded by `budget`.
    pub async fn forward_within<P>(
        &self,
        endpoint: &str,
        payload: &P,
        budget: &CallBudget,
    ) -> Result<Forwarded, GatewayError>
    where
        P: Serialize + ?Sized,
    {
        budget.run(endpoint, self.forward(endpoint, payload)).await
    }

    pub async fn validate(&self, order: &OrderRequest) -> Result<ValidationOutcome, GatewayError> {
        let outcome: ValidationOutcome = self.forward(VALIDATE_ENDPOINT, order).await?.decode()?;
        info!(
            mrn = %order.patient_mrn,
            npi = %order.provider_npi,
            valid = outcome.valid,
            warnings = outcome.warnings.len(),
            "validation response received"
        );
        Ok(outcome)
    }

    pub async fn generate(
        &self,
        order: &OrderRequest,
        budget: &CallBudget,
    ) -> Result<CarePlanResponse, GatewayError> {
        let response: CarePlanResponse = self
            .forward_within(GENERATE_ENDPOINT, order, budget)
            .await?
            .decode()?;
        info!(
            order_id = %response.order_id,
            care_plan_len = response.care_plan.len(),
            "care plan generated"
        );
        Ok(response)
    }

    pub async fn export_stats(&self, filters: &ExportFilters) -> Result<ExportStats, GatewayError> {
        self.fetch(EXPORT_STATS_ENDPOINT, filters).await?.decode()
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        filters: &ExportFilters,
    ) -> Result<ExportFile, GatewayError> {
        let request = self
            .request(Method::GET, EXPORT_ENDPOINT)?
            .query(&[("format", format.as_str())])
            .query(filters)
            .header(header::ACCEPT, format.content_type());
        let response = send(EXPORT_ENDPOINT, request).await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(backend_error(EXPORT_ENDPOINT, response).await);
        }

        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| GatewayError::Decode {
            status,
            message: e.to_string(),
        })?;
        let filename = export_filename(disposition.as_deref(), format);
        info!(%filename, size_bytes = bytes.len(), "export downloaded");

        Ok(ExportFile {
            filename,
            content_type: format.content_type().to_string(),
            bytes: bytes.to_vec(),
        })
    }
}

async fn send(endpoint: &str, request: RequestBuilder) -> Result<Response, GatewayError> {
    debug!(endpoint, "forwarding request");
    request.send().await.map_err(|e| {
        warn!(endpoint, error = %e, "transport failure");
        GatewayError::Network {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        }
    })
}

async fn read_json(endpoint: &str, response: Response) -> Result<Forwarded, GatewayError> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(backend_error(endpoint, response).await);
    }

    let bytes = response.bytes().await.map_err(|e| GatewayError::Network {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode {
            status,
            message: e.to_string(),
        })?
    };
    Ok(Forwarded { status, body })
}

async fn read_any_json(endpoint: &str, response: Response) -> Result<Forwarded, GatewayError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return read_json(endpoint, response).await;
    }

    let bytes = response.bytes().await.map_err(|e| GatewayError::Network {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(body) => {
            debug!(endpoint, status, "relaying backend error body");
            Ok(Forwarded { status, body })
        }
        Err(_) => {
            let message = format!("request to {endpoint} failed with status code {status}");
            warn!(endpoint, status, "backend error body was not JSON");
            Err(GatewayError::Backend { status, message })
        }
    }
}

async fn backend_error(endpoint: &str, response: Response) -> GatewayError {
    let status = response.status().as_u16();
    let message = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .and_then(|body| error_message_from_body(&body))
        .unwrap_or_else(|| format!("request to {endpoint} failed with status code {status}"));
    warn!(endpoint, status, %message, "backend returned an error status");
    GatewayError::Backend { status, message }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
