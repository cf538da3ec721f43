//! Bulk export of stored orders: preview stats and file download.

use std::path::{Path, PathBuf};

use gateway::{GatewayError, HttpGateway};
use shared::protocol::{ExportFilters, ExportFormat, ExportStats};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to save export to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedExport {
    pub path: PathBuf,
    pub size_bytes: usize,
}

pub struct ExportClient {
    gateway: HttpGateway,
}

impl ExportClient {
    pub fn new(gateway: HttpGateway) -> Self {
        Self { gateway }
    }

    pub async fn fetch_stats(&self, filters: &ExportFilters) -> Result<ExportStats, ExportError> {
        Ok(self.gateway.export_stats(filters).await?)
    }

    /// Downloads the export and saves it in `dir` under the server-chosen
    /// name. Directory components in that name are discarded.
    pub async fn download(
        &self,
        format: ExportFormat,
        filters: &ExportFilters,
        dir: &Path,
    ) -> Result<SavedExport, ExportError> {
        let file = self.gateway.export(format, filters).await?;
        let name = Path::new(&file.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| format.default_filename().into());
        let path = dir.join(name);

        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|source| ExportError::Save {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), %format, size_bytes = file.bytes.len(), "export saved");

        Ok(SavedExport {
            path,
            size_bytes: file.bytes.len(),
        })
    }
}

/// Message shown once a download finishes. The count comes from a stats
/// preview when one was fetched.
pub fn completion_summary(stats: Option<&ExportStats>) -> String {
    match stats {
        Some(stats) => format!(
            "Export completed! {} orders exported.",
            stats.total_orders
        ),
        None => "Export completed!".to_string(),
    }
}

pub fn render_stats(stats: &ExportStats) -> String {
    let mut lines = vec![
        format!("Total orders: {}", stats.total_orders),
        format!("Care plans generated: {}", stats.care_plans_generated),
        format!("Date range: {}", stats.date_range),
    ];
    if !stats.providers.is_empty() {
        lines.push(format!("Providers: {}", stats.providers.join(", ")));
    }
    if !stats.diagnoses.is_empty() {
        lines.push(format!("Diagnoses: {}", stats.diagnoses.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, response::IntoResponse, routing::get, Router};
    use tokio::net::TcpListener;

    fn stats(providers: Vec<&str>, diagnoses: Vec<&str>) -> ExportStats {
        ExportStats {
            total_orders: 12,
            care_plans_generated: 10,
            date_range: "2024-01-01 to 2024-02-01".into(),
            providers: providers.into_iter().map(String::from).collect(),
            diagnoses: diagnoses.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn stats_rendering_skips_empty_lists() {
        let rendered = render_stats(&stats(Vec::new(), vec!["G70.00"]));
        assert!(rendered.contains("Total orders: 12"));
        assert!(rendered.contains("Care plans generated: 10"));
        assert!(rendered.contains("Diagnoses: G70.00"));
        assert!(!rendered.contains("Providers"));
    }

    #[test]
    fn summary_mentions_count_when_known() {
        assert_eq!(
            completion_summary(Some(&stats(Vec::new(), Vec::new()))),
            "Export completed! 12 orders exported."
        );
        assert_eq!(completion_summary(None), "Export completed!");
    }

    #[tokio::test]
    async fn download_strips_directories_from_server_name() {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let app = Router::new().route(
            "/api/orders/export",
            get(|| async {
                (
                    [(
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"../../etc/care_plans.csv\"",
                    )],
                    "order_id\n1\n",
                )
                    .into_response()
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = ExportClient::new(
            HttpGateway::new(&format!("http://{addr}/api")).expect("gateway"),
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let saved = client
            .download(ExportFormat::Csv, &ExportFilters::default(), dir.path())
            .await
            .expect("download");

        assert_eq!(saved.path, dir.path().join("care_plans.csv"));
        assert_eq!(saved.size_bytes, 11);
        assert_eq!(
            std::fs::read_to_string(&saved.path).expect("read"),
            "order_id\n1\n"
        );
    }
}
