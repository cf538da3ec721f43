//! Displays the generated care plan and saves it as a plain-text file.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use shared::domain::GeneratedArtifact;
use thiserror::Error;
use tracing::{info, warn};

pub const CARE_PLAN_HEADING: &str = "Generated Care Plan";
pub const CARE_PLAN_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("failed to write care plan to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Heading, the order it belongs to, then the plan text exactly as generated.
pub fn render_care_plan(artifact: &GeneratedArtifact) -> String {
    format!(
        "{CARE_PLAN_HEADING}\nOrder #{}\n\n{}\n",
        artifact.order_id, artifact.care_plan_text
    )
}

pub fn care_plan_filename(today: NaiveDate) -> String {
    format!("care-plan-{}.txt", today.format("%Y-%m-%d"))
}

/// Writes the artifact's text to `dir/care-plan-<today>.txt`.
///
/// Returns `Ok(None)` without touching the filesystem when there is no
/// artifact yet or its plan text is empty.
pub async fn export_care_plan(
    artifact: Option<&GeneratedArtifact>,
    dir: &Path,
    today: NaiveDate,
) -> Result<Option<PathBuf>, PresenterError> {
    let Some(artifact) = artifact.filter(|a| !a.care_plan_text.is_empty()) else {
        warn!("no care plan to export");
        return Ok(None);
    };

    let path = dir.join(care_plan_filename(today));
    tokio::fs::write(&path, artifact.care_plan_text.as_bytes())
        .await
        .map_err(|source| PresenterError::Write {
            path: path.clone(),
            source,
        })?;
    info!(
        path = %path.display(),
        order_id = %artifact.order_id,
        content_type = CARE_PLAN_CONTENT_TYPE,
        "care plan exported"
    );
    Ok(Some(path))
}
