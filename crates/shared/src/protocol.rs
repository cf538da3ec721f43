use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{GeneratedArtifact, OrderId, OrderInput};

/// Order body as the backend expects it on `orders/validate` and
/// `orders/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_mrn: String,
    pub provider_name: String,
    pub provider_npi: String,
    pub primary_diagnosis: String,
    pub medication_name: String,
    #[serde(default)]
    pub additional_diagnoses: Vec<String>,
    #[serde(default)]
    pub medication_history: Vec<String>,
    pub patient_records: String,
}

impl From<&OrderInput> for OrderRequest {
    fn from(input: &OrderInput) -> Self {
        Self {
            patient_first_name: input.patient.first_name.clone(),
            patient_last_name: input.patient.last_name.clone(),
            patient_mrn: input.patient.mrn.to_string(),
            provider_name: input.provider.name.clone(),
            provider_npi: input.provider.npi.to_string(),
            primary_diagnosis: input.primary_diagnosis.to_string(),
            medication_name: input.medication_name.clone(),
            additional_diagnoses: input.additional_diagnoses.clone(),
            medication_history: input.medication_history.clone(),
            patient_records: input.patient_records.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl Warning {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            severity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarePlanResponse {
    pub order_id: OrderId,
    pub care_plan: String,
}

impl From<CarePlanResponse> for GeneratedArtifact {
    fn from(response: CarePlanResponse) -> Self {
        Self {
            order_id: response.order_id,
            care_plan_text: response.care_plan,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn default_filename(self) -> String {
        format!("export.{}", self.as_str())
    }
}

/// Picks the download name for an export: the `filename=` part of a
/// `Content-Disposition` header with quotes stripped, or `export.<format>`.
pub fn export_filename(content_disposition: Option<&str>, format: ExportFormat) -> String {
    content_disposition
        .and_then(|value| value.split("filename=").nth(1))
        .map(|name| name.split(';').next().unwrap_or_default().replace('"', ""))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format.default_filename())
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filters shared by `orders/export` and `orders/export/stats`. Unset filters
/// are left out of the query string entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_npi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(flatten)]
    pub filters: ExportFilters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub total_orders: u64,
    pub care_plans_generated: u64,
    pub date_range: String,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub diagnoses: Vec<String>,
}
