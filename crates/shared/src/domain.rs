use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

static MRN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}$").expect("static MRN pattern"));
static NPI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("static NPI pattern"));
static ICD10_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]\d{2}(\.\d{1,2})?$").expect("static ICD-10 pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CodeFormatError {
    pub message: &'static str,
}

macro_rules! code_newtype {
    ($name:ident, $pattern:ident, $message:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, CodeFormatError> {
                let raw = raw.trim();
                if $pattern.is_match(raw) {
                    Ok(Self(raw.to_string()))
                } else {
                    Err(CodeFormatError { message: $message })
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

code_newtype!(Mrn, MRN_PATTERN, "MRN must be exactly 6 digits");
code_newtype!(Npi, NPI_PATTERN, "NPI must be exactly 10 digits");
code_newtype!(Icd10Code, ICD10_PATTERN, "Invalid ICD-10 format (e.g., G70.00)");

/// Backend order identifier. The backend emits integers; some deployments
/// hand back opaque strings, so both are accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawOrderId {
            Number(i64),
            Text(String),
        }

        Ok(match RawOrderId::deserialize(deserializer)? {
            RawOrderId::Number(id) => OrderId(id.to_string()),
            RawOrderId::Text(id) => OrderId(id),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub first_name: String,
    pub last_name: String,
    pub mrn: Mrn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub name: String,
    pub npi: Npi,
}

/// A fully validated clinical order, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    pub patient: PatientIdentity,
    pub provider: ProviderIdentity,
    pub primary_diagnosis: Icd10Code,
    #[serde(default)]
    pub additional_diagnoses: Vec<String>,
    pub medication_name: String,
    #[serde(default)]
    pub medication_history: Vec<String>,
    pub patient_records: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub order_id: OrderId,
    pub care_plan_text: String,
}

/// Splits comma-separated form input, trimming entries and dropping empties.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
