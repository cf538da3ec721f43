//! Raw order form as typed by a user, and its conversion into a validated
//! [`OrderInput`].

use std::fmt;

use serde::{Deserialize, Serialize};
use shared::domain::{
    split_list, Icd10Code, Mrn, Npi, OrderInput, PatientIdentity, ProviderIdentity,
};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderForm {
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_mrn: String,
    pub provider_name: String,
    pub provider_npi: String,
    pub primary_diagnosis: String,
    /// Comma-separated, e.g. `G70.01, E11.9`.
    pub additional_diagnoses: String,
    pub medication_name: String,
    /// Comma-separated, e.g. `Lisinopril 10mg, Metformin 500mg`.
    pub medication_history: String,
    pub patient_records: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order form is invalid: {}", join_errors(.0))]
pub struct FormErrors(pub Vec<FieldError>);

impl FormErrors {
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrderForm {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Checks every field and reports all problems at once.
    pub fn into_input(self) -> Result<OrderInput, FormErrors> {
        let mut errors = Vec::new();

        let patient_first_name = required(
            &mut errors,
            "patient_first_name",
            &self.patient_first_name,
            "First name is required",
        );
        let patient_last_name = required(
            &mut errors,
            "patient_last_name",
            &self.patient_last_name,
            "Last name is required",
        );
        let mrn = Mrn::parse(&self.patient_mrn)
            .map_err(|e| push(&mut errors, "patient_mrn", e.message))
            .ok();
        let provider_name = required(
            &mut errors,
            "provider_name",
            &self.provider_name,
            "Provider name is required",
        );
        let npi = Npi::parse(&self.provider_npi)
            .map_err(|e| push(&mut errors, "provider_npi", e.message))
            .ok();
        let primary_diagnosis = Icd10Code::parse(&self.primary_diagnosis)
            .map_err(|e| push(&mut errors, "primary_diagnosis", e.message))
            .ok();
        let medication_name = required(
            &mut errors,
            "medication_name",
            &self.medication_name,
            "Medication name is required",
        );
        let patient_records = required(
            &mut errors,
            "patient_records",
            &self.patient_records,
            "Patient records are required",
        );

        match (mrn, npi, primary_diagnosis) {
            (Some(mrn), Some(npi), Some(primary_diagnosis)) if errors.is_empty() => {
                Ok(OrderInput {
                    patient: PatientIdentity {
                        first_name: patient_first_name,
                        last_name: patient_last_name,
                        mrn,
                    },
                    provider: ProviderIdentity {
                        name: provider_name,
                        npi,
                    },
                    primary_diagnosis,
                    additional_diagnoses: split_list(&self.additional_diagnoses),
                    medication_name,
                    medication_history: split_list(&self.medication_history),
                    patient_records,
                })
            }
            _ => Err(FormErrors(errors)),
        }
    }
}

fn push(errors: &mut Vec<FieldError>, field: &'static str, message: &str) {
    errors.push(FieldError {
        field,
        message: message.to_string(),
    });
}

fn required(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &str,
    message: &str,
) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        push(errors, field, message);
    }
    trimmed.to_string()
}
