//! Client side of the care plan workflow: form intake, the
//! validate/confirm/generate controller, care plan presentation and bulk
//! export.

pub mod backend;
pub mod config;
pub mod controller;
pub mod export;
pub mod form;
pub mod gate;
pub mod presenter;

pub use backend::OrderBackend;
pub use config::{
    generate_timeout_from_secs, load_client_settings, load_client_settings_from, ClientSettings,
};
pub use controller::{
    SubmissionController, SubmissionError, SubmissionEvent, SubmissionStage, SubmissionState,
    DEFAULT_GENERATE_TIMEOUT,
};
pub use export::{completion_summary, render_stats, ExportClient, ExportError, SavedExport};
pub use form::{FieldError, FormErrors, OrderForm};
pub use gate::{render_warnings, ConfirmationGate, PendingAction};
pub use presenter::{care_plan_filename, export_care_plan, render_care_plan, PresenterError};
