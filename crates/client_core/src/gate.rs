//! Human checkpoint between a warning-bearing validation and generation.

use shared::{domain::OrderInput, protocol::Warning};

pub const GATE_HEADER: &str = "Validation Warnings";
pub const GATE_CHOICES: &str = "[Cancel]  [Proceed Anyway]";

/// Generation suspended on a user decision, bound to the exact input that
/// produced the warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    input: OrderInput,
    warnings: Vec<Warning>,
}

impl PendingAction {
    pub fn new(input: OrderInput, warnings: Vec<Warning>) -> Self {
        Self { input, warnings }
    }

    pub fn input(&self) -> &OrderInput {
        &self.input
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Gives back the input to run generation with.
    pub fn resume(self) -> OrderInput {
        self.input
    }
}

/// Holds at most one [`PendingAction`]. Arming again replaces it.
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Option<PendingAction>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the action that was replaced, if any.
    pub fn arm(&mut self, action: PendingAction) -> Option<PendingAction> {
        self.pending.replace(action)
    }

    /// Takes the pending action and resumes it. `None` when nothing is armed.
    pub fn proceed(&mut self) -> Option<OrderInput> {
        self.pending.take().map(PendingAction::resume)
    }

    /// Discards the pending action. Returns whether one was held.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Warnings currently on display; empty when disarmed.
    pub fn warnings(&self) -> &[Warning] {
        self.pending
            .as_ref()
            .map(PendingAction::warnings)
            .unwrap_or_default()
    }

    pub fn render(&self) -> String {
        render_warnings(self.warnings())
    }
}

/// Header, one row per warning message, then the two choices. Only the
/// message is shown; warning kinds are not rendered.
pub fn render_warnings(warnings: &[Warning]) -> String {
    let mut out = String::new();
    out.push_str(GATE_HEADER);
    out.push('\n');
    for warning in warnings {
        out.push_str("  - ");
        out.push_str(&warning.message);
        out.push('\n');
    }
    out.push_str(GATE_CHOICES);
    out.push('\n');
    out
}
