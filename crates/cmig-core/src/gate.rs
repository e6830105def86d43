//! Confirmation gate
//!
//! Every recoverable or degraded path asks here before acting. In force
//! mode the gate answers yes without asking; with no confirmer attached it
//! answers no.

use crate::error::MigrateError;
use crate::hub::Confirm;
use std::sync::Arc;

/// Single funnel for operator decisions
#[derive(Clone)]
pub struct ConfirmationGate {
    confirm: Option<Arc<dyn Confirm>>,
    force: bool,
}

impl ConfirmationGate {
    /// Gate that asks `confirm` (unless forced)
    #[must_use]
    pub fn new(confirm: Option<Arc<dyn Confirm>>, force: bool) -> Self {
        Self { confirm, force }
    }

    /// Ask a question
    pub async fn ask(&self, prompt: &str) -> bool {
        if self.force {
            tracing::info!("{} (forced: yes)", prompt);
            return true;
        }

        let answer = match &self.confirm {
            Some(confirm) => confirm.ask(prompt).await,
            None => false,
        };
        tracing::info!("{} -> {}", prompt, if answer { "yes" } else { "no" });
        answer
    }

    /// Ask a question whose "no" aborts the run
    ///
    /// # Errors
    /// `MigrateError::Declined` naming `gate` when the answer is no.
    pub async fn require(&self, gate: &str, prompt: &str) -> Result<(), MigrateError> {
        if self.ask(prompt).await {
            Ok(())
        } else {
            Err(MigrateError::declined(gate))
        }
    }
}

impl std::fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("interactive", &self.confirm.is_some())
            .field("force", &self.force)
            .finish()
    }
}
