//! The coordinator's reply contract

use serde::{Deserialize, Serialize};

/// Coordinator directive for TCC participations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateCommand {
    /// Confirm every ended participation.
    Confirm,
    /// Cancel every ended participation.
    Cancel,
}

/// Outcome reported for a participation or a whole TCC transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The work completed and may be confirmed.
    Succeeded,
    /// The work failed; cancellation is required.
    Failed,
}

/// The coordinator's reply to a lifecycle event.
///
/// `aborted = true` is a *decision*, not an error: the global transaction
/// must compensate/cancel. The caller reacts by running local compensation;
/// re-sending the event would only duplicate coordinator-side state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaResponse {
    /// Whether the coordinator has decided the transaction must roll back.
    pub aborted: bool,
    /// Commit/cancel directive, present on coordinate replies.
    pub directive: Option<CoordinateCommand>,
}

impl AlphaResponse {
    /// A reply that lets the transaction proceed.
    pub fn ok() -> Self {
        Self {
            aborted: false,
            directive: None,
        }
    }

    /// A reply carrying an abort decision.
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            directive: None,
        }
    }

    /// A reply carrying a coordinate directive.
    pub fn with_directive(directive: CoordinateCommand) -> Self {
        Self {
            aborted: directive == CoordinateCommand::Cancel,
            directive: Some(directive),
        }
    }
}
