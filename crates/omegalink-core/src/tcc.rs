//! TCC lifecycle events and ordering guard
//!
//! Per global transaction the legal event order is
//! `Started → {ParticipationStarted → ParticipationEnded}* →
//! Coordinate(confirm|cancel) → Stopped`. The confirm/cancel decision is
//! coordinator-owned; the participant only reports completion of the
//! coordinated methods.

use std::collections::HashSet;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::error::{require, ProtocolError, ProtocolResult};
use crate::response::{CoordinateCommand, TransactionStatus};

/// Start of a global TCC transaction.
#[derive(Debug, Clone)]
pub struct TccStartedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl TccStartedEvent {
    /// Create a start event stamped with the current time.
    pub fn new(global_tx_id: impl Into<String>) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Reject the event if required correlation fields are empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for an empty global id.
    pub fn validate(&self) -> ProtocolResult<()> {
        require("global_tx_id", &self.global_tx_id)
    }
}

/// A participant entered its try phase.
#[derive(Debug, Clone)]
pub struct ParticipationStartedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Participation id, unique within the global transaction.
    pub local_tx_id: String,
    /// Identity of the confirm method.
    pub confirm_method: String,
    /// Identity of the cancel method.
    pub cancel_method: String,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl ParticipationStartedEvent {
    /// Create a participation start event stamped with the current time.
    pub fn new(
        global_tx_id: impl Into<String>,
        local_tx_id: impl Into<String>,
        confirm_method: impl Into<String>,
        cancel_method: impl Into<String>,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            local_tx_id: local_tx_id.into(),
            confirm_method: confirm_method.into(),
            cancel_method: cancel_method.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Reject the event if required correlation fields are empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for an empty global or local
    /// id.
    pub fn validate(&self) -> ProtocolResult<()> {
        require("global_tx_id", &self.global_tx_id)?;
        require("local_tx_id", &self.local_tx_id)
    }
}

/// A participant finished its try phase.
#[derive(Debug, Clone)]
pub struct ParticipationEndedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Participation id.
    pub local_tx_id: String,
    /// Try-phase outcome.
    pub status: TransactionStatus,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl ParticipationEndedEvent {
    /// Create a participation end event stamped with the current time.
    pub fn new(
        global_tx_id: impl Into<String>,
        local_tx_id: impl Into<String>,
        status: TransactionStatus,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            local_tx_id: local_tx_id.into(),
            status,
            timestamp: SystemTime::now(),
        }
    }

    /// Reject the event if required correlation fields are empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for an empty global or local
    /// id.
    pub fn validate(&self) -> ProtocolResult<()> {
        require("global_tx_id", &self.global_tx_id)?;
        require("local_tx_id", &self.local_tx_id)
    }
}

/// A participant executed the coordinator's confirm/cancel command.
#[derive(Debug, Clone)]
pub struct CoordinatedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Participation id the command applied to.
    pub local_tx_id: String,
    /// The command that was executed.
    pub command: CoordinateCommand,
    /// Outcome of running the confirm/cancel method.
    pub status: TransactionStatus,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl CoordinatedEvent {
    /// Create a coordinated event stamped with the current time.
    pub fn new(
        global_tx_id: impl Into<String>,
        local_tx_id: impl Into<String>,
        command: CoordinateCommand,
        status: TransactionStatus,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            local_tx_id: local_tx_id.into(),
            command,
            status,
            timestamp: SystemTime::now(),
        }
    }

    /// Reject the event if required correlation fields are empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for an empty global or local
    /// id.
    pub fn validate(&self) -> ProtocolResult<()> {
        require("global_tx_id", &self.global_tx_id)?;
        require("local_tx_id", &self.local_tx_id)
    }
}

/// End of a global TCC transaction.
#[derive(Debug, Clone)]
pub struct TccEndedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Final transaction outcome.
    pub status: TransactionStatus,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl TccEndedEvent {
    /// Create a stop event stamped with the current time.
    pub fn new(global_tx_id: impl Into<String>, status: TransactionStatus) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            status,
            timestamp: SystemTime::now(),
        }
    }

    /// Reject the event if required correlation fields are empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for an empty global id.
    pub fn validate(&self) -> ProtocolResult<()> {
        require("global_tx_id", &self.global_tx_id)
    }
}

#[derive(Debug, Default)]
struct TccTxState {
    aborted: bool,
    stopped: bool,
    open: HashSet<String>,
    ended: Vec<(String, TransactionStatus)>,
    coordinated: HashSet<String>,
}

/// Per-transaction ordering guard for TCC events.
///
/// Shared by every sender of a cluster; repeated transitions with identical
/// ids succeed so a caller-side retry through a different sender is not
/// rejected as out of order.
#[derive(Debug, Default)]
pub struct TccFlow {
    transactions: DashMap<String, TccTxState>,
}

impl TccFlow {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a global transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Completed`] when the id already stopped.
    pub fn begin(&self, global: &str) -> ProtocolResult<()> {
        let state = self.transactions.entry(global.to_string()).or_default();
        if state.stopped {
            return Err(ProtocolError::Completed(global.to_string()));
        }
        Ok(())
    }

    /// Record the start of a participation (try phase).
    ///
    /// # Errors
    ///
    /// Rejects unknown, aborted and stopped transactions, and restarts of a
    /// participation that already ended.
    pub fn participation_begin(&self, global: &str, local: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.aborted {
            return Err(ProtocolError::Aborted(global.to_string()));
        }
        if state.stopped {
            return Err(ProtocolError::Completed(global.to_string()));
        }
        if state.ended.iter().any(|(l, _)| l == local) {
            return Err(ProtocolError::AlreadyEnded {
                global: global.to_string(),
                local: local.to_string(),
            });
        }
        state.open.insert(local.to_string());
        Ok(())
    }

    /// Record the end of a participation's try phase.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotStarted`] when no start was recorded for
    /// the local id.
    pub fn participation_end(
        &self,
        global: &str,
        local: &str,
        status: TransactionStatus,
    ) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.ended.iter().any(|(l, _)| l == local) {
            return Ok(());
        }
        if !state.open.remove(local) {
            return Err(ProtocolError::NotStarted {
                global: global.to_string(),
                local: local.to_string(),
            });
        }
        state.ended.push((local.to_string(), status));
        Ok(())
    }

    /// Record completion of a confirm/cancel command for a participation.
    ///
    /// A cancel may target a participation whose try phase never finished,
    /// so both open and ended participations are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotStarted`] for a participation the guard
    /// has never seen.
    pub fn coordinate(&self, global: &str, local: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.coordinated.contains(local) {
            return Ok(());
        }
        let seen = state.open.contains(local) || state.ended.iter().any(|(l, _)| l == local);
        if !seen {
            return Err(ProtocolError::NotStarted {
                global: global.to_string(),
                local: local.to_string(),
            });
        }
        state.coordinated.insert(local.to_string());
        Ok(())
    }

    /// Record the end of the global transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownTransaction`] when no start was
    /// recorded.
    pub fn stop(&self, global: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        state.stopped = true;
        Ok(())
    }

    /// Record a coordinator-side cancel decision. Unknown ids are ignored.
    pub fn mark_aborted(&self, global: &str) {
        if let Some(mut state) = self.transactions.get_mut(global) {
            state.aborted = true;
        }
    }

    /// Whether a cancel decision has been recorded for the transaction.
    pub fn is_aborted(&self, global: &str) -> bool {
        self.transactions
            .get(global)
            .is_some_and(|s| s.aborted)
    }

    /// Ended participations with their try-phase status, in completion
    /// order, the set confirm/cancel must fan out over.
    pub fn ended_participations(&self, global: &str) -> Vec<(String, TransactionStatus)> {
        self.transactions
            .get(global)
            .map(|s| s.ended.clone())
            .unwrap_or_default()
    }

    /// Drop all recorded state for a finished transaction.
    pub fn forget(&self, global: &str) {
        self.transactions.remove(global);
    }

    fn known(
        &self,
        global: &str,
    ) -> ProtocolResult<dashmap::mapref::one::RefMut<'_, String, TccTxState>> {
        self.transactions
            .get_mut(global)
            .ok_or_else(|| ProtocolError::UnknownTransaction(global.to_string()))
    }
}
