//! Saga lifecycle events and ordering guard
//!
//! Per global transaction the legal event order is
//! `Started → {SubStarted → (SubEnded | SubFailed)}* → (Ended | Aborted)`.
//! [`SagaFlow`] tracks that order per transaction so a malformed sequence is
//! rejected locally instead of reaching the coordinator. An abort decision
//! (local failure or coordinator reply) stops further sub-transaction
//! starts; already-ended sub-transactions are then compensated in reverse
//! completion order.

use std::collections::HashSet;
use std::time::SystemTime;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{require, ProtocolError, ProtocolResult};

/// Start of a global saga.
#[derive(Debug, Clone)]
pub struct SagaStartedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl SagaStartedEvent {
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

/// Start of a compensable sub-transaction.
#[derive(Debug, Clone)]
pub struct SubTxStartedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Sub-transaction id, unique within the global transaction.
    pub local_tx_id: String,
    /// Id of the enclosing transaction, if nested.
    pub parent_tx_id: Option<String>,
    /// Identity of the compensation method to run on abort.
    pub compensation_method: String,
    /// Arguments the compensation method needs, codec-encoded at the wire.
    pub payload: Value,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl SubTxStartedEvent {
    /// Create a sub-transaction start event stamped with the current time.
    pub fn new(
        global_tx_id: impl Into<String>,
        local_tx_id: impl Into<String>,
        compensation_method: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            local_tx_id: local_tx_id.into(),
            parent_tx_id: None,
            compensation_method: compensation_method.into(),
            payload,
            timestamp: SystemTime::now(),
        }
    }

    /// Attach the parent transaction id.
    #[must_use]
    pub fn with_parent(mut self, parent_tx_id: impl Into<String>) -> Self {
        self.parent_tx_id = Some(parent_tx_id.into());
        self
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

/// Successful completion of a sub-transaction.
#[derive(Debug, Clone)]
pub struct SubTxEndedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Sub-transaction id.
    pub local_tx_id: String,
    /// Id of the enclosing transaction, if nested.
    pub parent_tx_id: Option<String>,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl SubTxEndedEvent {
    /// Create a sub-transaction end event stamped with the current time.
    pub fn new(global_tx_id: impl Into<String>, local_tx_id: impl Into<String>) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            local_tx_id: local_tx_id.into(),
            parent_tx_id: None,
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

/// Failure of a sub-transaction; aborts the global transaction.
#[derive(Debug, Clone)]
pub struct SubTxFailedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Sub-transaction id.
    pub local_tx_id: String,
    /// Id of the enclosing transaction, if nested.
    pub parent_tx_id: Option<String>,
    /// Human-readable failure cause.
    pub cause: String,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl SubTxFailedEvent {
    /// Create a sub-transaction failure event stamped with the current time.
    pub fn new(
        global_tx_id: impl Into<String>,
        local_tx_id: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            local_tx_id: local_tx_id.into(),
            parent_tx_id: None,
            cause: cause.into(),
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

/// Successful completion of the global saga.
#[derive(Debug, Clone)]
pub struct SagaEndedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl SagaEndedEvent {
    /// Create a saga end event stamped with the current time.
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

/// Participant-initiated abort of the global saga.
#[derive(Debug, Clone)]
pub struct SagaAbortedEvent {
    /// Global transaction id.
    pub global_tx_id: String,
    /// Human-readable abort cause.
    pub cause: String,
    /// Event creation time.
    pub timestamp: SystemTime,
}

impl SagaAbortedEvent {
    /// Create an abort event stamped with the current time.
    pub fn new(global_tx_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            global_tx_id: global_tx_id.into(),
            cause: cause.into(),
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
struct SagaTxState {
    aborted: bool,
    completed: bool,
    open_subs: HashSet<String>,
    // completion order; compensation runs over this in reverse
    ended_subs: Vec<String>,
    failed_subs: HashSet<String>,
}

/// Per-transaction ordering guard for saga events.
///
/// Shared by every sender of a cluster so the recorded state survives a
/// fail-over to a different sender. Transitions that merely repeat an
/// already-recorded step succeed, which keeps a caller-side retry after a
/// delivery failure from being rejected as out of order.
#[derive(Debug, Default)]
pub struct SagaFlow {
    transactions: DashMap<String, SagaTxState>,
}

impl SagaFlow {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a global transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Completed`] or [`ProtocolError::Aborted`]
    /// when the id already ran to completion or was aborted.
    pub fn begin(&self, global: &str) -> ProtocolResult<()> {
        let state = self.transactions.entry(global.to_string()).or_default();
        if state.completed {
            return Err(ProtocolError::Completed(global.to_string()));
        }
        if state.aborted {
            return Err(ProtocolError::Aborted(global.to_string()));
        }
        Ok(())
    }

    /// Record the start of a sub-transaction.
    ///
    /// # Errors
    ///
    /// Rejects unknown transactions, aborted or completed transactions, and
    /// restarts of a sub-transaction that already ended.
    pub fn sub_begin(&self, global: &str, local: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.aborted {
            return Err(ProtocolError::Aborted(global.to_string()));
        }
        if state.completed {
            return Err(ProtocolError::Completed(global.to_string()));
        }
        if state.ended_subs.iter().any(|l| l == local) {
            return Err(ProtocolError::AlreadyEnded {
                global: global.to_string(),
                local: local.to_string(),
            });
        }
        state.open_subs.insert(local.to_string());
        Ok(())
    }

    /// Record the successful end of a sub-transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotStarted`] when no start was recorded for
    /// the local id.
    pub fn sub_end(&self, global: &str, local: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.ended_subs.iter().any(|l| l == local) {
            return Ok(());
        }
        if !state.open_subs.remove(local) {
            return Err(ProtocolError::NotStarted {
                global: global.to_string(),
                local: local.to_string(),
            });
        }
        state.ended_subs.push(local.to_string());
        Ok(())
    }

    /// Record the failure of a sub-transaction; aborts the global
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotStarted`] when no start was recorded for
    /// the local id.
    pub fn sub_fail(&self, global: &str, local: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.failed_subs.contains(local) {
            return Ok(());
        }
        if !state.open_subs.remove(local) {
            return Err(ProtocolError::NotStarted {
                global: global.to_string(),
                local: local.to_string(),
            });
        }
        state.failed_subs.insert(local.to_string());
        state.aborted = true;
        Ok(())
    }

    /// Record the successful end of the global transaction.
    ///
    /// # Errors
    ///
    /// Rejects unknown or aborted transactions and transactions that still
    /// have open sub-transactions.
    pub fn end(&self, global: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.completed {
            return Ok(());
        }
        if state.aborted {
            return Err(ProtocolError::Aborted(global.to_string()));
        }
        if !state.open_subs.is_empty() {
            return Err(ProtocolError::OpenSubTransactions {
                global: global.to_string(),
                open: state.open_subs.len(),
            });
        }
        state.completed = true;
        Ok(())
    }

    /// Record a participant-initiated abort.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Completed`] when the transaction already
    /// finished successfully.
    pub fn abort(&self, global: &str) -> ProtocolResult<()> {
        let mut state = self.known(global)?;
        if state.completed {
            return Err(ProtocolError::Completed(global.to_string()));
        }
        state.aborted = true;
        Ok(())
    }

    /// Record a coordinator-side abort decision. Unknown ids are ignored:
    /// the decision belongs to the coordinator, not this guard.
    pub fn mark_aborted(&self, global: &str) {
        if let Some(mut state) = self.transactions.get_mut(global) {
            state.aborted = true;
        }
    }

    /// Whether an abort has been recorded for the transaction.
    pub fn is_aborted(&self, global: &str) -> bool {
        self.transactions
            .get(global)
            .is_some_and(|s| s.aborted)
    }

    /// Ended sub-transactions in reverse completion order, the order
    /// compensation must run after an abort.
    pub fn compensation_order(&self, global: &str) -> Vec<String> {
        self.transactions
            .get(global)
            .map(|s| s.ended_subs.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all recorded state for a finished transaction.
    pub fn forget(&self, global: &str) {
        self.transactions.remove(global);
    }

    fn known(
        &self,
        global: &str,
    ) -> ProtocolResult<dashmap::mapref::one::RefMut<'_, String, SagaTxState>> {
        self.transactions
            .get_mut(global)
            .ok_or_else(|| ProtocolError::UnknownTransaction(global.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_accepted() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        flow.sub_end("g1", "l1").unwrap();
        flow.sub_begin("g1", "l2").unwrap();
        flow.sub_end("g1", "l2").unwrap();
        flow.end("g1").unwrap();
    }

    #[test]
    fn test_sub_end_without_start_is_rejected() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        let err = flow.sub_end("g1", "l1").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::NotStarted {
                global: "g1".into(),
                local: "l1".into()
            }
        );
    }

    #[test]
    fn test_unknown_transaction_is_rejected() {
        let flow = SagaFlow::new();
        let err = flow.sub_begin("missing", "l1").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownTransaction("missing".into()));
    }

    #[test]
    fn test_failure_aborts_and_blocks_new_subs() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        flow.sub_fail("g1", "l1").unwrap();
        assert!(flow.is_aborted("g1"));
        let err = flow.sub_begin("g1", "l2").unwrap_err();
        assert_eq!(err, ProtocolError::Aborted("g1".into()));
        let err = flow.end("g1").unwrap_err();
        assert_eq!(err, ProtocolError::Aborted("g1".into()));
    }

    #[test]
    fn test_coordinator_abort_blocks_new_subs() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        flow.sub_end("g1", "l1").unwrap();
        flow.mark_aborted("g1");
        let err = flow.sub_begin("g1", "l2").unwrap_err();
        assert_eq!(err, ProtocolError::Aborted("g1".into()));
    }

    #[test]
    fn test_compensation_runs_in_reverse_completion_order() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        for local in ["l1", "l2", "l3"] {
            flow.sub_begin("g1", local).unwrap();
            flow.sub_end("g1", local).unwrap();
        }
        flow.mark_aborted("g1");
        assert_eq!(flow.compensation_order("g1"), vec!["l3", "l2", "l1"]);
    }

    #[test]
    fn test_retried_transitions_are_idempotent() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.begin("g1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        flow.sub_end("g1", "l1").unwrap();
        flow.sub_end("g1", "l1").unwrap();
        flow.end("g1").unwrap();
        flow.end("g1").unwrap();
    }

    #[test]
    fn test_restarting_an_ended_sub_is_rejected() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        flow.sub_end("g1", "l1").unwrap();
        let err = flow.sub_begin("g1", "l1").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::AlreadyEnded {
                global: "g1".into(),
                local: "l1".into()
            }
        );
    }

    #[test]
    fn test_end_with_open_subs_is_rejected() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.sub_begin("g1", "l1").unwrap();
        let err = flow.end("g1").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::OpenSubTransactions {
                global: "g1".into(),
                open: 1
            }
        );
    }

    #[test]
    fn test_forget_drops_state() {
        let flow = SagaFlow::new();
        flow.begin("g1").unwrap();
        flow.end("g1").unwrap();
        flow.forget("g1");
        assert!(flow.compensation_order("g1").is_empty());
        // a forgotten id behaves like a never-started transaction
        let err = flow.sub_begin("g1", "l1").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownTransaction("g1".into()));
    }

    #[test]
    fn test_event_field_validation() {
        assert!(SagaStartedEvent::new("").validate().is_err());
        assert!(
            SubTxStartedEvent::new("g1", "", "compensate", serde_json::json!([]))
                .validate()
                .is_err()
        );
        assert!(SubTxEndedEvent::new("g1", "l1").validate().is_ok());
    }
}
