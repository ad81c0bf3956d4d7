//! Protocol-level errors
//!
//! A [`ProtocolError`] is raised locally, before an event reaches the wire:
//! a malformed event or an out-of-order lifecycle transition is never sent.
//! Delivery problems are a separate taxonomy owned by the connector crates.

use thiserror::Error;

/// Result type for protocol validation.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A locally detected protocol violation. Never retried by this layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A required correlation field was empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// An event referenced a global transaction that was never started.
    #[error("unknown global transaction {0}")]
    UnknownTransaction(String),

    /// An end/fail event arrived for a sub-transaction or participation
    /// that never received its start event.
    #[error("{local} was never started within transaction {global}")]
    NotStarted {
        /// Global transaction id the event referenced.
        global: String,
        /// Local id that has no recorded start.
        local: String,
    },

    /// A start event arrived for a sub-transaction that already completed.
    #[error("{local} already completed within transaction {global}")]
    AlreadyEnded {
        /// Global transaction id the event referenced.
        global: String,
        /// Local id that already ran to completion.
        local: String,
    },

    /// The global transaction was aborted; no further work may start.
    #[error("global transaction {0} is aborted")]
    Aborted(String),

    /// The global transaction already finished.
    #[error("global transaction {0} already completed")]
    Completed(String),

    /// A transaction-end event arrived while sub-transactions are open.
    #[error("global transaction {global} still has {open} open sub-transactions")]
    OpenSubTransactions {
        /// Global transaction id the event referenced.
        global: String,
        /// Number of sub-transactions without an end or fail event.
        open: usize,
    },

    /// The payload codec rejected the event payload.
    #[error("payload codec error: {0}")]
    Codec(String),
}

impl ProtocolError {
    /// Create a codec error from any displayable cause.
    pub fn codec(cause: impl std::fmt::Display) -> Self {
        Self::Codec(cause.to_string())
    }
}

/// Reject empty correlation fields before an event is transmitted.
pub(crate) fn require(field: &'static str, value: &str) -> ProtocolResult<()> {
    if value.is_empty() {
        return Err(ProtocolError::MissingField(field));
    }
    Ok(())
}
