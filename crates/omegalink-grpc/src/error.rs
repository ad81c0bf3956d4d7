//! Error types for the gRPC connector
//!
//! The taxonomy deliberately splits fatal startup problems from recoverable
//! runtime ones:
//!
//! - [`ConfigError`]: construction-time failures (empty cluster, unreadable
//!   TLS material). Surfaced immediately, never retried.
//! - [`DeliveryError`]: runtime transport failures. The sender is marked
//!   unhealthy and the caller may retry against a different sender from a
//!   fresh `select_sender()` call; the health monitor reconnects in the
//!   background.
//! - [`SendError`]: what a lifecycle-event call returns, either a local
//!   protocol violation or a delivery failure. An abort decision is *not*
//!   an error; it arrives as a normal `AlphaResponse`.

use std::path::PathBuf;

use thiserror::Error;

use omegalink_core::ProtocolError;

/// Result type for lifecycle-event calls.
pub type SendResult<T> = Result<T, SendError>;

/// Fatal configuration problem detected while building a cluster.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The cluster configuration named no coordinator address.
    #[error("alpha cluster requires at least one coordinator address")]
    EmptyCluster,

    /// An address could not be turned into a channel endpoint.
    #[error("invalid coordinator address `{address}`: {reason}")]
    InvalidAddress {
        /// The offending address string.
        address: String,
        /// Why the endpoint could not be built.
        reason: String,
    },

    /// TLS material could not be read from disk.
    #[error("unable to read TLS material at {path}: {source}")]
    TlsMaterial {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A required TLS file path is absent from the configuration.
    #[error("missing TLS material: {0}")]
    MissingTlsMaterial(&'static str),

    /// The TLS negotiation profile resource is malformed.
    #[error("malformed TLS profile: {0}")]
    TlsProfile(String),

    /// Mutual authentication was requested without TLS.
    #[error("mutual authentication requires TLS to be enabled")]
    MutualAuthRequiresSsl,

    /// A cluster was handed to a connector of the other transaction type.
    #[error("cluster is configured for {configured:?} transactions, not {requested:?}")]
    TransactionTypeMismatch {
        /// Type carried by the cluster configuration.
        configured: omegalink_core::TransactionType,
        /// Type the connector was asked to build.
        requested: omegalink_core::TransactionType,
    },
}

/// Recoverable failure to deliver an event to a coordinator.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport connection could not be established or broke.
    #[error("transport failure to {target}: {source}")]
    Transport {
        /// Address of the sender that failed.
        target: String,
        /// Underlying tonic transport error.
        #[source]
        source: tonic::transport::Error,
    },

    /// The coordinator call returned a non-OK gRPC status.
    #[error("coordinator call to {target} failed: {status}")]
    Rpc {
        /// Address of the sender that failed.
        target: String,
        /// The gRPC status the call ended with.
        status: tonic::Status,
    },

    /// The call or reconnection attempt exceeded its deadline.
    #[error("call to {target} exceeded its deadline")]
    Timeout {
        /// Address of the sender that failed.
        target: String,
    },

    /// The sender was closed by cluster shutdown.
    #[error("sender for {target} is closed")]
    Closed {
        /// Address of the closed sender.
        target: String,
    },
}

impl DeliveryError {
    /// Address of the sender the failure belongs to.
    pub fn target(&self) -> &str {
        match self {
            Self::Transport { target, .. }
            | Self::Rpc { target, .. }
            | Self::Timeout { target }
            | Self::Closed { target } => target,
        }
    }

    /// Classify a gRPC status into a delivery error.
    pub(crate) fn from_status(target: String, status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => Self::Timeout { target },
            _ => Self::Rpc { target, status },
        }
    }
}

/// Failure of a single lifecycle-event call.
#[derive(Debug, Error)]
pub enum SendError {
    /// The event was rejected locally, before transmission.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The event could not be delivered; the sender was marked unhealthy.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_maps_to_timeout() {
        let err = DeliveryError::from_status(
            "alpha:8080".into(),
            tonic::Status::deadline_exceeded("too slow"),
        );
        assert!(matches!(err, DeliveryError::Timeout { .. }));
        assert_eq!(err.target(), "alpha:8080");
    }

    #[test]
    fn test_protocol_error_converts_to_send_error() {
        let err: SendError = ProtocolError::MissingField("global_tx_id").into();
        assert!(matches!(err, SendError::Protocol(_)));
    }
}
