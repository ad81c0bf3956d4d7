//! Wire contract with the alpha coordinator
//!
//! Hand-maintained `prost` mirrors of the `omegalink.v1.TxEventService`
//! contract plus a thin unary client over `tonic::client::Grpc`. Keeping
//! the messages in source (instead of a protoc build step) keeps the crate
//! buildable without a protobuf toolchain; the field tags below are the
//! contract and must not be renumbered.

use omegalink_core::{AlphaResponse, CoordinateCommand, TransactionStatus};
use tonic::transport::Channel;

/// Saga event kinds on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SagaEventKind {
    /// Global transaction started.
    Started = 0,
    /// Sub-transaction started.
    SubStarted = 1,
    /// Sub-transaction ended.
    SubEnded = 2,
    /// Sub-transaction failed.
    SubFailed = 3,
    /// Global transaction ended.
    Ended = 4,
    /// Global transaction aborted by the participant.
    Aborted = 5,
}

/// TCC event kinds on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TccEventKind {
    /// Global transaction started.
    Started = 0,
    /// Participation try phase started.
    ParticipationStarted = 1,
    /// Participation try phase ended.
    ParticipationEnded = 2,
    /// Confirm/cancel command executed.
    Coordinated = 3,
    /// Global transaction stopped.
    Ended = 4,
}

/// Transaction status on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum GrpcTxStatus {
    /// No status carried by this event kind.
    Unspecified = 0,
    /// The work succeeded.
    Succeeded = 1,
    /// The work failed.
    Failed = 2,
}

/// Coordinate directive on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum GrpcCoordinateCommand {
    /// No directive carried.
    Unspecified = 0,
    /// Confirm ended participations.
    Confirm = 1,
    /// Cancel ended participations.
    Cancel = 2,
}

/// Envelope for every saga lifecycle event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcSagaEvent {
    /// Logical name of the reporting service.
    #[prost(string, tag = "1")]
    pub service_name: String,
    /// Instance id of the reporting process.
    #[prost(string, tag = "2")]
    pub instance_id: String,
    /// Global transaction id.
    #[prost(string, tag = "3")]
    pub global_tx_id: String,
    /// Sub-transaction id; empty for global-level events.
    #[prost(string, tag = "4")]
    pub local_tx_id: String,
    /// Enclosing transaction id; empty when not nested.
    #[prost(string, tag = "5")]
    pub parent_tx_id: String,
    /// Which lifecycle event this envelope carries.
    #[prost(enumeration = "SagaEventKind", tag = "6")]
    pub kind: i32,
    /// Event creation time, milliseconds since the Unix epoch.
    #[prost(int64, tag = "7")]
    pub timestamp_ms: i64,
    /// Compensation method identity; set on sub-transaction starts.
    #[prost(string, tag = "8")]
    pub compensation_method: String,
    /// Codec-encoded compensation arguments.
    #[prost(bytes = "vec", tag = "9")]
    pub payload: Vec<u8>,
    /// Failure/abort cause; set on failed and aborted events.
    #[prost(string, tag = "10")]
    pub cause: String,
}

/// Envelope for every TCC lifecycle event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcTccEvent {
    /// Logical name of the reporting service.
    #[prost(string, tag = "1")]
    pub service_name: String,
    /// Instance id of the reporting process.
    #[prost(string, tag = "2")]
    pub instance_id: String,
    /// Global transaction id.
    #[prost(string, tag = "3")]
    pub global_tx_id: String,
    /// Participation id; empty for global-level events.
    #[prost(string, tag = "4")]
    pub local_tx_id: String,
    /// Which lifecycle event this envelope carries.
    #[prost(enumeration = "TccEventKind", tag = "5")]
    pub kind: i32,
    /// Event creation time, milliseconds since the Unix epoch.
    #[prost(int64, tag = "6")]
    pub timestamp_ms: i64,
    /// Confirm method identity; set on participation starts.
    #[prost(string, tag = "7")]
    pub confirm_method: String,
    /// Cancel method identity; set on participation starts.
    #[prost(string, tag = "8")]
    pub cancel_method: String,
    /// Outcome carried by end and coordinated events.
    #[prost(enumeration = "GrpcTxStatus", tag = "9")]
    pub status: i32,
    /// Executed directive; set on coordinated events.
    #[prost(enumeration = "GrpcCoordinateCommand", tag = "10")]
    pub command: i32,
}

/// The coordinator's reply to any lifecycle event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcAck {
    /// Whether the coordinator decided the transaction must roll back.
    #[prost(bool, tag = "1")]
    pub aborted: bool,
    /// Commit/cancel directive for TCC participations.
    #[prost(enumeration = "GrpcCoordinateCommand", tag = "2")]
    pub directive: i32,
}

impl GrpcAck {
    /// Translate the wire reply into the caller-facing response.
    pub fn into_response(self) -> AlphaResponse {
        let directive = match GrpcCoordinateCommand::try_from(self.directive) {
            Ok(GrpcCoordinateCommand::Confirm) => Some(CoordinateCommand::Confirm),
            Ok(GrpcCoordinateCommand::Cancel) => Some(CoordinateCommand::Cancel),
            _ => None,
        };
        AlphaResponse {
            aborted: self.aborted,
            directive,
        }
    }
}

impl From<TransactionStatus> for GrpcTxStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Succeeded => Self::Succeeded,
            TransactionStatus::Failed => Self::Failed,
        }
    }
}

impl From<CoordinateCommand> for GrpcCoordinateCommand {
    fn from(command: CoordinateCommand) -> Self {
        match command {
            CoordinateCommand::Confirm => Self::Confirm,
            CoordinateCommand::Cancel => Self::Cancel,
        }
    }
}

/// Unary client for `omegalink.v1.TxEventService`.
#[derive(Debug, Clone)]
pub struct TxEventServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl TxEventServiceClient {
    /// Wrap an established (possibly lazy) channel.
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Report a saga lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns the gRPC status when the channel is not ready or the
    /// coordinator rejects the call.
    pub async fn on_saga_event(
        &mut self,
        request: tonic::Request<GrpcSagaEvent>,
    ) -> Result<tonic::Response<GrpcAck>, tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unavailable(format!("connection not ready: {e}"))
        })?;
        let codec: tonic_prost::ProstCodec<GrpcSagaEvent, GrpcAck> =
            tonic_prost::ProstCodec::default();
        let path =
            http::uri::PathAndQuery::from_static("/omegalink.v1.TxEventService/OnSagaEvent");
        self.inner.unary(request, path, codec).await
    }

    /// Report a TCC lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns the gRPC status when the channel is not ready or the
    /// coordinator rejects the call.
    pub async fn on_tcc_event(
        &mut self,
        request: tonic::Request<GrpcTccEvent>,
    ) -> Result<tonic::Response<GrpcAck>, tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unavailable(format!("connection not ready: {e}"))
        })?;
        let codec: tonic_prost::ProstCodec<GrpcTccEvent, GrpcAck> =
            tonic_prost::ProstCodec::default();
        let path =
            http::uri::PathAndQuery::from_static("/omegalink.v1.TxEventService/OnTccEvent");
        self.inner.unary(request, path, codec).await
    }
}
