//! Saga-flavored sender

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::{debug, warn};

use omegalink_core::saga::{
    SagaAbortedEvent, SagaEndedEvent, SagaStartedEvent, SubTxEndedEvent, SubTxFailedEvent,
    SubTxStartedEvent,
};
use omegalink_core::{AlphaResponse, PayloadCodec, SagaFlow, ServiceConfig};

use crate::channel::ChannelFactory;
use crate::error::{DeliveryError, SendResult};
use crate::pool::SenderHealth;
use crate::proto::{GrpcSagaEvent, SagaEventKind};
use crate::sender::{epoch_millis, ManagedSender, SenderConnection};

/// Reports saga lifecycle events to one coordinator address.
///
/// Every operation validates the event and its place in the transaction's
/// lifecycle before transmission; a malformed or out-of-order event never
/// reaches the wire. Transport failures mark this sender unhealthy and
/// propagate; delivery is not retried here, so the coordinator never sees
/// the same event twice.
pub struct GrpcSagaSender {
    conn: SenderConnection,
    service: Arc<ServiceConfig>,
    codec: Arc<dyn PayloadCodec>,
    flow: Arc<SagaFlow>,
}

impl GrpcSagaSender {
    pub(crate) fn new(
        target: String,
        channel: Channel,
        factory: Arc<ChannelFactory>,
        service: Arc<ServiceConfig>,
        codec: Arc<dyn PayloadCodec>,
        flow: Arc<SagaFlow>,
    ) -> Self {
        Self {
            conn: SenderConnection::new(target, channel, factory),
            service,
            codec,
            flow,
        }
    }

    /// Report the start of a global saga.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn begin_transaction(&self, event: SagaStartedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.begin(&event.global_tx_id)?;
        let wire = self.envelope(SagaEventKind::Started, &event.global_tx_id, event.timestamp);
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report the start of a compensable sub-transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure,
    /// payload-encoding failure or delivery failure.
    pub async fn begin_sub_transaction(
        &self,
        event: SubTxStartedEvent,
    ) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow
            .sub_begin(&event.global_tx_id, &event.local_tx_id)?;
        let payload = self.codec.encode(&event.payload)?;
        let mut wire = self.envelope(
            SagaEventKind::SubStarted,
            &event.global_tx_id,
            event.timestamp,
        );
        wire.local_tx_id = event.local_tx_id;
        wire.parent_tx_id = event.parent_tx_id.unwrap_or_default();
        wire.compensation_method = event.compensation_method;
        wire.payload = payload.to_vec();
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report the successful end of a sub-transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn end_sub_transaction(&self, event: SubTxEndedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.sub_end(&event.global_tx_id, &event.local_tx_id)?;
        let mut wire = self.envelope(
            SagaEventKind::SubEnded,
            &event.global_tx_id,
            event.timestamp,
        );
        wire.local_tx_id = event.local_tx_id;
        wire.parent_tx_id = event.parent_tx_id.unwrap_or_default();
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report the failure of a sub-transaction; aborts the global saga.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn fail_sub_transaction(&self, event: SubTxFailedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.sub_fail(&event.global_tx_id, &event.local_tx_id)?;
        let mut wire = self.envelope(
            SagaEventKind::SubFailed,
            &event.global_tx_id,
            event.timestamp,
        );
        wire.local_tx_id = event.local_tx_id;
        wire.parent_tx_id = event.parent_tx_id.unwrap_or_default();
        wire.cause = event.cause;
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report the successful end of the global saga.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn end_transaction(&self, event: SagaEndedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.end(&event.global_tx_id)?;
        let wire = self.envelope(SagaEventKind::Ended, &event.global_tx_id, event.timestamp);
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report a participant-initiated abort of the global saga.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn abort_transaction(&self, event: SagaAbortedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.abort(&event.global_tx_id)?;
        let mut wire = self.envelope(SagaEventKind::Aborted, &event.global_tx_id, event.timestamp);
        wire.cause = event.cause;
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// The ordering guard shared by every sender of this cluster.
    pub fn flow(&self) -> &Arc<SagaFlow> {
        &self.flow
    }

    fn envelope(&self, kind: SagaEventKind, global: &str, timestamp: SystemTime) -> GrpcSagaEvent {
        GrpcSagaEvent {
            service_name: self.service.service_name.clone(),
            instance_id: self.service.instance_id.clone(),
            global_tx_id: global.to_string(),
            kind: kind as i32,
            timestamp_ms: epoch_millis(timestamp),
            ..GrpcSagaEvent::default()
        }
    }

    async fn dispatch(&self, global: &str, event: GrpcSagaEvent) -> SendResult<AlphaResponse> {
        if self.conn.is_closed() {
            return Err(DeliveryError::Closed {
                target: self.conn.target().to_string(),
            }
            .into());
        }
        let mut client = self.conn.client();
        match client.on_saga_event(tonic::Request::new(event)).await {
            Ok(reply) => {
                self.conn.health().record_success();
                let response = reply.into_inner().into_response();
                if response.aborted {
                    // further sub-transaction starts for this id are now
                    // rejected locally
                    self.flow.mark_aborted(global);
                    debug!(
                        global,
                        target = self.conn.target(),
                        "coordinator signalled abort"
                    );
                }
                Ok(response)
            }
            Err(status) => {
                self.conn.health().record_failure();
                warn!(
                    global,
                    target = self.conn.target(),
                    code = ?status.code(),
                    "saga event delivery failed"
                );
                Err(DeliveryError::from_status(self.conn.target().to_string(), status).into())
            }
        }
    }
}

#[async_trait]
impl ManagedSender for GrpcSagaSender {
    fn target(&self) -> &str {
        self.conn.target()
    }

    fn health(&self) -> &SenderHealth {
        self.conn.health()
    }

    async fn reconnect(&self) -> Result<(), DeliveryError> {
        self.conn.reconnect().await
    }

    fn close(&self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::AlphaClusterConfig;
    use crate::error::SendError;
    use omegalink_core::{JsonPayloadCodec, ProtocolError, TransactionType};
    use serde_json::json;
    use std::time::Duration;

    fn sender() -> GrpcSagaSender {
        let cluster = AlphaClusterConfig::builder(TransactionType::Saga)
            .address("127.0.0.1:1")
            .build()
            .unwrap();
        let factory = Arc::new(
            ChannelFactory::new(&cluster, Duration::from_secs(1), Duration::from_secs(1)).unwrap(),
        );
        let channel = factory.open_lazy("127.0.0.1:1").unwrap();
        GrpcSagaSender::new(
            "127.0.0.1:1".into(),
            channel,
            factory,
            Arc::new(ServiceConfig::new("test-service")),
            Arc::new(JsonPayloadCodec),
            Arc::new(SagaFlow::new()),
        )
    }

    // validation failures must surface before any I/O is attempted

    #[tokio::test]
    async fn test_empty_global_id_is_rejected_locally() {
        let sender = sender();
        let err = sender
            .begin_transaction(SagaStartedEvent::new(""))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SendError::Protocol(ProtocolError::MissingField("global_tx_id"))
        ));
        assert_eq!(sender.health().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_sub_end_without_start_is_rejected_locally() {
        let sender = sender();
        let err = sender
            .end_sub_transaction(SubTxEndedEvent::new("g1", "l1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SendError::Protocol(ProtocolError::UnknownTransaction(_))
        ));
        assert_eq!(sender.health().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_sub_start_after_local_abort_is_rejected() {
        let sender = sender();
        sender.flow().begin("g1").unwrap();
        sender.flow().mark_aborted("g1");
        let err = sender
            .begin_sub_transaction(SubTxStartedEvent::new("g1", "l1", "compensate", json!([])))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SendError::Protocol(ProtocolError::Aborted(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_sender_refuses_calls() {
        let sender = sender();
        sender.close();
        let err = sender
            .begin_transaction(SagaStartedEvent::new("g1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SendError::Delivery(DeliveryError::Closed { .. })
        ));
    }
}
