//! TCC-flavored sender

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::{debug, warn};

use omegalink_core::tcc::{
    CoordinatedEvent, ParticipationEndedEvent, ParticipationStartedEvent, TccEndedEvent,
    TccStartedEvent,
};
use omegalink_core::{AlphaResponse, ServiceConfig, TccFlow};

use crate::channel::ChannelFactory;
use crate::error::{DeliveryError, SendResult};
use crate::pool::SenderHealth;
use crate::proto::{GrpcCoordinateCommand, GrpcTccEvent, GrpcTxStatus, TccEventKind};
use crate::sender::{epoch_millis, ManagedSender, SenderConnection};

/// Reports TCC lifecycle events to one coordinator address.
///
/// The confirm/cancel decision is coordinator-owned; this sender only
/// reports try-phase progress and the completion of coordinated methods.
/// Validation mirrors the saga flavor: malformed or out-of-order events are
/// rejected before transmission, delivery failures mark the sender
/// unhealthy and are never retried internally.
pub struct GrpcTccSender {
    conn: SenderConnection,
    service: Arc<ServiceConfig>,
    flow: Arc<TccFlow>,
}

impl GrpcTccSender {
    pub(crate) fn new(
        target: String,
        channel: Channel,
        factory: Arc<ChannelFactory>,
        service: Arc<ServiceConfig>,
        flow: Arc<TccFlow>,
    ) -> Self {
        Self {
            conn: SenderConnection::new(target, channel, factory),
            service,
            flow,
        }
    }

    /// Report the start of a global TCC transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn transaction_start(&self, event: TccStartedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.begin(&event.global_tx_id)?;
        let wire = self.envelope(TccEventKind::Started, &event.global_tx_id, event.timestamp);
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report that a participation entered its try phase.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn participation_start(
        &self,
        event: ParticipationStartedEvent,
    ) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow
            .participation_begin(&event.global_tx_id, &event.local_tx_id)?;
        let mut wire = self.envelope(
            TccEventKind::ParticipationStarted,
            &event.global_tx_id,
            event.timestamp,
        );
        wire.local_tx_id = event.local_tx_id;
        wire.confirm_method = event.confirm_method;
        wire.cancel_method = event.cancel_method;
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report that a participation finished its try phase.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn participation_end(
        &self,
        event: ParticipationEndedEvent,
    ) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow
            .participation_end(&event.global_tx_id, &event.local_tx_id, event.status)?;
        let mut wire = self.envelope(
            TccEventKind::ParticipationEnded,
            &event.global_tx_id,
            event.timestamp,
        );
        wire.local_tx_id = event.local_tx_id;
        wire.status = GrpcTxStatus::from(event.status) as i32;
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report completion of a confirm/cancel command.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn coordinate(&self, event: CoordinatedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow
            .coordinate(&event.global_tx_id, &event.local_tx_id)?;
        let mut wire = self.envelope(
            TccEventKind::Coordinated,
            &event.global_tx_id,
            event.timestamp,
        );
        wire.local_tx_id = event.local_tx_id;
        wire.status = GrpcTxStatus::from(event.status) as i32;
        wire.command = GrpcCoordinateCommand::from(event.command) as i32;
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// Report the end of the global TCC transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SendError`] on local validation failure or
    /// delivery failure.
    pub async fn transaction_stop(&self, event: TccEndedEvent) -> SendResult<AlphaResponse> {
        event.validate()?;
        self.flow.stop(&event.global_tx_id)?;
        let mut wire = self.envelope(TccEventKind::Ended, &event.global_tx_id, event.timestamp);
        wire.status = GrpcTxStatus::from(event.status) as i32;
        self.dispatch(&event.global_tx_id, wire).await
    }

    /// The ordering guard shared by every sender of this cluster.
    pub fn flow(&self) -> &Arc<TccFlow> {
        &self.flow
    }

    fn envelope(&self, kind: TccEventKind, global: &str, timestamp: SystemTime) -> GrpcTccEvent {
        GrpcTccEvent {
            service_name: self.service.service_name.clone(),
            instance_id: self.service.instance_id.clone(),
            global_tx_id: global.to_string(),
            kind: kind as i32,
            timestamp_ms: epoch_millis(timestamp),
            ..GrpcTccEvent::default()
        }
    }

    async fn dispatch(&self, global: &str, event: GrpcTccEvent) -> SendResult<AlphaResponse> {
        if self.conn.is_closed() {
            return Err(DeliveryError::Closed {
                target: self.conn.target().to_string(),
            }
            .into());
        }
        let mut client = self.conn.client();
        match client.on_tcc_event(tonic::Request::new(event)).await {
            Ok(reply) => {
                self.conn.health().record_success();
                let response = reply.into_inner().into_response();
                if response.aborted {
                    // a cancel decision blocks further participation starts
                    self.flow.mark_aborted(global);
                    debug!(
                        global,
                        target = self.conn.target(),
                        "coordinator signalled cancel"
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
                    "tcc event delivery failed"
                );
                Err(DeliveryError::from_status(self.conn.target().to_string(), status).into())
            }
        }
    }
}

#[async_trait]
impl ManagedSender for GrpcTccSender {
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
