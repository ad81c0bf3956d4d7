//! Message senders
//!
//! One sender per coordinator address, one transaction flavor per cluster.
//! Both flavors share the connection-ownership and failure-reporting
//! contract the pool and the health monitor operate against: a sender is
//! bound to its address for life, reports call outcomes into its health
//! record, and can be asked to re-establish its channel.

mod saga;
mod tcc;

pub use saga::GrpcSagaSender;
pub use tcc::GrpcTccSender;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::info;

use crate::channel::ChannelFactory;
use crate::error::DeliveryError;
use crate::pool::SenderHealth;
use crate::proto::TxEventServiceClient;

/// Contract every pooled sender fulfils, independent of transaction flavor.
#[async_trait]
pub trait ManagedSender: Send + Sync + 'static {
    /// The coordinator address this sender is bound to. A sender is never
    /// re-pointed elsewhere; its address is its identity.
    fn target(&self) -> &str;

    /// The health record the pool and health monitor read and update.
    fn health(&self) -> &SenderHealth;

    /// Establish a fresh channel to the same address, replacing the old
    /// one on success.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the sender is closed or the
    /// coordinator cannot be reached.
    async fn reconnect(&self) -> Result<(), DeliveryError>;

    /// Permanently close the sender; subsequent calls and reconnections
    /// fail with [`DeliveryError::Closed`].
    fn close(&self);
}

/// Channel ownership shared by both sender flavors.
pub(crate) struct SenderConnection {
    target: String,
    channel: ArcSwap<Channel>,
    factory: Arc<ChannelFactory>,
    health: SenderHealth,
    closed: AtomicBool,
}

impl SenderConnection {
    pub(crate) fn new(target: String, channel: Channel, factory: Arc<ChannelFactory>) -> Self {
        Self {
            target,
            channel: ArcSwap::from_pointee(channel),
            factory,
            health: SenderHealth::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn health(&self) -> &SenderHealth {
        &self.health
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// A client over the current channel. Channels are cheap handles; the
    /// underlying HTTP/2 connection is shared.
    pub(crate) fn client(&self) -> TxEventServiceClient {
        TxEventServiceClient::new(self.channel.load().as_ref().clone())
    }

    pub(crate) async fn reconnect(&self) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed {
                target: self.target.clone(),
            });
        }
        let fresh = self.factory.open(&self.target).await?;
        self.channel.store(Arc::new(fresh));
        info!(target = self.target.as_str(), "channel re-established");
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Milliseconds since the Unix epoch for the wire envelope.
pub(crate) fn epoch_millis(timestamp: SystemTime) -> i64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or_default()
}
