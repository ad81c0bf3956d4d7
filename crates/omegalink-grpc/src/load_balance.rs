//! Cluster assembly and load-balanced sender selection
//!
//! Builds the whole delivery stack from a cluster configuration: one
//! channel and one sender per address, a pool of fresh health records and
//! the background health monitor. The sender flavor is fixed here, once,
//! from the configured transaction type; the two flavors are mutually
//! exclusive per cluster and never switched at runtime.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use omegalink_core::{SagaFlow, ServiceConfig, TccFlow, TransactionType};

use crate::channel::ChannelFactory;
use crate::cluster::AlphaClusterConfig;
use crate::error::ConfigError;
use crate::health::{HealthMonitor, HealthMonitorConfig};
use crate::pool::SenderPool;
use crate::sender::{GrpcSagaSender, GrpcTccSender, ManagedSender};

/// Connector-wide timing and threshold knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorOptions {
    /// Minimum quiet period after a failure before reconnecting.
    pub reconnect_delay: Duration,
    /// Upper bound on one reconnection attempt.
    pub attempt_timeout: Duration,
    /// Per-call deadline for lifecycle-event RPCs.
    pub call_timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Interval between health-monitor scans.
    pub probe_interval: Duration,
    /// Failures after which a sender is considered unhealthy.
    pub failure_threshold: u32,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            probe_interval: Duration::from_secs(2),
            failure_threshold: 3,
        }
    }
}

impl ConnectorOptions {
    fn monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            probe_interval: self.probe_interval,
            reconnect_delay: self.reconnect_delay,
            attempt_timeout: self.attempt_timeout,
        }
    }
}

/// A connected cluster: the sender pool plus its health monitor.
///
/// Created once at process start, torn down once with
/// [`shutdown`](Self::shutdown); senders and channels live exactly as long
/// as this context.
pub struct LoadBalanceContext<S: ManagedSender> {
    pool: Arc<SenderPool<S>>,
    monitor: HealthMonitor,
}

impl<S: ManagedSender> std::fmt::Debug for LoadBalanceContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalanceContext")
            .finish_non_exhaustive()
    }
}

impl<S: ManagedSender> LoadBalanceContext<S> {
    /// A currently-healthy sender, best-effort when all are degraded.
    ///
    /// Safe to call concurrently from any number of tasks.
    pub fn select_sender(&self) -> Arc<S> {
        self.pool.select_sender()
    }

    /// The underlying pool, for explicit `mark_failed`/`mark_succeeded`.
    pub fn pool(&self) -> &Arc<SenderPool<S>> {
        &self.pool
    }

    /// Stop the health monitor and close every sender and channel.
    pub async fn shutdown(self) {
        self.monitor.shutdown().await;
        self.pool.close_all();
        info!("alpha cluster shut down");
    }
}

/// Connect a saga-flavored cluster. Must be called within a Tokio runtime.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the configuration carries the wrong
/// transaction type, the address list is invalid or TLS material cannot be
/// loaded.
pub fn saga_cluster(
    cluster: &AlphaClusterConfig,
    service: &ServiceConfig,
    options: &ConnectorOptions,
) -> Result<LoadBalanceContext<GrpcSagaSender>, ConfigError> {
    expect_type(cluster, TransactionType::Saga)?;
    let factory = Arc::new(ChannelFactory::new(
        cluster,
        options.connect_timeout,
        options.call_timeout,
    )?);
    let service = Arc::new(service.clone());
    let codec = cluster.payload_codec();
    let flow = Arc::new(SagaFlow::new());
    let mut senders = Vec::with_capacity(cluster.addresses().len());
    for address in cluster.addresses() {
        let channel = factory.open_lazy(address)?;
        senders.push(Arc::new(GrpcSagaSender::new(
            address.clone(),
            channel,
            factory.clone(),
            service.clone(),
            codec.clone(),
            flow.clone(),
        )));
    }
    finish(cluster, senders, options)
}

/// Connect a TCC-flavored cluster. Must be called within a Tokio runtime.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the configuration carries the wrong
/// transaction type, the address list is invalid or TLS material cannot be
/// loaded.
pub fn tcc_cluster(
    cluster: &AlphaClusterConfig,
    service: &ServiceConfig,
    options: &ConnectorOptions,
) -> Result<LoadBalanceContext<GrpcTccSender>, ConfigError> {
    expect_type(cluster, TransactionType::Tcc)?;
    let factory = Arc::new(ChannelFactory::new(
        cluster,
        options.connect_timeout,
        options.call_timeout,
    )?);
    let service = Arc::new(service.clone());
    let flow = Arc::new(TccFlow::new());
    let mut senders = Vec::with_capacity(cluster.addresses().len());
    for address in cluster.addresses() {
        let channel = factory.open_lazy(address)?;
        senders.push(Arc::new(GrpcTccSender::new(
            address.clone(),
            channel,
            factory.clone(),
            service.clone(),
            flow.clone(),
        )));
    }
    finish(cluster, senders, options)
}

/// A cluster of either flavor, selected from the configuration.
pub enum TransactionCluster {
    /// Saga-flavored cluster.
    Saga(LoadBalanceContext<GrpcSagaSender>),
    /// TCC-flavored cluster.
    Tcc(LoadBalanceContext<GrpcTccSender>),
}

impl TransactionCluster {
    /// Stop the health monitor and close every sender and channel.
    pub async fn shutdown(self) {
        match self {
            Self::Saga(ctx) => ctx.shutdown().await,
            Self::Tcc(ctx) => ctx.shutdown().await,
        }
    }
}

/// Connect a cluster of the configured transaction type. Must be called
/// within a Tokio runtime.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the address list is invalid or TLS
/// material cannot be loaded.
pub fn connect(
    cluster: &AlphaClusterConfig,
    service: &ServiceConfig,
    options: &ConnectorOptions,
) -> Result<TransactionCluster, ConfigError> {
    match cluster.transaction_type() {
        TransactionType::Saga => Ok(TransactionCluster::Saga(saga_cluster(
            cluster, service, options,
        )?)),
        TransactionType::Tcc => Ok(TransactionCluster::Tcc(tcc_cluster(
            cluster, service, options,
        )?)),
    }
}

fn expect_type(cluster: &AlphaClusterConfig, requested: TransactionType) -> Result<(), ConfigError> {
    if cluster.transaction_type() == requested {
        Ok(())
    } else {
        Err(ConfigError::TransactionTypeMismatch {
            configured: cluster.transaction_type(),
            requested,
        })
    }
}

fn finish<S: ManagedSender>(
    cluster: &AlphaClusterConfig,
    senders: Vec<Arc<S>>,
    options: &ConnectorOptions,
) -> Result<LoadBalanceContext<S>, ConfigError> {
    let pool = Arc::new(SenderPool::new(senders, options.failure_threshold)?);
    let monitor = HealthMonitor::spawn(pool.clone(), options.monitor_config());
    info!(
        addresses = cluster.addresses().len(),
        transaction_type = ?cluster.transaction_type(),
        "alpha cluster connected"
    );
    Ok(LoadBalanceContext { pool, monitor })
}
