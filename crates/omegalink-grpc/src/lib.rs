//! Omegalink gRPC Connector
//!
//! Resilient multi-endpoint delivery of Saga/TCC lifecycle events to a
//! cluster of alpha coordinators. Built on [tonic](https://github.com/hyperium/tonic)
//! for async/await support and full HTTP/2 capabilities.
//!
//! # Features
//!
//! - **Sender pool**: one channel and one sender per coordinator address,
//!   selected by health so events travel through a working connection
//! - **Health monitor**: background reconnection with a configurable quiet
//!   period and per-attempt timeout
//! - **Fail-fast construction**: empty clusters and unreadable TLS material
//!   stop startup; runtime connectivity problems never do
//! - **TLS**: optional rustls-backed TLS with mutual authentication
//!
//! # Quick Start
//!
//! ```ignore
//! use omegalink_core::{saga::SagaStartedEvent, ServiceConfig, TransactionType};
//! use omegalink_grpc::{saga_cluster, AlphaClusterConfig, ConnectorOptions};
//!
//! let cluster = AlphaClusterConfig::builder(TransactionType::Saga)
//!     .addresses(["alpha-1:8080", "alpha-2:8080"])
//!     .build()?;
//! let context = saga_cluster(
//!     &cluster,
//!     &ServiceConfig::new("payment"),
//!     &ConnectorOptions::default(),
//! )?;
//!
//! let sender = context.select_sender();
//! let response = sender.begin_transaction(SagaStartedEvent::new("g1")).await?;
//! if response.aborted {
//!     // run local compensation; do not re-send the event
//! }
//! ```
//!
//! On a delivery error the failed sender is already marked unhealthy;
//! calling `select_sender()` again yields the next-best endpoint while the
//! monitor repairs the broken one in the background.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod cluster;
pub mod error;
pub mod health;
pub mod load_balance;
pub mod pool;
pub mod proto;
pub mod sender;
pub mod tls;

// Re-exports for convenience
pub use channel::ChannelFactory;
pub use cluster::{AlphaClusterConfig, AlphaClusterConfigBuilder};
pub use error::{ConfigError, DeliveryError, SendError, SendResult};
pub use health::{HealthMonitor, HealthMonitorConfig};
pub use load_balance::{
    connect, saga_cluster, tcc_cluster, ConnectorOptions, LoadBalanceContext, TransactionCluster,
};
pub use pool::{SenderHealth, SenderPool};
pub use sender::{GrpcSagaSender, GrpcTccSender, ManagedSender};
pub use tls::TlsProfile;
