//! Channel factory
//!
//! Turns one coordinator address into one transport channel, plaintext or
//! TLS-negotiated. Endpoint construction and TLS assembly are startup-time
//! fatal ([`ConfigError`]); actually reaching the coordinator is not: the
//! initial channels are lazy and connect on first use, while the health
//! monitor's explicit reconnection attempts connect eagerly so their
//! outcome is observed.

use std::time::Duration;

use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::debug;

use crate::cluster::AlphaClusterConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::tls::build_client_tls;

/// Builds one channel per coordinator address, all sharing the cluster's
/// TLS settings and timeouts.
#[derive(Debug, Clone)]
pub struct ChannelFactory {
    tls: Option<ClientTlsConfig>,
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl ChannelFactory {
    /// Assemble the factory for a cluster, loading TLS material up front.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the TLS profile or material cannot be
    /// loaded.
    pub fn new(
        cluster: &AlphaClusterConfig,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let tls = build_client_tls(cluster)?;
        Ok(Self {
            tls,
            connect_timeout,
            call_timeout,
        })
    }

    /// Create a channel that connects on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] when the address cannot be
    /// turned into an endpoint.
    pub fn open_lazy(&self, address: &str) -> Result<Channel, ConfigError> {
        let endpoint = self.endpoint(address)?;
        debug!(target = address, tls = self.tls.is_some(), "channel created");
        Ok(endpoint.connect_lazy())
    }

    /// Establish a fresh channel eagerly, observing success or failure.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the coordinator cannot be reached.
    pub async fn open(&self, address: &str) -> Result<Channel, DeliveryError> {
        let endpoint = self
            .endpoint(address)
            .map_err(|e| DeliveryError::Rpc {
                target: address.to_string(),
                status: tonic::Status::failed_precondition(e.to_string()),
            })?;
        endpoint
            .connect()
            .await
            .map_err(|source| DeliveryError::Transport {
                target: address.to_string(),
                source,
            })
    }

    fn endpoint(&self, address: &str) -> Result<Endpoint, ConfigError> {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        let uri = format!("{scheme}://{address}");
        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|e| ConfigError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(self.connect_timeout)
            .timeout(self.call_timeout);
        if let Some(tls) = &self.tls {
            endpoint = endpoint
                .tls_config(tls.clone())
                .map_err(|e| ConfigError::InvalidAddress {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(endpoint)
    }
}
