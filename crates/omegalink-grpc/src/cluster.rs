//! Alpha cluster configuration
//!
//! Immutable description of a coordinator cluster: the ordered address
//! list, the transaction type it reports, TLS settings and the payload
//! codec. Built once through [`AlphaClusterConfig::builder`]; every
//! validation failure is a fatal [`ConfigError`] at construction time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use omegalink_core::{JsonPayloadCodec, PayloadCodec, TransactionType};

use crate::error::ConfigError;

/// Immutable coordinator-cluster description.
#[derive(Clone)]
pub struct AlphaClusterConfig {
    addresses: Vec<String>,
    transaction_type: TransactionType,
    enable_ssl: bool,
    enable_mutual_auth: bool,
    cert_chain: Option<PathBuf>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    tls_profile: Option<PathBuf>,
    payload_codec: Arc<dyn PayloadCodec>,
}

impl AlphaClusterConfig {
    /// Start building a cluster configuration for one transaction type.
    pub fn builder(transaction_type: TransactionType) -> AlphaClusterConfigBuilder {
        AlphaClusterConfigBuilder {
            addresses: Vec::new(),
            transaction_type,
            enable_ssl: false,
            enable_mutual_auth: false,
            cert_chain: None,
            cert: None,
            key: None,
            tls_profile: None,
            payload_codec: None,
        }
    }

    /// Ordered coordinator addresses (`host:port`).
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// The transaction pattern this cluster reports.
    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    /// Whether connections are TLS-negotiated.
    pub fn enable_ssl(&self) -> bool {
        self.enable_ssl
    }

    /// Whether a client identity is presented during the handshake.
    pub fn enable_mutual_auth(&self) -> bool {
        self.enable_mutual_auth
    }

    /// Trust-anchor file, present when TLS is enabled.
    pub fn cert_chain(&self) -> Option<&Path> {
        self.cert_chain.as_deref()
    }

    /// Client certificate file, present when mutual auth is enabled.
    pub fn cert(&self) -> Option<&Path> {
        self.cert.as_deref()
    }

    /// Client key file, present when mutual auth is enabled.
    pub fn key(&self) -> Option<&Path> {
        self.key.as_deref()
    }

    /// Optional override for the bundled TLS negotiation profile.
    pub fn tls_profile_path(&self) -> Option<&Path> {
        self.tls_profile.as_deref()
    }

    /// The payload serializer/deserializer pair for this cluster.
    pub fn payload_codec(&self) -> Arc<dyn PayloadCodec> {
        self.payload_codec.clone()
    }
}

impl fmt::Debug for AlphaClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlphaClusterConfig")
            .field("addresses", &self.addresses)
            .field("transaction_type", &self.transaction_type)
            .field("enable_ssl", &self.enable_ssl)
            .field("enable_mutual_auth", &self.enable_mutual_auth)
            .field("cert_chain", &self.cert_chain)
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("tls_profile", &self.tls_profile)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AlphaClusterConfig`].
pub struct AlphaClusterConfigBuilder {
    addresses: Vec<String>,
    transaction_type: TransactionType,
    enable_ssl: bool,
    enable_mutual_auth: bool,
    cert_chain: Option<PathBuf>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    tls_profile: Option<PathBuf>,
    payload_codec: Option<Arc<dyn PayloadCodec>>,
}

impl AlphaClusterConfigBuilder {
    /// Add one coordinator address (`host:port`).
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Add several coordinator addresses.
    #[must_use]
    pub fn addresses<I, T>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.addresses.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Enable TLS with the given trust-anchor file.
    #[must_use]
    pub fn ssl(mut self, cert_chain: impl Into<PathBuf>) -> Self {
        self.enable_ssl = true;
        self.cert_chain = Some(cert_chain.into());
        self
    }

    /// Enable mutual authentication with the given client cert/key pair.
    #[must_use]
    pub fn mutual_auth(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.enable_mutual_auth = true;
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Override the bundled TLS negotiation profile with a file on disk.
    #[must_use]
    pub fn tls_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_profile = Some(path.into());
        self
    }

    /// Replace the default JSON payload codec.
    #[must_use]
    pub fn payload_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.payload_codec = Some(codec);
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when no address was supplied, an address
    /// is blank, mutual auth was requested without TLS, or required TLS
    /// paths are missing.
    pub fn build(self) -> Result<AlphaClusterConfig, ConfigError> {
        if self.addresses.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        for address in &self.addresses {
            if address.trim().is_empty() {
                return Err(ConfigError::InvalidAddress {
                    address: address.clone(),
                    reason: "blank address".into(),
                });
            }
        }
        if self.enable_mutual_auth && !self.enable_ssl {
            return Err(ConfigError::MutualAuthRequiresSsl);
        }
        if self.enable_ssl && self.cert_chain.is_none() {
            return Err(ConfigError::MissingTlsMaterial("cert_chain"));
        }
        if self.enable_mutual_auth {
            if self.cert.is_none() {
                return Err(ConfigError::MissingTlsMaterial("cert"));
            }
            if self.key.is_none() {
                return Err(ConfigError::MissingTlsMaterial("key"));
            }
        }
        Ok(AlphaClusterConfig {
            addresses: self.addresses,
            transaction_type: self.transaction_type,
            enable_ssl: self.enable_ssl,
            enable_mutual_auth: self.enable_mutual_auth,
            cert_chain: self.cert_chain,
            cert: self.cert,
            key: self.key,
            tls_profile: self.tls_profile,
            payload_codec: self
                .payload_codec
                .unwrap_or_else(|| Arc::new(JsonPayloadCodec)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cluster_is_rejected() {
        let err = AlphaClusterConfig::builder(TransactionType::Saga)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCluster));
    }

    #[test]
    fn test_blank_address_is_rejected() {
        let err = AlphaClusterConfig::builder(TransactionType::Saga)
            .address("  ")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_mutual_auth_requires_ssl() {
        let err = AlphaClusterConfig::builder(TransactionType::Tcc)
            .address("alpha:8080")
            .mutual_auth("client.crt", "client.key")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MutualAuthRequiresSsl));
    }

    #[test]
    fn test_address_order_is_preserved() {
        let config = AlphaClusterConfig::builder(TransactionType::Saga)
            .addresses(["alpha-1:8080", "alpha-2:8080"])
            .address("alpha-3:8080")
            .build()
            .unwrap();
        assert_eq!(
            config.addresses(),
            ["alpha-1:8080", "alpha-2:8080", "alpha-3:8080"]
        );
        assert!(!config.enable_ssl());
    }
}
