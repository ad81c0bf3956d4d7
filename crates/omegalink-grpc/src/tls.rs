//! TLS negotiation profile and client TLS assembly
//!
//! The profile (protocol and cipher lists) is read from a properties-format
//! resource shared by every TLS-enabled connection in a cluster; a bundled
//! default ships with the crate. Trust-anchor and mutual-auth material come
//! from filesystem paths in the cluster configuration. Everything here runs
//! at construction time and fails fast with a [`ConfigError`]; runtime
//! connectivity problems are a different path entirely.

use std::fs;
use std::path::Path;

use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::{debug, info};

use crate::cluster::AlphaClusterConfig;
use crate::error::ConfigError;

const BUNDLED_PROFILE: &str = include_str!("../resources/tls.properties");

/// Protocol and cipher lists applied to every TLS-enabled connection.
///
/// Suite negotiation itself is owned by the rustls-backed client; the
/// profile is validated here so a broken resource stops startup instead of
/// surfacing as connect-time noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsProfile {
    /// Accepted protocol versions, preference order.
    pub protocols: Vec<String>,
    /// Accepted cipher suites, preference order.
    pub ciphers: Vec<String>,
}

impl TlsProfile {
    /// Parse a properties-format profile (`protocols=...`, `ciphers=...`,
    /// comma-separated values).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TlsProfile`] when either key is missing or
    /// empty.
    pub fn from_properties(text: &str) -> Result<Self, ConfigError> {
        let mut protocols = None;
        let mut ciphers = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::TlsProfile(format!(
                    "expected `key=value`, got `{line}`"
                )));
            };
            let values: Vec<String> = value
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            match key.trim() {
                "protocols" => protocols = Some(values),
                "ciphers" => ciphers = Some(values),
                other => {
                    return Err(ConfigError::TlsProfile(format!("unknown key `{other}`")));
                }
            }
        }
        let protocols =
            protocols.ok_or_else(|| ConfigError::TlsProfile("missing `protocols`".into()))?;
        let ciphers =
            ciphers.ok_or_else(|| ConfigError::TlsProfile("missing `ciphers`".into()))?;
        if protocols.is_empty() {
            return Err(ConfigError::TlsProfile("`protocols` is empty".into()));
        }
        if ciphers.is_empty() {
            return Err(ConfigError::TlsProfile("`ciphers` is empty".into()));
        }
        Ok(Self { protocols, ciphers })
    }

    /// Load a profile from a properties file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TlsMaterial`] when the file cannot be read
    /// and [`ConfigError::TlsProfile`] when its content is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_properties(&text)
    }

    /// The profile bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TlsProfile`] if the bundled resource is
    /// malformed.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_properties(BUNDLED_PROFILE)
    }
}

/// Build the client TLS configuration for a cluster, or `None` when TLS is
/// disabled.
///
/// # Errors
///
/// Fails fast with a [`ConfigError`] when the profile is malformed or any
/// required material cannot be read.
pub(crate) fn build_client_tls(
    cluster: &AlphaClusterConfig,
) -> Result<Option<ClientTlsConfig>, ConfigError> {
    if !cluster.enable_ssl() {
        return Ok(None);
    }

    let profile = match cluster.tls_profile_path() {
        Some(path) => TlsProfile::from_file(path)?,
        None => TlsProfile::bundled()?,
    };
    info!(
        protocols = ?profile.protocols,
        ciphers = profile.ciphers.len(),
        "TLS profile loaded"
    );

    let chain_path = cluster
        .cert_chain()
        .ok_or(ConfigError::MissingTlsMaterial("cert_chain"))?;
    let chain = read_material(chain_path)?;
    let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(chain));

    if cluster.enable_mutual_auth() {
        let cert_path = cluster
            .cert()
            .ok_or(ConfigError::MissingTlsMaterial("cert"))?;
        let key_path = cluster.key().ok_or(ConfigError::MissingTlsMaterial("key"))?;
        let cert = read_material(cert_path)?;
        let key = read_material(key_path)?;
        tls = tls.identity(Identity::from_pem(cert, key));
        debug!("client identity attached for mutual authentication");
    }

    Ok(Some(tls))
}

fn read_material(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_profile_parses() {
        let profile = TlsProfile::bundled().unwrap();
        assert!(profile.protocols.contains(&"TLSv1.3".to_string()));
        assert!(!profile.ciphers.is_empty());
    }

    #[test]
    fn test_profile_requires_both_keys() {
        let err = TlsProfile::from_properties("protocols=TLSv1.3").unwrap_err();
        assert!(matches!(err, ConfigError::TlsProfile(_)));
        let err = TlsProfile::from_properties("ciphers=X").unwrap_err();
        assert!(matches!(err, ConfigError::TlsProfile(_)));
    }

    #[test]
    fn test_profile_rejects_unknown_keys_and_garbage() {
        let err = TlsProfile::from_properties("protocol=TLSv1.3\nciphers=X").unwrap_err();
        assert!(matches!(err, ConfigError::TlsProfile(_)));
        let err = TlsProfile::from_properties("no equals sign").unwrap_err();
        assert!(matches!(err, ConfigError::TlsProfile(_)));
    }

    #[test]
    fn test_profile_trims_and_drops_empty_entries() {
        let profile =
            TlsProfile::from_properties("protocols= TLSv1.3 , TLSv1.2 ,\nciphers=A, B").unwrap();
        assert_eq!(profile.protocols, vec!["TLSv1.3", "TLSv1.2"]);
        assert_eq!(profile.ciphers, vec!["A", "B"]);
    }

    #[test]
    fn test_missing_profile_file_is_a_config_error() {
        let err = TlsProfile::from_file(Path::new("/nonexistent/tls.properties")).unwrap_err();
        assert!(matches!(err, ConfigError::TlsMaterial { .. }));
    }
}
