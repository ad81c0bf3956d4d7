//! Service identity and transaction-type selection

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The transaction pattern a cluster reports.
///
/// A cluster reports exactly one pattern; the flavor is fixed when the
/// connector is built and never switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Compensation-based long-lived transactions.
    Saga,
    /// Try-Confirm-Cancel transactions.
    Tcc,
}

/// Identity of the reporting service instance.
///
/// Shared read-only by every sender in a cluster; the coordinator uses it
/// to correlate events with the participant that emitted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Logical service name, stable across instances.
    pub service_name: String,
    /// Unique id of this process instance.
    pub instance_id: String,
}

impl ServiceConfig {
    /// Create an identity with a generated instance id (`<name>-<uuid>`).
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let instance_id = format!("{service_name}-{}", Uuid::new_v4());
        Self {
            service_name,
            instance_id,
        }
    }

    /// Create an identity with an explicit instance id.
    pub fn with_instance_id(
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            instance_id: instance_id.into(),
        }
    }
}
