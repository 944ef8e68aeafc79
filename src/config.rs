//! Configuration knobs the core recognizes.
use std::time::Duration;

/// TTL applied to every operation document: seven days.
pub const OPERATION_TTL_SECONDS: i64 = 604_800;

/// Names of the containers the store addresses.
#[derive(Debug, Clone)]
pub struct ContainerNames {
    pub resources: String,
    pub subscriptions: String,
    pub locks: String,
    pub partition_keys: String,
    pub billing: String,
}

impl Default for ContainerNames {
    fn default() -> Self {
        Self {
            resources: "Resources".to_string(),
            subscriptions: "Subscriptions".to_string(),
            locks: "Locks".to_string(),
            partition_keys: "PartitionKeys".to_string(),
            billing: "Billing".to_string(),
        }
    }
}

/// Store-wide configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// The database account endpoint URL.
    pub database_endpoint: String,
    /// The logical database name within the account.
    pub database_name: String,
    /// Container names.
    pub containers: ContainerNames,
    /// Default TTL applied to new lock documents when no per-lock TTL is
    /// given. The container's own default TTL remains authoritative for
    /// expiry; this is what `AcquireLock` sends on create.
    pub default_lock_ttl: Duration,
    /// TTL applied to operation documents.
    pub operation_ttl: Duration,
}

impl StoreConfig {
    pub fn new(database_endpoint: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            database_endpoint: database_endpoint.into(),
            database_name: database_name.into(),
            containers: ContainerNames::default(),
            default_lock_ttl: Duration::from_secs(60),
            operation_ttl: Duration::from_secs(OPERATION_TTL_SECONDS as u64),
        }
    }

    /// How long a caller should wait before retrying lock acquisition,
    /// surfaced to HTTP layers translating contention into a 503 with
    /// `Retry-After`.
    pub fn lock_retry_after(&self) -> Duration {
        self.default_lock_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_container_names_match_spec() {
        let names = ContainerNames::default();
        assert_eq!(names.resources, "Resources");
        assert_eq!(names.subscriptions, "Subscriptions");
        assert_eq!(names.locks, "Locks");
        assert_eq!(names.partition_keys, "PartitionKeys");
        assert_eq!(names.billing, "Billing");
    }

    #[test]
    fn operation_ttl_is_seven_days() {
        let cfg = StoreConfig::new("https://example", "db");
        assert_eq!(cfg.operation_ttl.as_secs(), 7 * 24 * 3600);
    }
}
