//! Resource persistence core for the hosted OpenShift ARM resource
//! provider: ARM identifier canonicalization, document envelope/codec,
//! transactional CRUD, operation lifecycle and distributed locks over a
//! partitioned document store.
//!
//! The crate consumes two interfaces from its caller: a [`container::ContainerClient`]
//! and a [`clock::Clock`]. [`memory_store::InMemoryContainer`] is the one
//! bundled implementation, for tests and local development.
pub mod clock;
pub mod config;
pub mod container;
pub mod crud;
pub mod defaults;
pub mod envelope;
pub mod error;
pub mod facades;
pub mod id;
pub mod iterator;
pub mod lock;
pub mod memory_store;
pub mod notifier;
pub mod operations;
pub mod transaction;

/// Re-exports the types most callers need, so `use hcp_resource_store::prelude::*;`
/// covers the common path without walking individual modules.
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::container::{ContainerClient, ItemResponse, PatchOperation, QueryOptions};
    pub use crate::crud::{CrudDocument, CrudKernel, ListPage, ListRequest};
    pub use crate::defaults::ProvisioningState;
    pub use crate::envelope::{
        BillingDocument, CloudError, LockDocument, OperationDocument, OperationRequest,
        ResourceDocument, SubscriptionDocument,
    };
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::facades::{
        ClusterDoc, DbClient, ExternalAuth, ExternalAuthDoc, GlobalListers, HCPClusters,
        NodePoolDoc, NodePools, Operations, Subscriptions, UntypedCrud,
    };
    pub use crate::id::ResourceId;
    pub use crate::lock::{HeldLock, LockService};
    pub use crate::memory_store::InMemoryContainer;
    pub use crate::notifier::{NoopNotifier, Notifier};
    pub use crate::operations::{ActiveOperationsFilter, NotifyOutcome, OperationLifecycle, ReconcileOutcome};
}

const LOG_ENV_VAR: &str = "HCP_STORE_LOG";

/// Installs a `tracing` subscriber reading its filter from `HCP_STORE_LOG`,
/// defaulting to `info` when unset. Safe to call more than once; only the
/// first call takes effect.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// As [`init_logging`], but with an explicit default filter directive used
/// when `HCP_STORE_LOG` is unset.
pub fn init_logging_with_default(default_directive: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt().with_env_filter(filter).try_init();
}
