//! gsctl-reconciler — keeps match records consistent with the cluster.
//!
//! Every tick, for every match record:
//!
//! ```text
//! get_job ──NotFound──► teardown remaining members, delete record
//!    │
//!    ▼
//! derive_status(job counters, pods)
//!    │
//!    ▼
//! persist if it moves forward ──► MatchStatusChangedEvent
//!    │
//!    ├── launching past expiration ► teardown, delete, NoFreeServerEvent
//!    ├── done                      ► teardown, delete
//!    └── running / failed / ...    ► keep
//! ```

pub mod derive;
pub mod reconciler;

pub use derive::{SIDECAR_CONTAINER, derive_status, status_from_counters};
pub use reconciler::{
    DEFAULT_EXPIRATION_TIMEOUT, DEFAULT_INTERVAL, ReconcileReport, Reconciler, ReconcilerConfig,
};
