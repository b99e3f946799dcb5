//! gsctl-cluster — the orchestration platform boundary.
//!
//! Everything the controller needs from the cluster goes through the
//! [`ClusterApi`] trait: create/replace/delete of the three bundle object
//! kinds, reading a job's completion counters and listing the pods that
//! belong to a job.
//!
//! # Implementations
//!
//! ```text
//! ClusterApi
//!   ├── HttpCluster   Kubernetes REST over an API proxy (kubectl proxy)
//!   └── MemoryCluster in-process fake for tests and dry runs
//! ```
//!
//! Status codes are normalized into [`ClusterError`] so callers can treat
//! `NotFound` as a cleanup signal and `AlreadyExists` as an idempotency
//! signal without looking at raw responses.

pub mod api;
pub mod error;
pub mod http;
pub mod memory;
pub mod types;

pub use api::ClusterApi;
pub use error::{ClusterError, ClusterResult};
pub use http::HttpCluster;
pub use memory::MemoryCluster;
pub use types::*;
