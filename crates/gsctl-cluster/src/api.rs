use async_trait::async_trait;

use crate::error::ClusterResult;
use crate::types::{JobObservation, Manifest, ObjectKind, PodObservation};

/// Operations the controller performs against the orchestration platform.
///
/// Implementations must map "object missing" to `ClusterError::NotFound`
/// and "object already present" on create to `ClusterError::AlreadyExists`.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a new object.
    async fn create(&self, manifest: &Manifest) -> ClusterResult<()>;

    /// Replace an existing object in place.
    async fn replace(&self, manifest: &Manifest) -> ClusterResult<()>;

    /// Delete an object. Jobs are deleted with background propagation so
    /// their pods are garbage-collected by the platform.
    async fn delete(&self, kind: ObjectKind, name: &str) -> ClusterResult<()>;

    /// Read a job's completion counters.
    async fn get_job(&self, name: &str) -> ClusterResult<JobObservation>;

    /// List pods created by a job (label `job-name={name}`).
    async fn list_job_pods(&self, job_name: &str) -> ClusterResult<Vec<PodObservation>>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> ClusterResult<()>;
}
