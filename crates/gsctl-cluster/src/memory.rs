//! In-memory cluster for tests and `--dry-run-cluster`.
//!
//! Stores submitted manifests keyed by kind and name, lets tests script job
//! counters and pod observations, and records every mutating call so
//! submission order can be asserted.
//!
//! Not suitable for production: nothing is scheduled, pods only exist when
//! a test puts them there.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::ClusterApi;
use crate::error::{ClusterError, ClusterResult};
use crate::types::*;

#[derive(Default)]
struct Inner {
    objects: HashMap<(ObjectKind, String), serde_json::Value>,
    job_counters: HashMap<String, JobCounters>,
    pods: HashMap<String, Vec<PodObservation>>,
    failing_pod_lists: HashSet<String>,
    failing_deletes: HashSet<ObjectKind>,
    operations: Vec<String>,
}

/// Thread-safe fake cluster. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an object of `kind` named `name` exists.
    pub fn contains(&self, kind: ObjectKind, name: &str) -> bool {
        self.inner
            .lock()
            .objects
            .contains_key(&(kind, name.to_string()))
    }

    /// The stored body of an object.
    pub fn object(&self, kind: ObjectKind, name: &str) -> Option<serde_json::Value> {
        self.inner
            .lock()
            .objects
            .get(&(kind, name.to_string()))
            .cloned()
    }

    /// Number of stored objects of `kind`.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.inner
            .lock()
            .objects
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Mutating calls in the order they were made, e.g. `create Job/x`.
    pub fn operations(&self) -> Vec<String> {
        self.inner.lock().operations.clone()
    }

    /// Set the completion counters reported for a job.
    pub fn set_job_counters(&self, job: &str, counters: JobCounters) {
        self.inner
            .lock()
            .job_counters
            .insert(job.to_string(), counters);
    }

    /// Set the pods reported for a job.
    pub fn set_pods(&self, job: &str, pods: Vec<PodObservation>) {
        self.inner.lock().pods.insert(job.to_string(), pods);
    }

    /// Make pod listing for a job fail with a transport error.
    pub fn fail_pod_listing(&self, job: &str, fail: bool) {
        let mut inner = self.inner.lock();
        if fail {
            inner.failing_pod_lists.insert(job.to_string());
        } else {
            inner.failing_pod_lists.remove(job);
        }
    }

    /// Make deletes of `kind` fail with a transport error.
    pub fn fail_deletes(&self, kind: ObjectKind, fail: bool) {
        let mut inner = self.inner.lock();
        if fail {
            inner.failing_deletes.insert(kind);
        } else {
            inner.failing_deletes.remove(&kind);
        }
    }

    /// Remove a job out-of-band, as if an operator or TTL controller did it.
    pub fn remove_job(&self, job: &str) {
        let mut inner = self.inner.lock();
        inner.objects.remove(&(ObjectKind::Job, job.to_string()));
        inner.job_counters.remove(job);
        inner.pods.remove(job);
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn create(&self, manifest: &Manifest) -> ClusterResult<()> {
        let mut inner = self.inner.lock();
        inner
            .operations
            .push(format!("create {}/{}", manifest.kind, manifest.name));
        let key = (manifest.kind, manifest.name.clone());
        if inner.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: manifest.kind,
                name: manifest.name.clone(),
            });
        }
        inner.objects.insert(key, manifest.body.clone());
        Ok(())
    }

    async fn replace(&self, manifest: &Manifest) -> ClusterResult<()> {
        let mut inner = self.inner.lock();
        inner
            .operations
            .push(format!("replace {}/{}", manifest.kind, manifest.name));
        let key = (manifest.kind, manifest.name.clone());
        match inner.objects.get_mut(&key) {
            Some(body) => {
                *body = manifest.body.clone();
                Ok(())
            }
            None => Err(ClusterError::NotFound {
                kind: manifest.kind,
                name: manifest.name.clone(),
            }),
        }
    }

    async fn delete(&self, kind: ObjectKind, name: &str) -> ClusterResult<()> {
        let mut inner = self.inner.lock();
        inner.operations.push(format!("delete {kind}/{name}"));
        if inner.failing_deletes.contains(&kind) {
            return Err(ClusterError::Transport("injected delete failure".to_string()));
        }
        if inner.objects.remove(&(kind, name.to_string())).is_none() {
            return Err(ClusterError::NotFound {
                kind,
                name: name.to_string(),
            });
        }
        if kind == ObjectKind::Job {
            inner.job_counters.remove(name);
            inner.pods.remove(name);
        }
        Ok(())
    }

    async fn get_job(&self, name: &str) -> ClusterResult<JobObservation> {
        let inner = self.inner.lock();
        if !inner
            .objects
            .contains_key(&(ObjectKind::Job, name.to_string()))
        {
            return Err(ClusterError::NotFound {
                kind: ObjectKind::Job,
                name: name.to_string(),
            });
        }
        Ok(JobObservation {
            name: name.to_string(),
            counters: inner.job_counters.get(name).copied().unwrap_or_default(),
        })
    }

    async fn list_job_pods(&self, job_name: &str) -> ClusterResult<Vec<PodObservation>> {
        let inner = self.inner.lock();
        if inner.failing_pod_lists.contains(job_name) {
            return Err(ClusterError::Transport("injected pod list failure".to_string()));
        }
        Ok(inner.pods.get(job_name).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> ClusterResult<()> {
        Ok(())
    }
}
