//! Object kinds, manifests and the observation types read back from the
//! cluster.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The object kinds a match bundle is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    ConfigMap,
    Secret,
    Job,
}

impl ObjectKind {
    /// REST collection path for this kind in `namespace`.
    pub fn collection_path(self, namespace: &str) -> String {
        match self {
            ObjectKind::ConfigMap => format!("/api/v1/namespaces/{namespace}/configmaps"),
            ObjectKind::Secret => format!("/api/v1/namespaces/{namespace}/secrets"),
            ObjectKind::Job => format!("/apis/batch/v1/namespaces/{namespace}/jobs"),
        }
    }

    /// REST path of a single named object.
    pub fn object_path(self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::Secret => "Secret",
            ObjectKind::Job => "Job",
        };
        f.write_str(s)
    }
}

/// A rendered object ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub kind: ObjectKind,
    pub name: String,
    pub body: serde_json::Value,
}

impl Manifest {
    pub fn new(kind: ObjectKind, name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind,
            name: name.into(),
            body,
        }
    }
}

// ── Observations ───────────────────────────────────────────────────

/// Completion counters reported on a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub failed: u32,
}

/// A job as seen by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobObservation {
    pub name: String,
    pub counters: JobCounters,
}

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Readiness of one container in a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerObservation {
    pub name: String,
    pub ready: bool,
}

/// A pod belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    pub name: String,
    pub phase: PodPhase,
    /// Node the pod is bound to; `None` until scheduled.
    pub node_name: Option<String>,
    pub containers: Vec<ContainerObservation>,
}

impl PodObservation {
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            node_name: None,
            containers: Vec::new(),
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self
    }

    pub fn with_container(mut self, name: impl Into<String>, ready: bool) -> Self {
        self.containers.push(ContainerObservation {
            name: name.into(),
            ready,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_api_groups() {
        assert_eq!(
            ObjectKind::ConfigMap.object_path("default", "gameserver-config-1"),
            "/api/v1/namespaces/default/configmaps/gameserver-config-1"
        );
        assert_eq!(
            ObjectKind::Secret.collection_path("games"),
            "/api/v1/namespaces/games/secrets"
        );
        assert_eq!(
            ObjectKind::Job.object_path("default", "j"),
            "/apis/batch/v1/namespaces/default/jobs/j"
        );
    }

    #[test]
    fn unknown_pod_phase_decodes() {
        let phase: PodPhase = serde_json::from_str("\"Evicted\"").unwrap();
        assert_eq!(phase, PodPhase::Unknown);
        let phase: PodPhase = serde_json::from_str("\"Running\"").unwrap();
        assert_eq!(phase, PodPhase::Running);
    }

    #[test]
    fn job_counters_default_missing_fields() {
        let counters: JobCounters = serde_json::from_str(r#"{"active": 1}"#).unwrap();
        assert_eq!(counters.active, 1);
        assert_eq!(counters.succeeded, 0);
        assert_eq!(counters.failed, 0);
    }
}
