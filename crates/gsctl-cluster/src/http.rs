//! Kubernetes REST implementation of [`ClusterApi`].
//!
//! Talks plain HTTP to an API proxy (`kubectl proxy` or an in-cluster
//! sidecar) which terminates TLS and authentication. An optional bearer
//! token is forwarded for proxies that require one.

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use gsctl_core::{JsonClient, JsonResponse};

use crate::api::ClusterApi;
use crate::error::{ClusterError, ClusterResult};
use crate::types::*;

/// Cluster client over the Kubernetes REST API.
#[derive(Debug, Clone)]
pub struct HttpCluster {
    client: JsonClient,
    namespace: String,
}

impl HttpCluster {
    pub fn new(client: JsonClient, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl ClusterApi for HttpCluster {
    async fn create(&self, manifest: &Manifest) -> ClusterResult<()> {
        let path = manifest.kind.collection_path(&self.namespace);
        let resp = self.client.post(&path, &manifest.body).await?;
        check_status(resp, manifest.kind, &manifest.name)?;
        debug!(kind = %manifest.kind, name = %manifest.name, "object created");
        Ok(())
    }

    async fn replace(&self, manifest: &Manifest) -> ClusterResult<()> {
        let path = manifest.kind.object_path(&self.namespace, &manifest.name);
        let resp = self.client.put(&path, &manifest.body).await?;
        check_status(resp, manifest.kind, &manifest.name)?;
        debug!(kind = %manifest.kind, name = %manifest.name, "object replaced");
        Ok(())
    }

    async fn delete(&self, kind: ObjectKind, name: &str) -> ClusterResult<()> {
        let mut path = kind.object_path(&self.namespace, name);
        if kind == ObjectKind::Job {
            path.push_str("?propagationPolicy=Background");
        }
        let resp = self.client.send(Method::DELETE, &path, None).await?;
        check_status(resp, kind, name)?;
        debug!(%kind, name, "object deleted");
        Ok(())
    }

    async fn get_job(&self, name: &str) -> ClusterResult<JobObservation> {
        let path = ObjectKind::Job.object_path(&self.namespace, name);
        let resp = self.client.get(&path).await?;
        let resp = check_status(resp, ObjectKind::Job, name)?;
        decode_job(name, &resp.body)
    }

    async fn list_job_pods(&self, job_name: &str) -> ClusterResult<Vec<PodObservation>> {
        let path = format!(
            "/api/v1/namespaces/{}/pods?labelSelector=job-name%3D{job_name}",
            self.namespace
        );
        let resp = self.client.get(&path).await?;
        if !resp.status.is_success() {
            return Err(api_error(&resp));
        }
        decode_pods(&resp.body)
    }

    async fn ping(&self) -> ClusterResult<()> {
        let resp = self.client.get("/version").await?;
        if !resp.status.is_success() {
            return Err(api_error(&resp));
        }
        Ok(())
    }
}

// ── Response handling ──────────────────────────────────────────────

fn check_status(resp: JsonResponse, kind: ObjectKind, name: &str) -> ClusterResult<JsonResponse> {
    let status = resp.status;
    match status {
        s if s.is_success() => Ok(resp),
        StatusCode::NOT_FOUND => Err(ClusterError::NotFound {
            kind,
            name: name.to_string(),
        }),
        StatusCode::CONFLICT => Err(ClusterError::AlreadyExists {
            kind,
            name: name.to_string(),
        }),
        _ => Err(api_error(&resp)),
    }
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(default)]
    message: String,
}

/// Build an `Api` error, preferring the message of a `Status` object body.
fn api_error(resp: &JsonResponse) -> ClusterError {
    let message = match serde_json::from_slice::<StatusBody>(&resp.body) {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => resp.text(),
    };
    ClusterError::Api {
        status: resp.status.as_u16(),
        message,
    }
}

#[derive(Deserialize)]
struct JobWire {
    #[serde(default)]
    status: JobCounters,
}

fn decode_job(name: &str, body: &[u8]) -> ClusterResult<JobObservation> {
    let job: JobWire =
        serde_json::from_slice(body).map_err(|e| ClusterError::Decode(e.to_string()))?;
    Ok(JobObservation {
        name: name.to_string(),
        counters: job.status,
    })
}

#[derive(Deserialize)]
struct PodListWire {
    #[serde(default)]
    items: Vec<PodWire>,
}

#[derive(Deserialize)]
struct PodWire {
    metadata: MetaWire,
    #[serde(default)]
    spec: PodSpecWire,
    #[serde(default)]
    status: PodStatusWire,
}

#[derive(Deserialize)]
struct MetaWire {
    name: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpecWire {
    #[serde(default)]
    node_name: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatusWire {
    #[serde(default)]
    phase: PodPhase,
    #[serde(default)]
    container_statuses: Vec<ContainerStatusWire>,
}

#[derive(Deserialize)]
struct ContainerStatusWire {
    name: String,
    #[serde(default)]
    ready: bool,
}

fn decode_pods(body: &[u8]) -> ClusterResult<Vec<PodObservation>> {
    let list: PodListWire =
        serde_json::from_slice(body).map_err(|e| ClusterError::Decode(e.to_string()))?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| PodObservation {
            name: pod.metadata.name,
            phase: pod.status.phase,
            node_name: pod.spec.node_name.filter(|n| !n.is_empty()),
            containers: pod
                .status
                .container_statuses
                .into_iter()
                .map(|c| ContainerObservation {
                    name: c.name,
                    ready: c.ready,
                })
                .collect(),
        })
        .collect())
}
