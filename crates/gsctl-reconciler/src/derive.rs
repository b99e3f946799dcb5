//! Status derivation from cluster observations.
//!
//! # Precedence
//!
//! | # | Observation                                          | Status      |
//! |---|------------------------------------------------------|-------------|
//! | 1 | job `succeeded > 0`                                  | `done`      |
//! | 2 | job `failed > 0`                                     | `failed`    |
//! | 3 | no pods                                              | `pending`   |
//! | 4 | pod `Pending`, no node                               | `pending`   |
//! | 5 | pod `Pending`, bound to a node                       | `launching` |
//! | 6 | pod `Running`, sidecar ready, game server not ready  | `finishing` |
//! | 7 | pod `Running`, every container ready                 | `running`   |
//! | 8 | pod `Running`, otherwise                             | `launching` |
//! | 9 | pod `Succeeded`                                      | `done`      |
//! |10 | pod `Failed`                                         | `failed`    |
//! |11 | nothing above matched                                | `launching` |
//!
//! Job counters always win over pods. Pods are examined in listing order
//! and the first one with a known phase decides. Rule 6 assumes the pod
//! runs exactly two containers: the sidecar and the game server.

use gsctl_cluster::{JobCounters, PodObservation, PodPhase};
use gsctl_state::Status;

pub use gsctl_deployer::manifests::SIDECAR_CONTAINER;

/// Status implied by job-level counters alone, if any.
pub fn status_from_counters(counters: &JobCounters) -> Option<Status> {
    if counters.succeeded > 0 {
        Some(Status::Done)
    } else if counters.failed > 0 {
        Some(Status::Failed)
    } else {
        None
    }
}

/// Derive the canonical status of a match from its job and pods.
pub fn derive_status(counters: &JobCounters, pods: &[PodObservation]) -> Status {
    if let Some(status) = status_from_counters(counters) {
        return status;
    }
    if pods.is_empty() {
        return Status::Pending;
    }

    for pod in pods {
        match pod.phase {
            PodPhase::Pending if pod.node_name.is_none() => return Status::Pending,
            PodPhase::Pending => return Status::Launching,
            PodPhase::Running => return running_pod_status(pod),
            PodPhase::Succeeded => return Status::Done,
            PodPhase::Failed => return Status::Failed,
            PodPhase::Unknown => continue,
        }
    }

    Status::Launching
}

fn running_pod_status(pod: &PodObservation) -> Status {
    let sidecar_ready = pod
        .containers
        .iter()
        .any(|c| c.name == SIDECAR_CONTAINER && c.ready);
    let main_ready = pod
        .containers
        .iter()
        .any(|c| c.name != SIDECAR_CONTAINER && c.ready);
    let all_ready = pod.containers.iter().all(|c| c.ready);

    if sidecar_ready && !main_ready {
        Status::Finishing
    } else if sidecar_ready && main_ready && all_ready {
        Status::Running
    } else {
        Status::Launching
    }
}
