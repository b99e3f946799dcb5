//! Domain types for the state store.
//!
//! These types represent the persisted match bundles, per-mode server
//! settings and heartbeat records. All types are serializable to/from JSON
//! for storage in redb tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use gsctl_core::{MatchId, MatchmakingMode};

// ── Status ─────────────────────────────────────────────────────────

/// Lifecycle status of a match's resource bundle.
///
/// Ordered along the natural lifecycle. `Done` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Bundle created, no pod scheduled.
    Pending,
    /// Pod scheduled, containers not yet ready.
    Launching,
    /// All containers ready.
    Running,
    /// Game server exited, sidecar still draining.
    Finishing,
    /// The platform reports success.
    Done,
    /// The platform reports failure.
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Launching => "launching",
            Status::Running => "running",
            Status::Finishing => "finishing",
            Status::Done => "done",
            Status::Failed => "failed",
        }
    }

    /// Position along the lifecycle. Both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Launching => 1,
            Status::Running => 2,
            Status::Finishing => 3,
            Status::Done | Status::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Failed)
    }

    /// Whether a record in `self` may be moved to `next`.
    ///
    /// Terminal states never change. Otherwise the status may stay put or
    /// move forward; `Failed` is reachable from every live state.
    pub fn can_advance_to(self, next: Status) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next == Status::Failed || next.rank() >= self.rank()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "launching" => Ok(Status::Launching),
            "running" => Ok(Status::Running),
            "finishing" => Ok(Status::Finishing),
            "done" => Ok(Status::Done),
            "failed" => Ok(Status::Failed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// ── Match resources ────────────────────────────────────────────────

/// The platform objects created for one match and their last known status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResourceRecord {
    pub match_id: MatchId,
    pub job_name: String,
    pub secret_name: String,
    pub config_map_name: String,
    /// Unix timestamp (seconds) when the bundle was deployed.
    pub created_at: u64,
    pub status: Status,
}

impl MatchResourceRecord {
    /// Seconds elapsed since creation, saturating at zero for clock skew.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

// ── Settings ───────────────────────────────────────────────────────

/// Per-matchmaking-mode game server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameServerSettings {
    pub matchmaking_mode: MatchmakingMode,
    pub tickrate: u32,
    pub image: String,
    /// Seconds the server waits for players to load.
    pub load_timeout: u32,
    /// Schedule on dedicated cores with guaranteed QoS.
    pub cpu_affinity: bool,
}

// ── Heartbeats ─────────────────────────────────────────────────────

/// Liveness assertion written by a running game server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerHeartbeatRecord {
    pub url: String,
    pub match_id: MatchId,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}
