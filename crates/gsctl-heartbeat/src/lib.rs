//! gsctl-heartbeat — liveness of running game servers.
//!
//! Game servers periodically write a heartbeat record keyed by their URL.
//! The monitor sweeps those records on an interval:
//!
//! ```text
//! HeartbeatMonitor
//!   └── every interval, for each heartbeat record
//!       ├── undecodable    → skipped, logged
//!       ├── fresh          → ServerStatusEvent { isRunning: true }
//!       └── older than ttl → ServerStatusEvent { isRunning: false }, record removed
//! ```
//!
//! The sweep is independent of match reconciliation: a server can be
//! declared dead while its match record is still being tracked.

pub mod liveness;
pub mod monitor;

pub use liveness::{Liveness, evaluate};
pub use monitor::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT, HeartbeatConfig, HeartbeatMonitor,
    HeartbeatReport,
};
