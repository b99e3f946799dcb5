//! gsctl-state — persistence gateway for the game-server controller.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the durable
//! match → resource-bundle mapping with its last known status, the
//! per-mode game-server settings, the shared port counter, and the
//! ephemeral heartbeat records written by running servers.
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Match records are keyed by their numeric match id, settings by
//! matchmaking mode, heartbeats by server URL. Counters are stored as raw
//! `u64` values so an increment is a single read-modify-write inside one
//! write transaction.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
