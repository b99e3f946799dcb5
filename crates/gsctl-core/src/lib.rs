//! gsctl-core — shared types for the game-server controller.
//!
//! Holds the wire models for inbound commands and outbound events, the
//! small JSON-over-HTTP client used to talk to the cluster API and event
//! webhooks, and time helpers shared by the control loops.

pub mod http;
pub mod models;
pub mod time;

pub use http::{HttpError, JsonClient, JsonResponse};
pub use models::*;
pub use time::epoch_secs;
