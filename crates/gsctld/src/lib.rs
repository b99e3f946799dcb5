//! gsctld — the game-server controller daemon.
//!
//! Assembles the state store, cluster client, broker, event sink and the
//! control loops into one process. The binary in `main.rs` only parses
//! configuration, picks concrete backends and waits for shutdown.

pub mod app;
pub mod config;

pub use app::{Components, Controller, ControllerSettings};
pub use config::{Cli, Command, LogFormat, RunArgs};
