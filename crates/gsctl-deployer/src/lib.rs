//! gsctl-deployer — per-match resource bundles.
//!
//! Turns a `LaunchGameServerCommand` into three cluster objects created
//! together and torn down together:
//!
//! ```text
//! Deployer::deploy
//!   ├── credentials::generate_credential   (RCON password, degraded default)
//!   ├── PortAllocator::allocate            (game + SourceTV port pair)
//!   ├── settings lookup by matchmaking mode (degraded defaults)
//!   ├── TemplateData → ConfigMap, Secret, Job manifests
//!   └── submit ConfigMap → Secret → Job
//! ```
//!
//! ConfigMap and Secret are idempotent (replaced when present). A Job that
//! already exists means a server for the match is running and surfaces as
//! [`DeployError::AlreadyRunning`].

pub mod credentials;
pub mod deployer;
pub mod error;
pub mod manifests;
pub mod match_info;
pub mod ports;

pub use deployer::{BundleHandles, Deployer, DeployerConfig, SettingsDefaults, TeardownReport};
pub use error::{DeployError, DeployResult};
pub use manifests::TemplateData;
pub use ports::{PortAllocator, PortPair};
