//! Controller assembly.
//!
//! Builds every subsystem from injected infrastructure handles and spawns
//! the long-lived tasks:
//!
//! ```text
//! Controller::spawn
//!   ├── run_stream  LaunchGameServerCommand.{region}   (one per region)
//!   ├── run_stream  KillServerRequestedEvent
//!   ├── Reconciler::run
//!   └── HeartbeatMonitor::run
//! ```

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use gsctl_api::ApiState;
use gsctl_cluster::ClusterApi;
use gsctl_consumer::{
    Backoff, Broker, KillHandler, LaunchHandler, RetryPolicy, StreamBinding, run_stream,
};
use gsctl_core::{KillServerRequestedEvent, LaunchGameServerCommand, Region};
use gsctl_deployer::{Deployer, DeployerConfig, PortAllocator, SettingsDefaults};
use gsctl_events::SharedSink;
use gsctl_heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use gsctl_reconciler::{Reconciler, ReconcilerConfig};
use gsctl_state::StateStore;

/// Infrastructure handles shared by every task.
#[derive(Clone)]
pub struct Components {
    pub state: StateStore,
    pub cluster: Arc<dyn ClusterApi>,
    pub broker: Arc<dyn Broker>,
    pub sink: SharedSink,
}

/// Tunables for the controller's subsystems.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub regions: Vec<Region>,
    pub base_port: u16,
    pub max_port: u16,
    pub public_host: String,
    pub defaults: SettingsDefaults,
    pub retry: RetryPolicy,
    pub reconciler: ReconcilerConfig,
    pub heartbeat: HeartbeatConfig,
}

pub struct Controller {
    components: Components,
    settings: ControllerSettings,
    deployer: Deployer,
    reconciler: Reconciler,
    heartbeat: HeartbeatMonitor,
}

impl Controller {
    pub fn new(components: Components, settings: ControllerSettings) -> anyhow::Result<Self> {
        let ports = PortAllocator::new(
            components.state.clone(),
            settings.base_port,
            settings.max_port,
        )?;
        let deployer = Deployer::new(
            components.cluster.clone(),
            components.state.clone(),
            ports,
            DeployerConfig {
                public_host: settings.public_host.clone(),
                defaults: settings.defaults.clone(),
            },
        );
        let reconciler = Reconciler::new(
            components.state.clone(),
            components.cluster.clone(),
            deployer.clone(),
            components.sink.clone(),
            settings.reconciler.clone(),
        );
        let heartbeat = HeartbeatMonitor::new(
            components.state.clone(),
            components.sink.clone(),
            settings.heartbeat.clone(),
        );

        Ok(Self {
            components,
            settings,
            deployer,
            reconciler,
            heartbeat,
        })
    }

    /// Launch bindings for every region, then the kill binding.
    pub fn bindings(&self) -> Vec<StreamBinding> {
        self.settings
            .regions
            .iter()
            .map(StreamBinding::launch)
            .chain(std::iter::once(StreamBinding::kill()))
            .collect()
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Router serving the REST API over the shared handles.
    pub fn router(&self) -> Router {
        gsctl_api::build_router(ApiState {
            store: self.components.state.clone(),
            broker: self.components.broker.clone(),
            cluster: self.components.cluster.clone(),
        })
    }

    /// Spawn every long-lived task. All of them stop when `shutdown` changes.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let broker = &self.components.broker;
        let policy = self.settings.retry;

        let launch = Arc::new(LaunchHandler::new(
            self.deployer.clone(),
            self.components.state.clone(),
        ));
        for region in &self.settings.regions {
            let task = run_stream::<LaunchGameServerCommand>(
                broker.clone(),
                StreamBinding::launch(region),
                launch.clone(),
                policy,
                Backoff::default(),
                shutdown.clone(),
            );
            handles.push(tokio::spawn(async move {
                task.await;
            }));
        }

        let kill = Arc::new(KillHandler::new(
            self.deployer.clone(),
            self.components.state.clone(),
        ));
        let task = run_stream::<KillServerRequestedEvent>(
            broker.clone(),
            StreamBinding::kill(),
            kill,
            policy,
            Backoff::default(),
            shutdown.clone(),
        );
        handles.push(tokio::spawn(async move {
            task.await;
        }));

        let reconciler = self.reconciler.clone();
        let reconcile_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            reconciler.run(reconcile_shutdown).await;
        }));

        let heartbeat = self.heartbeat.clone();
        handles.push(tokio::spawn(async move {
            heartbeat.run(shutdown).await;
        }));

        info!(
            regions = self.settings.regions.len(),
            tasks = handles.len(),
            "controller tasks started"
        );
        handles
    }
}
