//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};

use gsctl_consumer::RetryPolicy;
use gsctl_core::Region;
use gsctl_deployer::SettingsDefaults;
use gsctl_heartbeat::HeartbeatConfig;
use gsctl_reconciler::ReconcilerConfig;

use crate::app::ControllerSettings;

#[derive(Parser)]
#[command(name = "gsctld", about = "Game-server orchestration controller")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the controller: command consumers, reconciler, heartbeat monitor and API.
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Port the HTTP API listens on.
    #[arg(long, env = "GSCTL_LISTEN_PORT", default_value_t = 8080)]
    pub listen_port: u16,

    /// Data directory for persistent state.
    #[arg(long, env = "GSCTL_DATA_DIR", default_value = "/var/lib/gsctl")]
    pub data_dir: PathBuf,

    /// Cluster API base URL (e.g. a `kubectl proxy` endpoint).
    #[arg(long, env = "GSCTL_CLUSTER_URL", default_value = "http://127.0.0.1:8001")]
    pub cluster_url: String,

    /// File holding a bearer token for the cluster API.
    #[arg(long, env = "GSCTL_CLUSTER_TOKEN_FILE")]
    pub cluster_token_file: Option<PathBuf>,

    /// Keep cluster objects in memory instead of talking to a cluster.
    #[arg(long, env = "GSCTL_DRY_RUN_CLUSTER")]
    pub dry_run_cluster: bool,

    #[arg(long, env = "GSCTL_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Regions to consume launch commands for.
    #[arg(
        long,
        env = "GSCTL_REGIONS",
        value_delimiter = ',',
        default_value = "ru_moscow,ru_novosibirsk,eu_czech"
    )]
    pub regions: Vec<String>,

    #[arg(long, env = "POD_CHECK_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub reconcile_interval: Duration,

    /// How long a server may stay launching before it is reclaimed.
    #[arg(long, env = "GAMESERVER_EXPIRATION_TIMEOUT", default_value = "2m", value_parser = humantime::parse_duration)]
    pub expiration_timeout: Duration,

    #[arg(long, env = "HEARTBEAT_CHECK_INTERVAL", default_value = "5s", value_parser = humantime::parse_duration)]
    pub heartbeat_interval: Duration,

    #[arg(long, env = "HEARTBEAT_TIMEOUT", default_value = "40s", value_parser = humantime::parse_duration)]
    pub heartbeat_timeout: Duration,

    #[arg(long, env = "GAMESERVER_BASE_PORT", default_value_t = 30500)]
    pub base_port: u16,

    #[arg(long, env = "GAMESERVER_MAX_PORT", default_value_t = 35000)]
    pub max_port: u16,

    /// Host players connect to.
    #[arg(long, env = "GAMESERVER_PUBLIC_HOST", default_value = "127.0.0.1")]
    pub public_host: String,

    /// Deliveries of a failing command before it is rejected.
    #[arg(long, env = "GSCTL_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Base URL events are POSTed to. Events are only logged when unset.
    #[arg(long, env = "GSCTL_EVENT_WEBHOOK")]
    pub event_webhook: Option<String>,

    #[arg(long, env = "GAMESERVER_DEFAULT_IMAGE", default_value = "dota2classic/gameserver:latest")]
    pub default_image: String,

    #[arg(long, env = "GAMESERVER_DEFAULT_TICKRATE", default_value_t = 30)]
    pub default_tickrate: u32,

    #[arg(long, env = "GAMESERVER_DEFAULT_LOAD_TIMEOUT", default_value = "300s", value_parser = humantime::parse_duration)]
    pub default_load_timeout: Duration,

    #[arg(long, env = "GSCTL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_port <= self.base_port {
            bail!(
                "empty port range: base port {} must be below max port {}",
                self.base_port,
                self.max_port
            );
        }
        if self.regions.iter().all(|r| r.trim().is_empty()) {
            bail!("at least one region is required");
        }
        for (name, value) in [
            ("reconcile interval", self.reconcile_interval),
            ("expiration timeout", self.expiration_timeout),
            ("heartbeat interval", self.heartbeat_interval),
            ("heartbeat timeout", self.heartbeat_timeout),
        ] {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }
        if self.max_retries == 0 {
            bail!("max retries must be at least 1");
        }
        if self.default_image.is_empty() {
            bail!("default image must not be empty");
        }
        Ok(())
    }

    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self
            .regions
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(Region::new)
            .collect();
        regions.sort();
        regions.dedup();
        regions
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            regions: self.regions(),
            base_port: self.base_port,
            max_port: self.max_port,
            public_host: self.public_host.clone(),
            defaults: SettingsDefaults {
                image: self.default_image.clone(),
                tickrate: self.default_tickrate,
                load_timeout: u32::try_from(self.default_load_timeout.as_secs()).unwrap_or(u32::MAX),
                cpu_affinity: false,
            },
            retry: RetryPolicy {
                max_retries: self.max_retries,
            },
            reconciler: ReconcilerConfig {
                interval: self.reconcile_interval,
                expiration_timeout: self.expiration_timeout,
            },
            heartbeat: HeartbeatConfig {
                interval: self.heartbeat_interval,
                timeout: self.heartbeat_timeout,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["gsctld", "run"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
        }
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.listen_port, 8080);
        assert_eq!(args.reconcile_interval, Duration::from_secs(30));
        assert_eq!(args.expiration_timeout, Duration::from_secs(120));
        assert_eq!(args.heartbeat_timeout, Duration::from_secs(40));
        assert_eq!(args.log_format, LogFormat::Pretty);
        assert!(args.validate().is_ok());

        let settings = args.controller_settings();
        assert_eq!(
            settings.regions,
            vec![
                Region::new("eu_czech"),
                Region::new("ru_moscow"),
                Region::new("ru_novosibirsk"),
            ]
        );
        assert_eq!(settings.defaults.load_timeout, 300);
        assert_eq!(settings.retry.max_retries, 5);
    }

    #[test]
    fn humantime_durations_and_region_list() {
        let args = parse(&[
            "--expiration-timeout",
            "90s",
            "--heartbeat-interval",
            "1m",
            "--regions",
            "eu_czech, ru_moscow,eu_czech",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.expiration_timeout, Duration::from_secs(90));
        assert_eq!(args.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(args.regions(), vec![Region::new("eu_czech"), Region::new("ru_moscow")]);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_empty_port_range() {
        let args = parse(&["--base-port", "31000", "--max-port", "31000"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let args = parse(&["--reconcile-interval", "0s"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_blank_regions() {
        let args = parse(&["--regions", " "]);
        assert!(args.validate().is_err());
    }
}
