//! Manifest rendering for the three bundle members.
//!
//! All three manifests are rendered from one [`TemplateData`] so the
//! object names, ports and credential always agree.

use serde_json::{Value, json};

use gsctl_cluster::{Manifest, ObjectKind};
use gsctl_core::{DotaGameMode, LaunchGameServerCommand, MatchId, MatchmakingMode, Region};
use gsctl_state::GameServerSettings;

use crate::error::{DeployError, DeployResult};
use crate::match_info::MatchInfo;
use crate::ports::PortPair;

pub const SIDECAR_IMAGE: &str = "dota2classic/gameserver-sidecar:latest";
pub const SIDECAR_CONTAINER: &str = "sidecar";
pub const GAMESERVER_CONTAINER: &str = "gameserver";
pub const CONFIG_NAME: &str = "server.cfg";

const CONFIG_VOLUME: &str = "match-config";
const CONFIG_MOUNT_PATH: &str = "/etc/gameserver";
const RCON_PASSWORD_KEY: &str = "RCON_PASSWORD";

pub fn config_map_name(match_id: MatchId) -> String {
    format!("gameserver-config-{match_id}")
}

pub fn secret_name(match_id: MatchId) -> String {
    format!("gameserver-secrets-{match_id}")
}

/// One Job per match, whatever the mode's settings say at deploy time.
pub fn job_name(match_id: MatchId) -> String {
    format!("gameserver-job-{match_id}")
}

/// Everything the manifests are rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateData {
    pub match_id: MatchId,
    pub game_mode: DotaGameMode,
    pub lobby_type: MatchmakingMode,
    pub map: String,
    pub region: Region,
    pub rcon_password: String,
    pub match_json: String,
    pub image: String,
    pub tickrate: u32,
    pub load_timeout: u32,
    pub cpu_affinity: bool,
    pub ports: PortPair,
    pub server_url: String,

    // Plugin cvars.
    pub disable_runes: u8,
    pub mid_tower_to_win: u8,
    pub kills_to_win: u32,
    pub enable_bans: u8,
    pub abandon_high_quality: u8,
}

impl TemplateData {
    pub fn new(
        cmd: &LaunchGameServerCommand,
        settings: &GameServerSettings,
        ports: PortPair,
        rcon_password: String,
        public_host: &str,
    ) -> DeployResult<Self> {
        let server_url = format!("{public_host}:{}", ports.game);
        let match_json = MatchInfo::from_command(cmd, server_url.clone())
            .to_json()
            .map_err(|e| DeployError::Render(e.to_string()))?;

        let abandon_high_quality = cmd.lobby_type == MatchmakingMode::HIGHROOM
            || cmd.lobby_type == MatchmakingMode::UNRANKED;

        Ok(Self {
            match_id: cmd.match_id,
            game_mode: cmd.game_mode,
            lobby_type: cmd.lobby_type,
            map: cmd.map.clone(),
            region: cmd.region.clone(),
            rcon_password,
            match_json,
            image: settings.image.clone(),
            tickrate: settings.tickrate,
            load_timeout: settings.load_timeout,
            cpu_affinity: settings.cpu_affinity,
            ports,
            server_url,
            disable_runes: u8::from(cmd.params.no_runes),
            mid_tower_to_win: u8::from(cmd.params.mid_tower_to_win),
            kills_to_win: cmd.params.kills_to_win,
            enable_bans: u8::from(cmd.params.enable_ban_stage),
            abandon_high_quality: u8::from(abandon_high_quality),
        })
    }

    pub fn config_map_name(&self) -> String {
        config_map_name(self.match_id)
    }

    pub fn secret_name(&self) -> String {
        secret_name(self.match_id)
    }

    pub fn job_name(&self) -> String {
        job_name(self.match_id)
    }

    fn labels(&self) -> Value {
        json!({
            "app": "gameserver",
            "match-id": self.match_id.to_string(),
            "region": self.region.as_str(),
        })
    }

    /// `server.cfg` executed by the server on startup.
    pub fn server_cfg(&self) -> String {
        format!(
            "sv_lan 0\n\
             dota_wait_for_players_to_load_timeout {load_timeout}\n\
             d2c_disable_runes {runes}\n\
             d2c_mid_tower_to_win {mid}\n\
             d2c_kills_to_win {kills}\n\
             d2c_enable_bans {bans}\n\
             d2c_abandon_high_quality {abandon}\n",
            load_timeout = self.load_timeout,
            runes = self.disable_runes,
            mid = self.mid_tower_to_win,
            kills = self.kills_to_win,
            bans = self.enable_bans,
            abandon = self.abandon_high_quality,
        )
    }
}

// ── Manifests ──────────────────────────────────────────────────────

pub fn config_map(data: &TemplateData) -> Manifest {
    let name = data.config_map_name();
    let body = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "labels": data.labels() },
        "data": {
            "match.json": data.match_json,
            CONFIG_NAME: data.server_cfg(),
        },
    });
    Manifest::new(ObjectKind::ConfigMap, name, body)
}

pub fn secret(data: &TemplateData) -> Manifest {
    let name = data.secret_name();
    let body = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": { "name": name, "labels": data.labels() },
        "stringData": { RCON_PASSWORD_KEY: data.rcon_password },
    });
    Manifest::new(ObjectKind::Secret, name, body)
}

pub fn job(data: &TemplateData) -> Manifest {
    let name = data.job_name();
    let (sidecar_resources, gameserver_resources) = resources(data.cpu_affinity);

    let sidecar = json!({
        "name": SIDECAR_CONTAINER,
        "image": SIDECAR_IMAGE,
        "env": [
            env("MATCH_ID", data.match_id.to_string()),
            env("LOBBY_TYPE", data.lobby_type.to_string()),
            env("GAME_MODE", data.game_mode.to_string()),
            env("SERVER_URL", data.server_url.clone()),
            secret_env(RCON_PASSWORD_KEY, &data.secret_name()),
        ],
        "resources": sidecar_resources,
        "volumeMounts": [config_mount()],
    });

    let gameserver = json!({
        "name": GAMESERVER_CONTAINER,
        "image": data.image,
        "env": [
            env("MAP", data.map.clone()),
            env("GAMEMODE", data.game_mode.to_string()),
            env("TICKRATE", data.tickrate.to_string()),
            env("GAME_PORT", data.ports.game.to_string()),
            env("TV_PORT", data.ports.tv.to_string()),
            env("CONFIG_NAME", CONFIG_NAME.to_string()),
            secret_env(RCON_PASSWORD_KEY, &data.secret_name()),
        ],
        "ports": [
            { "name": "game-udp", "containerPort": data.ports.game, "hostPort": data.ports.game, "protocol": "UDP" },
            { "name": "game-tcp", "containerPort": data.ports.game, "hostPort": data.ports.game, "protocol": "TCP" },
            { "name": "tv-udp", "containerPort": data.ports.tv, "hostPort": data.ports.tv, "protocol": "UDP" },
        ],
        "resources": gameserver_resources,
        "volumeMounts": [config_mount()],
    });

    let body = json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": { "name": name, "labels": data.labels() },
        "spec": {
            "backoffLimit": 0,
            "template": {
                "metadata": { "labels": data.labels() },
                "spec": {
                    "restartPolicy": "Never",
                    "affinity": node_affinity(&data.region, data.cpu_affinity),
                    "containers": [sidecar, gameserver],
                    "volumes": [{
                        "name": CONFIG_VOLUME,
                        "configMap": { "name": data.config_map_name() },
                    }],
                },
            },
        },
    });
    Manifest::new(ObjectKind::Job, name, body)
}

fn env(name: &str, value: String) -> Value {
    json!({ "name": name, "value": value })
}

fn secret_env(key: &str, secret: &str) -> Value {
    json!({
        "name": key,
        "valueFrom": { "secretKeyRef": { "name": secret, "key": key } },
    })
}

fn config_mount() -> Value {
    json!({ "name": CONFIG_VOLUME, "mountPath": CONFIG_MOUNT_PATH, "readOnly": true })
}

/// Only gameserver nodes in the match's region; prefer nodes whose
/// `cpuAffinity` label matches the job flavor.
fn node_affinity(region: &Region, cpu_affinity: bool) -> Value {
    json!({
        "nodeAffinity": {
            "requiredDuringSchedulingIgnoredDuringExecution": {
                "nodeSelectorTerms": [{
                    "matchExpressions": [
                        { "key": "ru.dotaclassic/nodeType", "operator": "In", "values": ["gameserver"] },
                        { "key": "ru.dotaclassic/region", "operator": "In", "values": [region.as_str()] },
                    ],
                }],
            },
            "preferredDuringSchedulingIgnoredDuringExecution": [{
                "weight": 100,
                "preference": {
                    "matchExpressions": [{
                        "key": "dotaclassic.io/cpuAffinity",
                        "operator": "In",
                        "values": [cpu_affinity.to_string()],
                    }],
                },
            }],
        },
    })
}

/// (sidecar, gameserver) resource blocks.
///
/// CPU-affinity jobs get Guaranteed QoS (requests == limits, whole CPUs
/// for the game server) so the static CPU manager pins them to dedicated
/// cores. Regular jobs are Burstable.
fn resources(cpu_affinity: bool) -> (Value, Value) {
    if cpu_affinity {
        let sidecar = json!({ "cpu": "250m", "memory": "128Mi" });
        let gameserver = json!({ "cpu": "2", "memory": "2Gi" });
        (
            json!({ "requests": sidecar, "limits": sidecar }),
            json!({ "requests": gameserver, "limits": gameserver }),
        )
    } else {
        (
            json!({
                "requests": { "cpu": "50m", "memory": "64Mi" },
                "limits": { "cpu": "250m", "memory": "128Mi" },
            }),
            json!({
                "requests": { "cpu": "500m", "memory": "1Gi" },
                "limits": { "cpu": "2", "memory": "2Gi" },
            }),
        )
    }
}
