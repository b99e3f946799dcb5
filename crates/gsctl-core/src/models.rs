//! Wire models for commands consumed from the broker and events published
//! to the notification sink.
//!
//! Field names follow the JSON contract shared with the matchmaking
//! services (camelCase). Enumerations that are plain integers on the wire
//! are wrapped in transparent newtypes so unknown values still decode.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Match identifier assigned by the matchmaker.
pub type MatchId = i64;

// ── Enumerations ───────────────────────────────────────────────────

/// Matchmaking mode (lobby type) of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchmakingMode(pub i32);

impl MatchmakingMode {
    pub const RANKED: Self = Self(0);
    pub const UNRANKED: Self = Self(1);
    pub const SOLOMID: Self = Self(2);
    pub const BOTS: Self = Self(7);
    pub const HIGHROOM: Self = Self(8);
    pub const CAPTAINS_MODE: Self = Self(10);
    pub const LOBBY: Self = Self(11);
}

impl fmt::Display for MatchmakingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-game mode (all pick, captains mode, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DotaGameMode(pub i32);

impl DotaGameMode {
    pub const ALLPICK: Self = Self(1);
    pub const CAPTAINS_MODE: Self = Self(2);
    pub const RANDOM_DRAFT: Self = Self(3);
    pub const SINGLE_DRAFT: Self = Self(4);
    pub const ALL_RANDOM: Self = Self(5);
    pub const SOLOMID: Self = Self(11);
}

impl fmt::Display for DotaGameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team a player is assigned to (2 = radiant, 3 = dire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DotaTeam(pub i32);

/// Logical deployment region. Also the routing suffix of a launch stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub String);

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Commands ───────────────────────────────────────────────────────

/// Request to launch a game server for a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchGameServerCommand {
    pub match_id: MatchId,
    pub lobby_type: MatchmakingMode,
    pub game_mode: DotaGameMode,
    pub map: String,
    pub region: Region,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub fill_bots: bool,
    #[serde(default)]
    pub enable_cheats: bool,
    #[serde(default)]
    pub patch: String,
    #[serde(default)]
    pub players: Vec<MatchPlayer>,
    #[serde(default)]
    pub params: LaunchParams,
}

/// A player slot in a launch command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlayer {
    pub steam_id: String,
    pub name: String,
    pub team: DotaTeam,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub subscriber: bool,
    #[serde(default)]
    pub party_id: String,
}

/// Ruleset parameters forwarded to the server plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParams {
    #[serde(default)]
    pub no_runes: bool,
    #[serde(default)]
    pub mid_tower_to_win: bool,
    #[serde(default)]
    pub kills_to_win: u32,
    #[serde(default)]
    pub enable_ban_stage: bool,
}

/// Request to forcibly stop the server of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillServerRequestedEvent {
    pub match_id: MatchId,
}

/// Request/response envelope used by the kill stream's publishers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    #[serde(default)]
    pub id: String,
    pub data: T,
    #[serde(default)]
    pub pattern: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeEnveloped<T> {
    Wrapped(RequestEnvelope<T>),
    Bare(T),
}

/// Decode a payload that may or may not be wrapped in a [`RequestEnvelope`].
pub fn decode_maybe_enveloped<T: DeserializeOwned>(body: &[u8]) -> serde_json::Result<T> {
    match serde_json::from_slice::<MaybeEnveloped<T>>(body) {
        Ok(MaybeEnveloped::Wrapped(envelope)) => Ok(envelope.data),
        Ok(MaybeEnveloped::Bare(value)) => Ok(value),
        // Re-decode as the bare type to surface a useful error message.
        Err(_) => serde_json::from_slice::<T>(body),
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Liveness change of a running game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusEvent {
    pub url: String,
    pub is_running: bool,
}

/// A match could not get a server in time and its bundle was reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoFreeServerEvent {
    pub match_id: MatchId,
    pub job_name: String,
}

/// The persisted lifecycle status of a match changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatusChangedEvent {
    pub match_id: MatchId,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch_json() -> &'static str {
        r#"{
            "matchId": 42,
            "lobbyType": 11,
            "gameMode": 2,
            "map": "dota",
            "region": "ru_moscow",
            "roomId": "room-1",
            "fillBots": false,
            "enableCheats": false,
            "patch": "DOTA_684",
            "players": [
                {"steamId": "1001", "name": "alice", "team": 2, "muted": false,
                 "subscriber": true, "partyId": "p1"}
            ],
            "params": {"noRunes": true, "midTowerToWin": false, "killsToWin": 2,
                       "enableBanStage": true}
        }"#
    }

    #[test]
    fn launch_command_decodes_wire_format() {
        let cmd: LaunchGameServerCommand = serde_json::from_str(launch_json()).unwrap();
        assert_eq!(cmd.match_id, 42);
        assert_eq!(cmd.lobby_type, MatchmakingMode::LOBBY);
        assert_eq!(cmd.game_mode, DotaGameMode::CAPTAINS_MODE);
        assert_eq!(cmd.region.as_str(), "ru_moscow");
        assert_eq!(cmd.players.len(), 1);
        assert_eq!(cmd.players[0].team, DotaTeam(2));
        assert!(cmd.params.no_runes);
        assert_eq!(cmd.params.kills_to_win, 2);
    }

    #[test]
    fn launch_command_tolerates_missing_optional_fields() {
        let json = r#"{"matchId": 7, "lobbyType": 0, "gameMode": 1, "map": "dota",
                       "region": "eu_czech"}"#;
        let cmd: LaunchGameServerCommand = serde_json::from_str(json).unwrap();
        assert!(cmd.players.is_empty());
        assert_eq!(cmd.params, LaunchParams::default());
    }

    #[test]
    fn kill_event_decodes_bare_and_enveloped() {
        let bare: KillServerRequestedEvent =
            decode_maybe_enveloped(br#"{"matchId": 5}"#).unwrap();
        assert_eq!(bare.match_id, 5);

        let wrapped: KillServerRequestedEvent = decode_maybe_enveloped(
            br#"{"id": "abc", "data": {"matchId": 6}, "pattern": "KillServerRequestedEvent"}"#,
        )
        .unwrap();
        assert_eq!(wrapped.match_id, 6);
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let result: serde_json::Result<KillServerRequestedEvent> =
            decode_maybe_enveloped(b"not json");
        assert!(result.is_err());
    }

    #[test]
    fn server_status_event_uses_camel_case() {
        let evt = ServerStatusEvent {
            url: "10.0.0.1:30500".to_string(),
            is_running: true,
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["url"], "10.0.0.1:30500");
    }
}
