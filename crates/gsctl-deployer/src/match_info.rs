//! The match description document mounted into the game server as
//! `match.json`.

use serde::Serialize;

use gsctl_core::{
    DotaGameMode, DotaTeam, LaunchGameServerCommand, MatchId, MatchmakingMode, Region,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_id: MatchId,
    pub lobby_type: MatchmakingMode,
    pub game_mode: DotaGameMode,
    pub room_id: String,
    pub server_url: String,
    pub fill_bots: bool,
    pub enable_cheats: bool,
    pub strict_pause: bool,
    pub players: Vec<MatchInfoPlayer>,
    pub patch: String,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfoPlayer {
    pub steam_id: String,
    pub name: String,
    pub subscriber: bool,
    pub muted: bool,
    pub ignore: bool,
    pub party_id: String,
    pub team: DotaTeam,
}

impl MatchInfo {
    pub fn from_command(cmd: &LaunchGameServerCommand, server_url: impl Into<String>) -> Self {
        // Pauses are unrestricted in custom lobbies and captains mode.
        let strict_pause = cmd.lobby_type != MatchmakingMode::LOBBY
            && cmd.game_mode != DotaGameMode::CAPTAINS_MODE;

        let players = cmd
            .players
            .iter()
            .map(|p| MatchInfoPlayer {
                steam_id: p.steam_id.clone(),
                name: p.name.clone(),
                subscriber: p.subscriber,
                muted: p.muted,
                ignore: false,
                party_id: p.party_id.clone(),
                team: p.team,
            })
            .collect();

        Self {
            match_id: cmd.match_id,
            lobby_type: cmd.lobby_type,
            game_mode: cmd.game_mode,
            room_id: cmd.room_id.clone(),
            server_url: server_url.into(),
            fill_bots: cmd.fill_bots,
            enable_cheats: cmd.enable_cheats,
            strict_pause,
            players,
            patch: cmd.patch.clone(),
            region: cmd.region.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
