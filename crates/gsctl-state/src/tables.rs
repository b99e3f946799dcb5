//! redb table definitions for the state store.

use redb::TableDefinition;

/// Match resource records keyed by match id.
pub const MATCH_RESOURCES: TableDefinition<i64, &[u8]> = TableDefinition::new("match_resources");

/// Game-server settings keyed by matchmaking mode.
pub const GAMESERVER_SETTINGS: TableDefinition<i32, &[u8]> =
    TableDefinition::new("gameserver_settings");

/// Named monotonically increasing counters.
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Raw heartbeat payloads keyed by server URL.
pub const SERVER_HEARTBEATS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("server_heartbeats");
