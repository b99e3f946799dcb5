//! StateStore — redb-backed persistence gateway.
//!
//! Provides typed operations over match records, game-server settings,
//! counters and heartbeat records. All structured values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use gsctl_core::{MatchId, MatchmakingMode};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(GAMESERVER_SETTINGS).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.open_table(SERVER_HEARTBEATS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Check that the database can serve a read transaction.
    pub fn ping(&self) -> StateResult<()> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
        Ok(())
    }

    // ── Match resources ────────────────────────────────────────────

    /// Insert a new match record. Fails if one already exists for the id.
    pub fn insert_match(&self, record: &MatchResourceRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
            if table.get(record.match_id).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(record.match_id));
            }
            table
                .insert(record.match_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(match_id = record.match_id, job = %record.job_name, "match record stored");
        Ok(())
    }

    /// Get a match record by id.
    pub fn get_match(&self, match_id: MatchId) -> StateResult<Option<MatchResourceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
        match table.get(match_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: MatchResourceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all match records, ordered by match id.
    pub fn list_matches(&self) -> StateResult<Vec<MatchResourceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: MatchResourceRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Set the status of a match record. Returns false if the record is gone.
    pub fn update_match_status(&self, match_id: MatchId, status: Status) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
            let existing = table
                .get(match_id)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());
            let Some(raw) = existing else {
                return Ok(false);
            };
            let mut record: MatchResourceRecord =
                serde_json::from_slice(&raw).map_err(map_err!(Deserialize))?;
            record.status = status;
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(match_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(match_id, %status, "match status updated");
        Ok(true)
    }

    /// Delete a match record. Returns true if it existed.
    pub fn delete_match(&self, match_id: MatchId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(MATCH_RESOURCES).map_err(map_err!(Table))?;
            existed = table.remove(match_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(match_id, existed, "match record deleted");
        Ok(existed)
    }

    // ── Settings ───────────────────────────────────────────────────

    /// Insert or update the settings for a matchmaking mode.
    pub fn put_settings(&self, settings: &GameServerSettings) -> StateResult<()> {
        let value = serde_json::to_vec(settings).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(GAMESERVER_SETTINGS).map_err(map_err!(Table))?;
            table
                .insert(settings.matchmaking_mode.0, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(mode = %settings.matchmaking_mode, "gameserver settings stored");
        Ok(())
    }

    /// Get the settings for a matchmaking mode.
    pub fn get_settings(&self, mode: MatchmakingMode) -> StateResult<Option<GameServerSettings>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GAMESERVER_SETTINGS).map_err(map_err!(Table))?;
        match table.get(mode.0).map_err(map_err!(Read))? {
            Some(guard) => {
                let settings: GameServerSettings =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// List settings for all modes.
    pub fn list_settings(&self) -> StateResult<Vec<GameServerSettings>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GAMESERVER_SETTINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let settings: GameServerSettings =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(settings);
        }
        Ok(results)
    }

    // ── Counters ───────────────────────────────────────────────────

    /// Atomically add `by` to a named counter and return the new value.
    ///
    /// The read-modify-write happens inside a single write transaction;
    /// redb serializes writers, so concurrent callers observe distinct,
    /// increasing values. The counter wraps on overflow.
    pub fn incr_counter(&self, name: &str, by: u64) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next;
        {
            let mut table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            let current = table
                .get(name)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);
            next = current.wrapping_add(by);
            table.insert(name, next).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(next)
    }

    /// Current value of a counter (0 if never incremented).
    pub fn get_counter(&self, name: &str) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        Ok(table
            .get(name)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    // ── Heartbeats ─────────────────────────────────────────────────

    /// Insert or refresh a heartbeat record.
    pub fn put_heartbeat(&self, record: &ServerHeartbeatRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        self.put_heartbeat_raw(&record.url, &value)
    }

    /// Store a heartbeat payload verbatim under the given URL.
    pub fn put_heartbeat_raw(&self, url: &str, payload: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVER_HEARTBEATS).map_err(map_err!(Table))?;
            table.insert(url, payload).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// List the URLs of all heartbeat records.
    pub fn list_heartbeat_keys(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVER_HEARTBEATS).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    /// Raw heartbeat payload for a URL.
    pub fn get_heartbeat_raw(&self, url: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVER_HEARTBEATS).map_err(map_err!(Table))?;
        Ok(table
            .get(url)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec()))
    }

    /// Decoded heartbeat record for a URL.
    pub fn get_heartbeat(&self, url: &str) -> StateResult<Option<ServerHeartbeatRecord>> {
        match self.get_heartbeat_raw(url)? {
            Some(raw) => {
                let record = serde_json::from_slice(&raw).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All heartbeat records that decode cleanly.
    pub fn list_heartbeats(&self) -> StateResult<Vec<ServerHeartbeatRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVER_HEARTBEATS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            if let Ok(record) = serde_json::from_slice(value.value()) {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Remove a heartbeat record. Returns true if it existed.
    pub fn delete_heartbeat(&self, url: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SERVER_HEARTBEATS).map_err(map_err!(Table))?;
            existed = table.remove(url).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(match_id: MatchId) -> MatchResourceRecord {
        MatchResourceRecord {
            match_id,
            job_name: format!("gameserver-job-{match_id}"),
            secret_name: format!("gameserver-secrets-{match_id}"),
            config_map_name: format!("gameserver-config-{match_id}"),
            created_at: 1_700_000_000,
            status: Status::Pending,
        }
    }

    fn test_settings(mode: MatchmakingMode) -> GameServerSettings {
        GameServerSettings {
            matchmaking_mode: mode,
            tickrate: 40,
            image: "dota2classic/gameserver:test".to_string(),
            load_timeout: 120,
            cpu_affinity: true,
        }
    }

    // ── Match records ──────────────────────────────────────────────

    #[test]
    fn match_round_trip_preserves_every_field() {
        let store = StateStore::open_in_memory().unwrap();
        let mut record = test_record(77);
        record.status = Status::Finishing;

        store.insert_match(&record).unwrap();
        let retrieved = store.get_match(77).unwrap();

        assert_eq!(retrieved, Some(record));
    }

    #[test]
    fn match_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_match(1).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected_and_keeps_original() {
        let store = StateStore::open_in_memory().unwrap();
        let original = test_record(5);
        store.insert_match(&original).unwrap();

        let mut duplicate = test_record(5);
        duplicate.job_name = "other".to_string();
        let err = store.insert_match(&duplicate).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));

        assert_eq!(store.get_match(5).unwrap(), Some(original));
    }

    #[test]
    fn list_matches_returns_all_in_id_order() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_match(&test_record(30)).unwrap();
        store.insert_match(&test_record(10)).unwrap();
        store.insert_match(&test_record(20)).unwrap();

        let ids: Vec<_> = store
            .list_matches()
            .unwrap()
            .into_iter()
            .map(|r| r.match_id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn update_status_changes_only_status() {
        let store = StateStore::open_in_memory().unwrap();
        let record = test_record(3);
        store.insert_match(&record).unwrap();

        assert!(store.update_match_status(3, Status::Running).unwrap());

        let updated = store.get_match(3).unwrap().unwrap();
        assert_eq!(updated.status, Status::Running);
        assert_eq!(updated.job_name, record.job_name);
        assert_eq!(updated.created_at, record.created_at);
    }

    #[test]
    fn update_status_of_missing_record_returns_false() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(!store.update_match_status(404, Status::Done).unwrap());
        assert!(store.get_match(404).unwrap().is_none());
    }

    #[test]
    fn delete_match_reports_existence() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_match(&test_record(8)).unwrap();

        assert!(store.delete_match(8).unwrap());
        assert!(!store.delete_match(8).unwrap());
        assert!(store.get_match(8).unwrap().is_none());
    }

    #[test]
    fn negative_match_ids_are_valid_keys() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_match(&test_record(-1)).unwrap();
        assert!(store.get_match(-1).unwrap().is_some());
    }

    // ── Settings ───────────────────────────────────────────────────

    #[test]
    fn settings_put_get_and_list() {
        let store = StateStore::open_in_memory().unwrap();
        let lobby = test_settings(MatchmakingMode::LOBBY);
        store.put_settings(&lobby).unwrap();
        store
            .put_settings(&test_settings(MatchmakingMode::RANKED))
            .unwrap();

        assert_eq!(store.get_settings(MatchmakingMode::LOBBY).unwrap(), Some(lobby));
        assert!(store.get_settings(MatchmakingMode::BOTS).unwrap().is_none());
        assert_eq!(store.list_settings().unwrap().len(), 2);
    }

    #[test]
    fn settings_put_overwrites() {
        let store = StateStore::open_in_memory().unwrap();
        let mut settings = test_settings(MatchmakingMode::UNRANKED);
        store.put_settings(&settings).unwrap();

        settings.tickrate = 64;
        store.put_settings(&settings).unwrap();

        let stored = store.get_settings(MatchmakingMode::UNRANKED).unwrap().unwrap();
        assert_eq!(stored.tickrate, 64);
    }

    // ── Counters ───────────────────────────────────────────────────

    #[test]
    fn counter_starts_at_zero_and_increments() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.get_counter("ports").unwrap(), 0);
        assert_eq!(store.incr_counter("ports", 2).unwrap(), 2);
        assert_eq!(store.incr_counter("ports", 2).unwrap(), 4);
        assert_eq!(store.get_counter("ports").unwrap(), 4);
    }

    #[test]
    fn counters_are_independent() {
        let store = StateStore::open_in_memory().unwrap();
        store.incr_counter("a", 5).unwrap();
        assert_eq!(store.incr_counter("b", 1).unwrap(), 1);
    }

    #[test]
    fn concurrent_increments_yield_distinct_values() {
        let store = StateStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| store.incr_counter("ports", 2).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut values: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 200);
        assert_eq!(*values.last().unwrap(), 400);
    }

    // ── Heartbeats ─────────────────────────────────────────────────

    #[test]
    fn heartbeat_put_list_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let hb = ServerHeartbeatRecord {
            url: "10.0.0.5:30500".to_string(),
            match_id: 12,
            timestamp: 1_700_000_000,
        };
        store.put_heartbeat(&hb).unwrap();

        assert_eq!(store.list_heartbeat_keys().unwrap(), vec![hb.url.clone()]);
        assert_eq!(store.get_heartbeat(&hb.url).unwrap(), Some(hb.clone()));
        assert_eq!(store.list_heartbeats().unwrap(), vec![hb.clone()]);

        assert!(store.delete_heartbeat(&hb.url).unwrap());
        assert!(store.list_heartbeat_keys().unwrap().is_empty());
    }

    #[test]
    fn list_heartbeats_skips_garbage_payloads() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_heartbeat_raw("bad", b"{not json").unwrap();
        assert_eq!(store.list_heartbeat_keys().unwrap().len(), 1);
        assert!(store.list_heartbeats().unwrap().is_empty());
        assert!(store.get_heartbeat("bad").is_err());
    }

    #[test]
    fn ping_succeeds_on_open_store() {
        let store = StateStore::open_in_memory().unwrap();
        store.ping().unwrap();
    }

    // ── Persistence ────────────────────────────────────────────────

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gsctl.redb");

        {
            let store = StateStore::open(&path).unwrap();
            store.insert_match(&test_record(1)).unwrap();
            store.incr_counter("ports", 2).unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.get_match(1).unwrap(), Some(test_record(1)));
        assert_eq!(store.get_counter("ports").unwrap(), 2);
    }
}
