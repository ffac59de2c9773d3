//! Campaign storage.
//!
//! A campaign is stored as one snapshot document (see [`crate::snapshot`])
//! per row, written in a single transaction, so a commit either replaces the
//! whole save or leaves the previous one untouched.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS campaigns (
//!     campaign   TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     turn       INTEGER NOT NULL,
//!     hero       TEXT NOT NULL,
//!     level      INTEGER NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS session_locks (
//!     campaign    TEXT PRIMARY KEY,
//!     owner       TEXT NOT NULL,
//!     acquired_at TEXT NOT NULL
//! );
//! ```
//!
//! - WAL mode for crash safety and concurrent reads.
//! - A CRC-32 of the stored bytes is checked on every load; a mismatch
//!   rejects the save instead of handing corrupt state to the engine.
//! - Backups go through SQLite's online-backup API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{Result, ReverieError};
use crate::lock::SessionLock;
use crate::savegame::SaveGame;
use crate::snapshot;
use crate::types::Turn;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// One line of `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSummary {
    /// Campaign name.
    pub campaign: String,
    /// Committed turns.
    pub turn: Turn,
    /// Character name.
    pub hero: String,
    /// Character level.
    pub level: u32,
    /// Last commit.
    pub updated_at: DateTime<Utc>,
}

impl CampaignSummary {
    fn of(save: &SaveGame) -> Self {
        Self {
            campaign: save.campaign.clone(),
            turn: save.turn,
            hero: save.character.name.clone(),
            level: save.character.level,
            updated_at: save.updated_at,
        }
    }
}

/// Durable home of campaigns.
///
/// `commit` must be atomic: after an error the previously committed save is
/// still what `load` returns.
pub trait CampaignStore: Send + Sync {
    /// Replace the stored save for `save.campaign`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error; nothing was written.
    fn commit(&self, save: &SaveGame) -> Result<()>;

    /// Load and validate a campaign.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::CampaignNotFound`] for an unknown name, or a
    /// snapshot/invariant error for a corrupt save.
    fn load(&self, campaign: &str) -> Result<SaveGame>;

    /// Every stored campaign, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    fn list(&self) -> Result<Vec<CampaignSummary>>;

    /// Remove a campaign; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    fn delete(&self, campaign: &str) -> Result<bool>;

    /// Take the single-session lock for a campaign.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::SessionLocked`] when another session holds it.
    fn lock(&self, campaign: &str) -> Result<SessionLock>;
}

impl<S: CampaignStore + ?Sized> CampaignStore for Arc<S> {
    fn commit(&self, save: &SaveGame) -> Result<()> {
        (**self).commit(save)
    }

    fn load(&self, campaign: &str) -> Result<SaveGame> {
        (**self).load(campaign)
    }

    fn list(&self) -> Result<Vec<CampaignSummary>> {
        (**self).list()
    }

    fn delete(&self, campaign: &str) -> Result<bool> {
        (**self).delete(campaign)
    }

    fn lock(&self, campaign: &str) -> Result<SessionLock> {
        (**self).lock(campaign)
    }
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS campaigns (
        campaign   TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        turn       INTEGER NOT NULL,
        hero       TEXT NOT NULL,
        level      INTEGER NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS session_locks (
        campaign    TEXT PRIMARY KEY,
        owner       TEXT NOT NULL,
        acquired_at TEXT NOT NULL
    );";

/// SQLite-backed campaign store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures or
    /// [`ReverieError::Io`] if the parent directory cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = FULL;")?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "campaign store opened"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            db_path,
        })
    }

    /// Open the store named by `config.data_dir`.
    ///
    /// # Errors
    ///
    /// See [`SqliteStore::open`].
    pub fn from_config(config: &PersistenceConfig) -> Result<Self> {
        Self::open(config.database_path(), config)
    }

    /// Open an in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Copy the database to `dest_path` with the online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn backup_to<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let conn = self.conn.lock();
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(10), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "campaign store backed up"
        );
        Ok(())
    }

    /// Write `campaigns.db.bak.1`, shifting older backups up and keeping at
    /// most `backup_count`.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] or [`ReverieError::Io`].
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup_to(self.backup_path(1))
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension().map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    /// Forcibly remove a lock row left behind by a crashed session.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn break_lock(&self, campaign: &str) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM session_locks WHERE campaign = ?1", params![campaign])?;
        if removed > 0 {
            warn!(campaign, "stale session lock broken");
        }
        Ok(removed > 0)
    }
}

impl CampaignStore for SqliteStore {
    fn commit(&self, save: &SaveGame) -> Result<()> {
        let start = Instant::now();
        let data = snapshot::export(save)?;
        let checksum = crc32_hex(&data);
        let turn = i64::try_from(save.turn)
            .map_err(|_| ReverieError::InvariantViolation("turn counter overflow".into()))?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO campaigns (campaign, data, turn, hero, level, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(campaign) DO UPDATE SET
                data = excluded.data,
                turn = excluded.turn,
                hero = excluded.hero,
                level = excluded.level,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![
                save.campaign,
                data,
                turn,
                save.character.name,
                save.character.level,
                save.updated_at.to_rfc3339(),
                checksum
            ],
        )?;
        tx.commit()?;

        debug!(
            campaign = %save.campaign,
            turn = save.turn,
            bytes = data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "campaign committed"
        );
        Ok(())
    }

    fn load(&self, campaign: &str) -> Result<SaveGame> {
        let start = Instant::now();
        let row: Option<(Vec<u8>, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached("SELECT data, checksum FROM campaigns WHERE campaign = ?1")?;
            let row = stmt
                .query_row(params![campaign], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            row
        };
        let Some((data, expected)) = row else {
            return Err(ReverieError::CampaignNotFound(campaign.to_string()));
        };

        let actual = crc32_hex(&data);
        if expected != actual {
            warn!(
                campaign,
                expected = %expected,
                actual = %actual,
                "checksum mismatch, refusing corrupt save"
            );
            return Err(ReverieError::Snapshot(format!(
                "checksum mismatch for '{campaign}' (expected {expected}, found {actual})"
            )));
        }

        let save = snapshot::import(&data)?;
        debug!(
            campaign,
            turn = save.turn,
            elapsed_us = start.elapsed().as_micros(),
            "campaign loaded"
        );
        Ok(save)
    }

    fn list(&self) -> Result<Vec<CampaignSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT campaign, turn, hero, level, updated_at FROM campaigns ORDER BY campaign",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut campaigns = Vec::new();
        for row in rows {
            let (campaign, turn, hero, level, updated_at) = row?;
            let Ok(updated_at) = DateTime::parse_from_rfc3339(&updated_at) else {
                warn!(campaign = %campaign, "skipping row with invalid timestamp");
                continue;
            };
            campaigns.push(CampaignSummary {
                campaign,
                turn: u64::try_from(turn).unwrap_or_default(),
                hero,
                level,
                updated_at: updated_at.with_timezone(&Utc),
            });
        }
        Ok(campaigns)
    }

    fn delete(&self, campaign: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM campaigns WHERE campaign = ?1", params![campaign])?;
        if deleted > 0 {
            info!(campaign, "campaign deleted");
        }
        Ok(deleted > 0)
    }

    fn lock(&self, campaign: &str) -> Result<SessionLock> {
        SessionLock::acquire_sqlite(Arc::clone(&self.conn), campaign)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store for tests and throwaway sessions.
///
/// Saves are kept as snapshot bytes, so `load` goes through the same
/// import validation as SQLite.  `fail_commits` makes the next `n` commits
/// fail without writing anything.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saves: Mutex<BTreeMap<String, (CampaignSummary, Vec<u8>)>>,
    locks: Arc<Mutex<BTreeMap<String, String>>>,
    failures: Mutex<u32>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with [`ReverieError::StoreUnavailable`].
    pub fn fail_commits(&self, n: u32) {
        *self.failures.lock() = n;
    }

    /// Number of stored campaigns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.saves.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saves.lock().is_empty()
    }
}

impl CampaignStore for MemoryStore {
    fn commit(&self, save: &SaveGame) -> Result<()> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(ReverieError::StoreUnavailable("injected commit failure".into()));
            }
        }
        let data = snapshot::export(save)?;
        self.saves
            .lock()
            .insert(save.campaign.clone(), (CampaignSummary::of(save), data));
        Ok(())
    }

    fn load(&self, campaign: &str) -> Result<SaveGame> {
        let data = self
            .saves
            .lock()
            .get(campaign)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| ReverieError::CampaignNotFound(campaign.to_string()))?;
        snapshot::import(&data)
    }

    fn list(&self) -> Result<Vec<CampaignSummary>> {
        Ok(self.saves.lock().values().map(|(summary, _)| summary.clone()).collect())
    }

    fn delete(&self, campaign: &str) -> Result<bool> {
        Ok(self.saves.lock().remove(campaign).is_some())
    }

    fn lock(&self, campaign: &str) -> Result<SessionLock> {
        SessionLock::acquire_memory(Arc::clone(&self.locks), campaign)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterSheet, PlayerClass};

    fn sample(campaign: &str) -> SaveGame {
        let sheet = CharacterSheet {
            name: "Tova".into(),
            race: "Dwarf".into(),
            class: PlayerClass::ScrumMaster,
            stats: (4, 4, 4),
            background: "Release manager".into(),
        };
        SaveGame::new(campaign, &sheet, 3).expect("new game")
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn commit_then_load_round_trips() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let save = sample("alpha");
        store.commit(&save).expect("commit");
        assert_eq!(store.load("alpha").expect("load"), save);
    }

    #[test]
    fn missing_campaign_is_not_found() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        assert!(matches!(store.load("nope"), Err(ReverieError::CampaignNotFound(_))));
    }

    #[test]
    fn commit_overwrites_and_list_is_sorted() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let mut beta = sample("beta");
        store.commit(&beta).expect("commit beta");
        store.commit(&sample("alpha")).expect("commit alpha");
        beta.turn = 7;
        store.commit(&beta).expect("overwrite");

        let list = store.list().expect("list");
        let names: Vec<&str> = list.iter().map(|c| c.campaign.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(list[1].turn, 7);
        assert_eq!(list[1].hero, "Tova");
    }

    #[test]
    fn delete_reports_existence() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        store.commit(&sample("gone")).expect("commit");
        assert!(store.delete("gone").expect("delete"));
        assert!(!store.delete("gone").expect("delete again"));
    }

    #[test]
    fn corrupted_checksum_is_refused() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        store.commit(&sample("c")).expect("commit");
        store
            .conn
            .lock()
            .execute("UPDATE campaigns SET checksum = 'deadbeef' WHERE campaign = 'c'", [])
            .expect("corrupt");
        assert!(matches!(store.load("c"), Err(ReverieError::Snapshot(_))));
    }

    #[test]
    fn file_store_backup_and_integrity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PersistenceConfig {
            data_dir: dir.path().join("data"),
            backup_count: 2,
            ..PersistenceConfig::default()
        };
        let store = SqliteStore::from_config(&config).expect("open");
        store.commit(&sample("file")).expect("commit");
        assert!(store.integrity_check().expect("check"));

        store.create_rotating_backup().expect("backup 1");
        store.create_rotating_backup().expect("backup 2");
        store.create_rotating_backup().expect("backup 3");
        assert!(config.data_dir.join("campaigns.db.bak.1").exists());
        assert!(config.data_dir.join("campaigns.db.bak.2").exists());
        assert!(!config.data_dir.join("campaigns.db.bak.3").exists());

        let restored = SqliteStore::open(config.data_dir.join("campaigns.db.bak.1"), &config).expect("open backup");
        assert_eq!(restored.load("file").expect("load").campaign, "file");
    }

    #[test]
    fn memory_store_injected_failure_writes_nothing() {
        let store = MemoryStore::new();
        let save = sample("m");
        store.commit(&save).expect("first commit");
        let mut next = save.clone();
        next.turn = 1;
        store.fail_commits(1);
        assert!(store.commit(&next).is_err());
        assert_eq!(store.load("m").expect("load").turn, 0);
        store.commit(&next).expect("recovered");
        assert_eq!(store.load("m").expect("load").turn, 1);
    }
}
