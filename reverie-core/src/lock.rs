//! Single-session lock per campaign.
//!
//! A campaign may be played by one session at a time.  The lock is taken
//! when a session starts and released when the [`SessionLock`] is dropped;
//! a second acquisition while it is held fails with
//! [`ReverieError::SessionLocked`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::{Result, ReverieError};

enum Backend {
    Sqlite(Arc<Mutex<Connection>>),
    Memory(Arc<Mutex<BTreeMap<String, String>>>),
}

/// Held for the lifetime of a session.
pub struct SessionLock {
    campaign: String,
    owner: String,
    backend: Backend,
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLock")
            .field("campaign", &self.campaign)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

fn new_owner() -> String {
    format!("{}-{}", std::process::id(), uuid::Uuid::new_v4().simple())
}

impl SessionLock {
    pub(crate) fn acquire_sqlite(conn: Arc<Mutex<Connection>>, campaign: &str) -> Result<Self> {
        let owner = new_owner();
        {
            let mut guard = conn.lock();
            let tx = guard.transaction()?;
            let holder: Option<String> = tx
                .query_row(
                    "SELECT owner FROM session_locks WHERE campaign = ?1",
                    params![campaign],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(holder) = holder {
                return Err(ReverieError::SessionLocked {
                    campaign: campaign.to_string(),
                    owner: holder,
                });
            }
            tx.execute(
                "INSERT INTO session_locks (campaign, owner, acquired_at) VALUES (?1, ?2, ?3)",
                params![campaign, owner, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
        }
        debug!(campaign, owner = %owner, "session lock acquired");
        Ok(Self {
            campaign: campaign.to_string(),
            owner,
            backend: Backend::Sqlite(conn),
        })
    }

    pub(crate) fn acquire_memory(table: Arc<Mutex<BTreeMap<String, String>>>, campaign: &str) -> Result<Self> {
        let owner = new_owner();
        {
            let mut locks = table.lock();
            if let Some(holder) = locks.get(campaign) {
                return Err(ReverieError::SessionLocked {
                    campaign: campaign.to_string(),
                    owner: holder.clone(),
                });
            }
            locks.insert(campaign.to_string(), owner.clone());
        }
        Ok(Self {
            campaign: campaign.to_string(),
            owner,
            backend: Backend::Memory(table),
        })
    }

    /// Locked campaign.
    #[must_use]
    pub fn campaign(&self) -> &str {
        &self.campaign
    }

    /// Owner tag written into the lock row.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let released = conn.lock().execute(
                    "DELETE FROM session_locks WHERE campaign = ?1 AND owner = ?2",
                    params![self.campaign, self.owner],
                );
                if let Err(e) = released {
                    warn!(campaign = %self.campaign, error = %e, "failed to release session lock");
                }
            }
            Backend::Memory(table) => {
                let mut locks = table.lock();
                if locks.get(&self.campaign) == Some(&self.owner) {
                    locks.remove(&self.campaign);
                }
            }
        }
        debug!(campaign = %self.campaign, "session lock released");
    }
}
