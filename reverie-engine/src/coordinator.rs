//! Persistence Transaction Coordinator
//!
//! Owns the committed save.  A resolved turn becomes current only after the
//! store accepted it; a refused commit keeps the turn as *pending* so it
//! can be retried, and no new turn runs until it lands.
//!
//! ```text
//!   next ─▶ validate ─▶ store.commit ─┬─ Ok  ─▶ current = next
//!                                     └─ Err ─▶ pending = next (retry later)
//! ```

use tracing::{error, info, warn};

use reverie_core::{CampaignStore, SaveGame};

use crate::error::{Result, TurnError};

/// Commits turns and tracks the one held for retry.
#[derive(Debug)]
pub struct TransactionCoordinator<S> {
    store: S,
    current: SaveGame,
    pending: Option<SaveGame>,
}

impl<S: CampaignStore> TransactionCoordinator<S> {
    /// Wrap an already committed save.
    #[must_use]
    pub fn new(store: S, current: SaveGame) -> Self {
        Self {
            store,
            current,
            pending: None,
        }
    }

    /// The last committed save.
    #[must_use]
    pub fn current(&self) -> &SaveGame {
        &self.current
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a refused commit is waiting for retry.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Refuse to start a turn while a commit is pending.
    ///
    /// # Errors
    ///
    /// [`TurnError::PersistenceFailure`] when a turn is held for retry.
    pub fn ensure_clear(&self) -> Result<()> {
        match &self.pending {
            Some(save) => Err(TurnError::PersistenceFailure(format!(
                "turn {} is still waiting to be saved; retry first",
                save.turn
            ))),
            None => Ok(()),
        }
    }

    /// Validate and persist `next`, making it current on success.
    ///
    /// # Errors
    ///
    /// [`TurnError::InvariantViolation`] when `next` is inconsistent (it is
    /// discarded), [`TurnError::PersistenceFailure`] when the store refused
    /// it (it is held as pending).
    pub fn commit(&mut self, mut next: SaveGame) -> Result<()> {
        if let Err(e) = next.validate() {
            warn!(campaign = %next.campaign, turn = next.turn, error = %e, "turn rejected by validation");
            return Err(TurnError::InvariantViolation(e.to_string()));
        }
        next.touch();
        match self.store.commit(&next) {
            Ok(()) => {
                info!(campaign = %next.campaign, turn = next.turn, "turn committed");
                self.current = next;
                self.pending = None;
                Ok(())
            }
            Err(e) => {
                error!(campaign = %next.campaign, turn = next.turn, error = %e, "commit failed, turn held for retry");
                self.pending = Some(next);
                Err(TurnError::PersistenceFailure(e.to_string()))
            }
        }
    }

    /// Retry the pending commit.  Returns `false` when nothing was pending.
    ///
    /// # Errors
    ///
    /// [`TurnError::PersistenceFailure`] when the store still refuses.
    pub fn retry_pending(&mut self) -> Result<bool> {
        let Some(next) = self.pending.take() else {
            return Ok(false);
        };
        self.commit(next)?;
        Ok(true)
    }

    /// Drop a pending turn, keeping the last committed save.
    pub fn discard_pending(&mut self) -> Option<SaveGame> {
        let dropped = self.pending.take();
        if let Some(save) = &dropped {
            warn!(campaign = %save.campaign, turn = save.turn, "pending turn discarded");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::{CharacterSheet, MemoryStore, PlayerClass};

    fn save() -> SaveGame {
        let sheet = CharacterSheet {
            name: "Ada".into(),
            race: "Human".into(),
            class: PlayerClass::CodeWarrior,
            stats: (5, 4, 3),
            background: "Sysadmin".into(),
        };
        SaveGame::new("coord", &sheet, 9).expect("new game")
    }

    #[test]
    fn commit_swaps_in_the_new_save() {
        let initial = save();
        let mut coordinator = TransactionCoordinator::new(MemoryStore::new(), initial.clone());
        let mut next = initial;
        next.turn = 1;
        coordinator.commit(next).expect("commit");
        assert_eq!(coordinator.current().turn, 1);
        assert_eq!(coordinator.store().load("coord").expect("stored").turn, 1);
    }

    #[test]
    fn refused_commit_is_held_then_retried() {
        let initial = save();
        let store = MemoryStore::new();
        store.fail_commits(1);
        let mut coordinator = TransactionCoordinator::new(store, initial.clone());
        let mut next = initial;
        next.turn = 1;

        let err = coordinator.commit(next).expect_err("store down");
        assert!(matches!(err, TurnError::PersistenceFailure(_)));
        assert_eq!(coordinator.current().turn, 0);
        assert!(coordinator.ensure_clear().is_err());

        assert!(coordinator.retry_pending().expect("retry"));
        assert_eq!(coordinator.current().turn, 1);
        assert!(!coordinator.has_pending());
        assert!(!coordinator.retry_pending().expect("nothing pending"));
    }

    #[test]
    fn invalid_saves_never_reach_the_store() {
        let initial = save();
        let mut coordinator = TransactionCoordinator::new(MemoryStore::new(), initial.clone());
        let mut broken = initial;
        broken.location = reverie_core::LocationId::new();
        let err = coordinator.commit(broken).expect_err("dangling location");
        assert!(matches!(err, TurnError::InvariantViolation(_)));
        assert!(!coordinator.has_pending());
        assert!(coordinator.store().is_empty());
    }
}
