//! One player's game session.
//!
//! Holds the campaign lock for its whole lifetime and feeds inputs through
//! the orchestrator and the coordinator strictly one at a time: `submit`
//! takes `&mut self`, so a second turn cannot start before the first has
//! been committed or rejected.

use tracing::{info, warn};

use reverie_core::lock::SessionLock;
use reverie_core::{CampaignStore, CharacterSheet, NewGameOptions, ReverieConfig, ReverieError, SaveGame};
use reverie_llm::NarrationGateway;

use crate::coordinator::TransactionCoordinator;
use crate::error::{Result, TurnError};
use crate::intent::IntentResolver;
use crate::orchestrator::{TurnOrchestrator, TurnOutcome};
use crate::speech::{CommandSpeechSink, SpeechDispatcher};

/// A locked, playable campaign.
pub struct GameSession<G, S> {
    orchestrator: TurnOrchestrator<G>,
    coordinator: TransactionCoordinator<S>,
    lock: SessionLock,
    speech: Option<SpeechDispatcher<CommandSpeechSink>>,
    verbose_rolls: bool,
    /// Outcome of the turn waiting in the coordinator for retry.
    pending_outcome: Option<TurnOutcome>,
}

impl<G, S> std::fmt::Debug for GameSession<G, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("campaign", &self.lock.campaign())
            .field("speech", &self.speech.is_some())
            .field("pending", &self.pending_outcome.is_some())
            .finish_non_exhaustive()
    }
}

impl<G: NarrationGateway, S: CampaignStore> GameSession<G, S> {
    /// Create, commit and lock a new campaign.
    ///
    /// # Errors
    ///
    /// [`TurnError::Core`] with [`ReverieError::SessionLocked`] when the
    /// name is in use by another session, [`ReverieError::InvalidCharacter`]
    /// for a bad sheet or an existing campaign of that name, and
    /// [`TurnError::PersistenceFailure`] when the first commit fails.
    pub fn new_campaign(
        store: S,
        gateway: G,
        config: &ReverieConfig,
        campaign: &str,
        sheet: &CharacterSheet,
        seed: u64,
    ) -> Result<Self> {
        let lock = store.lock(campaign.trim())?;
        match store.load(campaign.trim()) {
            Ok(_) => {
                return Err(ReverieError::InvalidCharacter(format!("campaign '{}' already exists", campaign.trim())).into());
            }
            Err(ReverieError::CampaignNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let options = NewGameOptions {
            difficulty: config.gameplay.preset(),
            memory_cap: config.npc.memory_cap,
            inventory_capacity: config.gameplay.inventory_capacity,
        };
        let save = SaveGame::with_options(campaign, sheet, seed, options)?;
        store.commit(&save)?;
        info!(campaign = %save.campaign, seed, "new campaign committed");
        Ok(Self::assemble(store, gateway, config, save, lock))
    }

    /// Lock and load an existing campaign.
    ///
    /// # Errors
    ///
    /// [`ReverieError::SessionLocked`] or [`ReverieError::CampaignNotFound`]
    /// (wrapped in [`TurnError::Core`]), or a snapshot error for a corrupt
    /// save.
    pub fn resume(store: S, gateway: G, config: &ReverieConfig, campaign: &str) -> Result<Self> {
        let lock = store.lock(campaign.trim())?;
        let save = store.load(campaign.trim())?;
        info!(campaign = %save.campaign, turn = save.turn, "campaign resumed");
        Ok(Self::assemble(store, gateway, config, save, lock))
    }

    fn assemble(store: S, gateway: G, config: &ReverieConfig, save: SaveGame, lock: SessionLock) -> Self {
        let resolver = IntentResolver::new(config.llm.intent_confidence_threshold);
        Self {
            orchestrator: TurnOrchestrator::new(gateway, resolver).with_save_echo(config.gameplay.auto_save),
            coordinator: TransactionCoordinator::new(store, save),
            lock,
            speech: config
                .audio
                .enabled
                .then(|| SpeechDispatcher::new(CommandSpeechSink::from_config(&config.audio))),
            verbose_rolls: config.gameplay.verbose_rolls,
            pending_outcome: None,
        }
    }

    /// The committed save.
    #[must_use]
    pub fn save(&self) -> &SaveGame {
        self.coordinator.current()
    }

    /// The campaign store.
    #[must_use]
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    /// The narration gateway.
    #[must_use]
    pub fn gateway(&self) -> &G {
        self.orchestrator.gateway()
    }

    /// Whether a turn is waiting to be saved.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.coordinator.has_pending()
    }

    /// Resolve and commit one player input.
    ///
    /// # Errors
    ///
    /// Any [`TurnError`].  On error the committed save is unchanged; a
    /// [`TurnError::PersistenceFailure`] additionally holds the resolved
    /// turn for [`GameSession::retry`].
    pub async fn submit(&mut self, input: &str) -> Result<TurnOutcome> {
        self.coordinator.ensure_clear()?;
        let resolved = match self.orchestrator.run_turn(self.coordinator.current(), input).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(campaign = %self.lock.campaign(), error = %e, recoverable = e.is_recoverable(), "turn rejected");
                return Err(e);
            }
        };
        let mut outcome = resolved.outcome;
        if !self.verbose_rolls {
            outcome.roll = None;
        }
        if let Some(next) = resolved.next {
            if let Err(e) = self.coordinator.commit(next) {
                if matches!(e, TurnError::PersistenceFailure(_)) {
                    self.pending_outcome = Some(outcome);
                }
                return Err(e);
            }
        }
        self.speak(&outcome);
        Ok(outcome)
    }

    /// Retry a turn the store refused.  `None` when nothing was pending.
    ///
    /// # Errors
    ///
    /// [`TurnError::PersistenceFailure`] while the store keeps refusing.
    // Async so speech is always dispatched from inside the runtime.
    #[allow(clippy::unused_async)]
    pub async fn retry(&mut self) -> Result<Option<TurnOutcome>> {
        if !self.coordinator.retry_pending()? {
            return Ok(None);
        }
        let outcome = self.pending_outcome.take();
        if let Some(outcome) = &outcome {
            self.speak(outcome);
        }
        Ok(outcome)
    }

    /// Give up on a turn the store refused.
    pub fn discard_pending(&mut self) {
        self.coordinator.discard_pending();
        self.pending_outcome = None;
    }

    /// Stop any narration being spoken.
    pub fn silence(&self) {
        if let Some(speech) = &self.speech {
            speech.cancel();
        }
    }

    fn speak(&self, outcome: &TurnOutcome) {
        if let Some(speech) = &self.speech {
            speech.dispatch(outcome.narration.clone());
        }
    }
}
