//! The SaveGame aggregate root.
//!
//! One save owns exactly one character, the materialized world, every
//! NPC and quest, at most one active combat encounter, the inventory and
//! the session dice.  Entities reference each other by id; the tables here
//! are the only owners.
//!
//! Every mutation a turn can make goes through a method on this type, so a
//! turn can run against a clone and either replace the original wholesale
//! or be dropped without a trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::character::{Character, CharacterSheet, STARTING_GOLD, XpGain};
use crate::combat::{
    CombatAction, CombatEncounter, CombatOutcome, CombatReport, EnemyTemplate, GOLD_PER_ENEMY,
    XP_PER_ENEMY,
};
use crate::dice::{DiceStream, DifficultyPreset, Roll, Situation};
use crate::error::{Result, ReverieError};
use crate::inventory::{
    ConsumableEffect, DEFAULT_CAPACITY, EquipSlot, Inventory, ItemKind, ItemTemplate, starting_kit,
};
use crate::journal::{Journal, JournalKind};
use crate::npc::{
    DEFAULT_MEMORY_CAP, DispositionBand, DispositionChange, Npc, NpcSeed, PromiseStatus, PromiseWeight,
};
use crate::quest::{
    ComplicationCondition, ComplicationEffect, Objective, ObjectiveGoal, Quest, QuestBook,
    QuestEvent, QuestProgress, QuestStage, Reward,
};
use crate::types::{
    DangerLevel, Direction, ItemId, LocationId, NpcId, PromiseId, QuestId, SecretId, Stat, Turn,
};
use crate::world::{
    Evidence, LocationKind, LocationSeed, RevealOutcome, SecretSeed, SecretTrigger, WorldGraph,
};

/// Turns a promise made in play has before it falls due.
pub const PROMISE_WINDOW: Turn = 10;

/// Options fixed at campaign creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewGameOptions {
    /// Difficulty preset.
    pub difficulty: DifficultyPreset,
    /// NPC memory retention cap.
    pub memory_cap: usize,
    /// Inventory slot capacity.
    pub inventory_capacity: usize,
}

impl Default for NewGameOptions {
    fn default() -> Self {
        Self {
            difficulty: DifficultyPreset::Normal,
            memory_cap: DEFAULT_MEMORY_CAP,
            inventory_capacity: DEFAULT_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of moving the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    /// Where the player is now.
    pub location: LocationId,
    /// Whether this was the first visit.
    pub first_visit: bool,
    /// Whether a fight started on arrival.
    pub combat_started: bool,
    /// Quest progress caused by arriving.
    pub quests: Vec<QuestUpdate>,
}

/// Quest progress observed during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestUpdate {
    /// Quest id.
    pub quest: QuestId,
    /// Quest title.
    pub title: String,
    /// What happened.
    pub progress: QuestProgress,
}

/// Result of a combat turn, including the fold when it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatTurn {
    /// The resolver's report.
    pub report: CombatReport,
    /// Level change from victory XP.
    pub xp: Option<XpGain>,
    /// Gold gained from victory.
    pub gold: u32,
    /// Quest progress caused by the outcome.
    pub quests: Vec<QuestUpdate>,
}

/// Result of talking to an NPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Who.
    pub npc: NpcId,
    /// Disposition change.
    pub change: DispositionChange,
    /// Whether this was the first meeting.
    pub first_meeting: bool,
    /// A quest this NPC is offering.
    pub offer: Option<QuestId>,
    /// Quest progress caused by talking.
    pub quests: Vec<QuestUpdate>,
}

/// A promise that has just been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledPromise {
    /// What was promised.
    pub text: String,
    /// Kept, withdrawn or broken.
    pub status: PromiseStatus,
    /// Disposition change.
    pub change: DispositionChange,
}

/// Result of applying a quest reward.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewardReport {
    /// Gold gained (including items sold for lack of space).
    pub gold: u32,
    /// Items that entered the inventory.
    pub items: Vec<String>,
    /// Items sold because the inventory was full.
    pub sold: Vec<String>,
    /// Level change.
    pub xp: Option<XpGain>,
}

// ---------------------------------------------------------------------------
// SaveGame
// ---------------------------------------------------------------------------

/// Complete state of one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGame {
    /// Campaign name (store key).
    pub campaign: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last commit time.
    pub updated_at: DateTime<Utc>,
    /// Committed turns.
    pub turn: Turn,
    /// Difficulty preset.
    pub difficulty: DifficultyPreset,
    /// Session dice.
    pub dice: DiceStream,
    /// The player character.
    pub character: Character,
    /// Possessions.
    pub inventory: Inventory,
    /// Materialized locations.
    pub world: WorldGraph,
    /// Current location.
    pub location: LocationId,
    /// Where the player came from.
    pub previous_location: Option<LocationId>,
    /// Every known NPC.
    pub npcs: BTreeMap<NpcId, Npc>,
    /// Every quest.
    pub quests: QuestBook,
    /// The active fight, if any.
    pub combat: Option<CombatEncounter>,
    /// Narrative history.
    pub journal: Journal,
    /// NPC memory cap used for new NPCs.
    pub memory_cap: usize,
}

impl SaveGame {
    /// Create a campaign with default options.
    ///
    /// # Errors
    ///
    /// See [`SaveGame::with_options`].
    pub fn new(campaign: &str, sheet: &CharacterSheet, seed: u64) -> Result<Self> {
        Self::with_options(campaign, sheet, seed, NewGameOptions::default())
    }

    /// Create a campaign: character, starting kit, starting settlement,
    /// innkeeper and introductory quest.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidCharacter`] for a bad sheet or empty
    /// campaign name; nothing is created.
    pub fn with_options(campaign: &str, sheet: &CharacterSheet, seed: u64, options: NewGameOptions) -> Result<Self> {
        let campaign = campaign.trim();
        if campaign.is_empty() {
            return Err(ReverieError::InvalidCharacter("campaign name must not be empty".into()));
        }
        let character = Character::create(sheet)?;

        let mut inventory = Inventory::new(options.inventory_capacity, STARTING_GOLD);
        let mut equipped = BTreeSet::new();
        for template in starting_kit(character.class) {
            let id = inventory.add(&template)?;
            if let Some(slot) = template.kind.slot() {
                if equipped.insert(slot) {
                    inventory.equip(id)?;
                }
            }
        }

        let mut world = WorldGraph::new();
        let inn = world.insert_root(starter_location(), 0);
        world.visit(inn)?;

        let now = Utc::now();
        let mut save = Self {
            campaign: campaign.to_string(),
            created_at: now,
            updated_at: now,
            turn: 0,
            difficulty: options.difficulty,
            dice: DiceStream::new(seed),
            character,
            inventory,
            world,
            location: inn,
            previous_location: None,
            npcs: BTreeMap::new(),
            quests: QuestBook::default(),
            combat: None,
            journal: Journal::default(),
            memory_cap: options.memory_cap,
        };

        let mara = save.add_npc(starter_innkeeper(), inn)?;
        save.quests.insert(starter_quest(mara));
        let intro = format!(
            "{} the {} arrives at The Crossroads Inn.",
            save.character.name, save.character.class
        );
        save.journal.record(0, JournalKind::Narration, intro);
        tracing::info!(campaign = %save.campaign, seed, "campaign created");
        Ok(save)
    }

    // -- lookups -----------------------------------------------------------

    /// The current location.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] if the save is corrupt.
    pub fn current_location(&self) -> Result<&crate::world::Location> {
        self.world.get(self.location).ok_or_else(|| {
            ReverieError::InvariantViolation(format!("current location {} is missing", self.location))
        })
    }

    /// Living NPCs at the current location.
    #[must_use]
    pub fn npcs_here(&self) -> Vec<&Npc> {
        self.world
            .get(self.location)
            .map(|l| {
                l.npcs
                    .iter()
                    .filter_map(|id| self.npcs.get(id))
                    .filter(|n| n.alive)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up an NPC.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for an unknown id.
    pub fn npc(&self, id: NpcId) -> Result<&Npc> {
        self.npcs.get(&id).ok_or_else(|| ReverieError::unknown("npc", id))
    }

    fn npc_mut(&mut self, id: NpcId) -> Result<&mut Npc> {
        self.npcs.get_mut(&id).ok_or_else(|| ReverieError::unknown("npc", id))
    }

    /// Stat value and total modifier for a check on `stat` right now.
    #[must_use]
    pub fn check_bonus(&self, stat: Stat) -> (i32, i32) {
        let (value, class_mod) = self.character.check_bonus(stat);
        (value, class_mod + self.inventory.stat_bonus(stat))
    }

    /// Roll a player check for `situation` on `stat`, consuming boosts.
    pub fn roll_check(&mut self, stat: Stat, situation: Situation) -> Roll {
        let (value, modifier) = self.check_bonus(stat);
        let roll = self
            .dice
            .resolve(value, modifier, self.difficulty.difficulty(situation));
        self.inventory.consume_boosts(stat);
        roll
    }

    // -- world -------------------------------------------------------------

    /// Place a new NPC at a location.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for an unknown location.
    pub fn add_npc(&mut self, seed: NpcSeed, at: LocationId) -> Result<NpcId> {
        let location = self
            .world
            .get_mut(at)
            .ok_or_else(|| ReverieError::unknown("location", at))?;
        let npc = Npc::from_seed(seed, at, self.memory_cap);
        let id = npc.id;
        location.npcs.insert(id);
        self.npcs.insert(id, npc);
        Ok(id)
    }

    /// Materialize the location behind an unexplored exit of the current
    /// location, with its NPCs.
    ///
    /// # Errors
    ///
    /// Propagates [`WorldGraph::materialize`] errors.
    pub fn materialize(&mut self, direction: Direction, seed: LocationSeed, npcs: Vec<NpcSeed>) -> Result<LocationId> {
        let id = self.world.materialize(self.location, direction, seed, self.turn)?;
        for npc in npcs.into_iter().filter(|n| !n.name.trim().is_empty()) {
            self.add_npc(npc, id)?;
        }
        Ok(id)
    }

    /// Deterministic seed for the location behind `direction`, drawn from
    /// the session dice.  Used when the gateway cannot draft one.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] if the save is corrupt.
    pub fn fallback_seed(&mut self, direction: Direction) -> Result<LocationSeed> {
        let from = self.world.get(self.location).ok_or_else(|| {
            ReverieError::InvariantViolation(format!("current location {} is missing", self.location))
        })?;
        Ok(crate::world::fallback_seed(from, direction, &mut self.dice))
    }

    /// Move the player to a materialized location.  Starts combat if the
    /// destination holds a threat.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::CombatActive`] mid-fight, or
    /// [`ReverieError::InvalidTargetReference`] for an unknown location.
    pub fn move_to(&mut self, destination: LocationId) -> Result<Arrival> {
        if self.combat.is_some() {
            return Err(ReverieError::CombatActive);
        }
        let location = self.world.get(destination).ok_or_else(|| ReverieError::unknown("location", destination))?;
        let first_visit = !location.visited;
        let kind = location.kind;
        let name = location.name.clone();
        let threats = location.threats.clone();
        self.world.visit(destination)?;
        self.previous_location = Some(self.location);
        self.location = destination;
        self.journal.record(self.turn, JournalKind::LocationChange, format!("Arrived at {name}."));

        let mut combat_started = false;
        if !threats.is_empty() {
            self.start_combat(&threats)?;
            combat_started = true;
        }
        let quests = self.observe(&QuestEvent::Arrived {
            location: destination,
            kind,
        })?;
        Ok(Arrival {
            location: destination,
            first_visit,
            combat_started,
            quests,
        })
    }

    /// Try to reveal a secret at the current location.
    ///
    /// # Errors
    ///
    /// Propagates [`WorldGraph::reveal`] errors.
    pub fn reveal(&mut self, secret: SecretId, evidence: &Evidence) -> Result<(RevealOutcome, Vec<QuestUpdate>)> {
        let outcome = self.world.reveal(self.location, secret, evidence)?;
        let mut quests = Vec::new();
        if let RevealOutcome::Revealed(text) = &outcome {
            self.journal.record(self.turn, JournalKind::Discovery, text.clone());
            quests = self.observe(&QuestEvent::Discovered)?;
        }
        Ok((outcome, quests))
    }

    // -- npcs --------------------------------------------------------------

    /// Talk to an NPC at the current location.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] unless the NPC is
    /// alive and present.
    pub fn talk_to(&mut self, id: NpcId, summary: &str) -> Result<Conversation> {
        if !self.npcs_here().iter().any(|n| n.id == id) {
            return Err(ReverieError::unknown("npc here", id));
        }
        let turn = self.turn;
        let npc = self.npc_mut(id)?;
        let first_meeting = !npc.met;
        npc.met = true;
        let change = npc.record_interaction(summary, i32::from(first_meeting), turn);
        let name = npc.name.clone();
        self.journal.record(turn, JournalKind::NpcDialogue, format!("Spoke with {name}: {summary}"));
        let offer = self.quests.offered_by(id).map(|q| q.id);
        let quests = self.observe(&QuestEvent::TalkedTo(id))?;
        Ok(Conversation {
            npc: id,
            change,
            first_meeting,
            offer,
            quests,
        })
    }

    /// Give one unit of an item to an NPC at the current location.
    ///
    /// # Errors
    ///
    /// Returns an error for an absent NPC or an item that cannot be given.
    pub fn give_item(&mut self, npc: NpcId, item: ItemId) -> Result<DispositionChange> {
        if !self.npcs_here().iter().any(|n| n.id == npc) {
            return Err(ReverieError::unknown("npc here", npc));
        }
        let given = self.inventory.remove(item, 1)?;
        let turn = self.turn;
        Ok(self.npc_mut(npc)?.record_gift(given.name, given.value, turn))
    }

    /// Promise something to an NPC at the current location.  It falls due
    /// [`PROMISE_WINDOW`] turns from now.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] unless the NPC is
    /// alive and present.
    pub fn make_promise(&mut self, npc: NpcId, text: &str, weight: PromiseWeight) -> Result<(PromiseId, Turn)> {
        if !self.npcs_here().iter().any(|n| n.id == npc) {
            return Err(ReverieError::unknown("npc here", npc));
        }
        let turn = self.turn;
        let due = turn + PROMISE_WINDOW;
        let person = self.npc_mut(npc)?;
        let id = person.record_promise(text.trim(), weight, Some(due), turn);
        let line = format!("Promised {}: {}", person.name, text.trim());
        self.journal.record(turn, JournalKind::Promise, line);
        Ok((id, due))
    }

    /// Resolve the oldest pending promise to an NPC at the current
    /// location.  `None` when nothing is owed.  Not keeping it counts as
    /// withdrawn before it is due and broken after.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] unless the NPC is
    /// alive and present.
    pub fn settle_promise(&mut self, npc: NpcId, kept: bool) -> Result<Option<SettledPromise>> {
        if !self.npcs_here().iter().any(|n| n.id == npc) {
            return Err(ReverieError::unknown("npc here", npc));
        }
        let turn = self.turn;
        let person = self.npc_mut(npc)?;
        let Some((id, text)) = person.pending_promises().next().map(|p| (p.id, p.text.clone())) else {
            return Ok(None);
        };
        let change = person.resolve_promise(id, kept, turn)?;
        let status = person
            .promises
            .iter()
            .find(|p| p.id == id)
            .map_or(PromiseStatus::Pending, |p| p.status);
        let line = format!("Promise to {} {status}: {text}", person.name);
        self.journal.record(turn, JournalKind::Promise, line);
        Ok(Some(SettledPromise { text, status, change }))
    }

    /// Break every overdue promise across all NPCs.
    pub fn expire_promises(&mut self) -> Vec<(NpcId, DispositionChange)> {
        let turn = self.turn;
        self.npcs
            .values_mut()
            .flat_map(|npc| {
                let id = npc.id;
                npc.expire_promises(turn).into_iter().map(move |c| (id, c))
            })
            .collect()
    }

    /// Record an NPC's death.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for an unknown NPC.
    pub fn kill_npc(&mut self, id: NpcId, cause: &str) -> Result<()> {
        let turn = self.turn;
        let npc = self.npc_mut(id)?;
        npc.mark_dead(cause, turn);
        let line = format!("{} died: {cause}", npc.name);
        self.journal.record(turn, JournalKind::NpcDeath, line);
        Ok(())
    }

    // -- inventory ---------------------------------------------------------

    /// Add an item and feed `Acquire` objectives.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InventoryFull`] when there is no room.
    pub fn acquire(&mut self, template: &ItemTemplate) -> Result<(ItemId, Vec<QuestUpdate>)> {
        let id = self.inventory.add(template)?;
        self.journal.record(self.turn, JournalKind::ItemAcquired, format!("Acquired {}.", template.name));
        let quests = self.observe(&QuestEvent::Acquired(&template.name))?;
        Ok((id, quests))
    }

    /// Use a consumable, applying recovery to the character.
    ///
    /// # Errors
    ///
    /// Propagates [`Inventory::use_consumable`] errors.
    pub fn use_item(&mut self, item: ItemId) -> Result<ConsumableEffect> {
        let used = self.inventory.use_consumable(item)?;
        if let ConsumableEffect::Recover { steps } = used.effect {
            self.character.danger = self.character.danger.recover(steps);
        }
        self.journal.record(self.turn, JournalKind::ItemUsed, format!("Used {}.", used.name));
        Ok(used.effect)
    }

    // -- combat ------------------------------------------------------------

    /// Start a fight at the current location.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::CombatActive`] if one is already running.
    pub fn start_combat(&mut self, enemies: &[EnemyTemplate]) -> Result<()> {
        if self.combat.is_some() {
            return Err(ReverieError::CombatActive);
        }
        let encounter = CombatEncounter::start(self.location, enemies, self.turn)?;
        let names: Vec<&str> = encounter.enemies.iter().map(|e| e.name.as_str()).collect();
        self.journal.record(self.turn, JournalKind::CombatStart, format!("Combat with {}.", names.join(", ")));
        tracing::info!(enemies = encounter.enemies.len(), "combat started");
        self.combat = Some(encounter);
        Ok(())
    }

    /// Resolve one combat turn, folding the encounter away if it ended.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::NoActiveCombat`] outside a fight, or the
    /// resolver's target errors.
    pub fn combat_turn(&mut self, action: &CombatAction) -> Result<CombatTurn> {
        let Self {
            combat,
            character,
            inventory,
            dice,
            difficulty,
            ..
        } = self;
        let encounter = combat.as_mut().ok_or(ReverieError::NoActiveCombat)?;
        let report = encounter.resolve_turn(action, character, inventory, dice, *difficulty)?;
        let mut turn = CombatTurn {
            report,
            xp: None,
            gold: 0,
            quests: Vec::new(),
        };
        if encounter.is_over() {
            self.fold_combat(&mut turn)?;
        }
        Ok(turn)
    }

    fn fold_combat(&mut self, turn: &mut CombatTurn) -> Result<()> {
        let Some(encounter) = self.combat.take() else {
            return Ok(());
        };
        let mut summary = format!("Combat ended in {}.", encounter.outcome);
        for line in &encounter.log {
            summary.push('\n');
            summary.push_str(line);
        }
        self.journal.record(self.turn, JournalKind::CombatEnd, summary);

        let enemy_count = u32::try_from(encounter.enemies.len()).unwrap_or(u32::MAX);
        match encounter.outcome {
            CombatOutcome::Victory => {
                if let Some(place) = self.world.get_mut(encounter.location) {
                    place.threats.clear();
                }
                turn.gold = GOLD_PER_ENEMY * enemy_count;
                self.inventory.add_gold(turn.gold);
                let gain = self.character.gain_xp(XP_PER_ENEMY * enemy_count);
                if gain.leveled_up() {
                    self.journal.record(self.turn, JournalKind::LevelUp, format!("Reached level {}.", gain.to_level));
                }
                turn.xp = Some(gain);
                turn.quests = self.observe(&QuestEvent::EnemiesDefeated(enemy_count))?;
            }
            CombatOutcome::Retreat => {
                if let Some(back) = self.previous_location.filter(|p| *p != self.location) {
                    self.previous_location = Some(self.location);
                    self.location = back;
                }
            }
            CombatOutcome::Defeat => {
                // Defeat is not permanent: the player wakes where they last
                // stood safely, barely standing and lighter of purse.
                self.character.danger = DangerLevel::Critical;
                let lost = self.inventory.gold / 2;
                self.inventory.gold -= lost;
                if let Some(back) = self.previous_location.filter(|p| *p != self.location) {
                    self.location = back;
                }
            }
            CombatOutcome::None => {}
        }
        Ok(())
    }

    // -- quests ------------------------------------------------------------

    /// Accept a quest.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] unless it is NotStarted.
    pub fn accept_quest(&mut self, id: QuestId) -> Result<()> {
        let turn = self.turn;
        let quest = self.quests.get_mut(id).ok_or_else(|| ReverieError::unknown("quest", id))?;
        quest.start(turn)?;
        let line = format!("Accepted quest: {}", quest.title);
        self.journal.record(turn, JournalKind::QuestStart, line);
        Ok(())
    }

    /// Abandon an Active quest.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] unless it is Active.
    pub fn abandon_quest(&mut self, id: QuestId) -> Result<()> {
        let turn = self.turn;
        let quest = self.quests.get_mut(id).ok_or_else(|| ReverieError::unknown("quest", id))?;
        quest.abandon(turn)?;
        let line = format!("Abandoned quest: {}", quest.title);
        self.journal.record(turn, JournalKind::QuestFail, line);
        Ok(())
    }

    /// Force a quest into Completed (scripted events).  Applies the reward
    /// only on the first call.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] from NotStarted or Failed.
    pub fn complete_quest(&mut self, id: QuestId) -> Result<Option<RewardReport>> {
        let turn = self.turn;
        let quest = self.quests.get_mut(id).ok_or_else(|| ReverieError::unknown("quest", id))?;
        let title = quest.title.clone();
        match quest.complete(turn)? {
            Some(reward) => {
                self.journal.record(turn, JournalKind::QuestComplete, format!("Completed quest: {title}"));
                Ok(Some(self.apply_reward(&reward)?))
            }
            None => Ok(None),
        }
    }

    /// Feed an event to every quest and advance any stage it completes.
    ///
    /// # Errors
    ///
    /// Propagates reward application errors.
    pub fn observe(&mut self, event: &QuestEvent<'_>) -> Result<Vec<QuestUpdate>> {
        self.quests.observe(event);
        self.advance_quests()
    }

    /// Advance every Active quest whose current stage is complete, applying
    /// rewards on completion.
    ///
    /// # Errors
    ///
    /// Propagates reward application errors.
    pub fn advance_quests(&mut self) -> Result<Vec<QuestUpdate>> {
        let mut updates = Vec::new();
        // Each advance either consumes a complication or moves a stage, so
        // the loop is bounded by stages plus complications.
        loop {
            let ready = self.quests.ready_to_advance();
            if ready.is_empty() {
                break;
            }
            let mut moved = false;
            for id in ready {
                let turn = self.turn;
                let Self {
                    quests,
                    dice,
                    character,
                    inventory,
                    npcs,
                    difficulty,
                    ..
                } = self;
                let Some(quest) = quests.get_mut(id) else {
                    continue;
                };
                let title = quest.title.clone();
                let progress = quest.advance(turn, |condition| match condition {
                    ComplicationCondition::Check { stat, difficulty: target } => {
                        let (value, class_mod) = character.check_bonus(*stat);
                        let shift = difficulty.difficulty(Situation::AmbientCheck)
                            - Situation::AmbientCheck.base_difficulty();
                        dice.resolve(value, class_mod + inventory.stat_bonus(*stat), target + shift)
                            .outcome
                            .is_success()
                    }
                    ComplicationCondition::NpcBandAtMost { npc, band } => {
                        npcs.get(npc).is_some_and(|n| n.band() <= *band)
                    }
                    ComplicationCondition::Always | ComplicationCondition::ObjectiveDone(_) => false,
                })?;
                match &progress {
                    QuestProgress::NotReady => continue,
                    QuestProgress::Completed(reward) => {
                        self.journal.record(turn, JournalKind::QuestComplete, format!("Completed quest: {title}"));
                        self.apply_reward(reward)?;
                    }
                    QuestProgress::StageAdvanced { .. } | QuestProgress::Complicated(_) => {}
                }
                moved = true;
                updates.push(QuestUpdate {
                    quest: id,
                    title,
                    progress,
                });
            }
            if !moved {
                break;
            }
        }
        Ok(updates)
    }

    /// Apply a quest reward.  Items that do not fit are sold for their value.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] if a reputation entry
    /// names an unknown NPC.
    pub fn apply_reward(&mut self, reward: &Reward) -> Result<RewardReport> {
        let mut report = RewardReport::default();
        for (npc, _) in &reward.reputation {
            self.npc(*npc)?;
        }
        self.inventory.add_gold(reward.gold);
        report.gold = reward.gold;
        for template in &reward.items {
            match self.inventory.add(template) {
                Ok(_) => report.items.push(template.name.clone()),
                Err(ReverieError::InventoryFull { .. }) => {
                    let value = template.value.saturating_mul(template.quantity.max(1));
                    self.inventory.add_gold(value);
                    report.gold += value;
                    report.sold.push(template.name.clone());
                }
                Err(other) => return Err(other),
            }
        }
        let turn = self.turn;
        for (npc, delta) in &reward.reputation {
            self.npc_mut(*npc)?
                .record_event(format!("Grateful: {}", reward.description), *delta, turn);
        }
        if reward.xp > 0 {
            let gain = self.character.gain_xp(reward.xp);
            if gain.leveled_up() {
                self.journal.record(turn, JournalKind::LevelUp, format!("Reached level {}.", gain.to_level));
            }
            report.xp = Some(gain);
        }
        Ok(report)
    }

    // -- validation --------------------------------------------------------

    /// Check every data-model invariant across the whole save.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReverieError`] found; the save should be rejected.
    pub fn validate(&self) -> Result<()> {
        let broken = |msg: String| Err(ReverieError::InvariantViolation(msg));
        if self.campaign.trim().is_empty() {
            return broken("campaign name is empty".into());
        }
        self.character
            .stats
            .validate()
            .map_err(|e| ReverieError::InvariantViolation(e.to_string()))?;
        if self.character.level == 0 {
            return broken("character level is 0".into());
        }
        self.inventory.validate()?;

        let known: BTreeSet<NpcId> = self.npcs.keys().copied().collect();
        self.world.validate(&known)?;
        if self.world.get(self.location).is_none() {
            return broken(format!("current location {} does not exist", self.location));
        }
        if let Some(prev) = self.previous_location {
            if self.world.get(prev).is_none() {
                return broken(format!("previous location {prev} does not exist"));
            }
        }

        for (id, npc) in &self.npcs {
            if *id != npc.id {
                return broken(format!("npc table key {id} does not match {}", npc.id));
            }
            if self.world.get(npc.home).is_none() {
                return broken(format!("{}'s home does not exist", npc.name));
            }
            npc.validate()?;
        }

        self.quests.validate()?;
        for quest in self.quests.iter() {
            let npcs = quest.giver.iter().chain(quest.reward.reputation.iter().map(|(n, _)| n));
            for npc in npcs {
                if !known.contains(npc) {
                    return broken(format!("quest '{}' references unknown npc {npc}", quest.title));
                }
            }
        }

        if let Some(combat) = &self.combat {
            if combat.is_over() {
                return broken("a finished combat encounter is still active".into());
            }
            if combat.enemies.is_empty() {
                return broken("active combat has no enemies".into());
            }
            if self.world.get(combat.location).is_none() {
                return broken("combat location does not exist".into());
            }
        }
        Ok(())
    }

    /// Whether the player can still act.
    #[must_use]
    pub fn is_defeated(&self) -> bool {
        self.character.danger.is_defeated()
    }

    /// Stamp the commit time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Items equipped right now, by slot.
    #[must_use]
    pub fn equipment(&self) -> Vec<(EquipSlot, &str)> {
        [EquipSlot::Weapon, EquipSlot::Armor, EquipSlot::Accessory]
            .into_iter()
            .filter_map(|slot| self.inventory.equipped(slot).map(|i| (slot, i.name.as_str())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Starter content
// ---------------------------------------------------------------------------

fn starter_location() -> LocationSeed {
    LocationSeed {
        name: "The Crossroads Inn".into(),
        description: "A low timber inn where four roads meet. A fire crackles in the common room, \
                      and a trapdoor behind the bar leads down to the cellar."
            .into(),
        kind: LocationKind::Settlement,
        tags: vec!["inn".into(), "safe".into()],
        exits: vec![Direction::North, Direction::East, Direction::Down],
        secrets: vec![SecretSeed {
            text: "Behind a loose cellar brick: the innkeeper's missing ledger, soaked but legible.".into(),
            trigger: SecretTrigger::Keyword("cellar".into()),
        }],
        threats: Vec::new(),
    }
}

fn starter_innkeeper() -> NpcSeed {
    NpcSeed {
        name: "Mara Quill".into(),
        race: "Human".into(),
        occupation: "Innkeeper".into(),
        traits: vec!["warm".into(), "shrewd".into()],
        motivation: "Keep the inn open through the hard season".into(),
        secret: Some("She owes money to the river smugglers.".into()),
        disposition: 0,
    }
}

fn starter_quest(giver: NpcId) -> Quest {
    Quest::new(
        "The Missing Ledger",
        "Mara's account ledger has vanished, and the tax collector arrives in three days.",
        vec![
            QuestStage::new(
                "Find the ledger somewhere in the inn",
                vec![Objective::new("Search the inn", ObjectiveGoal::Discover)],
            ),
            QuestStage::new(
                "Return the ledger to Mara",
                vec![Objective::new("Speak with Mara", ObjectiveGoal::TalkTo(giver))],
            ),
        ],
        Reward {
            gold: 40,
            xp: 100,
            items: vec![ItemTemplate::new(
                "Innkeeper's Token",
                "A brass token: free lodging at the Crossroads, forever.",
                ItemKind::Accessory {
                    stat: Stat::Spirit,
                    bonus: 1,
                },
                15,
            )],
            reputation: vec![(giver, 15)],
            description: "Mara's ledger returned".into(),
        },
    )
    .with_giver(giver)
    .with_complication(
        "Mara no longer trusts you; you must earn her ear first",
        0,
        ComplicationCondition::NpcBandAtMost {
            npc: giver,
            band: DispositionBand::Unfriendly,
        },
        ComplicationEffect::AddObjectives(vec![Objective::new(
            "Make amends with Mara",
            ObjectiveGoal::TalkTo(giver),
        )]),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
