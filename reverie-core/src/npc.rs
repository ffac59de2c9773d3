//! NPC Memory & Disposition Engine.
//!
//! Each NPC carries a disposition score on a fixed scale and a bounded,
//! append-only memory log of what the player did around them.
//!
//! ## Disposition bands
//!
//! ```text
//!  -100        -60          -20     0      20           60          100
//!   |  Hostile  | Unfriendly  |  Neutral   |  Friendly  |   Allied   |
//! ```
//!
//! A single interaction moves the band at most one step.  A broken promise
//! always moves it exactly one step down, landing inside the next lower
//! band no matter where in its band the NPC stood.  Each entry records the
//! bands it passed through.
//!
//! ## Retention
//!
//! When the log exceeds its cap, the oldest entries are folded into a
//! [`ReputationLedger`] instead of being dropped, so at all times:
//!
//! ```text
//!   score == baseline + ledger.net_delta + Σ entry.applied_delta
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::error::{Result, ReverieError};
use crate::types::{LocationId, NpcId, PromiseId, Turn};

/// Lowest disposition score.
pub const DISPOSITION_MIN: i32 = -100;
/// Highest disposition score.
pub const DISPOSITION_MAX: i32 = 100;
/// Default number of memory entries kept before folding.
pub const DEFAULT_MEMORY_CAP: usize = 32;

/// Disposition delta for fulfilling a minor promise.
pub const PROMISE_KEPT_MINOR: i32 = 10;
/// Disposition delta for fulfilling a major promise.
pub const PROMISE_KEPT_MAJOR: i32 = 25;
/// Disposition delta for withdrawing a minor promise before it was due.
pub const PROMISE_WITHDRAWN_MINOR: i32 = -5;
/// Disposition delta for withdrawing a major promise before it was due.
pub const PROMISE_WITHDRAWN_MAJOR: i32 = -10;
/// Disposition delta for breaking a minor promise.
pub const PROMISE_BROKEN_MINOR: i32 = -25;
/// Disposition delta for breaking a major promise.
pub const PROMISE_BROKEN_MAJOR: i32 = -45;
/// Largest disposition delta a single gift can earn.
pub const GIFT_DELTA_CAP: i32 = 15;

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// Ordinal attitude toward the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionBand {
    /// Score ≤ −60.
    Hostile,
    /// −59 ..= −20.
    Unfriendly,
    /// −19 ..= 19.
    Neutral,
    /// 20 ..= 59.
    Friendly,
    /// Score ≥ 60.
    Allied,
}

impl DispositionBand {
    const ORDER: [DispositionBand; 5] = [
        DispositionBand::Hostile,
        DispositionBand::Unfriendly,
        DispositionBand::Neutral,
        DispositionBand::Friendly,
        DispositionBand::Allied,
    ];

    /// Classify a score.
    #[must_use]
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s <= -60 => Self::Hostile,
            s if s <= -20 => Self::Unfriendly,
            s if s < 20 => Self::Neutral,
            s if s < 60 => Self::Friendly,
            _ => Self::Allied,
        }
    }

    /// Inclusive score range of this band.
    #[must_use]
    pub const fn range(self) -> (i32, i32) {
        match self {
            Self::Hostile => (DISPOSITION_MIN, -60),
            Self::Unfriendly => (-59, -20),
            Self::Neutral => (-19, 19),
            Self::Friendly => (20, 59),
            Self::Allied => (60, DISPOSITION_MAX),
        }
    }

    fn index(self) -> usize {
        Self::ORDER.iter().position(|b| *b == self).unwrap_or(2)
    }

    /// The next band toward Hostile, if any.
    #[must_use]
    pub fn step_down(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    /// Bands from `self` to `to` inclusive, one step at a time.
    #[must_use]
    pub fn path_to(self, to: Self) -> Vec<Self> {
        let (a, b) = (self.index(), to.index());
        if a <= b {
            Self::ORDER[a..=b].to_vec()
        } else {
            Self::ORDER[b..=a].iter().rev().copied().collect()
        }
    }
}

impl fmt::Display for DispositionBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hostile => write!(f, "Hostile"),
            Self::Unfriendly => write!(f, "Unfriendly"),
            Self::Neutral => write!(f, "Neutral"),
            Self::Friendly => write!(f, "Friendly"),
            Self::Allied => write!(f, "Allied"),
        }
    }
}

// ---------------------------------------------------------------------------
// Promises
// ---------------------------------------------------------------------------

/// How central a promise is to the NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseWeight {
    /// A small favor.
    Minor,
    /// Something the NPC is counting on.
    Major,
}

/// Where a promise stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseStatus {
    /// Not resolved yet.
    Pending,
    /// Kept.
    Fulfilled,
    /// Called off before it was due.
    Withdrawn,
    /// Not kept once due.
    Broken,
}

impl PromiseStatus {
    /// Disposition delta for resolving a promise of `weight` into this status.
    #[must_use]
    pub const fn delta(self, weight: PromiseWeight) -> i32 {
        match (self, weight) {
            (Self::Pending, _) => 0,
            (Self::Fulfilled, PromiseWeight::Minor) => PROMISE_KEPT_MINOR,
            (Self::Fulfilled, PromiseWeight::Major) => PROMISE_KEPT_MAJOR,
            (Self::Withdrawn, PromiseWeight::Minor) => PROMISE_WITHDRAWN_MINOR,
            (Self::Withdrawn, PromiseWeight::Major) => PROMISE_WITHDRAWN_MAJOR,
            (Self::Broken, PromiseWeight::Minor) => PROMISE_BROKEN_MINOR,
            (Self::Broken, PromiseWeight::Major) => PROMISE_BROKEN_MAJOR,
        }
    }
}

impl fmt::Display for PromiseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Fulfilled => "kept",
            Self::Withdrawn => "withdrawn",
            Self::Broken => "broken",
        })
    }
}

/// A promise the player made to an NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    /// Identity.
    pub id: PromiseId,
    /// What was promised.
    pub text: String,
    /// Minor or major.
    pub weight: PromiseWeight,
    /// Current status.
    pub status: PromiseStatus,
    /// Turn the promise was made.
    pub made_turn: Turn,
    /// Turn by which it must be kept, if any.  No due turn means it is due now.
    pub due_turn: Option<Turn>,
}

// ---------------------------------------------------------------------------
// Memory log
// ---------------------------------------------------------------------------

/// What an NPC remembers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MemoryKind {
    /// A conversation, summarized.
    Conversation {
        /// One-line summary.
        summary: String,
    },
    /// A promise was made.
    PromiseMade {
        /// Promise id.
        promise: PromiseId,
        /// What was promised.
        text: String,
        /// Minor or major.
        weight: PromiseWeight,
    },
    /// A promise was resolved.
    PromiseResolved {
        /// Promise id.
        promise: PromiseId,
        /// What was promised.
        text: String,
        /// Final status.
        status: PromiseStatus,
    },
    /// The player gave a gift.
    Gift {
        /// Item name.
        item: String,
        /// Gold value.
        value: u32,
    },
    /// Something the NPC witnessed.
    Event {
        /// One-line summary.
        summary: String,
    },
}

/// One remembered interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Turn it happened.
    pub turn: Turn,
    /// What happened.
    pub kind: MemoryKind,
    /// Disposition change actually applied (after clamping).
    pub applied_delta: i32,
    /// Bands passed through, starting band first.  Empty when the band held.
    pub band_path: Vec<DispositionBand>,
}

impl MemoryEntry {
    /// Whether this entry records a broken promise.
    #[must_use]
    pub fn is_promise_broken(&self) -> bool {
        matches!(
            self.kind,
            MemoryKind::PromiseResolved {
                status: PromiseStatus::Broken,
                ..
            }
        )
    }
}

/// Aggregate of entries folded out of the memory log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReputationLedger {
    /// Sum of folded entries' applied deltas.
    pub net_delta: i32,
    /// Number of entries folded.
    pub folded: u32,
    /// Folded conversations.
    pub conversations: u32,
    /// Folded kept promises.
    pub promises_kept: u32,
    /// Folded broken or withdrawn promises.
    pub promises_broken: u32,
    /// Gold value of folded gifts.
    pub gift_value: u32,
}

impl ReputationLedger {
    fn fold(&mut self, entry: &MemoryEntry) {
        self.net_delta += entry.applied_delta;
        self.folded += 1;
        match &entry.kind {
            MemoryKind::Conversation { .. } => self.conversations += 1,
            MemoryKind::PromiseResolved { status, .. } => match status {
                PromiseStatus::Fulfilled => self.promises_kept += 1,
                PromiseStatus::Broken | PromiseStatus::Withdrawn => self.promises_broken += 1,
                PromiseStatus::Pending => {}
            },
            MemoryKind::Gift { value, .. } => {
                self.gift_value = self.gift_value.saturating_add(*value);
            }
            MemoryKind::PromiseMade { .. } | MemoryKind::Event { .. } => {}
        }
    }

    /// One-line summary for narration context.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} older interactions ({} talks, {} promises kept, {} broken, {} gold in gifts, net {:+})",
            self.folded,
            self.conversations,
            self.promises_kept,
            self.promises_broken,
            self.gift_value,
            self.net_delta
        )
    }
}

/// Bounded, append-only memory log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLog {
    cap: usize,
    entries: VecDeque<MemoryEntry>,
    ledger: ReputationLedger,
}

impl MemoryLog {
    /// An empty log keeping at most `cap` entries (minimum 1).
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            entries: VecDeque::new(),
            ledger: ReputationLedger::default(),
        }
    }

    /// Retention cap.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &MemoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folded history.
    #[must_use]
    pub fn ledger(&self) -> &ReputationLedger {
        &self.ledger
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&MemoryEntry> {
        self.entries.back()
    }

    /// Net delta of retained entries plus the ledger.
    #[must_use]
    pub fn total_delta(&self) -> i32 {
        self.ledger.net_delta + self.entries.iter().map(|e| e.applied_delta).sum::<i32>()
    }

    fn push(&mut self, entry: MemoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.cap {
            if let Some(oldest) = self.entries.pop_front() {
                self.ledger.fold(&oldest);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// NPC
// ---------------------------------------------------------------------------

/// Draft of an NPC before it enters the arena.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NpcSeed {
    /// Name.
    pub name: String,
    /// Race.
    pub race: String,
    /// Occupation.
    pub occupation: String,
    /// Personality tags (at most two are kept).
    pub traits: Vec<String>,
    /// What drives them.
    pub motivation: String,
    /// Something they hide.
    pub secret: Option<String>,
    /// Starting disposition.
    pub disposition: i32,
}

/// Report of a disposition change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionChange {
    /// Delta actually applied.
    pub applied_delta: i32,
    /// Band before.
    pub from: DispositionBand,
    /// Band after.
    pub to: DispositionBand,
}

impl DispositionChange {
    /// Whether the band moved.
    #[must_use]
    pub fn band_changed(&self) -> bool {
        self.from != self.to
    }
}

/// A non-player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    /// Identity.
    pub id: NpcId,
    /// Name.
    pub name: String,
    /// Race.
    pub race: String,
    /// Occupation.
    pub occupation: String,
    /// Personality tags.
    pub traits: Vec<String>,
    /// What drives them.
    pub motivation: String,
    /// Something they hide.
    pub secret: Option<String>,
    /// Where they live.
    pub home: LocationId,
    /// Alive or dead.
    pub alive: bool,
    /// Whether the player has spoken to them.
    pub met: bool,
    baseline: i32,
    disposition: i32,
    band: DispositionBand,
    /// Promises made to this NPC.
    pub promises: Vec<Promise>,
    memory: MemoryLog,
}

/// Score a broken promise leaves behind: `score + delta`, held inside the
/// band just below the current one.  Hostile NPCs stay Hostile.
fn broken_landing(score: i32, delta: i32) -> i32 {
    let band = DispositionBand::from_score(score);
    let (low, high) = band.step_down().unwrap_or(band).range();
    (score + delta).clamp(low, high.min(score))
}

impl Npc {
    /// Create an NPC from a seed.
    #[must_use]
    pub fn from_seed(seed: NpcSeed, home: LocationId, memory_cap: usize) -> Self {
        let disposition = seed.disposition.clamp(DISPOSITION_MIN, DISPOSITION_MAX);
        let mut traits = seed.traits;
        traits.truncate(2);
        Self {
            id: NpcId::new(),
            name: seed.name.trim().to_string(),
            race: seed.race,
            occupation: seed.occupation,
            traits,
            motivation: seed.motivation,
            secret: seed.secret,
            home,
            alive: true,
            met: false,
            baseline: disposition,
            disposition,
            band: DispositionBand::from_score(disposition),
            promises: Vec::new(),
            memory: MemoryLog::new(memory_cap),
        }
    }

    /// Current score.
    #[must_use]
    pub fn disposition(&self) -> i32 {
        self.disposition
    }

    /// Current band.
    #[must_use]
    pub fn band(&self) -> DispositionBand {
        self.band
    }

    /// Memory log.
    #[must_use]
    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    /// Apply a delta and append the entry.  The delta is clamped so the band
    /// moves at most one step.
    fn apply(&mut self, kind: MemoryKind, delta: i32, turn: Turn) -> DispositionChange {
        let from = self.band;
        let mut target = (self.disposition + delta).clamp(DISPOSITION_MIN, DISPOSITION_MAX);
        let path = from.path_to(DispositionBand::from_score(target));
        if path.len() > 2 {
            let (low, high) = path[1].range();
            target = if delta < 0 { low } else { high };
        }
        let applied_delta = target - self.disposition;
        self.disposition = target;
        self.band = DispositionBand::from_score(target);
        let band_path = if self.band == from {
            Vec::new()
        } else {
            from.path_to(self.band)
        };
        if !band_path.is_empty() {
            tracing::debug!(npc = %self.name, from = %from, to = %self.band, "disposition band changed");
        }
        self.memory.push(MemoryEntry {
            turn,
            kind,
            applied_delta,
            band_path,
        });
        DispositionChange {
            applied_delta,
            from,
            to: self.band,
        }
    }

    /// Record a conversation or witnessed event with a disposition delta.
    pub fn record_interaction(&mut self, summary: impl Into<String>, delta: i32, turn: Turn) -> DispositionChange {
        self.apply(
            MemoryKind::Conversation {
                summary: summary.into(),
            },
            delta,
            turn,
        )
    }

    /// Record something the NPC witnessed.
    pub fn record_event(&mut self, summary: impl Into<String>, delta: i32, turn: Turn) -> DispositionChange {
        self.apply(
            MemoryKind::Event {
                summary: summary.into(),
            },
            delta,
            turn,
        )
    }

    /// Record a gift; the delta scales with value.
    pub fn record_gift(&mut self, item: impl Into<String>, value: u32, turn: Turn) -> DispositionChange {
        let delta = i32::try_from(value / 5).unwrap_or(GIFT_DELTA_CAP).clamp(1, GIFT_DELTA_CAP);
        self.apply(
            MemoryKind::Gift {
                item: item.into(),
                value,
            },
            delta,
            turn,
        )
    }

    /// Record a new promise.
    pub fn record_promise(
        &mut self,
        text: impl Into<String>,
        weight: PromiseWeight,
        due_turn: Option<Turn>,
        turn: Turn,
    ) -> PromiseId {
        let text = text.into();
        let id = PromiseId::new();
        self.promises.push(Promise {
            id,
            text: text.clone(),
            weight,
            status: PromiseStatus::Pending,
            made_turn: turn,
            due_turn,
        });
        self.apply(
            MemoryKind::PromiseMade {
                promise: id,
                text,
                weight,
            },
            0,
            turn,
        );
        id
    }

    /// Resolve a pending promise.
    ///
    /// Not fulfilled before its due turn counts as withdrawn; not fulfilled
    /// at or after it (or with no due turn) counts as broken.  A broken
    /// promise drops the NPC exactly one band, deeper into that band for a
    /// major promise.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for an unknown promise
    /// or [`ReverieError::InvariantViolation`] if it is already resolved.
    pub fn resolve_promise(&mut self, id: PromiseId, fulfilled: bool, turn: Turn) -> Result<DispositionChange> {
        let promise = self
            .promises
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ReverieError::unknown("promise", id))?;
        if promise.status != PromiseStatus::Pending {
            return Err(ReverieError::InvariantViolation(format!(
                "promise '{}' is already resolved",
                promise.text
            )));
        }
        let status = if fulfilled {
            PromiseStatus::Fulfilled
        } else if promise.due_turn.is_some_and(|due| turn < due) {
            PromiseStatus::Withdrawn
        } else {
            PromiseStatus::Broken
        };
        promise.status = status;
        let mut delta = status.delta(promise.weight);
        let kind = MemoryKind::PromiseResolved {
            promise: id,
            text: promise.text.clone(),
            status,
        };
        if status == PromiseStatus::Broken {
            delta = broken_landing(self.disposition, delta) - self.disposition;
        }
        Ok(self.apply(kind, delta, turn))
    }

    /// Break every pending promise whose due turn has passed.
    pub fn expire_promises(&mut self, turn: Turn) -> Vec<DispositionChange> {
        let overdue: Vec<PromiseId> = self
            .promises
            .iter()
            .filter(|p| p.status == PromiseStatus::Pending && p.due_turn.is_some_and(|due| turn > due))
            .map(|p| p.id)
            .collect();
        overdue
            .into_iter()
            .filter_map(|id| self.resolve_promise(id, false, turn).ok())
            .collect()
    }

    /// Pending promises.
    pub fn pending_promises(&self) -> impl Iterator<Item = &Promise> {
        self.promises.iter().filter(|p| p.status == PromiseStatus::Pending)
    }

    /// Mark the NPC dead.
    pub fn mark_dead(&mut self, cause: impl Into<String>, turn: Turn) {
        if self.alive {
            self.alive = false;
            self.apply(MemoryKind::Event { summary: cause.into() }, 0, turn);
        }
    }

    /// Check score bounds, band agreement and the ledger identity.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] naming the broken rule.
    pub fn validate(&self) -> Result<()> {
        if !(DISPOSITION_MIN..=DISPOSITION_MAX).contains(&self.disposition) {
            return Err(ReverieError::InvariantViolation(format!(
                "{} has disposition {} outside the scale",
                self.name, self.disposition
            )));
        }
        if self.band != DispositionBand::from_score(self.disposition) {
            return Err(ReverieError::InvariantViolation(format!(
                "{} is {} but the score says {}",
                self.name,
                self.band,
                DispositionBand::from_score(self.disposition)
            )));
        }
        if self.baseline + self.memory.total_delta() != self.disposition {
            return Err(ReverieError::InvariantViolation(format!(
                "{}'s memory does not account for the disposition score",
                self.name
            )));
        }
        if self.memory.len() > self.memory.cap() {
            return Err(ReverieError::InvariantViolation(format!(
                "{}'s memory log exceeds its cap",
                self.name
            )));
        }
        for entry in self.memory.entries() {
            if entry.band_path.windows(2).any(|w| w[0].path_to(w[1]).len() != 2) {
                return Err(ReverieError::InvariantViolation(format!(
                    "{}'s memory records a band skip",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
