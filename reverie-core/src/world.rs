//! World Graph Store.
//!
//! Locations are created lazily: an exit starts out pointing nowhere and the
//! first traversal materializes exactly one new location behind it, wiring
//! an exit back the way the player came.  Once created, a location's identity
//! and description never change; only secret reveal flags, visit flags and
//! threat state mutate.
//!
//! ```text
//!   [A] --north--> (unexplored)      traverse north
//!                                  ─────────────────▶  [A] --north--> [B]
//!                                                      [A] <--south-- [B]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::combat::EnemyTemplate;
use crate::dice::{DiceStream, Outcome};
use crate::error::{Result, ReverieError};
use crate::types::{Direction, LocationId, NpcId, SecretId, Stat, Turn};

/// Maximum exits a synthesized location gets besides the way back.
pub const MAX_NEW_EXITS: usize = 3;

// ---------------------------------------------------------------------------
// Location model
// ---------------------------------------------------------------------------

/// Broad category of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Towns, inns, markets.
    Settlement,
    /// Roads, forests, fields.
    #[default]
    Wilderness,
    /// Caves, ruins, cellars.
    Dungeon,
    /// A wide area seen from afar.
    Region,
}

impl LocationKind {
    /// Parse a kind name; unknown names become `Wilderness`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "settlement" | "town" | "village" | "city" => Self::Settlement,
            "dungeon" | "cave" | "ruin" | "ruins" => Self::Dungeon,
            "region" => Self::Region,
            _ => Self::Wilderness,
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settlement => write!(f, "settlement"),
            Self::Wilderness => write!(f, "wilderness"),
            Self::Dungeon => write!(f, "dungeon"),
            Self::Region => write!(f, "region"),
        }
    }
}

/// What it takes to reveal a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretTrigger {
    /// Any thorough inspection of the location.
    OnInspect,
    /// The inspection must mention this word.
    Keyword(String),
    /// A successful check on `stat` against `difficulty`.
    Check {
        /// Stat rolled.
        stat: Stat,
        /// Target number.
        difficulty: i32,
    },
}

/// A hidden fact about a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Identity.
    pub id: SecretId,
    /// What the player learns.
    pub text: String,
    /// Reveal condition.
    pub trigger: SecretTrigger,
    /// Whether it has been revealed.
    pub revealed: bool,
}

/// Evidence offered when trying to reveal a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// The player inspected the location; `detail` is what they looked at.
    Inspection {
        /// Free-text focus of the inspection (may be empty).
        detail: String,
    },
    /// A check was rolled for this secret.
    Check(Outcome),
}

/// Result of [`WorldGraph::reveal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// The secret was hidden and is now revealed.
    Revealed(String),
    /// It was already revealed; nothing changed.
    AlreadyRevealed,
    /// The evidence does not satisfy the trigger; nothing changed.
    ConditionUnmet,
}

/// One exit.  `None` means the neighbor has not been materialized yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    /// Destination, once known.
    pub target: Option<LocationId>,
}

/// A materialized location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Identity.
    pub id: LocationId,
    /// Name.
    pub name: String,
    /// Fixed description.
    pub description: String,
    /// Category.
    pub kind: LocationKind,
    /// Free-form tags (e.g. "tavern", "haunted").
    pub tags: Vec<String>,
    /// Exits by direction.
    pub exits: BTreeMap<Direction, Exit>,
    /// Hidden facts.
    pub secrets: Vec<Secret>,
    /// NPCs currently here.
    pub npcs: BTreeSet<NpcId>,
    /// Enemies that attack on arrival until defeated.
    pub threats: Vec<EnemyTemplate>,
    /// Whether the player has been here.
    pub visited: bool,
    /// Turn this location was created.
    pub created_turn: Turn,
}

impl Location {
    /// Secrets that are still hidden.
    pub fn hidden_secrets(&self) -> impl Iterator<Item = &Secret> {
        self.secrets.iter().filter(|s| !s.revealed)
    }

    /// Whether arriving here starts a fight.
    #[must_use]
    pub fn has_threat(&self) -> bool {
        !self.threats.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// Draft of a secret inside a [`LocationSeed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSeed {
    /// What the player learns.
    pub text: String,
    /// Reveal condition.
    pub trigger: SecretTrigger,
}

/// Everything needed to materialize one location.
///
/// Seeds come from the narration gateway or from [`fallback_seed`], and are
/// always passed through [`LocationSeed::sanitized`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationSeed {
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Category.
    pub kind: LocationKind,
    /// Tags.
    pub tags: Vec<String>,
    /// Onward exits (the way back is added automatically).
    pub exits: Vec<Direction>,
    /// Hidden facts.
    pub secrets: Vec<SecretSeed>,
    /// Enemies waiting here.
    pub threats: Vec<EnemyTemplate>,
}

impl LocationSeed {
    /// Normalize a draft: non-empty text, unique bounded exits, never an exit
    /// in the `reserved` direction (the way back).
    #[must_use]
    pub fn sanitized(mut self, reserved: Option<Direction>) -> Self {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            self.name = format!("Unnamed {}", self.kind);
        }
        self.description = self.description.trim().to_string();
        if self.description.is_empty() {
            self.description = format!("A quiet stretch of {} with little to remark upon.", self.kind);
        }
        let mut seen = BTreeSet::new();
        self.exits
            .retain(|d| Some(*d) != reserved && seen.insert(*d));
        self.exits.truncate(MAX_NEW_EXITS);
        self.secrets.retain(|s| !s.text.trim().is_empty());
        self.tags.retain(|t| !t.trim().is_empty());
        self
    }
}

const WILDERNESS_NAMES: &[&str] = &[
    "Whispering Pines",
    "The Broken Causeway",
    "Fogbound Meadow",
    "Old Quarry Road",
    "The Lantern Marsh",
];
const DUNGEON_NAMES: &[&str] = &[
    "Server Crypt",
    "The Flooded Cellar",
    "Hall of Deprecated Idols",
    "Cable Warrens",
];
const SETTLEMENT_NAMES: &[&str] = &[
    "Merge Hollow",
    "Rebase Crossing",
    "Standup Green",
];
const DETAILS: &[&str] = &[
    "Wind moves through it in slow, uneven breaths.",
    "Something small scurries out of sight as you arrive.",
    "Old footprints cross the ground and vanish.",
    "A faint hum, like distant machinery, hangs in the air.",
    "Moss has swallowed most of the stonework.",
];
const SECRETS: &[&str] = &[
    "A loose stone hides a cache of old coins.",
    "Scratched into a post: a map fragment pointing further on.",
    "A hollow under the roots holds a sealed letter.",
];

/// Deterministic template-based seed for when the gateway is unavailable.
///
/// Draws from the session dice so replays produce identical worlds.
pub fn fallback_seed(from: &Location, direction: Direction, dice: &mut DiceStream) -> LocationSeed {
    let kind = match (from.kind, direction) {
        (_, Direction::Down | Direction::In) => LocationKind::Dungeon,
        (LocationKind::Dungeon, Direction::Up | Direction::Out) => LocationKind::Wilderness,
        (LocationKind::Wilderness, _) if dice.die(6) == 6 => LocationKind::Settlement,
        _ => LocationKind::Wilderness,
    };
    let names = match kind {
        LocationKind::Dungeon => DUNGEON_NAMES,
        LocationKind::Settlement => SETTLEMENT_NAMES,
        _ => WILDERNESS_NAMES,
    };
    let name = names[dice.pick(names.len())].to_string();
    let detail = DETAILS[dice.pick(DETAILS.len())];
    let description = format!("You head {direction} from {} and reach {name}. {detail}", from.name);

    let onward: Vec<Direction> = Direction::ALL[..4]
        .iter()
        .copied()
        .filter(|d| *d != direction.opposite())
        .collect();
    let exit_count = 1 + dice.pick(2);
    let mut exits = Vec::with_capacity(exit_count);
    for _ in 0..exit_count {
        exits.push(onward[dice.pick(onward.len())]);
    }

    let secrets = if dice.die(3) == 3 {
        vec![SecretSeed {
            text: SECRETS[dice.pick(SECRETS.len())].to_string(),
            trigger: SecretTrigger::Check {
                stat: Stat::Wit,
                difficulty: 12,
            },
        }]
    } else {
        Vec::new()
    };

    let threats = if kind != LocationKind::Settlement && dice.die(4) == 4 {
        vec![EnemyTemplate::new("Feral Bug Swarm", 0)]
    } else {
        Vec::new()
    };

    LocationSeed {
        name,
        description,
        kind,
        tags: vec![kind.to_string()],
        exits,
        secrets,
        threats,
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Where an exit leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTarget {
    /// An already materialized location.
    Known(LocationId),
    /// Nobody has gone this way yet.
    Unexplored,
}

/// Arena of every materialized location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldGraph {
    locations: BTreeMap<LocationId, Location>,
}

impl WorldGraph {
    /// An empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether nothing has been materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// All locations.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// Look up a location.
    #[must_use]
    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    /// Look up a location mutably.
    pub fn get_mut(&mut self, id: LocationId) -> Option<&mut Location> {
        self.locations.get_mut(&id)
    }

    fn require(&self, id: LocationId) -> Result<&Location> {
        self.get(id).ok_or_else(|| ReverieError::unknown("location", id))
    }

    fn build(seed: LocationSeed, turn: Turn) -> Location {
        Location {
            id: LocationId::new(),
            name: seed.name,
            description: seed.description,
            kind: seed.kind,
            tags: seed.tags,
            exits: seed
                .exits
                .into_iter()
                .map(|d| (d, Exit { target: None }))
                .collect(),
            secrets: seed
                .secrets
                .into_iter()
                .map(|s| Secret {
                    id: SecretId::new(),
                    text: s.text,
                    trigger: s.trigger,
                    revealed: false,
                })
                .collect(),
            npcs: BTreeSet::new(),
            threats: seed.threats,
            visited: false,
            created_turn: turn,
        }
    }

    /// Materialize a location with no inbound exit (campaign start).
    pub fn insert_root(&mut self, seed: LocationSeed, turn: Turn) -> LocationId {
        let location = Self::build(seed.sanitized(None), turn);
        let id = location.id;
        self.locations.insert(id, location);
        id
    }

    /// Return a location, marking it visited.  Never regenerates anything.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for unknown ids.
    pub fn visit(&mut self, id: LocationId) -> Result<&Location> {
        let location = self
            .locations
            .get_mut(&id)
            .ok_or_else(|| ReverieError::unknown("location", id))?;
        location.visited = true;
        Ok(&*location)
    }

    /// Resolve an exit without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] if `from` is unknown or
    /// has no exit in `direction`.
    pub fn exit(&self, from: LocationId, direction: Direction) -> Result<ExitTarget> {
        let location = self.require(from)?;
        let exit = location
            .exits
            .get(&direction)
            .ok_or_else(|| ReverieError::unknown("exit", format!("{direction} from {}", location.name)))?;
        Ok(match exit.target {
            Some(id) => ExitTarget::Known(id),
            None => ExitTarget::Unexplored,
        })
    }

    /// Create the one location behind an unexplored exit and link both ways.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for a missing exit, or
    /// [`ReverieError::InvariantViolation`] if the exit is already materialized.
    pub fn materialize(
        &mut self,
        from: LocationId,
        direction: Direction,
        seed: LocationSeed,
        turn: Turn,
    ) -> Result<LocationId> {
        if let ExitTarget::Known(existing) = self.exit(from, direction)? {
            return Err(ReverieError::InvariantViolation(format!(
                "exit {direction} is already materialized as {existing}"
            )));
        }
        let back = direction.opposite();
        let mut location = Self::build(seed.sanitized(Some(back)), turn);
        location.exits.insert(back, Exit { target: Some(from) });
        let id = location.id;
        tracing::debug!(location = %location.name, %direction, "location materialized");
        self.locations.insert(id, location);
        if let Some(origin) = self.locations.get_mut(&from) {
            origin.exits.insert(direction, Exit { target: Some(id) });
        }
        Ok(id)
    }

    /// Try to reveal a secret.  Idempotent: revealing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for unknown ids.
    pub fn reveal(
        &mut self,
        location: LocationId,
        secret: SecretId,
        evidence: &Evidence,
    ) -> Result<RevealOutcome> {
        let place = self
            .locations
            .get_mut(&location)
            .ok_or_else(|| ReverieError::unknown("location", location))?;
        let entry = place
            .secrets
            .iter_mut()
            .find(|s| s.id == secret)
            .ok_or_else(|| ReverieError::unknown("secret", secret))?;
        if entry.revealed {
            return Ok(RevealOutcome::AlreadyRevealed);
        }
        let satisfied = match (&entry.trigger, evidence) {
            (SecretTrigger::OnInspect, Evidence::Inspection { .. }) => true,
            (SecretTrigger::Keyword(word), Evidence::Inspection { detail }) => detail
                .to_ascii_lowercase()
                .contains(&word.to_ascii_lowercase()),
            (SecretTrigger::Check { .. }, Evidence::Check(outcome)) => outcome.is_success(),
            _ => false,
        };
        if !satisfied {
            return Ok(RevealOutcome::ConditionUnmet);
        }
        entry.revealed = true;
        Ok(RevealOutcome::Revealed(entry.text.clone()))
    }

    /// Check that every exit and NPC placement points at something real.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] naming the dangling reference.
    pub fn validate(&self, known_npcs: &BTreeSet<NpcId>) -> Result<()> {
        for location in self.locations.values() {
            for (direction, exit) in &location.exits {
                if let Some(target) = exit.target {
                    if !self.locations.contains_key(&target) {
                        return Err(ReverieError::InvariantViolation(format!(
                            "exit {direction} of '{}' points to missing location {target}",
                            location.name
                        )));
                    }
                }
            }
            if let Some(npc) = location.npcs.iter().find(|n| !known_npcs.contains(n)) {
                return Err(ReverieError::InvariantViolation(format!(
                    "'{}' lists unknown npc {npc}",
                    location.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
