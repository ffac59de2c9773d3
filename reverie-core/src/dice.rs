//! Dice & Mechanics Resolver.
//!
//! Every check in the game is one d20 roll:
//!
//! ```text
//!   total = d20 + stat_value + modifier
//!
//!   natural 20            -> CriticalSuccess   (ignores total)
//!   natural 1             -> CriticalFailure   (ignores total)
//!   total >= difficulty+5 -> SuccessWithBonus
//!   total >= difficulty   -> Success
//!   otherwise             -> Failure
//! ```
//!
//! Difficulties come from a fixed per-situation table ([`Situation`]),
//! shifted by the campaign's [`DifficultyPreset`].  Randomness comes from a
//! per-session [`DiceStream`] seeded once at campaign creation, so a seed
//! plus the sequence of actions reproduces every roll exactly.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Margin over the difficulty needed for [`Outcome::SuccessWithBonus`].
pub const BONUS_MARGIN: i32 = 5;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result tier of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Natural 1.
    CriticalFailure,
    /// Total below difficulty.
    Failure,
    /// Total met difficulty.
    Success,
    /// Total beat difficulty by at least [`BONUS_MARGIN`].
    SuccessWithBonus,
    /// Natural 20.
    CriticalSuccess,
}

impl Outcome {
    /// Whether the check succeeded at any tier.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(
            self,
            Self::Success | Self::SuccessWithBonus | Self::CriticalSuccess
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CriticalFailure => "Critical Failure",
            Self::Failure => "Failure",
            Self::Success => "Success",
            Self::SuccessWithBonus => "Success with Bonus",
            Self::CriticalSuccess => "Critical Success",
        };
        f.write_str(label)
    }
}

/// Classify a roll.  The natural die is checked before the total.
#[must_use]
pub fn classify(natural: u8, total: i32, difficulty: i32) -> Outcome {
    match natural {
        20 => Outcome::CriticalSuccess,
        1 => Outcome::CriticalFailure,
        _ if total >= difficulty + BONUS_MARGIN => Outcome::SuccessWithBonus,
        _ if total >= difficulty => Outcome::Success,
        _ => Outcome::Failure,
    }
}

// ---------------------------------------------------------------------------
// Roll
// ---------------------------------------------------------------------------

/// A fully resolved check, kept for narration and the roll log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    /// The unmodified d20.
    pub natural: u8,
    /// Stat contribution.
    pub stat_value: i32,
    /// Class, equipment and situational modifiers.
    pub modifier: i32,
    /// `natural + stat_value + modifier`.
    pub total: i32,
    /// Target number.
    pub difficulty: i32,
    /// Resolved tier.
    pub outcome: Outcome,
}

impl Roll {
    /// Resolve a check from an already-rolled natural die.
    #[must_use]
    pub fn from_natural(natural: u8, stat_value: i32, modifier: i32, difficulty: i32) -> Self {
        let total = i32::from(natural) + stat_value + modifier;
        Self {
            natural,
            stat_value,
            modifier,
            total,
            difficulty,
            outcome: classify(natural, total, difficulty),
        }
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "d20({}) + {} + {} = {} vs {} -> {}",
            self.natural, self.stat_value, self.modifier, self.total, self.difficulty, self.outcome
        )
    }
}

// ---------------------------------------------------------------------------
// Difficulty table
// ---------------------------------------------------------------------------

/// Situations the game rolls for.  Each maps to one fixed difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    /// Player attacks an enemy.
    Attack,
    /// Player braces against incoming attacks.
    Defend,
    /// Player tries to break off combat.
    Retreat,
    /// Player tries something creative mid-fight.
    Improvise,
    /// An enemy attacks the player.
    EnemyAttack,
    /// Searching a location for hidden things.
    Search,
    /// Talking an NPC into something.
    Persuade,
    /// Free-form `roll <stat>` with no other context.
    AmbientCheck,
}

impl Situation {
    /// Base difficulty before the campaign preset is applied.
    #[must_use]
    pub const fn base_difficulty(self) -> i32 {
        match self {
            Self::Attack | Self::EnemyAttack | Self::Search | Self::AmbientCheck => 12,
            Self::Defend | Self::Retreat => 10,
            Self::Improvise | Self::Persuade => 14,
        }
    }
}

/// Campaign-wide difficulty shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyPreset {
    /// Every player-facing difficulty lowered by 2.
    Easy,
    /// Table values as-is.
    #[default]
    Normal,
    /// Every player-facing difficulty raised by 2.
    Hard,
}

impl DifficultyPreset {
    /// Parse a config string; unknown values fall back to `Normal`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Normal,
        }
    }

    /// Difficulty for `situation` under this preset.
    ///
    /// Enemy attacks are the enemy's check against the player, so the shift
    /// runs the other way for them.
    #[must_use]
    pub const fn difficulty(self, situation: Situation) -> i32 {
        let shift = match self {
            Self::Easy => -2,
            Self::Normal => 0,
            Self::Hard => 2,
        };
        match situation {
            Situation::EnemyAttack => situation.base_difficulty() - shift,
            _ => situation.base_difficulty() + shift,
        }
    }
}

// ---------------------------------------------------------------------------
// Seeded stream
// ---------------------------------------------------------------------------

/// Serialized form of a [`DiceStream`]: the seed and how far it has advanced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DiceState {
    seed: u64,
    draws: u64,
}

/// Per-session deterministic random source.
///
/// Every die consumes exactly one 32-bit word from the generator, so the
/// stream can be rebuilt from `(seed, draws)` after a save/load cycle.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "DiceState", into = "DiceState")]
pub struct DiceStream {
    seed: u64,
    draws: u64,
    rng: StdRng,
}

impl DiceStream {
    /// Start a fresh stream.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Rebuild a stream that has already produced `draws` dice.
    #[must_use]
    pub fn resume(seed: u64, draws: u64) -> Self {
        let mut stream = Self::new(seed);
        for _ in 0..draws {
            stream.rng.next_u32();
        }
        stream.draws = draws;
        stream
    }

    /// The seed this stream was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of dice drawn so far.
    #[must_use]
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Roll one die with `sides` faces, returning `1..=sides`.
    pub fn die(&mut self, sides: u32) -> u32 {
        let sides = sides.max(1);
        self.draws += 1;
        let word = u64::from(self.rng.next_u32());
        // Multiply-shift maps the word onto 0..sides without a retry loop,
        // which keeps one word per die.
        let scaled = (word * u64::from(sides)) >> 32;
        u32::try_from(scaled).unwrap_or(0) + 1
    }

    /// Roll a d20.
    pub fn d20(&mut self) -> u8 {
        u8::try_from(self.die(20)).unwrap_or(20)
    }

    /// Roll a full check: `resolve(stat_value, modifier, difficulty)`.
    pub fn resolve(&mut self, stat_value: i32, modifier: i32, difficulty: i32) -> Roll {
        let natural = self.d20();
        let roll = Roll::from_natural(natural, stat_value, modifier, difficulty);
        tracing::trace!(
            natural,
            total = roll.total,
            difficulty,
            outcome = %roll.outcome,
            "dice resolved"
        );
        roll
    }

    /// Pick an index in `0..len` (for template selection).  Returns 0 for empty input.
    pub fn pick(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let sides = u32::try_from(len).unwrap_or(u32::MAX);
        usize::try_from(self.die(sides) - 1).unwrap_or(0)
    }
}

impl From<DiceState> for DiceStream {
    fn from(state: DiceState) -> Self {
        Self::resume(state.seed, state.draws)
    }
}

impl From<DiceStream> for DiceState {
    fn from(stream: DiceStream) -> Self {
        Self {
            seed: stream.seed,
            draws: stream.draws,
        }
    }
}

impl PartialEq for DiceStream {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed && self.draws == other.draws
    }
}

impl Eq for DiceStream {}

impl fmt::Debug for DiceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiceStream")
            .field("seed", &self.seed)
            .field("draws", &self.draws)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
