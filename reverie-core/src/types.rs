//! Core type definitions shared by every Reverie subsystem.
//!
//! Entities reference each other through the identifier types defined
//! here; the owning tables live on [`crate::SaveGame`].  All types are
//! serializable and ordered so that saves serialize deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for the player character.
    CharacterId
);
entity_id!(
    /// Unique identifier for a materialized location.
    LocationId
);
entity_id!(
    /// Unique identifier for an NPC.
    NpcId
);
entity_id!(
    /// Unique identifier for a quest.
    QuestId
);
entity_id!(
    /// Unique identifier for a quest objective.
    ObjectiveId
);
entity_id!(
    /// Unique identifier for an inventory item (one per stack).
    ItemId
);
entity_id!(
    /// Unique identifier for an enemy inside a combat encounter.
    EnemyId
);
entity_id!(
    /// Unique identifier for a promise made to an NPC.
    PromiseId
);
entity_id!(
    /// Unique identifier for a secret hidden in a location.
    SecretId
);

/// Turn counter.  Turn 0 is campaign creation; each committed turn adds one.
pub type Turn = u64;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// One of the three character stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    /// Strength, endurance, force.
    Might,
    /// Cleverness, perception, trickery.
    Wit,
    /// Willpower, charm, composure.
    Spirit,
}

impl Stat {
    /// All stats in sheet order.
    pub const ALL: [Stat; 3] = [Stat::Might, Stat::Wit, Stat::Spirit];
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Might => write!(f, "Might"),
            Self::Wit => write!(f, "Wit"),
            Self::Spirit => write!(f, "Spirit"),
        }
    }
}

impl FromStr for Stat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "might" | "str" | "strength" => Ok(Self::Might),
            "wit" | "int" | "wits" => Ok(Self::Wit),
            "spirit" | "spi" | "will" => Ok(Self::Spirit),
            other => Err(format!("unknown stat: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Danger Level
// ---------------------------------------------------------------------------

/// Ordinal health abstraction shared by the player and enemies.
///
/// Ordered from worst to best so that `Defeated < Critical < Bloodied < Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerLevel {
    /// Out of the fight.
    Defeated,
    /// One more hit ends it.
    Critical,
    /// Hurt but standing.
    Bloodied,
    /// Unharmed.
    Fresh,
}

impl DangerLevel {
    const fn rank(self) -> u8 {
        match self {
            Self::Defeated => 0,
            Self::Critical => 1,
            Self::Bloodied => 2,
            Self::Fresh => 3,
        }
    }

    const fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Self::Defeated,
            1 => Self::Critical,
            2 => Self::Bloodied,
            _ => Self::Fresh,
        }
    }

    /// Move `steps` toward Defeated, saturating.
    #[must_use]
    pub const fn worsen(self, steps: u8) -> Self {
        Self::from_rank(self.rank().saturating_sub(steps))
    }

    /// Move `steps` toward Fresh, saturating.
    #[must_use]
    pub const fn recover(self, steps: u8) -> Self {
        let rank = self.rank().saturating_add(steps);
        Self::from_rank(if rank > 3 { 3 } else { rank })
    }

    /// Whether this participant is out of the fight.
    #[must_use]
    pub const fn is_defeated(self) -> bool {
        matches!(self, Self::Defeated)
    }
}

impl fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defeated => write!(f, "Defeated"),
            Self::Critical => write!(f, "Critical"),
            Self::Bloodied => write!(f, "Bloodied"),
            Self::Fresh => write!(f, "Fresh"),
        }
    }
}

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// A compass or vertical direction used to label exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// North.
    North,
    /// South.
    South,
    /// East.
    East,
    /// West.
    West,
    /// Up (stairs, cliffs).
    Up,
    /// Down (cellars, pits).
    Down,
    /// Into an enclosed space.
    In,
    /// Out of an enclosed space.
    Out,
}

impl Direction {
    /// All directions in canonical order.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
        Direction::In,
        Direction::Out,
    ];

    /// Parse a direction word or abbreviation (`n`, `north`, `u`, `inside`, ...).
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Some(Self::North),
            "s" | "south" => Some(Self::South),
            "e" | "east" => Some(Self::East),
            "w" | "west" => Some(Self::West),
            "u" | "up" | "upstairs" => Some(Self::Up),
            "d" | "down" | "downstairs" => Some(Self::Down),
            "in" | "inside" | "enter" => Some(Self::In),
            "out" | "outside" | "exit" => Some(Self::Out),
            _ => None,
        }
    }

    /// The direction that leads back.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
            Self::In => "in",
            Self::Out => "out",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn danger_saturates_at_both_ends() {
        assert_eq!(DangerLevel::Critical.worsen(5), DangerLevel::Defeated);
        assert_eq!(DangerLevel::Bloodied.recover(9), DangerLevel::Fresh);
        assert_eq!(DangerLevel::Fresh.worsen(1), DangerLevel::Bloodied);
        assert_eq!(DangerLevel::Defeated.recover(1), DangerLevel::Critical);
    }

    #[test]
    fn danger_is_ordinal() {
        assert!(DangerLevel::Fresh > DangerLevel::Bloodied);
        assert!(DangerLevel::Critical > DangerLevel::Defeated);
    }

    #[test]
    fn direction_parse_and_opposite() {
        assert_eq!(Direction::parse("N"), Some(Direction::North));
        assert_eq!(Direction::parse("downstairs"), Some(Direction::Down));
        assert_eq!(Direction::parse("sideways"), None);
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn stat_from_str() {
        assert_eq!("MIGHT".parse::<Stat>(), Ok(Stat::Might));
        assert!("luck".parse::<Stat>().is_err());
    }
}
