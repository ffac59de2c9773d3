//! The player character: stats, class, danger level, experience.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ReverieError};
use crate::types::{CharacterId, DangerLevel, Stat};

/// Points distributed across the three stats at creation.
pub const STAT_POINT_TOTAL: u8 = 12;
/// Lowest legal value for a single stat.
pub const STAT_MIN: u8 = 1;
/// Highest legal value for a single stat.
pub const STAT_MAX: u8 = 6;
/// Gold every new character starts with.
pub const STARTING_GOLD: u32 = 50;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Might / Wit / Spirit.  Only constructible through [`Stats::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    might: u8,
    wit: u8,
    spirit: u8,
}

impl Stats {
    /// Validate a distribution: each stat in `1..=6`, sum exactly 12.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidCharacter`] describing the first rule broken.
    pub fn new(might: u8, wit: u8, spirit: u8) -> Result<Self> {
        let stats = Self { might, wit, spirit };
        stats.validate()?;
        Ok(stats)
    }

    /// Check the distribution rules against an existing value.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidCharacter`] if a stat is out of range or
    /// the sum is not [`STAT_POINT_TOTAL`].
    pub fn validate(&self) -> Result<()> {
        for stat in Stat::ALL {
            let value = self.get(stat);
            if !(STAT_MIN..=STAT_MAX).contains(&value) {
                return Err(ReverieError::InvalidCharacter(format!(
                    "{stat} must be between {STAT_MIN} and {STAT_MAX}, got {value}"
                )));
            }
        }
        let sum = u16::from(self.might) + u16::from(self.wit) + u16::from(self.spirit);
        if sum != u16::from(STAT_POINT_TOTAL) {
            return Err(ReverieError::InvalidCharacter(format!(
                "stats must sum to {STAT_POINT_TOTAL}, got {sum}"
            )));
        }
        Ok(())
    }

    /// Value of one stat.
    #[must_use]
    pub const fn get(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Might => self.might,
            Stat::Wit => self.wit,
            Stat::Spirit => self.spirit,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Might {} / Wit {} / Spirit {}", self.might, self.wit, self.spirit)
    }
}

// ---------------------------------------------------------------------------
// Class
// ---------------------------------------------------------------------------

/// Character class.  Each grants fixed check modifiers and a starting kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerClass {
    /// Frontline fighter.
    CodeWarrior,
    /// Endures anything, talks around the rest.
    MeetingSurvivor,
    /// Iron will, heavy armor.
    InboxKnight,
    /// A little good at everything.
    Wanderer,
    /// Knows an answer for every question.
    StackOverflow,
    /// Leads from the middle.
    ScrumMaster,
    /// Patient, tough, knows old tricks.
    LegacyMaintainer,
    /// Quick, clever, gone before trouble lands.
    DeployNinja,
}

impl PlayerClass {
    /// Every class, in menu order.
    pub const ALL: [PlayerClass; 8] = [
        PlayerClass::CodeWarrior,
        PlayerClass::MeetingSurvivor,
        PlayerClass::InboxKnight,
        PlayerClass::Wanderer,
        PlayerClass::StackOverflow,
        PlayerClass::ScrumMaster,
        PlayerClass::LegacyMaintainer,
        PlayerClass::DeployNinja,
    ];

    /// Fixed modifier this class adds to checks using `stat`.
    #[must_use]
    pub const fn stat_modifier(self, stat: Stat) -> i32 {
        match (self, stat) {
            (Self::CodeWarrior, Stat::Might)
            | (Self::InboxKnight, Stat::Spirit)
            | (Self::StackOverflow, Stat::Wit) => 2,
            (Self::MeetingSurvivor, Stat::Spirit | Stat::Wit)
            | (Self::ScrumMaster, Stat::Spirit | Stat::Might)
            | (Self::LegacyMaintainer, Stat::Might | Stat::Wit)
            | (Self::DeployNinja, Stat::Wit)
            | (Self::Wanderer, _) => 1,
            _ => 0,
        }
    }

    /// Extra modifier on retreat checks.
    #[must_use]
    pub const fn retreat_modifier(self) -> i32 {
        match self {
            Self::DeployNinja => 2,
            _ => 0,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CodeWarrior => "Code Warrior",
            Self::MeetingSurvivor => "Meeting Survivor",
            Self::InboxKnight => "Inbox Knight",
            Self::Wanderer => "Wanderer",
            Self::StackOverflow => "Stack Overflow",
            Self::ScrumMaster => "Scrum Master",
            Self::LegacyMaintainer => "Legacy Maintainer",
            Self::DeployNinja => "Deploy Ninja",
        }
    }
}

impl fmt::Display for PlayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlayerClass {
    type Err = ReverieError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted: String = s
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|class| {
                class
                    .label()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>()
                    .eq_ignore_ascii_case(&wanted)
            })
            .ok_or_else(|| ReverieError::InvalidCharacter(format!("unknown class: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Character
// ---------------------------------------------------------------------------

/// Everything the player chooses at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSheet {
    /// Character name.
    pub name: String,
    /// Free-text race.
    pub race: String,
    /// Class.
    pub class: PlayerClass,
    /// `(might, wit, spirit)` before validation.
    pub stats: (u8, u8, u8),
    /// Free-text background.
    pub background: String,
}

/// The one player character owned by a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Identity.
    pub id: CharacterId,
    /// Name.
    pub name: String,
    /// Race.
    pub race: String,
    /// Class.
    pub class: PlayerClass,
    /// Background.
    pub background: String,
    /// Validated stats.
    pub stats: Stats,
    /// Current danger level.
    pub danger: DangerLevel,
    /// Level, starting at 1.
    pub level: u32,
    /// Total experience earned.
    pub xp: u32,
}

/// What happened when experience was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpGain {
    /// Level before the gain.
    pub from_level: u32,
    /// Level after the gain.
    pub to_level: u32,
}

impl XpGain {
    /// Whether at least one level was gained.
    #[must_use]
    pub fn leveled_up(&self) -> bool {
        self.to_level > self.from_level
    }
}

impl Character {
    /// Create a level-1, Fresh character from a sheet.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidCharacter`] for an empty name or an
    /// illegal stat distribution.  Nothing is created on error.
    pub fn create(sheet: &CharacterSheet) -> Result<Self> {
        let name = sheet.name.trim();
        if name.is_empty() {
            return Err(ReverieError::InvalidCharacter("name must not be empty".into()));
        }
        let (might, wit, spirit) = sheet.stats;
        let stats = Stats::new(might, wit, spirit)?;
        Ok(Self {
            id: CharacterId::new(),
            name: name.to_string(),
            race: sheet.race.trim().to_string(),
            class: sheet.class,
            background: sheet.background.trim().to_string(),
            stats,
            danger: DangerLevel::Fresh,
            level: 1,
            xp: 0,
        })
    }

    /// Stat value plus class modifier for a check on `stat`.
    #[must_use]
    pub fn check_bonus(&self, stat: Stat) -> (i32, i32) {
        (i32::from(self.stats.get(stat)), self.class.stat_modifier(stat))
    }

    /// Cumulative XP required to reach `level + 1`.
    #[must_use]
    pub fn xp_for_next_level(level: u32) -> u32 {
        (1..=level).map(|i| 100 * i).sum()
    }

    /// Grant experience, applying every level-up it pays for.
    ///
    /// A level-up fully restores danger to Fresh.
    pub fn gain_xp(&mut self, amount: u32) -> XpGain {
        let from_level = self.level;
        self.xp = self.xp.saturating_add(amount);
        while self.xp >= Self::xp_for_next_level(self.level) {
            self.level += 1;
            self.danger = DangerLevel::Fresh;
        }
        XpGain {
            from_level,
            to_level: self.level,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(stats: (u8, u8, u8)) -> CharacterSheet {
        CharacterSheet {
            name: "Ada".into(),
            race: "Human".into(),
            class: PlayerClass::CodeWarrior,
            stats,
            background: "Former sysadmin".into(),
        }
    }

    #[test]
    fn valid_distribution_creates_fresh_character() {
        let hero = Character::create(&sheet((5, 4, 3))).expect("valid sheet");
        assert_eq!(hero.danger, DangerLevel::Fresh);
        assert_eq!(hero.level, 1);
        assert_eq!(hero.stats.get(Stat::Might), 5);
    }

    #[test]
    fn wrong_sum_rejected() {
        assert!(Character::create(&sheet((6, 6, 1))).is_err());
        assert!(Character::create(&sheet((4, 4, 3))).is_err());
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(Character::create(&sheet((0, 6, 6))).is_err());
        assert!(Character::create(&sheet((7, 4, 1))).is_err());
    }

    #[test]
    fn blank_name_rejected() {
        let mut bad = sheet((4, 4, 4));
        bad.name = "   ".into();
        assert!(Character::create(&bad).is_err());
    }

    #[test]
    fn xp_curve_matches_triangular_sum() {
        assert_eq!(Character::xp_for_next_level(1), 100);
        assert_eq!(Character::xp_for_next_level(2), 300);
        assert_eq!(Character::xp_for_next_level(3), 600);
    }

    #[test]
    fn level_up_heals_and_can_chain() {
        let mut hero = Character::create(&sheet((4, 4, 4))).expect("valid");
        hero.danger = DangerLevel::Critical;
        let gain = hero.gain_xp(320);
        assert_eq!(gain.from_level, 1);
        assert_eq!(gain.to_level, 3);
        assert!(gain.leveled_up());
        assert_eq!(hero.danger, DangerLevel::Fresh);
    }

    #[test]
    fn class_modifiers() {
        assert_eq!(PlayerClass::InboxKnight.stat_modifier(Stat::Spirit), 2);
        assert_eq!(PlayerClass::InboxKnight.stat_modifier(Stat::Might), 0);
        assert_eq!(PlayerClass::Wanderer.stat_modifier(Stat::Wit), 1);
        assert_eq!(PlayerClass::DeployNinja.retreat_modifier(), 2);
    }

    #[test]
    fn class_parses_from_label() {
        assert_eq!("code warrior".parse::<PlayerClass>().ok(), Some(PlayerClass::CodeWarrior));
        assert_eq!("DeployNinja".parse::<PlayerClass>().ok(), Some(PlayerClass::DeployNinja));
        assert!("paladin".parse::<PlayerClass>().is_err());
    }
}
