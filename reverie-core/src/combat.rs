//! Combat Resolver.
//!
//! Narrative combat, no grid and no initiative.  Each player turn runs the
//! same fixed sub-loop:
//!
//! ```text
//!   PlayerAction ─▶ NarratedResolution ─▶ EnemyAction ─▶ DangerLevelUpdate
//!        ▲                                                     │
//!        └──────────────── outcome still None ◀────────────────┘
//! ```
//!
//! Outcome of the player's check maps to a danger change:
//!
//! | Outcome            | Effect                                               |
//! |--------------------|------------------------------------------------------|
//! | CriticalSuccess    | target loses two danger steps                        |
//! | SuccessWithBonus   | target loses one step and is staggered (skips a turn)|
//! | Success            | target loses one step                                |
//! | Failure            | no progress, target makes an extra counter-attack    |
//! | CriticalFailure    | no progress, player loses one step                   |
//!
//! The encounter ends in Victory when every enemy is Defeated, Defeat when
//! the player is, and Retreat when a retreat check succeeds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::character::Character;
use crate::dice::{DiceStream, DifficultyPreset, Outcome, Roll, Situation};
use crate::error::{Result, ReverieError};
use crate::inventory::Inventory;
use crate::types::{DangerLevel, EnemyId, LocationId, Stat, Turn};

/// Extra enemy attack difficulty while the player is defending.
pub const DEFEND_BONUS: i32 = 4;
/// XP granted per enemy on victory.
pub const XP_PER_ENEMY: u32 = 25;
/// Gold granted per enemy on victory.
pub const GOLD_PER_ENEMY: u32 = 5;

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// An enemy that has not entered a fight yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    /// Name.
    pub name: String,
    /// Starting danger level.
    pub danger: DangerLevel,
    /// Added to the enemy's attack rolls.
    pub attack_bonus: i32,
}

impl EnemyTemplate {
    /// A Fresh enemy.
    #[must_use]
    pub fn new(name: impl Into<String>, attack_bonus: i32) -> Self {
        Self {
            name: name.into(),
            danger: DangerLevel::Fresh,
            attack_bonus,
        }
    }
}

/// An enemy inside an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Identity.
    pub id: EnemyId,
    /// Name.
    pub name: String,
    /// Current danger level.
    pub danger: DangerLevel,
    /// Added to attack rolls.
    pub attack_bonus: i32,
    /// Skips its next action.
    pub staggered: bool,
}

/// How an encounter ended.  `None` while it is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    /// Still fighting.
    None,
    /// Every enemy Defeated.
    Victory,
    /// Player Defeated.
    Defeat,
    /// Player escaped.
    Retreat,
}

impl fmt::Display for CombatOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "ongoing"),
            Self::Victory => write!(f, "victory"),
            Self::Defeat => write!(f, "defeat"),
            Self::Retreat => write!(f, "retreat"),
        }
    }
}

/// What the player does this combat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatAction {
    /// Strike an enemy (first standing enemy if no target).
    Attack {
        /// Target.
        target: Option<EnemyId>,
    },
    /// Brace: enemies are harder to land hits on this turn.
    Defend,
    /// Try to escape.
    Retreat,
    /// Something creative, rolled on the given stat.
    Improvise {
        /// Stat rolled.
        stat: Stat,
        /// What the player tries.
        description: String,
        /// Target.
        target: Option<EnemyId>,
    },
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// One enemy attack on the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyAttack {
    /// Attacker name.
    pub enemy: String,
    /// The attack roll.
    pub roll: Roll,
    /// Danger steps the player lost.
    pub steps: u8,
    /// Whether this was the counter-attack from a failed player action.
    pub counter: bool,
}

/// Danger change on one enemy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyDamage {
    /// Enemy id.
    pub enemy: EnemyId,
    /// Enemy name.
    pub name: String,
    /// Before.
    pub from: DangerLevel,
    /// After.
    pub to: DangerLevel,
}

/// Everything one combat turn did, for narration and deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatReport {
    /// Combat turn number.
    pub turn: u32,
    /// The player's check.
    pub player_roll: Roll,
    /// Damage dealt to enemies.
    pub damage: Vec<EnemyDamage>,
    /// Enemy attacks on the player.
    pub enemy_attacks: Vec<EnemyAttack>,
    /// Player danger before the turn.
    pub player_from: DangerLevel,
    /// Player danger after the turn.
    pub player_to: DangerLevel,
    /// Outcome after the turn.
    pub outcome: CombatOutcome,
}

// ---------------------------------------------------------------------------
// Encounter
// ---------------------------------------------------------------------------

/// An active fight.  Exists only until its outcome is decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEncounter {
    /// Where the fight happens.
    pub location: LocationId,
    /// Opponents.
    pub enemies: Vec<Enemy>,
    /// Combat turns resolved.
    pub turn: u32,
    /// Current outcome.
    pub outcome: CombatOutcome,
    /// `Turn N: ...` lines.
    pub log: Vec<String>,
    /// Game turn the fight started.
    pub started_turn: Turn,
}

impl CombatEncounter {
    /// Start a fight.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] for an empty enemy list.
    pub fn start(location: LocationId, enemies: &[EnemyTemplate], started_turn: Turn) -> Result<Self> {
        if enemies.is_empty() {
            return Err(ReverieError::InvariantViolation(
                "a combat encounter needs at least one enemy".into(),
            ));
        }
        let enemies = enemies
            .iter()
            .map(|t| Enemy {
                id: EnemyId::new(),
                name: t.name.clone(),
                danger: t.danger,
                attack_bonus: t.attack_bonus,
                staggered: false,
            })
            .collect();
        Ok(Self {
            location,
            enemies,
            turn: 0,
            outcome: CombatOutcome::None,
            log: Vec::new(),
            started_turn,
        })
    }

    /// Whether the fight is over.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.outcome != CombatOutcome::None
    }

    /// Enemies still standing.
    pub fn standing(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.iter().filter(|e| !e.danger.is_defeated())
    }

    /// Look up an enemy.
    #[must_use]
    pub fn enemy(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.id == id)
    }

    fn pick_target(&self, wanted: Option<EnemyId>) -> Result<EnemyId> {
        match wanted {
            Some(id) => match self.enemy(id) {
                Some(enemy) if !enemy.danger.is_defeated() => Ok(id),
                Some(enemy) => Err(ReverieError::unknown("standing enemy", &enemy.name)),
                None => Err(ReverieError::unknown("enemy", id)),
            },
            None => self
                .standing()
                .next()
                .map(|e| e.id)
                .ok_or(ReverieError::NoActiveCombat),
        }
    }

    fn damage(&mut self, target: EnemyId, steps: u8, stagger: bool) -> Option<EnemyDamage> {
        let enemy = self.enemies.iter_mut().find(|e| e.id == target)?;
        let from = enemy.danger;
        enemy.danger = enemy.danger.worsen(steps);
        enemy.staggered |= stagger;
        Some(EnemyDamage {
            enemy: target,
            name: enemy.name.clone(),
            from,
            to: enemy.danger,
        })
    }

    fn enemy_strike(enemy: &Enemy, difficulty: i32, counter: bool, dice: &mut DiceStream) -> EnemyAttack {
        let roll = dice.resolve(enemy.attack_bonus, 0, difficulty);
        let steps = match roll.outcome {
            Outcome::CriticalSuccess => 2,
            o if o.is_success() => 1,
            _ => 0,
        };
        EnemyAttack {
            enemy: enemy.name.clone(),
            roll,
            steps,
            counter,
        }
    }

    /// Resolve one full combat turn.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::NoActiveCombat`] once the encounter is over, or
    /// [`ReverieError::InvalidTargetReference`] for a bad target.  Nothing is
    /// rolled or changed on error.
    pub fn resolve_turn(
        &mut self,
        action: &CombatAction,
        player: &mut Character,
        inventory: &mut Inventory,
        dice: &mut DiceStream,
        preset: DifficultyPreset,
    ) -> Result<CombatReport> {
        if self.is_over() {
            return Err(ReverieError::NoActiveCombat);
        }
        let target = match action {
            CombatAction::Attack { target } | CombatAction::Improvise { target, .. } => {
                Some(self.pick_target(*target)?)
            }
            CombatAction::Defend | CombatAction::Retreat => None,
        };

        self.turn += 1;
        let player_from = player.danger;
        let mut damage = Vec::new();
        let mut counter_from = None;
        let mut defending = false;

        // PlayerAction
        let (stat, situation, extra) = match action {
            CombatAction::Attack { .. } => (Stat::Might, Situation::Attack, inventory.weapon_bonus()),
            CombatAction::Improvise { stat, .. } => (*stat, Situation::Improvise, 0),
            CombatAction::Defend => (Stat::Spirit, Situation::Defend, 0),
            CombatAction::Retreat => (Stat::Wit, Situation::Retreat, player.class.retreat_modifier()),
        };
        let (stat_value, class_mod) = player.check_bonus(stat);
        let modifier = class_mod + extra + inventory.stat_bonus(stat);
        let roll = dice.resolve(stat_value, modifier, preset.difficulty(situation));
        inventory.consume_boosts(stat);

        // NarratedResolution
        let summary = match (action, roll.outcome) {
            (_, Outcome::CriticalFailure) => {
                player.danger = player.danger.worsen(1);
                "fumbles badly and gets hurt".to_string()
            }
            (CombatAction::Attack { .. } | CombatAction::Improvise { .. }, outcome) => {
                let target = target.ok_or(ReverieError::NoActiveCombat)?;
                let (steps, stagger) = match outcome {
                    Outcome::CriticalSuccess => (2, false),
                    Outcome::SuccessWithBonus => (1, true),
                    Outcome::Success => (1, false),
                    _ => (0, false),
                };
                if steps == 0 {
                    counter_from = Some(target);
                    "misses and leaves an opening".to_string()
                } else {
                    let hit = self.damage(target, steps, stagger);
                    let line = hit
                        .as_ref()
                        .map(|h| format!("hits {} ({} -> {})", h.name, h.from, h.to))
                        .unwrap_or_default();
                    damage.extend(hit);
                    line
                }
            }
            (CombatAction::Defend, Outcome::CriticalSuccess) => {
                defending = true;
                for enemy in &mut self.enemies {
                    enemy.staggered = true;
                }
                "holds the line so well the enemies falter".to_string()
            }
            (CombatAction::Defend, outcome) => {
                defending = outcome.is_success();
                if defending { "braces for the next blow" } else { "fails to find footing" }.to_string()
            }
            (CombatAction::Retreat, outcome) => {
                if outcome.is_success() {
                    self.outcome = CombatOutcome::Retreat;
                    "breaks away and escapes".to_string()
                } else {
                    "tries to flee but is cut off".to_string()
                }
            }
        };
        self.log.push(format!("Turn {}: {} {summary} [{roll}]", self.turn, player.name));

        if self.standing().next().is_none() {
            self.outcome = CombatOutcome::Victory;
        }

        // EnemyAction
        let mut enemy_attacks = Vec::new();
        if !self.is_over() {
            let difficulty = preset.difficulty(Situation::EnemyAttack)
                + inventory.armor_bonus()
                + if defending { DEFEND_BONUS } else { 0 };
            if let Some(counter) = counter_from.and_then(|id| self.enemy(id)) {
                enemy_attacks.push(Self::enemy_strike(counter, difficulty, true, dice));
            }
            for enemy in self.enemies.iter().filter(|e| !e.danger.is_defeated() && !e.staggered) {
                enemy_attacks.push(Self::enemy_strike(enemy, difficulty, false, dice));
            }
            for enemy in &mut self.enemies {
                enemy.staggered = false;
            }
        }

        // DangerLevelUpdate
        for attack in &enemy_attacks {
            player.danger = player.danger.worsen(attack.steps);
            let verb = if attack.steps > 0 { "hits" } else { "misses" };
            self.log.push(format!("Turn {}: {} {verb} [{}]", self.turn, attack.enemy, attack.roll));
        }
        if player.danger.is_defeated() {
            self.outcome = CombatOutcome::Defeat;
        }

        if self.is_over() {
            tracing::info!(outcome = %self.outcome, turns = self.turn, "combat ended");
        }

        Ok(CombatReport {
            turn: self.turn,
            player_roll: roll,
            damage,
            enemy_attacks,
            player_from,
            player_to: player.danger,
            outcome: self.outcome,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
