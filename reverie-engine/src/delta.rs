//! Observable state changes of one turn, found by diffing the save before
//! and after resolution.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use reverie_core::combat::CombatOutcome;
use reverie_core::npc::DispositionBand;
use reverie_core::quest::QuestStatus;
use reverie_core::types::{DangerLevel, ItemId};
use reverie_core::SaveGame;

/// One observable change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateDelta {
    /// The player changed location.
    Moved {
        /// Location left.
        from: String,
        /// Location entered.
        to: String,
    },
    /// A location was added to the world graph.
    LocationDiscovered {
        /// Its name.
        name: String,
    },
    /// The player's danger level moved.
    DangerChanged {
        /// Before.
        from: DangerLevel,
        /// After.
        to: DangerLevel,
    },
    /// Items entered the inventory.
    ItemGained {
        /// Item name.
        name: String,
        /// Units gained.
        quantity: u32,
    },
    /// Items left the inventory.
    ItemLost {
        /// Item name.
        name: String,
        /// Units lost.
        quantity: u32,
    },
    /// Gold changed.
    GoldChanged {
        /// Before.
        from: u32,
        /// After.
        to: u32,
    },
    /// An NPC's disposition crossed a band boundary.
    DispositionChanged {
        /// NPC name.
        npc: String,
        /// Before.
        from: DispositionBand,
        /// After.
        to: DispositionBand,
    },
    /// An NPC died.
    NpcDied {
        /// NPC name.
        npc: String,
    },
    /// A quest was accepted.
    QuestStarted {
        /// Title.
        title: String,
    },
    /// A quest moved to a later stage.
    QuestProgressed {
        /// Title.
        title: String,
        /// New stage, 1-based.
        stage: usize,
    },
    /// A quest completed.
    QuestCompleted {
        /// Title.
        title: String,
    },
    /// A quest failed or was abandoned.
    QuestFailed {
        /// Title.
        title: String,
    },
    /// A fight began.
    CombatStarted {
        /// Enemy names.
        enemies: Vec<String>,
    },
    /// A fight ended.
    CombatEnded {
        /// How.
        outcome: CombatOutcome,
    },
    /// A hidden secret was revealed.
    SecretRevealed {
        /// The secret's text.
        text: String,
    },
    /// The character gained a level.
    LevelUp {
        /// New level.
        level: u32,
    },
}

impl fmt::Display for StateDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moved { from, to } => write!(f, "You travel from {from} to {to}."),
            Self::LocationDiscovered { name } => write!(f, "Discovered: {name}."),
            Self::DangerChanged { from, to } if to > from => write!(f, "You recover: {from} -> {to}."),
            Self::DangerChanged { from, to } => write!(f, "You are hurt: {from} -> {to}."),
            Self::ItemGained { name, quantity: 1 } => write!(f, "Gained {name}."),
            Self::ItemGained { name, quantity } => write!(f, "Gained {name} x{quantity}."),
            Self::ItemLost { name, quantity: 1 } => write!(f, "Lost {name}."),
            Self::ItemLost { name, quantity } => write!(f, "Lost {name} x{quantity}."),
            Self::GoldChanged { from, to } => write!(f, "Gold: {from} -> {to}."),
            Self::DispositionChanged { npc, from, to } => write!(f, "{npc}: {from} -> {to}."),
            Self::NpcDied { npc } => write!(f, "{npc} is dead."),
            Self::QuestStarted { title } => write!(f, "Quest accepted: {title}."),
            Self::QuestProgressed { title, stage } => write!(f, "Quest '{title}' reached stage {stage}."),
            Self::QuestCompleted { title } => write!(f, "Quest completed: {title}."),
            Self::QuestFailed { title } => write!(f, "Quest failed: {title}."),
            Self::CombatStarted { enemies } => write!(f, "Combat! {} attack.", enemies.join(", ")),
            Self::CombatEnded { outcome } => write!(f, "Combat over: {outcome}."),
            Self::SecretRevealed { text } => write!(f, "Discovered: {text}"),
            Self::LevelUp { level } => write!(f, "You reached level {level}!"),
        }
    }
}

/// Diff two saves.  `ended` is the outcome of a fight that finished this
/// turn; the encounter itself is gone from `after`.
#[must_use]
pub fn diff(before: &SaveGame, after: &SaveGame, ended: Option<CombatOutcome>) -> Vec<StateDelta> {
    let mut deltas = Vec::new();
    let name_of = |save: &SaveGame, id| save.world.get(id).map(|l| l.name.clone()).unwrap_or_default();

    if before.combat.is_none() {
        if let Some(encounter) = &after.combat {
            deltas.push(StateDelta::CombatStarted {
                enemies: encounter.enemies.iter().map(|e| e.name.clone()).collect(),
            });
        }
    }
    if let Some(outcome) = ended {
        deltas.push(StateDelta::CombatEnded { outcome });
    }

    for location in after.world.locations() {
        if before.world.get(location.id).is_none() {
            deltas.push(StateDelta::LocationDiscovered {
                name: location.name.clone(),
            });
        }
    }
    if before.location != after.location {
        deltas.push(StateDelta::Moved {
            from: name_of(before, before.location),
            to: name_of(after, after.location),
        });
    }

    for location in after.world.locations() {
        let Some(old) = before.world.get(location.id) else {
            continue;
        };
        for secret in location.secrets.iter().filter(|s| s.revealed) {
            if old.secrets.iter().any(|s| s.id == secret.id && !s.revealed) {
                deltas.push(StateDelta::SecretRevealed {
                    text: secret.text.clone(),
                });
            }
        }
    }

    if before.character.danger != after.character.danger {
        deltas.push(StateDelta::DangerChanged {
            from: before.character.danger,
            to: after.character.danger,
        });
    }
    if after.character.level > before.character.level {
        deltas.push(StateDelta::LevelUp {
            level: after.character.level,
        });
    }

    item_deltas(before, after, &mut deltas);
    if before.inventory.gold != after.inventory.gold {
        deltas.push(StateDelta::GoldChanged {
            from: before.inventory.gold,
            to: after.inventory.gold,
        });
    }

    for (id, npc) in &after.npcs {
        let Some(old) = before.npcs.get(id) else {
            continue;
        };
        if old.alive && !npc.alive {
            deltas.push(StateDelta::NpcDied { npc: npc.name.clone() });
        } else if old.band() != npc.band() {
            deltas.push(StateDelta::DispositionChanged {
                npc: npc.name.clone(),
                from: old.band(),
                to: npc.band(),
            });
        }
    }

    for quest in after.quests.iter() {
        let Some(old) = before.quests.get(quest.id) else {
            continue;
        };
        let title = &quest.title;
        if old.status == QuestStatus::NotStarted && quest.status != QuestStatus::NotStarted {
            deltas.push(StateDelta::QuestStarted { title: title.clone() });
        }
        if quest.current_stage > old.current_stage && quest.status == QuestStatus::Active {
            deltas.push(StateDelta::QuestProgressed {
                title: title.clone(),
                stage: quest.current_stage + 1,
            });
        }
        if old.status != quest.status {
            match quest.status {
                QuestStatus::Completed => deltas.push(StateDelta::QuestCompleted { title: title.clone() }),
                QuestStatus::Failed => deltas.push(StateDelta::QuestFailed { title: title.clone() }),
                QuestStatus::NotStarted | QuestStatus::Active => {}
            }
        }
    }
    deltas
}

fn item_deltas(before: &SaveGame, after: &SaveGame, deltas: &mut Vec<StateDelta>) {
    let count = |save: &SaveGame| -> BTreeMap<ItemId, (String, u32)> {
        save.inventory
            .items()
            .iter()
            .map(|i| (i.id, (i.name.clone(), i.quantity)))
            .collect()
    };
    let old = count(before);
    let new = count(after);
    for (id, (name, qty)) in &new {
        let had = old.get(id).map_or(0, |(_, q)| *q);
        if *qty > had {
            deltas.push(StateDelta::ItemGained {
                name: name.clone(),
                quantity: qty - had,
            });
        }
    }
    for (id, (name, qty)) in &old {
        let has = new.get(id).map_or(0, |(_, q)| *q);
        if *qty > has {
            deltas.push(StateDelta::ItemLost {
                name: name.clone(),
                quantity: qty - has,
            });
        }
    }
}
