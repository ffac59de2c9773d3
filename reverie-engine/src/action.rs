//! Structured actions: the validated form of one turn's input.

use std::fmt;

use serde::Serialize;

use reverie_core::types::{Direction, EnemyId, ItemId, NpcId, QuestId, Stat};

/// Broad kind of action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Changing location.
    Movement,
    /// Talking or giving.
    Dialogue,
    /// Fighting.
    Combat,
    /// Looking closely, searching, testing luck.
    Inspection,
    /// Items.
    Inventory,
    /// Accepting or abandoning quests.
    Quest,
    /// Out-of-world commands.
    System,
}

/// Every verb the engine can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// Describe the current location.
    Look,
    /// Move through an exit.
    Go,
    /// Talk to an NPC.
    Talk,
    /// Roll a check.
    Roll,
    /// Show the inventory.
    Inventory,
    /// Show the character sheet.
    Stats,
    /// Show quests.
    Quests,
    /// Show visited locations.
    Map,
    /// Show known NPCs.
    Npcs,
    /// Commit now.
    Save,
    /// Show commands.
    Help,
    /// End the session.
    Quit,
    /// Strike an enemy.
    Attack,
    /// Brace.
    Defend,
    /// Flee the fight.
    Retreat,
    /// Anything creative, rolled on a stat.
    Improvise,
    /// Look closely / search.
    Inspect,
    /// Use a consumable.
    Use,
    /// Equip an item.
    Equip,
    /// Unequip an item.
    Unequip,
    /// Drop an item.
    Drop,
    /// Give an item to an NPC.
    Give,
    /// Accept a quest.
    Accept,
    /// Abandon a quest.
    Abandon,
    /// Promise an NPC something.
    Promise,
    /// Promise an NPC something, on your honour.
    Swear,
    /// Make good on the oldest promise to an NPC.
    Keep,
    /// Go back on the oldest promise to an NPC.
    Renege,
}

impl Verb {
    /// Verbs the narration gateway may suggest for free text.  System
    /// commands are never inferred.
    pub const WORLD: [Verb; 15] = [
        Verb::Go,
        Verb::Talk,
        Verb::Inspect,
        Verb::Improvise,
        Verb::Use,
        Verb::Equip,
        Verb::Unequip,
        Verb::Drop,
        Verb::Give,
        Verb::Accept,
        Verb::Abandon,
        Verb::Promise,
        Verb::Swear,
        Verb::Keep,
        Verb::Renege,
    ];

    /// Verbs only valid during combat.
    pub const COMBAT: [Verb; 3] = [Verb::Attack, Verb::Defend, Verb::Retreat];

    /// Lowercase name, as offered to the gateway.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Look => "look",
            Self::Go => "go",
            Self::Talk => "talk",
            Self::Roll => "roll",
            Self::Inventory => "inventory",
            Self::Stats => "stats",
            Self::Quests => "quests",
            Self::Map => "map",
            Self::Npcs => "npcs",
            Self::Save => "save",
            Self::Help => "help",
            Self::Quit => "quit",
            Self::Attack => "attack",
            Self::Defend => "defend",
            Self::Retreat => "retreat",
            Self::Improvise => "improvise",
            Self::Inspect => "inspect",
            Self::Use => "use",
            Self::Equip => "equip",
            Self::Unequip => "unequip",
            Self::Drop => "drop",
            Self::Give => "give",
            Self::Accept => "accept",
            Self::Abandon => "abandon",
            Self::Promise => "promise",
            Self::Swear => "swear",
            Self::Keep => "keep",
            Self::Renege => "renege",
        }
    }

    /// Inverse of [`Verb::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::WORLD
            .iter()
            .chain(Self::COMBAT.iter())
            .chain(
                [
                    Self::Look,
                    Self::Roll,
                    Self::Inventory,
                    Self::Stats,
                    Self::Quests,
                    Self::Map,
                    Self::Npcs,
                    Self::Save,
                    Self::Help,
                    Self::Quit,
                ]
                .iter(),
            )
            .copied()
            .find(|v| v.name() == name)
    }

    /// The category this verb belongs to.
    #[must_use]
    pub const fn category(self) -> IntentCategory {
        match self {
            Self::Go => IntentCategory::Movement,
            Self::Talk | Self::Give | Self::Promise | Self::Swear | Self::Keep | Self::Renege => {
                IntentCategory::Dialogue
            }
            Self::Attack | Self::Defend | Self::Retreat => IntentCategory::Combat,
            Self::Inspect | Self::Improvise => IntentCategory::Inspection,
            Self::Use | Self::Equip | Self::Unequip | Self::Drop => IntentCategory::Inventory,
            Self::Accept | Self::Abandon => IntentCategory::Quest,
            Self::Look
            | Self::Roll
            | Self::Inventory
            | Self::Stats
            | Self::Quests
            | Self::Map
            | Self::Npcs
            | Self::Save
            | Self::Help
            | Self::Quit => IntentCategory::System,
        }
    }

    /// Whether the verb only reports state and never mutates it.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::Look
                | Self::Inventory
                | Self::Stats
                | Self::Quests
                | Self::Map
                | Self::Npcs
                | Self::Help
                | Self::Quit
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reference to a live entity, resolved against the save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRef {
    /// An NPC present at the current location.
    Npc(NpcId),
    /// An enemy still standing.
    Enemy(EnemyId),
    /// An inventory item.
    Item(ItemId),
    /// A quest.
    Quest(QuestId),
    /// An exit of the current location.
    Exit(Direction),
}

/// Where an action came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    /// The deterministic rule table.
    Rule,
    /// The narration gateway, with its confidence.
    Gateway {
        /// 0.0 ..= 1.0.
        confidence: f32,
    },
}

/// One validated action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    /// What to do.
    pub verb: Verb,
    /// Resolved targets, in order (`give <item> to <npc>` has two).
    pub targets: Vec<TargetRef>,
    /// Stat for rolls and improvised actions.
    pub stat: Option<Stat>,
    /// Free text kept for narration and memory summaries.
    pub residue: String,
    /// Rule table or gateway.
    pub source: IntentSource,
}

impl Action {
    /// A rule-table action.
    #[must_use]
    pub fn rule(verb: Verb, targets: Vec<TargetRef>, residue: impl Into<String>) -> Self {
        Self {
            verb,
            targets,
            stat: None,
            residue: residue.into(),
            source: IntentSource::Rule,
        }
    }

    /// Set the stat.
    #[must_use]
    pub fn with_stat(mut self, stat: Option<Stat>) -> Self {
        self.stat = stat;
        self
    }

    /// The action's category.
    #[must_use]
    pub fn category(&self) -> IntentCategory {
        self.verb.category()
    }

    /// Whether the gateway produced this action.
    #[must_use]
    pub fn from_gateway(&self) -> bool {
        matches!(self.source, IntentSource::Gateway { .. })
    }

    /// First target of a kind.
    #[must_use]
    pub fn npc(&self) -> Option<NpcId> {
        self.targets.iter().find_map(|t| match t {
            TargetRef::Npc(id) => Some(*id),
            _ => None,
        })
    }

    /// First enemy target.
    #[must_use]
    pub fn enemy(&self) -> Option<EnemyId> {
        self.targets.iter().find_map(|t| match t {
            TargetRef::Enemy(id) => Some(*id),
            _ => None,
        })
    }

    /// First item target.
    #[must_use]
    pub fn item(&self) -> Option<ItemId> {
        self.targets.iter().find_map(|t| match t {
            TargetRef::Item(id) => Some(*id),
            _ => None,
        })
    }

    /// First quest target.
    #[must_use]
    pub fn quest(&self) -> Option<QuestId> {
        self.targets.iter().find_map(|t| match t {
            TargetRef::Quest(id) => Some(*id),
            _ => None,
        })
    }

    /// First exit target.
    #[must_use]
    pub fn exit(&self) -> Option<Direction> {
        self.targets.iter().find_map(|t| match t {
            TargetRef::Exit(d) => Some(*d),
            _ => None,
        })
    }
}
