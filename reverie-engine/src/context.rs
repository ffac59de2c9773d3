//! The context bundle: every entity a turn's input may address.
//!
//! Built fresh from the save at the start of each turn.  Names coming from
//! the player or the gateway are resolved here and nowhere else, so a
//! hallucinated target never reaches the mechanics.

use reverie_core::quest::QuestStatus;
use reverie_core::types::{DangerLevel, Direction, EnemyId, ItemId, NpcId, QuestId};
use reverie_core::SaveGame;
use reverie_llm::NarrationContext;

use crate::action::TargetRef;
use crate::error::{Result, TurnError};

/// Journal lines handed to the narrator.
pub const RECENT_HISTORY: usize = 5;

/// A present, living NPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcRef {
    /// Id.
    pub id: NpcId,
    /// Display name.
    pub name: String,
    /// Occupation.
    pub occupation: String,
    /// Current band label.
    pub band: String,
}

/// Addressable entities for one turn.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    /// Current location name.
    pub location: String,
    /// Location name and description, lowercased, for scenery lookups.
    pub scenery: String,
    /// Exits and whether the far side is known.
    pub exits: Vec<(Direction, bool)>,
    /// Living NPCs here.
    pub npcs: Vec<NpcRef>,
    /// Standing enemies, when in combat.
    pub enemies: Vec<(EnemyId, String, DangerLevel)>,
    /// Inventory items.
    pub items: Vec<(ItemId, String)>,
    /// Quests the player can address: active ones, and offers from NPCs
    /// already met.
    pub quests: Vec<(QuestId, String, QuestStatus)>,
    /// Whether a combat encounter is running.
    pub in_combat: bool,
    /// Every NPC the save knows, dead or alive, anywhere.
    pub known_npcs: Vec<(NpcId, String)>,
}

impl ContextBundle {
    /// Snapshot the addressable entities of `save`.
    #[must_use]
    pub fn from_save(save: &SaveGame) -> Self {
        let location = save.world.get(save.location);
        let exits = location
            .map(|l| l.exits.iter().map(|(d, e)| (*d, e.target.is_some())).collect())
            .unwrap_or_default();
        let npcs = save
            .npcs_here()
            .into_iter()
            .map(|n| NpcRef {
                id: n.id,
                name: n.name.clone(),
                occupation: n.occupation.clone(),
                band: n.band().to_string(),
            })
            .collect();
        let enemies = save
            .combat
            .as_ref()
            .map(|c| c.standing().map(|e| (e.id, e.name.clone(), e.danger)).collect())
            .unwrap_or_default();
        let items = save
            .inventory
            .items()
            .iter()
            .map(|i| (i.id, i.name.clone()))
            .collect();
        let quests = save
            .quests
            .iter()
            .filter(|q| match q.status {
                QuestStatus::Active => true,
                QuestStatus::NotStarted => q
                    .giver
                    .is_none_or(|g| save.npcs.get(&g).is_some_and(|n| n.met)),
                QuestStatus::Completed | QuestStatus::Failed => false,
            })
            .map(|q| (q.id, q.title.clone(), q.status))
            .collect();
        let known_npcs = save.npcs.values().map(|n| (n.id, n.name.clone())).collect();
        let scenery = location
            .map(|l| format!("{} {}", l.name, l.description).to_lowercase())
            .unwrap_or_default();
        Self {
            location: location.map(|l| l.name.clone()).unwrap_or_default(),
            scenery,
            exits,
            npcs,
            enemies,
            items,
            quests,
            in_combat: save.combat.is_some(),
            known_npcs,
        }
    }

    /// Resolve an exit word against the current location.
    ///
    /// # Errors
    ///
    /// [`TurnError::InvalidTargetReference`] unless the word is a direction
    /// this location has an exit in.
    pub fn resolve_exit(&self, word: &str) -> Result<Direction> {
        Direction::parse(word)
            .filter(|d| self.exits.iter().any(|(e, _)| e == d))
            .ok_or_else(|| invalid("exit", word))
    }

    /// Resolve an NPC name among the living NPCs here.
    ///
    /// # Errors
    ///
    /// See [`resolve_name`].
    pub fn resolve_npc(&self, query: &str) -> Result<NpcId> {
        resolve_name("npc", query, self.npcs.iter().map(|n| (n.name.as_str(), n.id)))
    }

    /// Resolve an enemy name among the standing enemies.
    ///
    /// # Errors
    ///
    /// See [`resolve_name`].
    pub fn resolve_enemy(&self, query: &str) -> Result<EnemyId> {
        resolve_name("enemy", query, self.enemies.iter().map(|(id, name, _)| (name.as_str(), *id)))
    }

    /// Resolve an inventory item.
    ///
    /// # Errors
    ///
    /// See [`resolve_name`].
    pub fn resolve_item(&self, query: &str) -> Result<ItemId> {
        resolve_name("item", query, self.items.iter().map(|(id, name)| (name.as_str(), *id)))
    }

    /// Resolve an addressable quest.
    ///
    /// # Errors
    ///
    /// See [`resolve_name`].
    pub fn resolve_quest(&self, query: &str) -> Result<QuestId> {
        resolve_name("quest", query, self.quests.iter().map(|(id, title, _)| (title.as_str(), *id)))
    }

    /// Resolve anything that can be looked at or acted on here: an enemy,
    /// an NPC, an item or an exit, in that order.  `Ok(None)` means the
    /// query names a piece of the scenery rather than an entity.
    ///
    /// # Errors
    ///
    /// [`TurnError::AmbiguousIntent`] when several entities match or when
    /// nothing here answers to the query.
    pub fn resolve_scene(&self, query: &str) -> Result<Option<TargetRef>> {
        let lookups = [
            self.resolve_enemy(query).map(TargetRef::Enemy),
            self.resolve_npc(query).map(TargetRef::Npc),
            self.resolve_item(query).map(TargetRef::Item),
            self.resolve_exit(query).map(TargetRef::Exit),
        ];
        for found in lookups {
            match found {
                Ok(target) => return Ok(Some(target)),
                Err(err @ TurnError::AmbiguousIntent(_)) => return Err(err),
                Err(_) => {}
            }
        }
        let needle = normalize(query);
        let noun = needle.split_whitespace().next_back().unwrap_or_default();
        if mentions(&self.scenery, &needle) || mentions(&self.scenery, noun) {
            return Ok(None);
        }
        Err(TurnError::AmbiguousIntent(format!(
            "There is no '{}' here.",
            query.trim()
        )))
    }

    /// Known NPC names mentioned in `text`, case-insensitive.
    #[must_use]
    pub fn npcs_mentioned(&self, text: &str) -> Vec<(NpcId, &str)> {
        let lowered = text.to_lowercase();
        self.known_npcs
            .iter()
            .filter(|(_, name)| mentions(&lowered, &name.trim().to_lowercase()))
            .map(|(id, name)| (*id, name.as_str()))
            .collect()
    }
}

/// Whether `needle` occurs in `haystack` as whole words.
fn mentions(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn invalid(kind: &'static str, reference: &str) -> TurnError {
    TurnError::InvalidTargetReference {
        kind,
        reference: reference.trim().to_string(),
    }
}

/// Match `query` against `(name, id)` candidates.
///
/// Case-insensitive exact match wins; otherwise a unique candidate whose
/// name contains the query, or has a word starting with it.  Candidates
/// sharing one name (two "Cave Goblin"s) count as a single match and the
/// first is taken.
///
/// # Errors
///
/// [`TurnError::AmbiguousIntent`] when distinct names match,
/// [`TurnError::InvalidTargetReference`] when none does.
pub fn resolve_name<'a, T: Copy>(
    kind: &'static str,
    query: &str,
    candidates: impl Iterator<Item = (&'a str, T)>,
) -> Result<T> {
    let needle = normalize(query);
    if needle.is_empty() {
        return Err(invalid(kind, query));
    }
    let candidates: Vec<(&str, T)> = candidates.collect();

    let exact: Vec<&(&str, T)> = candidates.iter().filter(|(name, _)| normalize(name) == needle).collect();
    if let Some((_, id)) = exact.first() {
        return Ok(*id);
    }

    let partial: Vec<&(&str, T)> = candidates
        .iter()
        .filter(|(name, _)| {
            let name = normalize(name);
            name.contains(&needle) || name.split_whitespace().any(|w| w.starts_with(&needle))
        })
        .collect();
    let mut names: Vec<&str> = partial.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names.dedup();
    match names.len() {
        0 => Err(invalid(kind, query)),
        1 => Ok(partial[0].1),
        _ => Err(TurnError::AmbiguousIntent(format!(
            "Which {kind} do you mean: {}?",
            names.join(" or ")
        ))),
    }
}

fn normalize(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let stripped = ["the ", "a ", "an "]
        .iter()
        .find_map(|article| lowered.strip_prefix(article))
        .unwrap_or(&lowered);
    stripped.trim().to_string()
}

/// Build the narrator's view of the save.
#[must_use]
pub fn narration_context(save: &SaveGame) -> NarrationContext {
    let location = save.world.get(save.location);
    let c = &save.character;
    NarrationContext {
        player: format!("{}, level {} {} ({})", c.name, c.level, c.class, c.danger),
        location: location.map(|l| l.name.clone()).unwrap_or_default(),
        location_description: location.map(|l| l.description.clone()).unwrap_or_default(),
        exits: location
            .map(|l| l.exits.keys().map(ToString::to_string).collect())
            .unwrap_or_default(),
        npcs: save
            .npcs_here()
            .iter()
            .map(|n| format!("{} ({}, {})", n.name, n.occupation, n.band()))
            .collect(),
        enemies: save
            .combat
            .as_ref()
            .map(|enc| enc.standing().map(|e| format!("{} ({})", e.name, e.danger)).collect())
            .unwrap_or_default(),
        items: save.inventory.items().iter().map(|i| i.name.clone()).collect(),
        quests: save.quests.active().map(|q| q.title.clone()).collect(),
        recent: save
            .journal
            .recent(RECENT_HISTORY)
            .iter()
            .map(|e| e.text.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::{CharacterSheet, PlayerClass};

    fn save() -> SaveGame {
        let sheet = CharacterSheet {
            name: "Ada".into(),
            race: "Human".into(),
            class: PlayerClass::CodeWarrior,
            stats: (5, 4, 3),
            background: "Sysadmin".into(),
        };
        SaveGame::new("ctx", &sheet, 7).expect("new game")
    }

    #[test]
    fn exact_then_partial_matching() {
        let names = [("Mara Quill", 1), ("Marcus", 2), ("Old Tom", 3)];
        assert_eq!(resolve_name("npc", "marcus", names.iter().copied()).expect("exact"), 2);
        assert_eq!(resolve_name("npc", "tom", names.iter().copied()).expect("word"), 3);
        assert_eq!(resolve_name("npc", "the quill", names.iter().copied()).expect("article"), 1);
        assert!(matches!(
            resolve_name("npc", "mar", names.iter().copied()),
            Err(TurnError::AmbiguousIntent(_))
        ));
        assert!(matches!(
            resolve_name("npc", "gandalf", names.iter().copied()),
            Err(TurnError::InvalidTargetReference { kind: "npc", .. })
        ));
    }

    #[test]
    fn identical_names_are_not_ambiguous() {
        let names = [("Cave Goblin", 1), ("Cave Goblin", 2)];
        assert_eq!(resolve_name("enemy", "goblin", names.iter().copied()).expect("first"), 1);
    }

    #[test]
    fn bundle_reflects_the_starting_inn() {
        let save = save();
        let bundle = ContextBundle::from_save(&save);
        assert_eq!(bundle.location, "The Crossroads Inn");
        assert_eq!(bundle.npcs.len(), 1);
        assert!(!bundle.in_combat);
        // The starter quest is only offered once Mara has been met.
        assert!(bundle.quests.is_empty());
        assert!(bundle.resolve_npc("mara").is_ok());
        assert_eq!(bundle.resolve_exit("n").expect("north"), Direction::North);
        assert!(bundle.resolve_exit("west").is_err());
    }

    #[test]
    fn scene_lookups_cover_entities_and_scenery() {
        let bundle = ContextBundle::from_save(&save());
        assert!(matches!(bundle.resolve_scene("mara"), Ok(Some(TargetRef::Npc(_)))));
        assert_eq!(bundle.resolve_scene("north").expect("exit"), Some(TargetRef::Exit(Direction::North)));
        assert_eq!(bundle.resolve_scene("the fire").expect("scenery"), None);
        assert_eq!(bundle.resolve_scene("the old trapdoor").expect("noun"), None);
        assert!(matches!(
            bundle.resolve_scene("silver locket"),
            Err(TurnError::AmbiguousIntent(_))
        ));
    }

    #[test]
    fn mentions_scan_known_npcs() {
        let bundle = ContextBundle::from_save(&save());
        assert_eq!(bundle.npcs_mentioned("MARA QUILL wipes the bar.").len(), 1);
        assert!(bundle.npcs_mentioned("The fire crackles.").is_empty());
        assert!(bundle.npcs_mentioned("Mara Quillson is someone else.").is_empty());
    }

    #[test]
    fn narration_context_names_the_scene() {
        let ctx = narration_context(&save());
        assert_eq!(ctx.location, "The Crossroads Inn");
        assert!(ctx.player.starts_with("Ada, level 1"));
        assert_eq!(ctx.npcs.len(), 1);
        assert_eq!(ctx.recent.len(), 1);
    }
}
