//! Deterministic text for the read-only system commands.
//!
//! None of these touch the gateway or mutate the save.

use std::fmt::Write as _;

use reverie_core::character::Character;
use reverie_core::inventory::ItemKind;
use reverie_core::quest::QuestStatus;
use reverie_core::SaveGame;

use crate::action::Verb;

/// Command reference shown by `help`.
pub const HELP: &str = "\
Commands:
  look                 describe where you are
  go <direction>       travel (n, s, e, w, up, down, in, out)
  talk [to] <name>     speak with someone here
  inspect [thing]      search the area or look closely at something
  use / equip / unequip / drop <item>
  give <item> to <name>
  promise / swear [name] to <deed>
  keep / break [my] promise [to name]
  accept / abandon <quest>
  roll [might|wit|spirit]
  attack [enemy], defend, retreat   (in combat)
  inventory, stats, quests, map, npcs, save, help, quit
Anything else is read as free text and interpreted by the narrator.";

/// Render the output of a read-only verb.  `None` for verbs that act.
#[must_use]
pub fn render(verb: Verb, save: &SaveGame) -> Option<String> {
    let text = match verb {
        Verb::Look => look(save),
        Verb::Stats => stats(save),
        Verb::Inventory => inventory(save),
        Verb::Quests => quests(save),
        Verb::Map => map(save),
        Verb::Npcs => npcs(save),
        Verb::Help => HELP.to_string(),
        Verb::Quit => "Your progress is saved. Farewell.".to_string(),
        _ => return None,
    };
    Some(text)
}

/// The current location, its people, exits and any fight.
#[must_use]
pub fn look(save: &SaveGame) -> String {
    let Some(location) = save.world.get(save.location) else {
        return "You are nowhere at all.".into();
    };
    let mut out = format!("{}\n{}", location.name, location.description);
    let here = save.npcs_here();
    if !here.is_empty() {
        let names: Vec<String> = here.iter().map(|n| format!("{} the {}", n.name, n.occupation)).collect();
        let _ = write!(out, "\nHere: {}.", names.join(", "));
    }
    if let Some(combat) = &save.combat {
        let foes: Vec<String> = combat.standing().map(|e| format!("{} ({})", e.name, e.danger)).collect();
        let _ = write!(out, "\nEnemies: {}.", foes.join(", "));
    }
    let exits: Vec<String> = location
        .exits
        .iter()
        .map(|(dir, exit)| {
            match exit.target.and_then(|id| save.world.get(id)) {
                Some(place) => format!("{dir} ({})", place.name),
                None => format!("{dir} (unexplored)"),
            }
        })
        .collect();
    let _ = write!(
        out,
        "\nExits: {}.",
        if exits.is_empty() { "none".to_string() } else { exits.join(", ") }
    );
    out
}

/// Character sheet.
#[must_use]
pub fn stats(save: &SaveGame) -> String {
    let c = &save.character;
    let mut out = format!(
        "{} - {} {} ({})\nLevel {}  XP {}/{}\n{}\nCondition: {}\nGold: {}",
        c.name,
        c.race,
        c.class,
        c.background,
        c.level,
        c.xp,
        Character::xp_for_next_level(c.level),
        c.stats,
        c.danger,
        save.inventory.gold
    );
    for (slot, name) in save.equipment() {
        let _ = write!(out, "\n{slot}: {name}");
    }
    out
}

/// Inventory listing.
#[must_use]
pub fn inventory(save: &SaveGame) -> String {
    let inv = &save.inventory;
    let mut out = format!("Inventory ({}/{} slots, {} gold)", inv.slots_used(), inv.capacity(), inv.gold);
    if inv.items().is_empty() {
        out.push_str("\n  (empty)");
    }
    for item in inv.items() {
        let _ = write!(out, "\n  {}", item.name);
        if item.quantity > 1 {
            let _ = write!(out, " x{}", item.quantity);
        }
        if let Some(slot) = item.equipped {
            let _ = write!(out, " [{slot}]");
        }
        if matches!(item.kind, ItemKind::Key) {
            out.push_str(" (key)");
        }
    }
    for boost in &inv.boosts {
        let _ = write!(out, "\n  +{} {} for {} more checks", boost.amount, boost.stat, boost.checks_left);
    }
    out
}

/// Quest log.
#[must_use]
pub fn quests(save: &SaveGame) -> String {
    let mut out = String::from("Quests");
    let mut any = false;
    for quest in save.quests.iter().filter(|q| q.status != QuestStatus::NotStarted) {
        any = true;
        let _ = write!(out, "\n  {} [{}]", quest.title, quest.status);
        if quest.status == QuestStatus::Active {
            if let Some(stage) = quest.stage() {
                let _ = write!(out, "\n    {}", stage.description);
                for objective in &stage.objectives {
                    let mark = if objective.complete { 'x' } else { ' ' };
                    let _ = write!(out, "\n    [{mark}] {}", objective.description);
                }
            }
        }
        if let Some(reason) = &quest.failure_reason {
            let _ = write!(out, "\n    ({reason})");
        }
    }
    if !any {
        out.push_str("\n  (none yet)");
    }
    out
}

/// Visited locations with their known exits.
#[must_use]
pub fn map(save: &SaveGame) -> String {
    let mut out = String::from("Map");
    for location in save.world.locations().filter(|l| l.visited) {
        let marker = if location.id == save.location { " (you are here)" } else { "" };
        let _ = write!(out, "\n  {}{marker}", location.name);
        for (dir, exit) in &location.exits {
            let target = exit
                .target
                .and_then(|id| save.world.get(id))
                .map_or("?", |l| l.name.as_str());
            let _ = write!(out, "\n    {dir} -> {target}");
        }
    }
    out
}

/// NPCs the player has met.
#[must_use]
pub fn npcs(save: &SaveGame) -> String {
    let mut out = String::from("People you know");
    let mut any = false;
    for npc in save.npcs.values().filter(|n| n.met) {
        any = true;
        let home = save.world.get(npc.home).map_or("?", |l| l.name.as_str());
        let state = if npc.alive { npc.band().to_string() } else { "dead".to_string() };
        let _ = write!(out, "\n  {} the {} ({state}) - {home}", npc.name, npc.occupation);
    }
    if !any {
        out.push_str("\n  (nobody yet)");
    }
    out
}
