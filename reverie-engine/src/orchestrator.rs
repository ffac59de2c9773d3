//! Turn Orchestrator
//!
//! Runs one turn end to end against a private copy of the save:
//!
//! ```text
//! input ─▶ IntentResolver ─▶ Action
//!                              │ read-only? ──▶ render ─▶ TurnOutcome (nothing to commit)
//!                              ▼
//!                   clone save, turn += 1
//!                              ▼
//!             mechanics (dice, world, npcs, quests, combat)
//!                              ▼
//!                promise expiry, narration, consistency check
//!                              ▼
//!                 ResolvedTurn { next, outcome } ─▶ coordinator
//! ```
//!
//! The orchestrator never commits.  Any error drops the copy, so the save
//! the caller holds is untouched.

use serde::Serialize;
use tracing::{debug, info, warn};

use reverie_core::combat::{CombatAction, CombatOutcome, CombatReport};
use reverie_core::dice::{Roll, Situation};
use reverie_core::inventory::{ConsumableEffect, ItemKind};
use reverie_core::journal::JournalKind;
use reverie_core::npc::{PromiseStatus, PromiseWeight};
use reverie_core::quest::QuestProgress;
use reverie_core::savegame::QuestUpdate;
use reverie_core::types::{Direction, NpcId, Stat};
use reverie_core::world::{Evidence, ExitTarget, RevealOutcome, SecretTrigger};
use reverie_core::{ReverieError, SaveGame};
use reverie_llm::{LocationRequest, NarrationGateway, NarrationRequest};

use crate::action::{Action, Verb};
use crate::commands;
use crate::context::{narration_context, ContextBundle};
use crate::delta::{self, StateDelta};
use crate::error::{Result, TurnError};
use crate::intent::{IntentResolver, DEFAULT_IMPROVISE_STAT, DEFAULT_ROLL_STAT};

// ---------------------------------------------------------------------------
// Turn results
// ---------------------------------------------------------------------------

/// A labelled dice roll shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollReport {
    /// What was rolled for ("Might check", "Attack", ...).
    pub label: String,
    /// The roll.
    pub roll: Roll,
}

impl std::fmt::Display for RollReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label, self.roll)
    }
}

/// What the player sees after a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Turn number after this input.
    pub turn: u64,
    /// Prose (or deterministic text) for the player.
    pub narration: String,
    /// Observable changes.
    pub deltas: Vec<StateDelta>,
    /// The headline roll, if any.
    pub roll: Option<RollReport>,
    /// Suggestions for the next input.
    pub available_commands: Vec<String>,
    /// The player asked to end the session.
    pub quit: bool,
}

/// A resolved but uncommitted turn.
#[derive(Debug, Clone)]
pub struct ResolvedTurn {
    /// The save to commit; `None` when nothing changed.
    pub next: Option<SaveGame>,
    /// Player-facing result.
    pub outcome: TurnOutcome,
}

/// Facts gathered while the mechanics run.
#[derive(Debug, Default)]
struct Resolution {
    lines: Vec<String>,
    roll: Option<RollReport>,
    ended: Option<CombatOutcome>,
}

impl Resolution {
    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    fn roll(&mut self, label: impl Into<String>, roll: Roll) {
        self.roll = Some(RollReport {
            label: label.into(),
            roll,
        });
    }

    fn quests(&mut self, updates: &[QuestUpdate]) {
        for update in updates {
            match &update.progress {
                QuestProgress::NotReady => {}
                QuestProgress::StageAdvanced { to, complication, .. } => {
                    if let Some(text) = complication {
                        self.line(format!("A complication in '{}': {text}", update.title));
                    }
                    self.line(format!("Quest '{}' moves on (stage {}).", update.title, to + 1));
                }
                QuestProgress::Complicated(text) => {
                    self.line(format!("A complication in '{}': {text}", update.title));
                }
                QuestProgress::Completed(reward) => {
                    self.line(format!("Quest complete: {}! {}", update.title, reward.description));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs turns against a narration gateway.
#[derive(Debug)]
pub struct TurnOrchestrator<G> {
    gateway: G,
    resolver: IntentResolver,
    save_echo: bool,
}

impl<G: NarrationGateway> TurnOrchestrator<G> {
    /// Build an orchestrator.
    #[must_use]
    pub fn new(gateway: G, resolver: IntentResolver) -> Self {
        Self {
            gateway,
            resolver,
            save_echo: true,
        }
    }

    /// Whether `save` answers with a confirmation line.
    #[must_use]
    pub fn with_save_echo(mut self, echo: bool) -> Self {
        self.save_echo = echo;
        self
    }

    /// The gateway.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Resolve one input against `current`.
    ///
    /// # Errors
    ///
    /// Any [`TurnError`]; `current` is never modified.
    pub async fn run_turn(&self, current: &SaveGame, input: &str) -> Result<ResolvedTurn> {
        let bundle = ContextBundle::from_save(current);
        let action = self
            .resolver
            .resolve(input, &bundle, &self.gateway, &narration_context(current))
            .await?;
        debug!(verb = %action.verb, targets = action.targets.len(), "action resolved");

        if action.verb.is_read_only() {
            let narration = commands::render(action.verb, current).unwrap_or_default();
            return Ok(ResolvedTurn {
                next: None,
                outcome: TurnOutcome {
                    turn: current.turn,
                    narration,
                    deltas: Vec::new(),
                    roll: None,
                    available_commands: available_commands(current),
                    quit: action.verb == Verb::Quit,
                },
            });
        }

        let mut next = current.clone();
        let mut res = Resolution::default();
        match action.verb {
            Verb::Save if self.save_echo => res.line("Game saved."),
            Verb::Save => {}
            Verb::Roll => {
                let stat = action.stat.unwrap_or(DEFAULT_ROLL_STAT);
                let roll = next.roll_check(stat, Situation::AmbientCheck);
                res.line(format!("You test your {stat}: {}.", roll.outcome));
                res.roll(format!("{stat} check"), roll);
            }
            _ => {
                next.turn += 1;
                next.journal.record(next.turn, JournalKind::PlayerAction, action.residue.clone());
                self.apply(&mut next, &action, &mut res).await?;
                for _ in next.expire_promises() {
                    res.line("A promise you made has gone unkept.");
                }
            }
        }

        let narration = self.narrate(&bundle, &next, &action, &res).await?;
        if next.turn != current.turn {
            next.journal.record(next.turn, JournalKind::Narration, narration.clone());
        }
        let deltas = delta::diff(current, &next, res.ended);
        info!(turn = next.turn, verb = %action.verb, deltas = deltas.len(), "turn resolved");
        let outcome = TurnOutcome {
            turn: next.turn,
            narration,
            deltas,
            roll: res.roll,
            available_commands: available_commands(&next),
            quit: false,
        };
        Ok(ResolvedTurn {
            next: Some(next),
            outcome,
        })
    }

    async fn apply(&self, save: &mut SaveGame, action: &Action, res: &mut Resolution) -> Result<()> {
        match action.verb {
            Verb::Go => {
                let direction = action.exit().ok_or_else(|| missing("exit"))?;
                self.travel(save, direction, res).await
            }
            Verb::Talk => {
                let npc = action.npc().ok_or_else(|| missing("npc"))?;
                talk(save, npc, &action.residue, res)
            }
            Verb::Give => {
                let (item, npc) = action.item().zip(action.npc()).ok_or_else(|| missing("item"))?;
                give(save, item, npc, res)
            }
            Verb::Promise | Verb::Swear => {
                let npc = action.npc().ok_or_else(|| missing("npc"))?;
                let weight = if action.verb == Verb::Swear {
                    PromiseWeight::Major
                } else {
                    PromiseWeight::Minor
                };
                promise(save, npc, &action.residue, weight, res)
            }
            Verb::Keep | Verb::Renege => {
                let npc = action.npc().ok_or_else(|| missing("npc"))?;
                settle(save, npc, action.verb == Verb::Keep, res)
            }
            Verb::Attack | Verb::Defend | Verb::Retreat => {
                let combat = match action.verb {
                    Verb::Attack => CombatAction::Attack { target: action.enemy() },
                    Verb::Defend => CombatAction::Defend,
                    _ => CombatAction::Retreat,
                };
                fight(save, &combat, res)
            }
            Verb::Improvise if save.combat.is_some() => {
                let combat = CombatAction::Improvise {
                    stat: action.stat.unwrap_or(DEFAULT_IMPROVISE_STAT),
                    description: action.residue.clone(),
                    target: action.enemy(),
                };
                fight(save, &combat, res)
            }
            Verb::Improvise => {
                let stat = action.stat.unwrap_or(DEFAULT_IMPROVISE_STAT);
                let roll = save.roll_check(stat, Situation::Improvise);
                res.line(format!("You try it ({}).", roll.outcome));
                res.roll(format!("{stat} check"), roll);
                Ok(())
            }
            Verb::Inspect => inspect(save, &action.residue, res),
            Verb::Use | Verb::Equip | Verb::Unequip | Verb::Drop => {
                let item = action.item().ok_or_else(|| missing("item"))?;
                handle_item(save, action.verb, item, res)
            }
            Verb::Accept => {
                let quest = action.quest().ok_or_else(|| missing("quest"))?;
                save.accept_quest(quest)?;
                let title = save.quests.get(quest).map(|q| q.title.clone()).unwrap_or_default();
                res.line(format!("You take on the quest: {title}."));
                Ok(())
            }
            Verb::Abandon => {
                let quest = action.quest().ok_or_else(|| missing("quest"))?;
                save.abandon_quest(quest)?;
                let title = save.quests.get(quest).map(|q| q.title.clone()).unwrap_or_default();
                res.line(format!("You give up on {title}."));
                Ok(())
            }
            Verb::Look
            | Verb::Roll
            | Verb::Inventory
            | Verb::Stats
            | Verb::Quests
            | Verb::Map
            | Verb::Npcs
            | Verb::Save
            | Verb::Help
            | Verb::Quit => Ok(()),
        }
    }

    async fn travel(&self, save: &mut SaveGame, direction: Direction, res: &mut Resolution) -> Result<()> {
        if save.combat.is_some() {
            return Err(ReverieError::CombatActive.into());
        }
        let destination = match save.world.exit(save.location, direction)? {
            ExitTarget::Known(id) => id,
            ExitTarget::Unexplored => self.synthesize(save, direction).await?,
        };
        let arrival = save.move_to(destination)?;
        let place = save.current_location()?;
        res.line(format!("You head {direction} to {}.", place.name));
        if arrival.first_visit {
            res.line(place.description.clone());
        }
        let here: Vec<String> = save.npcs_here().iter().map(|n| format!("{} the {}", n.name, n.occupation)).collect();
        if !here.is_empty() {
            res.line(format!("Here: {}.", here.join(", ")));
        }
        if arrival.combat_started {
            let foes: Vec<String> = save
                .combat
                .as_ref()
                .map(|c| c.enemies.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default();
            res.line(format!("Danger! {} attack.", foes.join(", ")));
        }
        res.quests(&arrival.quests);
        Ok(())
    }

    /// Materialize the location behind an unexplored exit: a gateway draft
    /// when one is available and valid, the deterministic generator
    /// otherwise.
    async fn synthesize(&self, save: &mut SaveGame, direction: Direction) -> Result<reverie_core::LocationId> {
        if self.gateway.is_available() {
            let request = LocationRequest {
                context: narration_context(save),
                direction,
            };
            match self.gateway.draft_location(&request).await {
                Ok(draft) => {
                    let (seed, npcs) = draft.into_seeds();
                    match save.materialize(direction, seed, npcs) {
                        Ok(id) => return Ok(id),
                        Err(e) => warn!(error = %e, %direction, "location draft rejected, using generator"),
                    }
                }
                Err(e) => warn!(error = %e, %direction, "location draft failed, using generator"),
            }
        }
        let seed = save.fallback_seed(direction)?;
        Ok(save.materialize(direction, seed, Vec::new())?)
    }

    async fn narrate(&self, bundle: &ContextBundle, next: &SaveGame, action: &Action, res: &Resolution) -> Result<String> {
        if action.verb == Verb::Save {
            return Ok(res.lines.join("\n"));
        }
        let fallback = fallback_narration(res);
        if !self.gateway.is_available() {
            return Ok(fallback);
        }
        let request = NarrationRequest {
            context: narration_context(next),
            action: format!("{}: {}", action.verb, action.residue),
            resolution: res.lines.clone(),
            roll: res.roll.as_ref().map(ToString::to_string),
        };
        let prose = match self.gateway.narrate(&request).await {
            Ok(text) if text.trim().is_empty() => return Ok(fallback),
            Ok(text) => text.trim().to_string(),
            Err(e) if action.from_gateway() => {
                warn!(error = %e, "narration failed for free-text action");
                return Err(TurnError::from_gateway(&e));
            }
            Err(e) => {
                debug!(error = %e, "narration failed, using rule text");
                return Ok(fallback);
            }
        };
        check_consistency(bundle, next, &prose)?;
        Ok(prose)
    }
}

/// Reject prose naming a known NPC who is neither present before nor after
/// the turn, or is dead.
fn check_consistency(bundle: &ContextBundle, next: &SaveGame, prose: &str) -> Result<()> {
    let after = ContextBundle::from_save(next);
    for (id, name) in after.npcs_mentioned(prose) {
        let present = bundle.npcs.iter().chain(after.npcs.iter()).any(|n| n.id == id);
        let alive = next.npcs.get(&id).is_some_and(|n| n.alive);
        if !(present && alive) {
            warn!(npc = name, "narration named an npc outside the scene");
            return Err(TurnError::InvalidTargetReference {
                kind: "npc",
                reference: name.to_string(),
            });
        }
    }
    Ok(())
}

fn missing(kind: &'static str) -> TurnError {
    TurnError::InvalidTargetReference {
        kind,
        reference: String::new(),
    }
}

fn fallback_narration(res: &Resolution) -> String {
    if res.lines.is_empty() {
        return "Time passes.".into();
    }
    res.lines.join("\n")
}

fn talk(save: &mut SaveGame, npc: NpcId, summary: &str, res: &mut Resolution) -> Result<()> {
    let conversation = save.talk_to(npc, summary)?;
    let person = save.npc(npc)?;
    if conversation.first_meeting {
        res.line(format!("You meet {} the {}.", person.name, person.occupation));
    } else {
        res.line(format!("You speak with {}.", person.name));
    }
    if conversation.change.band_changed() {
        res.line(format!("{} now feels {} toward you.", person.name, conversation.change.to));
    }
    if let Some(quest) = conversation.offer.and_then(|id| save.quests.get(id)) {
        res.line(format!("{} asks for your help: {} ({})", person.name, quest.title, quest.hook));
    }
    res.quests(&conversation.quests);
    Ok(())
}

fn give(save: &mut SaveGame, item: reverie_core::ItemId, npc: NpcId, res: &mut Resolution) -> Result<()> {
    let Some(held) = save.inventory.get(item) else {
        return Err(missing("item"));
    };
    let name = held.name.clone();
    if matches!(held.kind, ItemKind::Key) {
        res.line(format!("You cannot part with the {name}."));
        return Ok(());
    }
    let change = save.give_item(npc, item)?;
    let person = save.npc(npc)?;
    res.line(format!("You give the {name} to {}.", person.name));
    if change.band_changed() {
        res.line(format!("{} now feels {} toward you.", person.name, change.to));
    }
    Ok(())
}

fn promise(save: &mut SaveGame, npc: NpcId, deed: &str, weight: PromiseWeight, res: &mut Resolution) -> Result<()> {
    let (_, due) = save.make_promise(npc, deed, weight)?;
    let person = save.npc(npc)?;
    let pledge = match weight {
        PromiseWeight::Major => "swear to",
        PromiseWeight::Minor => "promise",
    };
    res.line(format!("You {pledge} {}: {deed}. It is owed by turn {due}.", person.name));
    Ok(())
}

fn settle(save: &mut SaveGame, npc: NpcId, kept: bool, res: &mut Resolution) -> Result<()> {
    let settled = save.settle_promise(npc, kept)?;
    let person = save.npc(npc)?;
    let Some(settled) = settled else {
        res.line(format!("You owe {} nothing.", person.name));
        return Ok(());
    };
    match settled.status {
        PromiseStatus::Fulfilled => res.line(format!("You keep your promise to {}: {}.", person.name, settled.text)),
        PromiseStatus::Withdrawn => res.line(format!("You take back your promise to {}.", person.name)),
        PromiseStatus::Broken | PromiseStatus::Pending => {
            res.line(format!("You break your promise to {}.", person.name));
        }
    }
    if settled.change.band_changed() {
        res.line(format!("{} now feels {} toward you.", person.name, settled.change.to));
    }
    Ok(())
}

fn fight(save: &mut SaveGame, action: &CombatAction, res: &mut Resolution) -> Result<()> {
    let turn = save.combat_turn(action)?;
    let label = match action {
        CombatAction::Attack { .. } => "Attack".to_string(),
        CombatAction::Defend => "Defend".to_string(),
        CombatAction::Retreat => "Retreat".to_string(),
        CombatAction::Improvise { stat, .. } => format!("Improvise ({stat})"),
    };
    combat_lines(&turn.report, res);
    res.roll(label, turn.report.player_roll);
    if turn.report.outcome != CombatOutcome::None {
        res.ended = Some(turn.report.outcome);
        match turn.report.outcome {
            CombatOutcome::Victory => res.line(format!("Victory! You collect {} gold.", turn.gold)),
            CombatOutcome::Retreat => res.line("You escape the fight."),
            CombatOutcome::Defeat => {
                let place = save.current_location().map(|l| l.name.clone()).unwrap_or_default();
                res.line(format!(
                    "You are beaten. You come to at {place}, barely standing and with a lighter purse."
                ));
            }
            CombatOutcome::None => {}
        }
    }
    if let Some(xp) = turn.xp.filter(reverie_core::character::XpGain::leveled_up) {
        res.line(format!("You reach level {}!", xp.to_level));
    }
    res.quests(&turn.quests);
    Ok(())
}

fn combat_lines(report: &CombatReport, res: &mut Resolution) {
    if report.damage.is_empty() && !report.player_roll.outcome.is_success() {
        res.line(format!("Your move fails ({}).", report.player_roll.outcome));
    }
    for hit in &report.damage {
        if hit.to.is_defeated() {
            res.line(format!("{} falls.", hit.name));
        } else {
            res.line(format!("You hit {}: {} -> {}.", hit.name, hit.from, hit.to));
        }
    }
    for attack in &report.enemy_attacks {
        match attack.steps {
            0 => res.line(format!("{} misses you.", attack.enemy)),
            n => res.line(format!(
                "{} {} you ({n} step{}).",
                attack.enemy,
                if attack.counter { "punishes your opening and hits" } else { "hits" },
                if n == 1 { "" } else { "s" }
            )),
        }
    }
    if report.player_from != report.player_to {
        res.line(format!("You are now {}.", report.player_to));
    }
}

fn inspect(save: &mut SaveGame, detail: &str, res: &mut Resolution) -> Result<()> {
    let hidden: Vec<_> = save
        .current_location()?
        .hidden_secrets()
        .map(|s| (s.id, s.trigger.clone()))
        .collect();
    let mut found = false;
    for (id, trigger) in hidden {
        let evidence = match trigger {
            SecretTrigger::OnInspect | SecretTrigger::Keyword(_) => Evidence::Inspection {
                detail: detail.to_string(),
            },
            SecretTrigger::Check { stat, difficulty } => {
                let roll = check(save, stat, difficulty);
                res.roll(format!("{stat} check"), roll);
                Evidence::Check(roll.outcome)
            }
        };
        let (outcome, updates) = save.reveal(id, &evidence)?;
        if let RevealOutcome::Revealed(text) = outcome {
            found = true;
            res.line(format!("You discover: {text}"));
        }
        res.quests(&updates);
    }
    if !found {
        res.line(format!("You search {detail} but find nothing new."));
    }
    Ok(())
}

/// A search check against a secret's own difficulty, shifted by the preset.
fn check(save: &mut SaveGame, stat: Stat, difficulty: i32) -> Roll {
    let (value, modifier) = save.check_bonus(stat);
    let shift = save.difficulty.difficulty(Situation::Search) - Situation::Search.base_difficulty();
    let roll = save.dice.resolve(value, modifier, difficulty + shift);
    save.inventory.consume_boosts(stat);
    roll
}

fn handle_item(save: &mut SaveGame, verb: Verb, item: reverie_core::ItemId, res: &mut Resolution) -> Result<()> {
    let Some(held) = save.inventory.get(item) else {
        return Err(missing("item"));
    };
    let name = held.name.clone();
    let kind = held.kind;
    match verb {
        Verb::Use => {
            if !matches!(kind, ItemKind::Consumable(_)) {
                res.line(format!("The {name} is not something you can use up."));
                return Ok(());
            }
            match save.use_item(item)? {
                ConsumableEffect::Recover { .. } => {
                    res.line(format!("You use the {name}. You are now {}.", save.character.danger));
                }
                ConsumableEffect::Boost { stat, amount, checks } => {
                    res.line(format!("You use the {name}: +{amount} {stat} for your next {checks} checks."));
                }
            }
        }
        Verb::Equip => {
            if kind.slot().is_none() {
                res.line(format!("The {name} cannot be equipped."));
                return Ok(());
            }
            let slot = save.inventory.equip(item)?;
            res.line(format!("You equip the {name} ({slot})."));
        }
        Verb::Unequip => match save.inventory.unequip(item)? {
            Some(slot) => res.line(format!("You unequip the {name} ({slot}).")),
            None => res.line(format!("The {name} is not equipped.")),
        },
        _ => {
            if matches!(kind, ItemKind::Key) {
                res.line(format!("You cannot part with the {name}."));
                return Ok(());
            }
            let quantity = held_quantity(save, item);
            save.inventory.remove(item, quantity)?;
            res.line(format!("You drop the {name}."));
        }
    }
    Ok(())
}

fn held_quantity(save: &SaveGame, item: reverie_core::ItemId) -> u32 {
    save.inventory.get(item).map_or(0, |i| i.quantity)
}

/// Suggestions for the next input.
#[must_use]
pub fn available_commands(save: &SaveGame) -> Vec<String> {
    if let Some(combat) = &save.combat {
        let mut commands: Vec<String> = combat.standing().map(|e| format!("attack {}", e.name)).collect();
        commands.dedup();
        commands.extend(["defend", "retreat", "look", "help"].map(String::from));
        return commands;
    }
    let mut commands = vec!["look".to_string()];
    if let Some(location) = save.world.get(save.location) {
        commands.extend(location.exits.keys().map(|d| format!("go {d}")));
    }
    commands.extend(save.npcs_here().iter().map(|n| format!("talk {}", n.name)));
    commands.extend(
        save.npcs_here()
            .iter()
            .filter(|n| n.pending_promises().next().is_some())
            .map(|n| format!("keep promise to {}", n.name)),
    );
    commands.extend(ContextBundle::from_save(save).quests.iter().filter_map(|(_, title, status)| {
        (*status == reverie_core::quest::QuestStatus::NotStarted).then(|| format!("accept {title}"))
    }));
    commands.extend(["inspect", "inventory", "stats", "quests", "map", "save", "help", "quit"].map(String::from));
    commands
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::combat::EnemyTemplate;
    use reverie_core::{CharacterSheet, PlayerClass};
    use reverie_llm::ScriptedGateway;

    fn save() -> SaveGame {
        let sheet = CharacterSheet {
            name: "Ada".into(),
            race: "Human".into(),
            class: PlayerClass::CodeWarrior,
            stats: (5, 4, 3),
            background: "Sysadmin".into(),
        };
        SaveGame::new("orch", &sheet, 21).expect("new game")
    }

    fn orchestrator() -> TurnOrchestrator<ScriptedGateway> {
        TurnOrchestrator::new(ScriptedGateway::new().with_echo_narration(), IntentResolver::default())
    }

    #[tokio::test]
    async fn read_only_commands_change_nothing() {
        let save = save();
        let turn = orchestrator().run_turn(&save, "look").await.expect("look");
        assert!(turn.next.is_none());
        assert_eq!(turn.outcome.turn, 0);
        assert!(turn.outcome.narration.contains("Crossroads"));
    }

    #[tokio::test]
    async fn talking_advances_the_turn_and_offers_the_quest() {
        let save = save();
        let turn = orchestrator().run_turn(&save, "talk to mara").await.expect("talk");
        let next = turn.next.expect("committable");
        assert_eq!(next.turn, 1);
        assert!(turn.outcome.narration.contains("The Missing Ledger"));
        assert!(turn.outcome.available_commands.iter().any(|c| c.starts_with("accept")));
        assert_eq!(save.turn, 0);
    }

    #[tokio::test]
    async fn walking_off_the_map_uses_the_generator_when_drafts_fail() {
        let save = save();
        let orch = orchestrator();
        let turn = orch.run_turn(&save, "north").await.expect("travel");
        let next = turn.next.expect("committable");
        assert_ne!(next.location, save.location);
        assert_eq!(next.world.len(), save.world.len() + 1);
        assert_eq!(orch.gateway().location_calls(), 1);
        assert!(turn
            .outcome
            .deltas
            .iter()
            .any(|d| matches!(d, StateDelta::LocationDiscovered { .. })));
    }

    #[tokio::test]
    async fn combat_turn_reports_the_player_roll() {
        let mut save = save();
        save.start_combat(&[EnemyTemplate::new("Rat", -1)]).expect("combat");
        let turn = orchestrator().run_turn(&save, "attack").await.expect("attack");
        let roll = turn.outcome.roll.expect("attack roll");
        assert_eq!(roll.label, "Attack");
        assert!(turn.next.is_some());
    }

    #[tokio::test]
    async fn dead_npc_in_prose_is_rejected() {
        let mut save = save();
        let mara = save.npcs_here()[0].id;
        save.kill_npc(mara, "fever").expect("kill");
        let gateway = ScriptedGateway::new();
        gateway.push_narration(Ok("Mara Quill waves from behind the bar.".into()));
        let orch = TurnOrchestrator::new(gateway, IntentResolver::default());
        let err = orch.run_turn(&save, "inspect").await.expect_err("inconsistent");
        assert!(matches!(err, TurnError::InvalidTargetReference { kind: "npc", .. }));
    }

    #[tokio::test]
    async fn promises_are_made_and_kept_within_a_turn() {
        let save = save();
        let orch = orchestrator();
        let made = orch
            .run_turn(&save, "promise mara to find the ledger")
            .await
            .expect("promise")
            .next
            .expect("committable");
        let mara = made.npcs_here()[0].id;
        assert_eq!(made.npc(mara).expect("mara").pending_promises().count(), 1);

        let turn = orch.run_turn(&made, "keep my promise").await.expect("keep");
        assert!(turn.outcome.narration.contains("You keep your promise to Mara Quill"));
        let kept = turn.next.expect("committable");
        assert_eq!(kept.npc(mara).expect("mara").pending_promises().count(), 0);
        assert!(kept.npc(mara).expect("mara").disposition() > made.npc(mara).expect("mara").disposition());

        let turn = orch.run_turn(&kept, "break my promise").await.expect("nothing owed");
        assert!(turn.outcome.narration.contains("You owe Mara Quill nothing."));
    }

    #[tokio::test]
    async fn keys_cannot_be_dropped() {
        let mut save = save();
        let key = reverie_core::inventory::ItemTemplate::new("Cellar Key", "Iron.", ItemKind::Key, 0);
        save.acquire(&key).expect("key");
        let turn = orchestrator().run_turn(&save, "drop cellar key").await.expect("refused");
        let next = turn.next.expect("turn still passes");
        assert!(next.inventory.find_by_name("Cellar Key").is_some());
        assert!(turn.outcome.narration.contains("cannot part"));
    }
}
