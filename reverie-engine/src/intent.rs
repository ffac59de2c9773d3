//! Intent Resolver
//!
//! Maps raw player text to exactly one [`Action`].
//!
//! ```text
//!  input ──▶ clean ──▶ rule table ──hit──▶ Action
//!                          │
//!                         miss
//!                          ▼
//!               gateway.extract_intent ──▶ confidence gate ──▶ re-validate targets ──▶ Action
//! ```
//!
//! The rule table never touches the gateway, so system commands work with
//! no narration provider at all.  Gateway output is treated as a
//! suggestion: verbs must be ones this turn offered and every target is
//! looked up again in the [`ContextBundle`].  Mid-fight, a verb the turn
//! did not offer becomes an improvised move on the player's own words.

use tracing::{debug, warn};

use reverie_core::quest::QuestStatus;
use reverie_core::types::{Direction, NpcId, Stat};
use reverie_llm::{IntentExtraction, IntentRequest, NarrationContext, NarrationGateway};

use crate::action::{Action, IntentSource, TargetRef, Verb};
use crate::context::ContextBundle;
use crate::error::{Result, TurnError};

/// Stat used for improvised actions when nothing else is said.
pub const DEFAULT_IMPROVISE_STAT: Stat = Stat::Wit;

/// Stat rolled by a bare `roll`.
pub const DEFAULT_ROLL_STAT: Stat = Stat::Spirit;

/// Turns text into actions.
#[derive(Debug, Clone, Copy)]
pub struct IntentResolver {
    confidence_threshold: f32,
}

impl Default for IntentResolver {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl IntentResolver {
    /// A resolver rejecting gateway extractions below `confidence_threshold`.
    #[must_use]
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
        }
    }

    /// The configured threshold.
    #[must_use]
    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Resolve one input: rule table first, then the gateway.
    ///
    /// # Errors
    ///
    /// [`TurnError::UnparseableInput`] for empty input,
    /// [`TurnError::AmbiguousIntent`] / [`TurnError::InvalidTargetReference`]
    /// when the input does not pin down one valid action, and
    /// [`TurnError::NarrationUnavailable`] when free text needs a gateway
    /// that cannot answer.
    pub async fn resolve<G: NarrationGateway>(
        &self,
        input: &str,
        bundle: &ContextBundle,
        gateway: &G,
        context: &NarrationContext,
    ) -> Result<Action> {
        if let Some(action) = self.rule(input, bundle)? {
            debug!(verb = %action.verb, "rule table matched");
            return Ok(action);
        }
        let text = clean(input)?;
        if !gateway.is_available() {
            return Err(TurnError::NarrationUnavailable(
                "no narration provider is configured; try a command such as 'help'".into(),
            ));
        }
        let verbs = offered_verbs(bundle);
        let request = IntentRequest {
            input: text.clone(),
            context: context.clone(),
            verbs: verbs.iter().map(|v| v.name().to_string()).collect(),
        };
        let extraction = gateway.extract_intent(&request).await.map_err(|e| {
            warn!(error = %e, "intent extraction failed");
            TurnError::from_gateway(&e)
        })?;
        debug!(verb = %extraction.verb, confidence = extraction.confidence, "gateway intent");
        self.accept(&extraction, &text, bundle, &verbs)
    }

    /// Match the deterministic rule table.  `Ok(None)` means the input is
    /// free text.
    ///
    /// # Errors
    ///
    /// As for [`IntentResolver::resolve`], minus gateway errors.
    pub fn rule(&self, input: &str, bundle: &ContextBundle) -> Result<Option<Action>> {
        let text = clean(input)?;
        let lowered = text.to_lowercase();
        let mut words = lowered.split_whitespace();
        let Some(head) = words.next() else {
            return Err(TurnError::UnparseableInput(input.to_string()));
        };
        let rest = words.collect::<Vec<_>>().join(" ");
        let action = |verb: Verb, targets: Vec<TargetRef>| Ok(Some(Action::rule(verb, targets, text.as_str())));

        match head {
            "look" | "l" => match strip_any(&rest, &["at ", "around"]) {
                "" => action(Verb::Look, Vec::new()),
                thing => Ok(Some(Action::rule(Verb::Inspect, Vec::new(), thing))),
            },
            "go" | "walk" | "move" | "head" | "travel" => {
                let word = strip_any(&rest, &["to the ", "to "]);
                if word.is_empty() {
                    return Err(TurnError::AmbiguousIntent(format!(
                        "Go where? Exits: {}.",
                        exit_list(bundle)
                    )));
                }
                action(Verb::Go, vec![TargetRef::Exit(bundle.resolve_exit(word)?)])
            }
            word if rest.is_empty() && Direction::parse(word).is_some() => {
                action(Verb::Go, vec![TargetRef::Exit(bundle.resolve_exit(word)?)])
            }
            // Mid-fight, words aimed at someone are an improvised move.
            "talk" | "speak" | "chat" | "greet" if !bundle.in_combat => {
                let who = strip_any(&rest, &["to ", "with "]);
                action(Verb::Talk, vec![TargetRef::Npc(sole_npc(bundle, who, "Talk to whom")?)])
            }
            "roll" => {
                let stat = if rest.is_empty() {
                    DEFAULT_ROLL_STAT
                } else {
                    rest.parse::<Stat>().map_err(|_| TurnError::InvalidTargetReference {
                        kind: "stat",
                        reference: rest.clone(),
                    })?
                };
                Ok(Some(Action::rule(Verb::Roll, Vec::new(), text.as_str()).with_stat(Some(stat))))
            }
            "inventory" | "inv" | "i" => action(Verb::Inventory, Vec::new()),
            "stats" | "sheet" | "character" => action(Verb::Stats, Vec::new()),
            "quests" | "journal" => action(Verb::Quests, Vec::new()),
            "map" => action(Verb::Map, Vec::new()),
            "npcs" | "people" => action(Verb::Npcs, Vec::new()),
            "save" => action(Verb::Save, Vec::new()),
            "help" | "commands" => action(Verb::Help, Vec::new()),
            "quit" | "q" => action(Verb::Quit, Vec::new()),

            "attack" | "hit" | "strike" | "fight" if bundle.in_combat => {
                let targets = match rest.as_str() {
                    "" => Vec::new(),
                    who => vec![TargetRef::Enemy(bundle.resolve_enemy(who)?)],
                };
                action(Verb::Attack, targets)
            }
            "defend" | "block" | "parry" if bundle.in_combat => action(Verb::Defend, Vec::new()),
            "retreat" | "flee" | "run" if bundle.in_combat => action(Verb::Retreat, Vec::new()),

            "use" | "drink" | "eat" | "quaff" => item_action(Verb::Use, &rest, bundle, &text),
            "equip" | "wield" | "wear" => item_action(Verb::Equip, &rest, bundle, &text),
            "unequip" | "remove" => item_action(Verb::Unequip, &rest, bundle, &text),
            "drop" | "discard" => item_action(Verb::Drop, &rest, bundle, &text),
            "give" | "offer" if !bundle.in_combat => {
                let (what, who) = match rest.split_once(" to ") {
                    Some((what, who)) => (what, who),
                    None => (rest.as_str(), ""),
                };
                if what.trim().is_empty() {
                    return Err(TurnError::AmbiguousIntent("Give what?".into()));
                }
                let item = bundle.resolve_item(what)?;
                let npc = sole_npc(bundle, who, "Give it to whom")?;
                action(Verb::Give, vec![TargetRef::Item(item), TargetRef::Npc(npc)])
            }

            "inspect" | "search" | "examine" => {
                let detail = if rest.is_empty() { bundle.location.to_lowercase() } else { rest.clone() };
                Ok(Some(Action::rule(Verb::Inspect, Vec::new(), detail)))
            }

            "promise" if !bundle.in_combat => promise_action(Verb::Promise, &rest, bundle),
            "swear" | "vow" if !bundle.in_combat => promise_action(Verb::Swear, &rest, bundle),
            "keep" | "break" | "renege" if !bundle.in_combat => match (head, promise_subject(&rest)) {
                ("keep", Some(who)) => settle_action(Verb::Keep, who, bundle, &text),
                ("renege", None) => settle_action(Verb::Renege, strip_any(&rest, &["on ", "to "]), bundle, &text),
                (_, Some(who)) => settle_action(Verb::Renege, who, bundle, &text),
                _ => Ok(None),
            },

            "accept" => quest_action(Verb::Accept, &rest, bundle, QuestStatus::NotStarted, &text),
            "abandon" => quest_action(Verb::Abandon, &rest, bundle, QuestStatus::Active, &text),

            _ => Ok(None),
        }
    }

    fn accept(&self, extraction: &IntentExtraction, text: &str, bundle: &ContextBundle, offered: &[Verb]) -> Result<Action> {
        if extraction.confidence < self.confidence_threshold {
            return Err(TurnError::AmbiguousIntent(format!(
                "I'm not sure what you mean by \"{text}\". Could you rephrase it, or type 'help'?"
            )));
        }
        let verb = match Verb::from_name(&extraction.verb).filter(|v| offered.contains(v)) {
            Some(verb) => verb,
            None if bundle.in_combat => {
                debug!(verb = %extraction.verb, "unoffered verb in combat, improvising");
                Verb::Improvise
            }
            None => {
                return Err(TurnError::AmbiguousIntent(format!(
                    "I don't know how to '{}' here. Try something else?",
                    extraction.verb
                )));
            }
        };
        let target = extraction.target.as_deref().map(str::trim).filter(|t| !t.is_empty());
        if let Some(name) = target {
            reject_absent_npc(bundle, name)?;
        }
        let stat = extraction
            .stat
            .as_deref()
            .and_then(|s| s.parse::<Stat>().ok())
            .unwrap_or(DEFAULT_IMPROVISE_STAT);

        let targets = match verb {
            Verb::Go => {
                let word = target.ok_or_else(|| TurnError::AmbiguousIntent(format!("Go where? Exits: {}.", exit_list(bundle))))?;
                vec![TargetRef::Exit(bundle.resolve_exit(word)?)]
            }
            Verb::Talk => vec![TargetRef::Npc(sole_npc(bundle, target.unwrap_or(""), "Talk to whom")?)],
            Verb::Promise | Verb::Swear | Verb::Keep | Verb::Renege => {
                vec![TargetRef::Npc(sole_npc(bundle, target.unwrap_or(""), "To whom")?)]
            }
            Verb::Give => {
                let what = target.ok_or_else(|| TurnError::AmbiguousIntent("Give what?".into()))?;
                vec![
                    TargetRef::Item(bundle.resolve_item(what)?),
                    TargetRef::Npc(sole_npc(bundle, "", "Give it to whom")?),
                ]
            }
            Verb::Use | Verb::Equip | Verb::Unequip | Verb::Drop => {
                let what = target.ok_or_else(|| TurnError::AmbiguousIntent(format!("{} what?", capitalized(verb))))?;
                vec![TargetRef::Item(bundle.resolve_item(what)?)]
            }
            Verb::Accept | Verb::Abandon => {
                let which = target.ok_or_else(|| TurnError::AmbiguousIntent("Which quest?".into()))?;
                vec![TargetRef::Quest(bundle.resolve_quest(which)?)]
            }
            Verb::Attack => match target {
                Some(who) => vec![TargetRef::Enemy(bundle.resolve_enemy(who)?)],
                None => Vec::new(),
            },
            Verb::Inspect | Verb::Improvise => match target {
                Some(thing) => bundle.resolve_scene(thing)?.into_iter().collect(),
                None => Vec::new(),
            },
            Verb::Defend
            | Verb::Retreat
            | Verb::Look
            | Verb::Roll
            | Verb::Inventory
            | Verb::Stats
            | Verb::Quests
            | Verb::Map
            | Verb::Npcs
            | Verb::Save
            | Verb::Help
            | Verb::Quit => Vec::new(),
        };

        Ok(Action {
            verb,
            targets,
            stat: matches!(verb, Verb::Improvise).then_some(stat),
            residue: text.to_string(),
            source: IntentSource::Gateway {
                confidence: extraction.confidence,
            },
        })
    }
}

/// Verbs the gateway may pick from this turn.
#[must_use]
pub fn offered_verbs(bundle: &ContextBundle) -> Vec<Verb> {
    if bundle.in_combat {
        let mut verbs = Verb::COMBAT.to_vec();
        verbs.push(Verb::Improvise);
        verbs
    } else {
        Verb::WORLD.to_vec()
    }
}

/// Trim, drop a leading slash, reject input with nothing to read.
fn clean(input: &str) -> Result<String> {
    let text = input.trim();
    let text = text.strip_prefix('/').unwrap_or(text).trim();
    if !text.chars().any(char::is_alphanumeric) {
        return Err(TurnError::UnparseableInput(input.trim().to_string()));
    }
    Ok(text.to_string())
}

fn strip_any<'a>(text: &'a str, prefixes: &[&str]) -> &'a str {
    prefixes
        .iter()
        .find_map(|p| text.strip_prefix(p))
        .unwrap_or(text)
        .trim()
}

fn exit_list(bundle: &ContextBundle) -> String {
    if bundle.exits.is_empty() {
        return "none".into();
    }
    bundle
        .exits
        .iter()
        .map(|(d, _)| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalized(verb: Verb) -> String {
    let name = verb.name();
    let mut chars = name.chars();
    chars
        .next()
        .map(|c| c.to_ascii_uppercase().to_string() + chars.as_str())
        .unwrap_or_default()
}

/// Resolve `who`, or the only NPC here when `who` is empty.
fn sole_npc(bundle: &ContextBundle, who: &str, question: &str) -> Result<NpcId> {
    if !who.trim().is_empty() {
        return bundle.resolve_npc(who);
    }
    match bundle.npcs.as_slice() {
        [only] => Ok(only.id),
        [] => Err(TurnError::InvalidTargetReference {
            kind: "npc",
            reference: "anyone".into(),
        }),
        many => Err(TurnError::AmbiguousIntent(format!(
            "{question}? {}",
            many.iter().map(|n| n.name.as_str()).collect::<Vec<_>>().join(" or ")
        ))),
    }
}

fn item_action(verb: Verb, what: &str, bundle: &ContextBundle, text: &str) -> Result<Option<Action>> {
    if what.trim().is_empty() {
        return Err(TurnError::AmbiguousIntent(format!("{} what?", capitalized(verb))));
    }
    let item = bundle.resolve_item(what)?;
    Ok(Some(Action::rule(verb, vec![TargetRef::Item(item)], text)))
}

/// `promise mara to find the ledger`, `swear that i will return`,
/// `vow to mara that ...`.  The residue is the promised deed.
fn promise_action(verb: Verb, rest: &str, bundle: &ContextBundle) -> Result<Option<Action>> {
    let (who, deed) = match rest.split_once(" that ") {
        Some((who, deed)) => (strip_any(who, &["to "]), deed),
        None => match rest.strip_prefix("to ") {
            Some(deed) => ("", deed),
            None => rest.split_once(" to ").unwrap_or(("", rest)),
        },
    };
    let deed = deed.trim();
    if deed.is_empty() || deed == "that" {
        return Err(TurnError::AmbiguousIntent(format!("{} what?", capitalized(verb))));
    }
    let npc = sole_npc(bundle, who, "To whom")?;
    Ok(Some(Action::rule(verb, vec![TargetRef::Npc(npc)], deed)))
}

/// The NPC part of `keep my promise to mara`, or `None` when the words
/// after the verb are not about a promise.
fn promise_subject(rest: &str) -> Option<&str> {
    let rest = strip_any(rest, &["on "]);
    ["my promise", "your promise", "the promise", "promise", "my word", "your word", "word"]
        .iter()
        .find_map(|p| rest.strip_prefix(p))
        .filter(|r| r.is_empty() || r.starts_with(' '))
        .map(|r| strip_any(r.trim_start(), &["to ", "with "]))
}

fn settle_action(verb: Verb, who: &str, bundle: &ContextBundle, text: &str) -> Result<Option<Action>> {
    let npc = sole_npc(bundle, who, "Whose promise")?;
    Ok(Some(Action::rule(verb, vec![TargetRef::Npc(npc)], text)))
}

fn quest_action(verb: Verb, which: &str, bundle: &ContextBundle, status: QuestStatus, text: &str) -> Result<Option<Action>> {
    let quest = if which.trim().is_empty() {
        let candidates: Vec<_> = bundle.quests.iter().filter(|(_, _, s)| *s == status).collect();
        match candidates.as_slice() {
            [(id, _, _)] => *id,
            [] => {
                return Err(TurnError::InvalidTargetReference {
                    kind: "quest",
                    reference: format!("quest to {verb}"),
                });
            }
            many => {
                return Err(TurnError::AmbiguousIntent(format!(
                    "Which quest? {}",
                    many.iter().map(|(_, t, _)| t.as_str()).collect::<Vec<_>>().join(" or ")
                )));
            }
        }
    } else {
        bundle.resolve_quest(which)?
    };
    Ok(Some(Action::rule(verb, vec![TargetRef::Quest(quest)], text)))
}

/// A gateway target that is exactly a known NPC's name must be present.
fn reject_absent_npc(bundle: &ContextBundle, name: &str) -> Result<()> {
    let wanted = name.trim().to_lowercase();
    let known = bundle.known_npcs.iter().find(|(_, n)| n.to_lowercase() == wanted);
    match known {
        Some((id, n)) if !bundle.npcs.iter().any(|p| p.id == *id) => Err(TurnError::InvalidTargetReference {
            kind: "npc",
            reference: n.clone(),
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use reverie_core::combat::EnemyTemplate;
    use reverie_core::config::LlmConfig;
    use reverie_core::{CharacterSheet, PlayerClass, SaveGame};
    use reverie_llm::{LlmGateway, ScriptedGateway};

    use crate::action::IntentCategory;
    use crate::context::narration_context;

    fn save() -> SaveGame {
        let sheet = CharacterSheet {
            name: "Ada".into(),
            race: "Human".into(),
            class: PlayerClass::CodeWarrior,
            stats: (5, 4, 3),
            background: "Sysadmin".into(),
        };
        SaveGame::new("intent", &sheet, 11).expect("new game")
    }

    fn rule(input: &str, save: &SaveGame) -> Result<Option<Action>> {
        IntentResolver::default().rule(input, &ContextBundle::from_save(save))
    }

    #[test]
    fn garbage_is_unparseable() {
        let save = save();
        for input in ["", "   ", "?!", "/"] {
            assert!(matches!(rule(input, &save), Err(TurnError::UnparseableInput(_))), "{input:?}");
        }
    }

    #[test]
    fn system_lexicon_matches_without_a_gateway() {
        let save = save();
        let cases = [
            ("look", Verb::Look),
            ("/stats", Verb::Stats),
            ("i", Verb::Inventory),
            ("quests", Verb::Quests),
            ("map", Verb::Map),
            ("npcs", Verb::Npcs),
            ("save", Verb::Save),
            ("help", Verb::Help),
            ("quit", Verb::Quit),
            ("n", Verb::Go),
            ("go down", Verb::Go),
            ("talk to mara", Verb::Talk),
            ("talk", Verb::Talk),
            ("roll might", Verb::Roll),
        ];
        for (input, verb) in cases {
            let action = rule(input, &save).expect("ok").expect("matched");
            assert_eq!(action.verb, verb, "{input}");
            assert_eq!(action.source, IntentSource::Rule);
        }
    }

    #[test]
    fn rule_targets_are_validated() {
        let save = save();
        assert!(matches!(
            rule("go west", &save),
            Err(TurnError::InvalidTargetReference { kind: "exit", .. })
        ));
        assert!(matches!(
            rule("talk to gandalf", &save),
            Err(TurnError::InvalidTargetReference { kind: "npc", .. })
        ));
        assert!(matches!(rule("use", &save), Err(TurnError::AmbiguousIntent(_))));
        assert!(matches!(
            rule("roll luck", &save),
            Err(TurnError::InvalidTargetReference { kind: "stat", .. })
        ));
    }

    #[test]
    fn combat_verbs_only_in_combat() {
        let mut save = save();
        assert_eq!(rule("attack", &save).expect("ok"), None);
        save.start_combat(&[EnemyTemplate::new("Cave Goblin", 0)]).expect("combat");
        let action = rule("attack goblin", &save).expect("ok").expect("matched");
        assert_eq!(action.category(), IntentCategory::Combat);
        assert!(action.enemy().is_some());
        assert_eq!(rule("flee", &save).expect("ok").map(|a| a.verb), Some(Verb::Retreat));
    }

    #[test]
    fn inspect_keeps_the_detail() {
        let save = save();
        let action = rule("search the cellar", &save).expect("ok").expect("matched");
        assert_eq!(action.verb, Verb::Inspect);
        assert_eq!(action.residue, "the cellar");
    }

    #[test]
    fn free_text_falls_through() {
        let save = save();
        assert_eq!(rule("sing a sea shanty", &save).expect("ok"), None);
    }

    #[tokio::test]
    async fn gateway_intent_is_revalidated() {
        let save = save();
        let bundle = ContextBundle::from_save(&save);
        let ctx = narration_context(&save);
        let resolver = IntentResolver::new(0.6);
        let gateway = ScriptedGateway::new();

        gateway.push_verb("talk", Some("Mara Quill"), 0.9);
        let action = resolver
            .resolve("ask the innkeeper about rooms", &bundle, &gateway, &ctx)
            .await
            .expect("resolved");
        assert_eq!(action.verb, Verb::Talk);
        assert!(action.from_gateway());

        gateway.push_verb("talk", Some("mara"), 0.3);
        let err = resolver
            .resolve("mumble at the bar", &bundle, &gateway, &ctx)
            .await
            .expect_err("low confidence");
        assert!(matches!(err, TurnError::AmbiguousIntent(_)));

        gateway.push_verb("talk", Some("Gandalf"), 0.95);
        let err = resolver
            .resolve("beckon the wizard over", &bundle, &gateway, &ctx)
            .await
            .expect_err("hallucinated");
        assert!(matches!(err, TurnError::InvalidTargetReference { kind: "npc", .. }));

        gateway.push_verb("quit", None, 0.99);
        let err = resolver
            .resolve("leave this place forever", &bundle, &gateway, &ctx)
            .await
            .expect_err("system verbs are never inferred");
        assert!(matches!(err, TurnError::AmbiguousIntent(_)));
    }

    #[tokio::test]
    async fn exhausted_gateway_is_unavailable() {
        let save = save();
        let err = IntentResolver::default()
            .resolve(
                "whistle a tune",
                &ContextBundle::from_save(&save),
                &ScriptedGateway::new(),
                &narration_context(&save),
            )
            .await
            .expect_err("no script");
        assert!(matches!(err, TurnError::NarrationUnavailable(_)));
    }

    #[tokio::test]
    async fn free_text_in_combat_improvises() {
        let mut save = save();
        save.start_combat(&[EnemyTemplate::new("Cave Goblin", 0)]).expect("combat");
        let gateway = ScriptedGateway::new();
        gateway.push_intent(Ok(IntentExtraction {
            verb: "improvise".into(),
            target: Some("the fire".into()),
            confidence: 0.8,
            stat: Some("might".into()),
        }));
        let action = IntentResolver::default()
            .resolve(
                "kick embers from the fire at it",
                &ContextBundle::from_save(&save),
                &gateway,
                &narration_context(&save),
            )
            .await
            .expect("improvise");
        assert_eq!(action.verb, Verb::Improvise);
        assert_eq!(action.stat, Some(Stat::Might));
        assert!(action.targets.is_empty());
    }

    #[test]
    fn promises_name_the_npc_and_the_deed() {
        let save = save();
        let cases = [
            ("promise mara to find the ledger", Verb::Promise, "find the ledger"),
            ("promise to find the ledger", Verb::Promise, "find the ledger"),
            ("swear to mara that i will return", Verb::Swear, "i will return"),
            ("vow to come back", Verb::Swear, "come back"),
        ];
        for (input, verb, deed) in cases {
            let action = rule(input, &save).expect("ok").expect("matched");
            assert_eq!(action.verb, verb, "{input}");
            assert_eq!(action.residue, deed, "{input}");
            assert!(action.npc().is_some(), "{input}");
        }
        assert!(matches!(rule("promise", &save), Err(TurnError::AmbiguousIntent(_))));
        assert!(matches!(
            rule("promise gandalf to behave", &save),
            Err(TurnError::InvalidTargetReference { kind: "npc", .. })
        ));
    }

    #[test]
    fn keep_and_break_only_match_promises() {
        let save = save();
        let verb = |input: &str| rule(input, &save).expect("ok").map(|a| a.verb);
        assert_eq!(verb("keep my promise to mara"), Some(Verb::Keep));
        assert_eq!(verb("keep promise"), Some(Verb::Keep));
        assert_eq!(verb("break my word"), Some(Verb::Renege));
        assert_eq!(verb("renege on mara"), Some(Verb::Renege));
        assert_eq!(verb("break the door"), None);
        assert_eq!(verb("keep watch"), None);
        assert_eq!(verb("keep promises"), None);
    }

    #[tokio::test]
    async fn gateway_inspect_of_a_missing_thing_is_ambiguous() {
        let save = save();
        let bundle = ContextBundle::from_save(&save);
        let ctx = narration_context(&save);
        let resolver = IntentResolver::default();
        let gateway = ScriptedGateway::new();

        gateway.push_verb("inspect", Some("silver locket"), 0.9);
        let err = resolver
            .resolve("study the silver locket closely", &bundle, &gateway, &ctx)
            .await
            .expect_err("nothing by that name");
        assert!(matches!(err, TurnError::AmbiguousIntent(_)));

        gateway.push_verb("inspect", Some("the trapdoor"), 0.9);
        let action = resolver
            .resolve("peer at the trapdoor", &bundle, &gateway, &ctx)
            .await
            .expect("scenery");
        assert_eq!(action.verb, Verb::Inspect);
        assert!(action.targets.is_empty());

        gateway.push_verb("improvise", Some("the chandelier"), 0.9);
        let err = resolver
            .resolve("swing from the chandelier", &bundle, &gateway, &ctx)
            .await
            .expect_err("no chandelier here");
        assert!(matches!(err, TurnError::AmbiguousIntent(_)));
    }

    /// Answer one Ollama `/api/generate` call with `body` on a loopback
    /// port and return the endpoint.
    async fn canned_ollama(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn talking_mid_fight_improvises_through_either_gateway() {
        let mut save = save();
        save.start_combat(&[EnemyTemplate::new("Cave Goblin", 0)]).expect("combat");
        let bundle = ContextBundle::from_save(&save);
        let ctx = narration_context(&save);
        let resolver = IntentResolver::default();
        let input = "talk to the goblin";
        assert_eq!(resolver.rule(input, &bundle).expect("free text"), None);

        let scripted = ScriptedGateway::new();
        scripted.push_verb("talk", Some("goblin"), 0.9);
        let action = resolver.resolve(input, &bundle, &scripted, &ctx).await.expect("scripted");
        assert_eq!(action.verb, Verb::Improvise);
        assert_eq!(action.residue, input);
        assert_eq!(action.stat, Some(DEFAULT_IMPROVISE_STAT));
        assert!(action.enemy().is_some());

        let endpoint = canned_ollama(
            r#"{"response":"{\"verb\":\"talk\",\"target\":\"goblin\",\"confidence\":0.9}","eval_count":5}"#,
        )
        .await;
        let config = LlmConfig {
            endpoint,
            max_retries: 0,
            ..LlmConfig::default()
        };
        let llm = LlmGateway::from_config(&config).expect("gateway");
        let action = resolver.resolve(input, &bundle, &llm, &ctx).await.expect("llm");
        assert_eq!(action.verb, Verb::Improvise);
        assert_eq!(action.residue, input);
        assert!(action.enemy().is_some());
    }
}
