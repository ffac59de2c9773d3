//! Prompt Quality Evaluation — Golden Test Set
//!
//! Curated template/variable pairs checking that every built-in prompt
//! renders completely and keeps its guard rails: targets restricted to the
//! scene, resolution facts treated as final, JSON output where structured.
//!
//! These run offline; no model is called.

use reverie_llm::prompt::{self, PromptEngine, PromptId};
use reverie_llm::types::NarrationContext;

struct GoldenCase {
    name: &'static str,
    template: &'static str,
    vars: Vec<(&'static str, &'static str)>,
    prompt_must_contain: Vec<&'static str>,
    prompt_must_not_contain: Vec<&'static str>,
}

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        // ---------------------------------------------------------------
        // Intent extraction
        // ---------------------------------------------------------------
        GoldenCase {
            name: "intent_system_lists_verbs",
            template: prompt::INTENT_SYSTEM,
            vars: vec![("verbs", "talk, inspect, use, improvise")],
            prompt_must_contain: vec!["talk, inspect, use, improvise", "Never invent", "JSON"],
            prompt_must_not_contain: vec!["{verbs}"],
        },
        GoldenCase {
            name: "intent_user_tavern_scene",
            template: prompt::INTENT_USER,
            vars: vec![
                ("location", "The Lantern Inn"),
                ("npcs", "Mara Quill (Innkeeper, Neutral)"),
                ("enemies", "none"),
                ("exits", "north, out"),
                ("items", "Rusty Sword, Healing Draught"),
                ("input", "ask the innkeeper about the cellar noises"),
            ],
            prompt_must_contain: vec![
                "The Lantern Inn",
                "Mara Quill",
                "ask the innkeeper about the cellar noises",
                "\"confidence\"",
            ],
            prompt_must_not_contain: vec!["{input}", "{npcs}", "{{"],
        },
        GoldenCase {
            name: "intent_user_mid_combat",
            template: prompt::INTENT_USER,
            vars: vec![
                ("location", "Collapsed Mine"),
                ("npcs", "none"),
                ("enemies", "Cave Goblin (Bloodied), Cave Goblin (Fresh)"),
                ("exits", "south"),
                ("items", "Lantern"),
                ("input", "swing the lantern at the wounded one"),
            ],
            prompt_must_contain: vec!["Cave Goblin (Bloodied)", "swing the lantern"],
            prompt_must_not_contain: vec!["{enemies}", "{items}"],
        },
        // ---------------------------------------------------------------
        // Narration
        // ---------------------------------------------------------------
        GoldenCase {
            name: "narration_system_guard_rails",
            template: prompt::NARRATION_SYSTEM,
            vars: vec![],
            prompt_must_contain: vec!["final", "Never bring back the dead", "second person"],
            prompt_must_not_contain: vec!["JSON"],
        },
        GoldenCase {
            name: "narration_user_victory",
            template: prompt::NARRATION_USER,
            vars: vec![
                ("player", "Ada, level 2 Code Warrior (Bloodied)"),
                ("location", "Collapsed Mine"),
                ("location_description", "Timbers groan overhead."),
                ("npcs", "none"),
                ("enemies", "none"),
                ("recent", "- Combat started against Cave Goblin."),
                ("action", "attack Cave Goblin"),
                ("roll", "Roll: d20 17 + 7 = 24 vs 12 (critical hit? no)"),
                ("resolution", "- Cave Goblin: Critical -> Defeated\n- Victory"),
            ],
            prompt_must_contain: vec!["Ada, level 2", "Timbers groan", "Victory", "attack Cave Goblin"],
            prompt_must_not_contain: vec!["{roll}", "{resolution}", "{recent}"],
        },
        GoldenCase {
            name: "narration_user_no_roll",
            template: prompt::NARRATION_USER,
            vars: vec![
                ("player", "Ada"),
                ("location", "The Lantern Inn"),
                ("location_description", "A warm common room."),
                ("npcs", "Mara Quill (Innkeeper, Friendly)"),
                ("enemies", "none"),
                ("recent", "(nothing yet)"),
                ("action", "talk Mara Quill"),
                ("roll", ""),
                ("resolution", "- Mara Quill is Friendly"),
            ],
            prompt_must_contain: vec!["Mara Quill (Innkeeper, Friendly)", "(nothing yet)"],
            prompt_must_not_contain: vec!["Roll:", "{player}"],
        },
        // ---------------------------------------------------------------
        // Location drafts
        // ---------------------------------------------------------------
        GoldenCase {
            name: "location_system_limits",
            template: prompt::LOCATION_SYSTEM,
            vars: vec![],
            prompt_must_contain: vec!["At most two people", "settlement, wilderness, dungeon, region", "JSON"],
            prompt_must_not_contain: vec![],
        },
        GoldenCase {
            name: "location_user_heading_north",
            template: prompt::LOCATION_USER,
            vars: vec![
                ("location", "The Lantern Inn"),
                ("location_description", "A warm common room."),
                ("direction", "north"),
                ("npcs", "Mara Quill"),
            ],
            prompt_must_contain: vec!["heading north", "must not be repeated", "\"attack_bonus\""],
            prompt_must_not_contain: vec!["{direction}", "{location}"],
        },
        GoldenCase {
            name: "location_user_going_down",
            template: prompt::LOCATION_USER,
            vars: vec![
                ("location", "Old Well"),
                ("location_description", "Moss and a frayed rope."),
                ("direction", "down"),
                ("npcs", "none"),
            ],
            prompt_must_contain: vec!["Old Well", "heading down"],
            prompt_must_not_contain: vec!["{npcs}"],
        },
        GoldenCase {
            name: "intent_system_improvise_fallback",
            template: prompt::INTENT_SYSTEM,
            vars: vec![("verbs", "attack, defend, retreat, improvise")],
            prompt_must_contain: vec!["use verb improvise", "confidence"],
            prompt_must_not_contain: vec!["TODO"],
        },
    ]
}

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    for case in &golden_cases() {
        let rendered = prompt::render_template(case.template, &case.vars);
        for needle in &case.prompt_must_contain {
            assert!(
                rendered.contains(needle),
                "Golden case '{}': rendered prompt must contain '{}'.\nRendered:\n{}",
                case.name,
                needle,
                rendered
            );
        }
        for needle in &case.prompt_must_not_contain {
            assert!(
                !rendered.contains(needle),
                "Golden case '{}': rendered prompt must NOT contain '{}'.\nRendered:\n{}",
                case.name,
                needle,
                rendered
            );
        }
    }
}

#[test]
fn golden_set_has_minimum_coverage() {
    let cases = golden_cases();
    assert!(cases.len() >= 10, "golden set must have at least 10 cases, got {}", cases.len());
}

#[test]
fn structured_prompts_ask_for_json() {
    for (name, template) in [("intent", prompt::INTENT_USER), ("location", prompt::LOCATION_USER)] {
        assert!(template.contains("JSON"), "user prompt '{name}' must ask for JSON");
    }
}

#[test]
fn system_prompts_establish_a_role() {
    for (name, template) in [
        ("intent", prompt::INTENT_SYSTEM),
        ("narration", prompt::NARRATION_SYSTEM),
        ("location", prompt::LOCATION_SYSTEM),
    ] {
        assert!(template.contains("You are"), "system prompt '{name}' must open with a role");
    }
}

#[test]
fn context_vars_fill_every_builtin_placeholder() {
    let context = NarrationContext {
        player: "Ada".into(),
        location: "The Lantern Inn".into(),
        location_description: "A warm common room.".into(),
        exits: vec!["north".into()],
        npcs: vec!["Mara Quill".into()],
        ..NarrationContext::default()
    };
    let mut vars = context.vars();
    vars.extend([
        ("input", "look around".to_string()),
        ("verbs", "inspect".to_string()),
        ("action", "inspect".to_string()),
        ("roll", String::new()),
        ("resolution", "- nothing".to_string()),
        ("direction", "north".to_string()),
    ]);
    let borrowed: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let engine = PromptEngine::builtin();
    for id in PromptId::all() {
        let (system, user) = engine.render(*id, &borrowed).expect("render");
        for text in [&system, &user] {
            let leftover = text.replace("{{", "").replace("}}", "");
            assert!(
                !leftover.contains("{verbs}") && !leftover.contains("{input}") && !leftover.contains("{location}"),
                "prompt '{id}' left a placeholder:\n{text}"
            );
        }
    }
}
