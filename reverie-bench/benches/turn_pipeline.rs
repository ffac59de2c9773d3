//! Reverie Benchmark Suite — per-turn hot paths
//!
//! Targets (offline, scripted narrator):
//!   dice_resolve ...................... < 1μs
//!   intent_rule_match ................. < 20μs
//!   context_bundle_build .............. < 50μs
//!   full_turn_talk .................... < 1ms
//!   snapshot_export ................... < 2ms

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use reverie_core::dice::DiceStream;
use reverie_core::snapshot;
use reverie_core::{CharacterSheet, PlayerClass, SaveGame};
use reverie_engine::{ContextBundle, IntentResolver, TurnOrchestrator};
use reverie_llm::ScriptedGateway;

fn new_game() -> SaveGame {
    let sheet = CharacterSheet {
        name: "Bench".into(),
        race: "Human".into(),
        class: PlayerClass::Wanderer,
        stats: (4, 4, 4),
        background: "Load tester".into(),
    };
    SaveGame::new("bench", &sheet, 42).expect("new game")
}

/// Benchmark: one d20 check against a difficulty.
fn bench_dice(c: &mut Criterion) {
    let mut dice = DiceStream::new(7);
    c.bench_function("dice_resolve", |b| {
        b.iter(|| black_box(dice.resolve(black_box(4), 1, 12)));
    });
}

/// Benchmark: rule-table matching against the starting inn.
fn bench_intent_rules(c: &mut Criterion) {
    let save = new_game();
    let bundle = ContextBundle::from_save(&save);
    let resolver = IntentResolver::default();
    c.bench_function("intent_rule_match", |b| {
        b.iter(|| {
            for input in ["look", "talk to mara", "go north", "inspect the cellar", "roll wit"] {
                black_box(resolver.rule(black_box(input), &bundle).expect("rule"));
            }
        });
    });
}

/// Benchmark: building the per-turn context bundle.
fn bench_context(c: &mut Criterion) {
    let save = new_game();
    c.bench_function("context_bundle_build", |b| {
        b.iter(|| black_box(ContextBundle::from_save(black_box(&save))));
    });
}

/// Benchmark: a complete uncommitted turn with echoed narration.
fn bench_full_turn(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let save = new_game();
    let orchestrator = TurnOrchestrator::new(ScriptedGateway::new().with_echo_narration(), IntentResolver::default());
    c.bench_function("full_turn_talk", |b| {
        b.iter(|| {
            let turn = runtime
                .block_on(orchestrator.run_turn(&save, black_box("talk to mara")))
                .expect("turn");
            black_box(turn);
        });
    });
}

/// Benchmark: exporting a save for commit.
fn bench_snapshot(c: &mut Criterion) {
    let save = new_game();
    c.bench_function("snapshot_export", |b| {
        b.iter(|| black_box(snapshot::export(black_box(&save)).expect("export")));
    });
}

criterion_group!(
    benches,
    bench_dice,
    bench_intent_rules,
    bench_context,
    bench_full_turn,
    bench_snapshot,
);
criterion_main!(benches);
