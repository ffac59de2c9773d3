//! # reverie-engine — the turn pipeline
//!
//! Turns raw player input into a committed, narrated game turn:
//!
//! ```text
//!  input ──▶ IntentResolver ──▶ Action ──▶ TurnOrchestrator ──▶ ResolvedTurn
//!              │ rule table          (mechanics on a copy,          │
//!              └─ gateway ◀──────────  narration, consistency) ─────┤
//!                                                                   ▼
//!                      SpeechDispatcher ◀── TurnOutcome ◀── TransactionCoordinator ──▶ CampaignStore
//! ```
//!
//! - The committed save only ever changes through
//!   [`TransactionCoordinator::commit`]; a rejected or failed turn leaves
//!   it byte-for-byte untouched.
//! - System commands are answered by the rule table and keep working with
//!   no narration backend at all.
//! - Spoken narration runs in the background and has no authority over
//!   game state.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod commands;
pub mod context;
pub mod coordinator;
pub mod delta;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod session;
pub mod speech;
pub mod telemetry;

pub use action::{Action, IntentCategory, TargetRef, Verb};
pub use context::ContextBundle;
pub use coordinator::TransactionCoordinator;
pub use delta::StateDelta;
pub use error::{Result, TurnError};
pub use intent::IntentResolver;
pub use orchestrator::{ResolvedTurn, RollReport, TurnOrchestrator, TurnOutcome};
pub use session::GameSession;
pub use speech::{CommandSpeechSink, SpeechDispatcher, SpeechSink, TracingSpeechSink};
pub use telemetry::init_tracing;
