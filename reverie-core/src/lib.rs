//! # Reverie Core Library
//!
//! Deterministic game state for a single-player, turn-based narrative RPG.
//! Everything here is synchronous and free of I/O except the campaign
//! store; the language model lives in `reverie-llm` and the turn pipeline
//! in `reverie-engine`.
//!
//! ```text
//!                         ┌──────────────┐
//!                         │   SaveGame   │  aggregate root, one per campaign
//!                         └──────┬───────┘
//!        ┌──────────┬───────────┼────────────┬───────────┬──────────┐
//!   Character   Inventory   WorldGraph    Npc table   QuestBook   Combat
//!        └──────────┴─────── DiceStream (seeded, resumable) ─────────┘
//!                                │
//!                 snapshot ── CampaignStore (SQLite / memory) ── SessionLock
//! ```
//!
//! ## Guarantees
//!
//! - Every mechanical outcome draws from the campaign's seeded
//!   [`DiceStream`]; replaying a save replays its rolls.
//! - Every mutation goes through [`SaveGame`] methods that either succeed
//!   or return an error; callers run turns against a clone and swap it in
//!   only after the store accepts it.
//! - [`SaveGame::validate`] checks the whole data model and is run on every
//!   export and import.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod character;
pub mod combat;
pub mod config;
pub mod dice;
pub mod error;
pub mod inventory;
pub mod journal;
pub mod lock;
pub mod npc;
pub mod quest;
pub mod savegame;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod world;

pub use character::{Character, CharacterSheet, PlayerClass};
pub use config::ReverieConfig;
pub use dice::{DiceStream, DifficultyPreset, Outcome, Roll};
pub use error::{Result, ReverieError};
pub use savegame::{NewGameOptions, SaveGame};
pub use store::{CampaignStore, MemoryStore, SqliteStore};
pub use types::*;
