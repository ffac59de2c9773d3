//! # reverie-llm — Narration Gateway for Reverie
//!
//! Everything the engine asks of a language model goes through the
//! [`NarrationGateway`] contract:
//!   - **Intent extraction**: free text to `{verb, target, confidence}`
//!   - **Narration**: prose for a turn that has already been resolved
//!   - **Location drafts**: a new place when the hero walks off the map
//!
//! Backends:
//!   - **Ollama** (local, default)
//!   - **OpenAI-compatible API**
//!   - **Scripted** (tests and offline play)
//!
//! # Failure model
//!
//! ```text
//! render ──over budget──▶ PromptBudget
//!    ▼
//! attempt ──timeout/5xx──▶ backoff (250ms, 500ms, ...) ──▶ attempt ... ──▶ Exhausted
//!    │
//!    └─ 2xx ──▶ parse JSON ──▶ check the reply ──▶ Ok
//!                  │               └──▶ Intent / Narration / Location
//!                  └──▶ MalformedReply
//! ```
//!
//! A gateway never returns a partial result.  The engine treats any error
//! as "narration unavailable" and keeps the authoritative state untouched.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod scripted;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::{LlmError, Result};
pub use gateway::{LlmGateway, NarrationGateway};
pub use scripted::ScriptedGateway;
pub use types::{
    IntentExtraction, IntentRequest, LlmRequest, LlmResponse, LocationDraft, LocationRequest, NarrationContext,
    NarrationRequest, NpcDraft, ThreatDraft,
};
