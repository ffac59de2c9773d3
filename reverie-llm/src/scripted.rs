//! A gateway that replays queued responses.
//!
//! Used by tests to simulate every gateway behaviour deterministically
//! (low confidence, hallucinated targets, timeouts) and by offline play
//! with echo narration, where the resolution lines themselves become the
//! prose.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{LlmError, Result};
use crate::gateway::NarrationGateway;
use crate::types::{IntentExtraction, IntentRequest, LocationDraft, LocationRequest, NarrationRequest};

/// Replays queued results in FIFO order.
#[derive(Default)]
pub struct ScriptedGateway {
    intents: Mutex<VecDeque<Result<IntentExtraction>>>,
    narrations: Mutex<VecDeque<Result<String>>>,
    locations: Mutex<VecDeque<Result<LocationDraft>>>,
    echo_narration: bool,
    intent_calls: AtomicUsize,
    narrate_calls: AtomicUsize,
    location_calls: AtomicUsize,
}

fn exhausted<T>() -> Result<T> {
    Err(LlmError::Offline("script exhausted".into()))
}

impl ScriptedGateway {
    /// Empty script: every call is unavailable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When the narration queue is empty, narrate by joining the
    /// resolution lines instead of failing.
    #[must_use]
    pub fn with_echo_narration(mut self) -> Self {
        self.echo_narration = true;
        self
    }

    /// Queue an intent result.
    pub fn push_intent(&self, result: Result<IntentExtraction>) -> &Self {
        self.intents.lock().push_back(result);
        self
    }

    /// Queue a successful intent.
    pub fn push_verb(&self, verb: &str, target: Option<&str>, confidence: f32) -> &Self {
        self.push_intent(Ok(IntentExtraction {
            verb: verb.to_string(),
            target: target.map(str::to_string),
            confidence,
            stat: None,
        }))
    }

    /// Queue a narration result.
    pub fn push_narration(&self, result: Result<String>) -> &Self {
        self.narrations.lock().push_back(result);
        self
    }

    /// Queue a location draft result.
    pub fn push_location(&self, result: Result<LocationDraft>) -> &Self {
        self.locations.lock().push_back(result);
        self
    }

    /// How many times `extract_intent` was called.
    #[must_use]
    pub fn intent_calls(&self) -> usize {
        self.intent_calls.load(Ordering::Relaxed)
    }

    /// How many times `narrate` was called.
    #[must_use]
    pub fn narrate_calls(&self) -> usize {
        self.narrate_calls.load(Ordering::Relaxed)
    }

    /// How many times `draft_location` was called.
    #[must_use]
    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::Relaxed)
    }
}

impl NarrationGateway for ScriptedGateway {
    async fn extract_intent(&self, _request: &IntentRequest) -> Result<IntentExtraction> {
        self.intent_calls.fetch_add(1, Ordering::Relaxed);
        self.intents.lock().pop_front().unwrap_or_else(exhausted)
    }

    async fn narrate(&self, request: &NarrationRequest) -> Result<String> {
        self.narrate_calls.fetch_add(1, Ordering::Relaxed);
        let queued = self.narrations.lock().pop_front();
        match queued {
            Some(result) => result,
            None if self.echo_narration => Ok(request.resolution.join(" ")),
            None => exhausted(),
        }
    }

    async fn draft_location(&self, _request: &LocationRequest) -> Result<LocationDraft> {
        self.location_calls.fetch_add(1, Ordering::Relaxed);
        self.locations.lock().pop_front().unwrap_or_else(exhausted)
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_runs_dry() {
        let gateway = ScriptedGateway::new();
        gateway
            .push_verb("talk", Some("Mara"), 0.9)
            .push_intent(Err(LlmError::Timeout(30_000)));

        let request = IntentRequest::default();
        let first = gateway.extract_intent(&request).await.expect("first");
        assert_eq!(first.verb, "talk");
        assert!(matches!(gateway.extract_intent(&request).await, Err(LlmError::Timeout(_))));
        assert!(matches!(gateway.extract_intent(&request).await, Err(LlmError::Offline(_))));
        assert_eq!(gateway.intent_calls(), 3);
    }

    #[tokio::test]
    async fn echo_narration_joins_resolution() {
        let gateway = ScriptedGateway::new().with_echo_narration();
        gateway.push_narration(Ok("Scripted.".into()));
        let request = NarrationRequest {
            resolution: vec!["You search.".into(), "You find a key.".into()],
            ..NarrationRequest::default()
        };
        assert_eq!(gateway.narrate(&request).await.expect("queued"), "Scripted.");
        assert_eq!(gateway.narrate(&request).await.expect("echo"), "You search. You find a key.");
        assert_eq!(gateway.narrate_calls(), 2);
    }
}
