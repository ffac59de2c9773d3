//! The narration gateway contract and its language-model implementation.
//!
//! The engine is generic over [`NarrationGateway`], so tests and offline
//! play swap in [`ScriptedGateway`](crate::scripted::ScriptedGateway)
//! without touching the turn pipeline.  Every method either returns a
//! complete, schema-valid result or an error; there are no partial results.

use std::future::Future;

use tracing::{debug, warn};

use reverie_core::config::LlmConfig;

use crate::client::{LlmClient, parse_structured};
use crate::error::{LlmError, Result};
use crate::prompt::{self, PromptEngine, PromptId};
use crate::types::{
    IntentExtraction, IntentRequest, LlmRequest, LocationDraft, LocationRequest, NarrationRequest, RequestPurpose,
};

/// Structured intent extraction and prose generation.
pub trait NarrationGateway: Send + Sync {
    /// Map free text onto one of the request's verbs.
    fn extract_intent(&self, request: &IntentRequest) -> impl Future<Output = Result<IntentExtraction>> + Send;

    /// Prose for a resolved turn.
    fn narrate(&self, request: &NarrationRequest) -> impl Future<Output = Result<String>> + Send;

    /// A new location next to the current one.
    fn draft_location(&self, request: &LocationRequest) -> impl Future<Output = Result<LocationDraft>> + Send;

    /// Whether calls can succeed at all.  `false` means every call will
    /// return [`LlmError::Offline`].
    fn is_available(&self) -> bool;
}

/// Longest rendered prompt (system plus user text) sent to a narrator.
pub const PROMPT_CHAR_BUDGET: usize = 12_000;

/// A gateway backed by an [`LlmClient`].
pub struct LlmGateway {
    client: LlmClient,
    prompts: PromptEngine,
    timeout_ms: u64,
    temperature: f32,
    max_tokens: u32,
}

impl LlmGateway {
    /// Build from an explicit client and prompts.
    #[must_use]
    pub fn new(client: LlmClient, prompts: PromptEngine, config: &LlmConfig) -> Self {
        Self {
            client,
            prompts,
            timeout_ms: config.timeout_ms,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build from configuration, loading prompt overrides from
    /// `config.prompt_dir` when set.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] or [`LlmError::Template`].
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let prompts = match config.prompt_dir.as_deref() {
            Some(dir) => PromptEngine::from_directory(dir)?,
            None => PromptEngine::builtin(),
        };
        Ok(Self::new(LlmClient::from_config(config)?, prompts, config))
    }

    fn request(&self, id: PromptId, vars: &[(&str, &str)], schema: Option<serde_json::Value>) -> Result<LlmRequest> {
        let (system, user) = self.prompts.render(id, vars)?;
        let chars = system.chars().count() + user.chars().count();
        if chars > PROMPT_CHAR_BUDGET {
            warn!(prompt = %id, chars, budget = PROMPT_CHAR_BUDGET, "prompt over budget");
            return Err(LlmError::PromptBudget {
                prompt: id.to_string(),
                chars,
                budget: PROMPT_CHAR_BUDGET,
            });
        }
        let request = match schema {
            Some(schema) => {
                let purpose = match id {
                    PromptId::IntentExtraction => RequestPurpose::Intent,
                    PromptId::Narration => RequestPurpose::Narration,
                    PromptId::LocationDraft => RequestPurpose::Location,
                };
                let (max_tokens, temperature) = self
                    .prompts
                    .get(id)
                    .map_or((self.max_tokens, self.temperature), |t| (t.max_tokens, t.temperature));
                LlmRequest::structured(purpose, system, user, schema)
                    .with_max_tokens(max_tokens)
                    .with_temperature(temperature)
            }
            // Prose follows the configured voice, not the template default.
            None => LlmRequest::prose(system, user)
                .with_max_tokens(self.max_tokens)
                .with_temperature(self.temperature),
        };
        Ok(request.with_timeout(self.timeout_ms))
    }
}

fn borrowed<'a>(vars: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    vars.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

impl NarrationGateway for LlmGateway {
    async fn extract_intent(&self, request: &IntentRequest) -> Result<IntentExtraction> {
        let mut vars = request.context.vars();
        vars.push(("input", request.input.clone()));
        vars.push(("verbs", request.verbs.join(", ")));
        let llm = self.request(PromptId::IntentExtraction, &borrowed(&vars), Some(prompt::intent_schema()))?;

        let response = self.client.generate(&llm).await?;
        let intent: IntentExtraction = parse_structured(&response)?;
        intent.validate()?;
        // The engine decides what an unoffered verb means this turn.
        let verb = intent.verb.trim().to_ascii_lowercase();
        if !request.verbs.iter().any(|v| *v == verb) {
            debug!(verb = %verb, "narrator picked a verb outside the offered set");
        }
        debug!(verb = %verb, confidence = intent.confidence, latency_ms = response.latency_ms, "intent extracted");
        Ok(IntentExtraction { verb, ..intent })
    }

    async fn narrate(&self, request: &NarrationRequest) -> Result<String> {
        let mut vars = request.context.vars();
        vars.push(("action", request.action.clone()));
        vars.push(("roll", request.roll.clone().map(|r| format!("Roll: {r}")).unwrap_or_default()));
        vars.push((
            "resolution",
            request.resolution.iter().map(|l| format!("- {l}")).collect::<Vec<_>>().join("\n"),
        ));
        let llm = self.request(PromptId::Narration, &borrowed(&vars), None)?;

        let response = self.client.generate(&llm).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(LlmError::Narration("empty prose".into()));
        }
        Ok(text.to_string())
    }

    async fn draft_location(&self, request: &LocationRequest) -> Result<LocationDraft> {
        let mut vars = request.context.vars();
        vars.push(("direction", request.direction.to_string()));
        let llm = self.request(PromptId::LocationDraft, &borrowed(&vars), Some(prompt::location_schema()))?;

        let response = self.client.generate(&llm).await?;
        let draft: LocationDraft = parse_structured(&response)?;
        if draft.name.trim().is_empty() {
            return Err(LlmError::Location("location has no name".into()));
        }
        Ok(draft)
    }

    fn is_available(&self) -> bool {
        self.client.is_available()
    }
}
