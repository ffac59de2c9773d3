//! LLM Client — one interface over Ollama and OpenAI-compatible backends.
//!
//! Each attempt gets the request's own timeout.  Transient failures
//! (connection errors, timeouts, HTTP 5xx/429) are retried with exponential
//! backoff; anything else fails immediately.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use reverie_core::config::{LlmConfig, LlmProviderKind};

use crate::error::{LlmError, Result};
use crate::types::{LlmRequest, LlmResponse};

/// Provider backend for inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// Any OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend; every call fails and the engine falls back to rules.
    None,
}

/// Routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
    backoff_ms: u64,
}

impl LlmClient {
    /// Create a client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
            backoff_ms,
        }
    }

    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when an OpenAI-compatible provider
    /// has no API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config.endpoint.trim_end_matches('/').to_string();
        let provider = match config.provider {
            LlmProviderKind::None => LlmProvider::None,
            LlmProviderKind::Ollama => LlmProvider::Ollama { base_url },
            LlmProviderKind::OpenAi => {
                let api_key = config
                    .api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| LlmError::Config("openai provider needs an api_key".into()))?;
                LlmProvider::OpenAiCompatible { base_url, api_key }
            }
        };
        Ok(Self::new(provider, config.model.clone(), config.max_retries, config.backoff_ms))
    }

    /// A client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0, 0)
    }

    /// The configured provider.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Whether a backend is configured.  Makes no network call.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a response, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Offline`] without a backend,
    /// [`LlmError::Exhausted`] once every attempt failed
    /// transiently, or the first non-transient error.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if !self.is_available() {
            return Err(LlmError::Offline("no LLM provider configured".into()));
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_ms.saturating_mul(1 << (attempt - 1).min(6));
                debug!(attempt = attempt + 1, delay_ms = delay, "retrying LLM call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    warn!(attempt = attempt + 1, error = %e, "LLM call failed");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::Exhausted {
            attempts: self.max_retries + 1,
            last: last_error,
        })
    }

    async fn attempt(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let start = Instant::now();
        let (builder, openai) = match &self.provider {
            LlmProvider::None => return Err(LlmError::Offline("no LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => (
                self.http.post(format!("{base_url}/api/generate")).json(&self.ollama_body(request)),
                false,
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                self.http
                    .post(format!("{base_url}/v1/chat/completions"))
                    .bearer_auth(api_key)
                    .json(&self.openai_body(request)),
                true,
            ),
        };

        let resp = builder
            .timeout(Duration::from_millis(request.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(request.timeout_ms)
                } else {
                    LlmError::from(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                LlmError::Transport(message)
            } else {
                LlmError::Config(message)
            });
        }

        let value: serde_json::Value = resp.json().await.map_err(|e| LlmError::MalformedReply(e.to_string()))?;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (text, tokens) = if openai {
            (
                value["choices"][0]["message"]["content"].as_str(),
                value["usage"]["completion_tokens"].as_u64(),
            )
        } else {
            (value["response"].as_str(), value["eval_count"].as_u64())
        };
        let text = text
            .ok_or_else(|| LlmError::MalformedReply("response has no text field".into()))?
            .to_string();

        debug!(latency_ms, tokens = tokens.unwrap_or(0), "LLM call succeeded");
        Ok(LlmResponse {
            text,
            tokens_generated: tokens.and_then(|t| u32::try_from(t).ok()).unwrap_or(0),
            latency_ms,
            model: self.model.clone(),
        })
    }

    fn ollama_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.user,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });
        if let Some(schema) = &request.schema {
            body["format"] = schema.clone();
        }
        body
    }

    fn openai_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.schema.is_some() {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

/// Parse a response as JSON, tolerating prose or code fences around the
/// outermost object.
///
/// # Errors
///
/// Returns [`LlmError::MalformedReply`] if no object parses as `T`.
pub fn parse_structured<T: serde::de::DeserializeOwned>(response: &LlmResponse) -> Result<T> {
    let text = response.text.trim();
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };
    serde_json::from_str(candidate).map_err(|e| {
        let raw: String = response.text.chars().take(120).collect();
        LlmError::MalformedReply(format!("{e} (raw: '{raw}')"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntentExtraction;

    fn response(text: &str) -> LlmResponse {
        LlmResponse {
            text: text.into(),
            tokens_generated: 0,
            latency_ms: 0,
            model: "test".into(),
        }
    }

    #[test]
    fn parses_fenced_json() {
        let r = response("Sure!\n```json\n{\"verb\": \"talk\", \"target\": \"Mara\", \"confidence\": 0.8}\n```");
        let intent: IntentExtraction = parse_structured(&r).expect("parse");
        assert_eq!(intent.verb, "talk");
        assert_eq!(intent.target.as_deref(), Some("Mara"));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_structured::<IntentExtraction>(&response("I cannot do that.")),
            Err(LlmError::MalformedReply(_))
        ));
    }

    #[tokio::test]
    async fn no_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .generate(&LlmRequest::prose("sys", "user"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Offline(_)));
    }

    #[test]
    fn openai_requires_key() {
        let config = LlmConfig {
            provider: LlmProviderKind::OpenAi,
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(LlmClient::from_config(&config), Err(LlmError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_ollama_exhausts_retries() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:9/".into(),
            max_retries: 1,
            backoff_ms: 1,
            ..LlmConfig::default()
        };
        let client = LlmClient::from_config(&config).expect("client");
        assert_eq!(
            client.provider(),
            &LlmProvider::Ollama {
                base_url: "http://127.0.0.1:9".into()
            }
        );
        let err = client
            .generate(&LlmRequest::prose("sys", "user").with_timeout(500))
            .await
            .expect_err("nothing listens on port 9");
        assert!(matches!(err, LlmError::Exhausted { attempts: 2, .. }));
    }
}
