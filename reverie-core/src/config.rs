//! Configuration for Reverie.
//!
//! Maps directly to `reverie.toml`.  Every field has a serde default so a
//! partial file (or none at all) loads; environment variables override the
//! file for the settings a player is most likely to change per machine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::dice::DifficultyPreset;
use crate::error::{Result, ReverieError};
use crate::npc::DEFAULT_MEMORY_CAP;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReverieConfig {
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Narration provider.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Rules tuning.
    #[serde(default)]
    pub gameplay: GameplayConfig,
    /// NPC memory.
    #[serde(default)]
    pub npc: NpcConfig,
    /// Save storage.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Spoken narration.
    #[serde(default)]
    pub audio: AudioConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ReverieError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply `REVERIE_*` environment overrides from the process environment.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` for an unparsable numeric value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; `apply_env_overrides` passes the
    /// process environment.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` for an unparsable numeric value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(provider) = lookup("REVERIE_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(model) = lookup("REVERIE_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = lookup("REVERIE_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(key) = lookup("REVERIE_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(timeout) = lookup("REVERIE_LLM_TIMEOUT") {
            self.llm.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|e| ReverieError::Config(format!("REVERIE_LLM_TIMEOUT: {e}")))?;
        }
        if let Some(dir) = lookup("REVERIE_DATA_DIR") {
            self.persistence.data_dir = PathBuf::from(dir);
        }
        if let Some(audio) = lookup("REVERIE_AUDIO") {
            self.audio.enabled = matches!(audio.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes");
        }
        Ok(())
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` naming the bad field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.llm.intent_confidence_threshold) {
            return Err(ReverieError::Config(
                "llm.intent_confidence_threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.llm.timeout_ms == 0 {
            return Err(ReverieError::Config("llm.timeout_ms must be positive".into()));
        }
        if self.npc.memory_cap == 0 {
            return Err(ReverieError::Config("npc.memory_cap must be positive".into()));
        }
        if self.llm.provider == LlmProviderKind::OpenAi && self.llm.api_key.is_none() {
            return Err(ReverieError::Config("llm.api_key is required for the openai provider".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.  `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Which narration backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    /// Ollama running locally.
    #[default]
    Ollama,
    /// An OpenAI-compatible chat completions endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    /// No provider; only the rule table and fallback narration work.
    None,
}

impl std::str::FromStr for LlmProviderKind {
    type Err = ReverieError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            "none" | "off" => Ok(Self::None),
            other => Err(ReverieError::Config(format!("unknown llm provider '{other}'"))),
        }
    }
}

/// Narration provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend.
    #[serde(default)]
    pub provider: LlmProviderKind,
    /// Model name passed to the backend.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the backend.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token for OpenAI-compatible endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-attempt timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Sampling temperature for narration.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Token cap per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Intent extractions below this confidence are treated as ambiguous.
    #[serde(default = "default_confidence")]
    pub intent_confidence_threshold: f32,
    /// Directory of prompt template overrides.
    #[serde(default)]
    pub prompt_dir: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Ollama,
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            intent_confidence_threshold: default_confidence(),
            prompt_dir: None,
        }
    }
}

/// Rules tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameplayConfig {
    /// `easy`, `normal` or `hard`.
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// Show the full roll breakdown in narration.
    #[serde(default = "default_true")]
    pub verbose_rolls: bool,
    /// Echo a confirmation for the `save` command.
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Inventory slot capacity for new campaigns.
    #[serde(default = "default_inventory_capacity")]
    pub inventory_capacity: usize,
}

impl GameplayConfig {
    /// Parsed difficulty preset.
    #[must_use]
    pub fn preset(&self) -> DifficultyPreset {
        DifficultyPreset::from_name(&self.difficulty)
    }
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            verbose_rolls: true,
            auto_save: true,
            inventory_capacity: default_inventory_capacity(),
        }
    }
}

/// NPC memory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcConfig {
    /// Retained memory entries per NPC before folding into the ledger.
    #[serde(default = "default_memory_cap")]
    pub memory_cap: usize,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            memory_cap: DEFAULT_MEMORY_CAP,
        }
    }
}

/// Save storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding `campaigns.db` and its backups.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Enable SQLite WAL journaling.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// Rotating backups kept beside the database.
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,
}

impl PersistenceConfig {
    /// Path of the campaign database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("campaigns.db")
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout(),
            backup_count: default_backup_count(),
        }
    }
}

/// Spoken narration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Speak narration aloud.
    #[serde(default)]
    pub enabled: bool,
    /// External speech program.
    #[serde(default = "default_speech_command")]
    pub command: String,
    /// Voice passed as `-v <voice>` when set.
    #[serde(default)]
    pub voice: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_speech_command(),
            voice: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_model() -> String { "llama3.1:8b".to_string() }
fn default_endpoint() -> String { "http://localhost:11434".to_string() }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_max_retries() -> u32 { 2 }
fn default_backoff_ms() -> u64 { 250 }
fn default_temperature() -> f32 { 0.8 }
fn default_max_tokens() -> u32 { 400 }
fn default_confidence() -> f32 { 0.6 }
fn default_difficulty() -> String { "normal".to_string() }
fn default_inventory_capacity() -> usize { crate::inventory::DEFAULT_CAPACITY }
fn default_memory_cap() -> usize { DEFAULT_MEMORY_CAP }
fn default_data_dir() -> PathBuf { PathBuf::from(".reverie") }
fn default_busy_timeout() -> u64 { 5000 }
fn default_backup_count() -> u32 { 3 }
fn default_speech_command() -> String { "espeak".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ReverieConfig::from_toml("").expect("parse");
        assert_eq!(config, ReverieConfig::default());
        assert_eq!(config.llm.timeout_ms, 30_000);
        assert_eq!(config.npc.memory_cap, DEFAULT_MEMORY_CAP);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ReverieConfig::from_toml(
            r#"
            [llm]
            provider = "openai"
            api_key = "sk-test"
            max_retries = 5

            [gameplay]
            difficulty = "hard"
            "#,
        )
        .expect("parse");
        assert_eq!(config.llm.provider, LlmProviderKind::OpenAi);
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.llm.backoff_ms, 250);
        assert_eq!(config.gameplay.preset(), DifficultyPreset::Hard);
    }

    #[test]
    fn env_beats_file() {
        let mut config = ReverieConfig::from_toml("[llm]\nmodel = \"from-file\"").expect("parse");
        let env: HashMap<&str, &str> = [
            ("REVERIE_LLM_MODEL", "from-env"),
            ("REVERIE_LLM_PROVIDER", "none"),
            ("REVERIE_LLM_TIMEOUT", "1500"),
            ("REVERIE_DATA_DIR", "/tmp/reverie"),
            ("REVERIE_AUDIO", "on"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|k| env.get(k).map(ToString::to_string))
            .expect("overrides");
        assert_eq!(config.llm.model, "from-env");
        assert_eq!(config.llm.provider, LlmProviderKind::None);
        assert_eq!(config.llm.timeout_ms, 1500);
        assert_eq!(config.persistence.data_dir, PathBuf::from("/tmp/reverie"));
        assert!(config.audio.enabled);
    }

    #[test]
    fn bad_override_is_a_config_error() {
        let mut config = ReverieConfig::default();
        let err = config
            .apply_overrides(|k| (k == "REVERIE_LLM_TIMEOUT").then(|| "soon".to_string()))
            .expect_err("bad number");
        assert!(matches!(err, ReverieError::Config(_)));
    }

    #[test]
    fn openai_without_key_is_invalid() {
        let mut config = ReverieConfig::default();
        config.llm.provider = LlmProviderKind::OpenAi;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(matches!(
            ReverieConfig::from_toml("[llm\nmodel="),
            Err(ReverieError::Config(_))
        ));
    }
}
