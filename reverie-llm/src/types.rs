//! Core types for gateway requests and responses.

use serde::{Deserialize, Serialize};

use reverie_core::combat::EnemyTemplate;
use reverie_core::npc::NpcSeed;
use reverie_core::types::Direction;
use reverie_core::world::{LocationKind, LocationSeed, SecretSeed, SecretTrigger};

use crate::error::{LlmError, Result};

/// What a request is for; selects token budget and temperature defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    /// Map free text to a verb and target.
    Intent,
    /// Prose for a resolved turn.
    Narration,
    /// Draft a new location.
    Location,
}

/// A request to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// What this request is for.
    pub purpose: RequestPurpose,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic).
    pub temperature: f32,
    /// JSON schema the response must follow, for structured requests.
    pub schema: Option<serde_json::Value>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A free-prose request.
    #[must_use]
    pub fn prose(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            purpose: RequestPurpose::Narration,
            max_tokens: 400,
            temperature: 0.8,
            schema: None,
            timeout_ms: 30_000,
        }
    }

    /// A JSON request constrained by `schema`.
    #[must_use]
    pub fn structured(
        purpose: RequestPurpose,
        system: impl Into<String>,
        user: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            purpose,
            max_tokens: 300,
            temperature: 0.2,
            schema: Some(schema),
            timeout_ms: 30_000,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A response from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model answered.
    pub model: String,
}

// ---------------------------------------------------------------------------
// Turn context
// ---------------------------------------------------------------------------

/// Everything the narrator may know about the current moment, flattened to
/// text.  Built from the authoritative save by the engine; the gateway never
/// sees anything that is not in here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NarrationContext {
    /// "Ada, level 2 Code Warrior (Bloodied)".
    pub player: String,
    /// Current location name.
    pub location: String,
    /// Current location description.
    pub location_description: String,
    /// Exit directions.
    pub exits: Vec<String>,
    /// NPCs present: "Mara Quill (Innkeeper, Neutral)".
    pub npcs: Vec<String>,
    /// Enemies still standing.
    pub enemies: Vec<String>,
    /// Inventory item names.
    pub items: Vec<String>,
    /// Active quest titles.
    pub quests: Vec<String>,
    /// Recent journal lines, oldest first.
    pub recent: Vec<String>,
}

impl NarrationContext {
    fn list(items: &[String]) -> String {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    }

    /// Template variables for this context.
    #[must_use]
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("player", self.player.clone()),
            ("location", self.location.clone()),
            ("location_description", self.location_description.clone()),
            ("exits", Self::list(&self.exits)),
            ("npcs", Self::list(&self.npcs)),
            ("enemies", Self::list(&self.enemies)),
            ("items", Self::list(&self.items)),
            ("quests", Self::list(&self.quests)),
            (
                "recent",
                if self.recent.is_empty() {
                    "(nothing yet)".to_string()
                } else {
                    self.recent.iter().map(|l| format!("- {l}")).collect::<Vec<_>>().join("\n")
                },
            ),
        ]
    }
}

/// Free text to be mapped onto one of `verbs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntentRequest {
    /// What the player typed.
    pub input: String,
    /// The moment.
    pub context: NarrationContext,
    /// Verbs the engine accepts right now.
    pub verbs: Vec<String>,
}

/// A resolved turn to be told as prose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NarrationRequest {
    /// The moment.
    pub context: NarrationContext,
    /// What the player did, normalized ("attack Goblin").
    pub action: String,
    /// Mechanical results, one fact per line.
    pub resolution: Vec<String>,
    /// Roll breakdown, if a roll happened.
    pub roll: Option<String>,
}

/// Where a new location is being drafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationRequest {
    /// The moment, at the location being left.
    pub context: NarrationContext,
    /// Direction of travel.
    pub direction: Direction,
}

// ---------------------------------------------------------------------------
// Structured responses
// ---------------------------------------------------------------------------

/// Intent extracted from free text.  Verbs and targets are suggestions only
/// and are re-validated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentExtraction {
    /// One of the verbs offered in the prompt.
    pub verb: String,
    /// Target as named in the context, if any.
    #[serde(default)]
    pub target: Option<String>,
    /// 0.0 ..= 1.0.
    pub confidence: f32,
    /// Stat the action leans on, for improvised actions.
    #[serde(default)]
    pub stat: Option<String>,
}

impl IntentExtraction {
    /// Reject structurally invalid extractions.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Intent`].
    pub fn validate(&self) -> Result<()> {
        if self.verb.trim().is_empty() {
            return Err(LlmError::Intent("verb is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) || self.confidence.is_nan() {
            return Err(LlmError::Intent(format!(
                "confidence {} outside 0.0..=1.0",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A drafted NPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcDraft {
    /// Name.
    pub name: String,
    /// Race.
    #[serde(default)]
    pub race: String,
    /// Occupation.
    #[serde(default)]
    pub occupation: String,
    /// Up to two traits.
    #[serde(default)]
    pub traits: Vec<String>,
    /// Motivation.
    #[serde(default)]
    pub motivation: String,
    /// Secret.
    #[serde(default)]
    pub secret: Option<String>,
}

impl From<NpcDraft> for NpcSeed {
    fn from(draft: NpcDraft) -> Self {
        NpcSeed {
            name: draft.name.trim().to_string(),
            race: draft.race,
            occupation: draft.occupation,
            traits: draft.traits,
            motivation: draft.motivation,
            secret: draft.secret.filter(|s| !s.trim().is_empty()),
            disposition: 0,
        }
    }
}

/// A drafted enemy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatDraft {
    /// Name.
    pub name: String,
    /// Attack bonus, clamped to -2..=3.
    #[serde(default)]
    pub attack_bonus: i32,
}

/// A drafted location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDraft {
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// settlement, wilderness, dungeon or region.
    #[serde(default)]
    pub kind: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Onward exit directions.
    #[serde(default)]
    pub exits: Vec<String>,
    /// Secrets revealed by inspecting.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// NPCs who live here.
    #[serde(default)]
    pub npcs: Vec<NpcDraft>,
    /// Enemies waiting here.
    #[serde(default)]
    pub threats: Vec<ThreatDraft>,
}

/// Most NPCs a drafted location may introduce.
pub const MAX_DRAFT_NPCS: usize = 2;

impl LocationDraft {
    /// Convert to core seeds.  Unknown directions are dropped; the seed is
    /// sanitized again when materialized.
    #[must_use]
    pub fn into_seeds(self) -> (LocationSeed, Vec<NpcSeed>) {
        let kind = LocationKind::from_name(&self.kind);
        let seed = LocationSeed {
            name: self.name,
            description: self.description,
            kind,
            tags: self.tags,
            exits: self.exits.iter().filter_map(|d| Direction::parse(d)).collect(),
            secrets: self
                .secrets
                .into_iter()
                .map(|text| SecretSeed {
                    text,
                    trigger: SecretTrigger::OnInspect,
                })
                .collect(),
            threats: self
                .threats
                .into_iter()
                .filter(|t| !t.name.trim().is_empty())
                .map(|t| EnemyTemplate::new(t.name.trim(), t.attack_bonus.clamp(-2, 3)))
                .collect(),
        };
        let npcs = self
            .npcs
            .into_iter()
            .filter(|n| !n.name.trim().is_empty())
            .take(MAX_DRAFT_NPCS)
            .map(NpcSeed::from)
            .collect();
        (seed, npcs)
    }
}
