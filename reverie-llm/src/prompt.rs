//! Prompt templates for narration gateway calls.
//!
//! The built-in templates are compiled in; a directory of TOML files with
//! the same ids can replace them at startup (`llm.prompt_dir`).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{LlmError, Result};

/// Intent extraction, system side.
pub const INTENT_SYSTEM: &str = r"You are the command interpreter for a text adventure.
Map the player's words to exactly one verb from this list:
{verbs}

RULES:
- Only name a target that appears in the scene below. Never invent one.
- If the words fit no verb, use verb improvise.
- Lower your confidence when the request is vague.
- Your response must be valid JSON.";

/// Intent extraction, user side.
pub const INTENT_USER: &str = r#"Scene: {location}
People here: {npcs}
Enemies: {enemies}
Exits: {exits}
Carried: {items}

Player typed: "{input}"

Return JSON:
{"verb": "one verb", "target": "name from the scene or null", "confidence": <float 0.0-1.0>, "stat": "might|wit|spirit or null"}"#;

/// Turn narration, system side.
pub const NARRATION_SYSTEM: &str = r"You are the narrator of a fantasy adventure told in second person.
Describe what just happened in two to four vivid sentences.

RULES:
- The resolution facts are final. Never change who won, what was found or who was hurt.
- Mention only characters listed as present. Never bring back the dead.
- Do not offer choices or ask questions.
- Do not mention dice, numbers or game rules.";

/// Turn narration, user side.
pub const NARRATION_USER: &str = r"Hero: {player}
Location: {location}. {location_description}
Present: {npcs}
Enemies: {enemies}

Recently:
{recent}

The player chose: {action}
{roll}
What happened:
{resolution}

Narrate it.";

/// Location drafting, system side.
pub const LOCATION_SYSTEM: &str = r"You are a world builder for a fantasy adventure.
Invent one new place that fits next to the current one.

RULES:
- Give it a short proper name and a two sentence description.
- kind is one of settlement, wilderness, dungeon, region.
- At most two people live there. Threats are optional.
- Exits use compass words, up, down, in or out.
- Your response must be valid JSON.";

/// Location drafting, user side.
pub const LOCATION_USER: &str = r#"The hero leaves {location} ({location_description}) heading {direction}.
Places and people already known must not be repeated: {location}, {npcs}.

Return JSON:
{"name": "...", "description": "...", "kind": "...", "tags": ["..."], "exits": ["..."], "secrets": ["..."], "npcs": [{"name": "...", "race": "...", "occupation": "...", "traits": ["..."], "motivation": "...", "secret": "... or null"}], "threats": [{"name": "...", "attack_bonus": <int -2 to 3>}]}"#;

/// Simple template interpolation: replaces `{key}` with its value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptEngine
// ---------------------------------------------------------------------------

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Free text to verb and target.
    IntentExtraction,
    /// Prose for a resolved turn.
    Narration,
    /// A new location next to the current one.
    LocationDraft,
}

impl PromptId {
    /// TOML filename for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::IntentExtraction => "intent_extraction.toml",
            Self::Narration => "narration.toml",
            Self::LocationDraft => "location_draft.toml",
        }
    }

    /// All prompt ids.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[Self::IntentExtraction, Self::Narration, Self::LocationDraft]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IntentExtraction => "intent_extraction",
            Self::Narration => "narration",
            Self::LocationDraft => "location_draft",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "intent_extraction" => Ok(Self::IntentExtraction),
            "narration" => Ok(Self::Narration),
            "location_draft" => Ok(Self::LocationDraft),
            _ => Err(LlmError::Template(format!("unknown prompt id: '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Version string ("builtin" for compiled-in templates).
    pub version: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompt with `{key}` placeholders.
    pub system: String,
    /// User prompt with `{key}` placeholders.
    pub user: String,
}

/// Loads prompt templates and renders them.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl PromptEngine {
    /// The compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(PromptId::IntentExtraction, PromptTemplate {
            version: "builtin".into(),
            max_tokens: 120,
            temperature: 0.1,
            system: INTENT_SYSTEM.into(),
            user: INTENT_USER.into(),
        });
        templates.insert(PromptId::Narration, PromptTemplate {
            version: "builtin".into(),
            max_tokens: 400,
            temperature: 0.8,
            system: NARRATION_SYSTEM.into(),
            user: NARRATION_USER.into(),
        });
        templates.insert(PromptId::LocationDraft, PromptTemplate {
            version: "builtin".into(),
            max_tokens: 500,
            temperature: 0.9,
            system: LOCATION_SYSTEM.into(),
            user: LOCATION_USER.into(),
        });
        Self { templates }
    }

    /// Built-in templates, overridden by any TOML files found in `dir`.
    ///
    /// Files whose names match no [`PromptId`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Template`] if the directory is missing or a
    /// matching file cannot be read or parsed.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LlmError::Template(format!("prompt directory not found: {}", dir.display())));
        }

        let mut engine = Self::builtin();
        for id in PromptId::all() {
            let path = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| LlmError::Template(format!("failed to read {}: {e}", path.display())))?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| LlmError::Template(format!("failed to parse {}: {e}", path.display())))?;
            let d = parsed.prompt;
            tracing::debug!(prompt = %id, version = %d.version, "loaded prompt override");
            engine.templates.insert(*id, PromptTemplate {
                version: d.version,
                max_tokens: d.max_tokens,
                temperature: d.temperature,
                system: d.system,
                user: d.user,
            });
        }
        Ok(engine)
    }

    /// A loaded template.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render `(system, user)` for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Template`] if the template is not loaded.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String)> {
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::Template(format!("prompt template '{id}' not loaded")))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Output schemas
// ---------------------------------------------------------------------------

/// JSON schema for intent extraction output.
#[must_use]
pub fn intent_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "verb": { "type": "string" },
            "target": { "type": ["string", "null"] },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "stat": { "type": ["string", "null"] }
        },
        "required": ["verb", "confidence"]
    })
}

/// JSON schema for location drafts.
#[must_use]
pub fn location_schema() -> serde_json::Value {
    let strings = serde_json::json!({ "type": "array", "items": { "type": "string" } });
    serde_json::json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "description": { "type": "string" },
            "kind": { "type": "string", "enum": ["settlement", "wilderness", "dungeon", "region"] },
            "tags": strings,
            "exits": strings,
            "secrets": strings,
            "npcs": {
                "type": "array",
                "maxItems": 2,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "race": { "type": "string" },
                        "occupation": { "type": "string" },
                        "traits": strings,
                        "motivation": { "type": "string" },
                        "secret": { "type": ["string", "null"] }
                    },
                    "required": ["name"]
                }
            },
            "threats": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "attack_bonus": { "type": "integer" }
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["name", "description"]
    })
}
