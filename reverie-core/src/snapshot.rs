//! Versioned JSON snapshot of a [`SaveGame`].
//!
//! ```json
//! { "format": "reverie-save", "version": 1, "exported_at": "...", "save": { ... } }
//! ```
//!
//! The same document is what the stores persist, so an exported file can be
//! imported into any store.  Import checks the envelope before decoding the
//! save and validates every invariant after, so a rejected document never
//! produces a `SaveGame`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ReverieError};
use crate::savegame::SaveGame;

/// Envelope format tag.
pub const SNAPSHOT_FORMAT: &str = "reverie-save";

/// Current snapshot version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Always [`SNAPSHOT_FORMAT`].
    pub format: String,
    /// Always [`SNAPSHOT_VERSION`] on export.
    pub version: u32,
    /// When the document was written.
    pub exported_at: DateTime<Utc>,
    /// The campaign.
    pub save: SaveGame,
}

#[derive(Deserialize)]
struct Envelope {
    format: Option<String>,
    version: Option<u32>,
}

/// Serialize a validated save into a snapshot document.
///
/// # Errors
///
/// Returns [`ReverieError::InvariantViolation`] for an invalid save, or a
/// serialization error.
pub fn export(save: &SaveGame) -> Result<Vec<u8>> {
    save.validate()?;
    let snapshot = Snapshot {
        format: SNAPSHOT_FORMAT.to_string(),
        version: SNAPSHOT_VERSION,
        exported_at: Utc::now(),
        save: save.clone(),
    };
    Ok(serde_json::to_vec_pretty(&snapshot)?)
}

/// Decode and validate a snapshot document.
///
/// # Errors
///
/// Returns [`ReverieError::Snapshot`] for a wrong format, unsupported
/// version or undecodable body, and [`ReverieError::InvariantViolation`]
/// when the decoded save breaks an invariant.
pub fn import(bytes: &[u8]) -> Result<SaveGame> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| ReverieError::Snapshot(format!("not a snapshot document: {e}")))?;
    match envelope.format.as_deref() {
        Some(SNAPSHOT_FORMAT) => {}
        Some(other) => return Err(ReverieError::Snapshot(format!("unknown format '{other}'"))),
        None => return Err(ReverieError::Snapshot("missing format tag".into())),
    }
    match envelope.version {
        Some(SNAPSHOT_VERSION) => {}
        Some(other) => {
            return Err(ReverieError::Snapshot(format!(
                "unsupported version {other} (expected {SNAPSHOT_VERSION})"
            )));
        }
        None => return Err(ReverieError::Snapshot("missing version".into())),
    }

    let snapshot: Snapshot = serde_json::from_slice(bytes)
        .map_err(|e| ReverieError::Snapshot(format!("malformed save: {e}")))?;
    snapshot.save.validate()?;
    tracing::debug!(
        campaign = %snapshot.save.campaign,
        turn = snapshot.save.turn,
        "snapshot imported"
    );
    Ok(snapshot.save)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterSheet, PlayerClass};

    fn save() -> SaveGame {
        let sheet = CharacterSheet {
            name: "Rin".into(),
            race: "Elf".into(),
            class: PlayerClass::StackOverflow,
            stats: (3, 6, 3),
            background: "Librarian".into(),
        };
        SaveGame::new("snap", &sheet, 9).expect("new game")
    }

    #[test]
    fn export_then_import_is_deep_equal() {
        let original = save();
        let bytes = export(&original).expect("export");
        let restored = import(&bytes).expect("import");
        assert_eq!(restored, original);
        assert_eq!(restored.dice.draws(), original.dice.draws());
    }

    #[test]
    fn wrong_format_is_rejected() {
        let mut doc: serde_json::Value =
            serde_json::from_slice(&export(&save()).expect("export")).expect("json");
        doc["format"] = "something-else".into();
        let err = import(&serde_json::to_vec(&doc).expect("bytes")).expect_err("rejected");
        assert!(matches!(err, ReverieError::Snapshot(_)));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut doc: serde_json::Value =
            serde_json::from_slice(&export(&save()).expect("export")).expect("json");
        doc["version"] = 2.into();
        assert!(matches!(
            import(&serde_json::to_vec(&doc).expect("bytes")),
            Err(ReverieError::Snapshot(_))
        ));
    }

    #[test]
    fn invariant_breaking_save_is_rejected() {
        let mut broken = save();
        let bytes = {
            broken.location = crate::types::LocationId::new();
            let snapshot = Snapshot {
                format: SNAPSHOT_FORMAT.into(),
                version: SNAPSHOT_VERSION,
                exported_at: Utc::now(),
                save: broken,
            };
            serde_json::to_vec(&snapshot).expect("bytes")
        };
        assert!(matches!(import(&bytes), Err(ReverieError::InvariantViolation(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(import(b"not json"), Err(ReverieError::Snapshot(_))));
    }
}
