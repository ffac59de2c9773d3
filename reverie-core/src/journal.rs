//! Append-only narrative history of a campaign.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Turn;

/// Category of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// Narrator prose.
    Narration,
    /// What the player typed, normalized.
    PlayerAction,
    /// Something an NPC said.
    NpcDialogue,
    /// A fight began.
    CombatStart,
    /// A fight ended (with its folded combat log).
    CombatEnd,
    /// A quest was accepted.
    QuestStart,
    /// A quest was completed.
    QuestComplete,
    /// A quest failed or was abandoned.
    QuestFail,
    /// The player moved.
    LocationChange,
    /// An item was gained.
    ItemAcquired,
    /// An item was used.
    ItemUsed,
    /// The character leveled up.
    LevelUp,
    /// A secret was revealed.
    Discovery,
    /// An NPC died.
    NpcDeath,
    /// A promise was made, kept, withdrawn or broken.
    Promise,
}

impl fmt::Display for JournalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Narration => "narration",
            Self::PlayerAction => "player_action",
            Self::NpcDialogue => "npc_dialogue",
            Self::CombatStart => "combat_start",
            Self::CombatEnd => "combat_end",
            Self::QuestStart => "quest_start",
            Self::QuestComplete => "quest_complete",
            Self::QuestFail => "quest_fail",
            Self::LocationChange => "location_change",
            Self::ItemAcquired => "item_acquired",
            Self::ItemUsed => "item_used",
            Self::LevelUp => "level_up",
            Self::Discovery => "discovery",
            Self::NpcDeath => "npc_death",
            Self::Promise => "promise",
        };
        f.write_str(label)
    }
}

/// One line of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Turn it happened.
    pub turn: Turn,
    /// Category.
    pub kind: JournalKind,
    /// Text.
    pub text: String,
}

/// The campaign journal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Append an entry.
    pub fn record(&mut self, turn: Turn, kind: JournalKind, text: impl Into<String>) {
        self.entries.push(JournalEntry {
            turn,
            kind,
            text: text.into(),
        });
    }

    /// The last `n` entries, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[JournalEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Every entry.
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_tail_in_order() {
        let mut journal = Journal::default();
        for turn in 0..5 {
            journal.record(turn, JournalKind::Narration, format!("line {turn}"));
        }
        let tail: Vec<&str> = journal.recent(2).iter().map(|e| e.text.as_str()).collect();
        assert_eq!(tail, ["line 3", "line 4"]);
        assert_eq!(journal.recent(99).len(), 5);
    }
}
