//! Turn-level error taxonomy.

use thiserror::Error;

use reverie_core::ReverieError;
use reverie_llm::LlmError;

/// Why a turn was not committed.
///
/// No variant ever leaves a half-applied turn behind: every turn runs on a
/// copy of the save, and an error drops that copy.
#[derive(Error, Debug)]
pub enum TurnError {
    /// The input could map to more than one action; `0` is the question to
    /// put back to the player.
    #[error("{0}")]
    AmbiguousIntent(String),

    /// Empty or garbage input.
    #[error("I didn't catch that: {0}")]
    UnparseableInput(String),

    /// The narration gateway exhausted its retries or is not configured.
    #[error("The narrator is unavailable ({0}). Nothing happened; try again.")]
    NarrationUnavailable(String),

    /// The action names something that is not here.
    #[error("There is no {kind} called '{reference}' here")]
    InvalidTargetReference {
        /// Entity kind.
        kind: &'static str,
        /// The name that failed to resolve.
        reference: String,
    },

    /// The resolved turn would break a data-model invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The store refused the commit.  The turn is held for retry.
    #[error("Could not save the turn: {0}")]
    PersistenceFailure(String),

    /// A game rule refused the action, or a session-level failure.
    #[error(transparent)]
    Core(ReverieError),
}

impl TurnError {
    /// Whether the player can simply rephrase or pick another action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::AmbiguousIntent(_) | Self::UnparseableInput(_) | Self::InvalidTargetReference { .. } => true,
            Self::Core(err) => matches!(
                err,
                ReverieError::CombatActive
                    | ReverieError::NoActiveCombat
                    | ReverieError::QuestTransition { .. }
                    | ReverieError::InventoryFull { .. }
                    | ReverieError::InsufficientGold { .. }
            ),
            Self::NarrationUnavailable(_) | Self::InvariantViolation(_) | Self::PersistenceFailure(_) => false,
        }
    }

    /// Map a gateway failure during a turn.
    #[must_use]
    pub fn from_gateway(err: &LlmError) -> Self {
        Self::NarrationUnavailable(err.to_string())
    }
}

impl From<ReverieError> for TurnError {
    fn from(err: ReverieError) -> Self {
        match err {
            ReverieError::InvalidTargetReference { kind, reference } => Self::InvalidTargetReference { kind, reference },
            ReverieError::InvariantViolation(msg) => Self::InvariantViolation(msg),
            ReverieError::SessionLocked { .. } => Self::Core(err),
            other if other.is_persistence() => Self::PersistenceFailure(other.to_string()),
            other => Self::Core(other),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, TurnError>;
