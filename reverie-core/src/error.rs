//! Error types for the Reverie core library.

use thiserror::Error;

/// Top-level error type for all core game-state operations.
#[derive(Error, Debug)]
pub enum ReverieError {
    /// A character sheet failed validation and no character was created.
    #[error("Invalid character: {0}")]
    InvalidCharacter(String),

    /// A proposed mutation would break a data-model invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// An operation named an entity that does not exist in the save.
    #[error("Unknown {kind}: {reference}")]
    InvalidTargetReference {
        /// Entity kind (location, npc, item, ...).
        kind: &'static str,
        /// The reference that failed to resolve.
        reference: String,
    },

    /// A combat encounter is already active.
    #[error("A combat encounter is already active")]
    CombatActive,

    /// A combat operation was attempted with no active encounter.
    #[error("No combat encounter is active")]
    NoActiveCombat,

    /// A quest was asked to make a transition its state does not allow.
    #[error("Quest '{quest}' cannot {transition} while {status}")]
    QuestTransition {
        /// Quest title.
        quest: String,
        /// Requested transition.
        transition: &'static str,
        /// Current status.
        status: String,
    },

    /// Inventory slot capacity would be exceeded.
    #[error("Inventory full (capacity: {capacity})")]
    InventoryFull {
        /// Declared slot capacity.
        capacity: usize,
    },

    /// Not enough gold for a purchase or payment.
    #[error("Insufficient gold: need {needed}, have {available}")]
    InsufficientGold {
        /// Gold required.
        needed: u32,
        /// Gold on hand.
        available: u32,
    },

    /// A campaign with the given name does not exist in the store.
    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    /// Another session holds the lock on this campaign.
    #[error("Campaign '{campaign}' is locked by session {owner}")]
    SessionLocked {
        /// Campaign name.
        campaign: String,
        /// Lock owner tag.
        owner: String,
    },

    /// A snapshot document was rejected on import.
    #[error("Snapshot rejected: {0}")]
    Snapshot(String),

    /// The store reported a failure that is not a SQLite error.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReverieError {
    /// Shorthand for an [`ReverieError::InvalidTargetReference`].
    #[must_use]
    pub fn unknown(kind: &'static str, reference: impl ToString) -> Self {
        Self::InvalidTargetReference {
            kind,
            reference: reference.to_string(),
        }
    }

    /// Whether this error came from the persistent store rather than game rules.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Io(_) | Self::StoreUnavailable(_) | Self::SessionLocked { .. }
        )
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReverieError>;
