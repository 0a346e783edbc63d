//! Error types for pitchside

use crate::types::{SessionStatus, TeamColor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Need at least 2 players to draw teams, got {0}")]
    InsufficientPlayers(usize),

    #[error("Team size must be at least 1")]
    InvalidTeamSize,

    #[error("{action} is not allowed while the session is {status:?}")]
    InvalidState {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("Team {0:?} is not in play this round")]
    TeamNotInPlay(TeamColor),

    #[error("No team was drawn for color {0:?}")]
    NoSuchTeam(TeamColor),

    #[error("Team {0:?} cannot challenge itself")]
    SelfChallenge(TeamColor),

    #[error("Goal event not found: {0}")]
    EventNotFound(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Unsupported snapshot version: {0}")]
    SnapshotVersion(u32),

    #[error("Only the session owner can {0}")]
    NotSessionOwner(&'static str),

    #[error("No saved session for match {0}")]
    SessionNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Action {action} dropped after {retries} attempts")]
    QueueExhausted { action: String, retries: u32 },

    #[error("Queue item not found: {0}")]
    QueueItemNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MatchError {
    /// Transport failures are retried (offline queue, reconnect); everything
    /// else surfaces to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Network(_) | MatchError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
