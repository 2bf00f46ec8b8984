//! Engine Errors
//!
//! One taxonomy for every failure the session engine can observe.
//! Only `SubjectFetch` ends a session; everything else is absorbed,
//! logged, and surfaced through `GameSession::last_error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    /// Malformed guess, year, coordinates, or configuration.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Round subjects could not be fetched (fatal to session start).
    #[error("failed to fetch round subjects: {0}")]
    SubjectFetch(String),

    /// Snapshot or result write failed; play continues in memory.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A round was finalized twice. Ignored by the engine.
    #[error("round {round_index} already finalized")]
    Timing {
        /// Round the late finalization targeted.
        round_index: usize,
    },

    /// Action is not valid in the current session state.
    #[error("{action} is not valid while session is {status}")]
    InvalidState {
        /// Action that was attempted.
        action: String,
        /// Session status at the time.
        status: String,
    },

    /// An in-flight operation was cancelled before it could commit.
    #[error("operation cancelled")]
    Cancelled,
}

impl GameError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "VALIDATION_ERROR",
            GameError::SubjectFetch(_) => "SUBJECT_FETCH_ERROR",
            GameError::Persistence(_) => "PERSISTENCE_ERROR",
            GameError::Timing { .. } => "TIMING_ERROR",
            GameError::InvalidState { .. } => "INVALID_STATE",
            GameError::Cancelled => "CANCELLED",
        }
    }

    /// Whether the session cannot continue without fresh data.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GameError::SubjectFetch(_))
    }
}

/// Result alias used throughout the engine.
pub type GameResult<T> = Result<T, GameError>;
