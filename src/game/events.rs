//! Session Events
//!
//! Signals emitted on session transitions. The UI collaborator listens
//! for these to navigate between round, results, and error screens.

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::game::hint::HintType;
use crate::game::state::{RoundResult, SessionId};
use crate::game::summary::SessionSummary;

/// Event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionEventData {
    /// Subjects loaded; round 0 is live.
    SessionStarted {
        /// Number of rounds.
        rounds: usize,
    },

    /// A round became playable.
    RoundStarted {
        /// Timer budget for the round.
        timer_seconds: u32,
    },

    /// A hint was spent.
    HintSelected {
        /// Hint kind.
        hint: HintType,
        /// Text revealed.
        content: String,
    },

    /// A round was finalized.
    RoundCompleted {
        /// The recorded result.
        result: RoundResult,
        /// Finalized by the timer rather than the player.
        timed_out: bool,
    },

    /// Every round has a result.
    SessionCompleted {
        /// Final metrics.
        summary: SessionSummary,
    },

    /// Session could not start.
    SessionFailed {
        /// Why.
        error: GameError,
    },

    /// Session returned to idle.
    SessionReset,

    /// Session resumed from a snapshot.
    SessionRestored {
        /// Rounds already played.
        rounds_played: usize,
    },
}

/// An event with its session and round context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session the event belongs to.
    pub session_id: Option<SessionId>,
    /// Round the event concerns, when it concerns one.
    pub round_index: Option<usize>,
    /// Event data.
    pub data: SessionEventData,
}

impl SessionEvent {
    /// Create a new event.
    pub fn new(session_id: Option<SessionId>, round_index: Option<usize>, data: SessionEventData) -> Self {
        Self { session_id, round_index, data }
    }

    /// Create session started event.
    pub fn session_started(session_id: SessionId, rounds: usize) -> Self {
        Self::new(Some(session_id), None, SessionEventData::SessionStarted { rounds })
    }

    /// Create round started event.
    pub fn round_started(session_id: Option<SessionId>, round_index: usize, timer_seconds: u32) -> Self {
        Self::new(session_id, Some(round_index), SessionEventData::RoundStarted { timer_seconds })
    }

    /// Create hint selected event.
    pub fn hint_selected(
        session_id: Option<SessionId>,
        round_index: usize,
        hint: HintType,
        content: String,
    ) -> Self {
        Self::new(session_id, Some(round_index), SessionEventData::HintSelected { hint, content })
    }

    /// Create round completed event.
    pub fn round_completed(session_id: Option<SessionId>, result: RoundResult, timed_out: bool) -> Self {
        let round_index = Some(result.round_index);
        Self::new(session_id, round_index, SessionEventData::RoundCompleted { result, timed_out })
    }

    /// Create session completed event.
    pub fn session_completed(session_id: Option<SessionId>, summary: SessionSummary) -> Self {
        Self::new(session_id, None, SessionEventData::SessionCompleted { summary })
    }

    /// Create session failed event.
    pub fn session_failed(error: GameError) -> Self {
        Self::new(None, None, SessionEventData::SessionFailed { error })
    }

    /// Create session reset event.
    pub fn session_reset() -> Self {
        Self::new(None, None, SessionEventData::SessionReset)
    }

    /// Create session restored event.
    pub fn session_restored(session_id: SessionId, rounds_played: usize) -> Self {
        Self::new(Some(session_id), None, SessionEventData::SessionRestored { rounds_played })
    }

    /// Whether the UI should leave the round screen on this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.data,
            SessionEventData::RoundCompleted { .. }
                | SessionEventData::SessionCompleted { .. }
                | SessionEventData::SessionFailed { .. }
                | SessionEventData::SessionReset
        )
    }
}
