//! Session Logic Module
//!
//! Everything that defines a game session, independent of I/O.
//!
//! ## Module Structure
//!
//! - `state`: Session aggregate, subjects, guesses, results, snapshots
//! - `hint`: Hint budget and hint text
//! - `timer`: Per-round countdown
//! - `reducer`: The only place session state changes
//! - `events`: Transition events for the UI
//! - `summary`: Final results metrics

pub mod state;
pub mod hint;
pub mod timer;
pub mod reducer;
pub mod events;
pub mod summary;

// Re-export key types
pub use state::{
    GameMode, GameSession, Guess, RoundResult, RoundSubject, SessionId, SessionSnapshot,
    SessionStatus,
};
pub use hint::{HintState, HintType, HINTS_PER_GAME, HINTS_PER_ROUND};
pub use timer::{RoundTimer, TimerState, TimerTick};
pub use reducer::{reduce, SessionAction, SessionParams, Transition};
pub use events::{SessionEvent, SessionEventData};
pub use summary::SessionSummary;
