//! # Guess History Session Engine
//!
//! Runs a game of Guess History: a fixed number of rounds, each showing a
//! historical photo whose place and year the player guesses against a
//! countdown, optionally buying hints.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   GUESS HISTORY ENGINE                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Pure primitives                         │
//! │  ├── geo.rs        - Coordinates, haversine distance         │
//! │  ├── score.rs      - Accuracy curves, XP, final totals       │
//! │  └── hash.rs       - Snapshot checksums                      │
//! │                                                              │
//! │  game/             - Session logic (no I/O)                  │
//! │  ├── state.rs      - Session, subjects, guesses, results     │
//! │  ├── hint.rs       - Hint budget and hint text               │
//! │  ├── timer.rs      - Round countdown                         │
//! │  ├── reducer.rs    - State transitions                       │
//! │  ├── events.rs     - Transition events                       │
//! │  └── summary.rs    - Final results metrics                   │
//! │                                                              │
//! │  engine/           - Orchestration (async)                   │
//! │  ├── config.rs     - Settings and session options            │
//! │  ├── collaborators.rs - Subject, result, settings, storage   │
//! │  ├── persistence.rs - Snapshot save/load, 24h staleness      │
//! │  └── session.rs    - GameEngine                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! All session mutation goes through `game::reducer::reduce`. Aggregates
//! (`total_xp`, `total_accuracy`) are recomputed from the recorded rounds
//! after every change, never patched, so a restored session always agrees
//! with its results.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod engine;
pub mod error;
pub mod game;

// Re-export commonly used types
pub use core::geo::Coordinates;
pub use engine::{GameEngine, GameSettings, RoundOutcome, SessionConfig, SnapshotAdapter};
pub use error::{GameError, GameResult};
pub use game::hint::HintType;
pub use game::state::{GameSession, Guess, RoundResult, RoundSubject, SessionId, SessionStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rounds in a standard game.
pub const DEFAULT_ROUNDS_PER_GAME: usize = 5;
