//! Engine Layer
//!
//! Async orchestration around the pure session logic in `game/`:
//! collaborators, configuration, snapshot persistence, and the engine
//! that ties them together.

pub mod collaborators;
pub mod config;
pub mod persistence;
pub mod session;

pub use collaborators::{
    demo_subjects, EnvSettings, RecordingResultSink, ResultSink, SettingsSource, SnapshotStore,
    StaticSettings, StaticSubjectSource, SubjectSource,
};
pub use config::{GameSettings, SessionConfig, DEFAULT_TIMER_SECONDS};
pub use persistence::{
    FileSnapshotStore, MemorySnapshotStore, SnapshotAdapter, SNAPSHOT_KEY,
    SNAPSHOT_MAX_AGE_MS,
};
pub use session::{GameEngine, RoundOutcome, StartTicket};
