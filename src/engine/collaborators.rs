//! Collaborator Contracts
//!
//! The engine talks to the outside world through these traits: where
//! subjects come from, where finished rounds go, where settings live, and
//! where snapshots are stored. In-memory implementations back the demo
//! binary and the tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::geo::Coordinates;
use crate::engine::config::GameSettings;
use crate::game::state::{RoundResult, RoundSubject, SessionId};

/// Source of round subjects.
#[async_trait]
pub trait SubjectSource: Send + Sync {
    /// Fetch up to `count` subjects for a new session.
    ///
    /// Returning fewer than requested is allowed; returning none fails
    /// the session start.
    async fn fetch_round_subjects(&self, count: usize) -> anyhow::Result<Vec<RoundSubject>>;
}

/// Sink for finalized rounds.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Record one finalized round. Failures are logged, never fatal.
    async fn persist_round_result(
        &self,
        session_id: SessionId,
        result: &RoundResult,
    ) -> anyhow::Result<()>;
}

/// Source of global game settings.
pub trait SettingsSource: Send + Sync {
    /// Current settings.
    fn settings(&self) -> GameSettings;
}

/// Key-value store for the session snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Read the value under `key`.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    /// Write `value` under `key`.
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    /// Delete `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

// =============================================================================
// IN-MEMORY IMPLEMENTATIONS
// =============================================================================

/// Serves a fixed list of subjects.
#[derive(Debug, Clone, Default)]
pub struct StaticSubjectSource {
    subjects: Vec<RoundSubject>,
}

impl StaticSubjectSource {
    /// Serve the given subjects.
    pub fn new(subjects: Vec<RoundSubject>) -> Self {
        Self { subjects }
    }
}

#[async_trait]
impl SubjectSource for StaticSubjectSource {
    async fn fetch_round_subjects(&self, count: usize) -> anyhow::Result<Vec<RoundSubject>> {
        Ok(self.subjects.iter().take(count).cloned().collect())
    }
}

/// Keeps every persisted result in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingResultSink {
    results: Arc<Mutex<Vec<(SessionId, RoundResult)>>>,
}

impl RecordingResultSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted so far.
    pub async fn recorded(&self) -> Vec<(SessionId, RoundResult)> {
        self.results.lock().await.clone()
    }
}

#[async_trait]
impl ResultSink for RecordingResultSink {
    async fn persist_round_result(
        &self,
        session_id: SessionId,
        result: &RoundResult,
    ) -> anyhow::Result<()> {
        self.results.lock().await.push((session_id, result.clone()));
        Ok(())
    }
}

/// Fixed settings.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub GameSettings);

impl SettingsSource for StaticSettings {
    fn settings(&self) -> GameSettings {
        self.0.clone()
    }
}

/// Settings read from the environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn settings(&self) -> GameSettings {
        GameSettings::from_env()
    }
}

/// A handful of well-known photos for local play.
pub fn demo_subjects() -> Vec<RoundSubject> {
    let subject = |id: &str, lat: f64, lng: f64, year: i32, label: &str, title: &str| RoundSubject {
        id: id.to_string(),
        coordinates: Coordinates::new(lat, lng),
        year,
        location_label: label.to_string(),
        media_ref: format!("https://images.guesshistory.example/{id}.jpg"),
        title: title.to_string(),
    };

    vec![
        subject("berlin-wall", 52.5163, 13.3777, 1989, "Berlin, Germany", "Fall of the Wall"),
        subject("golden-gate", 37.8199, -122.4783, 1937, "San Francisco, USA", "Bridge opening"),
        subject("eiffel", 48.8584, 2.2945, 1889, "Paris, France", "Exposition Universelle"),
        subject("sydney-harbour", -33.8523, 151.2108, 1932, "Sydney, Australia", "Harbour Bridge"),
        subject("moon-watch", 28.5729, -80.6490, 1969, "Cape Canaveral, USA", "Apollo 11 launch"),
        subject("tokyo-olympics", 35.6778, 139.7145, 1964, "Tokyo, Japan", "Olympic stadium"),
    ]
}
