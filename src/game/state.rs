//! Game Session State
//!
//! The session aggregate and the immutable records it owns.
//! All mutation goes through `game::reducer`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::geo::{self, Coordinates};
use crate::core::score::{self, FinalScore};
use crate::error::{GameError, GameResult};
use crate::game::hint::{HintState, HINTS_PER_GAME, HINTS_PER_ROUND};

// =============================================================================
// SESSION ID
// =============================================================================

/// Opaque session identifier (UUID v4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// STATUS & MODE
// =============================================================================

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No session.
    #[default]
    Idle,
    /// Waiting for round subjects.
    Loading,
    /// Playing the given round (0-based).
    Active {
        /// Current round index.
        round_index: usize,
    },
    /// Subject fetch failed; nothing to play.
    Error,
    /// Every round has a result.
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Loading => write!(f, "Loading"),
            SessionStatus::Active { round_index } => write!(f, "Active({round_index})"),
            SessionStatus::Error => write!(f, "Error"),
            SessionStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// Play mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Single player.
    #[default]
    Solo,
    /// Shared room.
    Multi,
}

// =============================================================================
// ROUND SUBJECT
// =============================================================================

/// One historical image to guess.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSubject {
    /// Stable subject identifier.
    pub id: String,
    /// Where the photo was taken.
    pub coordinates: Coordinates,
    /// When the photo was taken.
    pub year: i32,
    /// Human-readable place name.
    pub location_label: String,
    /// Media URL.
    pub media_ref: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
}

impl RoundSubject {
    /// Check every field is present and in range.
    pub fn validate(&self) -> GameResult<()> {
        if self.id.trim().is_empty() {
            return Err(GameError::Validation("subject id is empty".into()));
        }
        if self.location_label.trim().is_empty() {
            return Err(GameError::Validation(format!("subject {} has no location label", self.id)));
        }
        if !is_http_url(&self.media_ref) {
            return Err(GameError::Validation(format!(
                "subject {} media ref is not an http(s) url",
                self.id
            )));
        }
        self.coordinates.validate()?;
        geo::validate_year(self.year)
    }
}

fn is_http_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

// =============================================================================
// GUESS
// =============================================================================

/// What the player submitted for a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    /// Map pin, `None` if the map was never touched.
    pub coordinates: Option<Coordinates>,
    /// Selected year, `None` if the slider was never moved.
    pub year: Option<i32>,
}

impl Guess {
    /// Guess with both a pin and a year.
    pub fn new(coordinates: Coordinates, year: i32) -> Self {
        Self { coordinates: Some(coordinates), year: Some(year) }
    }

    /// Reject malformed coordinates or years before scoring.
    pub fn validate(&self) -> GameResult<()> {
        if let Some(coords) = &self.coordinates {
            coords.validate()?;
        }
        if let Some(year) = self.year {
            geo::validate_year(year)?;
        }
        Ok(())
    }
}

// =============================================================================
// ROUND RESULT
// =============================================================================

/// One finalized round. Created once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 0-based round index, equal to the position in `round_results`.
    pub round_index: usize,
    /// Subject this round was played against.
    pub subject_id: String,
    /// Pin the player placed, if any.
    pub guess_coordinates: Option<Coordinates>,
    /// Year scored against.
    pub guess_year: i32,
    /// Distance from pin (or origin sentinel) to the true location.
    pub distance_km: f64,
    /// Location accuracy, 0..=100.
    pub location_score: u32,
    /// Time accuracy, 0..=100.
    pub time_score: u32,
    /// Hints spent on this round.
    pub hints_used_this_round: u32,
    /// Seconds spent on the round.
    pub time_taken_seconds: u32,
    /// Overall accuracy after hint penalty, 0..=100.
    pub accuracy_percent: u32,
    /// XP after hint penalty and bonus tier.
    pub xp_earned: u32,
}

impl RoundResult {
    /// Score a guess against its subject.
    ///
    /// A missing pin scores from [`Coordinates::ORIGIN`]; a missing year
    /// defaults to the current calendar year.
    ///
    /// `xp_earned` is the bonus tier applied to half the combined round XP,
    /// not the raw [`score::round_score`] XP. A perfect round records 150,
    /// while a 40/40 round with one hint records 25 even though
    /// `round_score` reports 50 for it.
    pub fn score(
        round_index: usize,
        subject: &RoundSubject,
        guess: &Guess,
        hints_used_this_round: u32,
        time_taken_seconds: u32,
    ) -> Self {
        let scored_at = guess.coordinates.unwrap_or(Coordinates::ORIGIN);
        let guess_year = guess.year.unwrap_or_else(geo::max_year);

        let distance_km = scored_at.distance_km(&subject.coordinates);
        let location_score = score::location_accuracy(distance_km).round() as u32;
        let time_score = score::time_accuracy(guess_year, subject.year).round() as u32;

        let round = score::round_score(
            f64::from(location_score),
            f64::from(time_score),
            hints_used_this_round,
        );

        Self {
            round_index,
            subject_id: subject.id.clone(),
            guess_coordinates: guess.coordinates,
            guess_year,
            distance_km,
            location_score,
            time_score,
            hints_used_this_round,
            time_taken_seconds,
            accuracy_percent: round.accuracy,
            xp_earned: score::xp_for_accuracy(f64::from(round.xp) / 2.0),
        }
    }

    /// Check every field is in range.
    pub fn validate(&self) -> GameResult<()> {
        let fail = |what: &str| {
            Err(GameError::Validation(format!("round {} {}", self.round_index, what)))
        };

        if self.subject_id.trim().is_empty() {
            return fail("has no subject id");
        }
        if let Some(coords) = &self.guess_coordinates {
            if !coords.is_valid() {
                return fail("guess coordinates out of range");
            }
        }
        if !geo::is_valid_year(self.guess_year) {
            return fail("guess year out of range");
        }
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return fail("distance is negative or not finite");
        }
        if self.location_score > 100 || self.time_score > 100 || self.accuracy_percent > 100 {
            return fail("score outside 0..=100");
        }
        if self.hints_used_this_round > HINTS_PER_ROUND {
            return fail("used more hints than a round allows");
        }
        Ok(())
    }
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// Structured copy of the last recoverable failure.
pub type LastError = Option<GameError>;

/// Root aggregate for one game.
#[derive(Clone, Debug, Default)]
pub struct GameSession {
    pub(crate) session_id: Option<SessionId>,
    pub(crate) status: SessionStatus,
    pub(crate) mode: GameMode,
    pub(crate) room_id: Option<String>,
    pub(crate) round_subjects: Vec<RoundSubject>,
    pub(crate) round_results: Vec<RoundResult>,
    pub(crate) hints_allowed_per_game: u32,
    pub(crate) round_timer_seconds: u32,
    pub(crate) total_accuracy: f64,
    pub(crate) total_xp: u32,
    pub(crate) last_error: LastError,
    pub(crate) hints: HintState,
}

impl GameSession {
    /// Empty idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session id, `None` when idle or failed.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Lifecycle state.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Play mode.
    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Room for multiplayer sessions.
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Subjects for every round.
    pub fn round_subjects(&self) -> &[RoundSubject] {
        &self.round_subjects
    }

    /// Completed rounds, in order.
    pub fn round_results(&self) -> &[RoundResult] {
        &self.round_results
    }

    /// Hints allowed across the whole session.
    pub fn hints_allowed_per_game(&self) -> u32 {
        self.hints_allowed_per_game
    }

    /// Per-round timer budget.
    pub fn round_timer_seconds(&self) -> u32 {
        self.round_timer_seconds
    }

    /// Mean accuracy across completed rounds.
    pub fn total_accuracy(&self) -> f64 {
        self.total_accuracy
    }

    /// Total XP across completed rounds.
    pub fn total_xp(&self) -> u32 {
        self.total_xp
    }

    /// Last recoverable failure.
    pub fn last_error(&self) -> Option<&GameError> {
        self.last_error.as_ref()
    }

    /// Hint counters and content.
    pub fn hints(&self) -> &HintState {
        &self.hints
    }

    /// Number of rounds in this session.
    pub fn round_count(&self) -> usize {
        self.round_subjects.len()
    }

    /// Round being played, if any.
    pub fn current_round_index(&self) -> Option<usize> {
        match self.status {
            SessionStatus::Active { round_index } => Some(round_index),
            _ => None,
        }
    }

    /// Subject for the round being played.
    pub fn current_subject(&self) -> Option<&RoundSubject> {
        self.current_round_index().and_then(|i| self.round_subjects.get(i))
    }

    /// Whether every round has a result.
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Session totals as the final results screen shows them.
    pub fn final_score(&self) -> FinalScore {
        score::final_session_score(
            self.round_results.iter().map(|r| (r.xp_earned, r.accuracy_percent)),
        )
    }

    /// Recompute aggregates from `round_results`.
    ///
    /// Called after every change to `round_results`; totals are never patched
    /// incrementally.
    pub(crate) fn recompute_totals(&mut self) {
        let totals = self.final_score();
        self.total_accuracy = totals.final_percent;
        self.total_xp = totals.final_xp;
    }

    /// Check the externally observable invariants.
    pub fn check_invariants(&self) -> GameResult<()> {
        let broken = |what: &str| Err(GameError::Validation(format!("invariant broken: {what}")));

        if self.round_results.len() > self.round_subjects.len() {
            return broken("more results than subjects");
        }
        if self
            .round_results
            .iter()
            .enumerate()
            .any(|(i, r)| r.round_index != i)
        {
            return broken("round index does not match position");
        }
        if self.hints.hints_used_this_round() > HINTS_PER_ROUND
            || self.hints.hints_used_total() > self.hints.per_game_limit()
        {
            return broken("hint cap exceeded");
        }
        let totals = self.final_score();
        if (totals.final_percent - self.total_accuracy).abs() > f64::EPSILON
            || totals.final_xp != self.total_xp
        {
            return broken("aggregates drifted");
        }
        let all_done = !self.round_subjects.is_empty()
            && self.round_results.len() == self.round_subjects.len();
        if all_done != (self.status == SessionStatus::Completed) {
            return broken("completed status disagrees with result count");
        }
        Ok(())
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Minimal resumable copy of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session being resumed.
    pub session_id: SessionId,
    /// Play mode.
    #[serde(default)]
    pub mode: GameMode,
    /// Room for multiplayer sessions.
    #[serde(default)]
    pub room_id: Option<String>,
    /// Subjects for every round.
    pub round_subjects: Vec<RoundSubject>,
    /// Completed rounds.
    pub round_results: Vec<RoundResult>,
    /// Per-game hint allowance.
    pub hints_allowed_per_game: u32,
    /// Hints spent so far.
    #[serde(default)]
    pub hints_used_total: u32,
    /// Per-round timer budget.
    pub round_timer_seconds: u32,
    /// Mean accuracy at save time.
    pub total_accuracy: f64,
    /// Total XP at save time.
    pub total_xp: u32,
    /// Wall-clock save time, Unix milliseconds.
    pub saved_at_epoch_ms: i64,
}

impl SessionSnapshot {
    /// Structural validation: every subject and result present and in range,
    /// results in round order and matching their subjects.
    pub fn validate(&self) -> GameResult<()> {
        let fail = |what: String| {
            Err(GameError::Validation(format!("snapshot {}: {}", self.session_id.short(), what)))
        };

        if self.round_subjects.is_empty() {
            return fail("has no round subjects".into());
        }
        if self.round_results.len() > self.round_subjects.len() {
            return fail("has more results than subjects".into());
        }
        for subject in &self.round_subjects {
            subject.validate()?;
        }
        for (position, result) in self.round_results.iter().enumerate() {
            result.validate()?;
            if result.round_index != position {
                return fail(format!("result {} stored at position {}", result.round_index, position));
            }
            if result.subject_id != self.round_subjects[position].id {
                return fail(format!("result {} does not match its subject", position));
            }
        }
        if self.round_timer_seconds == 0 {
            return fail("has a zero round timer".into());
        }
        if self.hints_used_total > self.hints_allowed_per_game.min(HINTS_PER_GAME) {
            return fail("hint total exceeds allowance".into());
        }
        if !self.total_accuracy.is_finite() || !(0.0..=100.0).contains(&self.total_accuracy) {
            return fail("total accuracy out of range".into());
        }
        Ok(())
    }
}

impl GameSession {
    /// Snapshot of a live session, `None` before subjects are loaded.
    pub fn snapshot(&self, saved_at_epoch_ms: i64) -> Option<SessionSnapshot> {
        let session_id = self.session_id?;
        if self.round_subjects.is_empty() {
            return None;
        }
        Some(SessionSnapshot {
            session_id,
            mode: self.mode,
            room_id: self.room_id.clone(),
            round_subjects: self.round_subjects.clone(),
            round_results: self.round_results.clone(),
            hints_allowed_per_game: self.hints_allowed_per_game,
            hints_used_total: self.hints.hints_used_total(),
            round_timer_seconds: self.round_timer_seconds,
            total_accuracy: self.total_accuracy,
            total_xp: self.total_xp,
            saved_at_epoch_ms,
        })
    }
}
