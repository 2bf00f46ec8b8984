//! Game Engine
//!
//! Drives one [`GameSession`] through the reducer and wires it to the
//! collaborators: subject fetch, result sink, snapshot store, round timer,
//! and the event channel the UI listens on.
//!
//! ## Ordering
//!
//! Every mutation goes through [`reduce`] while the engine is exclusively
//! borrowed, so actions are applied one at a time. Async completions that
//! may arrive after the session moved on carry a [`StartTicket`]; a ticket
//! from an older epoch, or whose token was cancelled, is dropped.
//! Finalizing a round that already has a result is ignored.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::collaborators::{ResultSink, SettingsSource, SubjectSource};
use crate::engine::config::SessionConfig;
use crate::engine::persistence::{now_epoch_ms, SnapshotAdapter};
use crate::error::{GameError, GameResult};
use crate::game::events::{SessionEvent, SessionEventData};
use crate::game::hint::HintType;
use crate::game::reducer::{reduce, SessionAction, Transition};
use crate::game::state::{GameSession, Guess, RoundResult, RoundSubject, SessionId, SessionStatus};
use crate::game::summary::SessionSummary;
use crate::game::timer::{RoundTimer, TimerTick};

/// Capacity of the event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What a finalization did.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundOutcome {
    /// The next round is live.
    Advanced {
        /// Round that was just recorded.
        result: RoundResult,
        /// Round now being played.
        next_round: usize,
    },
    /// That was the last round.
    Completed {
        /// Round that was just recorded.
        result: RoundResult,
        /// Final metrics.
        summary: SessionSummary,
    },
    /// The round was already finalized; nothing changed.
    Ignored,
}

/// Proof that a subject fetch belongs to the session that asked for it.
#[derive(Clone, Debug)]
pub struct StartTicket {
    session_id: SessionId,
    epoch: u64,
    rounds: usize,
    token: CancellationToken,
}

impl StartTicket {
    /// Session the fetch is for.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Rounds to request.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Cancelled when the fetch result should be discarded.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Session engine.
pub struct GameEngine {
    session: GameSession,
    timer: RoundTimer,
    snapshots: SnapshotAdapter,
    subjects: Arc<dyn SubjectSource>,
    results: Arc<dyn ResultSink>,
    settings: Arc<dyn SettingsSource>,
    /// Round whose result is being handed to the sink.
    submitting_round: Option<usize>,
    /// Bumped on every start, reset, and cancellation.
    epoch: u64,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl GameEngine {
    /// Engine with an idle session.
    pub fn new(
        subjects: Arc<dyn SubjectSource>,
        results: Arc<dyn ResultSink>,
        settings: Arc<dyn SettingsSource>,
        snapshots: SnapshotAdapter,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session: GameSession::new(),
            timer: RoundTimer::new(),
            snapshots,
            subjects,
            results,
            settings,
            submitting_round: None,
            epoch: 0,
            cancel: CancellationToken::new(),
            event_tx,
        }
    }

    /// Current session state.
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Round timer.
    pub fn timer(&self) -> &RoundTimer {
        &self.timer
    }

    /// Snapshot adapter.
    pub fn snapshots(&self) -> &SnapshotAdapter {
        &self.snapshots
    }

    /// Whether a finalization is in flight.
    pub fn is_submitting(&self) -> bool {
        self.submitting_round.is_some()
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the in-flight subject fetch or result write when
    /// triggered.
    ///
    /// Replaced after it fires, so fetch it again after a cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // =========================================================================
    // RESTORE
    // =========================================================================

    /// Resume from the stored snapshot, if one is present and fresh.
    ///
    /// Only valid while idle. Returns whether a session was restored.
    pub fn restore(&mut self) -> bool {
        self.restore_at(now_epoch_ms())
    }

    /// [`restore`](Self::restore) against an explicit clock.
    pub fn restore_at(&mut self, now_ms: i64) -> bool {
        if self.session.status() != SessionStatus::Idle {
            debug!("Skipping restore: session is {}", self.session.status());
            return false;
        }
        let Some(snapshot) = self.snapshots.load_at(now_ms) else {
            return false;
        };

        match reduce(&mut self.session, SessionAction::Restore(snapshot)) {
            Ok(transition) => {
                self.epoch += 1;
                if self.session.current_round_index().is_some() {
                    self.timer.start(self.session.round_timer_seconds());
                }
                self.emit(transition.events);
                true
            }
            Err(e) => {
                warn!("Snapshot rejected on restore: {}", e);
                self.snapshots.clear();
                false
            }
        }
    }

    // =========================================================================
    // START
    // =========================================================================

    /// Start a new session and wait for its subjects.
    ///
    /// A live session is reset first. The fetch races the cancellation
    /// token; a cancelled start leaves the engine idle.
    pub async fn start_session(&mut self, config: SessionConfig) -> GameResult<()> {
        let ticket = self.begin_start(&config)?;
        let source = Arc::clone(&self.subjects);
        let token = ticket.token.clone();

        let fetched = tokio::select! {
            _ = token.cancelled() => None,
            fetched = source.fetch_round_subjects(ticket.rounds) => Some(fetched),
        };

        match fetched {
            Some(fetched) => self.complete_start(ticket, fetched),
            None => {
                self.abandon_start(&ticket);
                Err(GameError::Cancelled)
            }
        }
    }

    /// Move to `Loading` and hand out the ticket the fetch result must carry.
    pub fn begin_start(&mut self, config: &SessionConfig) -> GameResult<StartTicket> {
        let params = config.resolve(&self.settings.settings())?;

        if matches!(self.session.status(), SessionStatus::Active { .. } | SessionStatus::Loading) {
            info!("Starting over from {}", self.session.status());
            self.reset_session();
        }

        let session_id = SessionId::generate();
        let rounds = params.rounds;
        self.apply(SessionAction::BeginLoading { session_id, params })?;

        self.epoch += 1;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        Ok(StartTicket { session_id, epoch: self.epoch, rounds, token: self.cancel.clone() })
    }

    /// Apply a subject fetch result.
    ///
    /// Results for a superseded or cancelled ticket are discarded with
    /// [`GameError::Cancelled`]. An empty or failed fetch ends in `Error`.
    pub fn complete_start(
        &mut self,
        ticket: StartTicket,
        fetched: anyhow::Result<Vec<RoundSubject>>,
    ) -> GameResult<()> {
        if ticket.epoch != self.epoch || ticket.token.is_cancelled() {
            debug!("Dropping subjects for superseded session {}", ticket.session_id.short());
            self.abandon_start(&ticket);
            return Err(GameError::Cancelled);
        }

        let action = match fetched {
            Ok(mut subjects) => {
                if subjects.len() > ticket.rounds {
                    debug!("Source returned {} subjects, keeping {}", subjects.len(), ticket.rounds);
                    subjects.truncate(ticket.rounds);
                } else if subjects.len() < ticket.rounds && !subjects.is_empty() {
                    warn!("Source returned {} of {} subjects", subjects.len(), ticket.rounds);
                }
                SessionAction::SubjectsLoaded { session_id: ticket.session_id, subjects }
            }
            Err(e) => SessionAction::LoadFailed {
                session_id: ticket.session_id,
                error: GameError::SubjectFetch(format!("{e:#}")),
            },
        };

        self.apply(action)?;

        match self.session.status() {
            SessionStatus::Active { .. } => {
                self.timer.start(self.session.round_timer_seconds());
                Ok(())
            }
            _ => {
                self.timer.stop();
                self.snapshots.clear();
                Err(self
                    .session
                    .last_error()
                    .cloned()
                    .unwrap_or_else(|| GameError::SubjectFetch("session failed to start".into())))
            }
        }
    }

    fn abandon_start(&mut self, ticket: &StartTicket) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        if self.session.status() == SessionStatus::Loading
            && self.session.session_id() == Some(ticket.session_id)
        {
            if let Err(e) = self.apply(SessionAction::LoadCancelled { session_id: ticket.session_id }) {
                debug!("Load cancel ignored: {}", e);
            }
        }
    }

    // =========================================================================
    // ROUND ACTIONS
    // =========================================================================

    /// Spend a hint on the current round.
    ///
    /// Returns the revealed text, or `None` when a budget is exhausted.
    pub fn select_hint(&mut self, hint: HintType) -> GameResult<Option<String>> {
        let round_index = self.live_round("select_hint")?;
        let transition = self.apply(SessionAction::SelectHint { round_index, hint })?;

        let content = transition.events.iter().find_map(|event| match &event.data {
            SessionEventData::HintSelected { content, .. } => Some(content.clone()),
            _ => None,
        });
        Ok(content)
    }

    /// Submit the player's guess for the current round.
    ///
    /// A guess that fails validation is recorded in `last_error` and the
    /// round stays open.
    pub async fn submit_round(&mut self, guess: Guess) -> GameResult<RoundOutcome> {
        let Some(round_index) = self.session.current_round_index() else {
            return self.late_finalization("submit_round");
        };
        let time_taken_seconds = self.timer.elapsed_seconds();
        self.finalize(
            round_index,
            SessionAction::SubmitRound { round_index, guess, time_taken_seconds },
        )
        .await
    }

    /// Finalize the current round as timed out.
    pub async fn timeout_round(&mut self) -> GameResult<RoundOutcome> {
        let Some(round_index) = self.session.current_round_index() else {
            return self.late_finalization("timeout_round");
        };
        self.finalize(round_index, SessionAction::TimeoutRound { round_index }).await
    }

    /// Advance the round timer, finalizing the round when it expires.
    pub async fn tick(&mut self, elapsed_seconds: u32) -> GameResult<Option<RoundOutcome>> {
        match self.timer.tick(elapsed_seconds) {
            TimerTick::Expired => {
                info!("Round timer expired");
                self.timeout_round().await.map(Some)
            }
            TimerTick::Running { .. } | TimerTick::Inactive => Ok(None),
        }
    }

    /// Hold the round timer.
    pub fn pause_timer(&mut self) {
        self.timer.pause();
    }

    /// Continue the round timer.
    pub fn resume_timer(&mut self) {
        self.timer.resume();
    }

    fn late_finalization(&self, action: &str) -> GameResult<RoundOutcome> {
        match self.session.status() {
            SessionStatus::Completed => {
                debug!("{} after completion ignored", action);
                Ok(RoundOutcome::Ignored)
            }
            status => Err(GameError::InvalidState {
                action: action.to_string(),
                status: status.to_string(),
            }),
        }
    }

    fn live_round(&self, action: &str) -> GameResult<usize> {
        self.session.current_round_index().ok_or_else(|| GameError::InvalidState {
            action: action.to_string(),
            status: self.session.status().to_string(),
        })
    }

    async fn finalize(
        &mut self,
        round_index: usize,
        action: SessionAction,
    ) -> GameResult<RoundOutcome> {
        if self.submitting_round == Some(round_index) {
            debug!("Finalization already in flight, ignoring {}", action.name());
            return Ok(RoundOutcome::Ignored);
        }

        let transition = match reduce(&mut self.session, action) {
            Ok(transition) => transition,
            Err(GameError::Timing { round_index }) => {
                debug!("Round {} already finalized", round_index);
                return Ok(RoundOutcome::Ignored);
            }
            Err(e @ GameError::Validation(_)) => {
                warn!("Guess rejected: {}", e);
                self.record_error(e.clone());
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let outcome = self.commit_finalization(transition);
        let result = match &outcome {
            RoundOutcome::Advanced { result, .. } | RoundOutcome::Completed { result, .. } => {
                result.clone()
            }
            RoundOutcome::Ignored => return Ok(outcome),
        };

        // Session, timer, and events are committed; only the sink write remains.
        self.submitting_round = Some(round_index);
        self.persist_result(&result).await;
        self.submitting_round = None;
        Ok(outcome)
    }

    fn commit_finalization(&mut self, transition: Transition) -> RoundOutcome {
        let result = transition.events.iter().find_map(|event| match &event.data {
            SessionEventData::RoundCompleted { result, .. } => Some(result.clone()),
            _ => None,
        });
        let summary = transition.events.iter().find_map(|event| match &event.data {
            SessionEventData::SessionCompleted { summary } => Some(summary.clone()),
            _ => None,
        });

        self.after_transition(&transition);

        match self.session.status() {
            SessionStatus::Completed => {
                self.timer.stop();
            }
            SessionStatus::Active { .. } => {
                self.timer.stop();
                self.timer.start(self.session.round_timer_seconds());
            }
            _ => {}
        }

        self.emit(transition.events);

        match (result, summary, self.session.current_round_index()) {
            (Some(result), Some(summary), _) => RoundOutcome::Completed { result, summary },
            (Some(result), None, Some(next_round)) => RoundOutcome::Advanced { result, next_round },
            _ => RoundOutcome::Ignored,
        }
    }

    /// Hand a finalized round to the result sink, racing the cancellation token.
    async fn persist_result(&mut self, result: &RoundResult) {
        let Some(session_id) = self.session.session_id() else {
            return;
        };
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        let token = self.cancel.clone();
        let sink = Arc::clone(&self.results);

        tokio::select! {
            _ = token.cancelled() => {
                info!("Round {} result write abandoned", result.round_index);
                self.cancel = CancellationToken::new();
            }
            persisted = sink.persist_round_result(session_id, result) => {
                if let Err(e) = persisted {
                    error!("Failed to persist round {} result: {:#}", result.round_index, e);
                    self.record_error(GameError::Persistence(format!("{e:#}")));
                }
            }
        }
    }

    // =========================================================================
    // RESET & CANCELLATION
    // =========================================================================

    /// Drop the session, clear the snapshot, and return to idle.
    pub fn reset_session(&mut self) {
        self.cancel_in_flight();
        self.timer.stop();
        self.submitting_round = None;
        if let Err(e) = self.apply(SessionAction::Reset) {
            error!("Reset failed: {}", e);
        }
    }

    /// Abandon in-flight work without touching recorded results.
    ///
    /// Cancels the subject fetch and any result write, and stops the timer
    /// so no pending timeout can finalize a round. A session still loading
    /// returns to idle.
    pub fn cancel_pending(&mut self) {
        self.cancel_in_flight();
        self.timer.stop();
        self.submitting_round = None;
        if self.session.status() == SessionStatus::Loading {
            if let Some(session_id) = self.session.session_id() {
                if let Err(e) = self.apply(SessionAction::LoadCancelled { session_id }) {
                    debug!("Load cancel ignored: {}", e);
                }
            }
        }
    }

    // =========================================================================
    // PLUMBING
    // =========================================================================

    fn cancel_in_flight(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
    }

    /// Reduce, then persist and publish per the transition.
    fn apply(&mut self, action: SessionAction) -> GameResult<Transition> {
        let transition = reduce(&mut self.session, action)?;
        self.after_transition(&transition);
        self.emit(transition.events.clone());
        Ok(transition)
    }

    fn after_transition(&mut self, transition: &Transition) {
        if transition.clear_snapshot {
            self.snapshots.clear();
        }
        if transition.persist {
            self.persist_snapshot();
        }
    }

    fn persist_snapshot(&mut self) {
        let Some(snapshot) = self.session.snapshot(now_epoch_ms()) else {
            return;
        };
        if let Err(e) = self.snapshots.save(&snapshot) {
            warn!("Snapshot not saved, continuing in memory: {}", e);
            self.record_error(e);
        }
    }

    fn record_error(&mut self, error: GameError) {
        if let Err(e) = reduce(&mut self.session, SessionAction::RecordError(error)) {
            debug!("Error not recorded: {}", e);
        }
    }

    fn emit(&self, events: Vec<SessionEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.event_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Coordinates;
    use crate::engine::collaborators::{RecordingResultSink, StaticSettings, StaticSubjectSource};
    use crate::engine::config::GameSettings;
    use crate::engine::persistence::{MemorySnapshotStore, SNAPSHOT_KEY};
    use crate::game::state::tests::subject;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn subjects(n: usize) -> Vec<RoundSubject> {
        (0..n)
            .map(|i| subject(&format!("s{i}"), -20.0 + i as f64 * 7.5, 30.0 - i as f64 * 11.0, 1890 + i as i32 * 17))
            .collect()
    }

    fn engine_with(source: Vec<RoundSubject>) -> (GameEngine, RecordingResultSink) {
        let sink = RecordingResultSink::new();
        let engine = GameEngine::new(
            Arc::new(StaticSubjectSource::new(source)),
            Arc::new(sink.clone()),
            Arc::new(StaticSettings(GameSettings { timer_seconds: 60, hints_per_game: 10 })),
            SnapshotAdapter::new(Box::new(MemorySnapshotStore::new())),
        );
        (engine, sink)
    }

    fn perfect_guess(engine: &GameEngine) -> Guess {
        let s = engine.session().current_subject().unwrap();
        Guess::new(s.coordinates, s.year)
    }

    struct FailingSource;

    #[async_trait]
    impl SubjectSource for FailingSource {
        async fn fetch_round_subjects(&self, _count: usize) -> anyhow::Result<Vec<RoundSubject>> {
            anyhow::bail!("service unavailable")
        }
    }

    struct PendingSource;

    #[async_trait]
    impl SubjectSource for PendingSource {
        async fn fetch_round_subjects(&self, _count: usize) -> anyhow::Result<Vec<RoundSubject>> {
            std::future::pending().await
        }
    }

    struct FailingSink(AtomicUsize);

    #[async_trait]
    impl ResultSink for FailingSink {
        async fn persist_round_result(&self, _: SessionId, _: &RoundResult) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("write refused")
        }
    }

    /// Never answers the first write; later writes succeed.
    struct StallingSink(AtomicUsize);

    #[async_trait]
    impl ResultSink for StallingSink {
        async fn persist_round_result(&self, _: SessionId, _: &RoundResult) -> anyhow::Result<()> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn stalling_engine(n: usize) -> (GameEngine, Arc<StallingSink>) {
        let sink = Arc::new(StallingSink(AtomicUsize::new(0)));
        let engine = GameEngine::new(
            Arc::new(StaticSubjectSource::new(subjects(n))),
            sink.clone(),
            Arc::new(StaticSettings::default()),
            SnapshotAdapter::new(Box::new(MemorySnapshotStore::new())),
        );
        (engine, sink)
    }

    #[tokio::test]
    async fn test_full_session() {
        let (mut engine, sink) = engine_with(subjects(5));
        let mut events = engine.subscribe_events();
        engine.start_session(SessionConfig::default()).await.unwrap();
        assert_eq!(engine.session().status(), SessionStatus::Active { round_index: 0 });
        assert!(engine.timer().is_running());

        for i in 0..5 {
            let outcome = engine.submit_round(perfect_guess(&engine)).await.unwrap();
            if i < 4 {
                assert!(matches!(outcome, RoundOutcome::Advanced { next_round, .. } if next_round == i + 1));
            } else {
                assert!(matches!(outcome, RoundOutcome::Completed { ref summary, .. } if summary.is_perfect_game));
            }
        }

        let session = engine.session();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.round_results().len(), 5);
        assert_eq!(session.total_xp(), 750);
        assert_eq!(session.total_accuracy(), 100.0);
        assert!(session.check_invariants().is_ok());
        assert_eq!(sink.recorded().await.len(), 5);
        assert!(!engine.timer().is_running());

        let first = events.recv().await.unwrap();
        assert!(matches!(first.data, SessionEventData::SessionStarted { rounds: 5 }));
    }

    #[tokio::test]
    async fn test_empty_source_fails_without_snapshot() {
        let (mut engine, _) = engine_with(Vec::new());
        let err = engine.start_session(SessionConfig::default()).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(engine.session().status(), SessionStatus::Error);
        assert!(engine.session().round_results().is_empty());
        assert_eq!(engine.snapshots().store().get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_subject_fetch_error() {
        let mut engine = GameEngine::new(
            Arc::new(FailingSource),
            Arc::new(RecordingResultSink::new()),
            Arc::new(StaticSettings::default()),
            SnapshotAdapter::new(Box::new(MemorySnapshotStore::new())),
        );
        let err = engine.start_session(SessionConfig::default()).await.unwrap_err();
        assert!(matches!(err, GameError::SubjectFetch(ref msg) if msg.contains("service unavailable")));
        assert_eq!(engine.session().status(), SessionStatus::Error);

        // Error is not terminal for the engine.
        assert!(engine.begin_start(&SessionConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_short_and_long_sources() {
        let (mut engine, _) = engine_with(subjects(3));
        engine.start_session(SessionConfig::default()).await.unwrap();
        assert_eq!(engine.session().round_count(), 3);

        let (mut engine, _) = engine_with(subjects(8));
        let ticket = engine.begin_start(&SessionConfig::default()).unwrap();
        engine.complete_start(ticket, Ok(subjects(8))).unwrap();
        assert_eq!(engine.session().round_count(), 5);
    }

    #[tokio::test]
    async fn test_timeout_fires_once() {
        let (mut engine, _) = engine_with(subjects(2));
        engine.start_session(SessionConfig::default()).await.unwrap();

        assert_eq!(engine.tick(59).await.unwrap(), None);
        let outcome = engine.tick(5).await.unwrap();
        assert!(matches!(outcome, Some(RoundOutcome::Advanced { next_round: 1, .. })));

        let result = &engine.session().round_results()[0];
        assert_eq!(result.guess_coordinates, Some(Coordinates::ORIGIN));
        assert_eq!(result.time_taken_seconds, 60);
        assert_eq!(engine.session().round_results().len(), 1);

        // Fresh timer for round 1.
        assert_eq!(engine.timer().remaining_seconds(), 60);
    }

    #[tokio::test]
    async fn test_late_timeout_after_submit_ignored() {
        let (mut engine, _) = engine_with(subjects(1));
        engine.start_session(SessionConfig::default()).await.unwrap();

        engine.submit_round(perfect_guess(&engine)).await.unwrap();
        let late = engine.timeout_round().await.unwrap();

        assert_eq!(late, RoundOutcome::Ignored);
        assert_eq!(engine.session().round_results().len(), 1);
        assert_eq!(engine.session().status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_guess_keeps_round_open() {
        let (mut engine, _) = engine_with(subjects(2));
        engine.start_session(SessionConfig::default()).await.unwrap();

        let err = engine
            .submit_round(Guess::new(Coordinates::new(0.0, 200.0), 1900))
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert_eq!(engine.session().status(), SessionStatus::Active { round_index: 0 });
        assert!(matches!(engine.session().last_error(), Some(GameError::Validation(_))));

        engine.submit_round(perfect_guess(&engine)).await.unwrap();
        assert_eq!(engine.session().last_error(), None);
    }

    #[tokio::test]
    async fn test_hints_through_engine() {
        let (mut engine, _) = engine_with(subjects(2));
        engine.start_session(SessionConfig { hints_per_game: Some(1), ..Default::default() }).await.unwrap();

        assert!(engine.select_hint(HintType::When).unwrap().is_some());
        assert_eq!(engine.select_hint(HintType::Where).unwrap(), None);
        assert_eq!(engine.session().hints().hints_used_total(), 1);

        let outcome = engine.submit_round(perfect_guess(&engine)).await.unwrap();
        match outcome {
            RoundOutcome::Advanced { result, .. } => assert_eq!(result.accuracy_percent, 70),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (mut engine, _) = engine_with(subjects(3));
        engine.snapshots = SnapshotAdapter::new(Box::new(SharedStore(store.clone())));
        engine.start_session(SessionConfig::default()).await.unwrap();
        engine.select_hint(HintType::Where).unwrap();
        engine.submit_round(perfect_guess(&engine)).await.unwrap();
        let before = engine.session().clone();

        let (mut resumed, _) = engine_with(subjects(3));
        resumed.snapshots = SnapshotAdapter::new(Box::new(SharedStore(store)));
        assert!(resumed.restore());

        let after = resumed.session();
        assert_eq!(after.session_id(), before.session_id());
        assert_eq!(after.status(), SessionStatus::Active { round_index: 1 });
        assert_eq!(after.round_results(), before.round_results());
        assert_eq!(after.total_xp(), before.total_xp());
        assert_eq!(after.hints().hints_used_total(), 1);
        assert!(resumed.timer().is_running());
    }

    #[tokio::test]
    async fn test_stale_snapshot_not_restored() {
        let (mut engine, _) = engine_with(subjects(2));
        engine.start_session(SessionConfig::default()).await.unwrap();
        let snapshot = engine.session().snapshot(0).unwrap();
        engine.snapshots().save(&snapshot).unwrap();

        let store = std::mem::replace(
            &mut engine.snapshots,
            SnapshotAdapter::new(Box::new(MemorySnapshotStore::new())),
        );
        let (mut fresh, _) = engine_with(subjects(2));
        fresh.snapshots = store;

        assert!(!fresh.restore());
        assert_eq!(fresh.session().status(), SessionStatus::Idle);
        assert_eq!(fresh.snapshots().store().get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_clears_snapshot() {
        let (mut engine, _) = engine_with(subjects(2));
        engine.start_session(SessionConfig::default()).await.unwrap();
        assert!(engine.snapshots().store().get(SNAPSHOT_KEY).unwrap().is_some());

        engine.reset_session();
        assert_eq!(engine.session().status(), SessionStatus::Idle);
        assert_eq!(engine.snapshots().store().get(SNAPSHOT_KEY).unwrap(), None);
        assert!(!engine.timer().is_running());
    }

    #[tokio::test]
    async fn test_start_while_active_resets() {
        let (mut engine, _) = engine_with(subjects(3));
        engine.start_session(SessionConfig::default()).await.unwrap();
        engine.submit_round(perfect_guess(&engine)).await.unwrap();
        let first = engine.session().session_id();

        engine.start_session(SessionConfig::default()).await.unwrap();
        assert_ne!(engine.session().session_id(), first);
        assert!(engine.session().round_results().is_empty());
        assert_eq!(engine.session().status(), SessionStatus::Active { round_index: 0 });
    }

    #[tokio::test]
    async fn test_superseded_fetch_dropped() {
        let (mut engine, _) = engine_with(subjects(3));
        let stale = engine.begin_start(&SessionConfig::default()).unwrap();
        engine.cancel_pending();
        let current = engine.begin_start(&SessionConfig::default()).unwrap();

        assert_eq!(engine.complete_start(stale, Ok(subjects(3))), Err(GameError::Cancelled));
        assert_eq!(engine.session().status(), SessionStatus::Loading);

        engine.complete_start(current, Ok(subjects(3))).unwrap();
        assert_eq!(engine.session().status(), SessionStatus::Active { round_index: 0 });
    }

    #[tokio::test]
    async fn test_cancelled_start_returns_to_idle() {
        let mut engine = GameEngine::new(
            Arc::new(PendingSource),
            Arc::new(RecordingResultSink::new()),
            Arc::new(StaticSettings::default()),
            SnapshotAdapter::new(Box::new(MemorySnapshotStore::new())),
        );

        let ticket = engine.begin_start(&SessionConfig::default()).unwrap();
        ticket.token().cancel();
        assert_eq!(engine.complete_start(ticket, Ok(subjects(2))), Err(GameError::Cancelled));
        assert_eq!(engine.session().status(), SessionStatus::Idle);

        let token = engine.cancellation_token();
        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            token.cancel();
        });
        let err = engine.start_session(SessionConfig::default()).await.unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err, GameError::Cancelled);
        assert_eq!(engine.session().status(), SessionStatus::Idle);
        assert_eq!(engine.snapshots().store().get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_pending_stops_timer() {
        let (mut engine, _) = engine_with(subjects(2));
        engine.start_session(SessionConfig::default()).await.unwrap();
        engine.cancel_pending();

        assert_eq!(engine.tick(120).await.unwrap(), None);
        assert!(engine.session().round_results().is_empty());
        assert_eq!(engine.session().status(), SessionStatus::Active { round_index: 0 });
    }

    #[tokio::test]
    async fn test_sink_and_snapshot_failures_are_not_fatal() {
        let failing_sink = Arc::new(FailingSink(AtomicUsize::new(0)));
        let store = MemorySnapshotStore::new();
        store.set_fail_writes(true);
        let mut engine = GameEngine::new(
            Arc::new(StaticSubjectSource::new(subjects(2))),
            failing_sink.clone(),
            Arc::new(StaticSettings::default()),
            SnapshotAdapter::new(Box::new(store)),
        );

        engine.start_session(SessionConfig::default()).await.unwrap();
        assert!(matches!(engine.session().last_error(), Some(GameError::Persistence(_))));

        let outcome = engine.submit_round(perfect_guess(&engine)).await.unwrap();
        assert!(matches!(outcome, RoundOutcome::Advanced { .. }));
        assert!(matches!(engine.session().last_error(), Some(GameError::Persistence(_))));
        assert_eq!(failing_sink.0.load(Ordering::SeqCst), 1);
        assert!(!engine.is_submitting());
    }

    #[tokio::test]
    async fn test_pause_holds_time() {
        let (mut engine, _) = engine_with(subjects(1));
        engine.start_session(SessionConfig::default()).await.unwrap();
        engine.tick(10).await.unwrap();
        engine.pause_timer();
        engine.tick(100).await.unwrap();
        engine.resume_timer();

        let outcome = engine.submit_round(perfect_guess(&engine)).await.unwrap();
        match outcome {
            RoundOutcome::Completed { result, .. } => assert_eq!(result.time_taken_seconds, 10),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_abandons_stalled_result_write() {
        let (mut engine, sink) = stalling_engine(2);
        engine.start_session(SessionConfig::default()).await.unwrap();

        let token = engine.cancellation_token();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let guess = perfect_guess(&engine);
        let outcome = tokio::time::timeout(Duration::from_secs(5), engine.submit_round(guess))
            .await
            .expect("submit should return once cancelled");
        canceller.await.unwrap();

        assert!(matches!(outcome, Ok(RoundOutcome::Advanced { next_round: 1, .. })));
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
        assert_eq!(engine.session().last_error(), None);
        assert!(!engine.is_submitting());
        assert!(!engine.cancellation_token().is_cancelled());

        // The next write goes through on a fresh token.
        let outcome = engine.submit_round(perfect_guess(&engine)).await.unwrap();
        assert!(matches!(outcome, RoundOutcome::Completed { .. }));
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_submit_leaves_next_round_playable() {
        let (mut engine, _) = stalling_engine(3);
        engine.start_session(SessionConfig::default()).await.unwrap();

        let guess = perfect_guess(&engine);
        let dropped = tokio::time::timeout(Duration::from_millis(20), engine.submit_round(guess)).await;
        assert!(dropped.is_err());

        // Round 0 was committed before the write started.
        assert_eq!(engine.session().status(), SessionStatus::Active { round_index: 1 });
        assert_eq!(engine.session().round_results().len(), 1);
        assert!(engine.timer().is_running());
        assert!(engine.is_submitting());

        let outcome = engine.timeout_round().await.unwrap();
        assert!(matches!(outcome, RoundOutcome::Advanced { next_round: 2, .. }));
        assert!(!engine.is_submitting());
        assert_eq!(engine.session().round_results().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_pending_clears_submitting() {
        let (mut engine, _) = stalling_engine(2);
        engine.start_session(SessionConfig::default()).await.unwrap();

        let guess = perfect_guess(&engine);
        let _ = tokio::time::timeout(Duration::from_millis(20), engine.submit_round(guess)).await;
        assert!(engine.is_submitting());

        engine.cancel_pending();
        assert!(!engine.is_submitting());

        let outcome = engine.submit_round(perfect_guess(&engine)).await.unwrap();
        assert!(matches!(outcome, RoundOutcome::Completed { .. }));
    }

    /// Lets two adapters share one memory store.
    struct SharedStore(Arc<MemorySnapshotStore>);

    impl crate::engine::collaborators::SnapshotStore for SharedStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.set(key, value)
        }
        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.0.remove(key)
        }
    }
}
