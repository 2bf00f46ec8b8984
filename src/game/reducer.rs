//! Session Reducer
//!
//! The only code that mutates a `GameSession`. Each action is applied
//! synchronously and returns the events it produced plus whether the
//! snapshot needs writing.
//!
//! ## Transitions
//!
//! ```text
//! Idle | Completed | Error --BeginLoading--> Loading
//! Loading --SubjectsLoaded(n >= 1)--> Active(0)
//! Loading --SubjectsLoaded(0) | LoadFailed--> Error
//! Loading --LoadCancelled--> Idle
//! Active(i) --SubmitRound | TimeoutRound--> Active(i + 1) | Completed
//! Idle --Restore--> Active(k) | Completed
//! *    --Reset--> Idle
//! ```

use tracing::{debug, info, warn};

use crate::core::geo::Coordinates;
use crate::error::{GameError, GameResult};
use crate::game::events::SessionEvent;
use crate::game::hint::{HintState, HintType};
use crate::game::state::{
    GameMode, GameSession, Guess, RoundResult, RoundSubject, SessionId, SessionSnapshot,
    SessionStatus,
};
use crate::game::summary::SessionSummary;

/// Session parameters fixed at start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    /// Rounds to request from the subject source.
    pub rounds: usize,
    /// Per-game hint allowance.
    pub hints_allowed_per_game: u32,
    /// Per-round timer budget.
    pub round_timer_seconds: u32,
    /// Play mode.
    pub mode: GameMode,
    /// Room for multiplayer sessions.
    pub room_id: Option<String>,
}

/// Everything that can happen to a session.
#[derive(Clone, Debug)]
pub enum SessionAction {
    /// Start waiting for subjects.
    BeginLoading {
        /// New session id.
        session_id: SessionId,
        /// Parameters snapshotted for the session.
        params: SessionParams,
    },
    /// Subjects arrived.
    SubjectsLoaded {
        /// Session the subjects were fetched for.
        session_id: SessionId,
        /// The subjects, already truncated to the requested count.
        subjects: Vec<RoundSubject>,
    },
    /// Subject fetch failed.
    LoadFailed {
        /// Session the fetch was for.
        session_id: SessionId,
        /// Why.
        error: GameError,
    },
    /// Subject fetch was abandoned.
    LoadCancelled {
        /// Session the fetch was for.
        session_id: SessionId,
    },
    /// Spend a hint on the given round.
    SelectHint {
        /// Round the player is looking at.
        round_index: usize,
        /// Hint kind.
        hint: HintType,
    },
    /// Player submitted a guess.
    SubmitRound {
        /// Round being finalized.
        round_index: usize,
        /// The guess.
        guess: Guess,
        /// Seconds spent on the round.
        time_taken_seconds: u32,
    },
    /// The round timer expired.
    TimeoutRound {
        /// Round being finalized.
        round_index: usize,
    },
    /// Remember a recoverable failure.
    RecordError(GameError),
    /// Resume from a validated snapshot.
    Restore(SessionSnapshot),
    /// Drop the session.
    Reset,
}

impl SessionAction {
    /// Short action name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::BeginLoading { .. } => "begin_loading",
            SessionAction::SubjectsLoaded { .. } => "subjects_loaded",
            SessionAction::LoadFailed { .. } => "load_failed",
            SessionAction::LoadCancelled { .. } => "load_cancelled",
            SessionAction::SelectHint { .. } => "select_hint",
            SessionAction::SubmitRound { .. } => "submit_round",
            SessionAction::TimeoutRound { .. } => "timeout_round",
            SessionAction::RecordError(_) => "record_error",
            SessionAction::Restore(_) => "restore",
            SessionAction::Reset => "reset",
        }
    }
}

/// What applying an action produced.
#[derive(Debug, Default)]
pub struct Transition {
    /// Events for the UI collaborator.
    pub events: Vec<SessionEvent>,
    /// Snapshot should be written.
    pub persist: bool,
    /// Stored snapshot should be removed.
    pub clear_snapshot: bool,
}

impl Transition {
    fn persisted(events: Vec<SessionEvent>) -> Self {
        Self { events, persist: true, clear_snapshot: false }
    }

    fn quiet(events: Vec<SessionEvent>) -> Self {
        Self { events, persist: false, clear_snapshot: false }
    }
}

fn invalid(action: &str, status: SessionStatus) -> GameError {
    GameError::InvalidState { action: action.to_string(), status: status.to_string() }
}

/// Apply one action.
///
/// On `Err` the session is unchanged.
pub fn reduce(session: &mut GameSession, action: SessionAction) -> GameResult<Transition> {
    let name = action.name();

    match action {
        SessionAction::BeginLoading { session_id, params } => {
            if !matches!(
                session.status,
                SessionStatus::Idle | SessionStatus::Completed | SessionStatus::Error
            ) {
                return Err(invalid(name, session.status));
            }
            begin_loading(session, session_id, params);
            Ok(Transition::default())
        }

        SessionAction::SubjectsLoaded { session_id, subjects } => {
            if !is_loading(session, session_id) {
                return Err(invalid(name, session.status));
            }
            Ok(subjects_loaded(session, session_id, subjects))
        }

        SessionAction::LoadFailed { session_id, error } => {
            if !is_loading(session, session_id) {
                return Err(invalid(name, session.status));
            }
            Ok(fail_loading(session, error))
        }

        SessionAction::LoadCancelled { session_id } => {
            if !is_loading(session, session_id) {
                return Err(invalid(name, session.status));
            }
            info!("Session {} load cancelled", session_id.short());
            *session = GameSession::new();
            Ok(Transition::default())
        }

        SessionAction::SelectHint { round_index, hint } => {
            if session.current_round_index() != Some(round_index) {
                return Err(invalid(name, session.status));
            }
            Ok(match session.hints.select_hint(hint) {
                Some(content) => Transition::persisted(vec![SessionEvent::hint_selected(
                    session.session_id,
                    round_index,
                    hint,
                    content,
                )]),
                None => Transition::default(),
            })
        }

        SessionAction::SubmitRound { round_index, guess, time_taken_seconds } => {
            let round = finalize_guard(session, round_index, name)?;
            guess.validate()?;
            let result = score_current(session, round, &guess, time_taken_seconds)?;
            Ok(finalize_round(session, result, false))
        }

        SessionAction::TimeoutRound { round_index } => {
            let round = finalize_guard(session, round_index, name)?;
            let guess = Guess { coordinates: Some(Coordinates::ORIGIN), year: None };
            let budget = session.round_timer_seconds;
            let result = score_current(session, round, &guess, budget)?;
            Ok(finalize_round(session, result, true))
        }

        SessionAction::RecordError(error) => {
            debug!("Recording error {}: {}", error.code(), error);
            session.last_error = Some(error);
            Ok(Transition::default())
        }

        SessionAction::Restore(snapshot) => {
            if session.status != SessionStatus::Idle {
                return Err(invalid(name, session.status));
            }
            snapshot.validate()?;
            Ok(restore(session, snapshot))
        }

        SessionAction::Reset => {
            let had_session = session.session_id.is_some();
            *session = GameSession::new();
            if had_session {
                info!("Session reset");
            }
            Ok(Transition {
                events: vec![SessionEvent::session_reset()],
                persist: false,
                clear_snapshot: true,
            })
        }
    }
}

fn is_loading(session: &GameSession, session_id: SessionId) -> bool {
    session.status == SessionStatus::Loading && session.session_id == Some(session_id)
}

fn begin_loading(session: &mut GameSession, session_id: SessionId, params: SessionParams) {
    *session = GameSession {
        session_id: Some(session_id),
        status: SessionStatus::Loading,
        mode: params.mode,
        room_id: params.room_id,
        hints_allowed_per_game: params.hints_allowed_per_game,
        round_timer_seconds: params.round_timer_seconds,
        hints: HintState::with_limit(params.hints_allowed_per_game),
        ..GameSession::new()
    };
    info!(
        "Session {} loading {} rounds ({}s timer, {} hints)",
        session_id.short(),
        params.rounds,
        params.round_timer_seconds,
        params.hints_allowed_per_game
    );
}

fn subjects_loaded(
    session: &mut GameSession,
    session_id: SessionId,
    subjects: Vec<RoundSubject>,
) -> Transition {
    if subjects.is_empty() {
        return fail_loading(session, GameError::SubjectFetch("no round subjects returned".into()));
    }
    if let Some(err) = subjects.iter().find_map(|s| s.validate().err()) {
        return fail_loading(session, GameError::SubjectFetch(format!("invalid subject: {err}")));
    }

    session.round_subjects = subjects;
    session.round_results.clear();
    session.recompute_totals();
    session.last_error = None;
    session.hints.reset_for_new_session();
    session.hints.prepare_round(&session.round_subjects[0]);
    session.status = SessionStatus::Active { round_index: 0 };

    info!("Session {} started with {} rounds", session_id.short(), session.round_subjects.len());
    Transition::persisted(vec![
        SessionEvent::session_started(session_id, session.round_subjects.len()),
        SessionEvent::round_started(Some(session_id), 0, session.round_timer_seconds),
    ])
}

fn fail_loading(session: &mut GameSession, error: GameError) -> Transition {
    warn!("Session start failed: {}", error);
    session.session_id = None;
    session.round_subjects.clear();
    session.round_results.clear();
    session.recompute_totals();
    session.status = SessionStatus::Error;
    session.last_error = Some(error.clone());
    Transition::quiet(vec![SessionEvent::session_failed(error)])
}

/// First-writer-wins: only the live round may be finalized.
fn finalize_guard(session: &GameSession, round_index: usize, action: &str) -> GameResult<usize> {
    match session.status {
        SessionStatus::Active { round_index: live } if live == round_index => Ok(live),
        _ if round_index < session.round_results.len() => Err(GameError::Timing { round_index }),
        status => Err(invalid(action, status)),
    }
}

fn score_current(
    session: &GameSession,
    round: usize,
    guess: &Guess,
    time_taken_seconds: u32,
) -> GameResult<RoundResult> {
    let subject = session.round_subjects.get(round).ok_or_else(|| {
        GameError::Validation(format!("no subject for round {round}"))
    })?;
    Ok(RoundResult::score(
        round,
        subject,
        guess,
        session.hints.hints_used_this_round(),
        time_taken_seconds,
    ))
}

fn finalize_round(session: &mut GameSession, result: RoundResult, timed_out: bool) -> Transition {
    let round = result.round_index;
    let session_id = session.session_id;

    info!(
        "Round {} finalized{}: {:.0} km, {} accuracy, {} XP",
        round,
        if timed_out { " by timeout" } else { "" },
        result.distance_km,
        result.accuracy_percent,
        result.xp_earned
    );

    session.round_results.push(result.clone());
    session.recompute_totals();
    session.last_error = None;
    session.hints.reset_for_new_round();

    let mut events = vec![SessionEvent::round_completed(session_id, result, timed_out)];

    let next = round + 1;
    if next >= session.round_subjects.len() {
        session.status = SessionStatus::Completed;
        let summary = SessionSummary::from_results(&session.round_results);
        info!(
            "Session complete: {} XP, {:.1}% accuracy",
            summary.final_xp, summary.final_percent
        );
        events.push(SessionEvent::session_completed(session_id, summary));
    } else {
        session.status = SessionStatus::Active { round_index: next };
        session.hints.prepare_round(&session.round_subjects[next]);
        events.push(SessionEvent::round_started(session_id, next, session.round_timer_seconds));
    }

    Transition::persisted(events)
}

fn restore(session: &mut GameSession, snapshot: SessionSnapshot) -> Transition {
    let session_id = snapshot.session_id;
    let stored_accuracy = snapshot.total_accuracy;
    let stored_xp = snapshot.total_xp;

    *session = GameSession {
        session_id: Some(session_id),
        status: SessionStatus::Idle,
        mode: snapshot.mode,
        room_id: snapshot.room_id,
        round_subjects: snapshot.round_subjects,
        round_results: snapshot.round_results,
        hints_allowed_per_game: snapshot.hints_allowed_per_game,
        round_timer_seconds: snapshot.round_timer_seconds,
        hints: HintState::with_limit(snapshot.hints_allowed_per_game),
        ..GameSession::new()
    };
    session.hints.restore_total(snapshot.hints_used_total);
    session.recompute_totals();

    if session.total_xp != stored_xp || (session.total_accuracy - stored_accuracy).abs() > 1e-9 {
        warn!(
            "Snapshot totals disagreed with results (stored {} XP / {:.2}%), recomputed",
            stored_xp, stored_accuracy
        );
    }

    let played = session.round_results.len();
    let mut events = vec![SessionEvent::session_restored(session_id, played)];

    if played >= session.round_subjects.len() {
        session.status = SessionStatus::Completed;
    } else {
        session.status = SessionStatus::Active { round_index: played };
        session.hints.prepare_round(&session.round_subjects[played]);
        events.push(SessionEvent::round_started(Some(session_id), played, session.round_timer_seconds));
    }

    info!("Session {} restored at {}", session_id.short(), session.status);
    Transition::quiet(events)
}
