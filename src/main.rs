//! Guess History Demo
//!
//! Plays one session against the built-in demo photos, guessing near each
//! answer and letting the last round time out. Set `GH_SNAPSHOT_DIR` to
//! keep the snapshot on disk between runs; an unfinished game resumes.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use guess_history::{
    engine::{
        demo_subjects, EnvSettings, FileSnapshotStore, MemorySnapshotStore, RecordingResultSink,
        SnapshotStore, StaticSubjectSource,
    },
    game::events::SessionEventData,
    Coordinates, GameEngine, Guess, HintType, RoundOutcome, SessionConfig, SnapshotAdapter,
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let default_filter = if cfg!(feature = "debug-tracing") { "guess_history=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Guess History Engine v{}", VERSION);

    let store: Box<dyn SnapshotStore> = match std::env::var("GH_SNAPSHOT_DIR") {
        Ok(dir) => {
            info!("Snapshots in {}", dir);
            Box::new(FileSnapshotStore::new(dir))
        }
        Err(_) => Box::new(MemorySnapshotStore::new()),
    };

    let sink = RecordingResultSink::new();
    let mut engine = GameEngine::new(
        Arc::new(StaticSubjectSource::new(demo_subjects())),
        Arc::new(sink.clone()),
        Arc::new(EnvSettings),
        SnapshotAdapter::new(store),
    );

    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event.data {
                SessionEventData::RoundCompleted { result, timed_out } => info!(
                    "Round {}: {:.0} km off, year {}, {}% / {} XP{}",
                    result.round_index,
                    result.distance_km,
                    result.guess_year,
                    result.accuracy_percent,
                    result.xp_earned,
                    if *timed_out { " (timed out)" } else { "" }
                ),
                SessionEventData::HintSelected { hint, content } => {
                    info!("Hint {:?}: {}", hint, content)
                }
                _ => {}
            }
            if event.is_terminal() {
                match event.round_index {
                    Some(round) => info!("Round {} screen closed", round),
                    None => info!("Back to the start screen"),
                }
            }
        }
    });

    if engine.restore() {
        info!("Resumed unfinished game at {}", engine.session().status());
    } else {
        engine.start_session(SessionConfig::default()).await?;
    }

    demo_play(&mut engine).await?;

    let summary = guess_history::game::SessionSummary::from_results(engine.session().round_results());
    info!("=== Results ===");
    info!("Rounds: {}", summary.rounds_played);
    info!("XP: {}", summary.final_xp);
    info!("Accuracy: {:.1}%", summary.final_percent);
    info!("Location: {:.1}%  Time: {:.1}%", summary.location_accuracy, summary.time_accuracy);
    info!("Hints used: {}", summary.hints_used);
    info!("Results persisted: {}", sink.recorded().await.len());

    // Let the event printer drain.
    tokio::task::yield_now().await;
    Ok(())
}

/// Play every remaining round.
async fn demo_play(engine: &mut GameEngine) -> anyhow::Result<()> {
    while let Some(round) = engine.session().current_round_index() {
        let Some(subject) = engine.session().current_subject().cloned() else {
            break;
        };
        let last = round + 1 == engine.session().round_count();

        if round % 2 == 1 {
            engine.select_hint(HintType::When)?;
        }

        let outcome = if last {
            // Sit on the final round until the timer runs out.
            let mut outcome = None;
            while outcome.is_none() && engine.timer().is_running() {
                outcome = engine.tick(30).await?;
            }
            match outcome {
                Some(outcome) => Some(outcome),
                None => Some(engine.timeout_round().await?),
            }
        } else if let Some(expired) = engine.tick(20 + round as u32 * 7).await? {
            Some(expired)
        } else {
            let offset = 0.4 * round as f64;
            let guess = Guess::new(
                Coordinates::new(
                    (subject.coordinates.lat + offset).clamp(-90.0, 90.0),
                    (subject.coordinates.lng - offset).clamp(-180.0, 180.0),
                ),
                subject.year + round as i32 * 2,
            );
            Some(engine.submit_round(guess).await?)
        };

        if let Some(RoundOutcome::Completed { summary, .. }) = outcome {
            info!("Session complete: {} XP", summary.final_xp);
        }
    }

    if let Some(err) = engine.session().last_error() {
        warn!("Last error: {} ({})", err, err.code());
    }
    Ok(())
}
