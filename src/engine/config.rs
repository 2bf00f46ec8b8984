//! Engine Configuration
//!
//! Global settings come from the settings collaborator (or environment);
//! per-session overrides are resolved against them once, at session start.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GameError, GameResult};
use crate::game::hint::HINTS_PER_GAME;
use crate::game::reducer::SessionParams;
use crate::game::state::GameMode;
use crate::DEFAULT_ROUNDS_PER_GAME;

/// Default round timer (seconds).
pub const DEFAULT_TIMER_SECONDS: u32 = 180;

/// Global game settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Round timer budget (seconds).
    pub timer_seconds: u32,
    /// Hints allowed per game.
    pub hints_per_game: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            timer_seconds: DEFAULT_TIMER_SECONDS,
            hints_per_game: HINTS_PER_GAME,
        }
    }
}

impl GameSettings {
    /// Create settings from environment variables.
    ///
    /// Reads `GH_TIMER_SECONDS` and `GH_HINTS_PER_GAME`; missing or
    /// unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timer_seconds: env_u32("GH_TIMER_SECONDS").unwrap_or(defaults.timer_seconds),
            hints_per_game: env_u32("GH_HINTS_PER_GAME").unwrap_or(defaults.hints_per_game),
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a non-negative integer", key, raw);
            None
        }
    }
}

/// Per-session start options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Rounds to play.
    pub rounds: usize,
    /// Timer override; `None` uses the global setting.
    pub timer_seconds: Option<u32>,
    /// Hint allowance override; `None` uses the global setting.
    pub hints_per_game: Option<u32>,
    /// Play mode.
    pub mode: GameMode,
    /// Room for multiplayer sessions.
    pub room_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS_PER_GAME,
            timer_seconds: None,
            hints_per_game: None,
            mode: GameMode::Solo,
            room_id: None,
        }
    }
}

impl SessionConfig {
    /// Multiplayer session in the given room.
    pub fn multi(room_id: impl Into<String>) -> Self {
        Self {
            mode: GameMode::Multi,
            room_id: Some(room_id.into()),
            ..Self::default()
        }
    }

    /// Merge with global settings into the values the session keeps.
    ///
    /// A zero timer is a configuration error; a hint allowance above
    /// [`HINTS_PER_GAME`] is clamped.
    pub fn resolve(&self, settings: &GameSettings) -> GameResult<SessionParams> {
        if self.rounds == 0 {
            return Err(GameError::Validation("a session needs at least one round".into()));
        }
        let round_timer_seconds = self.timer_seconds.unwrap_or(settings.timer_seconds);
        if round_timer_seconds == 0 {
            return Err(GameError::Validation("round timer must be positive".into()));
        }
        if self.mode == GameMode::Multi && self.room_id.as_deref().map_or(true, str::is_empty) {
            return Err(GameError::Validation("multiplayer sessions need a room id".into()));
        }

        let requested_hints = self.hints_per_game.unwrap_or(settings.hints_per_game);
        let hints_allowed_per_game = requested_hints.min(HINTS_PER_GAME);
        if hints_allowed_per_game < requested_hints {
            warn!(
                "Hint allowance {} exceeds game cap, using {}",
                requested_hints, hints_allowed_per_game
            );
        }

        Ok(SessionParams {
            rounds: self.rounds,
            hints_allowed_per_game,
            round_timer_seconds,
            mode: self.mode,
            room_id: self.room_id.clone(),
        })
    }
}
