//! Round Timer
//!
//! Countdown driven by explicit `tick` calls. Reaching zero while running
//! expires the timer and fires the timeout handler exactly once.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timer lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerState {
    /// Never started.
    #[default]
    Idle,
    /// Counting down.
    Running,
    /// Holding its remaining time.
    Paused,
    /// Reached zero; the timeout has fired.
    Expired,
}

/// Outcome of one `tick`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerTick {
    /// Not running; nothing happened.
    Inactive,
    /// Still counting.
    Running {
        /// Seconds left.
        remaining: u32,
    },
    /// Hit zero on this tick. Returned once per expiry.
    Expired,
}

type TimeoutHandler = Box<dyn FnMut() + Send>;

/// Per-round countdown.
pub struct RoundTimer {
    state: TimerState,
    duration_seconds: u32,
    remaining_seconds: u32,
    on_timeout: Option<TimeoutHandler>,
}

impl RoundTimer {
    /// Idle timer with no handler.
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            duration_seconds: 0,
            remaining_seconds: 0,
            on_timeout: None,
        }
    }

    /// Attach a callback run when the timer expires.
    pub fn with_timeout_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_timeout = Some(Box::new(handler));
        self
    }

    /// Current state.
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Seconds left.
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Seconds consumed since the last start or reset.
    pub fn elapsed_seconds(&self) -> u32 {
        self.duration_seconds.saturating_sub(self.remaining_seconds)
    }

    /// Whether the timer is counting down.
    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Whether the timer has expired.
    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Start a fresh countdown.
    pub fn start(&mut self, seconds: u32) {
        self.duration_seconds = seconds;
        self.remaining_seconds = seconds;
        self.state = TimerState::Running;
    }

    /// Hold the remaining time.
    pub fn pause(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
        }
    }

    /// Continue from the held remaining time.
    pub fn resume(&mut self) {
        if self.state == TimerState::Paused {
            self.state = TimerState::Running;
        }
    }

    /// Reload with `seconds` and clear expiry. An idle timer stays idle.
    pub fn reset(&mut self, seconds: u32) {
        self.duration_seconds = seconds;
        self.remaining_seconds = seconds;
        if self.state != TimerState::Idle {
            self.state = TimerState::Running;
        }
    }

    /// Return to idle without firing.
    pub fn stop(&mut self) {
        self.state = TimerState::Idle;
    }

    /// Advance by `elapsed_seconds`.
    pub fn tick(&mut self, elapsed_seconds: u32) -> TimerTick {
        if self.state != TimerState::Running {
            return TimerTick::Inactive;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(elapsed_seconds);
        if self.remaining_seconds > 0 {
            return TimerTick::Running { remaining: self.remaining_seconds };
        }

        self.state = TimerState::Expired;
        if let Some(handler) = self.on_timeout.as_mut() {
            handler();
        }
        TimerTick::Expired
    }
}

impl Default for RoundTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RoundTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundTimer")
            .field("state", &self.state)
            .field("duration_seconds", &self.duration_seconds)
            .field("remaining_seconds", &self.remaining_seconds)
            .field("has_handler", &self.on_timeout.is_some())
            .finish()
    }
}
