//! Final results metrics for a finished (or partially played) session.

use serde::{Deserialize, Serialize};

use crate::game::state::RoundResult;

/// What the results screen shows once a session ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Rounds that have a result.
    pub rounds_played: usize,
    /// Sum of XP earned.
    pub final_xp: u32,
    /// Mean round accuracy.
    pub final_percent: f64,
    /// Mean location score.
    pub location_accuracy: f64,
    /// Mean time score.
    pub time_accuracy: f64,
    /// Hints spent across all rounds.
    pub hints_used: u32,
    /// Every round scored 100%.
    pub is_perfect_game: bool,
    /// Some round had a perfect location score.
    pub location_bullseye: bool,
    /// Some round had the exact year.
    pub year_bullseye: bool,
}

impl SessionSummary {
    /// Summarize a set of round results.
    pub fn from_results(results: &[RoundResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }

        let n = results.len() as f64;
        let mean = |f: fn(&RoundResult) -> u32| {
            results.iter().map(|r| f64::from(f(r))).sum::<f64>() / n
        };

        Self {
            rounds_played: results.len(),
            final_xp: results.iter().fold(0u32, |acc, r| acc.saturating_add(r.xp_earned)),
            final_percent: mean(|r| r.accuracy_percent),
            location_accuracy: mean(|r| r.location_score),
            time_accuracy: mean(|r| r.time_score),
            hints_used: results.iter().map(|r| r.hints_used_this_round).sum(),
            is_perfect_game: results.iter().all(|r| r.accuracy_percent == 100),
            location_bullseye: results.iter().any(|r| r.location_score == 100),
            year_bullseye: results.iter().any(|r| r.time_score == 100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::tests::subject;
    use crate::game::state::Guess;
    use crate::core::geo::Coordinates;

    #[test]
    fn test_empty_summary() {
        assert_eq!(SessionSummary::from_results(&[]), SessionSummary::default());
    }

    #[test]
    fn test_mixed_summary() {
        let a = subject("a", 40.0, -74.0, 1920);
        let b = subject("b", 35.0, 139.0, 1980);

        let perfect = RoundResult::score(0, &a, &Guess::new(a.coordinates, 1920), 0, 20);
        let off = RoundResult::score(1, &b, &Guess::new(Coordinates::new(35.0, 135.0), 1990), 1, 40);
        let summary = SessionSummary::from_results(&[perfect.clone(), off.clone()]);

        assert_eq!(summary.rounds_played, 2);
        assert_eq!(summary.final_xp, perfect.xp_earned + off.xp_earned);
        assert_eq!(summary.hints_used, 1);
        assert!(!summary.is_perfect_game);
        assert!(summary.location_bullseye);
        assert!(summary.year_bullseye);
        let expected = f64::from(perfect.accuracy_percent + off.accuracy_percent) / 2.0;
        assert!((summary.final_percent - expected).abs() < 1e-9);
    }
}
