//! Scoring Functions
//!
//! Pure, total functions turning distances and year gaps into accuracy
//! percentages and XP. Callers supply finite inputs; outputs are clamped.

use serde::{Deserialize, Serialize};

/// Distance at which location accuracy reaches zero.
///
/// A second call site in older builds used 20 000 km for the same formula;
/// 5 000 km is canonical here, so legacy numbers will not match.
pub const MAX_DISTANCE_KM: f64 = 5000.0;

/// Years of error that halve time accuracy.
pub const TIME_ACCURACY_HALF_LIFE_YEARS: f64 = 10.0;

/// XP deducted per hint used in a round.
pub const HINT_XP_PENALTY: u32 = 30;

/// Accuracy points deducted from each component per hint used in a round.
pub const HINT_ACC_PENALTY: u32 = 30;

/// Accuracy above which the top XP bonus applies.
pub const HIGH_BONUS_THRESHOLD: f64 = 90.0;
/// Accuracy above which the middle XP bonus applies.
pub const MID_BONUS_THRESHOLD: f64 = 75.0;

/// Location accuracy for a guess `distance_km` away: linear falloff to zero
/// at [`MAX_DISTANCE_KM`], clamped to `0..=100`.
pub fn location_accuracy(distance_km: f64) -> f64 {
    (100.0 - distance_km / MAX_DISTANCE_KM * 100.0).clamp(0.0, 100.0)
}

/// Time accuracy for a year guess.
///
/// Halves every [`TIME_ACCURACY_HALF_LIFE_YEARS`] of error. Symmetric in its
/// arguments, 100 at zero difference, and never negative.
pub fn time_accuracy(guess_year: i32, true_year: i32) -> f64 {
    let diff = (i64::from(guess_year) - i64::from(true_year)).unsigned_abs() as f64;
    (100.0 * 0.5_f64.powf(diff / TIME_ACCURACY_HALF_LIFE_YEARS)).clamp(0.0, 100.0)
}

/// Bonus multiplier for an accuracy value.
pub fn bonus_multiplier(accuracy_percent: f64) -> f64 {
    if accuracy_percent > HIGH_BONUS_THRESHOLD {
        1.5
    } else if accuracy_percent > MID_BONUS_THRESHOLD {
        1.25
    } else {
        1.0
    }
}

/// XP for an accuracy value: the accuracy itself times its bonus tier.
pub fn xp_for_accuracy(accuracy_percent: f64) -> u32 {
    let xp = (accuracy_percent * bonus_multiplier(accuracy_percent)).round();
    if xp.is_nan() || xp <= 0.0 {
        0
    } else {
        xp as u32
    }
}

/// XP and accuracy of one round after hint penalties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundScore {
    /// Combined location and time XP less hint XP penalty, floored at 0.
    pub xp: u32,
    /// Mean of the penalised components, rounded, within `0..=100`.
    pub accuracy: u32,
}

/// Combine location and time XP with the hint penalty.
pub fn round_score(location_xp: f64, time_xp: f64, hints_used_this_round: u32) -> RoundScore {
    let hints = f64::from(hints_used_this_round);

    let xp = (location_xp + time_xp - hints * f64::from(HINT_XP_PENALTY)).round();
    let acc_penalty = hints * f64::from(HINT_ACC_PENALTY);
    let accuracy = (((location_xp - acc_penalty) + (time_xp - acc_penalty)) / 2.0)
        .round()
        .clamp(0.0, 100.0);

    RoundScore {
        xp: if xp > 0.0 { xp as u32 } else { 0 },
        accuracy: accuracy as u32,
    }
}

/// Session-level totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    /// Sum of every round's XP.
    pub final_xp: u32,
    /// Mean of every round's accuracy (0 when there are no rounds).
    pub final_percent: f64,
}

/// Sum XP and average accuracy over `(xp, accuracy)` pairs.
pub fn final_session_score<I>(rounds: I) -> FinalScore
where
    I: IntoIterator<Item = (u32, u32)>,
{
    let mut final_xp: u32 = 0;
    let mut accuracy_sum = 0.0;
    let mut count = 0usize;

    for (xp, accuracy) in rounds {
        final_xp = final_xp.saturating_add(xp);
        accuracy_sum += f64::from(accuracy);
        count += 1;
    }

    FinalScore {
        final_xp,
        final_percent: if count == 0 { 0.0 } else { accuracy_sum / count as f64 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_location_accuracy_endpoints() {
        assert_eq!(location_accuracy(0.0), 100.0);
        assert_eq!(location_accuracy(2500.0), 50.0);
        assert_eq!(location_accuracy(MAX_DISTANCE_KM), 0.0);
        assert_eq!(location_accuracy(19_000.0), 0.0);
    }

    #[test]
    fn test_time_accuracy_curve() {
        assert_eq!(time_accuracy(1950, 1950), 100.0);
        assert!((time_accuracy(1960, 1950) - 50.0).abs() < 1e-9);
        assert!((time_accuracy(1970, 1950) - 25.0).abs() < 1e-9);
        assert!(time_accuracy(1800, 2024) > 0.0);
        assert!(time_accuracy(i32::MIN, i32::MAX) >= 0.0);
    }

    #[test]
    fn test_xp_bonus_tiers() {
        assert_eq!(xp_for_accuracy(100.0), 150);
        assert_eq!(xp_for_accuracy(91.0), 137); // 136.5 rounds up
        assert_eq!(xp_for_accuracy(90.0), 113); // 112.5, middle tier
        assert_eq!(xp_for_accuracy(80.0), 100);
        assert_eq!(xp_for_accuracy(75.0), 75);
        assert_eq!(xp_for_accuracy(0.0), 0);
    }

    #[test]
    fn test_round_score_with_hint() {
        let score = round_score(40.0, 40.0, 1);
        assert_eq!(score.xp, 50);
        assert_eq!(score.accuracy, 10);
    }

    #[test]
    fn test_round_score_floors_at_zero() {
        let score = round_score(10.0, 20.0, 2);
        assert_eq!(score.xp, 0);
        assert_eq!(score.accuracy, 0);
    }

    #[test]
    fn test_round_score_perfect() {
        let score = round_score(100.0, 100.0, 0);
        assert_eq!(score.xp, 200);
        assert_eq!(score.accuracy, 100);
    }

    #[test]
    fn test_final_session_score() {
        let score = final_session_score(vec![(150, 100), (50, 10), (0, 0)]);
        assert_eq!(score.final_xp, 200);
        assert!((score.final_percent - 110.0 / 3.0).abs() < 1e-9);

        let empty = final_session_score(Vec::new());
        assert_eq!(empty, FinalScore::default());
    }

    proptest! {
        #[test]
        fn prop_location_accuracy_bounded(d in 0.0f64..1.0e7) {
            let acc = location_accuracy(d);
            prop_assert!((0.0..=100.0).contains(&acc));
        }

        #[test]
        fn prop_location_accuracy_monotonic(a in 0.0f64..30_000.0, b in 0.0f64..30_000.0) {
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(location_accuracy(near) >= location_accuracy(far));
        }

        #[test]
        fn prop_time_accuracy_symmetric(y1 in any::<i32>(), y2 in any::<i32>()) {
            prop_assert_eq!(time_accuracy(y1, y2), time_accuracy(y2, y1));
            prop_assert!((0.0..=100.0).contains(&time_accuracy(y1, y2)));
        }

        #[test]
        fn prop_time_accuracy_exact_year(y in any::<i32>()) {
            prop_assert_eq!(time_accuracy(y, y), 100.0);
        }

        #[test]
        fn prop_round_score_bounded(loc in 0.0f64..=100.0, time in 0.0f64..=100.0, hints in 0u32..=2) {
            let score = round_score(loc, time, hints);
            prop_assert!(score.accuracy <= 100);
            prop_assert!(score.xp <= 200);
        }
    }
}
