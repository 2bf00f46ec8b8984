//! Hint Economy
//!
//! Two-tier hint budget (per round, per game) and the hint text shown to
//! the player. Each hint costs XP and accuracy at scoring time.
//!
//! Only `hints_used_total` survives a round reset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::geo::Coordinates;
use crate::game::state::RoundSubject;

/// Maximum hints per round.
pub const HINTS_PER_ROUND: u32 = 2;

/// Maximum hints per game.
pub const HINTS_PER_GAME: u32 = 10;

// =============================================================================
// HINT TYPES & CONTENT
// =============================================================================

/// Kind of hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintType {
    /// Coarse region of the photo.
    Where,
    /// Decade of the photo.
    When,
}

impl HintType {
    /// Every hint type, in display order.
    pub const ALL: [HintType; 2] = [HintType::Where, HintType::When];
}

/// Hint text generated for one subject.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintContent {
    /// Region text.
    pub where_hint: Option<String>,
    /// Decade text.
    pub when_hint: Option<String>,
}

impl HintContent {
    /// Text for a hint type, if available.
    pub fn get(&self, hint: HintType) -> Option<&str> {
        match hint {
            HintType::Where => self.where_hint.as_deref(),
            HintType::When => self.when_hint.as_deref(),
        }
    }
}

/// Derive hint text from a subject's label, coordinates, and year.
pub fn generate_hint_content(subject: &RoundSubject) -> HintContent {
    HintContent {
        where_hint: region_hint(&subject.location_label, subject.coordinates),
        when_hint: decade_hint(subject.year),
    }
}

/// Well-known places, matched against the lowercased location label.
const NAMED_REGIONS: &[(&str, &str)] = &[
    ("berlin", "Central Europe"),
    ("paris", "Western Europe"),
    ("london", "United Kingdom"),
    ("new york", "Eastern United States"),
    ("tokyo", "East Asia"),
    ("sydney", "Australia"),
];

/// Coarse bounding boxes: (name, min_lat, max_lat, min_lng, max_lng).
/// First match wins, so narrower boxes come first.
const REGION_BOXES: &[(&str, f64, f64, f64, f64)] = &[
    ("Western Europe", 35.0, 72.0, -25.0, 5.0),
    ("Central Europe", 35.0, 72.0, 5.0, 20.0),
    ("Eastern Europe", 35.0, 72.0, 20.0, 45.0),
    ("Middle East", 12.0, 42.0, 35.0, 63.0),
    ("North America", 15.0, 84.0, -170.0, -50.0),
    ("South America", -56.0, 15.0, -92.0, -34.0),
    ("Africa", -35.0, 37.0, -18.0, 52.0),
    ("Oceania", -50.0, 0.0, 110.0, 180.0),
    ("South Asia", 5.0, 35.0, 63.0, 92.0),
    ("East Asia", 18.0, 55.0, 92.0, 150.0),
    ("Southeast Asia", -11.0, 18.0, 92.0, 141.0),
    ("Northern Asia", 45.0, 78.0, 45.0, 180.0),
];

fn region_hint(location_label: &str, coords: Coordinates) -> Option<String> {
    let label = location_label.to_lowercase();
    if let Some((_, region)) = NAMED_REGIONS.iter().find(|(needle, _)| label.contains(needle)) {
        return Some((*region).to_string());
    }

    if !coords.is_valid() {
        return None;
    }

    let boxed = REGION_BOXES.iter().find(|(_, min_lat, max_lat, min_lng, max_lng)| {
        (*min_lat..=*max_lat).contains(&coords.lat) && (*min_lng..=*max_lng).contains(&coords.lng)
    });

    Some(match boxed {
        Some((name, ..)) => (*name).to_string(),
        None if coords.lat < 0.0 => "Southern Hemisphere".to_string(),
        None => "Northern Hemisphere".to_string(),
    })
}

fn decade_hint(year: i32) -> Option<String> {
    if year <= 0 {
        return None;
    }
    Some(format!("{}s", year - year.rem_euclid(10)))
}

// =============================================================================
// HINT STATE
// =============================================================================

/// Per-round selection plus per-session counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintState {
    selected: Vec<HintType>,
    content_cache: BTreeMap<String, HintContent>,
    current_subject: Option<String>,
    hints_used_this_round: u32,
    hints_used_total: u32,
    per_game_limit: u32,
}

impl Default for HintState {
    fn default() -> Self {
        Self {
            selected: Vec::new(),
            content_cache: BTreeMap::new(),
            current_subject: None,
            hints_used_this_round: 0,
            hints_used_total: 0,
            per_game_limit: HINTS_PER_GAME,
        }
    }
}

impl HintState {
    /// Fresh state capped at `hints_allowed_per_game` (never above [`HINTS_PER_GAME`]).
    pub fn with_limit(hints_allowed_per_game: u32) -> Self {
        Self {
            per_game_limit: hints_allowed_per_game.min(HINTS_PER_GAME),
            ..Self::default()
        }
    }

    /// Hints spent this round.
    pub fn hints_used_this_round(&self) -> u32 {
        self.hints_used_this_round
    }

    /// Hints spent this session.
    pub fn hints_used_total(&self) -> u32 {
        self.hints_used_total
    }

    /// Effective per-game cap.
    pub fn per_game_limit(&self) -> u32 {
        self.per_game_limit
    }

    /// Hints still available this session.
    pub fn hints_remaining(&self) -> u32 {
        self.per_game_limit.saturating_sub(self.hints_used_total)
    }

    /// Hints selected this round, in selection order.
    pub fn selected_hint_types(&self) -> &[HintType] {
        &self.selected
    }

    /// Whether `hint` was already selected this round.
    pub fn is_selected(&self, hint: HintType) -> bool {
        self.selected.contains(&hint)
    }

    /// Whether both budgets still allow another hint.
    pub fn can_select_hint(&self) -> bool {
        self.hints_used_this_round < HINTS_PER_ROUND && self.hints_used_total < self.per_game_limit
    }

    /// Make `subject` the current round's subject, generating its hint text
    /// once and reusing it afterwards.
    pub fn prepare_round(&mut self, subject: &RoundSubject) {
        self.content_cache
            .entry(subject.id.clone())
            .or_insert_with(|| generate_hint_content(subject));
        self.current_subject = Some(subject.id.clone());
    }

    fn current_content(&self) -> Option<&HintContent> {
        self.current_subject
            .as_ref()
            .and_then(|id| self.content_cache.get(id))
    }

    /// Hint types that could still be selected this round.
    pub fn available_hints(&self) -> Vec<HintType> {
        let Some(content) = self.current_content() else {
            return Vec::new();
        };
        HintType::ALL
            .into_iter()
            .filter(|h| !self.is_selected(*h) && content.get(*h).is_some())
            .collect()
    }

    /// Text of an already-selected hint.
    pub fn hint_content(&self, hint: HintType) -> Option<&str> {
        if !self.is_selected(hint) {
            return None;
        }
        self.current_content().and_then(|c| c.get(hint))
    }

    /// Spend a hint. Returns its text, or `None` with no state change when
    /// a budget is exhausted, the hint was already taken, or no text exists.
    pub fn select_hint(&mut self, hint: HintType) -> Option<String> {
        if !self.can_select_hint() {
            warn!(
                "Hint {:?} rejected: limit reached ({} this round, {}/{} this game)",
                hint, self.hints_used_this_round, self.hints_used_total, self.per_game_limit
            );
            return None;
        }
        if self.is_selected(hint) {
            warn!("Hint {:?} rejected: already selected this round", hint);
            return None;
        }
        let Some(text) = self.current_content().and_then(|c| c.get(hint)).map(str::to_owned) else {
            warn!("Hint {:?} rejected: no content for current subject", hint);
            return None;
        };

        self.selected.push(hint);
        self.hints_used_this_round += 1;
        self.hints_used_total += 1;
        debug!(
            "Hint {:?} selected ({} this round, {} this game)",
            hint, self.hints_used_this_round, self.hints_used_total
        );
        Some(text)
    }

    /// Clear the round's selection and counter. Keeps the session total and
    /// cached text for other subjects.
    pub fn reset_for_new_round(&mut self) {
        self.selected.clear();
        self.hints_used_this_round = 0;
        if let Some(id) = self.current_subject.take() {
            self.content_cache.remove(&id);
        }
    }

    /// Clear everything, keeping only the per-game cap.
    pub fn reset_for_new_session(&mut self) {
        *self = Self::with_limit(self.per_game_limit);
    }

    /// Carry a session total over from a restored snapshot.
    pub(crate) fn restore_total(&mut self, hints_used_total: u32) {
        self.hints_used_total = hints_used_total.min(self.per_game_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::tests::subject;
    use proptest::prelude::*;

    fn prepared(limit: u32) -> HintState {
        let mut state = HintState::with_limit(limit);
        state.prepare_round(&subject("berlin", 52.52, 13.405, 1961));
        state
    }

    #[test]
    fn test_generate_content() {
        let content = generate_hint_content(&subject("berlin", 52.52, 13.405, 1961));
        assert_eq!(content.get(HintType::Where), Some("Central Europe"));
        assert_eq!(content.get(HintType::When), Some("1960s"));

        let content = generate_hint_content(&subject("x", -22.9, -43.2, 1899));
        assert_eq!(content.get(HintType::Where), Some("South America"));
        assert_eq!(content.get(HintType::When), Some("1890s"));

        let content = generate_hint_content(&subject("x", -60.0, -10.0, 1950));
        assert_eq!(content.get(HintType::Where), Some("Southern Hemisphere"));
    }

    #[test]
    fn test_select_increments_both_counters() {
        let mut state = prepared(HINTS_PER_GAME);
        assert_eq!(state.select_hint(HintType::Where).as_deref(), Some("Central Europe"));
        assert_eq!(state.hints_used_this_round(), 1);
        assert_eq!(state.hints_used_total(), 1);
        assert_eq!(state.hint_content(HintType::Where), Some("Central Europe"));
        assert_eq!(state.hint_content(HintType::When), None);
        assert_eq!(state.available_hints(), vec![HintType::When]);
    }

    #[test]
    fn test_same_hint_twice_rejected() {
        let mut state = prepared(HINTS_PER_GAME);
        assert!(state.select_hint(HintType::When).is_some());
        assert!(state.select_hint(HintType::When).is_none());
        assert_eq!(state.hints_used_this_round(), 1);
    }

    #[test]
    fn test_per_round_cap() {
        let mut state = prepared(HINTS_PER_GAME);
        state.select_hint(HintType::Where);
        state.select_hint(HintType::When);
        assert!(!state.can_select_hint());
        assert_eq!(state.hints_used_this_round(), HINTS_PER_ROUND);
    }

    #[test]
    fn test_per_game_cap() {
        let mut state = prepared(1);
        assert!(state.select_hint(HintType::Where).is_some());
        assert!(state.select_hint(HintType::When).is_none());
        assert_eq!(state.hints_remaining(), 0);
    }

    #[test]
    fn test_limit_never_exceeds_game_cap() {
        assert_eq!(HintState::with_limit(50).per_game_limit(), HINTS_PER_GAME);
    }

    #[test]
    fn test_no_content_without_subject() {
        let mut state = HintState::default();
        assert!(state.select_hint(HintType::Where).is_none());
        assert_eq!(state.hints_used_total(), 0);
    }

    #[test]
    fn test_round_reset_keeps_total() {
        let mut state = prepared(HINTS_PER_GAME);
        state.select_hint(HintType::Where);
        state.reset_for_new_round();

        assert_eq!(state.hints_used_this_round(), 0);
        assert_eq!(state.hints_used_total(), 1);
        assert!(state.selected_hint_types().is_empty());
        assert!(state.available_hints().is_empty());
    }

    #[test]
    fn test_session_reset_clears_total() {
        let mut state = prepared(4);
        state.select_hint(HintType::Where);
        state.reset_for_new_session();

        assert_eq!(state.hints_used_total(), 0);
        assert_eq!(state.per_game_limit(), 4);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Select(HintType),
        NextRound,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Select(HintType::Where)),
            Just(Op::Select(HintType::When)),
            Just(Op::NextRound),
        ]
    }

    proptest! {
        #[test]
        fn prop_caps_hold(ops in proptest::collection::vec(op(), 0..200)) {
            let mut state = HintState::with_limit(HINTS_PER_GAME);
            let mut round = 0;
            state.prepare_round(&subject(&format!("s{round}"), 10.0, 10.0, 1950));

            for op in ops {
                match op {
                    Op::Select(hint) => { state.select_hint(hint); }
                    Op::NextRound => {
                        state.reset_for_new_round();
                        round += 1;
                        state.prepare_round(&subject(&format!("s{round}"), 10.0, 10.0, 1950));
                    }
                }
                prop_assert!(state.hints_used_this_round() <= HINTS_PER_ROUND);
                prop_assert!(state.hints_used_total() <= HINTS_PER_GAME);
            }
        }
    }
}
