//! Core primitives.
//!
//! Pure functions over plain values: great-circle distance, scoring
//! curves, and snapshot checksums. Nothing here touches session state.

pub mod geo;
pub mod score;
pub mod hash;

// Re-export core types
pub use geo::{haversine_distance_km, Coordinates};
pub use score::{final_session_score, round_score, FinalScore, RoundScore};
pub use hash::snapshot_checksum;
