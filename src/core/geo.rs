//! Geographic Primitives
//!
//! Coordinates, range checks, and great-circle distance.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::{GameError, GameResult};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Southernmost valid latitude.
pub const MIN_LATITUDE: f64 = -90.0;
/// Northernmost valid latitude.
pub const MAX_LATITUDE: f64 = 90.0;
/// Westernmost valid longitude.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Easternmost valid longitude.
pub const MAX_LONGITUDE: f64 = 180.0;

/// Earliest year a photo (or a guess) may carry.
pub const MIN_YEAR: i32 = 1800;

/// Latest valid year: the current calendar year.
pub fn max_year() -> i32 {
    chrono::Utc::now().year()
}

/// A point on the globe in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude, -90..=90.
    pub lat: f64,
    /// Longitude, -180..=180.
    pub lng: f64,
}

impl Coordinates {
    /// Sentinel substituted for a missing guess.
    pub const ORIGIN: Coordinates = Coordinates { lat: 0.0, lng: 0.0 };

    /// Create from latitude and longitude.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (MIN_LATITUDE..=MAX_LATITUDE).contains(&self.lat)
            && (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&self.lng)
    }

    /// Reject out-of-range or non-finite coordinates.
    pub fn validate(&self) -> GameResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(GameError::Validation(format!(
                "coordinates out of range: ({}, {})",
                self.lat, self.lng
            )))
        }
    }

    /// Great-circle distance to another point.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_distance_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Whether a year lies in `MIN_YEAR..=max_year()`.
pub fn is_valid_year(year: i32) -> bool {
    (MIN_YEAR..=max_year()).contains(&year)
}

/// Reject years outside `MIN_YEAR..=max_year()`.
pub fn validate_year(year: i32) -> GameResult<()> {
    if is_valid_year(year) {
        Ok(())
    } else {
        Err(GameError::Validation(format!(
            "year {} outside {}..={}",
            year,
            MIN_YEAR,
            max_year()
        )))
    }
}

/// Haversine great-circle distance in kilometres.
///
/// Inputs are not range-checked here; callers validate first.
pub fn haversine_distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
