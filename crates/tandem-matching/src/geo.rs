// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Distance and pairing-priority formulas.

use tandem_core::Location;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Pairs farther apart than this are never matched.
pub const MAX_DISTANCE_KM: f64 = 50.0;

const PROXIMITY_WEIGHT: f64 = 0.4;
const SIMILARITY_WEIGHT: f64 = 0.4;
const JITTER_WEIGHT: f64 = 0.2;

/// Great-circle distance between two points, in kilometres.
pub fn distance_km(a: Location, b: Location) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + a.lat.to_radians().cos()
            * b.lat.to_radians().cos()
            * (d_lon / 2.0).sin()
            * (d_lon / 2.0).sin();

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Whether two users are close enough to be paired.
pub fn within_range(distance_km: f64) -> bool {
    distance_km <= MAX_DISTANCE_KM
}

/// Pairing priority: proximity and engagement similarity, plus a random
/// exploration term. `jitter` must be drawn fresh for every evaluation.
pub fn priority(distance_km: f64, score_a: f64, score_b: f64, jitter: f64) -> f64 {
    let proximity = 1.0 - distance_km / MAX_DISTANCE_KM;
    let similarity = 1.0 - (score_a - score_b).abs() / 100.0;
    PROXIMITY_WEIGHT * proximity + SIMILARITY_WEIGHT * similarity + JITTER_WEIGHT * jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loc(lat: f64, lon: f64) -> Location {
        Location { lat, lon }
    }

    #[test]
    fn known_distance() {
        let d = distance_km(loc(40.0, -74.0), loc(40.3, -74.2));
        assert!((d - 37.44).abs() < 0.01, "got {d}");
        assert!(within_range(d));
    }

    #[test]
    fn zero_distance_for_same_point() {
        assert_eq!(distance_km(loc(51.5, -0.12), loc(51.5, -0.12)), 0.0);
    }

    #[test]
    fn antipodes_are_half_circumference() {
        let d = distance_km(loc(0.0, 0.0), loc(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn priority_extremes() {
        assert_eq!(priority(0.0, 50.0, 50.0, 0.0), 0.8);
        assert!((priority(50.0, 0.0, 100.0, 0.0)).abs() < 1e-12);
        assert!((priority(0.0, 70.0, 70.0, 0.999) - 0.9998).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn distance_is_symmetric_and_non_negative(
            a_lat in -90.0f64..=90.0, a_lon in -180.0f64..=180.0,
            b_lat in -90.0f64..=90.0, b_lon in -180.0f64..=180.0,
        ) {
            let (a, b) = (loc(a_lat, a_lon), loc(b_lat, b_lon));
            let ab = distance_km(a, b);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - distance_km(b, a)).abs() < 1e-6);
        }

        #[test]
        fn in_range_priority_is_bounded(
            d in 0.0f64..=MAX_DISTANCE_KM,
            sa in 0.0f64..=100.0, sb in 0.0f64..=100.0,
            j in 0.0f64..1.0,
        ) {
            let p = priority(d, sa, sb, j);
            prop_assert!((0.0..1.0 + 1e-12).contains(&p));
        }
    }
}
