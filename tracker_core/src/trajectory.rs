//! Trajectory simulator - constrained random walk with geofence teleport.
//!
//! Each tick perturbs speed and course, projects the position forward using a
//! flat 111 km/degree approximation, and teleports the device back to one of
//! its zone's hubs if the projection leaves the operating area.

use crate::geo_zones::{within_operating_area, Zone};
use geo::Coord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest simulated speed (km/h).
pub const MIN_SPEED_KMH: f64 = 60.0;
/// Highest simulated speed (km/h).
pub const MAX_SPEED_KMH: f64 = 140.0;
/// Maximum per-tick speed change (km/h).
pub const SPEED_JITTER_KMH: f64 = 5.0;
/// Maximum per-tick heading change (degrees).
pub const COURSE_JITTER_DEG: f64 = 10.0;
/// Flat-earth conversion used for projection.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Kinematic state of a single simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Heading in degrees, [0, 360)
    pub course: f64,

    /// Speed in km/h, [60, 140]
    pub speed: f64,

    /// Total distance travelled in meters
    pub odometer: f64,
}

impl KinematicState {
    /// Initial state for a freshly launched device parked at `hub`.
    pub fn parked_at(hub: Coord<f64>) -> Self {
        Self {
            latitude: hub.y,
            longitude: hub.x,
            course: 0.0,
            speed: 100.0,
            odometer: 50_000.0,
        }
    }

    /// Position as a `geo` coordinate.
    pub fn position(&self) -> Coord<f64> {
        Coord { x: self.longitude, y: self.latitude }
    }

    /// Advances this state in place and accumulates the distance into the odometer.
    ///
    /// Returns the distance covered this tick in meters.
    pub fn advance_in_place<R: Rng + ?Sized>(
        &mut self,
        zone: Zone,
        interval: Duration,
        rng: &mut R,
    ) -> f64 {
        let step = advance(self, zone, interval, rng);
        let odometer = self.odometer + step.distance_m;
        *self = KinematicState { odometer, ..step.state };
        step.distance_m
    }
}

/// Result of a single trajectory tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Next state. The odometer is carried over unchanged.
    pub state: KinematicState,

    /// Distance covered this tick in meters (0 on teleport)
    pub distance_m: f64,

    /// True if the geofence sent the device back to a hub
    pub teleported: bool,
}

/// Normalizes a heading into [0, 360).
pub fn normalize_course(course: f64) -> f64 {
    let c = course.rem_euclid(360.0);
    // rem_euclid can round a tiny negative up to exactly 360.0
    if c >= 360.0 {
        0.0
    } else {
        c
    }
}

/// Computes the next kinematic state for one tick of `interval`.
pub fn advance<R: Rng + ?Sized>(
    state: &KinematicState,
    zone: Zone,
    interval: Duration,
    rng: &mut R,
) -> Step {
    let speed = (state.speed + rng.gen_range(-SPEED_JITTER_KMH..=SPEED_JITTER_KMH))
        .clamp(MIN_SPEED_KMH, MAX_SPEED_KMH);
    let course = normalize_course(
        state.course + rng.gen_range(-COURSE_JITTER_DEG..=COURSE_JITTER_DEG),
    );

    let distance_km = speed * interval.as_secs_f64() / 3600.0;
    let degrees = distance_km / KM_PER_DEGREE;
    let heading = course.to_radians();
    let next = Coord {
        x: state.longitude + degrees * heading.sin(),
        y: state.latitude + degrees * heading.cos(),
    };

    if !within_operating_area(next) {
        let hub = zone.random_hub(rng);
        return Step {
            state: KinematicState {
                latitude: hub.y,
                longitude: hub.x,
                course: rng.gen_range(0.0..360.0),
                speed,
                odometer: state.odometer,
            },
            distance_m: 0.0,
            teleported: true,
        };
    }

    Step {
        state: KinematicState {
            latitude: next.y,
            longitude: next.x,
            course,
            speed,
            odometer: state.odometer,
        },
        distance_m: distance_km * 1000.0,
        teleported: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TICK: Duration = Duration::from_secs(29);

    #[test]
    fn test_parked_state_defaults() {
        let hub = Zone::Central.hubs()[0];
        let state = KinematicState::parked_at(hub);
        assert_eq!(state.latitude, 13.7563);
        assert_eq!(state.longitude, 100.5018);
        assert_eq!(state.course, 0.0);
        assert_eq!(state.speed, 100.0);
        assert_eq!(state.odometer, 50_000.0);
    }

    #[test]
    fn test_distance_matches_speed_and_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let state = KinematicState::parked_at(Zone::Central.hubs()[0]);
        let step = advance(&state, Zone::Central, TICK, &mut rng);

        assert!(!step.teleported);
        assert_relative_eq!(
            step.distance_m,
            step.state.speed * 29.0 / 3600.0 * 1000.0,
            epsilon = 1e-9
        );

        let moved_deg = ((step.state.latitude - state.latitude).powi(2)
            + (step.state.longitude - state.longitude).powi(2))
        .sqrt();
        assert_relative_eq!(moved_deg * KM_PER_DEGREE * 1000.0, step.distance_m, epsilon = 1e-6);
    }

    #[test]
    fn test_geofence_teleports_to_own_zone_hub() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        // Hugging the northern edge and heading north: the projection must leave.
        let state = KinematicState {
            latitude: 20.4999,
            longitude: 100.0,
            course: 0.0,
            speed: 140.0,
            odometer: 1234.0,
        };

        for _ in 0..20 {
            let step = advance(&state, Zone::South, TICK, &mut rng);
            assert!(step.teleported);
            assert!(Zone::South.contains_hub(step.state.position()));
            assert_eq!(step.distance_m, 0.0);
            assert_eq!(step.state.odometer, 1234.0);
            assert!((0.0..360.0).contains(&step.state.course));
            assert!((MIN_SPEED_KMH..=MAX_SPEED_KMH).contains(&step.state.speed));
        }
    }

    #[test]
    fn test_advance_in_place_accumulates_odometer() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut state = KinematicState::parked_at(Zone::North.hubs()[1]);
        let mut last = state.odometer;
        for _ in 0..500 {
            let d = state.advance_in_place(Zone::North, TICK, &mut rng);
            assert!(d >= 0.0);
            assert_relative_eq!(state.odometer, last + d, epsilon = 1e-6);
            assert!(state.odometer >= last);
            assert!(within_operating_area(state.position()));
            last = state.odometer;
        }
    }

    #[test]
    fn test_normalize_course_edges() {
        assert_eq!(normalize_course(0.0), 0.0);
        assert_eq!(normalize_course(360.0), 0.0);
        assert_eq!(normalize_course(-10.0), 350.0);
        assert_eq!(normalize_course(725.0), 5.0);
        assert!(normalize_course(-1e-20) < 360.0);
    }

    proptest! {
        #[test]
        fn prop_speed_and_course_stay_bounded(
            speed in 55.0f64..=145.0,
            course in -1000.0f64..1000.0,
            seed in any::<u64>(),
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let state = KinematicState {
                latitude: 13.7563,
                longitude: 100.5018,
                course,
                speed,
                odometer: 0.0,
            };
            let step = advance(&state, Zone::Central, TICK, &mut rng);
            prop_assert!(step.state.speed >= MIN_SPEED_KMH && step.state.speed <= MAX_SPEED_KMH);
            prop_assert!(step.state.course >= 0.0 && step.state.course < 360.0);
            prop_assert!(step.distance_m >= 0.0);
        }

        #[test]
        fn prop_outside_projection_lands_on_hub(
            lat in 25.0f64..40.0,
            lon in 110.0f64..120.0,
            seed in any::<u64>(),
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let state = KinematicState { latitude: lat, longitude: lon, course: 0.0, speed: 100.0, odometer: 10.0 };
            let step = advance(&state, Zone::North, TICK, &mut rng);
            prop_assert!(step.teleported);
            prop_assert!(Zone::North.contains_hub(step.state.position()));
            prop_assert_eq!(step.distance_m, 0.0);
        }
    }
}
