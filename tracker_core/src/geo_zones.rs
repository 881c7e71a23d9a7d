//! Geographic zones and the operating-area geofence.
//!
//! Every device is pinned to one of three zones by its ordinal index. A zone is
//! a fixed list of hubs (depots) that devices start from and are teleported
//! back to when their random walk leaves the operating area.
//!
//! Coordinates use the `geo` convention: `x` is longitude, `y` is latitude.

use geo::{Coord, Rect};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Southern latitude bound of the operating area (degrees, exclusive).
pub const MIN_LAT: f64 = 5.6;
/// Northern latitude bound of the operating area (degrees, exclusive).
pub const MAX_LAT: f64 = 20.5;
/// Western longitude bound of the operating area (degrees, exclusive).
pub const MIN_LON: f64 = 97.3;
/// Eastern longitude bound of the operating area (degrees, exclusive).
pub const MAX_LON: f64 = 105.6;

const fn hub(lat: f64, lon: f64) -> Coord<f64> {
    Coord { x: lon, y: lat }
}

const NORTH_HUBS: [Coord<f64>; 4] = [
    hub(18.7883, 98.9853),
    hub(19.9105, 99.8406),
    hub(18.7832, 100.7926),
    hub(16.8211, 100.2659),
];

const CENTRAL_HUBS: [Coord<f64>; 4] = [
    hub(13.7563, 100.5018),
    hub(13.3611, 100.9847),
    hub(14.3532, 100.5684),
    hub(12.6114, 102.1039),
];

const SOUTH_HUBS: [Coord<f64>; 4] = [
    hub(7.8804, 98.3923),
    hub(9.1389, 99.3226),
    hub(7.0058, 100.4681),
    hub(8.0863, 98.9063),
];

/// A geographic zone that owns a disjoint set of hubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    North,
    Central,
    South,
}

impl Zone {
    /// Returns all zones in registry order.
    pub fn all() -> [Zone; 3] {
        [Zone::North, Zone::Central, Zone::South]
    }

    /// Maps a device ordinal to its zone.
    ///
    /// 1-70 is North, 71-140 is Central, everything else falls through to South.
    pub fn for_device(index: u32) -> Self {
        match index {
            1..=70 => Zone::North,
            71..=140 => Zone::Central,
            _ => Zone::South,
        }
    }

    /// Returns the zone's hub table. Never empty.
    pub fn hubs(&self) -> &'static [Coord<f64>] {
        match self {
            Zone::North => &NORTH_HUBS,
            Zone::Central => &CENTRAL_HUBS,
            Zone::South => &SOUTH_HUBS,
        }
    }

    /// Picks one of the zone's hubs uniformly at random.
    pub fn random_hub<R: Rng + ?Sized>(&self, rng: &mut R) -> Coord<f64> {
        let hubs = self.hubs();
        // Hub tables are non-empty consts, so the fallback is unreachable.
        *hubs.choose(rng).unwrap_or(&hubs[0])
    }

    /// Returns true if `coord` is exactly one of this zone's hubs.
    pub fn contains_hub(&self, coord: Coord<f64>) -> bool {
        self.hubs().iter().any(|h| *h == coord)
    }

    /// Lowercase zone name for logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Zone::North => "north",
            Zone::Central => "central",
            Zone::South => "south",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The rectangle devices are allowed to roam in.
pub fn operating_area() -> Rect<f64> {
    Rect::new(hub(MIN_LAT, MIN_LON), hub(MAX_LAT, MAX_LON))
}

/// Strict containment test against the operating area.
///
/// Points on the boundary count as outside.
pub fn within_operating_area(coord: Coord<f64>) -> bool {
    let area = operating_area();
    let (min, max) = (area.min(), area.max());
    min.y < coord.y && coord.y < max.y && min.x < coord.x && coord.x < max.x
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_zone_assignment_boundaries() {
        assert_eq!(Zone::for_device(1), Zone::North);
        assert_eq!(Zone::for_device(70), Zone::North);
        assert_eq!(Zone::for_device(71), Zone::Central);
        assert_eq!(Zone::for_device(140), Zone::Central);
        assert_eq!(Zone::for_device(141), Zone::South);
        assert_eq!(Zone::for_device(200), Zone::South);
    }

    #[test]
    fn test_zone_fallthrough_is_south() {
        assert_eq!(Zone::for_device(0), Zone::South);
        assert_eq!(Zone::for_device(999), Zone::South);
    }

    #[test]
    fn test_hubs_inside_operating_area() {
        for zone in Zone::all() {
            assert!(!zone.hubs().is_empty());
            for h in zone.hubs() {
                assert!(within_operating_area(*h), "{zone} hub {h:?} outside area");
            }
        }
    }

    #[test]
    fn test_zones_are_disjoint() {
        for a in Zone::all() {
            for b in Zone::all() {
                if a == b {
                    continue;
                }
                assert!(a.hubs().iter().all(|h| !b.contains_hub(*h)));
            }
        }
    }

    #[test]
    fn test_random_hub_stays_in_zone() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for zone in Zone::all() {
            for _ in 0..50 {
                assert!(zone.contains_hub(zone.random_hub(&mut rng)));
            }
        }
    }

    #[test]
    fn test_random_hub_deterministic_for_seed() {
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(Zone::Central.random_hub(&mut rng1), Zone::Central.random_hub(&mut rng2));
        }
    }

    #[test]
    fn test_boundary_is_outside() {
        assert!(!within_operating_area(hub(MIN_LAT, 100.0)));
        assert!(!within_operating_area(hub(MAX_LAT, 100.0)));
        assert!(!within_operating_area(hub(10.0, MIN_LON)));
        assert!(!within_operating_area(hub(10.0, MAX_LON)));
        assert!(within_operating_area(hub(10.0, 100.0)));
    }
}
