/******************************************************************************
 *                                                                            *
 * Great-circle helpers for anchoring resources to real GPS positions.       *
 * Distance checks, random placement sampling, and minimum-spacing           *
 * validation all go through here. Pure functions, no table access.          *
 *                                                                            *
 ******************************************************************************/

use rand::Rng;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (~111.32 km). Longitude degrees shrink
/// with cos(lat); `offset_by_meters` corrects for that, but the flat
/// conversion is not valid near the poles. Documented limitation.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A WGS-84 coordinate pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        GeoPoint { lat, lng }
    }
}

/// Great-circle (haversine) distance between two points, in meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Offsets `origin` by the given meters north and east using the flat
/// degree conversion. The cos(lat) term is clamped so a pathological
/// polar input cannot divide by zero.
pub fn offset_by_meters(origin: GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let lng_scale = origin.lat.to_radians().cos().max(0.01);
    GeoPoint {
        lat: origin.lat + north_m / METERS_PER_DEGREE,
        lng: origin.lng + east_m / (METERS_PER_DEGREE * lng_scale),
    }
}

/// Samples a random point in the ring around `center`: uniform bearing,
/// radius uniform in [min_radius_m, max_radius_m]. Radii cluster toward
/// the center of the ring rather than being area-uniform; at the few
/// hundred meter scale the spawner uses this is indistinguishable to
/// players.
pub fn random_point_in_annulus(
    rng: &mut impl Rng,
    center: GeoPoint,
    min_radius_m: f64,
    max_radius_m: f64,
) -> GeoPoint {
    let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
    let radius_m = rng.gen_range(min_radius_m..=max_radius_m);
    offset_by_meters(center, radius_m * bearing.cos(), radius_m * bearing.sin())
}

/// True iff `candidate` is at least `min_spacing_m` from every point in
/// `existing`. An empty slice trivially passes.
pub fn far_enough_apart(candidate: GeoPoint, existing: &[GeoPoint], min_spacing_m: f64) -> bool {
    existing
        .iter()
        .all(|p| distance_meters(candidate, *p) >= min_spacing_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SEATTLE: GeoPoint = GeoPoint { lat: 47.6062, lng: -122.3321 };

    #[test]
    fn distance_between_identical_points_is_zero() {
        assert_eq!(distance_meters(SEATTLE, SEATTLE), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = distance_meters(a, b);
        assert!((d - 111_195.0).abs() < 200.0, "got {}", d);
    }

    #[test]
    fn distance_is_symmetric() {
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let d1 = distance_meters(paris, london);
        let d2 = distance_meters(london, paris);
        assert!((d1 - d2).abs() < 1e-6);
        // Known city pair, roughly 343.5 km apart.
        assert!((d1 - 343_500.0).abs() < 3_000.0, "got {}", d1);
    }

    #[test]
    fn offset_round_trips_through_haversine() {
        let p = offset_by_meters(SEATTLE, 100.0, 0.0);
        let d = distance_meters(SEATTLE, p);
        assert!((d - 100.0).abs() < 1.0, "north offset measured {}", d);

        let q = offset_by_meters(SEATTLE, 0.0, 100.0);
        let d = distance_meters(SEATTLE, q);
        assert!((d - 100.0).abs() < 1.0, "east offset measured {}", d);
    }

    #[test]
    fn annulus_samples_stay_inside_the_radius_band() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = random_point_in_annulus(&mut rng, SEATTLE, 40.0, 250.0);
            let d = distance_meters(SEATTLE, p);
            // Small tolerance for the flat-degree conversion error.
            assert!(d >= 39.0 && d <= 252.0, "sample at {} m", d);
        }
    }

    #[test]
    fn degenerate_annulus_pins_the_radius() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let p = random_point_in_annulus(&mut rng, SEATTLE, 75.0, 75.0);
            let d = distance_meters(SEATTLE, p);
            assert!((d - 75.0).abs() < 1.5, "sample at {} m", d);
        }
    }

    #[test]
    fn far_enough_apart_accepts_empty_set() {
        assert!(far_enough_apart(SEATTLE, &[], 25.0));
    }

    #[test]
    fn far_enough_apart_rejects_a_close_neighbor() {
        let near = offset_by_meters(SEATTLE, 10.0, 0.0);
        let far = offset_by_meters(SEATTLE, 0.0, 500.0);
        assert!(!far_enough_apart(SEATTLE, &[far, near], 25.0));
        assert!(far_enough_apart(SEATTLE, &[far], 25.0));
    }
}
