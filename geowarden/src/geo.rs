// geowarden/src/geo.rs
//
// Great-circle distance between two WGS84 points.
// NaN or out-of-range input yields NaN ("unknown distance"); callers skip
// distance-based checks when they see it.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

/// Haversine distance in kilometers.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !in_range(lat1, lon1) || !in_range(lat2, lon2) {
        return f64::NAN;
    }

    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: &[(f64, f64)] = &[
        (0.0, 0.0),
        (40.7128, -74.0060),
        (51.5074, -0.1278),
        (-33.8688, 151.2093),
        (89.9, 179.9),
        (-90.0, -180.0),
    ];

    #[test]
    fn identical_points_are_zero_apart() {
        for &(lat, lon) in POINTS {
            assert_eq!(distance_km(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        for &(a_lat, a_lon) in POINTS {
            for &(b_lat, b_lon) in POINTS {
                let ab = distance_km(a_lat, a_lon, b_lat, b_lon);
                let ba = distance_km(b_lat, b_lon, a_lat, a_lon);
                assert!((ab - ba).abs() < 1e-9, "{ab} != {ba}");
            }
        }
    }

    #[test]
    fn new_york_to_london() {
        let d = distance_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((d - 5570.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn invalid_input_is_unknown() {
        assert!(distance_km(f64::NAN, 0.0, 0.0, 0.0).is_nan());
        assert!(distance_km(0.0, 0.0, 91.0, 0.0).is_nan());
        assert!(distance_km(0.0, 181.0, 0.0, 0.0).is_nan());
        assert!(distance_km(0.0, 0.0, 0.0, f64::INFINITY).is_nan());
    }
}
