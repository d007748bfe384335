use crate::error::PredictionError;
use crate::models::GeoPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = (sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon).min(1.0);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Along-route distance from `a` to `p`, scaling the straight-line ratio
/// `|ap| / |ab|` by the known route length of the segment.
///
/// The ratio is not clamped: a point past `b` yields more than `total_ab`.
/// Coincident `a` and `b` yield 0.
pub fn distance_along_route(a: GeoPoint, b: GeoPoint, p: GeoPoint, total_ab: f64) -> f64 {
    let straight_ab = haversine_m(a, b);
    if straight_ab == 0.0 {
        return 0.0;
    }
    let ratio = haversine_m(a, p) / straight_ab;
    ratio * total_ab
}

/// Linear interpolation of coordinates for `target` within `[dist_a, dist_b]`.
pub fn interpolate_point(
    a: GeoPoint,
    dist_a: f64,
    b: GeoPoint,
    dist_b: f64,
    target: f64,
) -> Result<GeoPoint, PredictionError> {
    if !(dist_a <= target && target <= dist_b) {
        return Err(PredictionError::OutOfRange {
            target,
            start: dist_a,
            end: dist_b,
        });
    }
    if dist_a == dist_b {
        return Ok(a);
    }

    let fraction = (target - dist_a) / (dist_b - dist_a);
    Ok(a.interpolate(b, fraction))
}

/// Finds the two consecutive entries of an ascending table that surround `target`.
///
/// A target equal to the first entry returns that entry twice; an exact
/// interior match at `i` returns `(table[i - 1], table[i])`.
pub fn find_surrounding_distances(
    table: &[f64],
    target: f64,
) -> Result<(f64, f64), PredictionError> {
    let (Some(&min), Some(&max)) = (table.first(), table.last()) else {
        return Err(PredictionError::OutOfRouteRange {
            target,
            min: f64::NAN,
            max: f64::NAN,
        });
    };
    if !(min <= target && target <= max) {
        return Err(PredictionError::OutOfRouteRange { target, min, max });
    }

    let idx = table.partition_point(|d| *d < target);
    if idx == 0 {
        return Ok((min, min));
    }
    Ok((table[idx - 1], table[idx]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn madrid() -> GeoPoint {
        GeoPoint::new(40.4168, -3.7038)
    }

    #[test]
    fn test_haversine_same_point() {
        assert_eq!(haversine_m(madrid(), madrid()), 0.0);
    }

    #[test]
    fn test_haversine_symmetry() {
        let a = madrid();
        let b = GeoPoint::new(40.4530, -3.6883);
        assert_eq!(haversine_m(a, b), haversine_m(b, a));
    }

    #[test]
    fn test_haversine_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let expected = EARTH_RADIUS_M * 1f64.to_radians();
        assert!((haversine_m(a, b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Puerta del Sol to Santiago Bernabeu, roughly 4.2 km.
        let sol = GeoPoint::new(40.4169, -3.7035);
        let bernabeu = GeoPoint::new(40.4531, -3.6883);
        let d = haversine_m(sol, bernabeu);
        assert!((4_000.0..4_400.0).contains(&d), "got {d}");
    }

    #[test]
    fn distance_along_route_scales_by_route_length() {
        let a = GeoPoint::new(40.0, -3.7);
        let b = GeoPoint::new(40.002, -3.7);
        let p = GeoPoint::new(40.001, -3.7);
        // Route is longer than the chord (e.g. a curve), half the chord is half the route.
        let d = distance_along_route(a, b, p, 300.0);
        assert!((d - 150.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn distance_along_route_coincident_endpoints_is_zero() {
        let a = madrid();
        let p = GeoPoint::new(40.5, -3.6);
        assert_eq!(distance_along_route(a, a, p, 120.0), 0.0);
    }

    #[test]
    fn distance_along_route_is_not_clamped_past_segment_end() {
        let a = GeoPoint::new(40.0, -3.7);
        let b = GeoPoint::new(40.001, -3.7);
        let beyond = GeoPoint::new(40.0015, -3.7);
        let d = distance_along_route(a, b, beyond, 100.0);
        assert!((d - 150.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn interpolate_identity_on_zero_span() {
        let a = madrid();
        let b = GeoPoint::new(41.0, -3.0);
        assert_eq!(interpolate_point(a, 10.0, b, 10.0, 10.0).unwrap(), a);
    }

    #[test]
    fn interpolate_endpoints() {
        let a = GeoPoint::new(40.0, -3.7);
        let b = GeoPoint::new(40.01, -3.69);
        assert_eq!(interpolate_point(a, 100.0, b, 250.0, 100.0).unwrap(), a);
        assert_eq!(interpolate_point(a, 100.0, b, 250.0, 250.0).unwrap(), b);
    }

    #[test]
    fn interpolate_midpoint() {
        let a = GeoPoint::new(40.0, -3.0);
        let b = GeoPoint::new(42.0, -5.0);
        let mid = interpolate_point(a, 0.0, b, 200.0, 100.0).unwrap();
        assert!((mid.lat - 41.0).abs() < 1e-12);
        assert!((mid.lon + 4.0).abs() < 1e-12);
    }

    #[test]
    fn interpolate_rejects_target_outside_span() {
        let a = madrid();
        let err = interpolate_point(a, 0.0, a, 10.0, 10.5).unwrap_err();
        assert!(matches!(err, PredictionError::OutOfRange { .. }));
        let err = interpolate_point(a, 0.0, a, 10.0, -0.5).unwrap_err();
        assert!(matches!(err, PredictionError::OutOfRange { .. }));
    }

    #[test]
    fn surrounding_distances_bracket_target() {
        let table = [0.0, 50.0, 120.0, 300.0];
        assert_eq!(find_surrounding_distances(&table, 80.0).unwrap(), (50.0, 120.0));
    }

    #[test]
    fn surrounding_distances_edges() {
        let table = [0.0, 50.0, 120.0, 300.0];
        assert_eq!(find_surrounding_distances(&table, 0.0).unwrap(), (0.0, 0.0));
        assert_eq!(find_surrounding_distances(&table, 50.0).unwrap(), (0.0, 50.0));
        assert_eq!(find_surrounding_distances(&table, 300.0).unwrap(), (120.0, 300.0));
    }

    #[test]
    fn surrounding_distances_out_of_range() {
        let table = [0.0, 50.0, 120.0, 300.0];
        assert!(matches!(
            find_surrounding_distances(&table, 300.1),
            Err(PredictionError::OutOfRouteRange { .. })
        ));
        assert!(matches!(
            find_surrounding_distances(&table, -1.0),
            Err(PredictionError::OutOfRouteRange { .. })
        ));
        assert!(matches!(
            find_surrounding_distances(&[], 0.0),
            Err(PredictionError::OutOfRouteRange { .. })
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_point() -> impl Strategy<Value = GeoPoint> {
            (-90.0..=90.0, -180.0..=180.0).prop_map(|(lat, lon)| GeoPoint::new(lat, lon))
        }

        fn short_segment() -> impl Strategy<Value = (GeoPoint, GeoPoint)> {
            (-60.0..60.0, -170.0..170.0, -0.01..0.01, -0.01..0.01).prop_map(
                |(lat, lon, dlat, dlon): (f64, f64, f64, f64)| {
                    (GeoPoint::new(lat, lon), GeoPoint::new(lat + dlat, lon + dlon))
                },
            )
        }

        proptest! {
            #[test]
            fn prop_haversine_symmetric(a in valid_point(), b in valid_point()) {
                prop_assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
            }

            #[test]
            fn prop_haversine_same_point_is_zero(p in valid_point()) {
                prop_assert_eq!(haversine_m(p, p), 0.0);
            }

            #[test]
            fn prop_haversine_bounded_by_half_circumference(a in valid_point(), b in valid_point()) {
                let d = haversine_m(a, b);
                prop_assert!(d >= 0.0);
                prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1.0);
            }

            #[test]
            fn prop_distance_along_route_within_segment(
                (a, b) in short_segment(),
                t in 0.0..=1.0f64,
                route_len in 1.0..5_000.0f64,
            ) {
                prop_assume!(haversine_m(a, b) > 1.0);
                let p = a.interpolate(b, t);
                let d = distance_along_route(a, b, p, route_len);
                prop_assert!(d >= 0.0);
                prop_assert!(d <= route_len * (1.0 + 1e-9), "{} > {}", d, route_len);
            }

            #[test]
            fn prop_interpolated_point_stays_within_bounds(
                (a, b) in short_segment(),
                dist_a in 0.0..1_000.0f64,
                span in 0.0..1_000.0f64,
                t in 0.0..=1.0f64,
            ) {
                let dist_b = dist_a + span;
                let target = (dist_a + span * t).min(dist_b);
                let p = interpolate_point(a, dist_a, b, dist_b, target).unwrap();
                prop_assert!(p.lat >= a.lat.min(b.lat) - 1e-12 && p.lat <= a.lat.max(b.lat) + 1e-12);
                prop_assert!(p.lon >= a.lon.min(b.lon) - 1e-12 && p.lon <= a.lon.max(b.lon) + 1e-12);
            }

            #[test]
            fn prop_surrounding_distances_bracket(
                mut table in prop::collection::vec(0.0..10_000.0f64, 2..30),
                t in 0.0..=1.0f64,
            ) {
                table.sort_by(|a, b| a.total_cmp(b));
                let min = table[0];
                let max = table[table.len() - 1];
                let target = (min + (max - min) * t).min(max);
                let (lo, hi) = find_surrounding_distances(&table, target).unwrap();
                prop_assert!(lo <= target && target <= hi);
            }
        }
    }
}
