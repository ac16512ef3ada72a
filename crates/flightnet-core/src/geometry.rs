//! Spatial math for linking, export ordering and distance labels.

use crate::models::Position;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 semi-major axis.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Two positions closer than this (3D) are the same physical location.
pub const BIND_TOLERANCE_M: f64 = 1.0;

/// Arc steps per quadrant used when buffering a line.
const BUFFER_STEPS_PER_QUADRANT: usize = 8;

/// Earth-centred, Earth-fixed Cartesian coordinates in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cartesian3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Cartesian3 {
    pub fn distance(&self, other: &Cartesian3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

fn eccentricity_sq() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

/// Convert a geographic position to WGS84 Earth-centred coordinates.
pub fn to_cartesian(position: &Position) -> Cartesian3 {
    let e2 = eccentricity_sq();
    let lat = position.lat.to_radians();
    let lon = position.lon.to_radians();
    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    Cartesian3 {
        x: (n + position.alt) * lat.cos() * lon.cos(),
        y: (n + position.alt) * lat.cos() * lon.sin(),
        z: (n * (1.0 - e2) + position.alt) * sin_lat,
    }
}

/// Convert WGS84 Earth-centred coordinates back to a geographic position.
pub fn from_cartesian(cartesian: &Cartesian3) -> Position {
    let e2 = eccentricity_sq();
    let lon = cartesian.y.atan2(cartesian.x);
    let p = (cartesian.x * cartesian.x + cartesian.y * cartesian.y).sqrt();

    let mut lat = cartesian.z.atan2(p * (1.0 - e2));
    let mut height = 0.0;
    for _ in 0..6 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let cos_lat = lat.cos();
        height = if cos_lat.abs() > 1e-12 {
            p / cos_lat - n
        } else {
            cartesian.z.abs() / sin_lat.abs() - n * (1.0 - e2)
        };
        lat = cartesian.z.atan2(p * (1.0 - e2 * n / (n + height)));
    }

    Position::new(lon.to_degrees(), lat.to_degrees(), height)
}

/// Straight-line 3D distance between two positions, in meters.
pub fn distance_3d(a: &Position, b: &Position) -> f64 {
    to_cartesian(a).distance(&to_cartesian(b))
}

/// Whether two positions are within [`BIND_TOLERANCE_M`] of each other.
pub fn is_close_to(a: &Position, b: &Position) -> bool {
    distance_3d(a, b) <= BIND_TOLERANCE_M
}

/// Great-circle surface distance in meters (Haversine).
pub fn surface_distance(a: &Position, b: &Position) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Calculate distance between two points in meters using Haversine formula.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

// ==== ENU (East-North-Up) Coordinate Conversion ====

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

pub fn meters_to_lat(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lat(ref_lat_deg).max(1e-9)
}

pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg).max(1e-9)
}

pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `lat`, `lon` - Starting position in degrees
/// * `distance_m` - Distance in meters
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
///
/// # Returns
/// (new_lat, new_lon) in degrees
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Closest point of a two-point line to a query position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// Closest position on the line (altitude 0)
    pub position: Position,
    /// Fraction along the line, 0 at start and 1 at end
    pub fraction: f64,
    /// Horizontal distance from the query position in meters
    pub distance_m: f64,
}

/// Find the nearest point on the line `start`→`end` to `point`.
///
/// Works in a local ENU frame anchored at `start`, which is exact enough for
/// connector-scale distances.
pub fn nearest_point_on_line(point: &Position, start: &Position, end: &Position) -> NearestPoint {
    let ref_lat = start.lat;

    let px = lon_to_meters(point.lon - start.lon, ref_lat);
    let py = lat_to_meters(point.lat - start.lat, ref_lat);
    let sx = lon_to_meters(end.lon - start.lon, ref_lat);
    let sy = lat_to_meters(end.lat - start.lat, ref_lat);

    let seg_len_sq = sx * sx + sy * sy;
    let fraction = if seg_len_sq < 1e-8 {
        0.0
    } else {
        ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0)
    };

    let closest_x = fraction * sx;
    let closest_y = fraction * sy;
    let dx = px - closest_x;
    let dy = py - closest_y;

    NearestPoint {
        position: Position::surface(
            start.lon + meters_to_lon(closest_x, ref_lat),
            start.lat + meters_to_lat(closest_y, ref_lat),
        ),
        fraction,
        distance_m: (dx * dx + dy * dy).sqrt(),
    }
}

/// Build a closed capsule polygon (`[lon, lat]` ring) buffering the line
/// `start`→`end` by `radius_m`.
///
/// Vertices lie on the true buffer boundary, so everything inside the ring is
/// within `radius_m` of the line.
pub fn buffer_line(start: &Position, end: &Position, radius_m: f64) -> Vec<[f64; 2]> {
    let ref_lat = start.lat;
    let ex = lon_to_meters(end.lon - start.lon, ref_lat);
    let ey = lat_to_meters(end.lat - start.lat, ref_lat);
    let heading = if ex.abs() < 1e-9 && ey.abs() < 1e-9 {
        0.0
    } else {
        ey.atan2(ex)
    };

    let half_turn_steps = BUFFER_STEPS_PER_QUADRANT * 2;
    let step = std::f64::consts::PI / half_turn_steps as f64;
    let to_lon_lat = |x: f64, y: f64| -> [f64; 2] {
        [
            start.lon + meters_to_lon(x, ref_lat),
            start.lat + meters_to_lat(y, ref_lat),
        ]
    };

    let mut ring = Vec::with_capacity(2 * (half_turn_steps + 1) + 1);
    // Cap around the end point, sweeping from the right side to the left side.
    for i in 0..=half_turn_steps {
        let angle = heading - std::f64::consts::FRAC_PI_2 + step * i as f64;
        ring.push(to_lon_lat(ex + radius_m * angle.cos(), ey + radius_m * angle.sin()));
    }
    // Cap around the start point, continuing back to the right side.
    for i in 0..=half_turn_steps {
        let angle = heading + std::f64::consts::FRAC_PI_2 + step * i as f64;
        ring.push(to_lon_lat(radius_m * angle.cos(), radius_m * angle.sin()));
    }
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

/// Ray-casting point-in-polygon test over a `[lon, lat]` ring.
pub fn polygon_contains(ring: &[[f64; 2]], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let xi = ring[i][0];
        let yi = ring[i][1];
        let xj = ring[j][0];
        let yj = ring[j][1];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn cartesian_round_trip_preserves_position() {
        let original = Position::new(34.7818, 32.0853, 42.0);
        let back = from_cartesian(&to_cartesian(&original));
        assert!((back.lon - original.lon).abs() < 1e-9);
        assert!((back.lat - original.lat).abs() < 1e-9);
        assert!((back.alt - original.alt).abs() < 1e-3);
    }

    #[test]
    fn distance_3d_matches_surface_distance_for_short_lines() {
        let a = Position::surface(34.78, 32.08);
        let b = Position::surface(34.781, 32.08);
        let chord = distance_3d(&a, &b);
        let arc = surface_distance(&a, &b);
        assert!((chord - arc).abs() < 0.5, "chord {chord} arc {arc}");
    }

    #[test]
    fn close_positions_bind() {
        let a = Position::surface(34.78, 32.08);
        let (lat, lon) = offset_by_bearing(a.lat, a.lon, 0.5, 0.0);
        assert!(is_close_to(&a, &Position::surface(lon, lat)));
        let (lat, lon) = offset_by_bearing(a.lat, a.lon, 5.0, 0.0);
        assert!(!is_close_to(&a, &Position::surface(lon, lat)));
    }

    #[test]
    fn nearest_point_projects_onto_interior() {
        let start = Position::surface(34.0, 32.0);
        let end = Position::surface(34.002, 32.0);
        let (lat, lon) = offset_by_bearing(32.0, 34.001, 20.0, 0.0);
        let nearest = nearest_point_on_line(&Position::surface(lon, lat), &start, &end);

        assert!((nearest.fraction - 0.5).abs() < 0.01);
        assert!((nearest.distance_m - 20.0).abs() < 0.2);
        assert!((nearest.position.lat - 32.0).abs() < 1e-7);
    }

    #[test]
    fn nearest_point_clamps_to_endpoints() {
        let start = Position::surface(34.0, 32.0);
        let end = Position::surface(34.001, 32.0);
        let nearest = nearest_point_on_line(&Position::surface(33.999, 32.0), &start, &end);
        assert_eq!(nearest.fraction, 0.0);
        assert!(nearest.position.same_lon_lat(&start));
    }

    #[test]
    fn buffer_contains_points_within_radius_only() {
        let start = Position::surface(34.0, 32.0);
        let end = Position::surface(34.002, 32.0);
        let ring = buffer_line(&start, &end, 50.0);

        let (lat, lon) = offset_by_bearing(32.0, 34.001, 30.0, 0.0);
        assert!(polygon_contains(&ring, lon, lat));

        let (lat, lon) = offset_by_bearing(32.0, 34.001, 70.0, std::f64::consts::PI);
        assert!(!polygon_contains(&ring, lon, lat));

        // Beyond the end cap.
        let (lat, lon) = offset_by_bearing(32.0, 34.002, 40.0, std::f64::consts::FRAC_PI_2);
        assert!(polygon_contains(&ring, lon, lat));
        let (lat, lon) = offset_by_bearing(32.0, 34.002, 60.0, std::f64::consts::FRAC_PI_2);
        assert!(!polygon_contains(&ring, lon, lat));
    }

    #[test]
    fn buffer_of_zero_length_line_is_a_disc() {
        let point = Position::surface(34.0, 32.0);
        let ring = buffer_line(&point, &point, 10.0);
        assert!(polygon_contains(&ring, 34.0, 32.0));
        let (lat, lon) = offset_by_bearing(32.0, 34.0, 12.0, 1.0);
        assert!(!polygon_contains(&ring, lon, lat));
    }
}
