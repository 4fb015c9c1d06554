//! Geodesic helpers and Web-Mercator tile math.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, shared by all distance computations.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in meters between two coordinates.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = lat1.to_radians();
    let p2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Length in meters of a polyline, summed over adjacent pairs.
pub fn polyline_length_m(points: &[Coord]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
        .sum()
}

/// Project `p` onto the segment `a`..`b` using planar geometry in
/// (lon, lat) space. Adequate for the short tile-local segments this
/// engine deals with. Returns the clamped parameter `t` in [0, 1] and
/// the projected coordinate.
pub fn project_onto_segment(p: Coord, a: Coord, b: Coord) -> (f64, Coord) {
    let dx = b.lon - a.lon;
    let dy = b.lat - a.lat;
    let len2 = dx * dx + dy * dy;
    if len2 <= 0.0 {
        return (0.0, a);
    }
    let t = (((p.lon - a.lon) * dx + (p.lat - a.lat) * dy) / len2).clamp(0.0, 1.0);
    let proj = Coord::new(a.lat + t * dy, a.lon + t * dx);
    (t, proj)
}

/// Web-Mercator slippy-tile key for a coordinate at zoom `z`.
/// Out-of-range results are clamped to the valid tile grid.
pub fn tile_key_for(lat: f64, lon: f64, z: u32) -> (u32, u32) {
    let lat_rad = lat.to_radians();
    let n = 1i64 << z;
    let mut x = ((lon + 180.0) / 360.0 * n as f64).floor() as i64;
    let mut y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
        * n as f64)
        .floor() as i64;
    x = x.clamp(0, n - 1);
    y = y.clamp(0, n - 1);
    (x as u32, y as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // One microdegree-grid step of 0.001 deg longitude at 47N is ~75.8m.
        let d = haversine_distance(47.0, 9.0, 47.0, 9.001);
        assert!((d - 75.8).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_distance(47.0, 9.0, 47.0, 9.0), 0.0);
    }

    #[test]
    fn test_projection_clamps_to_endpoints() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(0.0, 1.0);

        let (t, proj) = project_onto_segment(Coord::new(0.5, -1.0), a, b);
        assert_eq!(t, 0.0);
        assert_eq!(proj, a);

        let (t, proj) = project_onto_segment(Coord::new(0.5, 2.0), a, b);
        assert_eq!(t, 1.0);
        assert_eq!(proj, b);
    }

    #[test]
    fn test_projection_midpoint() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(0.0, 1.0);
        let (t, proj) = project_onto_segment(Coord::new(0.25, 0.5), a, b);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((proj.lon - 0.5).abs() < 1e-12);
        assert_eq!(proj.lat, 0.0);
    }

    #[test]
    fn test_projection_degenerate_segment() {
        let a = Coord::new(1.0, 1.0);
        let (t, proj) = project_onto_segment(Coord::new(2.0, 2.0), a, a);
        assert_eq!(t, 0.0);
        assert_eq!(proj, a);
    }

    #[test]
    fn test_tile_key_reference_point() {
        // Same formula as the tile builder: (47.0, 9.0) at z14.
        let (x, y) = tile_key_for(47.0, 9.0, 14);
        assert_eq!((x, y), (8601, 5762));
    }

    #[test]
    fn test_tile_key_clamped_at_poles() {
        let (_, y) = tile_key_for(89.9, 0.0, 14);
        assert_eq!(y, 0);
        let (_, y) = tile_key_for(-89.9, 0.0, 14);
        assert_eq!(y, (1 << 14) - 1);
    }
}
