//! Point-to-edge snapping.
//!
//! Projects a free-form coordinate onto the nearest edge segment in a
//! tile. Projection is planar in (lon, lat) space per segment, but the
//! ranking distance is geodesic, so "nearest" means nearest on the
//! sphere. Ties keep the first edge/segment encountered.

use crate::geo::{haversine_distance, polyline_length_m, project_onto_segment, Coord};
use crate::tile::TileView;

/// Result of snapping a point onto an edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSnap {
    /// Index of the snapped edge within the tile.
    pub edge: u32,
    /// Index of the shape segment the projection lies on.
    pub segment: u32,
    /// Parametric position within that segment, in [0, 1].
    pub t: f64,
    /// Fraction of the edge's total length before the projection.
    pub fraction: f64,
    /// The projected coordinate.
    pub point: Coord,
    /// Great-circle distance from the query point to the projection.
    pub distance_m: f64,
}

/// Snap `(lat, lon)` to the nearest edge segment in the tile. Returns
/// `None` when the tile has no edges.
pub fn snap_to_edge(view: &TileView, lat: f64, lon: f64) -> Option<EdgeSnap> {
    let query = Coord::new(lat, lon);
    let mut best: Option<EdgeSnap> = None;
    let mut shape: Vec<Coord> = Vec::new();

    for k in 0..view.edge_count() {
        shape.clear();
        view.append_edge_shape(k, &mut shape, false);
        for (s, pair) in shape.windows(2).enumerate() {
            let (t, proj) = project_onto_segment(query, pair[0], pair[1]);
            let distance_m = haversine_distance(query.lat, query.lon, proj.lat, proj.lon);
            if best.map_or(true, |b| distance_m < b.distance_m) {
                best = Some(EdgeSnap {
                    edge: k as u32,
                    segment: s as u32,
                    t,
                    fraction: 0.0,
                    point: proj,
                    distance_m,
                });
            }
        }
    }

    let mut snap = best?;
    shape.clear();
    view.append_edge_shape(snap.edge as usize, &mut shape, false);
    snap.fraction = fraction_along(&shape, snap.segment as usize, snap.t);
    Some(snap)
}

/// Fraction of the polyline's length covered by the segments before
/// `segment` plus `t` of the segment itself. Degenerate zero-length
/// polylines snap to their start.
fn fraction_along(shape: &[Coord], segment: usize, t: f64) -> f64 {
    let total = polyline_length_m(shape);
    if total <= 0.0 {
        return 0.0;
    }
    let mut covered = polyline_length_m(&shape[..=segment]);
    let seg = &shape[segment..=segment + 1];
    covered += t * polyline_length_m(seg);
    covered / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::format::{EdgeSpec, RoadClass, TileWriter, ACCESS_CAR, ACCESS_FOOT};
    use std::sync::Arc;

    fn chain_view() -> TileView {
        let mut writer = TileWriter::new(14, 8601, 5762);
        let a = writer.add_node(47.0, 9.0);
        let b = writer.add_node(47.0, 9.001);
        let c = writer.add_node(47.0, 9.002);
        for (from, to) in [(a, b), (b, c)] {
            writer.add_edge(EdgeSpec {
                from_node: from,
                to_node: to,
                speed_mps: 13.9,
                foot_speed_mps: 1.4,
                oneway: false,
                road_class: RoadClass::Residential,
                access_mask: ACCESS_CAR | ACCESS_FOOT,
                shape: vec![],
            });
        }
        TileView::new(Arc::new(writer.finish().unwrap())).unwrap()
    }

    #[test]
    fn test_snap_midpoint() {
        let view = chain_view();
        let snap = snap_to_edge(&view, 47.0001, 9.0005).unwrap();
        assert_eq!(snap.edge, 0);
        assert_eq!(snap.segment, 0);
        assert!((snap.t - 0.5).abs() < 1e-6);
        assert!((snap.fraction - 0.5).abs() < 1e-6);
        assert!((snap.point.lon - 9.0005).abs() < 1e-9);
        assert_eq!(snap.point.lat, 47.0);
        assert!((snap.distance_m - 11.1).abs() < 0.2, "{}", snap.distance_m);
    }

    #[test]
    fn test_snap_on_node_clamps_parameter() {
        let view = chain_view();
        let snap = snap_to_edge(&view, 47.0, 9.0).unwrap();
        assert_eq!(snap.edge, 0);
        assert_eq!(snap.t, 0.0);
        assert_eq!(snap.fraction, 0.0);
        assert_eq!(snap.distance_m, 0.0);

        let snap = snap_to_edge(&view, 47.0, 9.002).unwrap();
        // Edge 1 ends at the query node.
        assert_eq!(snap.edge, 1);
        assert_eq!(snap.t, 1.0);
        assert!((snap.fraction - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tie_keeps_first_edge() {
        // The shared node of the chain is equidistant (zero) from the
        // end of edge 0 and the start of edge 1.
        let view = chain_view();
        let snap = snap_to_edge(&view, 47.0, 9.001).unwrap();
        assert_eq!(snap.edge, 0);
        assert_eq!(snap.t, 1.0);
    }

    #[test]
    fn test_no_edges_returns_none() {
        let mut writer = TileWriter::new(14, 0, 0);
        writer.add_node(47.0, 9.0);
        let view = TileView::new(Arc::new(writer.finish().unwrap())).unwrap();
        assert!(snap_to_edge(&view, 47.0, 9.0).is_none());
    }
}
