//! Packed 64-bit edge identifiers.
//!
//! An edge id names one edge of one tile:
//!
//! | zoom (6) | x (20) | y (20) | edge index (18) |
//! 63       58 57    38 37    18 17              0

use serde::{Deserialize, Serialize};

const EDGE_BITS: u64 = 18;
const Y_BITS: u64 = 20;
const X_BITS: u64 = 20;
const ZOOM_BITS: u64 = 6;

const EDGE_SHIFT: u64 = 0;
const Y_SHIFT: u64 = EDGE_BITS;
const X_SHIFT: u64 = EDGE_BITS + Y_BITS;
const ZOOM_SHIFT: u64 = EDGE_BITS + Y_BITS + X_BITS;

const EDGE_MASK: u64 = (1 << EDGE_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;
const X_MASK: u64 = (1 << X_BITS) - 1;
const ZOOM_MASK: u64 = (1 << ZOOM_BITS) - 1;

/// Largest zoom whose tile coordinates fit the x/y fields.
pub const MAX_ZOOM: u32 = 20;
/// Largest per-tile edge count the edge-index field can address.
pub const MAX_EDGES_PER_TILE: usize = 1 << EDGE_BITS;

/// Globally unique identifier of an edge within a tiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u64);

impl EdgeId {
    pub fn new(z: u32, x: u32, y: u32, edge_index: u32) -> Self {
        debug_assert!(z <= MAX_ZOOM);
        debug_assert!((edge_index as usize) < MAX_EDGES_PER_TILE);
        Self(
            (z as u64 & ZOOM_MASK) << ZOOM_SHIFT
                | (x as u64 & X_MASK) << X_SHIFT
                | (y as u64 & Y_MASK) << Y_SHIFT
                | (edge_index as u64 & EDGE_MASK) << EDGE_SHIFT,
        )
    }

    pub fn z(self) -> u32 {
        ((self.0 >> ZOOM_SHIFT) & ZOOM_MASK) as u32
    }

    pub fn x(self) -> u32 {
        ((self.0 >> X_SHIFT) & X_MASK) as u32
    }

    pub fn y(self) -> u32 {
        ((self.0 >> Y_SHIFT) & Y_MASK) as u32
    }

    pub fn edge_index(self) -> u32 {
        ((self.0 >> EDGE_SHIFT) & EDGE_MASK) as u32
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let id = EdgeId::new(14, 8601, 5762, 1);
        assert_eq!(id.z(), 14);
        assert_eq!(id.x(), 8601);
        assert_eq!(id.y(), 5762);
        assert_eq!(id.edge_index(), 1);
    }

    #[test]
    fn test_roundtrip_extremes() {
        let id = EdgeId::new(
            MAX_ZOOM,
            (1 << 20) - 1,
            (1 << 20) - 1,
            (MAX_EDGES_PER_TILE - 1) as u32,
        );
        assert_eq!(id.z(), MAX_ZOOM);
        assert_eq!(id.x(), (1 << 20) - 1);
        assert_eq!(id.y(), (1 << 20) - 1);
        assert_eq!(id.edge_index(), (MAX_EDGES_PER_TILE - 1) as u32);
    }

    #[test]
    fn test_distinct_edges_distinct_ids() {
        let a = EdgeId::new(14, 8601, 5762, 0);
        let b = EdgeId::new(14, 8601, 5762, 1);
        let c = EdgeId::new(14, 8601, 5763, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
