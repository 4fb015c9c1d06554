//! Land-Router: tile-based road routing over a SQLite tile store
//!
//! Components, bottom-up:
//! - Tile store: fetches immutable tile blobs by (z, x, y) key, with an
//!   optional LRU buffer cache
//! - Tile view: zero-copy reader over a tile blob, plus the derived
//!   incoming-adjacency index
//! - Snapper: projects a free coordinate onto the nearest edge segment
//! - Router: virtual start/end nodes at the snap points, bidirectional
//!   A* over the tile graph, polyline/metrics reconstruction
//!
//! Routing is single-tile: waypoints mapping to different tiles are
//! rejected. Car and foot profiles select per-edge access and speed.

pub mod geo;
pub mod profile;
pub mod router;
pub mod snap;
pub mod store;
pub mod tile;

pub use geo::Coord;
pub use profile::{Profile, ProfileSettings};
pub use router::{RouteResult, RouteStatus, Router, RouterOptions};
pub use snap::{snap_to_edge, EdgeSnap};
pub use store::TileStore;
pub use tile::{
    EdgeId, EdgeRecord, EdgeSpec, RoadClass, TileView, TileWriter, ACCESS_CAR, ACCESS_FOOT,
};
