//! The routing query engine.
//!
//! A `Router` owns a tile store handle and per-instance options; every
//! query loads the tile covering its waypoints, snaps the endpoints
//! onto edges, overlays virtual start/end nodes, and runs a
//! bidirectional A* between them. Failures never escape `route`: they
//! come back as a `RouteStatus` plus a short message.

mod search;

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geo::{polyline_length_m, tile_key_for, Coord};
use crate::profile::{Profile, ProfileSettings};
use crate::snap::{snap_to_edge, EdgeSnap};
use crate::store::TileStore;
use crate::tile::{EdgeId, TileView};
use search::{EdgeRef, Search, Step, VirtualEdge};

/// Points closer than this are considered the same polyline vertex.
const COORD_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    /// Zoom level waypoints are mapped to tiles at.
    pub tile_zoom: u32,
    /// Capacity of the tile buffer cache; zero disables it.
    pub tile_cache_capacity: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            tile_zoom: 14,
            tile_cache_capacity: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Ok,
    NoRoute,
    NoTile,
    DataError,
    InternalError,
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RouteStatus::Ok => "OK",
            RouteStatus::NoRoute => "NO_ROUTE",
            RouteStatus::NoTile => "NO_TILE",
            RouteStatus::DataError => "DATA_ERROR",
            RouteStatus::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub status: RouteStatus,
    pub polyline: Vec<Coord>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub edge_ids: Vec<EdgeId>,
    pub error_message: String,
}

impl RouteResult {
    fn failure(status: RouteStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            polyline: Vec::new(),
            distance_m: 0.0,
            duration_s: 0.0,
            edge_ids: Vec::new(),
            error_message: message.into(),
        }
    }
}

/// One leg between two consecutive waypoints.
struct Segment {
    polyline: Vec<Coord>,
    distance_m: f64,
    duration_s: f64,
    edge_ids: Vec<EdgeId>,
}

pub struct Router {
    store: TileStore,
    options: RouterOptions,
}

impl Router {
    /// Open the tile database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P, options: RouterOptions) -> Result<Self> {
        let store = TileStore::open(db_path, options.tile_cache_capacity)?;
        Ok(Self { store, options })
    }

    /// Compute a route through `waypoints` under `profile`.
    pub fn route(&mut self, profile: Profile, waypoints: &[Coord]) -> RouteResult {
        if waypoints.len() < 2 {
            return RouteResult::failure(RouteStatus::InternalError, "need at least 2 waypoints");
        }

        let zoom = self.options.tile_zoom;
        let (x, y) = tile_key_for(waypoints[0].lat, waypoints[0].lon, zoom);
        for point in &waypoints[1..] {
            if tile_key_for(point.lat, point.lon, zoom) != (x, y) {
                return RouteResult::failure(
                    RouteStatus::NoRoute,
                    "waypoints span multiple tiles; multi-tile routing is unsupported",
                );
            }
        }

        let buf = match self.store.load(zoom, x, y) {
            Ok(Some(buf)) => buf,
            Ok(None) => {
                return RouteResult::failure(RouteStatus::NoTile, "no tile for start point")
            }
            Err(err) => return RouteResult::failure(RouteStatus::DataError, format!("{:#}", err)),
        };
        let view = match TileView::new(buf) {
            Ok(view) => view,
            Err(err) => return RouteResult::failure(RouteStatus::DataError, format!("{:#}", err)),
        };
        if view.edge_count() == 0 {
            return RouteResult::failure(RouteStatus::NoRoute, "empty tile or no edges");
        }

        let settings = profile.settings();
        let mut polyline: Vec<Coord> = Vec::new();
        let mut edge_ids: Vec<EdgeId> = Vec::new();
        let mut distance_m = 0.0;
        let mut duration_s = 0.0;

        for pair in waypoints.windows(2) {
            let segment = match self.route_segment(&view, &settings, zoom, x, y, pair[0], pair[1]) {
                Ok(segment) => segment,
                Err((status, message)) => return RouteResult::failure(status, message),
            };
            // Joins where the legs share a snap point collapse to one
            // vertex; the same holds for a split edge's id.
            for &point in &segment.polyline {
                push_point(&mut polyline, point);
            }
            for id in segment.edge_ids {
                if edge_ids.last() != Some(&id) {
                    edge_ids.push(id);
                }
            }
            distance_m += segment.distance_m;
            duration_s += segment.duration_s;
        }

        info!(
            profile = ?profile,
            waypoints = waypoints.len(),
            distance_m,
            duration_s,
            "route computed"
        );
        RouteResult {
            status: RouteStatus::Ok,
            polyline,
            distance_m,
            duration_s,
            edge_ids,
            error_message: String::new(),
        }
    }

    fn route_segment(
        &self,
        view: &TileView,
        settings: &ProfileSettings,
        z: u32,
        x: u32,
        y: u32,
        from: Coord,
        to: Coord,
    ) -> Result<Segment, (RouteStatus, String)> {
        let start = snap_to_edge(view, from.lat, from.lon)
            .ok_or((RouteStatus::NoRoute, "failed to snap start point".to_string()))?;
        let end = snap_to_edge(view, to.lat, to.lon)
            .ok_or((RouteStatus::NoRoute, "failed to snap end point".to_string()))?;
        debug!(
            start_edge = start.edge,
            start_fraction = start.fraction,
            end_edge = end.edge,
            end_fraction = end.fraction,
            "waypoints snapped"
        );

        let vstart = view.node_count() as u32;
        let vend = vstart + 1;
        let mut virtuals = Vec::with_capacity(5);
        push_split(&mut virtuals, view, &start, vstart, settings);
        push_split(&mut virtuals, view, &end, vend, settings);
        if start.edge == end.edge {
            // Both waypoints sit on one edge: bridge the projections
            // directly, oriented along the edge so oneway still holds.
            let rec = view.edge_at(start.edge as usize);
            let (lo, lo_node, hi, hi_node) = if start.fraction <= end.fraction {
                (&start, vstart, &end, vend)
            } else {
                (&end, vend, &start, vstart)
            };
            virtuals.push(VirtualEdge::new(
                lo_node,
                hi_node,
                (hi.fraction - lo.fraction) * rec.length_m as f64,
                &rec,
                start.edge,
                lo.point,
                hi.point,
                settings,
            ));
        }

        let steps = Search::new(view, settings, &virtuals, vstart, vend, start.point, end.point)
            .run()
            .ok_or((RouteStatus::NoRoute, "no path within tile".to_string()))?;

        Ok(assemble_segment(view, settings, &virtuals, &steps, z, x, y))
    }
}

/// Replace the snapped edge by its two halves around the virtual node.
fn push_split(
    virtuals: &mut Vec<VirtualEdge>,
    view: &TileView,
    snap: &EdgeSnap,
    vnode: u32,
    settings: &ProfileSettings,
) {
    let rec = view.edge_at(snap.edge as usize);
    let length = rec.length_m as f64;
    virtuals.push(VirtualEdge::new(
        rec.from_node,
        vnode,
        snap.fraction * length,
        &rec,
        snap.edge,
        view.node_coord(rec.from_node as usize),
        snap.point,
        settings,
    ));
    virtuals.push(VirtualEdge::new(
        vnode,
        rec.to_node,
        (1.0 - snap.fraction) * length,
        &rec,
        snap.edge,
        snap.point,
        view.node_coord(rec.to_node as usize),
        settings,
    ));
}

/// Turn the traversal list into geometry, ids, and metrics. Distance
/// comes from the emitted polyline so the two always agree.
fn assemble_segment(
    view: &TileView,
    settings: &ProfileSettings,
    virtuals: &[VirtualEdge],
    steps: &[Step],
    z: u32,
    x: u32,
    y: u32,
) -> Segment {
    let mut polyline: Vec<Coord> = Vec::new();
    let mut edge_ids: Vec<EdgeId> = Vec::new();
    let mut duration_s = 0.0;
    let mut scratch: Vec<Coord> = Vec::new();

    for step in steps {
        let real_edge = match step.edge {
            EdgeRef::Real(k) => {
                let rec = view.edge_at(k as usize);
                scratch.clear();
                view.append_edge_shape(k as usize, &mut scratch, false);
                if step.from != rec.from_node {
                    scratch.reverse();
                }
                for &point in &scratch {
                    push_point(&mut polyline, point);
                }
                duration_s += rec.length_m as f64 / settings.edge_speed_mps(&rec);
                k
            }
            EdgeRef::Virtual(i) => {
                let ve = &virtuals[i as usize];
                let (a, b) = if step.from == ve.from {
                    (ve.from_coord, ve.to_coord)
                } else {
                    (ve.to_coord, ve.from_coord)
                };
                push_point(&mut polyline, a);
                push_point(&mut polyline, b);
                duration_s += ve.length_m / settings.edge_speed_mps(&view.edge_at(ve.real_edge as usize));
                ve.real_edge
            }
        };
        // Both halves of a split edge name the same real edge; emit it once.
        let id = EdgeId::new(z, x, y, real_edge);
        if edge_ids.last() != Some(&id) {
            edge_ids.push(id);
        }
    }

    let distance_m = polyline_length_m(&polyline);
    Segment {
        polyline,
        distance_m,
        duration_s,
        edge_ids,
    }
}

fn push_point(line: &mut Vec<Coord>, point: Coord) {
    if let Some(last) = line.last() {
        if (last.lat - point.lat).abs() < COORD_EPS && (last.lon - point.lon).abs() < COORD_EPS {
            return;
        }
    }
    line.push(point);
}
