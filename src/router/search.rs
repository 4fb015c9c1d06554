//! Bidirectional A* over a tile graph augmented with virtual edges.
//!
//! The tile's real nodes keep their indices; two extra ids
//! (`node_count` and `node_count + 1`) name the per-query virtual start
//! and end nodes. Virtual edges live in a small overlay list consulted
//! next to the real adjacency during relaxation; the tile itself is
//! never touched.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::geo::{haversine_distance, Coord};
use crate::profile::ProfileSettings;
use crate::tile::format::EdgeRecord;
use crate::tile::TileView;

/// A per-query edge splitting a real edge at a snap point, or bridging
/// two snap points on the same edge.
#[derive(Debug, Clone)]
pub(crate) struct VirtualEdge {
    pub from: u32,
    pub to: u32,
    pub length_m: f64,
    pub access_mask: u8,
    pub oneway: bool,
    /// Index of the real edge this virtual edge covers a part of.
    pub real_edge: u32,
    pub from_coord: Coord,
    pub to_coord: Coord,
    speed_mps: f64,
}

impl VirtualEdge {
    pub(crate) fn new(
        from: u32,
        to: u32,
        length_m: f64,
        real: &EdgeRecord,
        real_edge: u32,
        from_coord: Coord,
        to_coord: Coord,
        settings: &ProfileSettings,
    ) -> Self {
        Self {
            from,
            to,
            length_m,
            access_mask: real.access_mask,
            oneway: real.oneway,
            real_edge,
            from_coord,
            to_coord,
            speed_mps: settings.edge_speed_mps(real),
        }
    }

    fn duration_s(&self, settings: &ProfileSettings) -> Option<f64> {
        if self.access_mask & settings.access_mask == 0 || self.speed_mps <= 0.0 {
            return None;
        }
        Some(self.length_m / self.speed_mps)
    }
}

/// How a node was reached: over a real tile edge or a virtual one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeRef {
    Real(u32),
    Virtual(u32),
}

/// One traversal of the reconstructed path, in travel order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Step {
    pub from: u32,
    pub to: u32,
    pub edge: EdgeRef,
}

/// Traversal time of a real edge in the given direction, or `None` if
/// the edge is inadmissible for the profile or direction.
pub(crate) fn edge_duration_s(
    settings: &ProfileSettings,
    edge: &EdgeRecord,
    reverse: bool,
) -> Option<f64> {
    if edge.access_mask & settings.access_mask == 0 {
        return None;
    }
    if reverse && edge.oneway {
        return None;
    }
    let speed = settings.edge_speed_mps(edge);
    if speed <= 0.0 {
        return None;
    }
    Some(edge.length_m as f64 / speed)
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    node: u32,
    g: f64,
    f: f64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on f.
        other.f.partial_cmp(&self.f).unwrap_or(Ordering::Equal)
    }
}

struct Frontier {
    dist: Vec<f64>,
    parent: Vec<Option<(u32, EdgeRef)>>,
    heap: BinaryHeap<HeapEntry>,
    goal: Coord,
    done: bool,
    settled: usize,
}

impl Frontier {
    fn new(nodes: usize, origin: u32, origin_coord: Coord, goal: Coord, ceiling: f64) -> Self {
        let mut frontier = Self {
            dist: vec![f64::INFINITY; nodes],
            parent: vec![None; nodes],
            heap: BinaryHeap::new(),
            goal,
            done: false,
            settled: 0,
        };
        frontier.dist[origin as usize] = 0.0;
        let h = haversine_distance(origin_coord.lat, origin_coord.lon, goal.lat, goal.lon) / ceiling;
        frontier.heap.push(HeapEntry {
            node: origin,
            g: 0.0,
            f: h,
        });
        frontier
    }
}

pub(crate) struct Search<'a> {
    view: &'a TileView,
    settings: &'a ProfileSettings,
    virtuals: &'a [VirtualEdge],
    vstart: u32,
    vend: u32,
    start_coord: Coord,
    end_coord: Coord,
}

impl<'a> Search<'a> {
    pub(crate) fn new(
        view: &'a TileView,
        settings: &'a ProfileSettings,
        virtuals: &'a [VirtualEdge],
        vstart: u32,
        vend: u32,
        start_coord: Coord,
        end_coord: Coord,
    ) -> Self {
        Self {
            view,
            settings,
            virtuals,
            vstart,
            vend,
            start_coord,
            end_coord,
        }
    }

    fn node_coord(&self, node: u32) -> Coord {
        if node == self.vstart {
            self.start_coord
        } else if node == self.vend {
            self.end_coord
        } else {
            self.view.node_coord(node as usize)
        }
    }

    /// Run the search. Returns the traversals from the virtual start to
    /// the virtual end, or `None` when the frontiers never met.
    pub(crate) fn run(&self) -> Option<Vec<Step>> {
        let nodes = self.view.node_count() + 2;
        let ceiling = self.settings.heuristic_speed_mps;
        let mut forward = Frontier::new(nodes, self.vstart, self.start_coord, self.end_coord, ceiling);
        let mut backward = Frontier::new(nodes, self.vend, self.end_coord, self.start_coord, ceiling);

        let mut best_mu = f64::INFINITY;
        let mut meeting: Option<u32> = None;

        while !(forward.done && backward.done) {
            // Step the active frontier whose next candidate is cheapest.
            let pick_forward = match (forward.done, backward.done) {
                (false, true) => true,
                (true, false) => false,
                _ => {
                    let ff = forward.heap.peek().map_or(f64::INFINITY, |e| e.f);
                    let bf = backward.heap.peek().map_or(f64::INFINITY, |e| e.f);
                    ff <= bf
                }
            };
            if pick_forward {
                self.step(&mut forward, &mut backward, false, &mut best_mu, &mut meeting);
            } else {
                self.step(&mut backward, &mut forward, true, &mut best_mu, &mut meeting);
            }
        }

        debug!(
            forward_settled = forward.settled,
            backward_settled = backward.settled,
            best_mu,
            "search finished"
        );

        let meeting = meeting?;
        Some(self.reconstruct(&forward, &backward, meeting))
    }

    /// Pop and expand one node of `own`. Marks the frontier done when
    /// its queue runs dry or its cheapest candidate can no longer beat
    /// the best meeting cost.
    fn step(
        &self,
        own: &mut Frontier,
        other: &mut Frontier,
        backward: bool,
        best_mu: &mut f64,
        meeting: &mut Option<u32>,
    ) {
        let entry = loop {
            match own.heap.pop() {
                // Stale entries carry a g superseded by a later relaxation.
                Some(e) if e.g > own.dist[e.node as usize] => continue,
                Some(e) => break e,
                None => {
                    own.done = true;
                    return;
                }
            }
        };
        if entry.f > *best_mu {
            own.done = true;
            return;
        }
        own.settled += 1;

        let u = entry.node;
        let mut relax = |v: u32, duration: f64, via: EdgeRef| {
            let g = entry.g + duration;
            if g < own.dist[v as usize] {
                own.dist[v as usize] = g;
                own.parent[v as usize] = Some((u, via));
                let coord = self.node_coord(v);
                let h = haversine_distance(coord.lat, coord.lon, own.goal.lat, own.goal.lon)
                    / self.settings.heuristic_speed_mps;
                own.heap.push(HeapEntry { node: v, g, f: g + h });
                if other.dist[v as usize].is_finite() {
                    let mu = g + other.dist[v as usize];
                    if mu < *best_mu {
                        *best_mu = mu;
                        *meeting = Some(v);
                    }
                }
            }
        };

        if (u as usize) < self.view.node_count() {
            let first = self.view.first_edge(u as usize) as usize;
            let count = self.view.edge_count_from(u as usize) as usize;
            for k in first..first + count {
                let rec = self.view.edge_at(k);
                // Forward frontier leaves u along its outgoing edges;
                // backward arrives at u over them only against oneway.
                let reverse = backward;
                if let Some(dt) = edge_duration_s(self.settings, &rec, reverse) {
                    relax(rec.to_node, dt, EdgeRef::Real(k as u32));
                }
            }
            for &k in self.view.in_edges_of(u as usize) {
                let rec = self.view.edge_at(k as usize);
                let reverse = !backward;
                if let Some(dt) = edge_duration_s(self.settings, &rec, reverse) {
                    relax(rec.from_node, dt, EdgeRef::Real(k));
                }
            }
        }
        for (i, ve) in self.virtuals.iter().enumerate() {
            let Some(dt) = ve.duration_s(self.settings) else {
                continue;
            };
            let via = EdgeRef::Virtual(i as u32);
            // Same direction rules as real edges: with-the-edge always,
            // against it only when not oneway.
            let (leaves_u, enters_u) = (ve.from == u, ve.to == u);
            if !backward {
                if leaves_u {
                    relax(ve.to, dt, via);
                } else if enters_u && !ve.oneway {
                    relax(ve.from, dt, via);
                }
            } else {
                if enters_u {
                    relax(ve.from, dt, via);
                } else if leaves_u && !ve.oneway {
                    relax(ve.to, dt, via);
                }
            }
        }
    }

    /// Join the two predecessor chains at the meeting node into one
    /// ordered list of traversals from `vstart` to `vend`.
    fn reconstruct(&self, forward: &Frontier, backward: &Frontier, meeting: u32) -> Vec<Step> {
        let mut steps = Vec::new();
        let mut cursor = meeting;
        while cursor != self.vstart {
            let (prev, via) = forward.parent[cursor as usize]
                .expect("forward chain broken before virtual start");
            steps.push(Step {
                from: prev,
                to: cursor,
                edge: via,
            });
            cursor = prev;
        }
        steps.reverse();

        let mut cursor = meeting;
        while cursor != self.vend {
            let (next, via) = backward.parent[cursor as usize]
                .expect("backward chain broken before virtual end");
            steps.push(Step {
                from: cursor,
                to: next,
                edge: via,
            });
            cursor = next;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::tile::format::{EdgeSpec, RoadClass, TileWriter, ACCESS_CAR, ACCESS_FOOT};
    use std::sync::Arc;

    fn edge(from: u32, to: u32, oneway: bool) -> EdgeSpec {
        EdgeSpec {
            from_node: from,
            to_node: to,
            speed_mps: 13.9,
            foot_speed_mps: 1.4,
            oneway,
            road_class: RoadClass::Residential,
            access_mask: ACCESS_CAR | ACCESS_FOOT,
            shape: vec![],
        }
    }

    fn chain_view(oneway: bool) -> TileView {
        let mut writer = TileWriter::new(14, 8601, 5762);
        writer.add_node(47.0, 9.0);
        writer.add_node(47.0, 9.001);
        writer.add_node(47.0, 9.002);
        writer.add_edge(edge(0, 1, oneway));
        writer.add_edge(edge(1, 2, oneway));
        TileView::new(Arc::new(writer.finish().unwrap())).unwrap()
    }

    fn node_split(view: &TileView, edge_idx: u32, at_from: bool, vnode: u32, settings: &ProfileSettings) -> Vec<VirtualEdge> {
        let rec = view.edge_at(edge_idx as usize);
        let from_coord = view.node_coord(rec.from_node as usize);
        let to_coord = view.node_coord(rec.to_node as usize);
        let point = if at_from { from_coord } else { to_coord };
        let frac = if at_from { 0.0 } else { 1.0 };
        let len = rec.length_m as f64;
        vec![
            VirtualEdge::new(rec.from_node, vnode, frac * len, &rec, edge_idx, from_coord, point, settings),
            VirtualEdge::new(vnode, rec.to_node, (1.0 - frac) * len, &rec, edge_idx, point, to_coord, settings),
        ]
    }

    #[test]
    fn test_chain_search_meets() {
        let view = chain_view(false);
        let settings = Profile::Car.settings();
        let vstart = view.node_count() as u32;
        let vend = vstart + 1;
        let mut virtuals = node_split(&view, 0, true, vstart, &settings);
        virtuals.extend(node_split(&view, 1, false, vend, &settings));

        let search = Search::new(
            &view,
            &settings,
            &virtuals,
            vstart,
            vend,
            Coord::new(47.0, 9.0),
            Coord::new(47.0, 9.002),
        );
        let steps = search.run().expect("route exists");
        assert_eq!(steps.first().unwrap().from, vstart);
        assert_eq!(steps.last().unwrap().to, vend);
        // Whatever mix of real edges and split halves the search picks,
        // the covered real edges must be 0 then 1.
        let mut real: Vec<u32> = Vec::new();
        for step in &steps {
            let covered = match step.edge {
                EdgeRef::Real(k) => k,
                EdgeRef::Virtual(i) => {
                    if virtuals[i as usize].length_m == 0.0 {
                        continue;
                    }
                    virtuals[i as usize].real_edge
                }
            };
            if real.last() != Some(&covered) {
                real.push(covered);
            }
        }
        assert_eq!(real, vec![0, 1]);
    }

    #[test]
    fn test_oneway_blocks_reverse() {
        let view = chain_view(true);
        let settings = Profile::Car.settings();
        let vstart = view.node_count() as u32;
        let vend = vstart + 1;
        // Start at the end of the chain, end at its beginning.
        let mut virtuals = node_split(&view, 1, false, vstart, &settings);
        virtuals.extend(node_split(&view, 0, true, vend, &settings));

        let search = Search::new(
            &view,
            &settings,
            &virtuals,
            vstart,
            vend,
            Coord::new(47.0, 9.002),
            Coord::new(47.0, 9.0),
        );
        assert!(search.run().is_none());
    }

    #[test]
    fn test_zero_speed_is_inadmissible() {
        let settings = Profile::Foot.settings();
        let rec = EdgeRecord {
            from_node: 0,
            to_node: 1,
            length_m: 10.0,
            speed_mps: 13.9,
            foot_speed_mps: 0.0,
            shape_offset: 0,
            shape_count: 0,
            road_class: RoadClass::Motorway,
            access_mask: ACCESS_CAR | ACCESS_FOOT,
            oneway: false,
        };
        assert!(edge_duration_s(&settings, &rec, false).is_none());
        assert!(edge_duration_s(&Profile::Car.settings(), &rec, false).is_some());
    }

    #[test]
    fn test_access_mask_filtering() {
        let settings = Profile::Foot.settings();
        let rec = EdgeRecord {
            from_node: 0,
            to_node: 1,
            length_m: 10.0,
            speed_mps: 27.0,
            foot_speed_mps: 1.4,
            shape_offset: 0,
            shape_count: 0,
            road_class: RoadClass::Motorway,
            access_mask: ACCESS_CAR,
            oneway: false,
        };
        assert!(edge_duration_s(&settings, &rec, false).is_none());
    }
}
