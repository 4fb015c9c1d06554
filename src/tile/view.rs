//! Zero-copy accessor over a shared tile buffer.
//!
//! A `TileView` borrows nothing: it holds its own reference to the
//! shared buffer, so views and in-flight routes can outlive the store's
//! cache. Record fields are decoded on access straight out of the
//! buffer. The only derived state is the incoming-adjacency index,
//! built once at construction as a CSR array partitioned by node.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::geo::Coord;
use crate::tile::format::{
    EdgeRecord, TileHeader, COORD_SCALE, EDGE_RECORD_LEN, HEADER_LEN, NODE_RECORD_LEN,
    SHAPE_POINT_LEN,
};

pub struct TileView {
    buf: Arc<Vec<u8>>,
    header: TileHeader,
    edges_base: usize,
    shapes_base: usize,
    in_offsets: Vec<u32>,
    in_edges: Vec<u32>,
}

impl TileView {
    /// Validate the buffer and build the incoming-adjacency index.
    /// Rejects any tile whose records point outside the tile.
    pub fn new(buf: Arc<Vec<u8>>) -> Result<Self> {
        let header = TileHeader::parse(&buf)?;
        let node_count = header.node_count as usize;
        let edge_count = header.edge_count as usize;
        let shape_count = header.shape_count as usize;
        let edges_base = HEADER_LEN + node_count * NODE_RECORD_LEN;
        let shapes_base = edges_base + edge_count * EDGE_RECORD_LEN;

        let mut in_counts = vec![0u32; node_count];
        for k in 0..edge_count {
            let rec = EdgeRecord::parse(&buf[edges_base + k * EDGE_RECORD_LEN..])?;
            if rec.from_node as usize >= node_count || rec.to_node as usize >= node_count {
                bail!(
                    "edge {} references node out of range: {} -> {}",
                    k,
                    rec.from_node,
                    rec.to_node
                );
            }
            let shape_end = rec.shape_offset as usize + rec.shape_count as usize;
            if shape_end > shape_count {
                bail!("edge {} shape range [{}, {}) out of bounds", k, rec.shape_offset, shape_end);
            }
            in_counts[rec.to_node as usize] += 1;
        }
        for i in 0..node_count {
            let off = HEADER_LEN + i * NODE_RECORD_LEN;
            let first = u32::from_le_bytes(buf[off + 8..off + 12].try_into()?) as usize;
            let count = u16::from_le_bytes(buf[off + 12..off + 14].try_into()?) as usize;
            if first + count > edge_count {
                bail!("node {} edge range [{}, {}) out of bounds", i, first, first + count);
            }
        }

        // CSR over incoming edges: prefix-sum offsets, then fill.
        let mut in_offsets = vec![0u32; node_count + 1];
        for i in 0..node_count {
            in_offsets[i + 1] = in_offsets[i] + in_counts[i];
        }
        let mut cursor = in_offsets.clone();
        let mut in_edges = vec![0u32; edge_count];
        for k in 0..edge_count {
            let rec_off = edges_base + k * EDGE_RECORD_LEN;
            let to = u32::from_le_bytes(buf[rec_off + 4..rec_off + 8].try_into()?) as usize;
            in_edges[cursor[to] as usize] = k as u32;
            cursor[to] += 1;
        }

        Ok(Self {
            buf,
            header,
            edges_base,
            shapes_base,
            in_offsets,
            in_edges,
        })
    }

    pub fn header(&self) -> &TileHeader {
        &self.header
    }

    pub fn node_count(&self) -> usize {
        self.header.node_count as usize
    }

    pub fn edge_count(&self) -> usize {
        self.header.edge_count as usize
    }

    fn node_coord_q(&self, i: usize, field: usize) -> i32 {
        let b = &self.buf[HEADER_LEN + i * NODE_RECORD_LEN + field * 4..];
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn node_lat(&self, i: usize) -> f64 {
        self.node_coord_q(i, 0) as f64 / COORD_SCALE
    }

    pub fn node_lon(&self, i: usize) -> f64 {
        self.node_coord_q(i, 1) as f64 / COORD_SCALE
    }

    pub fn node_coord(&self, i: usize) -> Coord {
        Coord::new(self.node_lat(i), self.node_lon(i))
    }

    pub fn first_edge(&self, i: usize) -> u32 {
        let b = &self.buf[HEADER_LEN + i * NODE_RECORD_LEN + 8..];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn edge_count_from(&self, i: usize) -> u16 {
        let b = &self.buf[HEADER_LEN + i * NODE_RECORD_LEN + 12..];
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Decode edge `k`. Callers stay within `edge_count`; out-of-range
    /// indices panic on the slice bounds.
    pub fn edge_at(&self, k: usize) -> EdgeRecord {
        let off = self.edges_base + k * EDGE_RECORD_LEN;
        EdgeRecord::parse(&self.buf[off..off + EDGE_RECORD_LEN])
            .expect("edge record validated at construction")
    }

    /// Indices of edges whose `to_node` is `i`.
    pub fn in_edges_of(&self, i: usize) -> &[u32] {
        let start = self.in_offsets[i] as usize;
        let end = self.in_offsets[i + 1] as usize;
        &self.in_edges[start..end]
    }

    fn shape_point(&self, idx: usize) -> Coord {
        let b = &self.buf[self.shapes_base + idx * SHAPE_POINT_LEN..];
        let lat_q = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let lon_q = i32::from_le_bytes([b[4], b[5], b[6], b[7]]);
        Coord::new(lat_q as f64 / COORD_SCALE, lon_q as f64 / COORD_SCALE)
    }

    /// Append the ordered shape of edge `k`: the `from_node` coordinate,
    /// every intermediate shape point, then the `to_node` coordinate.
    /// With `skip_first` the leading point is omitted, for splicing
    /// consecutive edges that share an endpoint.
    pub fn append_edge_shape(&self, k: usize, out: &mut Vec<Coord>, skip_first: bool) {
        let rec = self.edge_at(k);
        if !skip_first {
            out.push(self.node_coord(rec.from_node as usize));
        }
        for s in 0..rec.shape_count as usize {
            out.push(self.shape_point(rec.shape_offset as usize + s));
        }
        out.push(self.node_coord(rec.to_node as usize));
    }
}
