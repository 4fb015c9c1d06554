//! Land-tile blob format - fixed-size little-endian records.
//!
//! Layout: 48-byte header, then `node_count` 16-byte node records,
//! `edge_count` 32-byte edge records, and `shape_count` 8-byte shape
//! points. Every entity is addressable by index, so a view can read the
//! buffer in place without copying. The header carries a CRC-64/GO-ISO
//! checksum over everything after it.

use anyhow::{bail, Result};
use crc::{Crc, CRC_64_GO_ISO};

use crate::geo::{haversine_distance, Coord};

pub const MAGIC: u32 = 0x4C54_494C; // "LTIL"
pub const VERSION: u16 = 1;

pub const HEADER_LEN: usize = 48;
pub const NODE_RECORD_LEN: usize = 16;
pub const EDGE_RECORD_LEN: usize = 32;
pub const SHAPE_POINT_LEN: usize = 8;

/// Microdegrees per degree; coordinates are stored as `i32` microdegrees.
pub const COORD_SCALE: f64 = 1e6;

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Access-mask bits, one per profile.
pub const ACCESS_CAR: u8 = 1 << 0;
pub const ACCESS_FOOT: u8 = 1 << 1;

const FLAG_ONEWAY: u8 = 1 << 0;

/// Road classification stored per edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoadClass {
    Motorway = 0,
    Primary = 1,
    Secondary = 2,
    Residential = 3,
    Footway = 4,
    Path = 5,
    Steps = 6,
}

impl RoadClass {
    pub const COUNT: usize = 7;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Motorway),
            1 => Some(Self::Primary),
            2 => Some(Self::Secondary),
            3 => Some(Self::Residential),
            4 => Some(Self::Footway),
            5 => Some(Self::Path),
            6 => Some(Self::Steps),
            _ => None,
        }
    }
}

/// Decoded tile header.
#[derive(Debug, Clone, Copy)]
pub struct TileHeader {
    pub z: u32,
    pub x: u32,
    pub y: u32,
    pub profile_mask: u32,
    pub node_count: u32,
    pub edge_count: u32,
    pub shape_count: u32,
    pub body_crc: u64,
}

impl TileHeader {
    /// Parse and validate the fixed-size header. Counts are checked
    /// against the actual buffer length so record offsets computed from
    /// them can never run past the end.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            bail!("tile buffer too short: {} bytes", buf.len());
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into()?);
        if magic != MAGIC {
            bail!("bad tile magic: {:08x}", magic);
        }
        let version = u16::from_le_bytes(buf[4..6].try_into()?);
        if version != VERSION {
            bail!("unsupported tile version: {}", version);
        }
        let header = Self {
            z: u32::from_le_bytes(buf[8..12].try_into()?),
            x: u32::from_le_bytes(buf[12..16].try_into()?),
            y: u32::from_le_bytes(buf[16..20].try_into()?),
            profile_mask: u32::from_le_bytes(buf[20..24].try_into()?),
            node_count: u32::from_le_bytes(buf[24..28].try_into()?),
            edge_count: u32::from_le_bytes(buf[28..32].try_into()?),
            shape_count: u32::from_le_bytes(buf[32..36].try_into()?),
            body_crc: u64::from_le_bytes(buf[40..48].try_into()?),
        };
        let expected = HEADER_LEN
            + header.node_count as usize * NODE_RECORD_LEN
            + header.edge_count as usize * EDGE_RECORD_LEN
            + header.shape_count as usize * SHAPE_POINT_LEN;
        if buf.len() != expected {
            bail!(
                "tile length mismatch: {} bytes, header declares {}",
                buf.len(),
                expected
            );
        }
        let crc = CRC64.checksum(&buf[HEADER_LEN..]);
        if crc != header.body_crc {
            bail!(
                "tile checksum mismatch: stored {:016x}, computed {:016x}",
                header.body_crc,
                crc
            );
        }
        Ok(header)
    }
}

/// One edge, decoded from its 32-byte record.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRecord {
    pub from_node: u32,
    pub to_node: u32,
    pub length_m: f32,
    pub speed_mps: f32,
    pub foot_speed_mps: f32,
    pub shape_offset: u32,
    pub shape_count: u32,
    pub road_class: RoadClass,
    pub access_mask: u8,
    pub oneway: bool,
}

impl EdgeRecord {
    pub(crate) fn parse(rec: &[u8]) -> Result<Self> {
        let class_byte = rec[28];
        let Some(road_class) = RoadClass::from_u8(class_byte) else {
            bail!("invalid road class byte: {}", class_byte);
        };
        Ok(Self {
            from_node: u32::from_le_bytes(rec[0..4].try_into()?),
            to_node: u32::from_le_bytes(rec[4..8].try_into()?),
            length_m: f32::from_le_bytes(rec[8..12].try_into()?),
            speed_mps: f32::from_le_bytes(rec[12..16].try_into()?),
            foot_speed_mps: f32::from_le_bytes(rec[16..20].try_into()?),
            shape_offset: u32::from_le_bytes(rec[20..24].try_into()?),
            shape_count: u32::from_le_bytes(rec[24..28].try_into()?),
            road_class,
            access_mask: rec[29],
            oneway: rec[30] & FLAG_ONEWAY != 0,
        })
    }
}

/// Edge description fed to the writer. `length_m` is derived from the
/// node and shape geometry so stored lengths always agree with the
/// polyline the router emits.
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub from_node: u32,
    pub to_node: u32,
    pub speed_mps: f32,
    pub foot_speed_mps: f32,
    pub oneway: bool,
    pub road_class: RoadClass,
    pub access_mask: u8,
    /// Intermediate shape points between the endpoint nodes, ordered
    /// from `from_node` towards `to_node`.
    pub shape: Vec<Coord>,
}

/// Reference encoder for the tile blob contract. Assembles nodes and
/// edges into a well-formed buffer: edges sorted into per-node runs,
/// node `first_edge`/`edge_count` computed, checksum filled in.
pub struct TileWriter {
    z: u32,
    x: u32,
    y: u32,
    nodes: Vec<Coord>,
    edges: Vec<EdgeSpec>,
}

impl TileWriter {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self {
            z,
            x,
            y,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node; returns its index within the tile.
    pub fn add_node(&mut self, lat: f64, lon: f64) -> u32 {
        self.nodes.push(Coord::new(lat, lon));
        (self.nodes.len() - 1) as u32
    }

    pub fn add_edge(&mut self, edge: EdgeSpec) {
        self.edges.push(edge);
    }

    /// Encode the tile. Fails if any edge references a missing node or
    /// the tile exceeds what an edge identifier can address.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.z > crate::tile::id::MAX_ZOOM {
            bail!("zoom {} exceeds encodable maximum", self.z);
        }
        if self.edges.len() > crate::tile::id::MAX_EDGES_PER_TILE {
            bail!("too many edges for one tile: {}", self.edges.len());
        }
        for edge in &self.edges {
            let n = self.nodes.len() as u32;
            if edge.from_node >= n || edge.to_node >= n {
                bail!(
                    "edge references node out of range: {} -> {}",
                    edge.from_node,
                    edge.to_node
                );
            }
        }
        // Group outgoing edges into the contiguous per-node runs the
        // node records index into.
        self.edges.sort_by_key(|e| e.from_node);

        let mut profile_mask = 0u32;
        for edge in &self.edges {
            profile_mask |= edge.access_mask as u32;
        }

        // first_edge/edge_count per node
        let mut first_edge = vec![0u32; self.nodes.len()];
        let mut edge_count = vec![0u16; self.nodes.len()];
        for (k, edge) in self.edges.iter().enumerate() {
            let i = edge.from_node as usize;
            if edge_count[i] == 0 {
                first_edge[i] = k as u32;
            }
            edge_count[i] += 1;
        }

        let mut shapes: Vec<Coord> = Vec::new();
        let mut body = Vec::with_capacity(
            self.nodes.len() * NODE_RECORD_LEN + self.edges.len() * EDGE_RECORD_LEN,
        );

        for (i, node) in self.nodes.iter().enumerate() {
            body.extend_from_slice(&quantize(node.lat).to_le_bytes());
            body.extend_from_slice(&quantize(node.lon).to_le_bytes());
            body.extend_from_slice(&first_edge[i].to_le_bytes());
            body.extend_from_slice(&edge_count[i].to_le_bytes());
            body.extend_from_slice(&0u16.to_le_bytes());
        }

        for edge in &self.edges {
            let shape_offset = shapes.len() as u32;
            shapes.extend_from_slice(&edge.shape);

            let length_m = edge_length_m(&self.nodes, edge);
            body.extend_from_slice(&edge.from_node.to_le_bytes());
            body.extend_from_slice(&edge.to_node.to_le_bytes());
            body.extend_from_slice(&length_m.to_le_bytes());
            body.extend_from_slice(&edge.speed_mps.to_le_bytes());
            body.extend_from_slice(&edge.foot_speed_mps.to_le_bytes());
            body.extend_from_slice(&shape_offset.to_le_bytes());
            body.extend_from_slice(&(edge.shape.len() as u32).to_le_bytes());
            body.push(edge.road_class as u8);
            body.push(edge.access_mask);
            body.push(if edge.oneway { FLAG_ONEWAY } else { 0 });
            body.push(0);
        }

        for point in &shapes {
            body.extend_from_slice(&quantize(point.lat).to_le_bytes());
            body.extend_from_slice(&quantize(point.lon).to_le_bytes());
        }

        let body_crc = CRC64.checksum(&body);

        let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&self.z.to_le_bytes());
        buf.extend_from_slice(&self.x.to_le_bytes());
        buf.extend_from_slice(&self.y.to_le_bytes());
        buf.extend_from_slice(&profile_mask.to_le_bytes());
        buf.extend_from_slice(&(self.nodes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.edges.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(shapes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&body_crc.to_le_bytes());
        buf.extend_from_slice(&body);

        Ok(buf)
    }
}

fn quantize(degrees: f64) -> i32 {
    (degrees * COORD_SCALE).round() as i32
}

/// Geodesic length of an edge's full polyline, quantized the same way
/// the stored coordinates are so readers recompute the identical value.
fn edge_length_m(nodes: &[Coord], edge: &EdgeSpec) -> f32 {
    let dequantize = |c: &Coord| {
        Coord::new(
            quantize(c.lat) as f64 / COORD_SCALE,
            quantize(c.lon) as f64 / COORD_SCALE,
        )
    };
    let mut prev = dequantize(&nodes[edge.from_node as usize]);
    let mut total = 0.0;
    for point in edge
        .shape
        .iter()
        .chain(std::iter::once(&nodes[edge.to_node as usize]))
    {
        let cur = dequantize(point);
        total += haversine_distance(prev.lat, prev.lon, cur.lat, cur.lon);
        prev = cur;
    }
    total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_tile() -> Vec<u8> {
        let mut writer = TileWriter::new(14, 8601, 5762);
        let a = writer.add_node(47.0, 9.0);
        let b = writer.add_node(47.0, 9.001);
        writer.add_edge(EdgeSpec {
            from_node: a,
            to_node: b,
            speed_mps: 13.9,
            foot_speed_mps: 1.4,
            oneway: false,
            road_class: RoadClass::Residential,
            access_mask: ACCESS_CAR | ACCESS_FOOT,
            shape: vec![],
        });
        writer.finish().unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let buf = two_node_tile();
        let header = TileHeader::parse(&buf).unwrap();
        assert_eq!((header.z, header.x, header.y), (14, 8601, 5762));
        assert_eq!(header.node_count, 2);
        assert_eq!(header.edge_count, 1);
        assert_eq!(header.shape_count, 0);
        assert_eq!(header.profile_mask, (ACCESS_CAR | ACCESS_FOOT) as u32);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = two_node_tile();
        buf[0] ^= 0xFF;
        assert!(TileHeader::parse(&buf).is_err());
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut buf = two_node_tile();
        buf[4] = 99;
        assert!(TileHeader::parse(&buf).is_err());
    }

    #[test]
    fn test_corrupt_body_rejected() {
        let mut buf = two_node_tile();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let err = TileHeader::parse(&buf).unwrap_err();
        assert!(err.to_string().contains("checksum"), "{}", err);
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let buf = two_node_tile();
        assert!(TileHeader::parse(&buf[..buf.len() - 4]).is_err());
        assert!(TileHeader::parse(&buf[..10]).is_err());
    }

    #[test]
    fn test_writer_computes_haversine_length() {
        let buf = two_node_tile();
        let rec = EdgeRecord::parse(&buf[HEADER_LEN + 2 * NODE_RECORD_LEN..]).unwrap();
        assert!((rec.length_m - 75.8).abs() < 0.5, "{}", rec.length_m);
    }

    #[test]
    fn test_writer_rejects_dangling_edge() {
        let mut writer = TileWriter::new(14, 0, 0);
        writer.add_node(47.0, 9.0);
        writer.add_edge(EdgeSpec {
            from_node: 0,
            to_node: 7,
            speed_mps: 1.0,
            foot_speed_mps: 1.0,
            oneway: false,
            road_class: RoadClass::Path,
            access_mask: ACCESS_FOOT,
            shape: vec![],
        });
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_road_class_from_u8() {
        for value in 0..RoadClass::COUNT as u8 {
            let class = RoadClass::from_u8(value).unwrap();
            assert_eq!(class as u8, value);
        }
        assert!(RoadClass::from_u8(7).is_none());
    }
}
