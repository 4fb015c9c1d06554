//! SQLite-backed tile store.
//!
//! Tiles live in a `land_tiles` table keyed by `(z, x, y)` with the
//! blob in `data`. The handle is exclusive to its owner; concurrent
//! readers open their own stores. An optional bounded LRU keeps
//! recently loaded buffers; hits hand out the stored `Arc` so a cached
//! tile is never copied.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

const CREATE_SQL: &str = "CREATE TABLE IF NOT EXISTS land_tiles (
  z INT, x INT, y INT, data BLOB,
  PRIMARY KEY (z,x,y)
)";
const SELECT_SQL: &str = "SELECT data FROM land_tiles WHERE z=? AND x=? AND y=? LIMIT 1";
const DELETE_SQL: &str = "DELETE FROM land_tiles WHERE z=? AND x=? AND y=?";
const INSERT_SQL: &str = "INSERT INTO land_tiles(z, x, y, data) VALUES (?, ?, ?, ?)";

pub struct TileStore {
    conn: Connection,
    cache: Option<TileCache>,
}

impl TileStore {
    /// Open (or create) a tile database. `cache_capacity` of zero
    /// disables the buffer cache.
    pub fn open<P: AsRef<Path>>(path: P, cache_capacity: usize) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("failed to open tile database {}", path.as_ref().display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to set WAL journal mode")?;
        // An empty database has no tile table yet; create it so lookups
        // against a fresh store report absence rather than an error.
        conn.execute(CREATE_SQL, ())?;
        Ok(Self {
            conn,
            cache: (cache_capacity > 0).then(|| TileCache::new(cache_capacity)),
        })
    }

    /// Load the blob for `(z, x, y)`. `Ok(None)` means the key is not
    /// present; errors mean the store itself failed.
    pub fn load(&mut self, z: u32, x: u32, y: u32) -> Result<Option<Arc<Vec<u8>>>> {
        if let Some(cache) = &mut self.cache {
            if let Some(buf) = cache.get((z, x, y)) {
                debug!(z, x, y, "tile cache hit");
                return Ok(Some(buf));
            }
        }
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(SELECT_SQL, (z, x, y), |row| row.get(0))
            .optional()
            .with_context(|| format!("failed to read tile z={} x={} y={}", z, x, y))?;
        let Some(blob) = blob else {
            return Ok(None);
        };
        debug!(z, x, y, bytes = blob.len(), "tile loaded");
        let buf = Arc::new(blob);
        if let Some(cache) = &mut self.cache {
            cache.insert((z, x, y), Arc::clone(&buf));
        }
        Ok(Some(buf))
    }

    /// Replace any tile stored under `(z, x, y)` with `data`.
    pub fn insert(&mut self, z: u32, x: u32, y: u32, data: &[u8]) -> Result<()> {
        self.conn
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous mode")?;
        self.conn.execute(CREATE_SQL, ())?;
        self.conn.execute(DELETE_SQL, (z, x, y))?;
        self.conn
            .execute(INSERT_SQL, (z, x, y, data))
            .with_context(|| format!("failed to insert tile z={} x={} y={}", z, x, y))?;
        if let Some(cache) = &mut self.cache {
            cache.remove((z, x, y));
        }
        Ok(())
    }
}

type TileKey = (u32, u32, u32);

/// Bounded LRU over shared tile buffers.
struct TileCache {
    capacity: usize,
    order: VecDeque<TileKey>,
    map: HashMap<TileKey, Arc<Vec<u8>>>,
}

impl TileCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            map: HashMap::new(),
        }
    }

    fn get(&mut self, key: TileKey) -> Option<Arc<Vec<u8>>> {
        let buf = self.map.get(&key).cloned()?;
        self.touch(key);
        Some(buf)
    }

    fn insert(&mut self, key: TileKey, buf: Arc<Vec<u8>>) {
        if self.map.insert(key, buf).is_some() {
            self.touch(key);
            return;
        }
        if self.map.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(key);
    }

    fn remove(&mut self, key: TileKey) {
        if self.map.remove(&key).is_some() {
            if let Some(position) = self.order.iter().position(|entry| *entry == key) {
                self.order.remove(position);
            }
        }
    }

    fn touch(&mut self, key: TileKey) {
        if let Some(position) = self.order.iter().position(|entry| *entry == key) {
            self.order.remove(position);
            self.order.push_back(key);
        }
    }
}
