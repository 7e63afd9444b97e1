//! World-level chunk access over a directory of region files.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::chunk::ChunkColumn;
use crate::error::Result;
use crate::options::RegionOptions;
use crate::region::{parse_region_file_name, region_file_name, RegionFile, REGION_SIZE};

/// Directory below the world root holding the region files.
pub const REGIONS_DIR: &str = "chunks";

/// Region holding a chunk, `(chunk_x >> 5, chunk_z >> 5)`.
pub fn region_coords(chunk_x: i32, chunk_z: i32) -> (i32, i32) {
    (chunk_x >> 5, chunk_z >> 5)
}

/// Maps chunk coordinates onto lazily opened region files.
///
/// Not synchronized: callers serialize access to one store.
pub struct ChunkStore {
    world_dir: PathBuf,
    options: RegionOptions,
    regions: HashMap<(i32, i32), RegionFile>,
}

impl ChunkStore {
    pub fn new(world_dir: impl Into<PathBuf>, options: RegionOptions) -> Self {
        Self {
            world_dir: world_dir.into(),
            options,
            regions: HashMap::new(),
        }
    }

    pub fn world_dir(&self) -> &Path {
        &self.world_dir
    }

    pub fn regions_dir(&self) -> PathBuf {
        self.world_dir.join(REGIONS_DIR)
    }

    pub fn open_region_count(&self) -> usize {
        self.regions.len()
    }

    /// Load a chunk. `Ok(None)` when its region file or slot is empty.
    pub fn get_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Option<ChunkColumn>> {
        let (region_x, region_z) = region_coords(chunk_x, chunk_z);
        match self.region_for_read(region_x, region_z)? {
            Some(region) => region.read_chunk(chunk_x, chunk_z),
            None => Ok(None),
        }
    }

    /// Same as [`ChunkStore::get_chunk`]; loaded chunks are already private copies.
    pub fn get_chunk_for_editing(
        &mut self,
        chunk_x: i32,
        chunk_z: i32,
    ) -> Result<Option<ChunkColumn>> {
        self.get_chunk(chunk_x, chunk_z)
    }

    /// Store a chunk, creating its region file if needed.
    pub fn save_chunk(&mut self, chunk: &ChunkColumn) -> Result<()> {
        let (region_x, region_z) = region_coords(chunk.x(), chunk.z());
        self.region_for_write(region_x, region_z)?.write_chunk(chunk)
    }

    pub fn is_chunk_present(&mut self, chunk_x: i32, chunk_z: i32) -> Result<bool> {
        let (region_x, region_z) = region_coords(chunk_x, chunk_z);
        Ok(self
            .region_for_read(region_x, region_z)?
            .is_some_and(|region| region.has_chunk(chunk_x & 31, chunk_z & 31)))
    }

    /// Regions with a file on disk, sorted. Files that do not look like
    /// region files are skipped with a warning.
    pub fn region_list(&self) -> Result<Vec<(i32, i32)>> {
        let dir = self.regions_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut regions = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(parse_region_file_name) {
                Some(coords) => regions.push(coords),
                None => warn!(
                    dir = %dir.display(),
                    file = ?name,
                    "skipping file that is not a region file"
                ),
            }
        }
        regions.sort_unstable();
        Ok(regions)
    }

    /// Every chunk coordinate a discovered region file could hold. This is an
    /// over-approximation; pair it with [`ChunkStore::is_chunk_present`].
    pub fn chunk_coords(&self) -> Result<Vec<(i32, i32)>> {
        let mut coords = Vec::new();
        for (region_x, region_z) in self.region_list()? {
            for local_z in 0..REGION_SIZE {
                for local_x in 0..REGION_SIZE {
                    coords.push((
                        region_x * REGION_SIZE + local_x,
                        region_z * REGION_SIZE + local_z,
                    ));
                }
            }
        }
        Ok(coords)
    }

    /// Estimated chunk count: 1024 per region file.
    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.region_list()?.len() * (REGION_SIZE * REGION_SIZE) as usize)
    }

    /// Load every present chunk in turn. The visitor returns `false` to stop;
    /// the result says whether every chunk was visited.
    pub fn visit_chunks(&mut self, mut visitor: impl FnMut(ChunkColumn) -> bool) -> Result<bool> {
        for (chunk_x, chunk_z) in self.chunk_coords()? {
            if let Some(chunk) = self.get_chunk(chunk_x, chunk_z)? {
                if !visitor(chunk) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    pub fn visit_chunks_for_editing(
        &mut self,
        visitor: impl FnMut(ChunkColumn) -> bool,
    ) -> Result<bool> {
        self.visit_chunks(visitor)
    }

    /// Run `task` against this store. Region files have no multi-chunk
    /// atomicity, so this adds no isolation.
    pub fn do_in_transaction<T>(&mut self, task: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        task(self)
    }

    pub fn flush(&mut self) -> Result<()> {
        for region in self.regions.values_mut() {
            region.flush()?;
        }
        Ok(())
    }

    /// Flush and close every open region. Safe to call repeatedly; every
    /// region is closed even if an earlier one fails, and the first failure
    /// is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for (_, region) in self.regions.drain() {
            if let Err(err) = region.close() {
                warn!(%err, "failed to close region file");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The cached region, opening its file if one exists.
    fn region_for_read(
        &mut self,
        region_x: i32,
        region_z: i32,
    ) -> Result<Option<&mut RegionFile>> {
        match self.regions.entry((region_x, region_z)) {
            Entry::Occupied(entry) => Ok(Some(entry.into_mut())),
            Entry::Vacant(entry) => {
                let path = self
                    .world_dir
                    .join(REGIONS_DIR)
                    .join(region_file_name(region_x, region_z));
                if !path.is_file() {
                    return Ok(None);
                }
                let region = RegionFile::open(&path, self.options.compression_level)?;
                debug!(region_x, region_z, "region opened by store");
                Ok(Some(entry.insert(region)))
            }
        }
    }

    /// The cached region, opening or creating its file.
    fn region_for_write(&mut self, region_x: i32, region_z: i32) -> Result<&mut RegionFile> {
        match self.regions.entry((region_x, region_z)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self
                    .world_dir
                    .join(REGIONS_DIR)
                    .join(region_file_name(region_x, region_z));
                let region = RegionFile::open_or_create(&path, &self.options)?;
                debug!(region_x, region_z, "region opened by store");
                Ok(entry.insert(region))
            }
        }
    }
}
