//! Inspection commands over region files and world directories.

use std::collections::BTreeMap;
use std::path::Path;

use hystore_world::region::{region_file_name, RegionHeader, REGION_SIZE};
use hystore_world::{ChunkColumn, ChunkStore, RegionFile, RegionOptions, StorageError};
use tracing::{debug, warn};

/// Summary of one region file.
#[derive(Debug)]
pub struct RegionInfo {
    pub header: RegionHeader,
    pub chunks: usize,
    pub segments_in_use: usize,
    pub file_len: u64,
}

pub fn region_info(path: &Path, options: &RegionOptions) -> Result<RegionInfo, StorageError> {
    let region = RegionFile::open(path, options.compression_level)?;
    let info = RegionInfo {
        header: region.header(),
        chunks: region.present_chunks().len(),
        segments_in_use: region.segments_in_use(),
        file_len: region.file_len(),
    };
    region.close()?;
    Ok(info)
}

/// Statistics of one decoded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStats {
    pub x: i32,
    pub z: i32,
    pub blocks: u32,
    pub fluids: u32,
    pub min_height: i32,
    pub max_height: i32,
    pub environments: BTreeMap<String, usize>,
}

impl ChunkStats {
    pub fn of(chunk: &ChunkColumn) -> Self {
        let (min_height, max_height) = chunk.height_range();
        Self {
            x: chunk.x(),
            z: chunk.z(),
            blocks: chunk.block_count(),
            fluids: chunk.fluid_count(),
            min_height,
            max_height,
            environments: chunk
                .environment()
                .column_counts()
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WorldStats {
    pub chunks: Vec<ChunkStats>,
    /// Whether the limit stopped the walk early.
    pub truncated: bool,
}

impl WorldStats {
    pub fn total_blocks(&self) -> u64 {
        self.chunks.iter().map(|c| c.blocks as u64).sum()
    }

    pub fn total_fluids(&self) -> u64 {
        self.chunks.iter().map(|c| c.fluids as u64).sum()
    }

    /// Environment column counts summed over every chunk.
    pub fn environments(&self) -> BTreeMap<&str, usize> {
        let mut totals = BTreeMap::new();
        for chunk in &self.chunks {
            for (name, count) in &chunk.environments {
                *totals.entry(name.as_str()).or_insert(0) += count;
            }
        }
        totals
    }
}

/// Decode present chunks of a world, at most `limit` of them.
pub fn analyze_world(
    world: &Path,
    options: RegionOptions,
    limit: Option<usize>,
) -> Result<WorldStats, StorageError> {
    let mut store = ChunkStore::new(world, options);
    let mut stats = WorldStats::default();
    let complete = store.visit_chunks(|chunk| {
        if limit.is_some_and(|limit| stats.chunks.len() >= limit) {
            return false;
        }
        stats.chunks.push(ChunkStats::of(&chunk));
        true
    })?;
    stats.truncated = !complete;
    store.close()?;
    Ok(stats)
}

/// A region or chunk that could not be read.
#[derive(Debug)]
pub struct Failure {
    pub region: (i32, i32),
    /// World chunk coordinates, `None` when the region itself failed to open.
    pub chunk: Option<(i32, i32)>,
    pub error: StorageError,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub regions: usize,
    pub chunks_ok: usize,
    pub failures: Vec<Failure>,
}

/// Open every region of a world and decode every stored chunk, collecting
/// failures instead of stopping at the first one.
pub fn verify_world(world: &Path, options: RegionOptions) -> Result<VerifyReport, StorageError> {
    let store = ChunkStore::new(world, options);
    let mut report = VerifyReport::default();
    for (region_x, region_z) in store.region_list()? {
        report.regions += 1;
        let path = store
            .regions_dir()
            .join(region_file_name(region_x, region_z));
        let mut region = match RegionFile::open(&path, options.compression_level) {
            Ok(region) => region,
            Err(error) => {
                warn!(region_x, region_z, %error, "region failed to open");
                report.failures.push(Failure {
                    region: (region_x, region_z),
                    chunk: None,
                    error,
                });
                continue;
            }
        };
        for (local_x, local_z) in region.present_chunks() {
            let chunk_x = region_x * REGION_SIZE + local_x;
            let chunk_z = region_z * REGION_SIZE + local_z;
            match region.read_chunk(chunk_x, chunk_z) {
                Ok(_) => report.chunks_ok += 1,
                Err(error) => {
                    warn!(chunk_x, chunk_z, %error, "chunk failed to decode");
                    report.failures.push(Failure {
                        region: (region_x, region_z),
                        chunk: Some((chunk_x, chunk_z)),
                        error,
                    });
                }
            }
        }
        debug!(region_x, region_z, "region verified");
    }
    Ok(report)
}
