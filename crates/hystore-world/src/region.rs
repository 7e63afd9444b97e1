//! Region files: up to 1024 compressed chunk blobs behind an index table.
//!
//! Layout, all big-endian:
//!
//! ```text
//! header   magic[20] "HytaleIndexedStorage", version:i32, blobCount:i32, segmentSize:i32
//! index    blobCount x i32   (0 = absent, else 1-based first segment)
//! segments [srcLen:i32][compressedLen:i32][zstd frame] per blob
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::bitset::BitSet;
use crate::chunk::ChunkColumn;
use crate::codec;
use crate::compression;
use crate::error::{Result, StorageError};
use crate::options::RegionOptions;

pub const MAGIC: &[u8; 20] = b"HytaleIndexedStorage";
pub const FORMAT_VERSION: i32 = 1;
pub const HEADER_LEN: usize = 32;
pub const BLOB_HEADER_LEN: usize = 8;
/// Chunks along each side of a region.
pub const REGION_SIZE: i32 = 32;

/// File name of the region at `(region_x, region_z)`.
pub fn region_file_name(region_x: i32, region_z: i32) -> String {
    format!("{region_x}.{region_z}.region.bin")
}

/// Parse a `{x}.{z}.region.bin` file name.
pub fn parse_region_file_name(name: &str) -> Option<(i32, i32)> {
    let coords = name.strip_suffix(".region.bin")?;
    let (x, z) = coords.split_once('.')?;
    Some((x.parse().ok()?, z.parse().ok()?))
}

/// Index table slot of a chunk, `local_z * 32 + local_x`.
pub fn blob_index(local_x: i32, local_z: i32) -> Result<usize> {
    if !(0..REGION_SIZE).contains(&local_x) || !(0..REGION_SIZE).contains(&local_z) {
        return Err(StorageError::Position(format!(
            "local chunk ({local_x}, {local_z}) outside region"
        )));
    }
    Ok(((local_z << 5) | local_x) as usize)
}

/// Header fields of an open region file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    pub version: i32,
    pub blob_count: usize,
    pub segment_size: usize,
}

/// An open region file.
///
/// Used segments are tracked in memory. A new blob goes to the first free
/// run of segments; the old blob's segments stay reserved until the index
/// entry points at the new copy.
pub struct RegionFile {
    path: PathBuf,
    file: File,
    header: RegionHeader,
    compression_level: i32,
    index: Vec<i32>,
    used_segments: BitSet,
    file_len: u64,
}

impl RegionFile {
    /// Create (or truncate) a region file with an empty index.
    pub fn create(path: &Path, options: &RegionOptions) -> Result<Self> {
        if options.blob_count == 0 || options.blob_count > i32::MAX as usize / 4 {
            return Err(StorageError::Format(format!(
                "invalid blob count {}",
                options.blob_count
            )));
        }
        if options.segment_size < BLOB_HEADER_LEN || options.segment_size > i32::MAX as usize {
            return Err(StorageError::Format(format!(
                "invalid segment size {}",
                options.segment_size
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = RegionHeader {
            version: FORMAT_VERSION,
            blob_count: options.blob_count,
            segment_size: options.segment_size,
        };
        let mut buf = BytesMut::with_capacity(HEADER_LEN + header.blob_count * 4);
        buf.put_slice(MAGIC);
        buf.put_i32(header.version);
        buf.put_i32(header.blob_count as i32);
        buf.put_i32(header.segment_size as i32);
        buf.put_bytes(0, header.blob_count * 4);
        file.write_all(&buf)?;

        debug!(
            path = %path.display(),
            blob_count = header.blob_count,
            segment_size = header.segment_size,
            "created region file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            compression_level: options.compression_level,
            index: vec![0; header.blob_count],
            used_segments: BitSet::new(),
            file_len: buf.len() as u64,
        })
    }

    /// Open an existing region file, validating its header and rebuilding the
    /// used-segment map from the index.
    pub fn open(path: &Path, compression_level: i32) -> Result<Self> {
        let mut file = File::options().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN as u64 {
            return Err(StorageError::Format(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                file_len
            )));
        }
        let mut raw = [0u8; HEADER_LEN];
        file.read_exact(&mut raw)?;
        let mut buf = &raw[..];
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(StorageError::Format("bad magic".into()));
        }
        buf.advance(MAGIC.len());
        let version = buf.get_i32();
        if version != FORMAT_VERSION {
            return Err(StorageError::Format(format!(
                "unsupported version {version}"
            )));
        }
        let blob_count = buf.get_i32();
        let segment_size = buf.get_i32();
        if blob_count <= 0 || segment_size < BLOB_HEADER_LEN as i32 {
            return Err(StorageError::Format(format!(
                "invalid layout: {blob_count} blobs, {segment_size}-byte segments"
            )));
        }
        let header = RegionHeader {
            version,
            blob_count: blob_count as usize,
            segment_size: segment_size as usize,
        };
        let index_len = header.blob_count * 4;
        if file_len < (HEADER_LEN + index_len) as u64 {
            return Err(StorageError::Format(format!(
                "{file_len} bytes cannot hold a {}-entry index",
                header.blob_count
            )));
        }
        let mut raw_index = vec![0u8; index_len];
        file.read_exact(&mut raw_index)?;
        let mut buf = &raw_index[..];
        let index = (0..header.blob_count).map(|_| buf.get_i32()).collect();

        let mut region = Self {
            path: path.to_path_buf(),
            file,
            header,
            compression_level,
            index,
            used_segments: BitSet::new(),
            file_len,
        };
        region.rebuild_used_segments();
        debug!(
            path = %path.display(),
            blob_count = header.blob_count,
            chunks = region.present_chunks().len(),
            "opened region file"
        );
        Ok(region)
    }

    /// Open the file if it exists and is non-empty, otherwise create it.
    pub fn open_or_create(path: &Path, options: &RegionOptions) -> Result<Self> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Self::open(path, options.compression_level),
            _ => Self::create(path, options),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> RegionHeader {
        self.header
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// First segment of the blob stored for a local chunk, if any.
    pub fn first_segment(&self, local_x: i32, local_z: i32) -> Option<i32> {
        let index = blob_index(local_x, local_z).ok()?;
        match self.index.get(index) {
            Some(&segment) if segment != 0 => Some(segment),
            _ => None,
        }
    }

    pub fn has_chunk(&self, local_x: i32, local_z: i32) -> bool {
        self.first_segment(local_x, local_z).is_some()
    }

    /// Local coordinates of every stored chunk, in index order.
    pub fn present_chunks(&self) -> Vec<(i32, i32)> {
        self.index
            .iter()
            .enumerate()
            .filter(|&(_, &segment)| segment != 0)
            .map(|(i, _)| ((i % 32) as i32, (i / 32) as i32))
            .collect()
    }

    pub fn segments_in_use(&self) -> usize {
        self.used_segments.cardinality()
    }

    /// Read and decompress the blob of a local chunk. `Ok(None)` when absent.
    pub fn read_blob(&mut self, local_x: i32, local_z: i32) -> Result<Option<Vec<u8>>> {
        let index = self.slot(local_x, local_z)?;
        let segment = self.index[index];
        if segment == 0 {
            return Ok(None);
        }
        let (src_len, compressed_len) = self.read_blob_header(segment)?;
        let position = self.segment_position(segment)?;
        let mut compressed = vec![0u8; compressed_len];
        self.read_at(position + BLOB_HEADER_LEN as u64, &mut compressed)?;
        let data = compression::decompress(&compressed, src_len)?;
        trace!(local_x, local_z, segment, src_len, compressed_len, "read blob");
        Ok(Some(data))
    }

    /// Compress and store a blob for a local chunk. The index entry is
    /// updated only after the payload has been written.
    pub fn write_blob(&mut self, local_x: i32, local_z: i32, data: &[u8]) -> Result<()> {
        let index = self.slot(local_x, local_z)?;
        let compressed = compression::compress(data, self.compression_level)?;
        let src_len = i32::try_from(data.len())
            .map_err(|_| StorageError::Position(format!("blob of {} bytes", data.len())))?;

        let mut blob = BytesMut::with_capacity(BLOB_HEADER_LEN + compressed.len());
        blob.put_i32(src_len);
        blob.put_i32(compressed.len() as i32);
        blob.put_slice(&compressed);

        let needed = self.segments_for(blob.len());
        let first = self.find_free_run(needed);
        let segment = i32::try_from(first)
            .map_err(|_| StorageError::Position(format!("segment {first} out of range")))?;
        let position = self.segment_position(segment)?;
        self.write_at(position, &blob)?;

        let old = self.index[index];
        let old_run = if old != 0 { self.blob_run(old) } else { None };
        self.write_at((HEADER_LEN + index * 4) as u64, &segment.to_be_bytes())?;

        // In-memory state changes only once both writes have landed.
        self.index[index] = segment;
        self.used_segments.set_range(first, needed);
        if let Some((old_first, old_count)) = old_run {
            self.used_segments.clear_range(old_first, old_count);
        }
        trace!(
            local_x,
            local_z,
            segment,
            segments = needed,
            src_len,
            compressed_len = compressed.len(),
            "wrote blob"
        );
        Ok(())
    }

    /// Read and decode the chunk at world chunk coordinates `(chunk_x, chunk_z)`.
    pub fn read_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Option<ChunkColumn>> {
        match self.read_blob(chunk_x & 31, chunk_z & 31)? {
            Some(data) => Ok(Some(codec::decode_chunk(&data, chunk_x, chunk_z)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a chunk in the slot given by its coordinates.
    pub fn write_chunk(&mut self, chunk: &ChunkColumn) -> Result<()> {
        let data = codec::encode_chunk(chunk);
        self.write_blob(chunk.x() & 31, chunk.z() & 31, &data)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!(path = %self.path.display(), "closed region file");
        Ok(())
    }

    fn slot(&self, local_x: i32, local_z: i32) -> Result<usize> {
        let index = blob_index(local_x, local_z)?;
        if index >= self.header.blob_count {
            return Err(StorageError::Position(format!(
                "blob {index} outside a {}-entry index",
                self.header.blob_count
            )));
        }
        Ok(index)
    }

    fn segments_base(&self) -> u64 {
        (HEADER_LEN + self.header.blob_count * 4) as u64
    }

    fn segment_position(&self, segment: i32) -> Result<u64> {
        if segment < 1 {
            return Err(StorageError::Position(format!(
                "segment {segment} is not a valid 1-based segment"
            )));
        }
        Ok(self.segments_base() + (segment as u64 - 1) * self.header.segment_size as u64)
    }

    fn segments_for(&self, len: usize) -> usize {
        len.div_ceil(self.header.segment_size)
    }

    /// `(srcLen, compressedLen)` of the blob at `segment`, checked against the file length.
    fn read_blob_header(&mut self, segment: i32) -> Result<(usize, usize)> {
        let position = self.segment_position(segment)?;
        if position + BLOB_HEADER_LEN as u64 > self.file_len {
            return Err(StorageError::Corruption(format!(
                "blob at segment {segment} starts past end of file"
            )));
        }
        let mut raw = [0u8; BLOB_HEADER_LEN];
        self.read_at(position, &mut raw)?;
        let mut buf = &raw[..];
        let src_len = buf.get_i32();
        let compressed_len = buf.get_i32();
        if src_len < 0 || compressed_len < 0 {
            return Err(StorageError::Corruption(format!(
                "negative blob lengths at segment {segment}: {src_len}, {compressed_len}"
            )));
        }
        let end = position + BLOB_HEADER_LEN as u64 + compressed_len as u64;
        if end > self.file_len {
            return Err(StorageError::Corruption(format!(
                "blob at segment {segment} ends at {end}, past end of file at {}",
                self.file_len
            )));
        }
        Ok((src_len as usize, compressed_len as usize))
    }

    /// Segments occupied by the blob starting at `segment`.
    fn blob_run(&mut self, segment: i32) -> Option<(usize, usize)> {
        match self.read_blob_header(segment) {
            Ok((_, compressed_len)) => Some((
                segment as usize,
                self.segments_for(BLOB_HEADER_LEN + compressed_len),
            )),
            Err(err) => {
                warn!(path = %self.path.display(), segment, %err, "unreadable blob header");
                None
            }
        }
    }

    fn rebuild_used_segments(&mut self) {
        self.used_segments = BitSet::new();
        for i in 0..self.index.len() {
            let segment = self.index[i];
            if segment == 0 {
                continue;
            }
            match self.blob_run(segment) {
                Some((first, count)) => self.used_segments.set_range(first, count),
                // Keep the first segment reserved so a later write cannot
                // land on top of whatever is there. Entries pointing past the
                // end of the file have nothing to protect.
                None => match self.segment_position(segment) {
                    Ok(position) if position < self.file_len => {
                        self.used_segments.set(segment as usize)
                    }
                    _ => warn!(
                        path = %self.path.display(),
                        slot = i,
                        segment,
                        "index entry points outside the file"
                    ),
                },
            }
        }
    }

    fn find_free_run(&self, count: usize) -> usize {
        let mut start = 1;
        let mut run = 0;
        let mut segment = 1;
        loop {
            if self.used_segments.get(segment) {
                run = 0;
            } else {
                if run == 0 {
                    start = segment;
                }
                run += 1;
                if run >= count {
                    return start;
                }
            }
            segment += 1;
        }
    }

    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(data)?;
        self.file_len = self.file_len.max(position + data.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_region_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("hystore_region_{}", rand::random::<u64>()))
            .join("0.0.region.bin")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    fn payload(seed: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(seed) ^ (i / 7) as u8).collect()
    }

    #[test]
    fn file_names() {
        assert_eq!(region_file_name(-1, 3), "-1.3.region.bin");
        assert_eq!(parse_region_file_name("-1.3.region.bin"), Some((-1, 3)));
        assert_eq!(parse_region_file_name("a.3.region.bin"), None);
        assert_eq!(parse_region_file_name("1.3.region"), None);
        assert_eq!(blob_index(3, 4).unwrap(), 131);
        assert!(matches!(blob_index(32, 0), Err(StorageError::Position(_))));
    }

    #[test]
    fn fresh_file_layout() {
        let path = temp_region_path();
        let region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        assert_eq!(region.file_len(), 32 + 4096);
        drop(region);

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..20], MAGIC);
        assert_eq!(&raw[20..32], &[0, 0, 0, 1, 0, 0, 4, 0, 0, 0, 16, 0]);
        assert!(raw[32..].iter().all(|&b| b == 0));
        cleanup(&path);
    }

    #[test]
    fn blob_roundtrip_across_reopen() {
        let path = temp_region_path();
        let data = payload(3, 5000);
        let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        assert_eq!(region.read_blob(3, 4).unwrap(), None);
        region.write_blob(3, 4, &data).unwrap();
        assert_eq!(region.first_segment(3, 4), Some(1));
        assert_eq!(region.read_blob(3, 4).unwrap().as_deref(), Some(&data[..]));
        region.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[32 + 131 * 4..32 + 132 * 4], &[0, 0, 0, 1]);
        let base = 32 + 4096;
        assert_eq!(&raw[base..base + 4], &5000i32.to_be_bytes());

        let mut region = RegionFile::open(&path, 3).unwrap();
        assert!(region.has_chunk(3, 4));
        assert!(!region.has_chunk(4, 3));
        assert_eq!(region.present_chunks(), vec![(3, 4)]);
        assert_eq!(region.segments_in_use(), 1);
        assert_eq!(region.read_blob(3, 4).unwrap().as_deref(), Some(&data[..]));
        cleanup(&path);
    }

    #[test]
    fn rewrite_moves_then_frees_segments() {
        let path = temp_region_path();
        let options = RegionOptions {
            segment_size: 64,
            ..RegionOptions::default()
        };
        let mut region = RegionFile::create(&path, &options).unwrap();
        region.write_blob(0, 0, &[1u8; 10]).unwrap();
        assert_eq!(region.first_segment(0, 0), Some(1));
        region.write_blob(1, 0, &[2u8; 10]).unwrap();
        assert_eq!(region.first_segment(1, 0), Some(2));

        // Rewriting chunk (0, 0) may not reuse segment 1 while it still holds the old copy.
        region.write_blob(0, 0, &[3u8; 10]).unwrap();
        assert_eq!(region.first_segment(0, 0), Some(3));
        assert_eq!(region.segments_in_use(), 2);

        // Segment 1 is free again.
        region.write_blob(2, 0, &[4u8; 10]).unwrap();
        assert_eq!(region.first_segment(2, 0), Some(1));
        assert_eq!(region.read_blob(0, 0).unwrap(), Some(vec![3u8; 10]));
        assert_eq!(region.read_blob(1, 0).unwrap(), Some(vec![2u8; 10]));
        assert_eq!(region.read_blob(2, 0).unwrap(), Some(vec![4u8; 10]));
        cleanup(&path);
    }

    #[test]
    fn multi_segment_blob() {
        let path = temp_region_path();
        let options = RegionOptions {
            segment_size: 64,
            compression_level: 1,
            ..RegionOptions::default()
        };
        let data: Vec<u8> = (0..4000u32).map(|_| rand::random::<u8>()).collect();
        let mut region = RegionFile::create(&path, &options).unwrap();
        region.write_blob(5, 5, &data).unwrap();
        assert!(region.segments_in_use() > 1);
        region.write_blob(6, 5, b"small").unwrap();
        let expected = region.segments_in_use() as i32;
        assert_eq!(region.first_segment(6, 5), Some(expected));
        region.close().unwrap();

        let mut region = RegionFile::open(&path, 1).unwrap();
        assert_eq!(region.segments_in_use() as i32, expected);
        assert_eq!(region.read_blob(5, 5).unwrap(), Some(data));
        cleanup(&path);
    }

    #[test]
    fn bad_magic_is_format_error() {
        let path = temp_region_path();
        RegionFile::create(&path, &RegionOptions::default()).unwrap();
        let mut raw = std::fs::read(&path).unwrap();
        raw[0] = b'X';
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(
            RegionFile::open(&path, 3),
            Err(StorageError::Format(_))
        ));
        cleanup(&path);
    }

    #[test]
    fn short_header_and_version() {
        let path = temp_region_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, &MAGIC[..]).unwrap();
        assert!(matches!(
            RegionFile::open(&path, 3),
            Err(StorageError::Format(_))
        ));

        RegionFile::create(&path, &RegionOptions::default()).unwrap();
        let mut raw = std::fs::read(&path).unwrap();
        raw[23] = 2;
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(
            RegionFile::open(&path, 3),
            Err(StorageError::Format(_))
        ));
        cleanup(&path);
    }

    #[test]
    fn truncated_blob_is_corruption() {
        let path = temp_region_path();
        let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        region.write_blob(0, 1, &payload(7, 3000)).unwrap();
        region.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() - 10]).unwrap();
        let mut region = RegionFile::open(&path, 3).unwrap();
        assert!(region.has_chunk(0, 1));
        let err = region.read_blob(0, 1).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)), "{err:?}");
        cleanup(&path);
    }

    #[test]
    fn length_mismatch_is_corruption() {
        let path = temp_region_path();
        let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        region.write_blob(0, 0, &payload(5, 100)).unwrap();
        region.close().unwrap();

        let mut raw = std::fs::read(&path).unwrap();
        let base = 32 + 4096;
        raw[base..base + 4].copy_from_slice(&99i32.to_be_bytes());
        std::fs::write(&path, &raw).unwrap();
        let mut region = RegionFile::open(&path, 3).unwrap();
        assert!(matches!(
            region.read_blob(0, 0),
            Err(StorageError::Corruption(_))
        ));
        cleanup(&path);
    }

    #[test]
    fn index_outside_small_region() {
        let path = temp_region_path();
        let options = RegionOptions {
            blob_count: 64,
            ..RegionOptions::default()
        };
        let mut region = RegionFile::create(&path, &options).unwrap();
        region.write_blob(31, 1, b"edge").unwrap();
        assert!(matches!(
            region.write_blob(0, 2, b"past"),
            Err(StorageError::Position(_))
        ));
        assert!(!region.has_chunk(0, 2));
        cleanup(&path);
    }

    #[test]
    fn open_or_create_and_missing_file() {
        let path = temp_region_path();
        assert!(matches!(
            RegionFile::open(&path, 3),
            Err(StorageError::Io(_))
        ));
        let mut region = RegionFile::open_or_create(&path, &RegionOptions::default()).unwrap();
        region.write_blob(1, 1, b"kept").unwrap();
        region.close().unwrap();
        let mut region = RegionFile::open_or_create(&path, &RegionOptions::default()).unwrap();
        assert_eq!(region.read_blob(1, 1).unwrap(), Some(b"kept".to_vec()));
        cleanup(&path);
    }

    #[test]
    fn chunk_roundtrip() {
        let path = temp_region_path();
        let mut chunk = ChunkColumn::new(-31, 40);
        chunk.set_material(1, 2, 3, "Rock_Stone").unwrap();
        let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        region.write_chunk(&chunk).unwrap();
        assert!(region.has_chunk(1, 8));
        let loaded = region.read_chunk(-31, 40).unwrap().unwrap();
        assert_eq!(loaded, chunk);
        cleanup(&path);
    }

    #[test]
    fn index_entry_past_end_is_not_reserved() {
        let path = temp_region_path();
        let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        region.write_blob(0, 0, &payload(3, 200)).unwrap();
        region.close().unwrap();

        let mut raw = std::fs::read(&path).unwrap();
        let entry = HEADER_LEN + 4;
        raw[entry..entry + 4].copy_from_slice(&i32::MAX.to_be_bytes());
        std::fs::write(&path, &raw).unwrap();

        let mut region = RegionFile::open(&path, 3).unwrap();
        assert_eq!(region.segments_in_use(), 1);
        assert!(region.used_segments.to_words().len() <= 1);
        assert!(region.has_chunk(1, 0));
        assert!(matches!(
            region.read_blob(1, 0),
            Err(StorageError::Corruption(_))
        ));
        region.write_blob(2, 0, b"next").unwrap();
        assert_eq!(region.first_segment(2, 0), Some(2));
        assert_eq!(region.read_blob(0, 0).unwrap(), Some(payload(3, 200)));
        cleanup(&path);
    }

    #[test]
    fn failed_write_leaves_state_untouched() {
        let path = temp_region_path();
        let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();
        region.write_blob(0, 0, &payload(9, 500)).unwrap();
        let in_use = region.segments_in_use();

        region.file = File::open(&path).unwrap();
        assert!(matches!(
            region.write_blob(0, 0, &payload(4, 500)),
            Err(StorageError::Io(_))
        ));
        assert_eq!(region.first_segment(0, 0), Some(1));
        assert_eq!(region.segments_in_use(), in_use);

        region.file = File::options().read(true).write(true).open(&path).unwrap();
        region.write_blob(1, 0, &payload(6, 500)).unwrap();
        assert_eq!(region.first_segment(1, 0), Some(2));
        assert_eq!(region.read_blob(0, 0).unwrap(), Some(payload(9, 500)));
        assert_eq!(region.read_blob(1, 0).unwrap(), Some(payload(6, 500)));
        cleanup(&path);
    }
}
