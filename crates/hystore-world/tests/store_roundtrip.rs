use std::path::PathBuf;

use hystore_world::chunk::CHUNK_SIZE;
use hystore_world::light::{sky, FULL_SKYLIGHT};
use hystore_world::palette::PaletteType;
use hystore_world::region::{RegionFile, BLOB_HEADER_LEN, HEADER_LEN};
use hystore_world::section::rotation_key;
use hystore_world::{ChunkColumn, ChunkStore, RegionOptions, StorageError};

fn temp_world() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hystore_it_{}", rand::random::<u64>()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A column the way a world populator fills one: terrain up to a height,
/// water above it up to sea level, sky light derived at the end.
fn populated_chunk(x: i32, z: i32) -> ChunkColumn {
    let mut chunk = ChunkColumn::new(x, z);
    for lz in 0..CHUNK_SIZE {
        for lx in 0..CHUNK_SIZE {
            let height = 50 + ((lx + lz) % 20) as i32;
            for y in 0..=height {
                let id = match y {
                    0 => "Rock_Bedrock",
                    y if y < height - 3 => "Rock_Stone",
                    y if y < height => "Soil_Dirt",
                    _ => "Soil_Grass",
                };
                chunk.set_material(lx, y, lz, id).unwrap();
            }
            for y in height + 1..=62 {
                chunk.set_fluid(lx, y, lz, "Water_Source", 1).unwrap();
            }
            chunk.set_tint(lx, lz, 0x0030_9020);
            if lx % 8 == 0 {
                chunk.environment_mut().fill_column(lx, lz, "Zone1_Shore").unwrap();
            }
        }
    }
    chunk.set_material(4, 80, 4, "Wood_Oak_Trunk").unwrap();
    chunk.set_rotation(4, 80, 4, rotation_key(1, 0, 0)).unwrap();
    chunk.set_ticking(4, 80, 4, true).unwrap();
    chunk.compute_sky_light();
    chunk
}

#[test]
fn single_segment_blob_lands_at_index_131() {
    let dir = temp_world();
    let path = dir.join("chunks").join("0.0.region.bin");
    let mut region = RegionFile::create(&path, &RegionOptions::default()).unwrap();

    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8 ^ (i / 500) as u8).collect();
    region.write_blob(3, 4, &data).unwrap();
    assert_eq!(region.segments_in_use(), 1);
    region.close().unwrap();

    let raw = std::fs::read(&path).unwrap();
    let entry = HEADER_LEN + 131 * 4;
    assert_eq!(&raw[entry..entry + 4], &1i32.to_be_bytes());
    let base = HEADER_LEN + 1024 * 4;
    let compressed_len =
        i32::from_be_bytes([raw[base + 4], raw[base + 5], raw[base + 6], raw[base + 7]]) as usize;
    assert!(BLOB_HEADER_LEN + compressed_len <= 4096);
    assert_eq!(raw.len(), base + BLOB_HEADER_LEN + compressed_len);

    let mut region = RegionFile::open(&path, 3).unwrap();
    assert_eq!(region.read_blob(3, 4).unwrap(), Some(data));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn populated_chunks_survive_store_reopen() {
    let dir = temp_world();
    let coords = [(0, 0), (31, 31), (32, 0), (-1, -1), (-64, 95)];
    let chunks: Vec<ChunkColumn> = coords.iter().map(|&(x, z)| populated_chunk(x, z)).collect();

    let mut store = ChunkStore::new(&dir, RegionOptions::default());
    store
        .do_in_transaction(|store| {
            for chunk in &chunks {
                store.save_chunk(chunk)?;
            }
            Ok(())
        })
        .unwrap();
    store.close().unwrap();

    let mut store = ChunkStore::new(&dir, RegionOptions::default());
    for (chunk, &(x, z)) in chunks.iter().zip(&coords) {
        assert!(store.is_chunk_present(x, z).unwrap());
        let loaded = store.get_chunk(x, z).unwrap().unwrap();
        assert_eq!(&loaded, chunk);
    }
    assert!(!store.is_chunk_present(1, 0).unwrap());

    let loaded = store.get_chunk(-1, -1).unwrap().unwrap();
    assert_eq!(loaded.get_material(0, 0, 0), "Rock_Bedrock");
    assert_eq!(loaded.get_material(4, 80, 4), "Wood_Oak_Trunk");
    assert_eq!(loaded.get_rotation(4, 80, 4), 16);
    assert!(loaded.section(2).is_ticking(hystore_world::light::index_block(4, 16, 4)));
    assert_eq!(loaded.height(4, 4), 80);
    assert_eq!(loaded.height(0, 0), 50);
    assert_eq!(loaded.get_fluid(0, 62, 0), ("Water_Source", 1));
    assert_eq!(loaded.get_fluid(0, 50, 0), ("Empty", 0));
    assert_eq!(loaded.environment().get(8, 10, 3), "Zone1_Shore");
    assert_eq!(loaded.environment().get(9, 10, 3), "Default");
    assert_eq!(loaded.get_light(1, 200, 1), FULL_SKYLIGHT);
    assert_eq!(sky(loaded.get_light(0, 49, 0)), 0);
    assert_eq!(loaded.section(9).blocks().palette_type(), PaletteType::Empty);
    assert_eq!(loaded.section(0).blocks().palette_type(), PaletteType::HalfByte);

    let mut visited = Vec::new();
    store
        .visit_chunks(|chunk| {
            visited.push((chunk.x(), chunk.z()));
            true
        })
        .unwrap();
    visited.sort_unstable();
    let mut expected = coords.to_vec();
    expected.sort_unstable();
    assert_eq!(visited, expected);
    assert_eq!(store.chunk_count().unwrap(), 4 * 1024);

    store.close().unwrap();
    store.close().unwrap();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn rewritten_chunk_replaces_old_copy() {
    let dir = temp_world();
    let mut store = ChunkStore::new(&dir, RegionOptions::default());
    let mut chunk = populated_chunk(3, 4);
    store.save_chunk(&chunk).unwrap();

    for y in 0..200 {
        chunk.set_material(10, y, 10, "Rock_Marble").unwrap();
    }
    store.save_chunk(&chunk).unwrap();
    store.flush().unwrap();

    let loaded = store.get_chunk_for_editing(3, 4).unwrap().unwrap();
    assert_eq!(loaded.get_material(10, 150, 10), "Rock_Marble");
    assert_eq!(loaded.height(10, 10), 199);
    store.close().unwrap();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn corrupted_region_is_reported() {
    let dir = temp_world();
    let mut store = ChunkStore::new(&dir, RegionOptions::default());
    store.save_chunk(&populated_chunk(0, 0)).unwrap();
    store.close().unwrap();

    let path = store.regions_dir().join("0.0.region.bin");
    let mut raw = std::fs::read(&path).unwrap();
    raw[..4].copy_from_slice(b"Nope");
    std::fs::write(&path, &raw).unwrap();

    let err = store.get_chunk(0, 0).unwrap_err();
    assert!(matches!(err, StorageError::Format(_)), "{err:?}");
    std::fs::remove_dir_all(&dir).ok();
}
