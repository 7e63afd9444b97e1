//! Chunk columns to and from their BSON component documents.
//!
//! A stored chunk is `{ "Components": { ... } }` with one sub-document per
//! engine component. Section, environment and height data travel as binary
//! payloads inside those documents.

use bytes::{Buf, BufMut, BytesMut};
use hystore_bson::{Bson, Document};

use crate::chunk::{ChunkColumn, SECTION_COUNT};
use crate::environment::{EnvironmentChunk, COLUMN_COUNT};
use crate::error::{Result, StorageError};
use crate::fluid::FluidSection;
use crate::heightmap::{read_column_palette, write_column_palette};
use crate::section::BlockSection;
use crate::wire;

pub const BLOCK_SECTION_VERSION: i32 = 6;
pub const BLOCK_CHUNK_VERSION: i32 = 3;
pub const BLOCK_HEALTH_VERSION: u8 = 2;

const COMPONENTS: &str = "Components";
const BLOCK_COMPONENT_CHUNK: &str = "BlockComponentChunk";
const CHUNK_COLUMN: &str = "ChunkColumn";
const WORLD_CHUNK: &str = "WorldChunk";
const BLOCK_HEALTH_CHUNK: &str = "BlockHealthChunk";
const ENVIRONMENT_CHUNK: &str = "EnvironmentChunk";
const BLOCK_CHUNK: &str = "BlockChunk";
const ENTITY_CHUNK: &str = "EntityChunk";

const CHUNK_SECTION: &str = "ChunkSection";
const BLOCK_PHYSICS: &str = "BlockPhysics";
const FLUID: &str = "Fluid";
const BLOCK: &str = "Block";

/// Build the component document for a chunk.
pub fn chunk_to_document(chunk: &ChunkColumn) -> Document {
    let sections: Vec<Bson> = chunk
        .sections()
        .iter()
        .zip(chunk.fluid_sections())
        .map(|(blocks, fluids)| section_holder(blocks, fluids).into())
        .collect();

    let mut health = BytesMut::with_capacity(9);
    health.put_u8(BLOCK_HEALTH_VERSION);
    health.put_i32(0);
    health.put_i32(0);

    let mut environment = BytesMut::new();
    chunk.environment().write(&mut environment);

    let mut block_chunk = BytesMut::new();
    block_chunk.put_u8(u8::from(chunk.needs_physics()));
    write_column_palette(&mut block_chunk, chunk.heightmap());
    write_column_palette(&mut block_chunk, chunk.tintmap());

    let components = Document::new()
        .with(
            BLOCK_COMPONENT_CHUNK,
            Document::new().with("BlockComponents", Document::new()),
        )
        .with(CHUNK_COLUMN, Document::new().with("Sections", sections))
        .with(WORLD_CHUNK, Document::new())
        .with(BLOCK_HEALTH_CHUNK, Document::new().with("Data", health.to_vec()))
        .with(
            ENVIRONMENT_CHUNK,
            Document::new().with("Data", environment.to_vec()),
        )
        .with(
            BLOCK_CHUNK,
            Document::new()
                .with("Version", BLOCK_CHUNK_VERSION)
                .with("Data", block_chunk.to_vec()),
        )
        .with(
            ENTITY_CHUNK,
            Document::new().with("Entities", Vec::<Bson>::new()),
        );
    Document::new().with(COMPONENTS, components)
}

fn section_holder(blocks: &BlockSection, fluids: &FluidSection) -> Document {
    let mut fluid_data = BytesMut::new();
    fluids.write(&mut fluid_data);
    let mut block_data = BytesMut::new();
    blocks.write(&mut block_data);

    let components = Document::new()
        .with(CHUNK_SECTION, Document::new())
        .with(BLOCK_PHYSICS, Document::new().with("Data", vec![0u8]))
        .with(FLUID, Document::new().with("Data", fluid_data.to_vec()))
        .with(
            BLOCK,
            Document::new()
                .with("Version", BLOCK_SECTION_VERSION)
                .with("Data", block_data.to_vec()),
        );
    Document::new().with(COMPONENTS, components)
}

/// Rebuild a chunk from its component document. Missing components take
/// their defaults; a present but malformed component fails the whole chunk.
pub fn chunk_from_document(doc: &Document, x: i32, z: i32) -> Result<ChunkColumn> {
    let components = doc
        .get_document(COMPONENTS)
        .ok_or(StorageError::MissingField(COMPONENTS))?;

    let mut sections = vec![BlockSection::new(); SECTION_COUNT];
    let mut fluids = vec![FluidSection::new(); SECTION_COUNT];
    if let Some(column) = components.get_document(CHUNK_COLUMN) {
        let holders = column
            .get_array("Sections")
            .ok_or(StorageError::MissingField("Sections"))?;
        if holders.len() > SECTION_COUNT {
            return Err(StorageError::Corruption(format!(
                "{} sections in a {SECTION_COUNT}-section column",
                holders.len()
            )));
        }
        for (i, holder) in holders.iter().enumerate() {
            let holder = holder
                .as_document()
                .and_then(|h| h.get_document(COMPONENTS))
                .ok_or(StorageError::MissingField(COMPONENTS))?;
            if let Some(block) = holder.get_document(BLOCK) {
                sections[i] = decode_payload(data_of(block)?, BLOCK, BlockSection::read)?;
            }
            if let Some(fluid) = holder.get_document(FLUID) {
                fluids[i] = decode_payload(data_of(fluid)?, FLUID, FluidSection::read)?;
            }
        }
    }

    let environment = match components.get_document(ENVIRONMENT_CHUNK) {
        Some(env) => decode_payload(data_of(env)?, ENVIRONMENT_CHUNK, EnvironmentChunk::read)?,
        None => EnvironmentChunk::new(),
    };

    let (needs_physics, heightmap, tintmap) = match components.get_document(BLOCK_CHUNK) {
        Some(block_chunk) => decode_payload(data_of(block_chunk)?, BLOCK_CHUNK, |buf| {
            let needs_physics = wire::read_bool(buf)?;
            let heightmap = read_column_palette::<i16>(buf)?;
            let tintmap = read_column_palette::<i32>(buf)?;
            Ok((needs_physics, heightmap, tintmap))
        })?,
        None => (false, [0; COLUMN_COUNT], [0; COLUMN_COUNT]),
    };

    Ok(ChunkColumn::from_parts(
        x,
        z,
        sections,
        fluids,
        environment,
        heightmap,
        tintmap,
        needs_physics,
    ))
}

/// Serialize a chunk to uncompressed BSON bytes.
pub fn encode_chunk(chunk: &ChunkColumn) -> Vec<u8> {
    hystore_bson::to_vec(&chunk_to_document(chunk))
}

/// Parse uncompressed BSON bytes into the chunk at `(x, z)`.
pub fn decode_chunk(data: &[u8], x: i32, z: i32) -> Result<ChunkColumn> {
    let doc = hystore_bson::from_slice(data)?;
    chunk_from_document(&doc, x, z)
}

fn data_of(component: &Document) -> Result<&[u8]> {
    component
        .get_binary("Data")
        .ok_or(StorageError::MissingField("Data"))
}

/// Run a payload reader over `data`, requiring it to consume every byte.
fn decode_payload<'a, T>(
    data: &'a [u8],
    component: &str,
    read: impl FnOnce(&mut &'a [u8]) -> Result<T>,
) -> Result<T> {
    let mut buf = data;
    let value = read(&mut buf)?;
    if buf.has_remaining() {
        return Err(StorageError::Corruption(format!(
            "{} trailing bytes after {component} payload",
            buf.remaining()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DEFAULT_ENVIRONMENT;

    fn sample_chunk() -> ChunkColumn {
        let mut chunk = ChunkColumn::new(-3, 7);
        for z in 0..32 {
            for x in 0..32 {
                for y in 0..60 {
                    let id = if y < 56 { "Rock_Stone" } else { "Soil_Grass" };
                    chunk.set_material(x, y, z, id).unwrap();
                }
                chunk.set_tint(x, z, 0x0044_AA22 + (x as i32));
            }
        }
        chunk.set_material(5, 60, 5, "Plant_Flower").unwrap();
        chunk.set_ticking(5, 60, 5, true).unwrap();
        chunk.set_rotation(5, 60, 5, 20).unwrap();
        chunk.set_fluid(9, 62, 9, "Water_Source", 1).unwrap();
        chunk.set_fluid(9, 63, 9, "Water", 6).unwrap();
        chunk.environment_mut().fill("Zone1_Plains").unwrap();
        chunk.environment_mut().set(2, 20, 2, "Zone1_Caves").unwrap();
        chunk.compute_sky_light();
        chunk
    }

    #[test]
    fn component_order() {
        let doc = chunk_to_document(&ChunkColumn::new(0, 0));
        let components = doc.get_document(COMPONENTS).unwrap();
        let keys: Vec<&str> = components.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            [
                BLOCK_COMPONENT_CHUNK,
                CHUNK_COLUMN,
                WORLD_CHUNK,
                BLOCK_HEALTH_CHUNK,
                ENVIRONMENT_CHUNK,
                BLOCK_CHUNK,
                ENTITY_CHUNK,
            ]
        );

        let sections = components
            .get_document(CHUNK_COLUMN)
            .and_then(|c| c.get_array("Sections"))
            .unwrap();
        assert_eq!(sections.len(), SECTION_COUNT);
        let holder = sections[0]
            .as_document()
            .and_then(|h| h.get_document(COMPONENTS))
            .unwrap();
        let keys: Vec<&str> = holder.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [CHUNK_SECTION, BLOCK_PHYSICS, FLUID, BLOCK]);
        assert_eq!(
            holder.get_document(BLOCK).unwrap().get_i32("Version"),
            Some(BLOCK_SECTION_VERSION)
        );
        assert_eq!(
            holder.get_document(BLOCK_PHYSICS).unwrap().get_binary("Data"),
            Some(&[0u8][..])
        );
        assert_eq!(
            components
                .get_document(BLOCK_HEALTH_CHUNK)
                .unwrap()
                .get_binary("Data"),
            Some(&[2u8, 0, 0, 0, 0, 0, 0, 0, 0][..])
        );
    }

    #[test]
    fn chunk_roundtrip() {
        let chunk = sample_chunk();
        let bytes = encode_chunk(&chunk);
        let decoded = decode_chunk(&bytes, -3, 7).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(decoded.get_material(5, 60, 5), "Plant_Flower");
        assert_eq!(decoded.height(5, 5), 60);
        assert_eq!(decoded.height(0, 0), 59);
        assert_eq!(decoded.get_fluid(9, 62, 9), ("Water_Source", 1));
        assert_eq!(decoded.environment().get(2, 20, 2), "Zone1_Caves");
        assert_eq!(decoded.tint(31, 0), 0x0044_AA22 + 31);
    }

    #[test]
    fn missing_components_take_defaults() {
        let doc = Document::new().with(COMPONENTS, Document::new());
        let chunk = chunk_from_document(&doc, 1, 2).unwrap();
        assert_eq!(chunk, ChunkColumn::new(1, 2));
        assert_eq!(chunk.environment().get(0, 0, 0), DEFAULT_ENVIRONMENT);
    }

    #[test]
    fn sections_without_block_chunk() {
        let full = chunk_to_document(&sample_chunk());
        let components = full.get_document(COMPONENTS).unwrap();
        let partial = Document::new().with(
            COMPONENTS,
            Document::new().with(
                CHUNK_COLUMN,
                components.get_document(CHUNK_COLUMN).unwrap().clone(),
            ),
        );
        let chunk = chunk_from_document(&partial, 0, 0).unwrap();
        assert_eq!(chunk.get_material(0, 0, 0), "Rock_Stone");
        assert_eq!(chunk.height(0, 0), 0);
    }

    #[test]
    fn malformed_section_fails_chunk() {
        let holder = Document::new().with(
            COMPONENTS,
            Document::new().with(
                BLOCK,
                Document::new()
                    .with("Version", BLOCK_SECTION_VERSION)
                    .with("Data", vec![0u8, 0, 0, 0, 9]),
            ),
        );
        let doc = Document::new().with(
            COMPONENTS,
            Document::new().with(
                CHUNK_COLUMN,
                Document::new().with("Sections", vec![Bson::from(holder)]),
            ),
        );
        let err = chunk_from_document(&doc, 0, 0).unwrap_err();
        assert!(err.is_corruption(), "{err:?}");
    }

    #[test]
    fn trailing_payload_bytes() {
        let mut data = BytesMut::new();
        FluidSection::new().write(&mut data);
        data.put_u8(0xFF);
        let err = decode_payload(&data, FLUID, FluidSection::read).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn missing_data_field() {
        let doc = Document::new().with(
            COMPONENTS,
            Document::new().with(ENVIRONMENT_CHUNK, Document::new()),
        );
        assert!(matches!(
            chunk_from_document(&doc, 0, 0),
            Err(StorageError::MissingField("Data"))
        ));
    }

    #[test]
    fn bson_errors_are_corruption() {
        let err = decode_chunk(&[5, 0, 0, 0], 0, 0).unwrap_err();
        assert!(err.is_corruption());
    }
}
