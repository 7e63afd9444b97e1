//! Chunk storage in the Hytale region format: palettes, light octrees,
//! chunk columns, their BSON encoding, region files and a world-level store.

pub mod bitset;
pub mod chunk;
pub mod codec;
pub mod compression;
pub mod environment;
pub mod error;
pub mod fluid;
pub mod heightmap;
pub mod light;
pub mod options;
pub mod palette;
pub mod region;
pub mod section;
pub mod store;
mod wire;

pub use chunk::ChunkColumn;
pub use error::{Result, StorageError};
pub use options::RegionOptions;
pub use region::RegionFile;
pub use store::ChunkStore;
