//! Chunk columns: 32x320x32 blocks split into ten 32-block-high sections.

use crate::environment::{EnvironmentChunk, COLUMN_COUNT};
use crate::error::{Result, StorageError};
use crate::fluid::FluidSection;
use crate::light::{index_block, FULL_SKYLIGHT, NO_LIGHT};
use crate::palette::SetResult;
use crate::section::{BlockSection, EMPTY_BLOCK};

/// Sections per column.
pub const SECTION_COUNT: usize = 10;

/// Edge length of a chunk and of a section.
pub const CHUNK_SIZE: usize = 32;

/// Column height in blocks.
pub const CHUNK_HEIGHT: i32 = (SECTION_COUNT * CHUNK_SIZE) as i32;

/// Section holding world height `y`.
pub fn section_index(y: i32) -> usize {
    (y >> 5) as usize
}

fn column_index(x: usize, z: usize) -> usize {
    (z & 31) * CHUNK_SIZE + (x & 31)
}

/// A full chunk column.
///
/// `x` and `z` are chunk coordinates. Block coordinates taken by the
/// accessors are local: `x` and `z` are masked to `0..32`, `y` must lie in
/// `0..320`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    x: i32,
    z: i32,
    sections: Vec<BlockSection>,
    fluids: Vec<FluidSection>,
    environment: EnvironmentChunk,
    heightmap: [i16; COLUMN_COUNT],
    tintmap: [i32; COLUMN_COUNT],
    needs_physics: bool,
}

impl ChunkColumn {
    /// An empty column: all air, no fluid, height 0, `Default` environment.
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            sections: vec![BlockSection::new(); SECTION_COUNT],
            fluids: vec![FluidSection::new(); SECTION_COUNT],
            environment: EnvironmentChunk::new(),
            heightmap: [0; COLUMN_COUNT],
            tintmap: [0; COLUMN_COUNT],
            needs_physics: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        x: i32,
        z: i32,
        sections: Vec<BlockSection>,
        fluids: Vec<FluidSection>,
        environment: EnvironmentChunk,
        heightmap: [i16; COLUMN_COUNT],
        tintmap: [i32; COLUMN_COUNT],
        needs_physics: bool,
    ) -> Self {
        debug_assert_eq!(sections.len(), SECTION_COUNT);
        debug_assert_eq!(fluids.len(), SECTION_COUNT);
        Self {
            x,
            z,
            sections,
            fluids,
            environment,
            heightmap,
            tintmap,
            needs_physics,
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn sections(&self) -> &[BlockSection] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> &BlockSection {
        &self.sections[index]
    }

    pub fn section_mut(&mut self, index: usize) -> &mut BlockSection {
        &mut self.sections[index]
    }

    pub fn fluid_sections(&self) -> &[FluidSection] {
        &self.fluids
    }

    pub fn environment(&self) -> &EnvironmentChunk {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut EnvironmentChunk {
        &mut self.environment
    }

    pub fn heightmap(&self) -> &[i16; COLUMN_COUNT] {
        &self.heightmap
    }

    pub fn tintmap(&self) -> &[i32; COLUMN_COUNT] {
        &self.tintmap
    }

    pub fn needs_physics(&self) -> bool {
        self.needs_physics
    }

    pub fn set_needs_physics(&mut self, needs_physics: bool) {
        self.needs_physics = needs_physics;
    }

    pub fn height(&self, x: usize, z: usize) -> i32 {
        self.heightmap[column_index(x, z)] as i32
    }

    /// Fails with [`StorageError::Position`] if `height` does not fit the
    /// heightmap's `i16` entries.
    pub fn set_height(&mut self, x: usize, z: usize, height: i32) -> Result<()> {
        let height = i16::try_from(height)
            .map_err(|_| StorageError::Position(format!("height {height} out of range")))?;
        self.heightmap[column_index(x, z)] = height;
        Ok(())
    }

    /// Packed ARGB tint of a column.
    pub fn tint(&self, x: usize, z: usize) -> i32 {
        self.tintmap[column_index(x, z)]
    }

    pub fn set_tint(&mut self, x: usize, z: usize, tint: i32) {
        self.tintmap[column_index(x, z)] = tint;
    }

    pub fn get_material(&self, x: usize, y: i32, z: usize) -> &str {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return EMPTY_BLOCK;
        }
        self.sections[section_index(y)].get_block(block_index(x, y, z))
    }

    /// Set a block, keeping the heightmap on the topmost non-air block.
    pub fn set_material(&mut self, x: usize, y: i32, z: usize, id: &str) -> Result<SetResult> {
        check_y(y)?;
        let result = self.sections[section_index(y)].set_block(block_index(x, y, z), id)?;
        if result == SetResult::Unchanged {
            return Ok(result);
        }
        let height = self.height(x, z);
        if id != EMPTY_BLOCK {
            if y > height {
                self.set_height(x, z, y)?;
            }
        } else if y == height {
            let top = (0..y)
                .rev()
                .find(|&below| self.get_material(x, below, z) != EMPTY_BLOCK)
                .unwrap_or(0);
            self.set_height(x, z, top)?;
        }
        Ok(result)
    }

    /// Set a rotation key (see [`crate::section::rotation_key`]).
    pub fn set_rotation(&mut self, x: usize, y: i32, z: usize, rotation: u8) -> Result<SetResult> {
        check_y(y)?;
        self.sections[section_index(y)].set_rotation(block_index(x, y, z), rotation)
    }

    pub fn get_rotation(&self, x: usize, y: i32, z: usize) -> u8 {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return 0;
        }
        self.sections[section_index(y)].get_rotation(block_index(x, y, z))
    }

    pub fn set_ticking(&mut self, x: usize, y: i32, z: usize, ticking: bool) -> Result<bool> {
        check_y(y)?;
        self.sections[section_index(y)].set_ticking(block_index(x, y, z), ticking)
    }

    pub fn get_fluid(&self, x: usize, y: i32, z: usize) -> (&str, u8) {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return (EMPTY_BLOCK, 0);
        }
        let section = &self.fluids[section_index(y)];
        let index = block_index(x, y, z);
        (section.get_fluid(index), section.get_level(index))
    }

    pub fn set_fluid(
        &mut self,
        x: usize,
        y: i32,
        z: usize,
        id: &str,
        level: u8,
    ) -> Result<SetResult> {
        check_y(y)?;
        self.fluids[section_index(y)].set_fluid(block_index(x, y, z), id, level)
    }

    /// Set the local light of one block.
    #[allow(clippy::too_many_arguments)]
    pub fn set_light(
        &mut self,
        x: usize,
        y: i32,
        z: usize,
        red: u8,
        green: u8,
        blue: u8,
        sky: u8,
    ) -> Result<()> {
        check_y(y)?;
        self.sections[section_index(y)].local_light_mut().set_light(
            x & 31,
            (y & 31) as usize,
            z & 31,
            red,
            green,
            blue,
            sky,
        );
        Ok(())
    }

    pub fn get_light(&self, x: usize, y: i32, z: usize) -> u16 {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return FULL_SKYLIGHT;
        }
        self.sections[section_index(y)]
            .local_light()
            .get_light_raw(block_index(x, y, z))
    }

    /// Derive sky light from the heightmap: sky 15 at and above each
    /// column's height, dark below. Replaces both light octrees of every
    /// section.
    pub fn compute_sky_light(&mut self) {
        let min_height = self.heightmap.iter().copied().min().unwrap_or(0) as i32;
        let max_height = self.heightmap.iter().copied().max().unwrap_or(0) as i32;
        let heightmap = self.heightmap;

        for (s, section) in self.sections.iter_mut().enumerate() {
            let base = (s * CHUNK_SIZE) as i32;
            let top = base + CHUNK_SIZE as i32 - 1;
            for light in section.lights_mut() {
                if base >= max_height {
                    light.fill(FULL_SKYLIGHT);
                } else if top < min_height {
                    light.fill(NO_LIGHT);
                } else {
                    light.fill(NO_LIGHT);
                    for z in 0..CHUNK_SIZE {
                        for x in 0..CHUNK_SIZE {
                            let height = heightmap[column_index(x, z)] as i32;
                            for y in height.max(base)..=top {
                                light.set_light(x, (y - base) as usize, z, 0, 0, 0, 15);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Free every section's light arenas.
    pub fn release_light(&mut self) {
        for section in &mut self.sections {
            section.release_light();
        }
    }

    /// Non-air blocks across all sections.
    pub fn block_count(&self) -> u32 {
        let empty = EMPTY_BLOCK.to_owned();
        self.sections
            .iter()
            .map(|s| crate::palette::SECTION_VOLUME as u32 - s.blocks().count_of(&empty))
            .sum()
    }

    /// Fluid blocks across all sections.
    pub fn fluid_count(&self) -> u32 {
        self.fluids.iter().map(FluidSection::fluid_block_count).sum()
    }

    /// Lowest and highest heightmap entries.
    pub fn height_range(&self) -> (i32, i32) {
        let min = self.heightmap.iter().copied().min().unwrap_or(0);
        let max = self.heightmap.iter().copied().max().unwrap_or(0);
        (min as i32, max as i32)
    }
}

fn block_index(x: usize, y: i32, z: usize) -> usize {
    index_block(x, (y & 31) as usize, z)
}

fn check_y(y: i32) -> Result<()> {
    if (0..CHUNK_HEIGHT).contains(&y) {
        Ok(())
    } else {
        Err(StorageError::Position(format!(
            "y {y} outside column 0..{CHUNK_HEIGHT}"
        )))
    }
}
