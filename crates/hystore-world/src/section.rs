//! Block sections: one 32x32x32 slice of a chunk column.

use bytes::{Buf, BufMut};

use crate::bitset::BitSet;
use crate::error::{Result, StorageError};
use crate::light::{LightOctree, NO_LIGHT};
use crate::palette::{PaletteType, SectionPalette, SetResult, SECTION_VOLUME};
use crate::wire;

/// The block id meaning air.
pub const EMPTY_BLOCK: &str = "Empty";

/// Block migration version written at the start of every section.
pub const BLOCK_MIGRATION_VERSION: i32 = 0;

const TICKING_WORDS: usize = SECTION_VOLUME / 64;

/// Pack a rotation from three quarter-turn counts, `rx * 16 + ry * 4 + rz`.
pub fn rotation_key(rx: u8, ry: u8, rz: u8) -> u8 {
    (rx & 3) * 16 + (ry & 3) * 4 + (rz & 3)
}

/// Blocks, filler data, rotations, ticking flags and light for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSection {
    migration_version: i32,
    blocks: SectionPalette<String>,
    fillers: SectionPalette<u16>,
    rotations: SectionPalette<u8>,
    ticking: BitSet,
    local_light: LightOctree,
    global_light: LightOctree,
    local_changes: u16,
    global_changes: u16,
}

impl Default for BlockSection {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockSection {
    pub fn new() -> Self {
        Self {
            migration_version: BLOCK_MIGRATION_VERSION,
            blocks: SectionPalette::new(),
            fillers: SectionPalette::new(),
            rotations: SectionPalette::new(),
            ticking: BitSet::new(),
            local_light: LightOctree::new(0, NO_LIGHT),
            global_light: LightOctree::new(0, NO_LIGHT),
            local_changes: 0,
            global_changes: 0,
        }
    }

    /// Whether every block is air.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_uniform_default()
    }

    pub fn blocks(&self) -> &SectionPalette<String> {
        &self.blocks
    }

    pub fn get_block(&self, index: usize) -> &str {
        self.blocks.get(index)
    }

    /// Set one block. Setting air also clears the block's ticking flag.
    pub fn set_block(&mut self, index: usize, id: &str) -> Result<SetResult> {
        let result = self.blocks.set(index, &id.to_owned())?;
        if result != SetResult::Unchanged {
            if id == EMPTY_BLOCK {
                self.ticking.clear(index);
            }
            self.mark_changed();
        }
        Ok(result)
    }

    pub fn get_filler(&self, index: usize) -> u16 {
        *self.fillers.get(index)
    }

    pub fn set_filler(&mut self, index: usize, filler: u16) -> Result<SetResult> {
        let result = self.fillers.set(index, &filler)?;
        if result != SetResult::Unchanged {
            self.mark_changed();
        }
        Ok(result)
    }

    pub fn get_rotation(&self, index: usize) -> u8 {
        *self.rotations.get(index)
    }

    /// Set a rotation key in `0..=63`; see [`rotation_key`].
    pub fn set_rotation(&mut self, index: usize, rotation: u8) -> Result<SetResult> {
        let result = self.rotations.set(index, &(rotation & 63))?;
        if result != SetResult::Unchanged {
            self.mark_changed();
        }
        Ok(result)
    }

    pub fn has_rotations(&self) -> bool {
        !self.rotations.is_uniform_default()
    }

    pub fn is_ticking(&self, index: usize) -> bool {
        self.ticking.get(index)
    }

    /// Flag a block for ticking. Air never ticks; returns whether the flag changed.
    pub fn set_ticking(&mut self, index: usize, ticking: bool) -> Result<bool> {
        if index >= SECTION_VOLUME {
            return Err(StorageError::Position(format!(
                "block index {index} outside section"
            )));
        }
        let ticking = ticking && self.get_block(index) != EMPTY_BLOCK;
        if self.ticking.get(index) == ticking {
            return Ok(false);
        }
        if ticking {
            self.ticking.set(index);
        } else {
            self.ticking.clear(index);
        }
        Ok(true)
    }

    pub fn ticking_count(&self) -> usize {
        self.ticking.cardinality()
    }

    pub fn local_light(&self) -> &LightOctree {
        &self.local_light
    }

    pub fn local_light_mut(&mut self) -> &mut LightOctree {
        &mut self.local_light
    }

    pub fn global_light(&self) -> &LightOctree {
        &self.global_light
    }

    pub fn global_light_mut(&mut self) -> &mut LightOctree {
        &mut self.global_light
    }

    /// Local and global light, borrowed together.
    pub fn lights_mut(&mut self) -> [&mut LightOctree; 2] {
        [&mut self.local_light, &mut self.global_light]
    }

    pub fn local_changes(&self) -> u16 {
        self.local_changes
    }

    pub fn global_changes(&self) -> u16 {
        self.global_changes
    }

    /// Free both light arenas.
    pub fn release_light(&mut self) {
        self.local_light.release();
        self.global_light.release();
    }

    fn mark_changed(&mut self) {
        self.local_changes = self.local_changes.wrapping_add(1);
        self.global_changes = self.global_changes.wrapping_add(1);
    }

    /// Serialize the section payload in its fixed field order.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.migration_version);
        self.blocks.write(buf);
        if !self.blocks.is_uniform_default() {
            write_ticking(buf, &self.ticking);
        }
        self.fillers.write(buf);
        self.rotations.write(buf);
        self.local_light.write(buf);
        self.global_light.write(buf);
        buf.put_u16(self.local_changes);
        buf.put_u16(self.global_changes);
    }

    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        let migration_version = wire::read_i32(buf)?;
        let blocks = SectionPalette::<String>::read(buf)?;
        let ticking = if blocks.palette_type() != PaletteType::Empty {
            read_ticking(buf)?
        } else {
            BitSet::new()
        };
        let fillers = SectionPalette::<u16>::read(buf)?;
        let rotations = SectionPalette::<u8>::read(buf)?;
        let local_light = LightOctree::read(buf, NO_LIGHT)?;
        let global_light = LightOctree::read(buf, NO_LIGHT)?;
        let local_changes = wire::read_u16(buf)?;
        let global_changes = wire::read_u16(buf)?;
        Ok(Self {
            migration_version,
            blocks,
            fillers,
            rotations,
            ticking,
            local_light,
            global_light,
            local_changes,
            global_changes,
        })
    }
}

/// `[cardinality:u16][wordCount:u16][words:i64*]`, trailing zero words dropped.
fn write_ticking(buf: &mut impl BufMut, ticking: &BitSet) {
    let words = ticking.to_words();
    buf.put_u16(ticking.cardinality() as u16);
    buf.put_u16(words.len() as u16);
    for &word in words {
        buf.put_u64(word);
    }
}

fn read_ticking(buf: &mut impl Buf) -> Result<BitSet> {
    let _cardinality = wire::read_u16(buf)?;
    let word_count = wire::read_u16(buf)? as usize;
    if word_count > TICKING_WORDS {
        return Err(StorageError::Corruption(format!(
            "ticking set of {word_count} words exceeds section size"
        )));
    }
    wire::ensure_remaining(buf, word_count * 8)?;
    let words = (0..word_count).map(|_| buf.get_u64()).collect();
    Ok(BitSet::from_words(words))
}
