//! Fluid sections: fluid type and level for each block of a section.

use bytes::{Buf, BufMut};

use crate::error::{Result, StorageError};
use crate::palette::{SectionPalette, SetResult, SECTION_VOLUME};
use crate::wire;

/// The fluid id meaning no fluid.
pub const NO_FLUID: &str = "Empty";

/// Size of the nibble-packed level array.
pub const LEVEL_DATA_LEN: usize = SECTION_VOLUME / 2;

/// Level written for a fluid block stored without one: 1 for `*_Source`
/// fluids, 8 for flowing fluids, 0 for no fluid.
pub fn default_fluid_level(id: &str) -> u8 {
    if id.is_empty() || id == NO_FLUID {
        0
    } else if id.ends_with("_Source") {
        1
    } else {
        8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FluidSection {
    fluids: SectionPalette<String>,
    /// Two levels per byte, even block index in the low nibble. Allocated
    /// only while some block has a non-zero level.
    levels: Option<Box<[u8]>>,
    non_zero_levels: u32,
}

impl Default for FluidSection {
    fn default() -> Self {
        Self::new()
    }
}

impl FluidSection {
    pub fn new() -> Self {
        Self {
            fluids: SectionPalette::new(),
            levels: None,
            non_zero_levels: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fluids.is_uniform_default() && self.levels.is_none()
    }

    pub fn fluids(&self) -> &SectionPalette<String> {
        &self.fluids
    }

    pub fn get_fluid(&self, index: usize) -> &str {
        self.fluids.get(index)
    }

    pub fn get_level(&self, index: usize) -> u8 {
        match &self.levels {
            Some(levels) => read_nibble(levels, index),
            None => 0,
        }
    }

    /// Number of blocks holding a fluid.
    pub fn fluid_block_count(&self) -> u32 {
        SECTION_VOLUME as u32 - self.fluids.count_of(&NO_FLUID.to_owned())
    }

    /// Set the fluid and level of one block. Removing the fluid also clears the level.
    pub fn set_fluid(&mut self, index: usize, id: &str, level: u8) -> Result<SetResult> {
        let result = self.fluids.set(index, &id.to_owned())?;
        let level = if id == NO_FLUID { 0 } else { level };
        self.set_level(index, level)?;
        Ok(result)
    }

    pub fn set_level(&mut self, index: usize, level: u8) -> Result<()> {
        if index >= SECTION_VOLUME {
            return Err(StorageError::Position(format!(
                "block index {index} outside section"
            )));
        }
        let level = level & 0xF;
        let old = self.get_level(index);
        if old == level {
            return Ok(());
        }
        let levels = self
            .levels
            .get_or_insert_with(|| vec![0u8; LEVEL_DATA_LEN].into_boxed_slice());
        write_nibble(levels, index, level);
        match (old, level) {
            (0, _) => self.non_zero_levels += 1,
            (_, 0) => self.non_zero_levels -= 1,
            _ => {}
        }
        if self.non_zero_levels == 0 {
            self.levels = None;
        }
        Ok(())
    }

    /// Serialize as `[palette][hasLevelData:bool][levels?]`. Fluid blocks with a
    /// stored level of 0 are written with [`default_fluid_level`].
    pub fn write(&self, buf: &mut impl BufMut) {
        self.fluids.write(buf);
        if self.fluids.is_uniform_default() && self.levels.is_none() {
            buf.put_u8(0);
            return;
        }
        let mut out = vec![0u8; LEVEL_DATA_LEN];
        let mut any = false;
        for index in 0..SECTION_VOLUME {
            let id = self.get_fluid(index);
            let mut level = self.get_level(index);
            if level == 0 {
                level = default_fluid_level(id);
            }
            if level != 0 {
                write_nibble(&mut out, index, level);
                any = true;
            }
        }
        buf.put_u8(u8::from(any));
        if any {
            buf.put_slice(&out);
        }
    }

    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        let fluids = SectionPalette::<String>::read(buf)?;
        let mut section = Self {
            fluids,
            levels: None,
            non_zero_levels: 0,
        };
        if wire::read_bool(buf)? {
            wire::ensure_remaining(buf, LEVEL_DATA_LEN)?;
            let mut levels = vec![0u8; LEVEL_DATA_LEN];
            buf.copy_to_slice(&mut levels);
            let non_zero = (0..SECTION_VOLUME)
                .filter(|&i| read_nibble(&levels, i) != 0)
                .count() as u32;
            if non_zero > 0 {
                section.levels = Some(levels.into_boxed_slice());
                section.non_zero_levels = non_zero;
            }
        }
        Ok(section)
    }
}

fn read_nibble(data: &[u8], index: usize) -> u8 {
    let byte = data[index >> 1];
    if index & 1 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

fn write_nibble(data: &mut [u8], index: usize, level: u8) {
    let byte = &mut data[index >> 1];
    let nibble = level & 0x0F;
    if index & 1 == 0 {
        *byte = (*byte & 0xF0) | nibble;
    } else {
        *byte = (*byte & 0x0F) | (nibble << 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PaletteType;
    use bytes::BytesMut;

    fn roundtrip(section: &FluidSection) -> FluidSection {
        let mut buf = BytesMut::new();
        section.write(&mut buf);
        let mut data = buf.freeze();
        let decoded = FluidSection::read(&mut data).unwrap();
        assert!(data.is_empty());
        decoded
    }

    #[test]
    fn default_levels() {
        assert_eq!(default_fluid_level("Water_Source"), 1);
        assert_eq!(default_fluid_level("Lava_Source"), 1);
        assert_eq!(default_fluid_level("Water"), 8);
        assert_eq!(default_fluid_level("Empty"), 0);
        assert_eq!(default_fluid_level(""), 0);
    }

    #[test]
    fn nibbles_do_not_cross_contaminate() {
        for base in [0usize, 1, 100, 101, SECTION_VOLUME - 2] {
            for level in 0..=15u8 {
                let mut data = vec![0u8; LEVEL_DATA_LEN];
                write_nibble(&mut data, base, 15);
                write_nibble(&mut data, base + 1, 15);
                write_nibble(&mut data, base, level);
                assert_eq!(read_nibble(&data, base), level);
                assert_eq!(read_nibble(&data, base + 1), 15);
            }
        }
    }

    #[test]
    fn even_index_is_low_nibble() {
        let mut data = vec![0u8; 2];
        write_nibble(&mut data, 0, 0x3);
        write_nibble(&mut data, 1, 0xA);
        assert_eq!(data[0], 0xA3);
    }

    #[test]
    fn empty_section_layout() {
        let mut buf = BytesMut::new();
        FluidSection::new().write(&mut buf);
        assert_eq!(&buf[..], &[0, 0]);
        assert!(FluidSection::new().is_empty());
    }

    #[test]
    fn level_array_tracks_non_zero_levels() {
        let mut section = FluidSection::new();
        section.set_fluid(10, "Water", 5).unwrap();
        assert_eq!(section.get_level(10), 5);
        assert!(section.levels.is_some());
        section.set_fluid(10, NO_FLUID, 5).unwrap();
        assert_eq!(section.get_level(10), 0);
        assert!(section.levels.is_none());
        assert!(section.is_empty());
    }

    #[test]
    fn missing_source_level_defaults_to_one() {
        let mut section = FluidSection::new();
        section.set_fluid(0, "Water_Source", 0).unwrap();
        section.set_fluid(1, "Water", 0).unwrap();
        section.set_fluid(2, "Water", 3).unwrap();

        let mut buf = BytesMut::new();
        section.write(&mut buf);
        let levels = &buf[buf.len() - LEVEL_DATA_LEN..];
        // index 0 low nibble = 1, index 1 high nibble = 8, index 2 low nibble = 3.
        assert_eq!(levels[0], 0x81);
        assert_eq!(levels[1], 0x03);
        assert_eq!(buf[buf.len() - LEVEL_DATA_LEN - 1], 1);

        let decoded = roundtrip(&section);
        assert_eq!(decoded.get_fluid(0), "Water_Source");
        assert_eq!(decoded.get_level(0), 1);
        assert_eq!(decoded.get_level(1), 8);
        assert_eq!(decoded.get_level(2), 3);
        assert_eq!(decoded.fluid_block_count(), 3);
    }

    #[test]
    fn roundtrip_preserves_palette() {
        let mut section = FluidSection::new();
        for i in 0..1024 {
            let id = if i % 2 == 0 { "Water" } else { "Lava_Source" };
            section.set_fluid(i * 3, id, (i % 8) as u8 + 1).unwrap();
        }
        assert_eq!(section.fluids().palette_type(), PaletteType::HalfByte);
        let decoded = roundtrip(&section);
        assert_eq!(decoded, section);
    }

    #[test]
    fn truncated_levels() {
        let mut section = FluidSection::new();
        section.set_fluid(0, "Water", 8).unwrap();
        let mut buf = BytesMut::new();
        section.write(&mut buf);
        let cut = &buf[..buf.len() - 1];
        assert!(matches!(
            FluidSection::read(&mut &cut[..]),
            Err(StorageError::Truncated { .. })
        ));
    }
}
