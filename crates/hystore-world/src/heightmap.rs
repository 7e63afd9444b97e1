//! Column palettes for the chunk heightmap (`i16`) and tintmap (`i32`).
//!
//! Unlike section payloads these are little-endian:
//! `[paletteSize:u16][values*][bitfieldLen:i32][bitfield]`, where the bitfield
//! holds 1024 ten-bit palette indices packed least significant bit first.

use std::fmt::Debug;

use bytes::{Buf, BufMut};

use crate::environment::COLUMN_COUNT;
use crate::error::{Result, StorageError};
use crate::wire;

const INDEX_BITS: usize = 10;

/// Byte length of the packed index bitfield.
pub const BITFIELD_LEN: usize = COLUMN_COUNT * INDEX_BITS / 8;

/// A value stored in a column palette.
pub trait ColumnValue: Copy + Eq + Default + Debug {
    const SIZE: usize;
    fn put_le(self, buf: &mut impl BufMut);
    fn get_le(buf: &mut impl Buf) -> Self;
}

impl ColumnValue for i16 {
    const SIZE: usize = 2;

    fn put_le(self, buf: &mut impl BufMut) {
        buf.put_i16_le(self);
    }

    fn get_le(buf: &mut impl Buf) -> Self {
        buf.get_i16_le()
    }
}

impl ColumnValue for i32 {
    const SIZE: usize = 4;

    fn put_le(self, buf: &mut impl BufMut) {
        buf.put_i32_le(self);
    }

    fn get_le(buf: &mut impl Buf) -> Self {
        buf.get_i32_le()
    }
}

/// Write one value per column, palette ordered by first occurrence.
pub fn write_column_palette<V: ColumnValue>(buf: &mut impl BufMut, values: &[V; COLUMN_COUNT]) {
    let mut palette: Vec<V> = Vec::new();
    let mut indices = [0u16; COLUMN_COUNT];
    for (slot, &value) in indices.iter_mut().zip(values.iter()) {
        let index = match palette.iter().position(|&v| v == value) {
            Some(index) => index,
            None => {
                palette.push(value);
                palette.len() - 1
            }
        };
        *slot = index as u16;
    }

    buf.put_u16_le(palette.len() as u16);
    for &value in &palette {
        value.put_le(buf);
    }
    let mut bitfield = [0u8; BITFIELD_LEN];
    for (i, &index) in indices.iter().enumerate() {
        let bit = i * INDEX_BITS;
        for b in 0..INDEX_BITS {
            if index >> b & 1 != 0 {
                bitfield[(bit + b) / 8] |= 1 << ((bit + b) % 8);
            }
        }
    }
    buf.put_i32_le(BITFIELD_LEN as i32);
    buf.put_slice(&bitfield);
}

/// Read a column palette. Indices past the end of the palette resolve to the
/// default value.
pub fn read_column_palette<V: ColumnValue>(buf: &mut impl Buf) -> Result<[V; COLUMN_COUNT]> {
    wire::ensure_remaining(buf, 2)?;
    let size = buf.get_u16_le() as usize;
    if size > COLUMN_COUNT {
        return Err(StorageError::Corruption(format!(
            "column palette of {size} values exceeds {COLUMN_COUNT}"
        )));
    }
    wire::ensure_remaining(buf, size * V::SIZE + 4)?;
    let palette: Vec<V> = (0..size).map(|_| V::get_le(buf)).collect();
    let len = buf.get_i32_le();
    if len < 0 || (len as usize) < BITFIELD_LEN {
        return Err(StorageError::Corruption(format!(
            "column bitfield of {len} bytes, expected {BITFIELD_LEN}"
        )));
    }
    wire::ensure_remaining(buf, len as usize)?;
    let mut bitfield = vec![0u8; len as usize];
    buf.copy_to_slice(&mut bitfield);

    let mut values = [V::default(); COLUMN_COUNT];
    for (i, value) in values.iter_mut().enumerate() {
        let bit = i * INDEX_BITS;
        let mut index = 0usize;
        for b in 0..INDEX_BITS {
            if bitfield[(bit + b) / 8] >> ((bit + b) % 8) & 1 != 0 {
                index |= 1 << b;
            }
        }
        *value = palette.get(index).copied().unwrap_or_default();
    }
    Ok(values)
}
