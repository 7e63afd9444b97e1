//! Variable-width palettes mapping the 32768 blocks of a section to keys.
//!
//! A palette stores one internal id per block, packed at 0, 4, 8 or 16 bits
//! depending on how many distinct keys the section holds. Writing a new key
//! past the current width promotes the palette; removing the last use of a key
//! may demote it again, with some hysteresis so a section hovering at a width
//! boundary does not repack on every write.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use bytes::{Buf, BufMut};

use crate::error::{Result, StorageError};
use crate::wire;

/// Number of blocks in one 32x32x32 section.
pub const SECTION_VOLUME: usize = 32 * 32 * 32;

/// Demote Byte to HalfByte once at most this many keys remain.
const BYTE_DEMOTE_THRESHOLD: usize = 14;
/// Demote Short to Byte once at most this many keys remain.
const SHORT_DEMOTE_THRESHOLD: usize = 251;

/// Packed index width, with the ordinal used on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PaletteType {
    Empty = 0,
    HalfByte = 1,
    Byte = 2,
    Short = 3,
}

impl PaletteType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Empty),
            1 => Ok(Self::HalfByte),
            2 => Ok(Self::Byte),
            3 => Ok(Self::Short),
            other => Err(StorageError::Corruption(format!(
                "unknown palette type {other}"
            ))),
        }
    }

    /// Maximum number of distinct keys this width can address.
    pub fn capacity(self) -> usize {
        match self {
            Self::Empty => 1,
            Self::HalfByte => 16,
            Self::Byte => 256,
            Self::Short => 65536,
        }
    }

    /// Size in bytes of the packed index array.
    pub fn packed_len(self) -> usize {
        match self {
            Self::Empty => 0,
            Self::HalfByte => SECTION_VOLUME / 2,
            Self::Byte => SECTION_VOLUME,
            Self::Short => SECTION_VOLUME * 2,
        }
    }

    fn wider(self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::HalfByte),
            Self::HalfByte => Some(Self::Byte),
            Self::Byte => Some(Self::Short),
            Self::Short => None,
        }
    }
}

/// Outcome of [`SectionPalette::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    /// The block already held the key.
    Unchanged,
    /// The block changed; the set of distinct keys did not.
    Changed,
    /// The block changed and a key was added to or removed from the palette.
    AddedOrRemoved,
}

/// A value that can be stored in a [`SectionPalette`].
pub trait PaletteKey: Clone + Eq + Hash + Debug {
    /// The key every block holds in a fresh section.
    fn default_key() -> Self;
    /// Whether the key can be written. Checked when a new key enters a palette.
    fn check_key(&self) -> Result<()> {
        Ok(())
    }
    fn write_key(&self, buf: &mut impl BufMut);
    fn read_key(buf: &mut impl Buf) -> Result<Self>;
}

/// Block and fluid ids. `"Empty"` is air / no fluid.
impl PaletteKey for String {
    fn default_key() -> Self {
        "Empty".to_owned()
    }

    fn check_key(&self) -> Result<()> {
        wire::check_utf(self)
    }

    fn write_key(&self, buf: &mut impl BufMut) {
        wire::write_utf(buf, self);
    }

    fn read_key(buf: &mut impl Buf) -> Result<Self> {
        wire::read_utf(buf)
    }
}

/// Filler data.
impl PaletteKey for u16 {
    fn default_key() -> Self {
        0
    }

    fn write_key(&self, buf: &mut impl BufMut) {
        buf.put_u16(*self);
    }

    fn read_key(buf: &mut impl Buf) -> Result<Self> {
        wire::read_u16(buf)
    }
}

/// Rotations, `rx * 16 + ry * 4 + rz`.
impl PaletteKey for u8 {
    fn default_key() -> Self {
        0
    }

    fn write_key(&self, buf: &mut impl BufMut) {
        buf.put_u8(*self);
    }

    fn read_key(buf: &mut impl Buf) -> Result<Self> {
        wire::read_u8(buf)
    }
}

// ─── Packed index storage ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Packed {
    Empty,
    /// Two ids per byte; even block index in the high nibble.
    HalfByte(Box<[u8]>),
    Byte(Box<[u8]>),
    Short(Box<[u16]>),
}

impl Packed {
    fn new(ty: PaletteType) -> Self {
        match ty {
            PaletteType::Empty => Self::Empty,
            PaletteType::HalfByte => Self::HalfByte(vec![0; ty.packed_len()].into_boxed_slice()),
            PaletteType::Byte => Self::Byte(vec![0; ty.packed_len()].into_boxed_slice()),
            PaletteType::Short => Self::Short(vec![0; SECTION_VOLUME].into_boxed_slice()),
        }
    }

    fn palette_type(&self) -> PaletteType {
        match self {
            Self::Empty => PaletteType::Empty,
            Self::HalfByte(_) => PaletteType::HalfByte,
            Self::Byte(_) => PaletteType::Byte,
            Self::Short(_) => PaletteType::Short,
        }
    }

    fn get(&self, index: usize) -> u16 {
        match self {
            Self::Empty => 0,
            Self::HalfByte(data) => {
                let byte = data[index >> 1];
                if index & 1 == 0 {
                    (byte >> 4) as u16
                } else {
                    (byte & 0x0F) as u16
                }
            }
            Self::Byte(data) => data[index] as u16,
            Self::Short(data) => data[index],
        }
    }

    fn set(&mut self, index: usize, id: u16) {
        match self {
            Self::Empty => debug_assert_eq!(id, 0),
            Self::HalfByte(data) => {
                let nibble = (id & 0x0F) as u8;
                let byte = &mut data[index >> 1];
                if index & 1 == 0 {
                    *byte = (*byte & 0x0F) | (nibble << 4);
                } else {
                    *byte = (*byte & 0xF0) | nibble;
                }
            }
            Self::Byte(data) => data[index] = id as u8,
            Self::Short(data) => data[index] = id,
        }
    }

    fn write(&self, buf: &mut impl BufMut, remap: &[u16]) {
        let ty = self.palette_type();
        match ty {
            PaletteType::Empty => {}
            PaletteType::HalfByte => {
                for pair in 0..SECTION_VOLUME / 2 {
                    let hi = remap[self.get(pair * 2) as usize] as u8 & 0x0F;
                    let lo = remap[self.get(pair * 2 + 1) as usize] as u8 & 0x0F;
                    buf.put_u8((hi << 4) | lo);
                }
            }
            PaletteType::Byte => {
                for index in 0..SECTION_VOLUME {
                    buf.put_u8(remap[self.get(index) as usize] as u8);
                }
            }
            PaletteType::Short => {
                for index in 0..SECTION_VOLUME {
                    buf.put_u16(remap[self.get(index) as usize]);
                }
            }
        }
    }

    fn read(ty: PaletteType, buf: &mut impl Buf) -> Result<Self> {
        wire::ensure_remaining(buf, ty.packed_len())?;
        Ok(match ty {
            PaletteType::Empty => Self::Empty,
            PaletteType::HalfByte | PaletteType::Byte => {
                let mut data = vec![0u8; ty.packed_len()];
                buf.copy_to_slice(&mut data);
                if ty == PaletteType::HalfByte {
                    Self::HalfByte(data.into_boxed_slice())
                } else {
                    Self::Byte(data.into_boxed_slice())
                }
            }
            PaletteType::Short => {
                let data: Vec<u16> = (0..SECTION_VOLUME).map(|_| buf.get_u16()).collect();
                Self::Short(data.into_boxed_slice())
            }
        })
    }
}

// ─── Palette ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry<K> {
    key: K,
    count: u32,
}

/// Maps each of the 32768 blocks of a section to a key of type `K`.
#[derive(Debug, Clone)]
pub struct SectionPalette<K: PaletteKey> {
    /// Indexed by internal id; `None` marks a free id.
    entries: Vec<Option<Entry<K>>>,
    lookup: HashMap<K, u16>,
    packed: Packed,
    default: K,
}

impl<K: PaletteKey> Default for SectionPalette<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PaletteKey> SectionPalette<K> {
    /// A palette where every block holds the default key.
    pub fn new() -> Self {
        let default = K::default_key();
        let mut lookup = HashMap::new();
        lookup.insert(default.clone(), 0);
        Self {
            entries: vec![Some(Entry {
                key: default.clone(),
                count: SECTION_VOLUME as u32,
            })],
            lookup,
            packed: Packed::Empty,
            default,
        }
    }

    pub fn palette_type(&self) -> PaletteType {
        self.packed.palette_type()
    }

    /// Number of distinct keys present.
    pub fn count(&self) -> usize {
        self.lookup.len()
    }

    /// Number of blocks holding `key`.
    pub fn count_of(&self, key: &K) -> u32 {
        self.lookup
            .get(key)
            .and_then(|&id| self.entry(id))
            .map_or(0, |e| e.count)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lookup.contains_key(key)
    }

    /// Distinct keys with their block counts, in internal id order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u32)> {
        self.entries.iter().flatten().map(|e| (&e.key, e.count))
    }

    /// Whether every block holds the default key.
    pub fn is_uniform_default(&self) -> bool {
        self.count() == 1 && self.contains(&self.default)
    }

    pub fn get(&self, index: usize) -> &K {
        self.entry(self.packed.get(index))
            .map_or(&self.default, |e| &e.key)
    }

    /// Set the key of one block, widening the palette when the new key does not fit.
    ///
    /// Fails with [`StorageError::Capacity`] only if the widest palette is full.
    pub fn set(&mut self, index: usize, key: &K) -> Result<SetResult> {
        if index >= SECTION_VOLUME {
            return Err(StorageError::Position(format!(
                "block index {index} outside section"
            )));
        }
        let old_id = self.packed.get(index);
        if self.entry(old_id).is_some_and(|e| e.key == *key) {
            return Ok(SetResult::Unchanged);
        }

        let (new_id, added) = match self.lookup.get(key) {
            Some(&id) => (id, false),
            None => {
                key.check_key()?;
                let id = self.next_free_id();
                if id >= self.palette_type().capacity() {
                    *self = self.promote()?;
                    return self.set(index, key);
                }
                let id = id as u16;
                self.insert_entry(id, key.clone());
                (id, true)
            }
        };

        self.packed.set(index, new_id);
        if let Some(e) = self.entry_mut(new_id) {
            e.count += 1;
        }
        let removed = self.release(old_id);
        if removed {
            while let Some(narrower) = self.demote() {
                *self = narrower;
            }
        }
        Ok(if added || removed {
            SetResult::AddedOrRemoved
        } else {
            SetResult::Changed
        })
    }

    /// A palette one width wider holding the same mapping.
    pub fn promote(&self) -> Result<Self> {
        let ty = self.palette_type();
        let wider = ty.wider().ok_or(StorageError::Capacity {
            count: self.count() + 1,
            capacity: ty.capacity(),
        })?;
        let mut packed = Packed::new(wider);
        if ty != PaletteType::Empty {
            for index in 0..SECTION_VOLUME {
                packed.set(index, self.packed.get(index));
            }
        }
        Ok(Self {
            entries: self.entries.clone(),
            lookup: self.lookup.clone(),
            packed,
            default: self.default.clone(),
        })
    }

    /// A narrower palette holding the same mapping, if the key count has
    /// dropped far enough below the narrower width's capacity.
    pub fn demote(&self) -> Option<Self> {
        let target = match self.palette_type() {
            PaletteType::Empty => return None,
            PaletteType::HalfByte if self.is_uniform_default() => {
                return Some(Self::new());
            }
            PaletteType::HalfByte => return None,
            PaletteType::Byte if self.count() <= BYTE_DEMOTE_THRESHOLD => PaletteType::HalfByte,
            PaletteType::Short if self.count() <= SHORT_DEMOTE_THRESHOLD => PaletteType::Byte,
            _ => return None,
        };
        Some(self.repack(target))
    }

    /// Serialize as `[type:u8]` and, unless empty,
    /// `[entryCount:u16][(id:u8, key, count:u16)*][packed ids]`.
    ///
    /// Ids are renumbered densely in internal id order, so the written id of
    /// each entry equals its position in the table.
    pub fn write(&self, buf: &mut impl BufMut) {
        if self.is_uniform_default() {
            buf.put_u8(PaletteType::Empty as u8);
            return;
        }
        let ty = self.palette_type();
        buf.put_u8(ty as u8);

        let remap = self.dense_ids();
        buf.put_u16(self.count() as u16);
        for (position, entry) in self.entries.iter().flatten().enumerate() {
            buf.put_u8(position as u8);
            entry.key.write_key(buf);
            buf.put_u16(entry.count as u16);
        }
        self.packed.write(buf, &remap);
    }

    /// Read a palette written by [`SectionPalette::write`]. Entry ids are
    /// assigned by position; block counts are recomputed from the packed data.
    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        let ty = PaletteType::from_u8(wire::read_u8(buf)?)?;
        if ty == PaletteType::Empty {
            return Ok(Self::new());
        }
        let entry_count = wire::read_u16(buf)? as usize;
        if entry_count == 0 || entry_count > ty.capacity() {
            return Err(StorageError::Corruption(format!(
                "{entry_count} palette entries in a {ty:?} palette"
            )));
        }
        let mut keys = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let _id = wire::read_u8(buf)?;
            let key = K::read_key(buf)?;
            let _count = wire::read_u16(buf)?;
            keys.push(key);
        }
        let packed = Packed::read(ty, buf)?;

        let mut counts = vec![0u32; entry_count];
        for index in 0..SECTION_VOLUME {
            let id = packed.get(index) as usize;
            match counts.get_mut(id) {
                Some(c) => *c += 1,
                None => {
                    return Err(StorageError::Corruption(format!(
                        "block {index} references palette id {id} of {entry_count}"
                    )))
                }
            }
        }

        let mut lookup = HashMap::with_capacity(entry_count);
        let mut entries = Vec::with_capacity(entry_count);
        for (id, (key, count)) in keys.into_iter().zip(counts).enumerate() {
            if count == 0 {
                entries.push(None);
                continue;
            }
            if lookup.insert(key.clone(), id as u16).is_some() {
                return Err(StorageError::Corruption(format!(
                    "duplicate palette key {key:?}"
                )));
            }
            entries.push(Some(Entry { key, count }));
        }
        Ok(Self {
            entries,
            lookup,
            packed,
            default: K::default_key(),
        })
    }

    fn entry(&self, id: u16) -> Option<&Entry<K>> {
        self.entries.get(id as usize).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, id: u16) -> Option<&mut Entry<K>> {
        self.entries.get_mut(id as usize).and_then(Option::as_mut)
    }

    fn next_free_id(&self) -> usize {
        self.entries
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.entries.len())
    }

    fn insert_entry(&mut self, id: u16, key: K) {
        self.lookup.insert(key.clone(), id);
        let entry = Some(Entry { key, count: 0 });
        match self.entries.get_mut(id as usize) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    /// Drop one use of `id`; returns true if that was its last use.
    fn release(&mut self, id: u16) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        entry.count -= 1;
        if entry.count > 0 {
            return false;
        }
        if let Some(Some(entry)) = self.entries.get_mut(id as usize).map(Option::take) {
            self.lookup.remove(&entry.key);
        }
        while matches!(self.entries.last(), Some(None)) {
            self.entries.pop();
        }
        true
    }

    /// Old id to dense position, for every id in use.
    fn dense_ids(&self) -> Vec<u16> {
        let mut remap = vec![0u16; self.entries.len()];
        let mut next = 0u16;
        for (id, slot) in self.entries.iter().enumerate() {
            if slot.is_some() {
                remap[id] = next;
                next += 1;
            }
        }
        remap
    }

    fn repack(&self, ty: PaletteType) -> Self {
        let remap = self.dense_ids();
        let entries: Vec<Option<Entry<K>>> = self.entries.iter().flatten().cloned().map(Some).collect();
        let lookup = entries
            .iter()
            .flatten()
            .enumerate()
            .map(|(id, e)| (e.key.clone(), id as u16))
            .collect();
        let mut packed = Packed::new(ty);
        for index in 0..SECTION_VOLUME {
            packed.set(index, remap[self.packed.get(index) as usize]);
        }
        Self {
            entries,
            lookup,
            packed,
            default: self.default.clone(),
        }
    }
}

/// Two palettes are equal when they have the same width and map every block
/// to the same key; internal id assignment is not compared.
impl<K: PaletteKey> PartialEq for SectionPalette<K> {
    fn eq(&self, other: &Self) -> bool {
        self.palette_type() == other.palette_type()
            && self.count() == other.count()
            && (0..SECTION_VOLUME).all(|i| self.get(i) == other.get(i))
    }
}
