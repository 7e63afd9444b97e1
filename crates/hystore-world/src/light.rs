//! Sparse octree storage for per-block light.
//!
//! Each light value is 16 bits: red in bits 0-3, green 4-7, blue 8-11 and sky
//! 12-15. The tree covers the 15-bit block index of a section, three bits per
//! level, so it is at most five levels deep. A node holds eight slots; bit `i`
//! of its mask says whether slot `i` is a uniform leaf value or the id of a
//! child node.

use bytes::{Buf, BufMut};

use crate::error::{Result, StorageError};
use crate::palette::SECTION_VOLUME;
use crate::wire;

/// Sky 15, no block light.
pub const FULL_SKYLIGHT: u16 = 0xF000;
/// All channels zero.
pub const NO_LIGHT: u16 = 0;

const TREE_SIZE: usize = 8;
/// Encoded node size: one mask byte plus eight `u16` slots.
pub const NODE_SIZE: usize = 1 + TREE_SIZE * 2;
/// Shift of the deepest level; depths run 0, 3, 6, 9, 12.
const MAX_DEPTH: u32 = 12;
const INITIAL_CAPACITY: usize = 64;

/// Flat block index inside a section, `y << 10 | z << 5 | x`.
pub fn index_block(x: usize, y: usize, z: usize) -> usize {
    ((y & 31) << 10) | ((z & 31) << 5) | (x & 31)
}

/// Pack four 4-bit channels into one light value.
pub fn combine_light(red: u8, green: u8, blue: u8, sky: u8) -> u16 {
    ((sky as u16 & 0xF) << 12)
        | ((blue as u16 & 0xF) << 8)
        | ((green as u16 & 0xF) << 4)
        | (red as u16 & 0xF)
}

pub fn red(value: u16) -> u8 {
    (value & 0xF) as u8
}

pub fn green(value: u16) -> u8 {
    ((value >> 4) & 0xF) as u8
}

pub fn blue(value: u16) -> u8 {
    ((value >> 8) & 0xF) as u8
}

pub fn sky(value: u16) -> u8 {
    ((value >> 12) & 0xF) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LightNode {
    mask: u8,
    values: [u16; TREE_SIZE],
}

impl LightNode {
    fn uniform(value: u16) -> Self {
        Self {
            mask: 0,
            values: [value; TREE_SIZE],
        }
    }

    fn is_child(&self, slot: usize) -> bool {
        self.mask & (1 << slot) != 0
    }
}

fn slot_at(index: usize, depth: u32) -> usize {
    (index >> (MAX_DEPTH - depth)) & 7
}

/// Light data for one section.
///
/// Nodes live in an arena addressed by id, with the root at id 0. An octree
/// that has never been written holds no nodes and reads as the default value.
#[derive(Debug, Clone)]
pub struct LightOctree {
    nodes: Vec<LightNode>,
    default: u16,
    change_id: u16,
}

impl Default for LightOctree {
    fn default() -> Self {
        Self::new(0, NO_LIGHT)
    }
}

/// Octrees compare by their encoded form, so structure that serialization
/// drops (unreachable nodes, an arena holding only default values) is ignored.
impl PartialEq for LightOctree {
    fn eq(&self, other: &Self) -> bool {
        self.change_id == other.change_id
            && self.default == other.default
            && self.to_bytes() == other.to_bytes()
    }
}

impl LightOctree {
    pub fn new(change_id: u16, default: u16) -> Self {
        Self {
            nodes: Vec::new(),
            default,
            change_id,
        }
    }

    pub fn change_id(&self) -> u16 {
        self.change_id
    }

    pub fn set_change_id(&mut self, change_id: u16) {
        self.change_id = change_id;
    }

    pub fn default_value(&self) -> u16 {
        self.default
    }

    /// Number of nodes currently held in the arena, reachable or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_light(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        red: u8,
        green: u8,
        blue: u8,
        sky: u8,
    ) {
        self.put(index_block(x, y, z), combine_light(red, green, blue, sky));
    }

    /// Replace only the sky channel of one block.
    pub fn set_sky_light(&mut self, x: usize, y: usize, z: usize, level: u8) {
        let index = index_block(x, y, z);
        let current = self.get_light_raw(index);
        self.put(index, (current & 0x0FFF) | ((level as u16 & 0xF) << 12));
    }

    /// Light of one block. Indices outside the section read as the default.
    pub fn get_light_raw(&self, index: usize) -> u16 {
        if self.nodes.is_empty() || index >= SECTION_VOLUME {
            return self.default;
        }
        let mut node = 0;
        let mut depth = 0;
        loop {
            let slot = slot_at(index, depth);
            let current = &self.nodes[node];
            if depth >= MAX_DEPTH || !current.is_child(slot) {
                return current.values[slot];
            }
            node = current.values[slot] as usize;
            depth += 3;
        }
    }

    /// Write one block's light, splitting uniform leaves on the way down.
    ///
    /// Writing the value a leaf already holds changes nothing.
    pub fn set_light_raw(&mut self, index: usize, value: u16) -> Result<()> {
        if index >= SECTION_VOLUME {
            return Err(StorageError::Position(format!(
                "light index {index} outside section"
            )));
        }
        self.put(index, value);
        Ok(())
    }

    fn put(&mut self, index: usize, value: u16) {
        if self.nodes.is_empty() {
            self.nodes.reserve(INITIAL_CAPACITY);
            self.nodes.push(LightNode::uniform(self.default));
        }
        let mut node = 0;
        let mut depth = 0;
        loop {
            let slot = slot_at(index, depth);
            let current = self.nodes[node];
            if depth >= MAX_DEPTH {
                self.nodes[node].values[slot] = value;
                return;
            }
            if current.is_child(slot) {
                node = current.values[slot] as usize;
            } else {
                let existing = current.values[slot];
                if existing == value {
                    return;
                }
                let child = self.grow(existing);
                let parent = &mut self.nodes[node];
                parent.mask |= 1 << slot;
                parent.values[slot] = child as u16;
                node = child;
            }
            depth += 3;
        }
    }

    /// Reset to a single uniform root.
    pub fn fill(&mut self, value: u16) {
        self.nodes = vec![LightNode::uniform(value)];
    }

    /// Free the node arena. The octree reads as its default value afterwards.
    pub fn release(&mut self) {
        self.nodes = Vec::new();
    }

    /// Whether any block holds a value other than the default.
    pub fn has_data(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let mut stack = vec![(0usize, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self.nodes[id];
            for slot in 0..TREE_SIZE {
                if depth < MAX_DEPTH && node.is_child(slot) {
                    stack.push((node.values[slot] as usize, depth + 3));
                } else if node.values[slot] != self.default {
                    return true;
                }
            }
        }
        false
    }

    /// Encode the reachable nodes in arena order, with child ids renumbered.
    /// Empty when no block differs from the default.
    ///
    /// Uniform subtrees are not collapsed back into leaves.
    pub fn to_bytes(&self) -> Vec<u8> {
        if !self.has_data() {
            return Vec::new();
        }
        let reachable = self.reachable();
        let mut remap = vec![0u16; self.nodes.len()];
        let mut next = 0u16;
        for (id, &live) in reachable.iter().enumerate() {
            if live {
                remap[id] = next;
                next += 1;
            }
        }

        let mut out = Vec::with_capacity(next as usize * NODE_SIZE);
        for (node, _) in self.nodes.iter().zip(&reachable).filter(|&(_, &live)| live) {
            out.put_u8(node.mask);
            for slot in 0..TREE_SIZE {
                let value = node.values[slot];
                if node.is_child(slot) {
                    out.put_u16(remap[value as usize]);
                } else {
                    out.put_u16(value);
                }
            }
        }
        out
    }

    /// Write `[changeId:u16][hasData:bool]` and, when there is data,
    /// `[len:i32][nodes]`.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.change_id);
        let bytes = self.to_bytes();
        buf.put_u8(u8::from(!bytes.is_empty()));
        if !bytes.is_empty() {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(&bytes);
        }
    }

    /// Read a light data block written by [`LightOctree::write`].
    pub fn read(buf: &mut impl Buf, default: u16) -> Result<Self> {
        let change_id = wire::read_u16(buf)?;
        let mut octree = Self::new(change_id, default);
        if !wire::read_bool(buf)? {
            return Ok(octree);
        }
        let len = wire::read_len(buf)?;
        if len == 0 || len % NODE_SIZE != 0 {
            return Err(StorageError::Corruption(format!(
                "light data length {len} is not a whole number of nodes"
            )));
        }
        let count = len / NODE_SIZE;
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            let mask = buf.get_u8();
            let mut values = [0u16; TREE_SIZE];
            for value in &mut values {
                *value = buf.get_u16();
            }
            nodes.push(LightNode { mask, values });
        }
        for (id, node) in nodes.iter().enumerate() {
            for slot in (0..TREE_SIZE).filter(|&s| node.is_child(s)) {
                if node.values[slot] as usize >= count {
                    return Err(StorageError::Corruption(format!(
                        "light node {id} points at node {} of {count}",
                        node.values[slot]
                    )));
                }
            }
        }
        octree.nodes = nodes;
        Ok(octree)
    }

    fn grow(&mut self, fill: u16) -> usize {
        if self.nodes.len() == self.nodes.capacity() {
            self.nodes.reserve(self.nodes.len().max(INITIAL_CAPACITY));
        }
        self.nodes.push(LightNode::uniform(fill));
        self.nodes.len() - 1
    }

    fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![(0usize, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }
            if depth >= MAX_DEPTH {
                continue;
            }
            let node = &self.nodes[id];
            for slot in (0..TREE_SIZE).filter(|&s| node.is_child(s)) {
                stack.push((node.values[slot] as usize, depth + 3));
            }
        }
        seen
    }
}
