//! Per-column environment ids, stored as vertical run-length lists.

use std::collections::{BTreeMap, HashMap};

use bytes::{Buf, BufMut};

use crate::error::{Result, StorageError};
use crate::wire;

/// Environment assigned to every block of a new chunk.
pub const DEFAULT_ENVIRONMENT: &str = "Default";

/// Number of columns in a chunk.
pub const COLUMN_COUNT: usize = 32 * 32;

/// `[id:i32][len:u16]` with an empty name.
const MIN_MAPPING_LEN: usize = 6;

/// Environment runs for one column.
///
/// `values[i]` covers every `y <= max_ys[i]` above the previous bound; the
/// last value covers everything above the last bound, so
/// `values.len() == max_ys.len() + 1` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentColumn {
    max_ys: Vec<i32>,
    values: Vec<i32>,
}

impl EnvironmentColumn {
    pub fn new(id: i32) -> Self {
        Self {
            max_ys: Vec::new(),
            values: vec![id],
        }
    }

    pub fn run_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn get(&self, y: i32) -> i32 {
        self.values[self.run_index(y)]
    }

    pub fn fill(&mut self, id: i32) {
        self.max_ys.clear();
        self.values.clear();
        self.values.push(id);
    }

    /// Set the environment of a single y, splitting and re-merging runs.
    pub fn set(&mut self, y: i32, id: i32) {
        let idx = self.run_index(y);
        let old = self.values[idx];
        if old == id {
            return;
        }
        let lower = if idx == 0 {
            None
        } else {
            Some(self.max_ys[idx - 1] + 1)
        };
        let upper = self.max_ys.get(idx).copied();

        // (max_y, value) runs; `None` marks the unbounded top run.
        let mut runs: Vec<(Option<i32>, i32)> = Vec::with_capacity(self.values.len() + 2);
        for i in 0..idx {
            runs.push((Some(self.max_ys[i]), self.values[i]));
        }
        if lower.map_or(y > i32::MIN, |lower| lower < y) {
            runs.push((Some(y - 1), old));
        }
        if upper == Some(y) || (upper.is_none() && y == i32::MAX) {
            runs.push((upper, id));
        } else {
            runs.push((Some(y), id));
            runs.push((upper, old));
        }
        for i in idx + 1..self.values.len() {
            runs.push((self.max_ys.get(i).copied(), self.values[i]));
        }

        let mut merged: Vec<(Option<i32>, i32)> = Vec::with_capacity(runs.len());
        for (max_y, value) in runs {
            match merged.last_mut() {
                Some(last) if last.1 == value => last.0 = max_y,
                _ => merged.push((max_y, value)),
            }
        }
        self.max_ys = merged.iter().filter_map(|&(max_y, _)| max_y).collect();
        self.values = merged.into_iter().map(|(_, value)| value).collect();
    }

    fn run_index(&self, y: i32) -> usize {
        self.max_ys
            .iter()
            .position(|&max_y| y <= max_y)
            .unwrap_or(self.max_ys.len())
    }

    fn write(&self, buf: &mut impl BufMut, remap: impl Fn(i32) -> i32) {
        buf.put_i32(self.max_ys.len() as i32);
        for &max_y in &self.max_ys {
            buf.put_i32(max_y);
        }
        for &value in &self.values {
            buf.put_i32(remap(value));
        }
    }

    fn read(buf: &mut impl Buf) -> Result<Self> {
        let n = wire::read_i32(buf)?;
        if n < 0 {
            return Err(StorageError::Corruption(format!(
                "negative environment run count {n}"
            )));
        }
        let n = n as usize;
        wire::ensure_remaining(buf, (2 * n + 1) * 4)?;
        let max_ys: Vec<i32> = (0..n).map(|_| buf.get_i32()).collect();
        if max_ys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StorageError::Corruption(
                "environment run bounds are not ascending".into(),
            ));
        }
        let values = (0..=n).map(|_| buf.get_i32()).collect();
        Ok(Self { max_ys, values })
    }
}

/// Environment data for all 1024 columns of a chunk, indexed `z * 32 + x`.
#[derive(Debug, Clone)]
pub struct EnvironmentChunk {
    names: Vec<String>,
    ids: HashMap<String, i32>,
    columns: Vec<EnvironmentColumn>,
}

impl Default for EnvironmentChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EnvironmentChunk {
    fn eq(&self, other: &Self) -> bool {
        (0..COLUMN_COUNT).all(|i| {
            let (a, b) = (&self.columns[i], &other.columns[i]);
            a.max_ys == b.max_ys
                && a.values.len() == b.values.len()
                && a.values
                    .iter()
                    .zip(&b.values)
                    .all(|(&x, &y)| self.name(x) == other.name(y))
        })
    }
}

impl EnvironmentChunk {
    pub fn new() -> Self {
        Self {
            names: vec![DEFAULT_ENVIRONMENT.to_owned()],
            ids: HashMap::from([(DEFAULT_ENVIRONMENT.to_owned(), 0)]),
            columns: vec![EnvironmentColumn::new(0); COLUMN_COUNT],
        }
    }

    /// Id of `name`, registering it if this chunk has not seen it yet.
    ///
    /// Names longer than a `u16` length prefix can hold are rejected.
    pub fn id_for(&mut self, name: &str) -> Result<i32> {
        if let Some(&id) = self.ids.get(name) {
            return Ok(id);
        }
        wire::check_utf(name)?;
        let id = self.names.len() as i32;
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    pub fn column(&self, x: usize, z: usize) -> &EnvironmentColumn {
        &self.columns[column_index(x, z)]
    }

    pub fn get(&self, x: usize, y: i32, z: usize) -> &str {
        let id = self.column(x, z).get(y);
        self.name(id).unwrap_or(DEFAULT_ENVIRONMENT)
    }

    pub fn set(&mut self, x: usize, y: i32, z: usize, name: &str) -> Result<()> {
        let id = self.id_for(name)?;
        self.columns[column_index(x, z)].set(y, id);
        Ok(())
    }

    pub fn fill_column(&mut self, x: usize, z: usize, name: &str) -> Result<()> {
        let id = self.id_for(name)?;
        self.columns[column_index(x, z)].fill(id);
        Ok(())
    }

    pub fn fill(&mut self, name: &str) -> Result<()> {
        let id = self.id_for(name)?;
        for column in &mut self.columns {
            column.fill(id);
        }
        Ok(())
    }

    /// Number of columns containing each environment.
    pub fn column_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for column in &self.columns {
            let mut seen: Vec<i32> = Vec::with_capacity(column.values.len());
            for &id in &column.values {
                if !seen.contains(&id) {
                    seen.push(id);
                    let name = self.name(id).unwrap_or(DEFAULT_ENVIRONMENT);
                    *counts.entry(name).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Serialize as `[count:i32][(id:i32, name)*][1024 columns]`. Only the
    /// environments in use are written, numbered in first-use order.
    pub fn write(&self, buf: &mut impl BufMut) {
        let mut remap: HashMap<i32, i32> = HashMap::new();
        let mut used: Vec<&str> = Vec::new();
        for column in &self.columns {
            for &id in &column.values {
                remap.entry(id).or_insert_with(|| {
                    used.push(self.name(id).unwrap_or(DEFAULT_ENVIRONMENT));
                    used.len() as i32 - 1
                });
            }
        }
        buf.put_i32(used.len() as i32);
        for (id, name) in used.iter().enumerate() {
            buf.put_i32(id as i32);
            wire::write_utf(buf, name);
        }
        for column in &self.columns {
            column.write(buf, |id| remap.get(&id).copied().unwrap_or(0));
        }
    }

    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        let count = wire::read_i32(buf)?;
        if count < 0 {
            return Err(StorageError::Corruption(format!(
                "negative environment count {count}"
            )));
        }
        // Each mapping is at least an id and an empty name.
        wire::ensure_remaining(buf, count as usize * MIN_MAPPING_LEN)?;
        let mut chunk = Self::new();
        let mut stored: HashMap<i32, i32> = HashMap::new();
        for _ in 0..count {
            let stored_id = wire::read_i32(buf)?;
            let name = wire::read_utf(buf)?;
            let id = chunk.id_for(&name)?;
            if stored.insert(stored_id, id).is_some() {
                return Err(StorageError::Corruption(format!(
                    "duplicate environment id {stored_id}"
                )));
            }
        }
        for column in &mut chunk.columns {
            let mut read = EnvironmentColumn::read(buf)?;
            for value in &mut read.values {
                let stored_id = *value;
                *value = *stored.get(&stored_id).ok_or_else(|| {
                    StorageError::Corruption(format!("unknown environment id {stored_id}"))
                })?;
            }
            *column = read;
        }
        Ok(chunk)
    }
}

fn column_index(x: usize, z: usize) -> usize {
    (z & 31) << 5 | (x & 31)
}
