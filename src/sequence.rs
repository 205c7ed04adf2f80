/// LiveCollection Sequence Storage
///
/// A Sequence is the ordered storage behind both collections and the ordered
/// index of a view. Two implementations are provided:
/// - ArraySequence: contiguous array with O(1) access, O(N) splice
/// - TieredVectorSequence: sqrt decomposition, O(log √N) access, O(√N) splice
///
/// Views splice single members in and out on every translated notification,
/// so large, frequently updated views benefit from `StorageHint::FastUpdates`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::str::FromStr;

/// Trait for ordered storage operations
pub trait Sequence<T: 'static> {
    /// Return the number of elements in the sequence
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference to the value at index (0-based)
    fn get(&self, index: usize) -> Option<&T>;

    /// Insert value at index, shifting subsequent elements
    fn insert(&mut self, index: usize, value: T) -> Result<()>;

    /// Remove and return the value at index
    fn remove(&mut self, index: usize) -> Result<T>;

    /// Append value to end
    fn push(&mut self, value: T);

    /// Iterate over all values in order
    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_>;

    /// Replace the whole content, keeping the given order
    fn reload(&mut self, values: Vec<T>);

    fn clear(&mut self) {
        self.reload(Vec::new());
    }

    /// Index of the first value matching `pred`
    fn position(&self, pred: &dyn Fn(&T) -> bool) -> Option<usize> {
        self.iter().position(|v| pred(v))
    }

    /// Binary search for the first index where `pred` is false, assuming
    /// `pred` holds for a prefix of the sequence and fails for the rest.
    fn partition_point(&self, pred: &mut dyn FnMut(&T) -> bool) -> usize {
        let mut low = 0;
        let mut high = self.len();
        while low < high {
            let mid = low + (high - low) / 2;
            match self.get(mid) {
                Some(v) if pred(v) => low = mid + 1,
                _ => high = mid,
            }
        }
        low
    }

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }
}

/// Hint for selecting the underlying storage strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageHint {
    /// Contiguous storage, best for read-heavy or append-mostly use (default).
    #[default]
    FastReads,

    /// Tiered storage, best when records enter and leave anywhere in the
    /// order (live ranked lists, filters that flip often).
    FastUpdates,
}

impl StorageHint {
    /// Create empty storage matching this hint.
    pub fn new_sequence<T: Clone + 'static>(&self) -> Box<dyn Sequence<T>> {
        match self {
            StorageHint::FastReads => Box::new(ArraySequence::new()),
            StorageHint::FastUpdates => Box::new(TieredVectorSequence::new()),
        }
    }
}

impl FromStr for StorageHint {
    type Err = Error;

    /// Accepts: "fast_reads", "fast_updates"
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fast_reads" | "fastreads" => Ok(StorageHint::FastReads),
            "fast_updates" | "fastupdates" => Ok(StorageHint::FastUpdates),
            _ => Err(Error::Config(format!(
                "unknown storage hint '{}', use 'fast_reads' or 'fast_updates'",
                s
            ))),
        }
    }
}

/// Contiguous array implementation.
#[derive(Debug, Clone)]
pub struct ArraySequence<T> {
    data: Vec<T>,
}

impl<T> ArraySequence<T> {
    pub fn new() -> Self {
        ArraySequence { data: Vec::new() }
    }
}

impl<T> Default for ArraySequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Sequence<T> for ArraySequence<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    fn insert(&mut self, index: usize, value: T) -> Result<()> {
        if index > self.data.len() {
            return Err(Error::OutOfRange { index, len: self.data.len() + 1 });
        }
        self.data.insert(index, value);
        Ok(())
    }

    fn remove(&mut self, index: usize) -> Result<T> {
        if index >= self.data.len() {
            return Err(Error::OutOfRange { index, len: self.data.len() });
        }
        Ok(self.data.remove(index))
    }

    fn push(&mut self, value: T) {
        self.data.push(value);
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.data.iter())
    }

    fn reload(&mut self, values: Vec<T>) {
        self.data = values;
    }
}

/// Tiered vector using sqrt decomposition.
///
/// - `blocks`: blocks of roughly √N elements each
/// - `block_starts[i]`: global index of the first element of block i,
///   searched with a binary search on lookup
/// - blocks split above 2√N elements and merge below √N/4
#[derive(Debug, Clone)]
pub struct TieredVectorSequence<T> {
    blocks: Vec<Vec<T>>,
    block_starts: Vec<usize>,
    size: usize,
}

impl<T> TieredVectorSequence<T> {
    const MIN_BLOCK_SIZE: usize = 16;
    const MAX_BLOCK_SIZE: usize = 4096;

    pub fn new() -> Self {
        TieredVectorSequence {
            blocks: Vec::new(),
            block_starts: Vec::new(),
            size: 0,
        }
    }

    fn ideal_block_size_for(size: usize) -> usize {
        let sqrt = (size as f64).sqrt() as usize;
        sqrt.clamp(Self::MIN_BLOCK_SIZE, Self::MAX_BLOCK_SIZE)
    }

    fn ideal_block_size(&self) -> usize {
        Self::ideal_block_size_for(self.size)
    }

    /// (block index, offset in block) for a valid element index
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.size {
            return None;
        }
        let block_idx = match self.block_starts.binary_search(&index) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let offset = index - self.block_starts[block_idx];
        debug_assert!(offset < self.blocks[block_idx].len());
        Some((block_idx, offset))
    }

    fn shift_starts_after(&mut self, block_idx: usize, grew: bool) {
        for start in self.block_starts.iter_mut().skip(block_idx + 1) {
            if grew {
                *start += 1;
            } else {
                *start -= 1;
            }
        }
    }

    fn maybe_split(&mut self, block_idx: usize) {
        if self.blocks[block_idx].len() <= 2 * self.ideal_block_size() {
            return;
        }
        let mid = self.blocks[block_idx].len() / 2;
        let tail = self.blocks[block_idx].split_off(mid);
        let tail_start = self.block_starts[block_idx] + self.blocks[block_idx].len();
        self.blocks.insert(block_idx + 1, tail);
        self.block_starts.insert(block_idx + 1, tail_start);
    }

    fn maybe_merge(&mut self, block_idx: usize) {
        if self.blocks[block_idx].is_empty() {
            self.blocks.remove(block_idx);
            self.block_starts.remove(block_idx);
            return;
        }
        if self.blocks.len() <= 1 {
            return;
        }
        let ideal = self.ideal_block_size();
        if self.blocks[block_idx].len() >= ideal / 4 {
            return;
        }

        // Fold into the previous block when possible, else pull the next one in.
        if block_idx > 0 && self.blocks[block_idx - 1].len() + self.blocks[block_idx].len() <= 2 * ideal {
            let block = self.blocks.remove(block_idx);
            self.block_starts.remove(block_idx);
            self.blocks[block_idx - 1].extend(block);
        } else if block_idx + 1 < self.blocks.len()
            && self.blocks[block_idx].len() + self.blocks[block_idx + 1].len() <= 2 * ideal
        {
            let next = self.blocks.remove(block_idx + 1);
            self.block_starts.remove(block_idx + 1);
            self.blocks[block_idx].extend(next);
        }
    }
}

impl<T> Default for TieredVectorSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Sequence<T> for TieredVectorSequence<T> {
    fn len(&self) -> usize {
        self.size
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.locate(index).map(|(b, o)| &self.blocks[b][o])
    }

    fn insert(&mut self, index: usize, value: T) -> Result<()> {
        if index > self.size {
            return Err(Error::OutOfRange { index, len: self.size + 1 });
        }
        if index == self.size {
            self.push(value);
            return Ok(());
        }
        let (block_idx, offset) = self
            .locate(index)
            .ok_or(Error::OutOfRange { index, len: self.size })?;
        self.blocks[block_idx].insert(offset, value);
        self.size += 1;
        self.shift_starts_after(block_idx, true);
        self.maybe_split(block_idx);
        Ok(())
    }

    fn remove(&mut self, index: usize) -> Result<T> {
        let (block_idx, offset) = self
            .locate(index)
            .ok_or(Error::OutOfRange { index, len: self.size })?;
        let value = self.blocks[block_idx].remove(offset);
        self.size -= 1;
        self.shift_starts_after(block_idx, false);
        self.maybe_merge(block_idx);
        Ok(value)
    }

    fn push(&mut self, value: T) {
        if self.blocks.is_empty() {
            self.blocks.push(vec![value]);
            self.block_starts.push(0);
            self.size = 1;
            return;
        }
        let last = self.blocks.len() - 1;
        self.blocks[last].push(value);
        self.size += 1;
        self.maybe_split(last);
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.blocks.iter().flat_map(|block| block.iter()))
    }

    fn reload(&mut self, values: Vec<T>) {
        self.blocks.clear();
        self.block_starts.clear();
        self.size = values.len();
        if values.is_empty() {
            return;
        }

        let block_size = Self::ideal_block_size_for(self.size);
        let mut start = 0;
        let mut block = Vec::with_capacity(block_size);
        for value in values {
            block.push(value);
            if block.len() == block_size {
                self.block_starts.push(start);
                start += block.len();
                self.blocks.push(std::mem::replace(&mut block, Vec::with_capacity(block_size)));
            }
        }
        if !block.is_empty() {
            self.block_starts.push(start);
            self.blocks.push(block);
        }
    }
}
