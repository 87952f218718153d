//! Chunk streams with total memory accounting.

use std::collections::VecDeque;

use crate::chunk::Chunk;

/// Ordered list of chunks.
///
/// The *head* holds the most recently pushed chunk (the next one a replay
/// consumes); the *tail* holds the oldest (the first one budget eviction
/// discards). Both ends pop in O(1). `mem_size` tracks the summed
/// [`Chunk::size`] of the contents and is updated on every push and pop.
#[derive(Debug, Default)]
pub struct UndoStream {
    chunks: VecDeque<Chunk>,
    mem_size: usize,
}

impl UndoStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk at the head.
    pub fn push(&mut self, chunk: Chunk) {
        self.mem_size += chunk.size();
        self.chunks.push_front(chunk);
    }

    /// Remove and return the most recent chunk.
    pub fn pop_head(&mut self) -> Option<Chunk> {
        let chunk = self.chunks.pop_front()?;
        self.mem_size -= chunk.size();
        Some(chunk)
    }

    /// Remove and return the oldest chunk.
    pub fn pop_tail(&mut self) -> Option<Chunk> {
        let chunk = self.chunks.pop_back()?;
        self.mem_size -= chunk.size();
        Some(chunk)
    }

    /// The most recent chunk, without removing it.
    pub fn peek_head(&self) -> Option<&Chunk> {
        self.chunks.front()
    }

    /// Drop all chunks and reset the memory accounting.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.mem_size = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Summed size of all contained chunks.
    pub fn mem_size(&self) -> usize {
        self.mem_size
    }

    /// Iterate head (newest) to tail (oldest).
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }
}
