//! Read-ahead block for file-backed storage.
//!
//! [`ReadAhead`] holds one contiguous block of file bytes. Small reads are
//! served from it; a miss refills it starting at the requested offset. When
//! reads arrive back to back the block size doubles, up to a cap, so a
//! record-by-record scan issues few system calls.

/// Initial block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Largest block the read-ahead will grow to.
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct ReadAhead {
    start: u64,
    data: Vec<u8>,
    block_size: usize,
    next_expected: Option<u64>,
}

impl Default for ReadAhead {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl ReadAhead {
    pub fn new(block_size: usize) -> Self {
        Self {
            start: 0,
            data: Vec::new(),
            block_size: block_size.max(1),
            next_expected: None,
        }
    }

    /// Current block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Copy `buf.len()` bytes at `pos` out of the cached block.
    ///
    /// Returns false (and copies nothing) unless the block covers the whole
    /// range.
    pub fn get(&mut self, pos: u64, buf: &mut [u8]) -> bool {
        let Some(offset) = pos.checked_sub(self.start) else {
            return false;
        };
        let Ok(offset) = usize::try_from(offset) else {
            return false;
        };
        let Some(end) = offset.checked_add(buf.len()) else {
            return false;
        };
        match self.data.get(offset..end) {
            Some(src) => {
                buf.copy_from_slice(src);
                self.next_expected = Some(pos + buf.len() as u64);
                true
            }
            None => false,
        }
    }

    /// Number of bytes to load for a miss at `pos` of `len` bytes.
    ///
    /// Also updates the sequential-access tracking.
    pub fn plan_fill(&mut self, pos: u64, len: usize) -> usize {
        if self.next_expected == Some(pos) {
            self.block_size = (self.block_size * 2).min(MAX_BLOCK_SIZE);
        }
        self.next_expected = Some(pos + len as u64);
        self.block_size.max(len)
    }

    /// Replace the cached block. `data` may be shorter than planned at EOF.
    pub fn fill(&mut self, pos: u64, data: Vec<u8>) {
        self.start = pos;
        self.data = data;
    }

    /// Drop any cached bytes overlapping `pos..pos + len`.
    pub fn invalidate_range(&mut self, pos: u64, len: u64) {
        let block_end = self.start + self.data.len() as u64;
        if pos < block_end && pos.saturating_add(len) > self.start {
            self.clear();
        }
    }

    /// Drop the cached block.
    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
    }
}
