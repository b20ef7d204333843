//! Option bundles for opening and creating files.

use nc3_format::{FormatVersion, ReadOptions};

/// How to open an existing file.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Allow writes, record extension, and header updates.
    pub writable: bool,
    /// Accept files shorter than their header implies.
    pub allow_truncated: bool,
    /// Fill new records with fill values.
    pub fill: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            writable: false,
            allow_truncated: false,
            fill: true,
        }
    }
}

impl OpenOptions {
    /// Read-only, strict, fill enabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn allow_truncated(mut self, allow: bool) -> Self {
        self.allow_truncated = allow;
        self
    }

    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub(crate) fn read_options(&self) -> ReadOptions {
        ReadOptions::new().allow_truncated(self.allow_truncated)
    }
}

/// How to lay out a new file.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Use 64-bit data offsets.
    pub large_file: bool,
    /// Bytes of empty space reserved after the header for later growth.
    pub extra_header_bytes: u64,
    /// Write fill values into non-record variables and new records.
    pub fill: bool,
    /// Grow the new file to at least this many bytes.
    pub preallocate_size: Option<u64>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            large_file: false,
            extra_header_bytes: 0,
            fill: true,
            preallocate_size: None,
        }
    }
}

impl CreateOptions {
    /// Classic offsets, no header slack, fill enabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn large_file(mut self, large: bool) -> Self {
        self.large_file = large;
        self
    }

    pub fn extra_header_bytes(mut self, bytes: u64) -> Self {
        self.extra_header_bytes = bytes;
        self
    }

    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub fn preallocate(mut self, size: u64) -> Self {
        self.preallocate_size = Some(size);
        self
    }

    pub fn version(&self) -> FormatVersion {
        if self.large_file {
            FormatVersion::Offset64
        } else {
            FormatVersion::Classic
        }
    }
}
