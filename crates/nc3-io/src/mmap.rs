//! Memory-mapped storage via `memmap2`.
//!
//! Reads copy straight out of the mapping. Writes past the end grow the
//! file with `set_len` and remap it.

use memmap2::{Mmap, MmapMut};
use std::fs;
use std::io;
use std::path::Path;

use crate::Storage;

#[derive(Debug)]
enum Map {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
    // zero-length files cannot be mapped
    Empty,
}

impl Map {
    fn bytes(&self) -> &[u8] {
        match self {
            Map::ReadOnly(m) => m,
            Map::ReadWrite(m) => m,
            Map::Empty => &[],
        }
    }
}

/// Storage backed by a memory-mapped file.
#[derive(Debug)]
pub struct MmapStorage {
    file: fs::File,
    map: Map,
    writable: bool,
}

impl MmapStorage {
    /// Map an existing file read-only.
    ///
    /// The file must not be modified by another process while mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        let mut s = Self {
            file,
            map: Map::Empty,
            writable: false,
        };
        s.remap()?;
        Ok(s)
    }

    /// Map an existing file for reading and writing.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
        let mut s = Self {
            file,
            map: Map::Empty,
            writable: true,
        };
        s.remap()?;
        Ok(s)
    }

    /// Create (or truncate) a file and map it for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            map: Map::Empty,
            writable: true,
        })
    }

    /// Zero-copy view of the mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.map.bytes()
    }

    fn remap(&mut self) -> io::Result<()> {
        // drop the old mapping before creating the new one
        self.map = Map::Empty;
        if self.file.metadata()?.len() == 0 {
            return Ok(());
        }
        self.map = if self.writable {
            // SAFETY: this handle owns the only writable mapping of the file
            // and resizes it only through `set_len`, which remaps.
            Map::ReadWrite(unsafe { MmapMut::map_mut(&self.file)? })
        } else {
            // SAFETY: read-only mapping; the caller guarantees no concurrent
            // truncation of the file.
            Map::ReadOnly(unsafe { Mmap::map(&self.file)? })
        };
        Ok(())
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file was mapped read-only",
            ))
        }
    }
}

impl Storage for MmapStorage {
    fn len(&self) -> io::Result<u64> {
        Ok(self.map.bytes().len() as u64)
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.map.bytes();
        let start = match usize::try_from(pos) {
            Ok(p) if p < bytes.len() => p,
            _ => return Ok(0),
        };
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        Ok(n)
    }

    fn refresh_len(&mut self) -> io::Result<u64> {
        if self.file.metadata()?.len() != self.len()? {
            if let Map::ReadWrite(m) = &self.map {
                m.flush()?;
            }
            self.remap()?;
        }
        self.len()
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        let end = pos + data.len() as u64;
        if end > self.len()? {
            self.set_len(end)?;
        }
        let start = usize::try_from(pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space"))?;
        match &mut self.map {
            Map::ReadWrite(m) => {
                m[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Map::Empty if data.is_empty() => Ok(()),
            _ => Err(io::Error::other("mapping is not writable")),
        }
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.check_writable()?;
        if let Map::ReadWrite(m) = &self.map {
            m.flush()?;
        }
        self.map = Map::Empty;
        self.file.set_len(len)?;
        self.remap()
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.map {
            Map::ReadWrite(m) => m.flush(),
            _ => Ok(()),
        }
    }
}
