//! Positional byte storage for nc3 files.
//!
//! The session in the `nc3` crate reads and writes through the [`Storage`]
//! trait, so an in-memory buffer, a buffered file, or (with the `mmap`
//! feature) a memory-mapped file can back it interchangeably.

use std::io;

pub mod file;
pub mod prefetch;

#[cfg(feature = "mmap")]
pub mod mmap;

pub use file::FileStorage;
#[cfg(feature = "mmap")]
pub use mmap::MmapStorage;

/// Random-access byte storage.
pub trait Storage {
    /// Current length in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Returns true if the storage holds no bytes.
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read up to `buf.len()` bytes at `pos`; returns how many were read.
    ///
    /// Fewer bytes are returned only at the end of the storage.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Read exactly `buf.len()` bytes at `pos`.
    fn read_exact_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        let n = self.read_at(pos, buf)?;
        if n < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {pos} hit end of storage after {n}", buf.len()),
            ));
        }
        Ok(())
    }

    /// Like [`read_at`](Storage::read_at), but bypassing any read cache so
    /// that changes made by other writers are seen.
    fn read_at_unbuffered(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.read_at(pos, buf)
    }

    /// Re-query the length from the backing medium, picking up growth made
    /// by other handles, and drop cached bytes.
    fn refresh_len(&mut self) -> io::Result<u64> {
        self.len()
    }

    /// Write all of `data` at `pos`, growing the storage if needed.
    fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<()>;

    /// Truncate or zero-extend to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Push buffered writes to the backing medium.
    fn flush(&mut self) -> io::Result<()>;
}

fn to_index(pos: u64) -> io::Result<usize> {
    usize::try_from(pos).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("offset {pos} does not fit in memory"))
    })
}

/// Storage held entirely in a `Vec<u8>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    data: Vec<u8>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing file bytes.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the storage and return the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Storage for MemoryStorage {
    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = match to_index(pos) {
            Ok(p) if p < self.data.len() => p,
            _ => return Ok(0),
        };
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<()> {
        let start = to_index(pos)?;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.data.resize(to_index(len)?, 0);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(pos, buf)
    }

    fn read_at_unbuffered(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at_unbuffered(pos, buf)
    }

    fn refresh_len(&mut self) -> io::Result<u64> {
        (**self).refresh_len()
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_at(pos, data)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_read_write() {
        let mut s = MemoryStorage::new();
        assert!(s.is_empty().unwrap());
        s.write_at(4, &[1, 2, 3]).unwrap();
        assert_eq!(s.as_bytes(), &[0, 0, 0, 0, 1, 2, 3]);
        let mut buf = [0u8; 2];
        s.read_exact_at(5, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
    }

    #[test]
    fn memory_short_read_at_end() {
        let mut s = MemoryStorage::from_vec(vec![9; 5]);
        let mut buf = [0u8; 4];
        assert_eq!(s.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(s.read_at(10, &mut buf).unwrap(), 0);
        let err = s.read_exact_at(3, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn memory_set_len() {
        let mut s = MemoryStorage::from_vec(vec![1, 2, 3]);
        s.set_len(5).unwrap();
        assert_eq!(s.as_bytes(), &[1, 2, 3, 0, 0]);
        s.set_len(1).unwrap();
        assert_eq!(s.into_inner(), vec![1]);
    }

    #[test]
    fn boxed_storage_forwards() {
        let mut s: Box<dyn Storage> = Box::new(MemoryStorage::from_vec(vec![5, 6]));
        s.write_at(2, &[7]).unwrap();
        assert_eq!(s.len().unwrap(), 3);
        let mut buf = [0u8; 3];
        s.read_at_unbuffered(0, &mut buf).unwrap();
        assert_eq!(buf, [5, 6, 7]);
    }
}
