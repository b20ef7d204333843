//! Buffered storage over a [`std::fs::File`].

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::prefetch::ReadAhead;
use crate::Storage;

/// File-backed storage with a single read-ahead block.
///
/// Writes go straight to the file and invalidate any overlapping cached
/// bytes. The file length is cached and kept current by this handle's own
/// writes; [`Storage::refresh_len`] re-queries it.
#[derive(Debug)]
pub struct FileStorage {
    file: fs::File,
    len: u64,
    cache: ReadAhead,
    writable: bool,
}

impl FileStorage {
    /// Open an existing file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        Self::from_file(file, false)
    }

    /// Open an existing file for reading and writing.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file, true)
    }

    /// Create (or truncate) a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_file(file, true)
    }

    /// Wrap an already-open file.
    pub fn from_file(file: fs::File, writable: bool) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            cache: ReadAhead::default(),
            writable,
        })
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn into_file(self) -> fs::File {
        self.file
    }

    fn read_direct(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(pos))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file was opened read-only",
            ))
        }
    }
}

impl Storage for FileStorage {
    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || pos >= self.len {
            return Ok(0);
        }
        if self.cache.get(pos, buf) {
            return Ok(buf.len());
        }
        let want = self.cache.plan_fill(pos, buf.len());
        if want == buf.len() {
            return self.read_direct(pos, buf);
        }
        let avail = usize::try_from(self.len - pos).unwrap_or(usize::MAX);
        let mut block = vec![0u8; want.min(avail)];
        let n = self.read_direct(pos, &mut block)?;
        block.truncate(n);
        let copied = n.min(buf.len());
        buf[..copied].copy_from_slice(&block[..copied]);
        self.cache.fill(pos, block);
        Ok(copied)
    }

    fn read_at_unbuffered(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.read_direct(pos, buf)
    }

    fn refresh_len(&mut self) -> io::Result<u64> {
        self.len = self.file.metadata()?.len();
        self.cache.clear();
        Ok(self.len)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        self.cache.invalidate_range(pos, data.len() as u64);
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(data)?;
        self.len = self.len.max(pos + data.len() as u64);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.check_writable()?;
        self.file.set_len(len)?;
        self.len = len;
        self.cache.clear();
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.writable {
            self.file.flush()?;
            self.file.sync_data()?;
        }
        Ok(())
    }
}
