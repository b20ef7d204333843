//! Big-endian cursor and padded-field helpers shared by the header reader
//! and writer.

use byteorder::{BigEndian, ByteOrder};

use crate::error::FormatError;

/// Every variable-length field is padded to this boundary.
pub const ALIGNMENT: usize = 4;

/// Tag of a dimension section.
pub const NC_DIMENSION: i32 = 0x0A;
/// Tag of a variable section.
pub const NC_VARIABLE: i32 = 0x0B;
/// Tag of an attribute section.
pub const NC_ATTRIBUTE: i32 = 0x0C;

/// Bytes needed to pad `nbytes` up to a 4-byte boundary.
pub fn padding(nbytes: u64) -> u64 {
    let rem = nbytes % ALIGNMENT as u64;
    if rem == 0 {
        0
    } else {
        ALIGNMENT as u64 - rem
    }
}

/// `nbytes` rounded up to a 4-byte boundary.
pub fn padded(nbytes: u64) -> u64 {
    nbytes.saturating_add(padding(nbytes))
}

/// Read cursor over a header byte buffer.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).ok_or(FormatError::UnexpectedEof {
            expected: usize::MAX,
            available: self.data.len(),
        })?;
        if end > self.data.len() {
            return Err(FormatError::UnexpectedEof {
                expected: end,
                available: self.data.len(),
            });
        }
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        self.take(n)
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, FormatError> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    /// Skip the zero padding that follows an `nbytes`-long field.
    pub(crate) fn skip_padding(&mut self, nbytes: usize) -> Result<(), FormatError> {
        self.take(padding(nbytes as u64) as usize).map(|_| ())
    }

    /// Read a length-prefixed, padded name.
    pub(crate) fn read_name(&mut self) -> Result<String, FormatError> {
        let len = self.read_count()?;
        let bytes = self.take(len)?;
        self.skip_padding(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read a section prefix and return its element count.
    ///
    /// An absent section is two zero words; the second word is not checked.
    pub(crate) fn read_section(
        &mut self,
        tag: i32,
        section: &'static str,
    ) -> Result<usize, FormatError> {
        match self.read_i32()? {
            0 => {
                self.read_i32()?;
                Ok(0)
            }
            t if t == tag => self.read_count(),
            found => Err(FormatError::BadTag { section, found }),
        }
    }

    /// Read a non-negative 32-bit count.
    pub(crate) fn read_count(&mut self) -> Result<usize, FormatError> {
        let n = self.read_i32()?;
        if n < 0 {
            return Err(FormatError::NegativeLength(n as i64));
        }
        Ok(n as usize)
    }
}

pub(crate) fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Write a section prefix; an empty section is two zero words.
pub(crate) fn put_section(buf: &mut Vec<u8>, tag: i32, count: usize) {
    if count == 0 {
        put_i32(buf, 0);
        put_i32(buf, 0);
    } else {
        put_i32(buf, tag);
        put_i32(buf, count as i32);
    }
}

/// Zero-pad `buf` after a field of `nbytes`.
pub(crate) fn put_padding(buf: &mut Vec<u8>, nbytes: usize) {
    let pad = padding(nbytes as u64) as usize;
    buf.resize(buf.len() + pad, 0);
}

/// Write a length-prefixed, padded UTF-8 name.
pub(crate) fn put_name(buf: &mut Vec<u8>, name: &str) {
    let b = name.as_bytes();
    put_i32(buf, b.len() as i32);
    buf.extend_from_slice(b);
    put_padding(buf, b.len());
}

/// On-disk size of a padded name field.
pub(crate) fn name_size(name: &str) -> u64 {
    4 + padded(name.len() as u64)
}
