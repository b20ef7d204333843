//! Magic-byte detection and format version selection.

use crate::error::FormatError;

/// The three fixed signature bytes at the start of every file.
pub const MAGIC_PREFIX: [u8; 3] = [b'C', b'D', b'F'];

/// Which offset width the file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormatVersion {
    /// Version byte 1: 32-bit variable offsets.
    #[default]
    Classic,
    /// Version byte 2: 64-bit variable offsets.
    Offset64,
}

impl FormatVersion {
    /// The version byte stored at offset 3.
    pub fn version_byte(self) -> u8 {
        match self {
            FormatVersion::Classic => 1,
            FormatVersion::Offset64 => 2,
        }
    }

    /// Width of a `begin` field in bytes.
    pub fn offset_size(self) -> usize {
        match self {
            FormatVersion::Classic => 4,
            FormatVersion::Offset64 => 8,
        }
    }

    /// Largest `begin` offset this version can store.
    pub fn max_offset(self) -> u64 {
        match self {
            FormatVersion::Classic => i32::MAX as u64,
            FormatVersion::Offset64 => i64::MAX as u64,
        }
    }

    /// The full four magic bytes for this version.
    pub fn magic(self) -> [u8; 4] {
        [
            MAGIC_PREFIX[0],
            MAGIC_PREFIX[1],
            MAGIC_PREFIX[2],
            self.version_byte(),
        ]
    }
}

/// Check the magic bytes and return the format version they select.
pub fn detect_format(data: &[u8]) -> Result<FormatVersion, FormatError> {
    if data.len() < 4 {
        let mut magic = [0u8; 4];
        magic[..data.len()].copy_from_slice(data);
        return Err(FormatError::NotThisFormat { magic });
    }
    let magic = [data[0], data[1], data[2], data[3]];
    if magic[..3] != MAGIC_PREFIX {
        return Err(FormatError::NotThisFormat { magic });
    }
    match magic[3] {
        1 => Ok(FormatVersion::Classic),
        2 => Ok(FormatVersion::Offset64),
        _ => Err(FormatError::NotThisFormat { magic }),
    }
}

/// Cheap probe: does this buffer start like a classic-format file?
pub fn is_valid_file(data: &[u8]) -> bool {
    detect_format(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_magic() {
        assert_eq!(detect_format(b"CDF\x01rest"), Ok(FormatVersion::Classic));
    }

    #[test]
    fn offset64_magic() {
        assert_eq!(detect_format(b"CDF\x02"), Ok(FormatVersion::Offset64));
    }

    #[test]
    fn unknown_version_byte() {
        assert_eq!(
            detect_format(b"CDF\x05"),
            Err(FormatError::NotThisFormat {
                magic: *b"CDF\x05"
            })
        );
    }

    #[test]
    fn hdf5_is_rejected() {
        let hdf5 = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];
        assert!(!is_valid_file(&hdf5));
    }

    #[test]
    fn too_short() {
        assert_eq!(
            detect_format(b"CD"),
            Err(FormatError::NotThisFormat {
                magic: [b'C', b'D', 0, 0]
            })
        );
        assert!(!is_valid_file(&[]));
    }

    #[test]
    fn magic_roundtrip() {
        for v in [FormatVersion::Classic, FormatVersion::Offset64] {
            assert_eq!(detect_format(&v.magic()), Ok(v));
        }
    }

    #[test]
    fn offset_widths() {
        assert_eq!(FormatVersion::Classic.offset_size(), 4);
        assert_eq!(FormatVersion::Offset64.offset_size(), 8);
        assert_eq!(FormatVersion::Classic.max_offset(), 2_147_483_647);
    }
}
