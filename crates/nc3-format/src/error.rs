//! Error types for classic-format parsing, layout, and in-place updates.

use core::fmt;

use crate::datatype::NcType;

/// Errors that can occur when parsing, laying out, or patching a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The magic bytes are not `CDF\x01` or `CDF\x02`.
    NotThisFormat {
        /// The first four bytes that were found.
        magic: [u8; 4],
    },
    /// A header section carried a structural tag other than the expected one.
    BadTag {
        /// Which section was being read.
        section: &'static str,
        /// The tag value found.
        found: i32,
    },
    /// Unknown element type code.
    UnknownType(i32),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// A variable references a dimension index that does not exist.
    InvalidDimensionIndex {
        /// The variable being read.
        variable: String,
        /// The out-of-range index.
        index: i32,
    },
    /// The unlimited dimension appears somewhere other than first.
    UnlimitedNotFirst {
        /// The offending variable.
        variable: String,
    },
    /// More than one dimension is marked unlimited.
    MultipleUnlimited,
    /// The record counter holds a negative value other than the streaming sentinel.
    NegativeRecordCount(i32),
    /// A name, element count, or rank field is negative.
    NegativeLength(i64),
    /// Computed file size exceeds the actual length by more than the tolerated wart.
    Truncated {
        /// Size implied by the header.
        computed: u64,
        /// Actual length of the storage.
        actual: u64,
    },
    /// A variable, record, or chunk is larger than the format can represent.
    SizeLimit {
        /// What was being sized.
        name: String,
        /// The size in bytes.
        size: u64,
    },
    /// An offset does not fit the active offset width.
    OffsetOverflow {
        /// The offset that was needed.
        offset: u64,
        /// The largest representable offset.
        limit: u64,
    },
    /// An update used a different element type than the stored attribute.
    TypeMismatch {
        /// The attribute name.
        attribute: String,
        /// Type stored in the file.
        have: NcType,
        /// Type supplied by the caller.
        want: NcType,
    },
    /// An update supplied more values than the attribute has room for.
    CapacityExceeded {
        /// The attribute name.
        attribute: String,
        /// Number of values stored in the file.
        capacity: usize,
        /// Number of values supplied.
        requested: usize,
    },
    /// The rewritten header would overlap variable data.
    HeaderGrowthRefused {
        /// Bytes the new header needs.
        needed: u64,
        /// Bytes reserved before the first variable.
        available: u64,
    },
    /// No attribute with this name on the given owner.
    AttributeNotFound(String),
    /// No variable with this name.
    VariableNotFound(String),
    /// No dimension with this name.
    DimensionNotFound(String),
    /// A section does not fit the variable's shape.
    InvalidSection(String),
    /// A fixed dimension length of zero or above `i32::MAX`.
    InvalidDimensionLength {
        /// The dimension name.
        name: String,
        /// The requested length.
        length: u64,
    },
    /// A name is empty or contains characters the format does not allow.
    InvalidName(String),
    /// A dimension, variable, or attribute name is already in use.
    DuplicateName(String),
    /// A value buffer does not match the number of elements selected.
    ValueCountMismatch {
        /// Elements selected by the section.
        expected: usize,
        /// Elements supplied.
        actual: usize,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::NotThisFormat { magic } => {
                write!(f, "not a classic-format file (magic {magic:02x?})")
            }
            FormatError::BadTag { section, found } => {
                write!(f, "malformed {section} section: tag {found:#x}")
            }
            FormatError::UnknownType(code) => write!(f, "unknown element type code {code}"),
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidDimensionIndex { variable, index } => {
                write!(f, "variable {variable} references missing dimension {index}")
            }
            FormatError::UnlimitedNotFirst { variable } => {
                write!(
                    f,
                    "variable {variable} uses the unlimited dimension in a non-leading position"
                )
            }
            FormatError::MultipleUnlimited => write!(f, "more than one unlimited dimension"),
            FormatError::NegativeRecordCount(n) => write!(f, "negative record count {n}"),
            FormatError::NegativeLength(n) => write!(f, "negative length field {n}"),
            FormatError::Truncated { computed, actual } => {
                write!(
                    f,
                    "file is truncated: calculated size {computed}, actual size {actual}"
                )
            }
            FormatError::SizeLimit { name, size } => {
                write!(f, "{name} needs {size} bytes, which exceeds the format limit")
            }
            FormatError::OffsetOverflow { offset, limit } => {
                write!(f, "offset {offset} exceeds the largest representable offset {limit}")
            }
            FormatError::TypeMismatch {
                attribute,
                have,
                want,
            } => {
                write!(
                    f,
                    "attribute {attribute} is stored as {have}, cannot update with {want}"
                )
            }
            FormatError::CapacityExceeded {
                attribute,
                capacity,
                requested,
            } => {
                write!(
                    f,
                    "attribute {attribute} holds {capacity} values, cannot store {requested}"
                )
            }
            FormatError::HeaderGrowthRefused { needed, available } => {
                write!(
                    f,
                    "header needs {needed} bytes but only {available} are reserved before the data"
                )
            }
            FormatError::AttributeNotFound(name) => write!(f, "attribute not found: {name}"),
            FormatError::VariableNotFound(name) => write!(f, "variable not found: {name}"),
            FormatError::DimensionNotFound(name) => write!(f, "dimension not found: {name}"),
            FormatError::InvalidSection(msg) => write!(f, "invalid section: {msg}"),
            FormatError::InvalidDimensionLength { name, length } => {
                write!(f, "dimension {name} cannot have fixed length {length}")
            }
            FormatError::InvalidName(name) => write!(f, "invalid object name: {name:?}"),
            FormatError::DuplicateName(name) => write!(f, "duplicate name: {name}"),
            FormatError::ValueCountMismatch { expected, actual } => {
                write!(f, "section selects {expected} elements, got {actual} values")
            }
        }
    }
}

impl std::error::Error for FormatError {}
