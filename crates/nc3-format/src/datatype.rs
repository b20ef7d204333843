//! Element type codes.

use core::fmt;

use crate::error::FormatError;

/// The six external element types of the classic format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NcType {
    /// NC_BYTE: signed 8-bit integer
    Byte,
    /// NC_CHAR: 8-bit character
    Char,
    /// NC_SHORT: signed 16-bit integer
    Short,
    /// NC_INT: signed 32-bit integer
    Int,
    /// NC_FLOAT: 32-bit IEEE float
    Float,
    /// NC_DOUBLE: 64-bit IEEE float
    Double,
}

impl NcType {
    /// Decode the on-disk type code.
    pub fn from_code(code: i32) -> Result<NcType, FormatError> {
        match code {
            1 => Ok(NcType::Byte),
            2 => Ok(NcType::Char),
            3 => Ok(NcType::Short),
            4 => Ok(NcType::Int),
            5 => Ok(NcType::Float),
            6 => Ok(NcType::Double),
            other => Err(FormatError::UnknownType(other)),
        }
    }

    /// The on-disk type code.
    pub fn code(self) -> i32 {
        match self {
            NcType::Byte => 1,
            NcType::Char => 2,
            NcType::Short => 3,
            NcType::Int => 4,
            NcType::Float => 5,
            NcType::Double => 6,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            NcType::Byte | NcType::Char => 1,
            NcType::Short => 2,
            NcType::Int | NcType::Float => 4,
            NcType::Double => 8,
        }
    }
}

impl fmt::Display for NcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NcType::Byte => write!(f, "byte"),
            NcType::Char => write!(f, "char"),
            NcType::Short => write!(f, "short"),
            NcType::Int => write!(f, "int"),
            NcType::Float => write!(f, "float"),
            NcType::Double => write!(f, "double"),
        }
    }
}
