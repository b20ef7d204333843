//! Named dimensions.

/// Index of a dimension in its header's dimension list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionId(pub usize);

/// A named axis.
///
/// The unlimited dimension is stored with `length == 0`, as on disk; its
/// current extent is the header's record count, see
/// [`Header::dimension_len`](crate::header::Header::dimension_len).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub length: u32,
    pub unlimited: bool,
}

impl Dimension {
    /// A fixed-length dimension.
    pub fn fixed(name: impl Into<String>, length: u32) -> Self {
        Self {
            name: name.into(),
            length,
            unlimited: false,
        }
    }

    /// The record dimension.
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: 0,
            unlimited: true,
        }
    }
}
