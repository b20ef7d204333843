//! Variables and their on-disk placement.

use crate::attribute::{self, AttrLocation, Attribute};
use crate::datatype::NcType;
use crate::dimension::DimensionId;

/// Where a variable's data lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Absolute offset of the first element, or of the first record's slab.
    pub begin: u64,
    /// Declared size in the header: total bytes, or bytes per record, padded.
    pub vsize: u64,
    /// Bytes this variable contributes to the data region or to one record.
    /// Equal to `vsize` except for the lone small-type record variable.
    pub size: u64,
    /// True if the first dimension is the unlimited one.
    pub is_record: bool,
}

/// A typed array variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub nc_type: NcType,
    pub dims: Vec<DimensionId>,
    pub attributes: Vec<Attribute>,
    pub placement: Placement,
    /// Positions of this variable's attributes, parallel to `attributes`.
    /// Empty until the header has been read or serialized.
    pub attr_locations: Vec<AttrLocation>,
}

impl Variable {
    pub fn new(name: impl Into<String>, nc_type: NcType, dims: Vec<DimensionId>) -> Self {
        Self {
            name: name.into(),
            nc_type,
            dims,
            attributes: Vec::new(),
            placement: Placement::default(),
            attr_locations: Vec::new(),
        }
    }

    pub fn is_record(&self) -> bool {
        self.placement.is_record
    }

    /// Number of dimensions; 0 for a scalar.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        attribute::find(&self.attributes, name)
    }

    pub fn element_size(&self) -> usize {
        self.nc_type.size()
    }
}
