//! Attributes and the attribute-section codec.
//!
//! An attribute section is a tag and count followed by, per attribute:
//! padded name, type code, element count, and the big-endian values padded
//! to 4 bytes. Character values are cut at the first NUL when read.

use crate::codec::{self, name_size, padded, put_i32, put_name, put_padding, put_section, Cursor};
use crate::data::NcValues;
use crate::datatype::NcType;
use crate::error::FormatError;

/// A named, typed list of values attached to the file or to one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub values: NcValues,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: impl Into<NcValues>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }

    /// A character attribute holding `value`.
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, NcValues::text(value))
    }

    pub fn nc_type(&self) -> NcType {
        self.values.nc_type()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value as a string, for character attributes.
    pub fn as_string(&self) -> Option<String> {
        self.values.as_string()
    }

    /// Padded on-disk size of the value run.
    pub fn value_size(&self) -> u64 {
        padded(self.values.byte_len() as u64)
    }
}

/// Where an attribute was found (or written) in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrLocation {
    /// Absolute file position of the type code field.
    pub type_pos: u64,
    /// Element count declared on disk.
    pub nelems: u32,
}

impl AttrLocation {
    /// Position of the element count field.
    pub fn nelems_pos(&self) -> u64 {
        self.type_pos + 4
    }

    /// Position of the first value byte.
    pub fn values_pos(&self) -> u64 {
        self.type_pos + 8
    }
}

/// The list an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOwner<'a> {
    Global,
    Variable(&'a str),
}

/// Look up an attribute by name.
pub fn find<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attrs.iter().find(|a| a.name == name)
}

pub(crate) fn parse_attributes(
    c: &mut Cursor<'_>,
) -> Result<(Vec<Attribute>, Vec<AttrLocation>), FormatError> {
    let count = c.read_section(codec::NC_ATTRIBUTE, "attribute")?;
    let mut attrs = Vec::with_capacity(count.min(1024));
    let mut locs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = c.read_name()?;
        let type_pos = c.position() as u64;
        let nc_type = NcType::from_code(c.read_i32()?)?;
        let nelems = c.read_count()?;
        let nbytes = nelems
            .checked_mul(nc_type.size())
            .ok_or(FormatError::NegativeLength(nelems as i64))?;
        let raw = c.read_bytes(nbytes)?;
        c.skip_padding(nbytes)?;
        let values = match nc_type {
            NcType::Char => {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                NcValues::Char(raw[..end].to_vec())
            }
            ty => NcValues::decode(ty, raw),
        };
        attrs.push(Attribute { name, values });
        locs.push(AttrLocation {
            type_pos,
            nelems: nelems as u32,
        });
    }
    Ok((attrs, locs))
}

/// Serialized size of an attribute section.
pub(crate) fn attributes_size(attrs: &[Attribute]) -> u64 {
    8 + attrs
        .iter()
        .map(|a| name_size(&a.name) + 8 + a.value_size())
        .sum::<u64>()
}

/// Append an attribute section; `base` is the file position of `buf[0]`.
pub(crate) fn put_attributes(buf: &mut Vec<u8>, base: u64, attrs: &[Attribute]) -> Vec<AttrLocation> {
    put_section(buf, codec::NC_ATTRIBUTE, attrs.len());
    let mut locs = Vec::with_capacity(attrs.len());
    for a in attrs {
        put_name(buf, &a.name);
        locs.push(AttrLocation {
            type_pos: base + buf.len() as u64,
            nelems: a.len() as u32,
        });
        put_i32(buf, a.nc_type().code());
        put_i32(buf, a.len() as i32);
        let nbytes = a.values.byte_len();
        a.values.encode_range(0, a.len(), buf);
        put_padding(buf, nbytes);
    }
    locs
}
