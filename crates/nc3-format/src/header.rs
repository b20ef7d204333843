//! The in-memory header: dimensions, attributes, variables, and the
//! placement scalars derived from them.
//!
//! Derived values (`data_start`, `record_stride`, ...) are computed on
//! demand from variable placements and the record count, so they cannot
//! drift out of date when records are appended.

use core::fmt;

use crate::attribute::{self, AttrLocation, AttrOwner, Attribute};
use crate::data::NcValues;
use crate::datatype::NcType;
use crate::dimension::{Dimension, DimensionId};
use crate::error::FormatError;
use crate::names::check_name;
use crate::signature::FormatVersion;
use crate::variable::Variable;

/// Largest per-variable (or per-record) size the 32-bit `vsize` field can hold.
pub const MAX_VARSIZE: u64 = 2 * (i32::MAX as u64) - 2;

/// Largest record count the record counter can hold.
pub const MAX_NUMRECS: u32 = i32::MAX as u32;

/// Record counter value of a streaming file.
pub const STREAMING: i32 = -1;

/// Bytes a file may fall short of its computed size and still be read.
pub const TRUNCATION_WART: u64 = 3;

/// A parsed or freshly built file header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Offset width of the file.
    pub version: FormatVersion,
    /// Dimensions in definition order; `DimensionId` indexes this list.
    pub dimensions: Vec<Dimension>,
    /// The record dimension, if any.
    pub unlimited: Option<DimensionId>,
    /// Global attributes in file order.
    pub global_attributes: Vec<Attribute>,
    /// Positions of the global attributes, parallel to `global_attributes`.
    pub global_attr_locations: Vec<AttrLocation>,
    /// Variables in definition order.
    pub variables: Vec<Variable>,
    /// The on-disk record counter held the streaming sentinel.
    pub is_streaming: bool,
    /// Serialized size of the header in bytes.
    pub header_size: u64,
    /// The file was accepted although shorter than its computed size.
    pub truncated: bool,
    num_records: u32,
}

impl Header {
    /// An empty header for a new file.
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            dimensions: Vec::new(),
            unlimited: None,
            global_attributes: Vec::new(),
            global_attr_locations: Vec::new(),
            variables: Vec::new(),
            is_streaming: false,
            header_size: 0,
            truncated: false,
            num_records: 0,
        }
    }

    pub fn uses_64bit_offsets(&self) -> bool {
        self.version == FormatVersion::Offset64
    }

    // ---- records ----

    /// Current number of records; also the length of the unlimited dimension.
    pub fn num_records(&self) -> u32 {
        self.num_records
    }

    /// Set the record count. Shapes of record variables follow.
    pub fn set_num_records(&mut self, n: u32) {
        self.num_records = n;
    }

    // ---- building ----

    /// Add a fixed-length dimension.
    pub fn add_dimension(&mut self, name: &str, length: u32) -> Result<DimensionId, FormatError> {
        if length == 0 || length > MAX_NUMRECS {
            return Err(FormatError::InvalidDimensionLength {
                name: name.to_string(),
                length: length as u64,
            });
        }
        self.push_dimension(Dimension::fixed(name, length))
    }

    /// Add the unlimited (record) dimension.
    pub fn add_unlimited_dimension(&mut self, name: &str) -> Result<DimensionId, FormatError> {
        if self.unlimited.is_some() {
            return Err(FormatError::MultipleUnlimited);
        }
        let id = self.push_dimension(Dimension::unlimited(name))?;
        self.unlimited = Some(id);
        Ok(id)
    }

    fn push_dimension(&mut self, dim: Dimension) -> Result<DimensionId, FormatError> {
        check_name(&dim.name)?;
        if self.dimension_id(&dim.name).is_some() {
            return Err(FormatError::DuplicateName(dim.name));
        }
        self.dimensions.push(dim);
        Ok(DimensionId(self.dimensions.len() - 1))
    }

    /// Add a variable over the named dimensions; returns its index.
    ///
    /// Placement is left empty until the header is laid out.
    pub fn add_variable(
        &mut self,
        name: &str,
        nc_type: NcType,
        dims: &[&str],
    ) -> Result<usize, FormatError> {
        check_name(name)?;
        if self.variable_index(name).is_some() {
            return Err(FormatError::DuplicateName(name.to_string()));
        }
        let mut ids = Vec::with_capacity(dims.len());
        for (i, d) in dims.iter().enumerate() {
            let id = self
                .dimension_id(d)
                .ok_or_else(|| FormatError::DimensionNotFound(d.to_string()))?;
            if i > 0 && Some(id) == self.unlimited {
                return Err(FormatError::UnlimitedNotFirst {
                    variable: name.to_string(),
                });
            }
            ids.push(id);
        }
        let mut var = Variable::new(name, nc_type, ids);
        var.placement.is_record = var.dims.first().is_some_and(|&d| Some(d) == self.unlimited);
        self.variables.push(var);
        Ok(self.variables.len() - 1)
    }

    /// Add or replace an attribute.
    ///
    /// Recorded positions of the owner's attributes are dropped, since they
    /// no longer describe the file until the header is rewritten.
    pub fn set_attribute(&mut self, owner: AttrOwner<'_>, attr: Attribute) -> Result<(), FormatError> {
        check_name(&attr.name)?;
        let (attrs, locs) = self.attribute_lists_mut(owner)?;
        locs.clear();
        match attrs.iter_mut().find(|a| a.name == attr.name) {
            Some(existing) => *existing = attr,
            None => attrs.push(attr),
        }
        Ok(())
    }

    /// Remove an attribute and return it.
    pub fn remove_attribute(&mut self, owner: AttrOwner<'_>, name: &str) -> Result<Attribute, FormatError> {
        let (attrs, locs) = self.attribute_lists_mut(owner)?;
        let idx = attrs
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| FormatError::AttributeNotFound(name.to_string()))?;
        locs.clear();
        Ok(attrs.remove(idx))
    }

    pub(crate) fn attribute_lists_mut(
        &mut self,
        owner: AttrOwner<'_>,
    ) -> Result<(&mut Vec<Attribute>, &mut Vec<AttrLocation>), FormatError> {
        match owner {
            AttrOwner::Global => Ok((&mut self.global_attributes, &mut self.global_attr_locations)),
            AttrOwner::Variable(name) => {
                let idx = self
                    .variable_index(name)
                    .ok_or_else(|| FormatError::VariableNotFound(name.to_string()))?;
                let v = &mut self.variables[idx];
                Ok((&mut v.attributes, &mut v.attr_locations))
            }
        }
    }

    // ---- lookup ----

    pub fn dimension_id(&self, name: &str) -> Option<DimensionId> {
        self.dimensions.iter().position(|d| d.name == name).map(DimensionId)
    }

    pub fn dimension(&self, id: DimensionId) -> Option<&Dimension> {
        self.dimensions.get(id.0)
    }

    /// Current length of a dimension; the unlimited one reports the record count.
    pub fn dimension_len(&self, id: DimensionId) -> usize {
        if Some(id) == self.unlimited {
            return self.num_records as usize;
        }
        self.dimensions.get(id.0).map_or(0, |d| d.length as usize)
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Attributes of `owner`.
    pub fn attributes(&self, owner: AttrOwner<'_>) -> Result<&[Attribute], FormatError> {
        Ok(self.attribute_lists(owner)?.0)
    }

    pub fn attribute(&self, owner: AttrOwner<'_>, name: &str) -> Option<&Attribute> {
        let (attrs, _) = self.attribute_lists(owner).ok()?;
        attribute::find(attrs, name)
    }

    /// An attribute together with its recorded file position.
    pub fn attribute_with_location(
        &self,
        owner: AttrOwner<'_>,
        name: &str,
    ) -> Result<(&Attribute, Option<AttrLocation>), FormatError> {
        let (attrs, locs) = self.attribute_lists(owner)?;
        let idx = attrs
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| FormatError::AttributeNotFound(name.to_string()))?;
        Ok((&attrs[idx], locs.get(idx).copied()))
    }

    fn attribute_lists(&self, owner: AttrOwner<'_>) -> Result<(&[Attribute], &[AttrLocation]), FormatError> {
        match owner {
            AttrOwner::Global => Ok((&self.global_attributes, &self.global_attr_locations)),
            AttrOwner::Variable(name) => {
                let v = self
                    .variable(name)
                    .ok_or_else(|| FormatError::VariableNotFound(name.to_string()))?;
                Ok((&v.attributes, &v.attr_locations))
            }
        }
    }

    // ---- shapes ----

    /// Current shape of a variable, the record dimension first for record variables.
    pub fn shape(&self, var: &Variable) -> Vec<usize> {
        var.dims.iter().map(|&d| self.dimension_len(d)).collect()
    }

    /// Elements in one record slab, or in the whole variable if it is not a record variable.
    pub fn slab_elements(&self, var: &Variable) -> u64 {
        let skip = usize::from(var.is_record());
        var.dims[skip..]
            .iter()
            .fold(1u64, |acc, &d| acc.saturating_mul(self.dimension_len(d) as u64))
    }

    /// Unpadded bytes in one record slab (or the whole non-record variable).
    pub fn slab_bytes(&self, var: &Variable) -> u64 {
        self.slab_elements(var).saturating_mul(var.element_size() as u64)
    }

    pub fn record_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| v.is_record())
    }

    pub fn non_record_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| !v.is_record())
    }

    // ---- derived placement ----

    /// Offset of the first variable's data; the header end if there are no variables.
    pub fn data_start(&self) -> u64 {
        self.variables
            .iter()
            .map(|v| v.placement.begin)
            .min()
            .unwrap_or(self.header_size)
    }

    /// Bytes from `data_start` to the end of the last non-record variable.
    pub fn non_record_data_size(&self) -> u64 {
        self.non_record_variables()
            .map(|v| v.placement.begin.saturating_add(v.placement.vsize))
            .max()
            .map_or(0, |end| end.saturating_sub(self.data_start()))
    }

    /// Offset of the first record; 0 when there are no record variables.
    pub fn record_start(&self) -> u64 {
        self.record_variables()
            .map(|v| v.placement.begin)
            .min()
            .unwrap_or(0)
    }

    /// Bytes in one record across all record variables.
    pub fn record_stride(&self) -> u64 {
        self.record_variables()
            .fold(0u64, |acc, v| acc.saturating_add(v.placement.size))
    }

    /// Length the file should have for the current record count.
    pub fn calc_file_size(&self) -> u64 {
        if self.record_variables().next().is_some() {
            self.record_start()
                .saturating_add(self.record_stride().saturating_mul(self.num_records as u64))
        } else {
            self.data_start().saturating_add(self.non_record_data_size())
        }
    }

    /// Size used by the truncation check.
    pub fn computed_size(&self) -> u64 {
        self.data_start()
            .saturating_add(self.non_record_data_size())
            .saturating_add(self.record_stride().saturating_mul(self.num_records as u64))
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &NcValues) -> fmt::Result {
    if let NcValues::Char(_) = values {
        let s = values.as_string().unwrap_or_default();
        return write!(f, "{s:?}");
    }
    let suffix = match values.nc_type() {
        NcType::Byte => "b",
        NcType::Short => "s",
        NcType::Float => "f",
        _ => "",
    };
    for i in 0..values.len() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match values {
            NcValues::Byte(v) => write!(f, "{}{suffix}", v[i])?,
            NcValues::Short(v) => write!(f, "{}{suffix}", v[i])?,
            NcValues::Int(v) => write!(f, "{}", v[i])?,
            NcValues::Float(v) => write!(f, "{}{suffix}", v[i])?,
            NcValues::Double(v) => write!(f, "{}", v[i])?,
            NcValues::Char(_) => {}
        }
    }
    Ok(())
}

/// CDL-style dump of the header.
impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "netcdf {{")?;
        if !self.dimensions.is_empty() {
            writeln!(f, "dimensions:")?;
            for (i, d) in self.dimensions.iter().enumerate() {
                if Some(DimensionId(i)) == self.unlimited {
                    writeln!(f, "\t{} = UNLIMITED ; // ({} currently)", d.name, self.num_records)?;
                } else {
                    writeln!(f, "\t{} = {} ;", d.name, d.length)?;
                }
            }
        }
        if !self.variables.is_empty() {
            writeln!(f, "variables:")?;
            for v in &self.variables {
                write!(f, "\t{} {}", v.nc_type, v.name)?;
                if !v.dims.is_empty() {
                    let names: Vec<&str> = v
                        .dims
                        .iter()
                        .filter_map(|&d| self.dimension(d).map(|d| d.name.as_str()))
                        .collect();
                    write!(f, "({})", names.join(", "))?;
                }
                writeln!(f, " ;")?;
                for a in &v.attributes {
                    write!(f, "\t\t{}:{} = ", v.name, a.name)?;
                    write_values(f, &a.values)?;
                    writeln!(f, " ;")?;
                }
            }
        }
        if !self.global_attributes.is_empty() {
            writeln!(f, "\n// global attributes:")?;
            for a in &self.global_attributes {
                write!(f, "\t\t:{} = ", a.name)?;
                write_values(f, &a.values)?;
                writeln!(f, " ;")?;
            }
        }
        write!(f, "}}")
    }
}
