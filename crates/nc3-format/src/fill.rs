//! Fill values written into space that has not been given data.

use crate::data::NcValues;
use crate::datatype::NcType;
use crate::variable::Variable;

/// Attribute that overrides the default fill value of a variable.
pub const FILL_VALUE_ATTR: &str = "_FillValue";

pub const FILL_BYTE: i8 = -127;
pub const FILL_CHAR: u8 = 0;
pub const FILL_SHORT: i16 = -32767;
pub const FILL_INT: i32 = -2_147_483_647;
pub const FILL_FLOAT: f32 = 9.969_209_968_386_869e36_f32;
pub const FILL_DOUBLE: f64 = 9.969_209_968_386_869e36;

/// The default fill value of a type, as a single element.
pub fn default_fill(ty: NcType) -> NcValues {
    match ty {
        NcType::Byte => NcValues::Byte(vec![FILL_BYTE]),
        NcType::Char => NcValues::Char(vec![FILL_CHAR]),
        NcType::Short => NcValues::Short(vec![FILL_SHORT]),
        NcType::Int => NcValues::Int(vec![FILL_INT]),
        NcType::Float => NcValues::Float(vec![FILL_FLOAT]),
        NcType::Double => NcValues::Double(vec![FILL_DOUBLE]),
    }
}

/// The fill value of `var`: its `_FillValue` attribute when that has the
/// variable's type and at least one value, else the type default.
pub fn fill_value(var: &Variable) -> NcValues {
    match var.attribute(FILL_VALUE_ATTR) {
        Some(a) if a.nc_type() == var.nc_type && !a.is_empty() => a.values.repeat_first(1),
        _ => default_fill(var.nc_type),
    }
}

/// Big-endian bytes of `n` fill elements for `var`.
pub fn fill_bytes(var: &Variable, n: usize) -> Vec<u8> {
    fill_value(var).repeat_first(n).encode()
}
