//! Typed value buffers and big-endian element conversion.
//!
//! [`NcValues`] is the flat, row-major element store the codec reads into
//! and writes from; [`Array`] pairs it with a shape.

use byteorder::{BigEndian, ByteOrder};

use crate::datatype::NcType;

/// A flat run of elements of one external type.
#[derive(Debug, Clone, PartialEq)]
pub enum NcValues {
    Byte(Vec<i8>),
    Char(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl NcValues {
    /// `n` zero elements of type `ty`.
    pub fn zeroed(ty: NcType, n: usize) -> NcValues {
        match ty {
            NcType::Byte => NcValues::Byte(vec![0; n]),
            NcType::Char => NcValues::Char(vec![0; n]),
            NcType::Short => NcValues::Short(vec![0; n]),
            NcType::Int => NcValues::Int(vec![0; n]),
            NcType::Float => NcValues::Float(vec![0.0; n]),
            NcType::Double => NcValues::Double(vec![0.0; n]),
        }
    }

    /// Character values from a string (stored as UTF-8 bytes).
    pub fn text(s: &str) -> NcValues {
        NcValues::Char(s.as_bytes().to_vec())
    }

    /// Element type of these values.
    pub fn nc_type(&self) -> NcType {
        match self {
            NcValues::Byte(_) => NcType::Byte,
            NcValues::Char(_) => NcType::Char,
            NcValues::Short(_) => NcType::Short,
            NcValues::Int(_) => NcType::Int,
            NcValues::Float(_) => NcType::Float,
            NcValues::Double(_) => NcType::Double,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            NcValues::Byte(v) => v.len(),
            NcValues::Char(v) => v.len(),
            NcValues::Short(v) => v.len(),
            NcValues::Int(v) => v.len(),
            NcValues::Float(v) => v.len(),
            NcValues::Double(v) => v.len(),
        }
    }

    /// True when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded size in bytes, without padding.
    pub fn byte_len(&self) -> usize {
        self.len() * self.nc_type().size()
    }

    /// Decode big-endian bytes into values. Trailing partial elements are ignored.
    pub fn decode(ty: NcType, bytes: &[u8]) -> NcValues {
        let n = bytes.len() / ty.size();
        let mut out = NcValues::zeroed(ty, n);
        out.decode_into(0, &bytes[..n * ty.size()]);
        out
    }

    /// Decode big-endian `bytes` over the elements starting at `dest_elem`.
    ///
    /// `bytes.len()` must be a whole number of elements and fit in the buffer.
    pub fn decode_into(&mut self, dest_elem: usize, bytes: &[u8]) {
        let size = self.nc_type().size();
        let n = bytes.len() / size;
        let range = dest_elem..dest_elem + n;
        match self {
            NcValues::Byte(v) => {
                for (d, &b) in v[range].iter_mut().zip(bytes) {
                    *d = b as i8;
                }
            }
            NcValues::Char(v) => v[range].copy_from_slice(bytes),
            NcValues::Short(v) => BigEndian::read_i16_into(bytes, &mut v[range]),
            NcValues::Int(v) => BigEndian::read_i32_into(bytes, &mut v[range]),
            NcValues::Float(v) => BigEndian::read_f32_into(bytes, &mut v[range]),
            NcValues::Double(v) => BigEndian::read_f64_into(bytes, &mut v[range]),
        }
    }

    /// Append the big-endian encoding of elements `start..start + n` to `out`.
    pub fn encode_range(&self, start: usize, n: usize, out: &mut Vec<u8>) {
        let size = self.nc_type().size();
        let at = out.len();
        out.resize(at + n * size, 0);
        let dst = &mut out[at..];
        let range = start..start + n;
        match self {
            NcValues::Byte(v) => {
                for (d, &b) in dst.iter_mut().zip(&v[range]) {
                    *d = b as u8;
                }
            }
            NcValues::Char(v) => dst.copy_from_slice(&v[range]),
            NcValues::Short(v) => BigEndian::write_i16_into(&v[range], dst),
            NcValues::Int(v) => BigEndian::write_i32_into(&v[range], dst),
            NcValues::Float(v) => BigEndian::write_f32_into(&v[range], dst),
            NcValues::Double(v) => BigEndian::write_f64_into(&v[range], dst),
        }
    }

    /// Big-endian encoding of all elements.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.encode_range(0, self.len(), &mut out);
        out
    }

    /// A buffer of `n` copies of the first element (used for fill values).
    ///
    /// An empty buffer yields `n` zero elements.
    pub fn repeat_first(&self, n: usize) -> NcValues {
        match self {
            NcValues::Byte(v) => NcValues::Byte(vec![v.first().copied().unwrap_or(0); n]),
            NcValues::Char(v) => NcValues::Char(vec![v.first().copied().unwrap_or(0); n]),
            NcValues::Short(v) => NcValues::Short(vec![v.first().copied().unwrap_or(0); n]),
            NcValues::Int(v) => NcValues::Int(vec![v.first().copied().unwrap_or(0); n]),
            NcValues::Float(v) => NcValues::Float(vec![v.first().copied().unwrap_or(0.0); n]),
            NcValues::Double(v) => NcValues::Double(vec![v.first().copied().unwrap_or(0.0); n]),
        }
    }

    /// Element `i` widened to `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            NcValues::Byte(v) => v.get(i).map(|&x| x as f64),
            NcValues::Char(v) => v.get(i).map(|&x| x as f64),
            NcValues::Short(v) => v.get(i).map(|&x| x as f64),
            NcValues::Int(v) => v.get(i).map(|&x| x as f64),
            NcValues::Float(v) => v.get(i).map(|&x| x as f64),
            NcValues::Double(v) => v.get(i).copied(),
        }
    }

    /// All elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get_f64(i)).collect()
    }

    /// Character data as a string, stopping at the first NUL.
    pub fn as_string(&self) -> Option<String> {
        match self {
            NcValues::Char(v) => {
                let end = v.iter().position(|&b| b == 0).unwrap_or(v.len());
                Some(String::from_utf8_lossy(&v[..end]).into_owned())
            }
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<&[i8]> {
        match self {
            NcValues::Byte(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_chars(&self) -> Option<&[u8]> {
        match self {
            NcValues::Char(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            NcValues::Short(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            NcValues::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            NcValues::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            NcValues::Double(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Vec<i8>> for NcValues {
    fn from(v: Vec<i8>) -> Self {
        NcValues::Byte(v)
    }
}

impl From<Vec<u8>> for NcValues {
    fn from(v: Vec<u8>) -> Self {
        NcValues::Char(v)
    }
}

impl From<Vec<i16>> for NcValues {
    fn from(v: Vec<i16>) -> Self {
        NcValues::Short(v)
    }
}

impl From<Vec<i32>> for NcValues {
    fn from(v: Vec<i32>) -> Self {
        NcValues::Int(v)
    }
}

impl From<Vec<f32>> for NcValues {
    fn from(v: Vec<f32>) -> Self {
        NcValues::Float(v)
    }
}

impl From<Vec<f64>> for NcValues {
    fn from(v: Vec<f64>) -> Self {
        NcValues::Double(v)
    }
}

impl From<&str> for NcValues {
    fn from(s: &str) -> Self {
        NcValues::text(s)
    }
}

/// An n-dimensional array: row-major values plus their shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Extent of each dimension.
    pub shape: Vec<usize>,
    /// Flat row-major values; `values.len()` equals the product of `shape`.
    pub values: NcValues,
}

impl Array {
    /// Total number of elements (1 for a scalar).
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}
