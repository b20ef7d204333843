//! Header parsing.

use tracing::{debug, warn};

use crate::attribute::parse_attributes;
use crate::codec::{padded, Cursor, NC_DIMENSION, NC_VARIABLE};
use crate::datatype::NcType;
use crate::dimension::{Dimension, DimensionId};
use crate::error::FormatError;
use crate::header::{Header, MAX_NUMRECS, STREAMING, TRUNCATION_WART};
use crate::signature::{detect_format, FormatVersion};
use crate::variable::{Placement, Variable};

/// `vsize` value meaning "too large for this field".
const VSIZE_UNKNOWN: u32 = u32::MAX;

/// Options controlling how strictly a header is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Accept files shorter than their computed size; missing bytes read as zero.
    pub allow_truncated: bool,
}

impl ReadOptions {
    /// Strict defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept truncated files.
    pub fn allow_truncated(mut self, allow: bool) -> Self {
        self.allow_truncated = allow;
        self
    }
}

impl Header {
    /// Parse a header from the start of a file.
    ///
    /// `data` must hold at least the whole header; it may hold more of the
    /// file. `file_len` is the full length of the file, used for streaming
    /// record inference and the truncation check.
    pub fn parse(data: &[u8], file_len: u64, opts: &ReadOptions) -> Result<Header, FormatError> {
        let version = detect_format(data)?;
        let mut c = Cursor::new(data);
        c.read_bytes(4)?;

        let mut header = Header::new(version);
        let counter = c.read_i32()?;
        match counter {
            STREAMING => header.is_streaming = true,
            n if n < 0 => return Err(FormatError::NegativeRecordCount(n)),
            n => header.set_num_records(n as u32),
        }

        let ndims = c.read_section(NC_DIMENSION, "dimension")?;
        for i in 0..ndims {
            let name = c.read_name()?;
            let len = c.read_i32()?;
            if len < 0 {
                return Err(FormatError::NegativeLength(len as i64));
            }
            if len == 0 {
                if header.unlimited.is_some() {
                    return Err(FormatError::MultipleUnlimited);
                }
                header.unlimited = Some(DimensionId(i));
                header.dimensions.push(Dimension::unlimited(name));
            } else {
                header.dimensions.push(Dimension::fixed(name, len as u32));
            }
        }

        let (attrs, locs) = parse_attributes(&mut c)?;
        header.global_attributes = attrs;
        header.global_attr_locations = locs;

        let nvars = c.read_section(NC_VARIABLE, "variable")?;
        let mut unknown_vsize = Vec::new();
        for _ in 0..nvars {
            let var = read_variable(&mut c, &header, &mut unknown_vsize)?;
            header.variables.push(var);
        }
        header.header_size = c.position() as u64;

        for idx in unknown_vsize {
            let bytes = padded(header.slab_bytes(&header.variables[idx]));
            let p = &mut header.variables[idx].placement;
            p.vsize = bytes;
            p.size = bytes;
        }

        apply_small_record_workaround(&mut header);

        if header.is_streaming {
            let stride = header.record_stride();
            if stride > 0 {
                let n = file_len.saturating_sub(header.record_start()) / stride;
                header.set_num_records(n.min(MAX_NUMRECS as u64) as u32);
            }
            debug!(num_records = header.num_records(), "inferred record count of streaming file");
        }

        let computed = header.computed_size();
        if computed > file_len.saturating_add(TRUNCATION_WART) {
            if !opts.allow_truncated {
                return Err(FormatError::Truncated {
                    computed,
                    actual: file_len,
                });
            }
            warn!(computed, actual = file_len, "file is truncated, reading it as extendable");
            header.truncated = true;
        }

        debug!(
            version = ?header.version,
            dimensions = header.dimensions.len(),
            variables = header.variables.len(),
            num_records = header.num_records(),
            header_size = header.header_size,
            "parsed header"
        );
        Ok(header)
    }
}

fn read_variable(
    c: &mut Cursor<'_>,
    header: &Header,
    unknown_vsize: &mut Vec<usize>,
) -> Result<Variable, FormatError> {
    let name = c.read_name()?;
    let rank = c.read_count()?;
    let mut dims = Vec::with_capacity(rank.min(1024));
    let mut is_record = false;
    for j in 0..rank {
        let index = c.read_i32()?;
        if index < 0 || index as usize >= header.dimensions.len() {
            return Err(FormatError::InvalidDimensionIndex {
                variable: name,
                index,
            });
        }
        let id = DimensionId(index as usize);
        if Some(id) == header.unlimited {
            if j != 0 {
                return Err(FormatError::UnlimitedNotFirst { variable: name });
            }
            is_record = true;
        }
        dims.push(id);
    }

    let (attributes, attr_locations) = parse_attributes(c)?;
    let nc_type = NcType::from_code(c.read_i32()?)?;
    let vsize = c.read_u32()?;
    let begin = match header.version {
        FormatVersion::Classic => c.read_i32()? as i64,
        FormatVersion::Offset64 => c.read_i64()?,
    };
    if begin < 0 {
        return Err(FormatError::NegativeLength(begin));
    }
    if vsize == VSIZE_UNKNOWN {
        unknown_vsize.push(header.variables.len());
    }

    Ok(Variable {
        name,
        nc_type,
        dims,
        attributes,
        placement: Placement {
            begin: begin as u64,
            vsize: vsize as u64,
            size: vsize as u64,
            is_record,
        },
        attr_locations,
    })
}

/// Some writers left the lone record variable of a 1- or 2-byte type
/// unpadded, so its real per-record size is the unpadded slab size.
fn apply_small_record_workaround(header: &mut Header) {
    let mut records = header
        .variables
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_record());
    let (idx, var) = match (records.next(), records.next()) {
        (Some(only), None) => only,
        _ => return,
    };
    if var.element_size() > 2 {
        return;
    }
    let unpadded = header.slab_bytes(var);
    if unpadded != var.placement.vsize {
        debug!(
            variable = %var.name,
            vsize = var.placement.vsize,
            size = unpadded,
            "using unpadded record size"
        );
        header.variables[idx].placement.size = unpadded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{put_i32, put_i64, put_name, put_section, put_u32, NC_ATTRIBUTE};

    fn prelude(buf: &mut Vec<u8>, version: u8, numrecs: i32) {
        buf.extend_from_slice(&[b'C', b'D', b'F', version]);
        put_i32(buf, numrecs);
    }

    /// time(unlimited), x=3; one record variable `v` of `ty` over (time, x).
    fn one_record_var(ty: NcType, numrecs: i32, vsize: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, numrecs);
        put_section(&mut buf, NC_DIMENSION, 2);
        put_name(&mut buf, "time");
        put_i32(&mut buf, 0);
        put_name(&mut buf, "x");
        put_i32(&mut buf, 3);
        put_section(&mut buf, NC_ATTRIBUTE, 0);
        put_section(&mut buf, NC_VARIABLE, 1);
        put_name(&mut buf, "v");
        put_i32(&mut buf, 2);
        put_i32(&mut buf, 0);
        put_i32(&mut buf, 1);
        put_section(&mut buf, NC_ATTRIBUTE, 0);
        put_i32(&mut buf, ty.code());
        put_u32(&mut buf, vsize);
        let begin = buf.len() as i32 + 4;
        put_i32(&mut buf, begin);
        buf
    }

    #[test]
    fn minimal_empty_file() {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, 0);
        buf.extend_from_slice(&[0; 24]);
        let h = Header::parse(&buf, buf.len() as u64, &ReadOptions::new()).unwrap();
        assert!(h.dimensions.is_empty());
        assert!(h.variables.is_empty());
        assert_eq!(h.header_size, 32);
        assert_eq!(h.data_start(), 32);
    }

    #[test]
    fn bad_magic() {
        let err = Header::parse(b"CDF\x03\0\0\0\0", 8, &ReadOptions::new()).unwrap_err();
        assert!(matches!(err, FormatError::NotThisFormat { .. }));
    }

    #[test]
    fn negative_record_counter() {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, -5);
        buf.extend_from_slice(&[0; 24]);
        assert_eq!(
            Header::parse(&buf, 32, &ReadOptions::new()),
            Err(FormatError::NegativeRecordCount(-5))
        );
    }

    #[test]
    fn bad_dimension_tag() {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, 0);
        put_i32(&mut buf, NC_VARIABLE);
        put_i32(&mut buf, 1);
        assert_eq!(
            Header::parse(&buf, 16, &ReadOptions::new()),
            Err(FormatError::BadTag {
                section: "dimension",
                found: NC_VARIABLE
            })
        );
    }

    #[test]
    fn two_unlimited_dimensions() {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, 0);
        put_section(&mut buf, NC_DIMENSION, 2);
        put_name(&mut buf, "a");
        put_i32(&mut buf, 0);
        put_name(&mut buf, "b");
        put_i32(&mut buf, 0);
        assert_eq!(
            Header::parse(&buf, buf.len() as u64, &ReadOptions::new()),
            Err(FormatError::MultipleUnlimited)
        );
    }

    #[test]
    fn bad_dimension_index() {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, 0);
        put_section(&mut buf, NC_DIMENSION, 0);
        put_section(&mut buf, NC_ATTRIBUTE, 0);
        put_section(&mut buf, NC_VARIABLE, 1);
        put_name(&mut buf, "v");
        put_i32(&mut buf, 1);
        put_i32(&mut buf, 3);
        assert_eq!(
            Header::parse(&buf, buf.len() as u64, &ReadOptions::new()),
            Err(FormatError::InvalidDimensionIndex {
                variable: "v".into(),
                index: 3
            })
        );
    }

    #[test]
    fn unlimited_not_leading() {
        let mut buf = Vec::new();
        prelude(&mut buf, 1, 0);
        put_section(&mut buf, NC_DIMENSION, 2);
        put_name(&mut buf, "time");
        put_i32(&mut buf, 0);
        put_name(&mut buf, "x");
        put_i32(&mut buf, 3);
        put_section(&mut buf, NC_ATTRIBUTE, 0);
        put_section(&mut buf, NC_VARIABLE, 1);
        put_name(&mut buf, "v");
        put_i32(&mut buf, 2);
        put_i32(&mut buf, 1);
        put_i32(&mut buf, 0);
        assert_eq!(
            Header::parse(&buf, buf.len() as u64, &ReadOptions::new()),
            Err(FormatError::UnlimitedNotFirst {
                variable: "v".into()
            })
        );
    }

    #[test]
    fn small_record_variable_is_unpadded() {
        // 3 shorts per record: declared 8, effective 6
        let buf = one_record_var(NcType::Short, 2, 8);
        let len = buf.len() as u64 + 12;
        let h = Header::parse(&buf, len, &ReadOptions::new()).unwrap();
        let v = &h.variables[0];
        assert_eq!(v.placement.vsize, 8);
        assert_eq!(v.placement.size, 6);
        assert_eq!(h.record_stride(), 6);
    }

    #[test]
    fn int_record_variable_keeps_declared_size() {
        let buf = one_record_var(NcType::Int, 1, 12);
        let len = buf.len() as u64 + 12;
        let h = Header::parse(&buf, len, &ReadOptions::new()).unwrap();
        assert_eq!(h.record_stride(), 12);
    }

    #[test]
    fn streaming_infers_records() {
        // 3 bytes per record, unpadded
        let buf = one_record_var(NcType::Byte, STREAMING, 4);
        let start = buf.len() as u64;
        let h = Header::parse(&buf, start + 3 * 5 + 2, &ReadOptions::new()).unwrap();
        assert!(h.is_streaming);
        assert_eq!(h.record_start(), start);
        assert_eq!(h.num_records(), 5);
    }

    #[test]
    fn truncation_wart() {
        let buf = one_record_var(NcType::Int, 2, 12);
        let full = buf.len() as u64 + 24;
        assert!(Header::parse(&buf, full - 3, &ReadOptions::new()).is_ok());
        assert_eq!(
            Header::parse(&buf, full - 4, &ReadOptions::new()),
            Err(FormatError::Truncated {
                computed: full,
                actual: full - 4
            })
        );
        let h = Header::parse(&buf, full - 4, &ReadOptions::new().allow_truncated(true)).unwrap();
        assert!(h.truncated);
        assert_eq!(h.num_records(), 2);
    }

    #[test]
    fn vsize_sentinel_is_recomputed() {
        let mut buf = Vec::new();
        prelude(&mut buf, 2, 0);
        put_section(&mut buf, NC_DIMENSION, 1);
        put_name(&mut buf, "n");
        put_i32(&mut buf, 5);
        put_section(&mut buf, NC_ATTRIBUTE, 0);
        put_section(&mut buf, NC_VARIABLE, 1);
        put_name(&mut buf, "big");
        put_i32(&mut buf, 1);
        put_i32(&mut buf, 0);
        put_section(&mut buf, NC_ATTRIBUTE, 0);
        put_i32(&mut buf, NcType::Short.code());
        put_u32(&mut buf, u32::MAX);
        let begin = buf.len() as i64 + 8;
        put_i64(&mut buf, begin);
        let h = Header::parse(&buf, begin as u64 + 12, &ReadOptions::new()).unwrap();
        assert_eq!(h.variables[0].placement.vsize, 12);
        assert_eq!(h.version, FormatVersion::Offset64);
    }

    #[test]
    fn short_prefix_reports_eof() {
        let buf = one_record_var(NcType::Int, 0, 12);
        let err = Header::parse(&buf[..buf.len() - 2], 1 << 20, &ReadOptions::new()).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));
    }
}
