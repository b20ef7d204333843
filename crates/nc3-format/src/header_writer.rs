//! Header sizing, data layout, and serialization.
//!
//! Non-record variables are placed back to back from `data_start` in
//! declaration order, and record variables follow from the end of the
//! non-record region. Each payload is padded to 4 bytes, except the
//! per-record size of a lone byte/char/short record variable.

use tracing::debug;

use crate::attribute::{attributes_size, put_attributes};
use crate::codec::{name_size, padded, put_i32, put_i64, put_name, put_section, put_u32, NC_DIMENSION, NC_VARIABLE};
use crate::error::FormatError;
use crate::header::{Header, MAX_VARSIZE};
use crate::signature::FormatVersion;

/// Exact serialized size of the header, without writing it.
pub fn size_header(h: &Header) -> u64 {
    let mut n = 4 + 4 + 8;
    for d in &h.dimensions {
        n += name_size(&d.name) + 4;
    }
    n += attributes_size(&h.global_attributes);
    n += 8;
    let offset = h.version.offset_size() as u64;
    for v in &h.variables {
        n += name_size(&v.name) + 4 + 4 * v.rank() as u64;
        n += attributes_size(&v.attributes);
        n += 4 + 4 + offset;
    }
    n
}

fn checked_slab_bytes(h: &Header, index: usize) -> Result<u64, FormatError> {
    let v = &h.variables[index];
    let skip = usize::from(v.is_record());
    v.dims[skip..]
        .iter()
        .try_fold(v.element_size() as u64, |acc, &d| {
            acc.checked_mul(h.dimension_len(d) as u64)
        })
        .ok_or_else(|| FormatError::SizeLimit {
            name: v.name.clone(),
            size: u64::MAX,
        })
}

/// Assign `begin`, `vsize`, and `size` to every variable.
///
/// Data starts at the header end plus `extra` bytes of slack, or at `floor`
/// if that is larger.
pub fn compute_layout(h: &mut Header, extra: u64, floor: Option<u64>) -> Result<(), FormatError> {
    let header_size = size_header(h);
    let data_start = header_size
        .checked_add(extra)
        .ok_or(FormatError::OffsetOverflow {
            offset: u64::MAX,
            limit: h.version.max_offset(),
        })?
        .max(floor.unwrap_or(0));

    let num_record_vars = h.record_variables().count();
    let last_fixed = h.variables.iter().rposition(|v| !v.is_record());
    let mut sizes = Vec::with_capacity(h.variables.len());
    for (i, v) in h.variables.iter().enumerate() {
        let raw = checked_slab_bytes(h, i)?;
        let vsize = padded(raw);
        if vsize > MAX_VARSIZE {
            let unbounded_ok = h.version == FormatVersion::Offset64
                && num_record_vars == 0
                && Some(i) == last_fixed;
            if !unbounded_ok {
                return Err(FormatError::SizeLimit {
                    name: v.name.clone(),
                    size: vsize,
                });
            }
        }
        let size = if v.is_record() && num_record_vars == 1 && v.element_size() <= 2 {
            raw
        } else {
            vsize
        };
        sizes.push((vsize, size));
    }

    let limit = h.version.max_offset();
    let mut begins = vec![0u64; h.variables.len()];
    let mut pos = data_start;
    for record_pass in [false, true] {
        for (i, v) in h.variables.iter().enumerate() {
            if v.is_record() != record_pass {
                continue;
            }
            if pos > limit {
                return Err(FormatError::OffsetOverflow { offset: pos, limit });
            }
            begins[i] = pos;
            pos = pos.saturating_add(sizes[i].0);
        }
    }

    for ((v, begin), (vsize, size)) in h.variables.iter_mut().zip(begins).zip(sizes) {
        v.placement.begin = begin;
        v.placement.vsize = vsize;
        v.placement.size = size;
    }
    h.header_size = header_size;

    debug!(
        header_size,
        data_start,
        record_start = h.record_start(),
        record_stride = h.record_stride(),
        "computed layout"
    );
    Ok(())
}

/// Serialize the header with its current placements.
///
/// Attribute locations are recorded as they are written. The record
/// counter is always written as a count, never the streaming sentinel.
pub fn serialize(h: &mut Header) -> Vec<u8> {
    let mut buf = Vec::with_capacity(size_header(h) as usize);
    buf.extend_from_slice(&h.version.magic());
    put_i32(&mut buf, h.num_records() as i32);

    put_section(&mut buf, NC_DIMENSION, h.dimensions.len());
    for d in &h.dimensions {
        put_name(&mut buf, &d.name);
        put_i32(&mut buf, if d.unlimited { 0 } else { d.length as i32 });
    }

    h.global_attr_locations = put_attributes(&mut buf, 0, &h.global_attributes);

    let version = h.version;
    put_section(&mut buf, NC_VARIABLE, h.variables.len());
    for v in &mut h.variables {
        put_name(&mut buf, &v.name);
        put_i32(&mut buf, v.dims.len() as i32);
        for d in &v.dims {
            put_i32(&mut buf, d.0 as i32);
        }
        v.attr_locations = put_attributes(&mut buf, 0, &v.attributes);
        put_i32(&mut buf, v.nc_type.code());
        let vsize = if v.placement.vsize > MAX_VARSIZE {
            u32::MAX
        } else {
            v.placement.vsize as u32
        };
        put_u32(&mut buf, vsize);
        match version {
            FormatVersion::Classic => put_i32(&mut buf, v.placement.begin as i32),
            FormatVersion::Offset64 => put_i64(&mut buf, v.placement.begin as i64),
        }
    }
    h.header_size = buf.len() as u64;
    h.is_streaming = false;
    buf
}

/// Serialize a modified header for writing over the existing one.
///
/// Variable placements are kept, so the new header must fit before the
/// first variable's data. The returned bytes also zero whatever is left of
/// the previous, longer header.
pub fn rewrite_in_place(h: &mut Header) -> Result<Vec<u8>, FormatError> {
    let needed = size_header(h);
    let old_size = h.header_size;
    if !h.variables.is_empty() {
        let available = h.data_start();
        if needed > available {
            return Err(FormatError::HeaderGrowthRefused { needed, available });
        }
    }
    let mut buf = serialize(h);
    if (buf.len() as u64) < old_size {
        buf.resize(old_size as usize, 0);
    }
    debug!(header_size = needed, "rewrote header in place");
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttrOwner, Attribute};
    use crate::datatype::NcType;
    use crate::header_reader::ReadOptions;

    fn scenario(version: FormatVersion) -> Header {
        let mut h = Header::new(version);
        h.add_dimension("x", 4).unwrap();
        h.add_unlimited_dimension("time").unwrap();
        h.add_variable("lon", NcType::Float, &["x"]).unwrap();
        h.add_variable("temp", NcType::Float, &["time", "x"]).unwrap();
        h.add_variable("flag", NcType::Byte, &["time"]).unwrap();
        h.set_attribute(AttrOwner::Global, Attribute::text("title", "test"))
            .unwrap();
        h.set_attribute(AttrOwner::Variable("lon"), Attribute::text("units", "degrees_east"))
            .unwrap();
        h
    }

    #[test]
    fn size_matches_serialized_length() {
        for version in [FormatVersion::Classic, FormatVersion::Offset64] {
            let mut h = scenario(version);
            compute_layout(&mut h, 0, None).unwrap();
            let expected = size_header(&h);
            assert_eq!(serialize(&mut h).len() as u64, expected);
        }
    }

    #[test]
    fn sequential_layout() {
        let mut h = scenario(FormatVersion::Classic);
        compute_layout(&mut h, 100, None).unwrap();
        let hs = h.header_size;
        let lon = &h.variables[0].placement;
        assert_eq!(lon.begin, hs + 100);
        assert_eq!(lon.vsize, 16);
        let temp = &h.variables[1].placement;
        assert_eq!(temp.begin, lon.begin + 16);
        let flag = &h.variables[2].placement;
        assert_eq!(flag.begin, temp.begin + 16);
        assert_eq!(flag.vsize, 4);
        assert_eq!(flag.size, 4);
        assert_eq!(h.data_start(), hs + 100);
        assert_eq!(h.record_start(), temp.begin);
        assert_eq!(h.record_stride(), 20);
    }

    #[test]
    fn floor_wins_over_header_size() {
        let mut h = scenario(FormatVersion::Classic);
        compute_layout(&mut h, 0, Some(4096)).unwrap();
        assert_eq!(h.data_start(), 4096);
    }

    #[test]
    fn lone_small_record_variable_is_unpadded() {
        let mut h = Header::new(FormatVersion::Classic);
        h.add_dimension("x", 3).unwrap();
        h.add_unlimited_dimension("t").unwrap();
        h.add_variable("s", NcType::Short, &["t", "x"]).unwrap();
        compute_layout(&mut h, 0, None).unwrap();
        let p = &h.variables[0].placement;
        assert_eq!(p.vsize, 8);
        assert_eq!(p.size, 6);
        assert_eq!(h.record_stride(), 6);

        let bytes = serialize(&mut h);
        let back = Header::parse(&bytes, bytes.len() as u64, &ReadOptions::new()).unwrap();
        assert_eq!(back.variables[0].placement, h.variables[0].placement);
    }

    #[test]
    fn roundtrip_through_parse() {
        for version in [FormatVersion::Classic, FormatVersion::Offset64] {
            let mut h = scenario(version);
            compute_layout(&mut h, 0, None).unwrap();
            let bytes = serialize(&mut h);
            let back = Header::parse(&bytes, h.calc_file_size(), &ReadOptions::new()).unwrap();
            assert_eq!(back, h);
        }
    }

    #[test]
    fn oversize_variable_rejected_in_classic() {
        let mut h = Header::new(FormatVersion::Classic);
        h.add_dimension("n", 1 << 30).unwrap();
        h.add_variable("big", NcType::Int, &["n"]).unwrap();
        assert_eq!(
            compute_layout(&mut h, 0, None),
            Err(FormatError::SizeLimit {
                name: "big".into(),
                size: 1 << 32
            })
        );
    }

    #[test]
    fn oversize_last_variable_allowed_in_offset64() {
        let mut h = Header::new(FormatVersion::Offset64);
        h.add_dimension("n", 1 << 30).unwrap();
        h.add_variable("small", NcType::Int, &[]).unwrap();
        h.add_variable("big", NcType::Int, &["n"]).unwrap();
        compute_layout(&mut h, 0, None).unwrap();
        assert_eq!(h.variables[1].placement.vsize, 1 << 32);

        let bytes = serialize(&mut h);
        let back = Header::parse(&bytes, h.calc_file_size(), &ReadOptions::new()).unwrap();
        assert_eq!(back.variables[1].placement.vsize, 1 << 32);
    }

    #[test]
    fn oversize_variable_not_last_rejected() {
        let mut h = Header::new(FormatVersion::Offset64);
        h.add_dimension("n", 1 << 30).unwrap();
        h.add_variable("big", NcType::Int, &["n"]).unwrap();
        h.add_variable("small", NcType::Int, &[]).unwrap();
        assert!(matches!(
            compute_layout(&mut h, 0, None),
            Err(FormatError::SizeLimit { .. })
        ));
    }

    #[test]
    fn classic_offset_overflow() {
        let mut h = Header::new(FormatVersion::Classic);
        h.add_dimension("n", 1 << 29).unwrap();
        h.add_variable("a", NcType::Int, &["n"]).unwrap();
        h.add_variable("b", NcType::Int, &[]).unwrap();
        assert!(matches!(
            compute_layout(&mut h, 0, None),
            Err(FormatError::OffsetOverflow { .. })
        ));
        assert_eq!(h.variables[0].placement.begin, 0);
        let mut h64 = h.clone();
        h64.version = FormatVersion::Offset64;
        compute_layout(&mut h64, 0, None).unwrap();
        assert!(h64.variables[1].placement.begin > i32::MAX as u64);
    }

    #[test]
    fn rewrite_keeps_placement() {
        let mut h = scenario(FormatVersion::Classic);
        compute_layout(&mut h, 64, None).unwrap();
        serialize(&mut h);
        let before: Vec<_> = h.variables.iter().map(|v| v.placement.clone()).collect();

        h.set_attribute(AttrOwner::Global, Attribute::text("history", "edited"))
            .unwrap();
        let bytes = rewrite_in_place(&mut h).unwrap();
        assert!(bytes.len() as u64 <= h.data_start());
        let after: Vec<_> = h.variables.iter().map(|v| v.placement.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(h.global_attr_locations.len(), 2);
    }

    #[test]
    fn rewrite_zeroes_old_tail() {
        let mut h = scenario(FormatVersion::Classic);
        compute_layout(&mut h, 0, None).unwrap();
        let old = serialize(&mut h);
        h.remove_attribute(AttrOwner::Global, "title").unwrap();
        let bytes = rewrite_in_place(&mut h).unwrap();
        assert_eq!(bytes.len(), old.len());
        assert!(h.header_size < old.len() as u64);
        assert!(bytes[h.header_size as usize..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rewrite_refuses_growth() {
        let mut h = scenario(FormatVersion::Classic);
        compute_layout(&mut h, 0, None).unwrap();
        serialize(&mut h);
        h.set_attribute(AttrOwner::Global, Attribute::text("history", "grows"))
            .unwrap();
        let available = h.data_start();
        assert_eq!(
            rewrite_in_place(&mut h),
            Err(FormatError::HeaderGrowthRefused {
                needed: size_header(&h),
                available
            })
        );
    }
}
