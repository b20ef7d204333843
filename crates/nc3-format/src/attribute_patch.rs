//! In-place replacement of one attribute's value.
//!
//! A patch is planned against the header first: every check happens before
//! any byte is produced, and the resulting writes stay inside the space the
//! attribute already occupies. Character values may grow into their own
//! padding; numeric values may not grow at all.

use crate::attribute::{AttrOwner, Attribute};
use crate::codec::padded;
use crate::data::NcValues;
use crate::error::FormatError;
use crate::header::Header;

/// A validated set of positional writes for one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePatch {
    owner: Option<String>,
    name: String,
    writes: Vec<(u64, Vec<u8>)>,
    new_values: NcValues,
    new_nelems: u32,
}

impl AttributePatch {
    /// Plan replacing the value of `attr.name` on `owner` with `attr.values`.
    pub fn plan(header: &Header, owner: AttrOwner<'_>, attr: &Attribute) -> Result<Self, FormatError> {
        let (existing, loc) = header.attribute_with_location(owner, &attr.name)?;
        let loc = loc.ok_or_else(|| FormatError::AttributeNotFound(attr.name.clone()))?;
        let (have, want) = (existing.nc_type(), attr.nc_type());
        if have != want {
            return Err(FormatError::TypeMismatch {
                attribute: attr.name.clone(),
                have,
                want,
            });
        }

        let mut writes = Vec::new();
        let (new_values, new_nelems) = match &attr.values {
            NcValues::Char(text) => {
                let org = loc.nelems as usize;
                let capacity = padded(org as u64) as usize;
                let max = text.len().min(capacity);
                if max > org {
                    writes.push((loc.nelems_pos(), (max as i32).to_be_bytes().to_vec()));
                }
                let mut bytes = vec![0u8; capacity];
                bytes[..max].copy_from_slice(&text[..max]);
                if capacity > 0 {
                    writes.push((loc.values_pos(), bytes));
                }
                (NcValues::Char(text[..max].to_vec()), loc.nelems.max(max as u32))
            }
            values => {
                let capacity = loc.nelems as usize;
                if values.len() > capacity {
                    return Err(FormatError::CapacityExceeded {
                        attribute: attr.name.clone(),
                        capacity,
                        requested: values.len(),
                    });
                }
                if !values.is_empty() {
                    writes.push((loc.values_pos(), values.encode()));
                }
                (merge_prefix(values, &existing.values), loc.nelems)
            }
        };

        Ok(Self {
            owner: match owner {
                AttrOwner::Global => None,
                AttrOwner::Variable(v) => Some(v.to_string()),
            },
            name: attr.name.clone(),
            writes,
            new_values,
            new_nelems,
        })
    }

    /// The `(file position, bytes)` writes that carry out the patch.
    pub fn writes(&self) -> &[(u64, Vec<u8>)] {
        &self.writes
    }

    /// Update the in-memory header to what the file holds after the writes.
    pub fn apply_to(&self, header: &mut Header) -> Result<(), FormatError> {
        let owner = match &self.owner {
            None => AttrOwner::Global,
            Some(v) => AttrOwner::Variable(v),
        };
        let (attrs, locs) = header.attribute_lists_mut(owner)?;
        let idx = attrs
            .iter()
            .position(|a| a.name == self.name)
            .ok_or_else(|| FormatError::AttributeNotFound(self.name.clone()))?;
        attrs[idx].values = self.new_values.clone();
        if let Some(loc) = locs.get_mut(idx) {
            loc.nelems = self.new_nelems;
        }
        Ok(())
    }
}

/// `new` followed by the tail of `old` it does not overwrite.
fn merge_prefix(new: &NcValues, old: &NcValues) -> NcValues {
    fn join<T: Copy>(new: &[T], old: &[T]) -> Vec<T> {
        let mut v = new.to_vec();
        if old.len() > new.len() {
            v.extend_from_slice(&old[new.len()..]);
        }
        v
    }
    match (new, old) {
        (NcValues::Byte(n), NcValues::Byte(o)) => NcValues::Byte(join(n, o)),
        (NcValues::Short(n), NcValues::Short(o)) => NcValues::Short(join(n, o)),
        (NcValues::Int(n), NcValues::Int(o)) => NcValues::Int(join(n, o)),
        (NcValues::Float(n), NcValues::Float(o)) => NcValues::Float(join(n, o)),
        (NcValues::Double(n), NcValues::Double(o)) => NcValues::Double(join(n, o)),
        _ => new.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::NcType;
    use crate::header_reader::ReadOptions;
    use crate::header_writer::{compute_layout, serialize};
    use crate::signature::FormatVersion;

    fn written() -> (Header, Vec<u8>) {
        let mut h = Header::new(FormatVersion::Classic);
        h.add_dimension("x", 2).unwrap();
        h.add_variable("v", NcType::Int, &["x"]).unwrap();
        h.set_attribute(AttrOwner::Global, Attribute::text("title", "abcde"))
            .unwrap();
        h.set_attribute(AttrOwner::Variable("v"), Attribute::new("range", vec![1i32, 2, 3]))
            .unwrap();
        compute_layout(&mut h, 0, None).unwrap();
        let mut bytes = serialize(&mut h);
        bytes.resize(h.calc_file_size() as usize, 0);
        (h, bytes)
    }

    fn apply(bytes: &mut [u8], patch: &AttributePatch) {
        for (pos, data) in patch.writes() {
            let p = *pos as usize;
            bytes[p..p + data.len()].copy_from_slice(data);
        }
    }

    fn reread(bytes: &[u8]) -> Header {
        Header::parse(bytes, bytes.len() as u64, &ReadOptions::new()).unwrap()
    }

    #[test]
    fn string_grows_into_padding() {
        let (mut h, mut bytes) = written();
        let patch = AttributePatch::plan(&h, AttrOwner::Global, &Attribute::text("title", "abcdefghij"))
            .unwrap();
        apply(&mut bytes, &patch);
        patch.apply_to(&mut h).unwrap();
        let back = reread(&bytes);
        assert_eq!(back.global_attributes[0].as_string().as_deref(), Some("abcdefgh"));
        assert_eq!(back.global_attr_locations[0].nelems, 8);
        assert_eq!(back, h);
    }

    #[test]
    fn shorter_string_keeps_declared_length() {
        let (mut h, mut bytes) = written();
        let patch = AttributePatch::plan(&h, AttrOwner::Global, &Attribute::text("title", "xy")).unwrap();
        assert_eq!(patch.writes().len(), 1);
        apply(&mut bytes, &patch);
        patch.apply_to(&mut h).unwrap();
        let back = reread(&bytes);
        assert_eq!(back.global_attributes[0].as_string().as_deref(), Some("xy"));
        assert_eq!(back.global_attr_locations[0].nelems, 5);
        assert_eq!(back, h);
    }

    #[test]
    fn numeric_prefix_update() {
        let (mut h, mut bytes) = written();
        let patch =
            AttributePatch::plan(&h, AttrOwner::Variable("v"), &Attribute::new("range", vec![9i32]))
                .unwrap();
        apply(&mut bytes, &patch);
        patch.apply_to(&mut h).unwrap();
        let back = reread(&bytes);
        let range = back.variable("v").unwrap().attribute("range").unwrap();
        assert_eq!(range.values, NcValues::Int(vec![9, 2, 3]));
        assert_eq!(back, h);
    }

    #[test]
    fn numeric_growth_refused() {
        let (h, _) = written();
        assert_eq!(
            AttributePatch::plan(
                &h,
                AttrOwner::Variable("v"),
                &Attribute::new("range", vec![1i32, 2, 3, 4])
            ),
            Err(FormatError::CapacityExceeded {
                attribute: "range".into(),
                capacity: 3,
                requested: 4
            })
        );
    }

    #[test]
    fn type_must_match() {
        let (h, _) = written();
        assert_eq!(
            AttributePatch::plan(&h, AttrOwner::Variable("v"), &Attribute::new("range", vec![1.0f64])),
            Err(FormatError::TypeMismatch {
                attribute: "range".into(),
                have: NcType::Int,
                want: NcType::Double
            })
        );
    }

    #[test]
    fn unknown_attribute() {
        let (h, _) = written();
        assert_eq!(
            AttributePatch::plan(&h, AttrOwner::Global, &Attribute::text("nope", "x")),
            Err(FormatError::AttributeNotFound("nope".into()))
        );
    }

    #[test]
    fn writes_stay_inside_attribute() {
        let (h, _) = written();
        let loc = h.global_attr_locations[0];
        let patch =
            AttributePatch::plan(&h, AttrOwner::Global, &Attribute::text("title", &"z".repeat(40)))
                .unwrap();
        let end = loc.values_pos() + padded(loc.nelems as u64);
        for (pos, data) in patch.writes() {
            assert!(*pos >= loc.nelems_pos());
            assert!(pos + data.len() as u64 <= end);
        }
    }
}
