//! Mapping a section of a variable onto file byte ranges.
//!
//! A layout walks the selected index space in row-major order and yields
//! [`Chunk`]s: runs of elements that are contiguous in the file. Inner
//! dimensions read with stride 1 are merged into one run for as long as
//! each covers its full extent. For record variables the outer dimension
//! steps by the record stride and is never merged, since other variables'
//! data sits between consecutive records.

use crate::error::FormatError;
use crate::header::MAX_VARSIZE;

const MAX_INDEX: usize = i32::MAX as usize;

/// Selection along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    pub start: usize,
    pub count: usize,
    pub stride: usize,
}

impl SliceRange {
    pub fn new(start: usize, count: usize, stride: usize) -> Self {
        Self {
            start,
            count,
            stride,
        }
    }

    /// Every index of a dimension of length `len`.
    pub fn full(len: usize) -> Self {
        Self::new(0, len, 1)
    }

    /// Last selected index; `None` for an empty range.
    pub fn last(&self) -> Option<usize> {
        self.count
            .checked_sub(1)
            .map(|n| self.start + n * self.stride)
    }
}

/// A rectangular, possibly strided selection of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    ranges: Vec<SliceRange>,
}

impl Section {
    pub fn new(ranges: Vec<SliceRange>) -> Self {
        Self { ranges }
    }

    /// The whole of a variable with this shape.
    pub fn full(shape: &[usize]) -> Self {
        Self::new(shape.iter().map(|&n| SliceRange::full(n)).collect())
    }

    /// Unit-stride selection from corner and edge lengths.
    pub fn from_start_count(start: &[usize], count: &[usize]) -> Result<Self, FormatError> {
        if start.len() != count.len() {
            return Err(FormatError::InvalidSection(format!(
                "start has rank {}, count has rank {}",
                start.len(),
                count.len()
            )));
        }
        Ok(Self::new(
            start
                .iter()
                .zip(count)
                .map(|(&s, &c)| SliceRange::new(s, c, 1))
                .collect(),
        ))
    }

    pub fn ranges(&self) -> &[SliceRange] {
        &self.ranges
    }

    pub fn rank(&self) -> usize {
        self.ranges.len()
    }

    /// Extent of the selection along each dimension.
    pub fn shape(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.count).collect()
    }

    /// Number of selected elements (1 for a scalar).
    pub fn num_elements(&self) -> usize {
        self.ranges.iter().map(|r| r.count).product()
    }

    /// Check the selection against a variable shape.
    pub fn validate(&self, shape: &[usize]) -> Result<(), FormatError> {
        if self.rank() != shape.len() {
            return Err(FormatError::InvalidSection(format!(
                "section has rank {}, variable has rank {}",
                self.rank(),
                shape.len()
            )));
        }
        for (dim, (r, &len)) in self.ranges.iter().zip(shape).enumerate() {
            if r.stride == 0 {
                return Err(FormatError::InvalidSection(format!(
                    "dimension {dim}: stride must be positive"
                )));
            }
            if r.start > MAX_INDEX || r.count > MAX_INDEX || r.stride > MAX_INDEX {
                return Err(FormatError::InvalidSection(format!(
                    "dimension {dim}: values exceed 32-bit range"
                )));
            }
            let end = match r.count.checked_sub(1) {
                None => r.start,
                Some(n) => n
                    .checked_mul(r.stride)
                    .and_then(|x| x.checked_add(r.start))
                    .filter(|&last| last < len)
                    .ok_or_else(|| {
                        FormatError::InvalidSection(format!(
                            "dimension {dim}: {}:{}:{} exceeds length {len}",
                            r.start, r.count, r.stride
                        ))
                    })?,
            };
            if end > len {
                return Err(FormatError::InvalidSection(format!(
                    "dimension {dim}: start {} exceeds length {len}",
                    r.start
                )));
            }
        }
        Ok(())
    }
}

/// A run of `nelems` consecutive elements in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute file offset of the first element.
    pub file_pos: u64,
    /// Number of elements in the run.
    pub nelems: usize,
    /// Index of the first element in the row-major destination buffer.
    pub dest_elem: usize,
}

/// Anything that can enumerate the chunks of a selection.
pub trait Layout {
    /// A fresh iterator over the chunks, in destination order.
    fn chunks(&self) -> Chunks<'_>;
    /// Total elements selected.
    fn num_elements(&self) -> usize;
    /// Bytes per element.
    fn element_size(&self) -> usize;
}

/// The resolved walk shared by both layouts.
#[derive(Debug, Clone)]
struct Plan {
    elem_size: usize,
    ranges: Vec<SliceRange>,
    /// File bytes between consecutive indices of each dimension.
    byte_strides: Vec<u64>,
    /// Dimensions `outer..` are merged into one run.
    outer: usize,
    /// File offset of the first selected element.
    origin: u64,
    run: usize,
    total: usize,
}

impl Plan {
    fn new(
        begin: u64,
        elem_size: usize,
        shape: &[usize],
        record_stride: Option<u64>,
        section: &Section,
    ) -> Result<Self, FormatError> {
        section.validate(shape)?;
        let n = shape.len();
        let ranges = section.ranges().to_vec();

        let too_big = || FormatError::SizeLimit {
            name: "section".to_string(),
            size: u64::MAX,
        };
        let mut byte_strides = vec![elem_size as u64; n];
        for i in (0..n.saturating_sub(1)).rev() {
            byte_strides[i] = byte_strides[i + 1]
                .checked_mul(shape[i + 1] as u64)
                .ok_or_else(too_big)?;
        }
        if let (Some(stride), true) = (record_stride, n > 0) {
            byte_strides[0] = stride;
        }

        let total = ranges
            .iter()
            .try_fold(1usize, |acc, r| acc.checked_mul(r.count))
            .ok_or_else(too_big)?;

        // Dimension 0 of a record variable is never merged.
        let lowest = usize::from(record_stride.is_some());
        let mut outer = n;
        let mut run = 1usize;
        if n > lowest && ranges[n - 1].stride == 1 {
            outer = n - 1;
            run = ranges[n - 1].count;
            while outer > lowest
                && ranges[outer].start == 0
                && ranges[outer].count == shape[outer]
                && ranges[outer - 1].stride == 1
            {
                outer -= 1;
                run *= ranges[outer].count;
            }
        }

        let chunk_bytes = run as u64 * elem_size as u64;
        if chunk_bytes > MAX_VARSIZE {
            return Err(FormatError::SizeLimit {
                name: "chunk".to_string(),
                size: chunk_bytes,
            });
        }

        // Offsets of the first and last selected elements must fit in u64;
        // every chunk lies between them.
        let mut origin = begin;
        let mut extent = 0u64;
        for (r, &s) in ranges.iter().zip(&byte_strides) {
            let first = (r.start as u64).checked_mul(s).ok_or_else(too_big)?;
            origin = origin.checked_add(first).ok_or_else(too_big)?;
            let span = r.count.saturating_sub(1) as u64 * r.stride as u64;
            extent = span
                .checked_mul(s)
                .and_then(|x| x.checked_add(extent))
                .ok_or_else(too_big)?;
        }
        origin.checked_add(extent).ok_or_else(too_big)?;

        Ok(Self {
            elem_size,
            total,
            ranges,
            byte_strides,
            outer,
            origin,
            run,
        })
    }

    fn chunks(&self) -> Chunks<'_> {
        Chunks {
            plan: self,
            index: vec![0; self.outer],
            next_dest: 0,
        }
    }
}

/// Iterator over the chunks of a layout.
#[derive(Debug)]
pub struct Chunks<'a> {
    plan: &'a Plan,
    /// Position in the outer (unmerged) dimensions.
    index: Vec<usize>,
    next_dest: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let plan = self.plan;
        if self.next_dest >= plan.total {
            return None;
        }
        let offset: u64 = self
            .index
            .iter()
            .enumerate()
            .map(|(d, &i)| (i * plan.ranges[d].stride) as u64 * plan.byte_strides[d])
            .sum();
        let chunk = Chunk {
            file_pos: plan.origin + offset,
            nelems: plan.run,
            dest_elem: self.next_dest,
        };
        self.next_dest += plan.run;

        for d in (0..self.index.len()).rev() {
            self.index[d] += 1;
            if self.index[d] < plan.ranges[d].count {
                break;
            }
            self.index[d] = 0;
        }
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.plan.run == 0 {
            0
        } else {
            (self.plan.total - self.next_dest.min(self.plan.total)) / self.plan.run
        };
        (left, Some(left))
    }
}

/// Layout of a non-record variable stored contiguously from `begin`.
#[derive(Debug, Clone)]
pub struct LayoutRegular {
    plan: Plan,
}

impl LayoutRegular {
    pub fn new(
        begin: u64,
        elem_size: usize,
        shape: &[usize],
        section: &Section,
    ) -> Result<Self, FormatError> {
        Ok(Self {
            plan: Plan::new(begin, elem_size, shape, None, section)?,
        })
    }
}

impl Layout for LayoutRegular {
    fn chunks(&self) -> Chunks<'_> {
        self.plan.chunks()
    }

    fn num_elements(&self) -> usize {
        self.plan.total
    }

    fn element_size(&self) -> usize {
        self.plan.elem_size
    }
}

/// Layout of a record variable: one slab per record, `record_stride` bytes apart.
///
/// `shape[0]` is the number of records.
#[derive(Debug, Clone)]
pub struct LayoutSegmented {
    plan: Plan,
}

impl LayoutSegmented {
    pub fn new(
        begin: u64,
        elem_size: usize,
        record_stride: u64,
        shape: &[usize],
        section: &Section,
    ) -> Result<Self, FormatError> {
        Ok(Self {
            plan: Plan::new(begin, elem_size, shape, Some(record_stride), section)?,
        })
    }
}

impl Layout for LayoutSegmented {
    fn chunks(&self) -> Chunks<'_> {
        self.plan.chunks()
    }

    fn num_elements(&self) -> usize {
        self.plan.total
    }

    fn element_size(&self) -> usize {
        self.plan.elem_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(layout: &impl Layout) -> Vec<(u64, usize, usize)> {
        layout
            .chunks()
            .map(|c| (c.file_pos, c.nelems, c.dest_elem))
            .collect()
    }

    #[test]
    fn full_read_is_one_chunk() {
        let shape = [3, 4, 5];
        let l = LayoutRegular::new(100, 4, &shape, &Section::full(&shape)).unwrap();
        assert_eq!(collect(&l), vec![(100, 60, 0)]);
    }

    #[test]
    fn scalar() {
        let l = LayoutRegular::new(64, 8, &[], &Section::full(&[])).unwrap();
        assert_eq!(collect(&l), vec![(64, 1, 0)]);
    }

    #[test]
    fn partial_inner_rows() {
        // rows 1..3, columns 1..3 of a 4x5 int array
        let shape = [4, 5];
        let sec = Section::from_start_count(&[1, 1], &[2, 2]).unwrap();
        let l = LayoutRegular::new(0, 4, &shape, &sec).unwrap();
        assert_eq!(collect(&l), vec![(24, 2, 0), (44, 2, 2)]);
    }

    #[test]
    fn strided_inner_dimension() {
        let sec = Section::new(vec![SliceRange::new(0, 3, 2)]);
        let l = LayoutRegular::new(0, 2, &[6], &sec).unwrap();
        assert_eq!(collect(&l), vec![(0, 1, 0), (4, 1, 1), (8, 1, 2)]);
    }

    #[test]
    fn full_rows_merge_with_partial_outer() {
        let shape = [4, 3];
        let sec = Section::new(vec![SliceRange::new(1, 2, 1), SliceRange::full(3)]);
        let l = LayoutRegular::new(10, 1, &shape, &sec).unwrap();
        assert_eq!(collect(&l), vec![(13, 6, 0)]);
    }

    #[test]
    fn records_step_by_stride() {
        // temp(time, x=4) floats, 3 records, another 4-byte variable interleaved
        let shape = [3, 4];
        let l = LayoutSegmented::new(200, 4, 20, &shape, &Section::full(&shape)).unwrap();
        assert_eq!(
            collect(&l),
            vec![(200, 4, 0), (220, 4, 4), (240, 4, 8)]
        );
    }

    #[test]
    fn one_dimensional_record_variable() {
        let shape = [3];
        let l = LayoutSegmented::new(40, 2, 6, &shape, &Section::full(&shape)).unwrap();
        assert_eq!(collect(&l), vec![(40, 1, 0), (46, 1, 1), (52, 1, 2)]);
    }

    #[test]
    fn restartable() {
        let shape = [5, 2];
        let sec = Section::new(vec![SliceRange::new(0, 3, 2), SliceRange::new(1, 1, 1)]);
        let l = LayoutSegmented::new(0, 8, 64, &shape, &sec).unwrap();
        assert_eq!(collect(&l), collect(&l));
        assert_eq!(l.chunks().size_hint(), (3, Some(3)));
    }

    #[test]
    fn empty_selection() {
        let sec = Section::from_start_count(&[0, 2], &[0, 1]).unwrap();
        let l = LayoutRegular::new(0, 4, &[3, 3], &sec).unwrap();
        assert_eq!(l.chunks().count(), 0);
        assert_eq!(l.num_elements(), 0);
    }

    #[test]
    fn invalid_sections() {
        let shape = [4];
        for sec in [
            Section::new(vec![SliceRange::new(0, 5, 1)]),
            Section::new(vec![SliceRange::new(0, 2, 0)]),
            Section::new(vec![SliceRange::new(1, 2, 3)]),
            Section::new(vec![SliceRange::new(5, 0, 1)]),
            Section::full(&[4, 1]),
        ] {
            assert!(matches!(
                LayoutRegular::new(0, 4, &shape, &sec),
                Err(FormatError::InvalidSection(_))
            ));
        }
    }

    #[test]
    fn oversized_chunk() {
        let shape = [1 << 30, 2];
        let err = LayoutRegular::new(0, 4, &shape, &Section::full(&shape)).unwrap_err();
        assert!(matches!(err, FormatError::SizeLimit { .. }));
    }

    fn shape_and_section() -> impl Strategy<Value = (Vec<usize>, Section)> {
        prop::collection::vec(1usize..6, 0..4).prop_flat_map(|shape| {
            let ranges: Vec<_> = shape
                .iter()
                .map(|&len| {
                    (0..len, 1usize..4)
                        .prop_flat_map(move |(start, stride)| {
                            let max = (len - 1 - start) / stride + 1;
                            (Just(start), 0..=max, Just(stride))
                        })
                        .prop_map(|(start, count, stride)| SliceRange::new(start, count, stride))
                })
                .collect();
            (Just(shape), ranges).prop_map(|(shape, r)| (shape, Section::new(r)))
        })
    }

    /// File offsets of every selected element, computed one element at a time.
    fn naive_offsets(begin: u64, strides: &[u64], sec: &Section) -> Vec<u64> {
        let mut out = Vec::new();
        if sec.num_elements() == 0 {
            return out;
        }
        let ranges = sec.ranges();
        let mut idx = vec![0usize; ranges.len()];
        loop {
            out.push(
                begin
                    + idx
                        .iter()
                        .zip(ranges)
                        .zip(strides)
                        .map(|((&i, r), &s)| (r.start + i * r.stride) as u64 * s)
                        .sum::<u64>(),
            );
            let mut d = ranges.len();
            loop {
                if d == 0 {
                    return out;
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < ranges[d].count {
                    break;
                }
                idx[d] = 0;
            }
        }
    }

    fn expand(layout: &impl Layout) -> Vec<u64> {
        let size = layout.element_size() as u64;
        let mut out = Vec::new();
        let mut expected_dest = 0;
        for c in layout.chunks() {
            assert_eq!(c.dest_elem, expected_dest);
            expected_dest += c.nelems;
            out.extend((0..c.nelems as u64).map(|j| c.file_pos + j * size));
        }
        out
    }

    fn row_major_strides(shape: &[usize], elem: usize) -> Vec<u64> {
        let mut s = vec![elem as u64; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            s[i] = s[i + 1] * shape[i + 1] as u64;
        }
        s
    }

    proptest! {
        #[test]
        fn regular_covers_selection((shape, sec) in shape_and_section(), elem in prop::sample::select(vec![1usize, 2, 4, 8])) {
            let l = LayoutRegular::new(48, elem, &shape, &sec).unwrap();
            let strides = row_major_strides(&shape, elem);
            prop_assert_eq!(expand(&l), naive_offsets(48, &strides, &sec));
            prop_assert_eq!(l.chunks().map(|c| c.nelems).sum::<usize>(), sec.num_elements());
        }

        #[test]
        fn segmented_covers_selection((shape, sec) in shape_and_section(), extra in 0u64..16) {
            prop_assume!(!shape.is_empty());
            let mut strides = row_major_strides(&shape, 4);
            let slab = strides[0];
            let record_stride = slab + extra * 4;
            strides[0] = record_stride;
            let l = LayoutSegmented::new(96, 4, record_stride, &shape, &sec).unwrap();
            prop_assert_eq!(expand(&l), naive_offsets(96, &strides, &sec));
        }
    }
}
