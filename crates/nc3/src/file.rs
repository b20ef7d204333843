//! The open-file session.
//!
//! [`NcFile`] owns a storage and the parsed header. Every mutating call takes
//! `&mut self`, so no reader can observe a header that is half updated.

use std::path::Path;

use nc3_format::fill::fill_bytes;
use nc3_format::header_writer::rewrite_in_place;
use nc3_format::{
    Array, AttrOwner, Attribute, AttributePatch, FormatError, FormatVersion, Header, Layout,
    LayoutRegular, LayoutSegmented, NcValues, Section, SliceRange, Variable, MAX_NUMRECS,
    TRUNCATION_WART,
};
use nc3_io::{FileStorage, MemoryStorage, Storage};
use tracing::debug;

use crate::error::{Error, Result};
use crate::options::OpenOptions;

/// Bytes read for the first attempt at parsing a header.
const INITIAL_HEADER_READ: usize = 8 * 1024;

/// Largest run of fill bytes written at once.
const FILL_BLOCK: usize = 1 << 20;

/// Placement of one variable, detached from the header borrow.
struct VarGeom {
    name: String,
    begin: u64,
    elem_size: usize,
    is_record: bool,
    shape: Vec<usize>,
    nc_type: nc3_format::NcType,
}

/// An open classic or 64-bit-offset file.
#[derive(Debug)]
pub struct NcFile<S: Storage> {
    storage: S,
    header: Header,
    writable: bool,
    fill: bool,
    header_dirty: bool,
    closed: bool,
}

impl NcFile<FileStorage> {
    /// Open a file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &OpenOptions::new())
    }

    /// Open a file with explicit options.
    pub fn open_with<P: AsRef<Path>>(path: P, opts: &OpenOptions) -> Result<Self> {
        let storage = if opts.writable {
            FileStorage::open_rw(path)?
        } else {
            FileStorage::open(path)?
        };
        Self::from_storage(storage, opts)
    }
}

#[cfg(feature = "mmap")]
impl NcFile<nc3_io::MmapStorage> {
    /// Open a file through a memory mapping.
    pub fn open_mmap<P: AsRef<Path>>(path: P, opts: &OpenOptions) -> Result<Self> {
        let storage = if opts.writable {
            nc3_io::MmapStorage::open_rw(path)?
        } else {
            nc3_io::MmapStorage::open(path)?
        };
        Self::from_storage(storage, opts)
    }
}

impl NcFile<MemoryStorage> {
    /// Open a read-only session over file bytes held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(MemoryStorage::from_vec(data), &OpenOptions::new())
    }
}

impl<S: Storage> NcFile<S> {
    /// Parse the header of an existing file held by `storage`.
    pub fn from_storage(mut storage: S, opts: &OpenOptions) -> Result<Self> {
        let header = read_header(&mut storage, opts)?;
        Ok(Self {
            storage,
            header,
            writable: opts.writable,
            fill: opts.fill,
            header_dirty: false,
            closed: false,
        })
    }

    /// A session over a freshly written header.
    pub(crate) fn new_created(storage: S, header: Header, fill: bool) -> Self {
        Self {
            storage,
            header,
            writable: true,
            fill,
            header_dirty: false,
            closed: false,
        }
    }

    // ---- header access ----

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn version(&self) -> FormatVersion {
        self.header.version
    }

    pub fn num_records(&self) -> u32 {
        self.header.num_records()
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.header
            .variable(name)
            .ok_or_else(|| FormatError::VariableNotFound(name.to_string()).into())
    }

    /// Current shape of a variable.
    pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
        let v = self.variable(name)?;
        Ok(self.header.shape(v))
    }

    pub fn attribute(&self, owner: AttrOwner<'_>, name: &str) -> Option<&Attribute> {
        self.header.attribute(owner, name)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether new records are filled.
    pub fn fill(&self) -> bool {
        self.fill
    }

    /// Enable or disable fill of new records; returns the previous setting.
    pub fn set_fill(&mut self, fill: bool) -> bool {
        std::mem::replace(&mut self.fill, fill)
    }

    // ---- reading ----

    /// Read the whole of a variable.
    pub fn read(&mut self, name: &str) -> Result<Array> {
        let shape = self.shape(name)?;
        self.read_section(name, &Section::full(&shape))
    }

    /// Read a (possibly strided) section of a variable.
    pub fn read_section(&mut self, name: &str, section: &Section) -> Result<Array> {
        self.check_open()?;
        let geom = self.geometry(name, 0)?;
        let layout = self.layout(&geom, section)?;
        let mut values = NcValues::zeroed(geom.nc_type, layout.num_elements());
        let mut buf = Vec::new();
        for chunk in layout.chunks() {
            buf.resize(chunk.nelems * geom.elem_size, 0);
            self.read_tolerant(chunk.file_pos, &mut buf)?;
            values.decode_into(chunk.dest_elem, &buf);
        }
        Ok(Array {
            shape: section.shape(),
            values,
        })
    }

    /// Raw bytes of records `first, first + stride, ...`, one slab of
    /// `record_stride` bytes per record.
    pub fn read_records(&mut self, first: usize, count: usize, stride: usize) -> Result<Vec<Vec<u8>>> {
        self.check_open()?;
        let range = SliceRange::new(first, count, stride);
        Section::new(vec![range]).validate(&[self.header.num_records() as usize])?;
        let record_stride = self.header.record_stride();
        let record_start = self.header.record_start();
        let slab = usize::try_from(record_stride).map_err(|_| FormatError::SizeLimit {
            name: "record".to_string(),
            size: record_stride,
        })?;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let rec = (first + i * stride) as u64;
            let mut buf = vec![0u8; slab];
            self.read_tolerant(record_start + rec * record_stride, &mut buf)?;
            out.push(buf);
        }
        Ok(out)
    }

    /// Read `buf.len()` bytes at `pos`. Bytes past the end of storage read
    /// as zero when the file was accepted as truncated or falls short of
    /// its computed size by no more than the trailing wart.
    fn read_tolerant(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.storage.read_at(pos, buf)?;
        if n < buf.len() {
            let len = self.storage.len()?;
            let within_wart =
                len.saturating_add(TRUNCATION_WART) >= self.header.calc_file_size();
            if !(self.header.truncated || within_wart) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{} bytes missing at offset {}", buf.len() - n, pos + n as u64),
                )));
            }
            buf[n..].fill(0);
        }
        Ok(())
    }

    // ---- writing ----

    /// Write `array` with its origin at the first element of the variable.
    ///
    /// Writing a record variable past the current record count extends the
    /// file first.
    pub fn write(&mut self, name: &str, array: &Array) -> Result<()> {
        let start = vec![0; array.shape.len()];
        let section = Section::from_start_count(&start, &array.shape)?;
        self.write_section(name, &section, &array.values)
    }

    /// Write values (row-major over `section`) into a variable.
    pub fn write_section(&mut self, name: &str, section: &Section, values: &NcValues) -> Result<()> {
        self.check_writable()?;
        let expected = section.num_elements();
        let mut records_needed = 0;
        {
            let v = self.variable(name)?;
            if values.nc_type() != v.nc_type {
                return Err(Error::WrongType {
                    variable: name.to_string(),
                    have: values.nc_type(),
                    want: v.nc_type,
                });
            }
            if v.is_record() {
                if let Some(last) = section.ranges().first().and_then(SliceRange::last) {
                    records_needed = last + 1;
                }
            }
        }
        if values.len() != expected {
            return Err(FormatError::ValueCountMismatch {
                expected,
                actual: values.len(),
            }
            .into());
        }

        let geom = self.geometry(name, records_needed)?;
        section.validate(&geom.shape)?;
        if records_needed > self.header.num_records() as usize {
            let n = u32::try_from(records_needed).unwrap_or(u32::MAX);
            self.extend_records(n)?;
        }

        let layout = self.layout(&geom, section)?;
        let mut buf = Vec::new();
        for chunk in layout.chunks() {
            buf.clear();
            values.encode_range(chunk.dest_elem, chunk.nelems, &mut buf);
            self.storage.write_at(chunk.file_pos, &buf)?;
        }
        Ok(())
    }

    // ---- records ----

    /// Grow the file to `n` records.
    ///
    /// With fill enabled each new record is written out variable by
    /// variable and the record count advances only once a record is
    /// complete. With fill disabled the storage is simply lengthened.
    pub fn extend_records(&mut self, n: u32) -> Result<()> {
        self.check_writable()?;
        let old = self.header.num_records();
        if n <= old {
            return Ok(());
        }
        let limit = self.header.version.max_offset();
        let record_start = self.header.record_start();
        let record_stride = self.header.record_stride();
        let end = record_stride
            .checked_mul(n as u64)
            .and_then(|x| x.checked_add(record_start));
        match end {
            Some(end) if end <= limit && n <= MAX_NUMRECS => {}
            _ => {
                return Err(FormatError::OffsetOverflow {
                    offset: end.unwrap_or(u64::MAX),
                    limit,
                }
                .into())
            }
        }

        if self.fill {
            let plan: Vec<(u64, Vec<u8>)> = self
                .header
                .record_variables()
                .map(|v| (v.placement.begin, record_fill(&self.header, v)))
                .collect();
            for rec in old..n {
                let base = rec as u64 * record_stride;
                for (begin, bytes) in &plan {
                    self.storage.write_at(begin + base, bytes)?;
                }
                self.header.set_num_records(rec + 1);
            }
        } else {
            self.header.set_num_records(n);
            let size = self.header.calc_file_size();
            if self.storage.len()? < size {
                self.storage.set_len(size)?;
            }
        }
        debug!(from = old, to = n, fill = self.fill, "extended records");
        Ok(())
    }

    /// Pick up records appended by another writer.
    ///
    /// Re-reads the on-disk record counter bypassing any cache and returns
    /// true if it grew.
    pub fn sync_extend(&mut self) -> Result<bool> {
        self.check_open()?;
        let mut buf = [0u8; 4];
        let n = self.storage.read_at_unbuffered(4, &mut buf)?;
        if n < buf.len() {
            return Err(FormatError::UnexpectedEof {
                expected: buf.len(),
                available: n,
            }
            .into());
        }
        let count = i32::from_be_bytes(buf);
        if count < 0 {
            return Err(FormatError::NegativeRecordCount(count).into());
        }
        let count = count as u32;
        if count <= self.header.num_records() {
            return Ok(false);
        }
        let old = self.header.num_records();
        self.storage.refresh_len()?;
        self.header.set_num_records(count);
        debug!(from = old, to = count, "record count changed on disk");
        Ok(true)
    }

    // ---- attributes and header ----

    /// Replace an attribute's value in place, within the space it already
    /// occupies in the file.
    pub fn update_attribute(&mut self, owner: AttrOwner<'_>, attr: &Attribute) -> Result<()> {
        self.check_writable()?;
        let patch = AttributePatch::plan(&self.header, owner, attr)?;
        for (pos, bytes) in patch.writes() {
            self.storage.write_at(*pos, bytes)?;
        }
        patch.apply_to(&mut self.header)?;
        Ok(())
    }

    /// Add or replace an attribute in memory. The file changes on the next
    /// [`rewrite_header`](Self::rewrite_header), flush, or close.
    pub fn set_attribute(&mut self, owner: AttrOwner<'_>, attr: Attribute) -> Result<()> {
        self.check_writable()?;
        self.header.set_attribute(owner, attr)?;
        self.header_dirty = true;
        Ok(())
    }

    /// Remove an attribute in memory; see [`set_attribute`](Self::set_attribute).
    pub fn remove_attribute(&mut self, owner: AttrOwner<'_>, name: &str) -> Result<Attribute> {
        self.check_writable()?;
        let removed = self.header.remove_attribute(owner, name)?;
        self.header_dirty = true;
        Ok(removed)
    }

    /// Write the in-memory header over the one in the file.
    ///
    /// Fails with `HeaderGrowthRefused`, leaving the file untouched, when
    /// the new header would run into the data.
    pub fn rewrite_header(&mut self) -> Result<()> {
        self.check_writable()?;
        let mut next = self.header.clone();
        let bytes = rewrite_in_place(&mut next)?;
        self.storage.write_at(0, &bytes)?;
        self.header = next;
        self.header_dirty = false;
        Ok(())
    }

    // ---- lifecycle ----

    /// Write the record counter, flush the storage, then apply a pending
    /// header rewrite.
    ///
    /// The counter lands on disk even when the rewrite is refused, so
    /// records already written survive a header that no longer fits.
    pub fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        if !self.writable {
            return Ok(());
        }
        let count = self.header.num_records() as i32;
        self.storage.write_at(4, &count.to_be_bytes())?;
        self.header.is_streaming = false;
        self.storage.flush()?;
        if self.header_dirty {
            self.rewrite_header()?;
            self.storage.flush()?;
        }
        Ok(())
    }

    /// Flush, grow the storage to the size the header implies, and end the
    /// session. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.writable {
            self.flush()?;
            let size = self.header.calc_file_size();
            if self.storage.len()? < size {
                self.storage.set_len(size)?;
                self.storage.flush()?;
            }
        }
        self.closed = true;
        debug!(records = self.header.num_records(), "closed file");
        Ok(())
    }

    /// Give up the session and return the storage. Unflushed state is lost.
    pub fn into_storage(self) -> S {
        self.storage
    }

    // ---- helpers ----

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    /// Geometry of `name`, with the record dimension at least `min_records` long.
    fn geometry(&self, name: &str, min_records: usize) -> Result<VarGeom> {
        let v = self.variable(name)?;
        let mut shape = self.header.shape(v);
        if v.is_record() {
            shape[0] = shape[0].max(min_records);
        }
        Ok(VarGeom {
            name: v.name.clone(),
            begin: v.placement.begin,
            elem_size: v.element_size(),
            is_record: v.is_record(),
            shape,
            nc_type: v.nc_type,
        })
    }

    fn layout(&self, geom: &VarGeom, section: &Section) -> Result<Box<dyn Layout>> {
        let layout: Box<dyn Layout> = if geom.is_record {
            Box::new(LayoutSegmented::new(
                geom.begin,
                geom.elem_size,
                self.header.record_stride(),
                &geom.shape,
                section,
            )?)
        } else {
            Box::new(LayoutRegular::new(geom.begin, geom.elem_size, &geom.shape, section)?)
        };
        debug!(variable = %geom.name, elements = layout.num_elements(), "planned section");
        Ok(layout)
    }
}

/// Fill bytes for one record of `v`, zero-padded to its share of the stride.
fn record_fill(h: &Header, v: &Variable) -> Vec<u8> {
    let mut bytes = fill_bytes(v, h.slab_elements(v) as usize);
    bytes.resize(v.placement.size as usize, 0);
    bytes
}

/// Fill a non-record variable's region, in blocks.
pub(crate) fn fill_variable<S: Storage>(storage: &mut S, h: &Header, v: &Variable) -> Result<()> {
    let elem = v.element_size();
    let total = h.slab_elements(v) as usize;
    let per_block = (FILL_BLOCK / elem).max(1);
    let block = fill_bytes(v, per_block.min(total));
    let mut done = 0;
    while done < total {
        let n = per_block.min(total - done);
        let pos = v.placement.begin + (done * elem) as u64;
        storage.write_at(pos, &block[..n * elem])?;
        done += n;
    }
    Ok(())
}

/// Read the header from a prefix that doubles until it holds the whole header.
fn read_header<S: Storage>(storage: &mut S, opts: &OpenOptions) -> Result<Header> {
    let file_len = storage.len()?;
    let read_opts = opts.read_options();
    let mut want = INITIAL_HEADER_READ;
    loop {
        let mut buf = vec![0u8; want];
        let n = storage.read_at(0, &mut buf)?;
        buf.truncate(n);
        match Header::parse(&buf, file_len, &read_opts) {
            Err(FormatError::UnexpectedEof { .. }) if (n as u64) < file_len && n == want => {
                want = want.saturating_mul(2);
            }
            Ok(h) => {
                debug!(
                    version = ?h.version,
                    dims = h.dimensions.len(),
                    vars = h.variables.len(),
                    records = h.num_records(),
                    header_size = h.header_size,
                    "opened file"
                );
                return Ok(h);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
