//! Writing API: [`FileBuilder`] defines a new file and creates it.

use std::path::Path;

use nc3_format::header_writer::{compute_layout, serialize};
use nc3_format::{AttrOwner, Attribute, DimensionId, Header, NcType, NcValues};
use nc3_io::{FileStorage, MemoryStorage, Storage};
use tracing::debug;

use crate::error::Result;
use crate::file::{fill_variable, NcFile};
use crate::options::CreateOptions;

/// Builder for a new file: dimensions, variables, and attributes first,
/// then one of the `create` methods lays out and writes the header.
///
/// # Example
///
/// ```no_run
/// use nc3::{FileBuilder, NcType};
///
/// let mut b = FileBuilder::new();
/// b.add_dimension("x", 4).unwrap();
/// b.add_unlimited_dimension("time").unwrap();
/// b.add_variable("temp", NcType::Float, &["time", "x"]).unwrap();
/// b.set_var_attr("temp", "units", "K").unwrap();
/// let mut file = b.create("out.nc").unwrap();
/// file.close().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBuilder {
    header: Header,
    options: CreateOptions,
}

impl FileBuilder {
    /// A builder with default options (classic offsets, fill on).
    pub fn new() -> Self {
        Self::with_options(CreateOptions::new())
    }

    pub fn with_options(options: CreateOptions) -> Self {
        Self {
            header: Header::new(options.version()),
            options,
        }
    }

    /// Add a fixed-length dimension.
    pub fn add_dimension(&mut self, name: &str, length: u32) -> Result<DimensionId> {
        Ok(self.header.add_dimension(name, length)?)
    }

    /// Add the record dimension.
    pub fn add_unlimited_dimension(&mut self, name: &str) -> Result<DimensionId> {
        Ok(self.header.add_unlimited_dimension(name)?)
    }

    /// Add a variable over named dimensions; the record dimension, if used,
    /// must come first.
    pub fn add_variable(&mut self, name: &str, nc_type: NcType, dims: &[&str]) -> Result<()> {
        self.header.add_variable(name, nc_type, dims)?;
        Ok(())
    }

    /// Set a global attribute.
    pub fn set_attr(&mut self, name: &str, values: impl Into<NcValues>) -> Result<()> {
        self.header
            .set_attribute(AttrOwner::Global, Attribute::new(name, values))?;
        Ok(())
    }

    /// Set an attribute on a variable.
    pub fn set_var_attr(&mut self, variable: &str, name: &str, values: impl Into<NcValues>) -> Result<()> {
        self.header
            .set_attribute(AttrOwner::Variable(variable), Attribute::new(name, values))?;
        Ok(())
    }

    /// The header being built.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Create the file at `path`, replacing any existing file.
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<NcFile<FileStorage>> {
        let storage = FileStorage::create(path)?;
        self.create_in(storage)
    }

    /// Create the file in memory.
    pub fn create_in_memory(self) -> Result<NcFile<MemoryStorage>> {
        self.create_in(MemoryStorage::new())
    }

    /// Lay out the header and write it, with non-record fill, to `storage`.
    ///
    /// Any existing contents of `storage` are discarded.
    pub fn create_in<S: Storage>(self, mut storage: S) -> Result<NcFile<S>> {
        let FileBuilder {
            mut header,
            options,
        } = self;
        compute_layout(&mut header, options.extra_header_bytes, None)?;
        let bytes = serialize(&mut header);

        storage.set_len(0)?;
        storage.write_at(0, &bytes)?;
        if options.fill {
            for v in header.non_record_variables() {
                fill_variable(&mut storage, &header, v)?;
            }
        }
        let mut size = header.calc_file_size();
        if let Some(pre) = options.preallocate_size {
            size = size.max(pre);
        }
        if storage.len()? < size {
            storage.set_len(size)?;
        }
        debug!(
            version = ?header.version,
            header_size = header.header_size,
            data_start = header.data_start(),
            vars = header.variables.len(),
            "created file"
        );
        Ok(NcFile::new_created(storage, header, options.fill))
    }

    /// Create in memory, close, and return the file bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut file = self.create_in_memory()?;
        file.close()?;
        Ok(file.into_storage().into_inner())
    }
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nc3_format::{FormatError, FormatVersion, ReadOptions};

    #[test]
    fn finish_produces_parseable_bytes() {
        let mut b = FileBuilder::new();
        b.add_dimension("x", 2).unwrap();
        b.add_variable("v", NcType::Double, &["x"]).unwrap();
        b.set_attr("title", "builder").unwrap();
        let bytes = b.finish().unwrap();
        let h = Header::parse(&bytes, bytes.len() as u64, &ReadOptions::new()).unwrap();
        assert_eq!(h.version, FormatVersion::Classic);
        assert_eq!(bytes.len() as u64, h.calc_file_size());
        assert_eq!(&bytes[h.data_start() as usize..][..8], &[0x47, 0x9E, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn extra_header_bytes_move_data() {
        let mut b = FileBuilder::with_options(CreateOptions::new().extra_header_bytes(100));
        b.add_dimension("x", 1).unwrap();
        b.add_variable("v", NcType::Int, &["x"]).unwrap();
        let f = b.create_in_memory().unwrap();
        let h = f.header();
        assert_eq!(h.data_start(), h.header_size + 100);
    }

    #[test]
    fn preallocate_and_no_fill() {
        let opts = CreateOptions::new().fill(false).preallocate(1000).large_file(true);
        let mut b = FileBuilder::with_options(opts);
        b.add_dimension("x", 3).unwrap();
        b.add_variable("v", NcType::Short, &["x"]).unwrap();
        let f = b.create_in_memory().unwrap();
        assert_eq!(f.version(), FormatVersion::Offset64);
        let bytes = f.into_storage().into_inner();
        assert_eq!(bytes.len(), 1000);
        assert!(bytes[bytes.len() - 100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let mut b = FileBuilder::new();
        let err = b.add_dimension("bad/name", 3).unwrap_err();
        assert!(matches!(err, crate::Error::Format(FormatError::InvalidName(_))));
    }

    #[test]
    fn var_attr_requires_variable() {
        let mut b = FileBuilder::new();
        assert!(b.set_var_attr("missing", "units", "m").is_err());
    }
}
