//! Read, write, and update classic and 64-bit-offset array files.
//!
//! This crate is the session layer on top of `nc3-format` (the codec) and
//! `nc3-io` (positional storage).
//!
//! # Reading
//!
//! ```no_run
//! use nc3::NcFile;
//!
//! let mut file = NcFile::open("data.nc").unwrap();
//! let temp = file.read("temp").unwrap();
//! println!("shape: {:?}, first: {:?}", temp.shape, temp.values.get_f64(0));
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use nc3::{Array, FileBuilder, NcType, NcValues};
//!
//! let mut b = FileBuilder::new();
//! b.add_dimension("x", 3).unwrap();
//! b.add_unlimited_dimension("time").unwrap();
//! b.add_variable("temp", NcType::Float, &["time", "x"]).unwrap();
//! let mut file = b.create("out.nc").unwrap();
//! let rec = Array { shape: vec![1, 3], values: NcValues::Float(vec![1.0, 2.0, 3.0]) };
//! file.write("temp", &rec).unwrap();
//! file.close().unwrap();
//! ```

pub mod error;
pub mod file;
pub mod options;
pub mod writer;

pub use error::{Error, Result};
pub use file::NcFile;
pub use options::{CreateOptions, OpenOptions};
pub use writer::FileBuilder;

pub use nc3_format::{
    is_valid_file, Array, AttrOwner, Attribute, FormatError, FormatVersion, Header, NcType,
    NcValues, Section, SliceRange,
};
pub use nc3_io::{FileStorage, MemoryStorage, Storage};
#[cfg(feature = "mmap")]
pub use nc3_io::MmapStorage;
