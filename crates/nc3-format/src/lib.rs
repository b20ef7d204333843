//! Pure-Rust codec for the classic and 64-bit-offset array file format.
//!
//! This crate works on byte slices only: it parses and serializes headers,
//! lays out variable data, and plans in-place attribute updates. File
//! access lives in `nc3-io` and the `nc3` session crate.

pub mod attribute;
pub mod attribute_patch;
pub mod codec;
pub mod data;
pub mod datatype;
pub mod dimension;
pub mod error;
pub mod fill;
pub mod header;
pub mod header_reader;
pub mod header_writer;
pub mod layout;
pub mod names;
pub mod signature;
pub mod variable;

pub use attribute::{AttrLocation, AttrOwner, Attribute};
pub use attribute_patch::AttributePatch;
pub use data::{Array, NcValues};
pub use datatype::NcType;
pub use dimension::{Dimension, DimensionId};
pub use error::FormatError;
pub use header::{Header, MAX_NUMRECS, MAX_VARSIZE, STREAMING, TRUNCATION_WART};
pub use header_reader::ReadOptions;
pub use layout::{Chunk, Layout, LayoutRegular, LayoutSegmented, Section, SliceRange};
pub use names::{is_valid_name, make_valid_name};
pub use signature::{detect_format, is_valid_file, FormatVersion};
pub use variable::{Placement, Variable};
