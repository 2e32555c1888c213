//! # mffio — MFF recording container reader/writer
//!
//! Format guarantees (frozen for recording version 3):
//! - All binary integers are little-endian; sample words are little-endian
//!   IEEE-754 `f32`; the sample depth is always 32 bits
//! - Signal streams are blocked: a 4-byte flag word announces a full header
//!   (1) or reuse of the previous geometry (0); channel count and sampling
//!   rate never change within one stream
//! - A recording is a flat directory (`.mff`) or a store-only flat zip
//!   archive of it (`.mfz`); both expose identical byte semantics
//! - Every `signal<N>.bin` is paired with an `info<N>.xml` data-info
//!   document; `epochs.xml` describes stream continuity
//! - XML documents are identified by namespace URI + root tag and emitted
//!   with their namespace as the default (tags unprefixed)
//! - Timestamps carry a timezone; naive timestamps are rejected

pub mod archive;
pub mod bin_file;
pub mod bin_writer;
pub mod container;
pub mod devices;
pub mod epoch;
pub mod error;
pub mod header_block;
pub mod raw_bin;
pub mod reader;
pub mod writer;
pub mod xml;

// Flat re-exports for the most common types.
pub use archive::{pack_directory, FilePart, StoreArchive};
pub use bin_file::BinFile;
pub use bin_writer::BinWriter;
pub use container::{ByteStream, MffDirectory, SignalAndInfo};
pub use epoch::Epoch;
pub use error::{MffError, Result};
pub use header_block::{read_header_block, HeaderBlock, OptionalHeader};
pub use raw_bin::{RawBinFile, Samples};
pub use reader::Reader;
pub use writer::Writer;
pub use xml::history::MffFlavor;
pub use xml::XmlDocument;
