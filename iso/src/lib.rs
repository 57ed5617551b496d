//! Minimal ISO-9660 image writer with Joliet names, plus a reader for
//! inspecting what was written.
//!
//! # Image layout
//!
//! ```text
//! sector  0..16   system area (zeroed)
//! sector  16      primary volume descriptor
//! sector  17      supplementary (Joliet) volume descriptor
//! sector  18      volume descriptor set terminator
//! sector  19..23  path tables: primary L, primary M, Joliet L, Joliet M
//! sector  23..    primary root directory, then Joliet root directory
//! then            file extents, each starting on a sector boundary
//! ```
//!
//! Both directory trees are flat (root only) and reference the same file
//! extents, so every file is stored once.

mod datetime;
mod reader;
mod writer;

pub use crate::datetime::IsoTimestamp;
pub use crate::reader::{IsoEntry, IsoVolume, read_volume};
pub use crate::writer::IsoBuilder;

use thiserror::Error;

pub const SECTOR_SIZE: usize = 2048;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IsoError {
    #[error("invalid ISO-9660 file name '{name}'")]
    InvalidIsoName { name: String },

    #[error("invalid Joliet file name '{name}'")]
    InvalidJolietName { name: String },

    #[error("duplicate file name '{name}'")]
    DuplicateName { name: String },

    #[error("{field} '{value}' is longer than {max} bytes")]
    IdentifierTooLong {
        field: &'static str,
        value: String,
        max: usize,
    },

    #[error("file '{name}' is too large for a single extent")]
    FileTooLarge { name: String },

    #[error("image truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("sector {sector} is not a volume descriptor")]
    BadSignature { sector: usize },

    #[error("image has no primary volume descriptor")]
    MissingPrimaryDescriptor,
}
