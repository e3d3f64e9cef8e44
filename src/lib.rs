//! zipwire reads and writes ZIP archives, Zip64 and all.
//!
//! Three front doors, depending on what your bytes can do:
//!
//! * [`ZipArchive`] reads through the central directory. Give it a byte
//!   slice (read small archives into a buffer, memory-map big ones) and
//!   read any entry, in any order, from any number of threads:
//!
//! ```no_run
//! # use std::fs;
//! # use zipwire::*;
//! let bytes = fs::read("foo.zip")?;
//! let archive = ZipArchive::new(&bytes)?;
//!
//! // ZIP doesn't promise entries are unique or sanely named;
//! // organize them into a validated tree of files and folders.
//! let tree = as_tree(archive.entries())?;
//! let entry = tree.lookup("some/specific/file")?;
//! let mut reader = archive.read(entry)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! * [`ZipStreamReader`] decodes entries front to back from any
//!   [`Read`](std::io::Read) — a socket, a pipe, stdin — recovering
//!   data-descriptor sizes as it goes.
//!
//! * [`ZipWriter`] writes archives to seekable files (headers patched in
//!   place), plain streams (data descriptors), or fixed-size split
//!   segments, choosing Zip64 structures per its [`Zip64Mode`].
//!
//! Compressed data is STORED or DEFLATE out of the box; Zstandard and
//! bzip2 decoders sit behind the `zstd-support` and `bzip2-support`
//! features, and anything else can still be copied archive-to-archive
//! through the raw-entry APIs.

pub mod dostime;
pub mod encoding;
pub mod entry;
pub mod extra;
pub mod method;
pub mod read;
pub mod result;
pub mod stream;
pub mod write;

pub use encoding::TextEncoding;
pub use entry::{GeneralPurposeFlags, Platform, TextSource, ZipEntry};
pub use extra::{ExtraField, ParseMode};
pub use method::CompressionMethod;
pub use read::{as_tree, FileTree, ReadOptions, ZipArchive};
pub use result::{ZipError, ZipResult};
pub use stream::{StreamOptions, ZipStreamReader};
pub use write::{FinishReport, WriteOptions, Zip64Mode, ZipWriter};

mod crc;
mod fields;
mod spec;
