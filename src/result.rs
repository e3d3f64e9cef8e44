//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The input ended before a record or payload did.
    #[error("Truncated Zip archive: {0}")]
    Truncated(&'static str),

    /// A record didn't start with the signature it must carry.
    #[error("Bad signature: {0}")]
    BadSignature(&'static str),

    /// A field held a value the spec forbids: negative lengths,
    /// entry data overlapping the central directory, inconsistent sizes,
    /// a malformed Zip64 payload.
    #[error("Corrupt field: {0}")]
    CorruptField(String),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The archive uses a feature this build can't handle:
    /// a split archive without opt-in, an unknown compression method,
    /// encryption.
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// A value overflowed its 32-bit (or 16-bit) slot while the writer
    /// was configured with [`Zip64Mode::Never`].
    ///
    /// [`Zip64Mode::Never`]: ../write/enum.Zip64Mode.html
    #[error("Entry {0} requires Zip64, which the writer forbids")]
    Zip64Required(String),

    /// A guarded read would grow past the configured memory ceiling.
    /// Raised instead of attempting an allocation that will fail
    /// unpredictably.
    #[error("Memory limit reached after buffering {0} bytes")]
    MemoryLimit(u64),

    /// The caller drove a reader or writer through an illegal transition:
    /// a second `finish`, a write with no entry open, a negative size.
    #[error("Invalid usage: {0}")]
    InvalidUsage(&'static str),

    /// The ZIP archive contained a nonsensical file hierarchy
    /// (duplicate entries, bad paths, etc.)
    #[error("Archive contained a strange file hierarchy: {0}")]
    Hierarchy(String),

    /// A file wasn't found at the provided path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(Utf8PathBuf),

    /// A user-provided path (not one from a ZIP archive) was invalid.
    #[error("Invalid path")]
    InvalidPath(String),

    /// A cast from a 64-bit int to a usize failed while mapping the file,
    /// probably on a 32-bit system.
    ///
    /// Future work could include a version of the reader that uses multiple
    /// file streams instead of a memory map to work with large files in 32 bits.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,
}

impl ZipError {
    /// Tags an error with the entry it concerns, where that's known.
    /// A "corrupt field" means little mid-archive without knowing whose
    /// field it was.
    pub(crate) fn for_entry(self, name: &str) -> Self {
        match self {
            ZipError::CorruptField(msg) => ZipError::CorruptField(format!("{name}: {msg}")),
            ZipError::UnsupportedArchive(msg) => {
                ZipError::UnsupportedArchive(format!("{name}: {msg}"))
            }
            other => other,
        }
    }
}
