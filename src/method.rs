//! Compression method codes and the decoders we can put behind them.

use std::io;

use flate2::read::DeflateDecoder;

use crate::crc::Crc32Reader;
use crate::result::*;

/// The compression method used to store a file
///
/// Every code from the APPNOTE that shows up in the wild is recognized and
/// passed through; only a handful can actually be decompressed here.
/// For the rest, [`ZipArchive::open_raw_entry`] still hands out the stored
/// bytes for archive-to-archive copies.
///
/// [`ZipArchive::open_raw_entry`]: ../read/struct.ZipArchive.html#method.open_raw_entry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    Stored,
    /// The file is shrunk (dynamic LZW, PKZIP 1.x)
    Shrink,
    /// The file is "reduced" with compression factor 1-4 (PKZIP 1.x)
    Reduce(u8),
    /// The file is imploded (PKZIP 1.x)
    Implode,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is "enhanced deflated" with 64 KiB history (method 9)
    Deflate64,
    /// The file is compressed with bzip2
    Bzip2,
    /// The file is compressed with LZMA
    Lzma,
    /// The file is compressed with Zstandard
    Zstd,
    /// The file is compressed with XZ
    Xz,
    /// The entry is AES-encrypted; the real method hides in a 0x9901 extra
    Aes,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => CompressionMethod::Stored,
            1 => CompressionMethod::Shrink,
            2..=5 => CompressionMethod::Reduce((code - 1) as u8),
            6 => CompressionMethod::Implode,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            93 => CompressionMethod::Zstd,
            95 => CompressionMethod::Xz,
            99 => CompressionMethod::Aes,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Shrink => 1,
            CompressionMethod::Reduce(factor) => *factor as u16 + 1,
            CompressionMethod::Implode => 6,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Xz => 95,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unsupported(v) => *v,
        }
    }
}

/// Returns a boxed read trait for a compressed file, given its
/// compression method, declared CRC, and name (for error reporting).
///
/// STORED and DEFLATE always work. Zstandard and bzip2 work when the
/// matching cargo feature is on. Everything else is an
/// [`ZipError::UnsupportedArchive`].
pub(crate) fn make_reader<'a, R: io::Read + Send + 'a>(
    compression_method: CompressionMethod,
    crc32: u32,
    entry_name: &str,
    reader: R,
) -> ZipResult<Box<dyn io::Read + Send + 'a>> {
    match compression_method {
        CompressionMethod::Stored => Ok(Box::new(Crc32Reader::new(reader, crc32, entry_name))),
        CompressionMethod::Deflate => {
            let deflate_reader = DeflateDecoder::new(reader);
            Ok(Box::new(Crc32Reader::new(deflate_reader, crc32, entry_name)))
        }
        #[cfg(feature = "zstd-support")]
        CompressionMethod::Zstd => {
            let zstd_reader = zstd::Decoder::new(reader)?;
            Ok(Box::new(Crc32Reader::new(zstd_reader, crc32, entry_name)))
        }
        #[cfg(feature = "bzip2-support")]
        CompressionMethod::Bzip2 => {
            let bzip2_reader = bzip2_rs::DecoderReader::new(reader);
            Ok(Box::new(Crc32Reader::new(bzip2_reader, crc32, entry_name)))
        }
        other => Err(ZipError::UnsupportedArchive(format!(
            "{entry_name}: compression method {:?} (code {}) not supported",
            other,
            other.code(),
        ))),
    }
}
