//! CRC32 plumbing shared by the readers and the writer.
//!
//! The reading side descends from the checking reader in zip-rs
//! (<https://github.com/mvdnes/zip-rs>), reworked to speak this crate's
//! error taxonomy and to name the entry it was checking.

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

use crate::result::ZipError;

/// A reader that hashes everything passing through it and, at end of
/// stream, compares the result against the CRC32 the archive declared.
///
/// It sits outermost in a decoder stack, so the hash always covers the
/// *decompressed* bytes. `Read` traffics in `io::Error`, so a mismatch
/// comes out as [`io::ErrorKind::InvalidData`] wrapping a
/// [`ZipError::CorruptField`] that names the entry; callers can downcast
/// to recover the crate error.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    declared: u32,
    entry_name: String,
    checked: bool,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, declared: u32, entry_name: impl Into<String>) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            declared,
            entry_name: entry_name.into(),
            checked: false,
        }
    }

    /// The end-of-stream comparison. Passing once is remembered;
    /// a failure keeps failing on every later read.
    fn check(&mut self) -> io::Result<()> {
        if self.checked {
            return Ok(());
        }
        let computed = self.hasher.clone().finalize();
        if computed == self.declared {
            self.checked = true;
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            ZipError::CorruptField(format!(
                "{}: CRC mismatch (declared {:08x}, computed {computed:08x})",
                self.entry_name, self.declared,
            )),
        ))
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 && !buf.is_empty() {
            self.check()?;
            return Ok(0);
        }
        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}

/// Writer that counts what passes through and hashes it.
///
/// The ZIP writer stacks two of these around a compressor:
/// the inner one learns the compressed size, the outer one the
/// uncompressed size and the entry's CRC32.
pub struct Crc32Writer<W> {
    inner: W,
    hasher: Hasher,
    count: u64,
}

impl<W> Crc32Writer<W> {
    pub fn new(inner: W) -> Crc32Writer<W> {
        Crc32Writer {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn finalize(self) -> (W, u32, u64) {
        (self.inner, self.hasher.finalize(), self.count)
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    fn crc_of(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    #[test]
    fn empty_input_is_still_checked() {
        let mut buf = [0; 1];

        // An empty stream's CRC is zero...
        let mut reader = Crc32Reader::new(&b""[..], 0, "empty.bin");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        // ...and anything else fails on the very first read.
        let mut reader = Crc32Reader::new(&b""[..], 1, "empty.bin");
        let e = reader.read(&mut buf).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
        assert!(e.to_string().contains("empty.bin"));
    }

    #[test]
    fn clean_stream_reads_through_eof_quietly() {
        let data = b"1234";
        let mut reader = Crc32Reader::new(&data[..], crc_of(data), "ok.txt");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        // EOF stays quiet once the check has passed.
        let mut buf = [0; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn mismatch_names_the_entry_and_sticks() {
        let data = b"tampered payload";
        let mut reader = Crc32Reader::new(&data[..], 0xDEAD_BEEF, "e.txt");
        let mut out = Vec::new();
        let e = reader.read_to_end(&mut out).unwrap_err();
        assert!(e.to_string().contains("e.txt"), "{e}");
        assert!(e.to_string().contains("CRC mismatch"), "{e}");
        // The failure repeats rather than going silent.
        let mut buf = [0; 1];
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn writer_counts_and_hashes() {
        let mut writer = Crc32Writer::new(Vec::new());
        writer.write_all(b"1234").unwrap();
        let (out, crc, count) = writer.finalize();
        assert_eq!(out, b"1234");
        assert_eq!(crc, 0x9be3e0a3);
        assert_eq!(count, 4);
    }
}
