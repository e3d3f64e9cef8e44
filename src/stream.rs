//! A forward-only ZIP reader for unseekable input.
//!
//! Where [`read::ZipArchive`] loads the central directory first, this
//! reader takes entries as they come: local file header, payload, optional
//! data descriptor, repeat. That means it only knows what local headers
//! say. Entries whose sizes arrive in a data descriptor are recovered by
//! decoding until the stream ends (DEFLATE can do that) or, for STORED
//! entries, by buffering and scanning for the next record's signature —
//! a best-effort affair that can misfire on pathological inputs like an
//! archive stored uncompressed inside another. Prefer the seekable reader
//! when you can seek.
//!
//! [`read::ZipArchive`]: ../read/struct.ZipArchive.html

use std::io::{self, BufRead, Read};

use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};
use log::*;
use memchr::memmem;

use crate::encoding::TextEncoding;
use crate::entry::{GeneralPurposeFlags, TextSource, ZipEntry};
use crate::extra::{self, ExtraField, ParseMode, Side};
use crate::fields::U32_SENTINEL;
use crate::method::CompressionMethod;
use crate::result::*;
use crate::spec;

/// How far into the stream the first local file header may be buried.
/// Self-extracting archives put an executable stub up front.
const PREAMBLE_SEARCH_LIMIT: usize = 4096;

/// Headroom the memory guard keeps free above what a scan has buffered.
const MEMORY_GUARD_HEADROOM: u64 = 2 * 1024 * 1024;

/// Chunk size for refilling the internal buffer.
const REFILL_CHUNK: usize = 64 * 1024;

/// Knobs for the streaming reader.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Encoding for names and comments whose UTF-8 flag is clear.
    pub encoding: TextEncoding,
    /// What to do about malformed extra fields.
    pub parse_mode: ParseMode,
    /// STORED entries with a data descriptor can only be read by buffering
    /// and scanning, which can misfire; it's opt-in.
    pub allow_stored_entries_with_data_descriptor: bool,
    /// Consume a leading spanned-archive marker instead of refusing the
    /// archive.
    pub skip_split_marker: bool,
    /// Ceiling for buffering scans (data-descriptor recovery, signing
    /// blocks). Exceeding it is a [`ZipError::MemoryLimit`], not an OOM.
    pub memory_limit: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::default(),
            parse_mode: ParseMode::default(),
            allow_stored_entries_with_data_descriptor: false,
            skip_split_marker: false,
            memory_limit: 1 << 30,
        }
    }
}

/// A buffered reader that knows its logical position and can peek
/// arbitrarily far ahead without consuming.
///
/// The DEFLATE decoder runs through the [`BufRead`] interface, consuming
/// exactly the compressed bytes it uses, so whatever follows an entry's
/// payload is still here afterward.
struct Tracked<R> {
    inner: R,
    buffer: Vec<u8>,
    start: usize,
    position: u64,
}

impl<R: Read> Tracked<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            start: 0,
            position: 0,
        }
    }

    /// Bytes consumed so far.
    fn position(&self) -> u64 {
        self.position
    }

    fn buffered(&self) -> &[u8] {
        &self.buffer[self.start..]
    }

    fn buffered_len(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Tries to buffer at least `n` unconsumed bytes; returns what's
    /// available, which is shorter only at end of input.
    fn fill_to(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.start > 0 && self.start == self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        }
        while self.buffered_len() < n {
            // Compact once the dead prefix dominates.
            if self.start > REFILL_CHUNK && self.start > self.buffered_len() {
                self.buffer.drain(..self.start);
                self.start = 0;
            }
            let old_len = self.buffer.len();
            let want = (n - self.buffered_len()).max(REFILL_CHUNK);
            self.buffer.resize(old_len + want, 0);
            let got = self.inner.read(&mut self.buffer[old_len..])?;
            self.buffer.truncate(old_len + got);
            if got == 0 {
                break;
            }
        }
        Ok(self.buffered())
    }

    /// Drops `n` buffered bytes.
    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.buffered_len());
        self.start += n;
        self.position += n as u64;
    }

    /// Skips `n` bytes, buffered or not.
    fn skip(&mut self, mut n: u64) -> io::Result<()> {
        let buffered = (self.buffered_len() as u64).min(n);
        self.advance(buffered as usize);
        n -= buffered;
        while n > 0 {
            let take = n.min(REFILL_CHUNK as u64) as usize;
            let got = self.fill_to(take)?.len().min(take);
            if got == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "ran out of input while skipping",
                ));
            }
            self.advance(got);
            n -= got as u64;
        }
        Ok(())
    }

    fn read_exact_vec(&mut self, n: usize) -> ZipResult<Vec<u8>> {
        let available = self.fill_to(n)?;
        if available.len() < n {
            return Err(ZipError::Truncated("unexpected end of stream"));
        }
        let out = available[..n].to_vec();
        self.advance(n);
        Ok(out)
    }
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let take = available.len().min(buf.len());
        buf[..take].copy_from_slice(&available[..take]);
        self.consume(take);
        Ok(take)
    }
}

impl<R: Read> BufRead for Tracked<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.buffered_len() == 0 {
            self.fill_to(REFILL_CHUNK)?;
        }
        Ok(self.buffered())
    }

    fn consume(&mut self, amt: usize) {
        self.advance(amt);
    }
}

/// Decoder state for the entry currently being read.
enum EntryState {
    /// STORED with known size: a plain bounded copy.
    Stored { remaining: u64 },
    /// STORED with a data descriptor: recovered up front into memory.
    Buffered { data: io::Cursor<Vec<u8>> },
    /// DEFLATE, bounded by the compressed size or by the stream itself.
    Deflate {
        decompress: Box<Decompress>,
        compressed_remaining: Option<u64>,
        done: bool,
    },
    /// A method we can't decode; only raw reads work.
    Foreign { remaining: u64 },
}

struct OpenEntry {
    entry: ZipEntry,
    state: EntryState,
    hasher: Hasher,
    produced: u64,
    data_start: u64,
    has_descriptor: bool,
    /// The local header carried a Zip64 extra, so any data descriptor
    /// uses 8-byte sizes.
    zip64: bool,
    /// The data descriptor was already consumed by the recovery scan.
    descriptor_consumed: bool,
}

/// A one-pass reader over any [`Read`]: yields entries in physical order.
///
/// ```no_run
/// # use std::fs::File;
/// # use std::io::Read;
/// # use zipwire::stream::ZipStreamReader;
/// let mut reader = ZipStreamReader::new(File::open("foo.zip")?);
/// while let Some(entry) = reader.next_entry()? {
///     println!("{}", entry.name);
///     let mut contents = Vec::new();
///     reader.read_to_end(&mut contents)?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ZipStreamReader<R: Read> {
    input: Tracked<R>,
    options: StreamOptions,
    current: Option<OpenEntry>,
    reached_central_directory: bool,
    searched_preamble: bool,
}

impl<R: Read> ZipStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, StreamOptions::default())
    }

    pub fn with_options(inner: R, options: StreamOptions) -> Self {
        Self {
            input: Tracked::new(inner),
            options,
            current: None,
            reached_central_directory: false,
            searched_preamble: false,
        }
    }

    /// Advances to the next entry, closing (and checking) the current one.
    ///
    /// Returns `None` once the central directory begins; a streaming
    /// reader has no use for what follows it.
    pub fn next_entry(&mut self) -> ZipResult<Option<ZipEntry>> {
        if self.current.is_some() {
            self.close_entry()?;
        }
        if self.reached_central_directory {
            return Ok(None);
        }
        if !self.searched_preamble {
            self.skip_preamble()?;
            self.searched_preamble = true;
        }

        loop {
            let head = self.input.fill_to(4)?;
            if head.is_empty() {
                // A bare stream that just ends: no central directory at all.
                return Ok(None);
            }
            if head.len() < 4 {
                return Err(ZipError::Truncated("mid-signature end of stream"));
            }
            let signature: [u8; 4] = head[..4].try_into().unwrap();
            match signature {
                spec::LOCAL_FILE_HEADER_MAGIC => {
                    self.input.advance(4);
                    let entry = self.begin_entry()?;
                    return Ok(Some(entry));
                }
                spec::CENTRAL_DIRECTORY_MAGIC
                | spec::ARCHIVE_EXTRA_DATA_MAGIC
                | spec::EOCDR_MAGIC => {
                    trace!("central directory reached; no more entries");
                    self.reached_central_directory = true;
                    return Ok(None);
                }
                _ => {
                    // Not a record we know. An APK signing block sits
                    // between the last entry and the central directory,
                    // so try that before giving up.
                    self.skip_apk_signing_block()?;
                }
            }
        }
    }

    /// The entry currently open for reading, with whatever metadata is
    /// known so far (sizes and CRC update once a data descriptor is read).
    pub fn current_entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref().map(|open| &open.entry)
    }

    /// Drains the open entry, reads its data descriptor if one is due,
    /// verifies CRC and sizes, and returns the completed metadata.
    pub fn close_entry(&mut self) -> ZipResult<ZipEntry> {
        let mut open = self
            .current
            .take()
            .ok_or(ZipError::InvalidUsage("no entry is open"))?;

        // A foreign method was never decoded, so there's nothing to
        // verify: skip whatever raw payload is left and hand it back.
        if let EntryState::Foreign { remaining } = open.state {
            self.input.skip(remaining)?;
            return Ok(open.entry);
        }

        // Drain whatever the caller didn't read; the CRC needs it all.
        loop {
            let mut sink = [0u8; 8192];
            if read_entry_data(&mut self.input, &mut open, &mut sink)? == 0 {
                break;
            }
        }

        // A bounded deflate stream that ended early still owns the rest of
        // its declared bytes; step over them to stay record-aligned.
        if let EntryState::Deflate {
            compressed_remaining: Some(remaining),
            ..
        } = &open.state
        {
            if *remaining > 0 {
                self.input.skip(*remaining)?;
            }
        }

        let consumed = self.input.position() - open.data_start;
        if open.has_descriptor && !open.descriptor_consumed {
            let descriptor = self.read_data_descriptor(open.zip64)?;
            if descriptor.compressed_size != consumed {
                return Err(ZipError::CorruptField(format!(
                    "{}: data descriptor says {} compressed bytes, stream had {}",
                    open.entry.name, descriptor.compressed_size, consumed,
                )));
            }
            open.entry.crc32 = Some(descriptor.crc32);
            open.entry.compressed_size = Some(descriptor.compressed_size);
            open.entry.size = Some(descriptor.uncompressed_size);
        }

        if let Some(expected) = open.entry.size {
            if expected != open.produced {
                return Err(ZipError::CorruptField(format!(
                    "{}: expected {} bytes, got {}",
                    open.entry.name, expected, open.produced,
                )));
            }
        }
        let crc = open.hasher.finalize();
        match open.entry.crc32 {
            Some(expected) if expected != crc => Err(ZipError::CorruptField(format!(
                "{}: CRC mismatch (expected {expected:08x}, computed {crc:08x})",
                open.entry.name,
            ))),
            _ => {
                open.entry.crc32 = Some(crc);
                Ok(open.entry)
            }
        }
    }

    /// Hunts for the first record signature in the leading 4 KiB,
    /// tolerating self-extractor stubs and split markers.
    fn skip_preamble(&mut self) -> ZipResult<()> {
        let window = self.input.fill_to(PREAMBLE_SEARCH_LIMIT + 4)?;
        if window.is_empty() {
            return Ok(()); // Empty input; next_entry reports no entries.
        }

        let candidates = [
            spec::LOCAL_FILE_HEADER_MAGIC,
            spec::SPLIT_SEGMENT_MAGIC,
            spec::DATA_DESCRIPTOR_MAGIC,
            spec::CENTRAL_DIRECTORY_MAGIC, // empty archives go straight to it
            spec::EOCDR_MAGIC,
        ];
        let earliest = candidates
            .iter()
            .filter_map(|magic| memmem::find(window, magic).map(|posit| (posit, *magic)))
            .min();

        match earliest {
            Some((posit, magic)) => {
                if posit > 0 {
                    debug!("skipping {posit} preamble bytes");
                    self.input.advance(posit);
                }
                match magic {
                    spec::SPLIT_SEGMENT_MAGIC => {
                        // "PK00": the single-segment form of a split
                        // archive. Harmless; drop the marker.
                        self.input.advance(4);
                    }
                    spec::DATA_DESCRIPTOR_MAGIC => {
                        if !self.options.skip_split_marker {
                            return Err(ZipError::UnsupportedArchive(
                                "split archive (spanned marker present)".into(),
                            ));
                        }
                        self.input.advance(4);
                    }
                    _ => {}
                }
                Ok(())
            }
            None => Err(ZipError::BadSignature(
                "no ZIP record in the first 4 KiB of the stream",
            )),
        }
    }

    /// Reads one local file header (signature already consumed) and
    /// readies the entry's decoder.
    fn begin_entry(&mut self) -> ZipResult<ZipEntry> {
        let fixed_bytes = self.input.read_exact_vec(spec::LOCAL_FILE_HEADER_FIXED_LEN)?;
        let mut fixed_slice = &fixed_bytes[..];
        let fixed = spec::LocalFileHeaderFixed::parse_and_consume(&mut fixed_slice)?;
        trace!("{:?}", fixed);

        let name_bytes = self.input.read_exact_vec(fixed.path_length as usize)?;
        let extra_bytes = self.input.read_exact_vec(fixed.extra_field_length as usize)?;

        let mut entry = self.entry_from_local(&fixed, &name_bytes, &extra_bytes)?;
        let has_descriptor = entry.flags.data_descriptor();
        let zip64 = entry.extra(extra::ZIP64).is_some();

        if entry.flags.encrypted() || entry.flags.strong_encryption() {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                entry.name
            )));
        }

        let method = entry.method.unwrap_or(CompressionMethod::Stored);
        let data_start = self.input.position();
        let mut descriptor_consumed = false;

        let state = match method {
            CompressionMethod::Stored if !has_descriptor => EntryState::Stored {
                remaining: entry.compressed_size.unwrap_or(0),
            },
            CompressionMethod::Stored => {
                if !self.options.allow_stored_entries_with_data_descriptor {
                    return Err(ZipError::UnsupportedArchive(format!(
                        "{}: STORED entry with a data descriptor needs opt-in \
                         (it is recovered by scanning, which can misfire)",
                        entry.name
                    )));
                }
                let (data, descriptor) = self.recover_stored_entry(&entry.name, zip64)?;
                entry.crc32 = Some(descriptor.crc32);
                entry.compressed_size = Some(descriptor.compressed_size);
                entry.size = Some(descriptor.uncompressed_size);
                entry.stream_contiguous = false;
                descriptor_consumed = true;
                EntryState::Buffered {
                    data: io::Cursor::new(data),
                }
            }
            CompressionMethod::Deflate => EntryState::Deflate {
                decompress: Box::new(Decompress::new(false)),
                compressed_remaining: if has_descriptor {
                    None
                } else {
                    entry.compressed_size
                },
                done: false,
            },
            other => {
                if has_descriptor {
                    return Err(ZipError::UnsupportedArchive(format!(
                        "{}: method {:?} with a data descriptor can't be streamed",
                        entry.name, other,
                    )));
                }
                EntryState::Foreign {
                    remaining: entry.compressed_size.unwrap_or(0),
                }
            }
        };

        let open = OpenEntry {
            entry: entry.clone(),
            state,
            hasher: Hasher::new(),
            produced: 0,
            data_start,
            has_descriptor,
            zip64,
            descriptor_consumed,
        };
        self.current = Some(open);
        Ok(entry)
    }

    fn entry_from_local(
        &self,
        fixed: &spec::LocalFileHeaderFixed,
        name_bytes: &[u8],
        extra_bytes: &[u8],
    ) -> ZipResult<ZipEntry> {
        let flags = GeneralPurposeFlags(fixed.flags);
        let name: String = if flags.utf8() {
            std::str::from_utf8(name_bytes)?.to_owned()
        } else {
            self.options.encoding.decode(name_bytes).into_owned()
        };

        let mut entry = ZipEntry::new(name);
        entry.raw_name = Some(name_bytes.to_vec());
        entry.name_source = if flags.utf8() {
            TextSource::Utf8Flag
        } else {
            TextSource::Raw
        };
        entry.flags = flags;
        entry.method = Some(CompressionMethod::from_code(fixed.compression_method));
        entry.version_required = fixed.minimum_extract_version;
        entry.time = crate::dostime::dos_to_datetime(fixed.dos_datetime)
            .unwrap_or_else(crate::dostime::dos_epoch);

        // With a data descriptor in play the local header's CRC and sizes
        // are zeros; nothing is known until the payload ends.
        if !flags.data_descriptor() {
            entry.crc32 = Some(fixed.crc32);
            entry.size = Some(fixed.uncompressed_size as u64);
            entry.compressed_size = Some(fixed.compressed_size as u64);
        }

        let mut parsed = extra::parse(
            extra_bytes,
            Side::Local,
            self.options.parse_mode,
            Default::default(),
        )
        .map_err(|e| e.for_entry(&entry.name))?;
        let sentinel_sizes = fixed.uncompressed_size == U32_SENTINEL
            || fixed.compressed_size == U32_SENTINEL;
        if !sentinel_sizes {
            // A zero-filled placeholder Zip64 extra must not clobber the
            // header's real sizes.
            parsed
                .fields
                .retain(|field| !matches!(field, ExtraField::Zip64(_)));
        }
        entry.merge_extras(parsed, Side::Local);
        if sentinel_sizes {
            entry.apply_zip64();
        }
        entry.apply_unicode_extras();
        Ok(entry)
    }

    /// Reads a data descriptor, with or without its optional signature.
    fn read_data_descriptor(&mut self, zip64: bool) -> ZipResult<spec::DataDescriptor> {
        let body_len = spec::DataDescriptor::size_in_file(zip64);
        let head = self.input.fill_to(4 + body_len)?;
        let offset = if head.len() >= 4 && head[..4] == spec::DATA_DESCRIPTOR_MAGIC {
            4
        } else {
            0
        };
        if head.len() < offset + body_len {
            return Err(ZipError::Truncated("data descriptor"));
        }
        let descriptor = spec::DataDescriptor::parse(&head[offset..], zip64)?;
        self.input.advance(offset + body_len);
        Ok(descriptor)
    }

    /// Buffers a STORED entry until a plausible record signature shows up,
    /// then back-computes the data descriptor in front of it.
    ///
    /// The descriptor's sizes must agree with the bytes scanned past;
    /// a signature that doesn't check out is treated as payload and the
    /// scan continues. Bounded by the memory guard.
    fn recover_stored_entry(
        &mut self,
        name: &str,
        zip64: bool,
    ) -> ZipResult<(Vec<u8>, spec::DataDescriptor)> {
        let descriptor_len = spec::DataDescriptor::size_in_file(zip64);
        let mut scan_from = 0usize;
        let mut window_len = REFILL_CHUNK;

        loop {
            self.guard_memory(window_len as u64)?;
            let window = self.input.fill_to(window_len)?;
            let window_len_actual = window.len();

            // The last entry of a bare stream can be followed by the end
            // record rather than another header, so it counts too.
            let candidates = [
                spec::DATA_DESCRIPTOR_MAGIC,
                spec::LOCAL_FILE_HEADER_MAGIC,
                spec::CENTRAL_DIRECTORY_MAGIC,
                spec::EOCDR_MAGIC,
            ];
            let mut search_at = scan_from;
            while let Some((posit, magic)) = candidates
                .iter()
                .filter_map(|magic| {
                    memmem::find(&window[search_at..], magic).map(|p| (p + search_at, *magic))
                })
                .min()
            {
                if let Some(accepted) =
                    try_descriptor_at(window, posit, magic, descriptor_len, zip64)
                {
                    let (data_len, descriptor_end, descriptor) = accepted;
                    let data = window[..data_len].to_vec();
                    self.input.advance(descriptor_end);
                    return Ok((data, descriptor));
                }
                search_at = posit + 1;
            }

            if window_len_actual < window_len {
                // Input ended with no descriptor in sight.
                return Err(ZipError::Truncated(
                    "stream ended inside a stored entry with a data descriptor",
                ))
                .map_err(|e| e.for_entry(name));
            }
            // Rescan only the tail a boundary-straddling signature could
            // occupy, then widen.
            scan_from = window_len_actual.saturating_sub(4 + descriptor_len);
            window_len += REFILL_CHUNK;
        }
    }

    /// Walks over an APK signing block, or errors if the bytes aren't one.
    ///
    /// Layout: `u64 len | pairs... | u64 len | "APK Sig Block 42"`, where
    /// `len` counts everything after the first length field. The whole
    /// block is peeked (memory-guarded) before any of it is consumed, so
    /// a mismatched magic fails cleanly.
    fn skip_apk_signing_block(&mut self) -> ZipResult<()> {
        let head = self.input.fill_to(8)?;
        if head.len() < 8 {
            return Err(ZipError::BadSignature(
                "expected a local file header or central directory",
            ));
        }
        let declared = u64::from_le_bytes(head[..8].try_into().unwrap());
        // A sane length: room for the trailing length + magic, and not
        // "negative" in a signed reading (a corrupt high bit).
        if declared < 24 || declared > i64::MAX as u64 {
            return Err(ZipError::BadSignature(
                "expected a local file header or central directory",
            ));
        }
        let total = 8 + declared;
        self.guard_memory(total)?;
        let block = self.input.fill_to(total as usize)?;
        if block.len() < total as usize {
            return Err(ZipError::BadSignature(
                "expected a local file header or central directory",
            ));
        }
        let magic_at = total as usize - spec::APK_SIGNING_BLOCK_MAGIC.len();
        if &block[magic_at..total as usize] != spec::APK_SIGNING_BLOCK_MAGIC {
            return Err(ZipError::BadSignature(
                "expected a local file header or central directory",
            ));
        }
        debug!("skipping a {total}-byte APK signing block");
        self.input.advance(total as usize);
        Ok(())
    }

    fn guard_memory(&self, wanted: u64) -> ZipResult<()> {
        if wanted + MEMORY_GUARD_HEADROOM > self.options.memory_limit {
            Err(ZipError::MemoryLimit(wanted))
        } else {
            Ok(())
        }
    }
}

fn bad_deflate(e: flate2::DecompressError) -> ZipError {
    ZipError::CorruptField(format!("invalid deflate stream: {e}"))
}

/// Validates a signature candidate found while scanning a stored entry.
///
/// Returns `(data_len, bytes_to_consume, descriptor)` when the descriptor
/// the candidate implies agrees with the scan position.
fn try_descriptor_at(
    window: &[u8],
    posit: usize,
    magic: [u8; 4],
    descriptor_len: usize,
    zip64: bool,
) -> Option<(usize, usize, spec::DataDescriptor)> {
    if magic == spec::DATA_DESCRIPTOR_MAGIC {
        // The descriptor sits right here, signature first.
        let body = window.get(posit + 4..posit + 4 + descriptor_len)?;
        let descriptor = spec::DataDescriptor::parse(body, zip64).ok()?;
        let data_len = posit as u64;
        (descriptor.compressed_size == data_len && descriptor.uncompressed_size == data_len)
            .then(|| (posit, posit + 4 + descriptor_len, descriptor))
    } else {
        // The next record starts here; a signature-less descriptor must
        // directly precede it.
        let descriptor_at = posit.checked_sub(descriptor_len)?;
        let body = window.get(descriptor_at..posit)?;
        let descriptor = spec::DataDescriptor::parse(body, zip64).ok()?;
        let data_len = descriptor_at as u64;
        (descriptor.compressed_size == data_len && descriptor.uncompressed_size == data_len)
            .then(|| (descriptor_at, posit, descriptor))
    }
}

/// One read step for the open entry; shared by `Read::read` and the
/// closing drain.
fn read_entry_data<R: Read>(
    input: &mut Tracked<R>,
    open: &mut OpenEntry,
    buf: &mut [u8],
) -> ZipResult<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let produced = match &mut open.state {
        EntryState::Stored { remaining } => {
            if *remaining == 0 {
                return Ok(0);
            }
            let take = (*remaining).min(buf.len() as u64) as usize;
            let available = input.fill_to(take)?;
            if available.is_empty() {
                return Err(ZipError::Truncated("stored entry cut short"));
            }
            let take = take.min(available.len());
            buf[..take].copy_from_slice(&available[..take]);
            input.advance(take);
            *remaining -= take as u64;
            take
        }
        EntryState::Buffered { data } => data.read(buf)?,
        EntryState::Deflate {
            decompress,
            compressed_remaining,
            done,
        } => {
            if *done {
                return Ok(0);
            }
            loop {
                let available = input.fill_buf()?;
                let capped = match compressed_remaining {
                    Some(remaining) => {
                        let cap = (*remaining).min(available.len() as u64) as usize;
                        &available[..cap]
                    }
                    None => available,
                };
                if capped.is_empty() && !*done {
                    if compressed_remaining.map_or(false, |r| r == 0) {
                        // Declared input exhausted; flush what's left.
                        let before_out = decompress.total_out();
                        let status = decompress
                            .decompress(&[], buf, FlushDecompress::Finish)
                            .map_err(bad_deflate)?;
                        let out = (decompress.total_out() - before_out) as usize;
                        if status == Status::StreamEnd {
                            *done = true;
                        }
                        if out > 0 || *done {
                            break out;
                        }
                    }
                    return Err(ZipError::Truncated("deflated entry cut short"));
                }

                let before_in = decompress.total_in();
                let before_out = decompress.total_out();
                let status = decompress
                    .decompress(capped, buf, FlushDecompress::None)
                    .map_err(bad_deflate)?;
                let consumed = (decompress.total_in() - before_in) as usize;
                let out = (decompress.total_out() - before_out) as usize;
                input.advance(consumed);
                if let Some(remaining) = compressed_remaining {
                    *remaining -= consumed as u64;
                }
                if status == Status::StreamEnd {
                    *done = true;
                }
                if out > 0 || *done {
                    break out;
                }
            }
        }
        EntryState::Foreign { .. } => {
            return Err(ZipError::UnsupportedArchive(format!(
                "{}: compression method not supported for streaming; \
                 use read_raw or the seekable reader",
                open.entry.name,
            )))
        }
    };
    open.hasher.update(&buf[..produced]);
    open.produced += produced as u64;
    Ok(produced)
}

impl<R: Read> Read for ZipStreamReader<R> {
    /// Reads decompressed bytes of the currently open entry.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let open = match self.current.as_mut() {
            Some(open) => open,
            None => return Ok(0),
        };
        read_entry_data(&mut self.input, open, buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl<R: Read> ZipStreamReader<R> {
    /// Reads the open entry's *stored* bytes without decoding them.
    /// This is how entries with foreign compression methods come out;
    /// no CRC or size verification happens for them.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> ZipResult<usize> {
        let open = self
            .current
            .as_mut()
            .ok_or(ZipError::InvalidUsage("no entry is open"))?;
        let remaining = match &mut open.state {
            EntryState::Foreign { remaining } => remaining,
            _ => {
                return Err(ZipError::InvalidUsage(
                    "raw reads only apply to entries left undecoded",
                ))
            }
        };
        if *remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let take = (*remaining).min(buf.len() as u64) as usize;
        let available = self.input.fill_to(take)?;
        if available.is_empty() {
            return Err(ZipError::Truncated("entry payload cut short"));
        }
        let take = take.min(available.len());
        buf[..take].copy_from_slice(&available[..take]);
        self.input.advance(take);
        *remaining -= take as u64;
        Ok(take)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tracked_peeks_without_consuming() {
        let mut tracked = Tracked::new(&b"hello world"[..]);
        assert_eq!(tracked.fill_to(5).unwrap(), b"hello");
        assert_eq!(tracked.position(), 0);
        tracked.advance(6);
        assert_eq!(tracked.position(), 6);
        assert_eq!(tracked.fill_to(100).unwrap(), b"world");
        tracked.advance(5);
        assert_eq!(tracked.fill_to(1).unwrap(), b"");
    }

    #[test]
    fn tracked_skip_spans_refills() {
        let data = vec![7u8; REFILL_CHUNK * 2 + 10];
        let mut tracked = Tracked::new(&data[..]);
        tracked.skip(REFILL_CHUNK as u64 * 2 + 5).unwrap();
        assert_eq!(tracked.position(), REFILL_CHUNK as u64 * 2 + 5);
        assert_eq!(tracked.fill_to(10).unwrap().len(), 5);
    }
}
