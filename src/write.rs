//! Tools for writing a ZIP archive.
//!
//! [`ZipWriter`] drives any [`Sink`]: a seekable one patches local
//! headers in place once an entry's CRC and sizes are known, a plain
//! stream falls back to data descriptors, and a split sink rolls output
//! across fixed-size segments. Entries go out strictly in order — local
//! header, payload, optional descriptor — with the central directory and
//! end records written by [`ZipWriter::finish`].
//!
//! ```no_run
//! # use std::io::{Cursor, Write};
//! # use zipwire::write::ZipWriter;
//! # use zipwire::ZipEntry;
//! let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
//! writer.put_entry(ZipEntry::new("hello.txt"))?;
//! writer.write_all(b"hi there")?;
//! writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::*;

use crate::crc::Crc32Writer;

use crate::encoding::TextEncoding;
use crate::entry::ZipEntry;
use crate::extra::{self, ExtraField, ResourceAlignmentExtra, Zip64Extra};
use crate::fields::{u16_or_sentinel, u32_or_sentinel, U16_SENTINEL, U32_SENTINEL};
use crate::method::CompressionMethod;
use crate::result::*;
use crate::spec;

/// When the writer reaches for Zip64 structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Mode {
    /// Overflow is an error ([`ZipError::Zip64Required`]); nothing Zip64
    /// is ever written.
    Never,
    /// Zip64 structures appear exactly where a value demands them.
    ///
    /// One quirk, kept for compatibility: an unknown-size DEFLATED entry
    /// headed to a non-seekable sink silently degrades to `Never` for that
    /// entry, trusting the data descriptor to carry the real sizes.
    /// [`FinishReport::degraded_to_never`] counts how often that happened.
    #[default]
    AsNeeded,
    /// Every entry gets the Zip64 extra and the archive gets Zip64 end
    /// records, sizes notwithstanding.
    Always,
    /// Like `Always`, but central directory size slots hold their real
    /// values whenever they fit, so Zip64-unaware readers still see
    /// correct sizes.
    AlwaysWithCompatibility,
}

impl Zip64Mode {
    fn forced(self) -> bool {
        matches!(self, Zip64Mode::Always | Zip64Mode::AlwaysWithCompatibility)
    }
}

/// Knobs for the writer.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub zip64: Zip64Mode,
    /// Encoding for names and comments.
    pub encoding: TextEncoding,
    /// When the encoding can't represent a name, re-encode it as UTF-8
    /// and set the UTF-8 flag (otherwise `%Uxxxx` escapes are used).
    pub fallback_to_utf8: bool,
    /// DEFLATE level, 0-9.
    pub level: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            zip64: Zip64Mode::default(),
            encoding: TextEncoding::default(),
            fallback_to_utf8: true,
            level: 6,
        }
    }
}

/// What [`ZipWriter::finish`] learned while closing out the archive.
#[derive(Debug, Clone)]
pub struct FinishReport {
    pub central_directory_disk: u32,
    pub central_directory_offset: u64,
    pub central_directory_length: u64,
    pub entry_count: u64,
    /// Whether any Zip64 structure ended up in the archive.
    pub zip64: bool,
    /// Entries where `AsNeeded` silently degraded to `Never`
    /// (see [`Zip64Mode::AsNeeded`]).
    pub degraded_to_never: u32,
    /// Total segments written (1 unless splitting).
    pub segments: u32,
}

/// Where the writer's bytes go.
///
/// Positions are `(segment, offset)` pairs so split output can address
/// earlier segments. `patch` is the escape hatch for rewriting a header
/// once the values it should have held are known; sinks that can't do
/// that return `false` and the writer uses data descriptors instead.
pub trait Sink: Write {
    /// Where the next byte will land.
    fn position(&mut self) -> io::Result<(u32, u64)>;

    /// Can `patch` succeed?
    fn can_patch(&self) -> bool;

    /// Overwrites previously written bytes, returning `false` if this
    /// sink can't.
    fn patch(&mut self, disk: u32, offset: u64, bytes: &[u8]) -> io::Result<bool>;
}

/// A sink over anything seekable; headers get patched in place.
pub struct SeekableSink<W: Write + Seek> {
    inner: W,
}

impl<W: Write + Seek> SeekableSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> Write for SeekableSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek> Sink for SeekableSink<W> {
    fn position(&mut self) -> io::Result<(u32, u64)> {
        Ok((0, self.inner.stream_position()?))
    }

    fn can_patch(&self) -> bool {
        true
    }

    fn patch(&mut self, _disk: u32, offset: u64, bytes: &[u8]) -> io::Result<bool> {
        let here = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(bytes)?;
        self.inner.seek(SeekFrom::Start(here))?;
        Ok(true)
    }
}

/// A sink over a forward-only stream; it can only count.
pub struct StreamSink<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for StreamSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Sink for StreamSink<W> {
    fn position(&mut self) -> io::Result<(u32, u64)> {
        Ok((0, self.count))
    }

    fn can_patch(&self) -> bool {
        false
    }

    fn patch(&mut self, _disk: u32, _offset: u64, _bytes: &[u8]) -> io::Result<bool> {
        Ok(false)
    }
}

/// A sink that splits output into segments of at most `segment_limit`
/// bytes, asking `make` for each new segment in order (segment 0 first,
/// the conventional `.zip` tail segment last).
pub struct SplitSink<W: Write, F: FnMut(u32) -> io::Result<W>> {
    make: F,
    current: Option<W>,
    disk: u32,
    written_on_disk: u64,
    segment_limit: u64,
}

impl<W: Write, F: FnMut(u32) -> io::Result<W>> SplitSink<W, F> {
    pub fn new(segment_limit: u64, make: F) -> Self {
        debug_assert!(segment_limit > 0);
        Self {
            make,
            current: None,
            disk: 0,
            written_on_disk: 0,
            segment_limit,
        }
    }

    pub fn segments(&self) -> u32 {
        if self.current.is_some() || self.disk > 0 {
            self.disk + 1
        } else {
            0
        }
    }

    fn segment(&mut self) -> io::Result<&mut W> {
        if self.current.is_none() {
            self.current = Some((self.make)(self.disk)?);
        }
        Ok(self.current.as_mut().unwrap())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut done) = self.current.take() {
            done.flush()?;
        }
        self.disk += 1;
        self.written_on_disk = 0;
        Ok(())
    }
}

impl<W: Write, F: FnMut(u32) -> io::Result<W>> Write for SplitSink<W, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.written_on_disk >= self.segment_limit {
            self.roll()?;
        }
        let room = (self.segment_limit - self.written_on_disk).min(buf.len() as u64) as usize;
        let written = self.segment()?.write(&buf[..room])?;
        self.written_on_disk += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some(segment) => segment.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write, F: FnMut(u32) -> io::Result<W>> Sink for SplitSink<W, F> {
    fn position(&mut self) -> io::Result<(u32, u64)> {
        if self.written_on_disk >= self.segment_limit {
            // The next byte starts the next segment.
            self.roll()?;
        }
        Ok((self.disk, self.written_on_disk))
    }

    fn can_patch(&self) -> bool {
        false
    }

    fn patch(&mut self, _disk: u32, _offset: u64, _bytes: &[u8]) -> io::Result<bool> {
        Ok(false)
    }
}

/// The compressor for the entry being written.
///
/// Either way a [`Crc32Writer`] sits on the uncompressed side,
/// learning the CRC and size as bytes flow through.
enum Encoder {
    /// STORED: bytes go straight to the sink; the tally just watches.
    Stored { tally: Crc32Writer<io::Sink> },
    /// DEFLATE: bytes run through the tally into the deflater, whose
    /// output buffer is drained to the sink as it fills.
    Deflate {
        deflater: Crc32Writer<DeflateEncoder<Vec<u8>>>,
        compressed: u64,
    },
}

/// Everything remembered about the entry currently open.
struct InProgress {
    entry: ZipEntry,
    name_bytes: Vec<u8>,
    lfh_disk: u32,
    lfh_offset: u64,
    /// A Zip64 extra was written into the local header.
    zip64_reserved: bool,
    /// A data descriptor will follow the payload.
    use_descriptor: bool,
    encoder: Encoder,
}

/// Writes ZIP archives entry by entry.
///
/// The state machine is strict: [`put_entry`] opens an entry, `write`
/// feeds it, [`close_entry`] (implicit in the next `put_entry` or in
/// [`finish`]) seals it. Writing with no entry open or finishing twice is
/// an [`ZipError::InvalidUsage`].
///
/// [`put_entry`]: Self::put_entry
/// [`close_entry`]: Self::close_entry
/// [`finish`]: Self::finish
pub struct ZipWriter<S: Sink> {
    sink: S,
    options: WriteOptions,
    comment: String,
    entries: Vec<ZipEntry>,
    current: Option<InProgress>,
    finished: bool,
    /// Entries that actually kept a Zip64 extra.
    zip64_entries: u32,
    degraded_to_never: u32,
}

impl<W: Write + Seek> ZipWriter<SeekableSink<W>> {
    /// A writer over a seekable output. Local headers are rewritten in
    /// place, so no data descriptors are needed.
    pub fn new(inner: W) -> Self {
        Self::with_sink(SeekableSink::new(inner), WriteOptions::default())
    }

    pub fn with_options(inner: W, options: WriteOptions) -> Self {
        Self::with_sink(SeekableSink::new(inner), options)
    }
}

impl<W: Write> ZipWriter<StreamSink<W>> {
    /// A writer over a forward-only stream. DEFLATED entries get data
    /// descriptors; STORED entries must declare size and CRC up front.
    pub fn streaming(inner: W) -> Self {
        Self::with_sink(StreamSink::new(inner), WriteOptions::default())
    }

    pub fn streaming_with_options(inner: W, options: WriteOptions) -> Self {
        Self::with_sink(StreamSink::new(inner), options)
    }
}

impl<W: Write, F: FnMut(u32) -> io::Result<W>> ZipWriter<SplitSink<W, F>> {
    /// A writer that splits the archive into segments of at most
    /// `segment_limit` bytes, calling `make` for each segment in order.
    pub fn split(segment_limit: u64, make: F, options: WriteOptions) -> Self {
        Self::with_sink(SplitSink::new(segment_limit, make), options)
    }
}

impl<S: Sink> ZipWriter<S> {
    pub fn with_sink(sink: S, options: WriteOptions) -> Self {
        Self {
            sink,
            options,
            comment: String::new(),
            entries: Vec::new(),
            current: None,
            finished: false,
            zip64_entries: 0,
            degraded_to_never: 0,
        }
    }

    /// Sets the archive comment, written with the EOCD record.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Opens a new entry, closing any entry still open.
    ///
    /// Unset fields get defaults: DEFLATE compression, and for
    /// directories STORED with zero size.
    pub fn put_entry(&mut self, mut entry: ZipEntry) -> ZipResult<()> {
        if self.finished {
            return Err(ZipError::InvalidUsage("put_entry after finish"));
        }
        if self.current.is_some() {
            self.close_entry()?;
        }

        if entry.method.is_none() {
            entry.method = Some(if entry.is_dir() {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflate
            });
        }
        let method = entry.method.unwrap();
        if entry.is_dir() {
            entry.size = Some(0);
            entry.crc32 = Some(0);
        }
        match method {
            CompressionMethod::Stored | CompressionMethod::Deflate => {}
            other => {
                return Err(ZipError::UnsupportedArchive(format!(
                    "{}: can't compress with method {:?}; use add_raw_entry \
                     for pre-compressed data",
                    entry.name, other,
                )))
            }
        }

        // A stale Zip64 extra from a previous life must not leak through;
        // this stream's policy decides whether one is written.
        let _ = entry.remove_extra(extra::ZIP64);

        if method == CompressionMethod::Stored && entry.compressed_size.is_none() {
            entry.compressed_size = entry.size;
        }

        let patchable = self.sink.can_patch();
        if method == CompressionMethod::Stored
            && !patchable
            && (entry.size.is_none() || entry.crc32.is_none())
        {
            return Err(ZipError::InvalidUsage(
                "STORED entries need a size and CRC up front when the output \
                 can't seek",
            ));
        }

        let use_descriptor =
            !patchable && method == CompressionMethod::Deflate;
        entry.flags.set_data_descriptor(use_descriptor);

        let zip64_reserved = self.decide_zip64(&mut entry, use_descriptor, patchable)?;
        if zip64_reserved {
            // First extra, so its offset inside the header is fixed for
            // the close-time patch.
            entry.add_extra_first(ExtraField::Zip64(Zip64Extra {
                uncompressed_size: Some(entry.size.unwrap_or(0)),
                compressed_size: Some(entry.compressed_size.unwrap_or(0)),
                ..Zip64Extra::default()
            }));
            entry.version_required = entry.version_required.max(spec::VERSION_NEEDED_ZIP64);
        }

        let name_bytes = self.encode_name(&mut entry);
        let (lfh_disk, lfh_offset) = self.sink.position()?;
        entry.local_header_offset = Some(lfh_offset);
        entry.disk_number_start = lfh_disk;

        self.apply_alignment(&mut entry, lfh_offset, name_bytes.len())?;

        let extra_bytes = entry.local_extra_bytes();
        let sizes_known = !use_descriptor && entry.size.is_some();
        let (crc32, compressed_slot, uncompressed_slot) = if use_descriptor {
            // 4.4.4: with bit 3 set, the local CRC and sizes are zero.
            (0, 0, 0)
        } else if sizes_known && entry.crc32.is_some() {
            let uncompressed = entry.size.unwrap();
            // Only STORED sizes are fully known here; DEFLATE learns its
            // compressed size at close and gets patched.
            let compressed = entry.compressed_size.unwrap_or(0);
            if zip64_reserved {
                (entry.crc32.unwrap(), U32_SENTINEL, U32_SENTINEL)
            } else {
                (
                    entry.crc32.unwrap(),
                    u32_or_sentinel(compressed),
                    u32_or_sentinel(uncompressed),
                )
            }
        } else if zip64_reserved {
            (0, U32_SENTINEL, U32_SENTINEL)
        } else {
            (0, 0, 0)
        };

        let fixed = spec::LocalFileHeaderFixed {
            minimum_extract_version: version_needed(&entry, zip64_reserved),
            flags: entry.flags.0,
            compression_method: method.code(),
            dos_datetime: crate::dostime::datetime_to_dos(&entry.time),
            crc32,
            compressed_size: compressed_slot,
            uncompressed_size: uncompressed_slot,
            path_length: name_bytes.len() as u16,
            extra_field_length: extra_bytes.len() as u16,
        };
        let mut header = Vec::with_capacity(
            spec::LOCAL_FILE_HEADER_LEN as usize + name_bytes.len() + extra_bytes.len(),
        );
        fixed.append_to(&mut header);
        header.extend_from_slice(&name_bytes);
        header.extend_from_slice(&extra_bytes);
        self.sink.write_all(&header)?;

        let (_, data_start) = self.sink.position()?;
        entry.data_offset = Some(data_start);
        debug!(
            "entry {} at ({lfh_disk}, {lfh_offset}), data at {data_start}",
            entry.name
        );

        let encoder = match method {
            CompressionMethod::Stored => Encoder::Stored {
                tally: Crc32Writer::new(io::sink()),
            },
            _ => Encoder::Deflate {
                deflater: Crc32Writer::new(DeflateEncoder::new(
                    Vec::new(),
                    Compression::new(self.options.level.min(9)),
                )),
                compressed: 0,
            },
        };

        self.current = Some(InProgress {
            entry,
            name_bytes,
            lfh_disk,
            lfh_offset,
            zip64_reserved,
            use_descriptor,
            encoder,
        });
        Ok(())
    }

    /// Is a Zip64 extra called for (or forced) on this entry?
    fn decide_zip64(
        &mut self,
        entry: &mut ZipEntry,
        use_descriptor: bool,
        patchable: bool,
    ) -> ZipResult<bool> {
        let size_overflows = entry.size.map_or(false, |v| v >= U32_SENTINEL as u64)
            || entry
                .compressed_size
                .map_or(false, |v| v >= U32_SENTINEL as u64);
        match self.options.zip64 {
            Zip64Mode::Never => {
                if size_overflows {
                    return Err(ZipError::Zip64Required(entry.name.clone()));
                }
                Ok(false)
            }
            Zip64Mode::Always | Zip64Mode::AlwaysWithCompatibility => Ok(true),
            Zip64Mode::AsNeeded => {
                if size_overflows {
                    Ok(true)
                } else if entry.size.is_none() {
                    if use_descriptor {
                        // The descriptor will carry the real sizes; don't
                        // spend header bytes on a maybe.
                        trace!("{}: AsNeeded degrades to Never", entry.name);
                        self.degraded_to_never += 1;
                        Ok(false)
                    } else {
                        // Seekable and unknown: reserve, rewrite later.
                        Ok(patchable)
                    }
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Picks the wire bytes for a name (or comment) under the configured
    /// encoding, falling back per options.
    fn encode_name(&mut self, entry: &mut ZipEntry) -> Vec<u8> {
        if let Some(raw) = &entry.raw_name {
            // Round-tripping an entry we read: keep its exact bytes.
            return raw.clone();
        }
        let encoding = self.options.encoding;
        if encoding.can_encode(&entry.name) {
            entry.flags.set_utf8(encoding == TextEncoding::Utf8);
            encoding.encode(&entry.name).unwrap().into_owned()
        } else if self.options.fallback_to_utf8 {
            entry.flags.set_utf8(true);
            entry.name.as_bytes().to_vec()
        } else {
            entry.flags.set_utf8(false);
            encoding.encode_lossy(&entry.name).into_owned()
        }
    }

    /// Re-derives the alignment extra for this write.
    ///
    /// Any previous alignment extra is stripped; if the entry doesn't ask
    /// for alignment itself but the stripped extra forbade method changes,
    /// its alignment is preserved. The padding is sized so the entry's
    /// data starts at a multiple of the alignment.
    fn apply_alignment(
        &mut self,
        entry: &mut ZipEntry,
        lfh_offset: u64,
        name_len: usize,
    ) -> ZipResult<()> {
        let prior = match entry.remove_extra(extra::RESOURCE_ALIGNMENT) {
            Ok(ExtraField::ResourceAlignment(prior)) => Some(prior),
            _ => None,
        };
        let (alignment, allow_method_change) = if entry.alignment > 1 {
            (entry.alignment, false)
        } else if let Some(prior) = prior.filter(|p| !p.allow_method_change && p.alignment > 1) {
            (prior.alignment, false)
        } else {
            return Ok(());
        };
        if !alignment.is_power_of_two() {
            return Err(ZipError::InvalidUsage("alignment must be a power of two"));
        }

        let current_extra_len = entry.local_extra_bytes().len() as u64;
        let unpadded_data_start = lfh_offset
            + spec::LOCAL_FILE_HEADER_LEN
            + name_len as u64
            + current_extra_len
            + 4 // the alignment extra's own (id, len) header
            + ResourceAlignmentExtra::BASE_SIZE as u64;
        let padding = (alignment as u64 - (unpadded_data_start % alignment as u64))
            % alignment as u64;

        // Padding must land the extra last; anything after it would shift
        // the data again.
        entry.add_extra(
            ExtraField::ResourceAlignment(ResourceAlignmentExtra::new(
                alignment,
                allow_method_change,
                padding as usize,
            )),
            true,
        );
        Ok(())
    }

    /// Feeds payload bytes to the open entry.
    pub fn write_data(&mut self, buf: &[u8]) -> ZipResult<()> {
        let open = self
            .current
            .as_mut()
            .ok_or(ZipError::InvalidUsage("write with no entry open"))?;
        match &mut open.encoder {
            Encoder::Stored { tally } => {
                self.sink.write_all(buf)?;
                tally.write_all(buf)?;
            }
            Encoder::Deflate {
                deflater,
                compressed,
            } => {
                // Feed the deflater in 8 KiB bites; giant buffers have
                // historically made some zlib builds misbehave.
                for chunk in buf.chunks(8 * 1024) {
                    deflater.write_all(chunk)?;
                    let pending = deflater.get_mut().get_mut();
                    if !pending.is_empty() {
                        self.sink.write_all(pending)?;
                        *compressed += pending.len() as u64;
                        pending.clear();
                    }
                }
            }
        }
        Ok(())
    }

    /// Seals the open entry: flushes the compressor, fixes up the local
    /// header (or emits the data descriptor), and queues the entry for
    /// the central directory.
    pub fn close_entry(&mut self) -> ZipResult<()> {
        let mut open = self
            .current
            .take()
            .ok_or(ZipError::InvalidUsage("no entry is open"))?;

        let (crc32, uncompressed, compressed) = match open.encoder {
            Encoder::Stored { tally } => {
                let (_, crc32, count) = tally.finalize();
                (crc32, count, count)
            }
            Encoder::Deflate {
                deflater,
                mut compressed,
            } => {
                let (encoder, crc32, uncompressed) = deflater.finalize();
                let tail = encoder.finish()?;
                if !tail.is_empty() {
                    self.sink.write_all(&tail)?;
                    compressed += tail.len() as u64;
                }
                (crc32, uncompressed, compressed)
            }
        };

        let entry = &mut open.entry;
        if let Some(declared) = entry.size {
            if declared != uncompressed {
                return Err(ZipError::CorruptField(format!(
                    "{}: declared {declared} bytes but {uncompressed} were written",
                    entry.name,
                )));
            }
        }
        if let Some(declared) = entry.crc32 {
            if declared != crc32 {
                return Err(ZipError::CorruptField(format!(
                    "{}: declared CRC {declared:08x} but data hashed to {crc32:08x}",
                    entry.name,
                )));
            }
        }
        entry.crc32 = Some(crc32);
        entry.size = Some(uncompressed);
        entry.compressed_size = Some(compressed);

        let needs_zip64_sizes =
            uncompressed >= U32_SENTINEL as u64 || compressed >= U32_SENTINEL as u64;
        if needs_zip64_sizes && self.options.zip64 == Zip64Mode::Never {
            return Err(ZipError::Zip64Required(entry.name.clone()));
        }
        if needs_zip64_sizes && !open.zip64_reserved {
            // AsNeeded degraded (or sizes lied); the descriptor written
            // next would truncate them.
            return Err(ZipError::Zip64Required(entry.name.clone()));
        }

        if open.use_descriptor {
            let mut descriptor = Vec::with_capacity(24);
            spec::DataDescriptor {
                crc32,
                compressed_size: compressed,
                uncompressed_size: uncompressed,
            }
            .append_to(&mut descriptor, open.zip64_reserved);
            self.sink.write_all(&descriptor)?;
        } else if self.sink.can_patch() {
            let keep_zip64 = open.zip64_reserved
                && (needs_zip64_sizes || self.options.zip64.forced());
            // CRC and the 32-bit size slots live 14 bytes into the header.
            let mut fixup = Vec::with_capacity(12);
            crate::fields::put_u32(&mut fixup, crc32);
            if keep_zip64 {
                crate::fields::put_u32(&mut fixup, U32_SENTINEL);
                crate::fields::put_u32(&mut fixup, U32_SENTINEL);
            } else {
                crate::fields::put_u32(&mut fixup, u32_or_sentinel(compressed));
                crate::fields::put_u32(&mut fixup, u32_or_sentinel(uncompressed));
            }
            self.sink.patch(open.lfh_disk, open.lfh_offset + 14, &fixup)?;

            if keep_zip64 {
                // The Zip64 extra was written first, so its sizes sit at a
                // known spot: header + name + the extra's (id, len).
                let sizes_at = open.lfh_offset
                    + spec::LOCAL_FILE_HEADER_LEN
                    + open.name_bytes.len() as u64
                    + 4;
                let mut sizes = Vec::with_capacity(16);
                crate::fields::put_u64(&mut sizes, uncompressed);
                crate::fields::put_u64(&mut sizes, compressed);
                self.sink.patch(open.lfh_disk, sizes_at, &sizes)?;
            } else if open.zip64_reserved {
                // Reserved but unneeded: the central directory shouldn't
                // advertise Zip64 this entry doesn't use.
                let _ = entry.remove_extra(extra::ZIP64);
                open.zip64_reserved = false;
            }
        }

        if open.zip64_reserved {
            // Keep the reserved extra's values honest for the CFH.
            entry.add_extra_first(ExtraField::Zip64(Zip64Extra {
                uncompressed_size: Some(uncompressed),
                compressed_size: Some(compressed),
                ..Zip64Extra::default()
            }));
            self.zip64_entries += 1;
        }

        self.entries.push(open.entry);
        Ok(())
    }

    /// Copies a pre-compressed payload under an entry whose sizes and CRC
    /// are already known (from [`ZipArchive::read_raw`], typically).
    /// The bytes go out exactly as read; no descriptor is needed.
    ///
    /// [`ZipArchive::read_raw`]: ../read/struct.ZipArchive.html#method.read_raw
    pub fn add_raw_entry<R: Read>(&mut self, mut entry: ZipEntry, mut raw: R) -> ZipResult<()> {
        if self.finished {
            return Err(ZipError::InvalidUsage("add_raw_entry after finish"));
        }
        if self.current.is_some() {
            self.close_entry()?;
        }
        let (Some(size), Some(compressed_size), Some(crc32)) =
            (entry.size, entry.compressed_size, entry.crc32)
        else {
            return Err(ZipError::InvalidUsage(
                "raw entries need size, compressed size, and CRC up front",
            ));
        };
        let method = entry.method.unwrap_or(CompressionMethod::Stored);

        // The source archive's Zip64 decision doesn't carry over; this
        // stream re-decides under its own policy.
        let _ = entry.remove_extra(extra::ZIP64);
        let overflows =
            size >= U32_SENTINEL as u64 || compressed_size >= U32_SENTINEL as u64;
        if overflows && self.options.zip64 == Zip64Mode::Never {
            return Err(ZipError::Zip64Required(entry.name.clone()));
        }
        let zip64 = overflows || self.options.zip64.forced();
        if zip64 {
            entry.add_extra_first(ExtraField::Zip64(Zip64Extra {
                uncompressed_size: Some(size),
                compressed_size: Some(compressed_size),
                ..Zip64Extra::default()
            }));
            entry.version_required = entry.version_required.max(spec::VERSION_NEEDED_ZIP64);
            self.zip64_entries += 1;
        }
        // Sizes are inline, so no descriptor, whatever the source did.
        entry.flags.set_data_descriptor(false);

        let name_bytes = self.encode_name(&mut entry);
        let (lfh_disk, lfh_offset) = self.sink.position()?;
        entry.local_header_offset = Some(lfh_offset);
        entry.disk_number_start = lfh_disk;
        self.apply_alignment(&mut entry, lfh_offset, name_bytes.len())?;

        let extra_bytes = entry.local_extra_bytes();
        let fixed = spec::LocalFileHeaderFixed {
            minimum_extract_version: version_needed(&entry, zip64),
            flags: entry.flags.0,
            compression_method: method.code(),
            dos_datetime: crate::dostime::datetime_to_dos(&entry.time),
            crc32,
            compressed_size: if zip64 {
                U32_SENTINEL
            } else {
                compressed_size as u32
            },
            uncompressed_size: if zip64 { U32_SENTINEL } else { size as u32 },
            path_length: name_bytes.len() as u16,
            extra_field_length: extra_bytes.len() as u16,
        };
        let mut header = Vec::new();
        fixed.append_to(&mut header);
        header.extend_from_slice(&name_bytes);
        header.extend_from_slice(&extra_bytes);
        self.sink.write_all(&header)?;

        let (_, data_start) = self.sink.position()?;
        entry.data_offset = Some(data_start);

        let copied = io::copy(&mut raw, &mut self.sink)?;
        if copied != compressed_size {
            return Err(ZipError::CorruptField(format!(
                "{}: raw stream held {copied} bytes, expected {compressed_size}",
                entry.name,
            )));
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Writes the central directory and end-of-archive records.
    ///
    /// Finishing twice is an error. Returns what got written where.
    pub fn finish(&mut self) -> ZipResult<FinishReport> {
        if self.finished {
            return Err(ZipError::InvalidUsage("finish called twice"));
        }
        if self.current.is_some() {
            self.close_entry()?;
        }

        let (cd_disk, cd_offset) = self.sink.position()?;
        let mut cd_length = 0u64;
        let entry_count = self.entries.len() as u64;

        let entries = std::mem::take(&mut self.entries);
        for entry in &entries {
            cd_length += self.write_central_header(entry)?;
        }

        let (end_disk, end_offset) = self.sink.position()?;

        let zip64_archive = self.zip64_entries > 0
            || self.options.zip64.forced()
            || entry_count > U16_SENTINEL as u64
            || cd_length >= U32_SENTINEL as u64
            || cd_offset >= U32_SENTINEL as u64
            || cd_disk >= U16_SENTINEL as u32
            || end_disk >= U16_SENTINEL as u32;
        if zip64_archive && self.options.zip64 == Zip64Mode::Never {
            return Err(ZipError::Zip64Required("end of central directory".into()));
        }

        if zip64_archive {
            let mut trailer = Vec::new();
            spec::Zip64EndOfCentralDirectory {
                source_version: spec::VERSION_NEEDED_ZIP64,
                minimum_extract_version: spec::VERSION_NEEDED_ZIP64,
                disk_number: end_disk,
                disk_with_central_directory: cd_disk,
                entries_on_this_disk: entry_count,
                entries: entry_count,
                central_directory_size: cd_length,
                central_directory_offset: cd_offset,
                extensible_data: &[],
            }
            .append_to(&mut trailer);
            spec::Zip64EndOfCentralDirectoryLocator {
                disk_with_zip64_eocdr: end_disk,
                zip64_eocdr_offset: end_offset,
                disks: end_disk + 1,
            }
            .append_to(&mut trailer);
            self.sink.write_all(&trailer)?;
        }

        let comment_bytes = self
            .options
            .encoding
            .encode_lossy(&self.comment)
            .into_owned();
        let (final_disk, _) = self.sink.position()?;
        let mut eocdr = Vec::with_capacity(spec::EOCDR_MIN_LEN + comment_bytes.len());
        spec::EndOfCentralDirectory {
            disk_number: u16_or_sentinel(final_disk as u64),
            disk_with_central_directory: u16_or_sentinel(cd_disk as u64),
            entries_on_this_disk: u16_or_sentinel(entry_count),
            entries: u16_or_sentinel(entry_count),
            central_directory_size: u32_or_sentinel(cd_length),
            central_directory_offset: u32_or_sentinel(cd_offset),
            file_comment: &comment_bytes,
        }
        .append_to(&mut eocdr);
        self.sink.write_all(&eocdr)?;
        self.sink.flush()?;

        self.finished = true;
        Ok(FinishReport {
            central_directory_disk: cd_disk,
            central_directory_offset: cd_offset,
            central_directory_length: cd_length,
            entry_count,
            zip64: zip64_archive,
            degraded_to_never: self.degraded_to_never,
            segments: final_disk + 1,
        })
    }

    /// Emits one central file header; returns its length in bytes.
    fn write_central_header(&mut self, entry: &ZipEntry) -> ZipResult<u64> {
        let mut entry = entry.clone();
        let size = entry.size.unwrap_or(0);
        let compressed = entry.compressed_size.unwrap_or(0);
        let lfh_offset = entry.local_header_offset.unwrap_or(0);
        let disk = entry.disk_number_start;

        let offset_overflows = lfh_offset >= U32_SENTINEL as u64;
        let disk_overflows = disk >= U16_SENTINEL as u32;
        let sizes_overflow =
            size >= U32_SENTINEL as u64 || compressed >= U32_SENTINEL as u64;
        let needs_zip64 = sizes_overflow
            || offset_overflows
            || disk_overflows
            || entry.extra(extra::ZIP64).is_some()
            || self.options.zip64.forced();

        if needs_zip64 && self.options.zip64 == Zip64Mode::Never {
            return Err(ZipError::Zip64Required(entry.name.clone()));
        }

        // Real values where they fit under AlwaysWithCompatibility;
        // sentinels wherever the Zip64 extra speaks instead.
        let compat = self.options.zip64 == Zip64Mode::AlwaysWithCompatibility;
        let (size_slot, compressed_slot) = if needs_zip64 && !compat {
            (U32_SENTINEL, U32_SENTINEL)
        } else {
            (u32_or_sentinel(size), u32_or_sentinel(compressed))
        };
        let offset_slot = if needs_zip64 && offset_overflows {
            U32_SENTINEL
        } else {
            u32_or_sentinel(lfh_offset)
        };
        let disk_slot = if needs_zip64 && disk_overflows {
            U16_SENTINEL
        } else {
            u16_or_sentinel(disk as u64)
        };

        if needs_zip64 {
            entry.add_extra_first(ExtraField::Zip64(Zip64Extra {
                uncompressed_size: (size_slot == U32_SENTINEL).then_some(size),
                compressed_size: (compressed_slot == U32_SENTINEL).then_some(compressed),
                header_offset: (offset_slot == U32_SENTINEL).then_some(lfh_offset),
                disk_start: (disk_slot == U16_SENTINEL).then_some(disk),
            }));
        }

        let name_bytes = entry
            .raw_name
            .clone()
            .unwrap_or_else(|| entry.name.as_bytes().to_vec());
        let comment_bytes = match &entry.raw_comment {
            Some(raw) => raw.clone(),
            None => self
                .options
                .encoding
                .encode_lossy(&entry.comment)
                .into_owned(),
        };
        let extra_bytes = entry.central_extra_bytes();

        let header = spec::CentralDirectoryEntry {
            source_version: entry.version_made_by_word(),
            minimum_extract_version: version_needed(&entry, needs_zip64),
            flags: entry.flags.0,
            compression_method: entry.method.unwrap_or(CompressionMethod::Stored).code(),
            dos_datetime: crate::dostime::datetime_to_dos(&entry.time),
            crc32: entry.crc32.unwrap_or(0),
            compressed_size: compressed_slot,
            uncompressed_size: size_slot,
            disk_number: disk_slot,
            internal_file_attributes: entry.internal_attributes,
            external_file_attributes: entry.external_attributes,
            header_offset: offset_slot,
            path: &name_bytes,
            extra_field: &extra_bytes,
            file_comment: &comment_bytes,
        };
        let mut bytes = Vec::new();
        header.append_to(&mut bytes);
        self.sink.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

}

/// The "version needed to extract" an entry shaped like this.
fn version_needed(entry: &ZipEntry, zip64: bool) -> u16 {
    if zip64 {
        spec::VERSION_NEEDED_ZIP64
    } else if entry.method == Some(CompressionMethod::Deflate) || entry.is_dir() {
        spec::VERSION_NEEDED_DEFAULT
    } else {
        10
    }
}

impl<S: Sink> Write for ZipWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl<S: Sink> Drop for ZipWriter<S> {
    /// Closing an unfinished writer finishes it, so the archive on disk
    /// is well-formed; errors here can only be logged.
    fn drop(&mut self) {
        if !self.finished && (self.current.is_some() || !self.entries.is_empty()) {
            if let Err(e) = self.finish() {
                warn!("finishing a dropped ZipWriter failed: {e}");
            }
        }
    }
}
