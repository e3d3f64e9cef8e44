//! Tools for reading a ZIP archive through its central directory.
//!
//! To start reading an archive, create a [`ZipArchive`] over its bytes.
//! The load is two-pass: find the End of central directory record by
//! scanning backward, walk the central directory it points at, then visit
//! each entry's local file header to learn where its payload starts (and
//! to pick up the extra fields that only live there).
//!
//! Every per-entry reader works on its own slice of the mapping, so any
//! number of entries can be decompressed in parallel from one archive.
//!
//! [`ZipArchive`]: struct.ZipArchive.html

use std::borrow::Cow;
use std::collections::{btree_map, BTreeMap};
use std::io;

use camino::{Utf8Component, Utf8Path};
use log::*;

use crate::encoding::TextEncoding;
use crate::entry::{GeneralPurposeFlags, Platform, TextSource, ZipEntry};
use crate::extra::{self, ExtraField, ParseMode, Side};
use crate::fields::{usize, U16_SENTINEL, U32_SENTINEL};
use crate::method::{self, CompressionMethod};
use crate::result::*;
use crate::spec;

/// Knobs for opening an archive. The defaults suit almost everything.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Encoding for names and comments whose UTF-8 flag is clear.
    pub encoding: TextEncoding,
    /// What to do about malformed extra fields.
    pub parse_mode: ParseMode,
    /// Upper bound on split-archive segments.
    pub max_segments: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::default(),
            parse_mode: ParseMode::default(),
            max_segments: 64,
        }
    }
}

/// An address inside a (possibly split) archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Location {
    pub disk: u32,
    pub offset: u64,
}

/// The bytes of an archive: one mapping, or one per split segment in
/// segment order.
#[derive(Debug, Clone)]
pub(crate) struct SegmentedMapping<'a> {
    segments: Vec<&'a [u8]>,
}

impl<'a> SegmentedMapping<'a> {
    fn new(segments: Vec<&'a [u8]>) -> Self {
        debug_assert!(!segments.is_empty());
        Self { segments }
    }

    fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    fn last(&self) -> &'a [u8] {
        self.segments[self.segments.len() - 1]
    }

    fn segment(&self, disk: u32) -> ZipResult<&'a [u8]> {
        self.segments
            .get(disk as usize)
            .copied()
            .ok_or_else(|| {
                ZipError::CorruptField(format!(
                    "reference to segment {disk} of a {}-segment archive",
                    self.segments.len(),
                ))
            })
    }

    /// A view of `len` bytes at the given address, chaining into following
    /// segments if the run crosses a boundary.
    fn contiguous(&self, at: Location, len: u64) -> ZipResult<Cow<'a, [u8]>> {
        let segment = self.segment(at.disk)?;
        let start = usize(at.offset)?;
        let len = usize(len)?;
        if start > segment.len() {
            return Err(ZipError::Truncated("offset past the end of its segment"));
        }
        if segment.len() - start >= len {
            return Ok(Cow::Borrowed(&segment[start..start + len]));
        }
        // Spanned: concatenate across segments.
        let mut buffer = Vec::with_capacity(len);
        buffer.extend_from_slice(&segment[start..]);
        let mut disk = at.disk + 1;
        while buffer.len() < len {
            let next = self.segment(disk)?;
            let take = (len - buffer.len()).min(next.len());
            buffer.extend_from_slice(&next[..take]);
            disk += 1;
        }
        Ok(Cow::Owned(buffer))
    }

    /// A `Read` over `len` bytes at the given address; borrows the
    /// segments, so readers for different entries are independent.
    fn reader(&self, at: Location, len: u64) -> ZipResult<SegmentReader<'a>> {
        let segment = self.segment(at.disk)?;
        let start = usize(at.offset)?;
        if start > segment.len() {
            return Err(ZipError::Truncated("offset past the end of its segment"));
        }
        Ok(SegmentReader {
            segments: self.segments.clone(),
            disk: at.disk as usize,
            offset: start,
            remaining: len,
        })
    }
}

/// A bounded reader over a run of bytes that may span split segments.
pub(crate) struct SegmentReader<'a> {
    segments: Vec<&'a [u8]>,
    disk: usize,
    offset: usize,
    remaining: u64,
}

impl io::Read for SegmentReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.remaining > 0 {
            let Some(segment) = self.segments.get(self.disk) else {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "entry data ran past the last segment",
                ));
            };
            let available = segment.len() - self.offset;
            if available == 0 {
                self.disk += 1;
                self.offset = 0;
                continue;
            }
            let take = buf
                .len()
                .min(available)
                .min(self.remaining.min(usize::MAX as u64) as usize);
            buf[..take].copy_from_slice(&segment[self.offset..self.offset + take]);
            self.offset += take;
            self.remaining -= take as u64;
            return Ok(take);
        }
        Ok(0)
    }
}

/// A ZIP archive to be read
///
/// Reading is lock-free: each [`ZipArchive::read`] call hands back a
/// reader over its own slice of the mapping, so multiple threads can
/// decompress entries of a shared archive concurrently.
#[derive(Debug)]
pub struct ZipArchive<'a> {
    /// The contents of the ZIP archive.
    mapping: SegmentedMapping<'a>,
    /// Entries in central-directory order.
    entries: Vec<ZipEntry>,
    /// The archive comment, decoded.
    comment: String,
    /// The archive comment as stored.
    raw_comment: Vec<u8>,
    /// Encoding used for names with a clear UTF-8 flag.
    options: ReadOptions,
    /// Did the archive use any Zip64 structure?
    zip64: bool,
    /// Bytes prepended before the nominal offsets (self-extractor stubs).
    archive_offset: u64,
    /// Where the central directory starts.
    cd_start: Location,
    /// Central directory length in bytes.
    cd_size: u64,
    /// Where the first local file header lives; everything before it is
    /// the preamble.
    first_lfh_offset: u64,
}

impl<'a> ZipArchive<'a> {
    /// Reads a ZIP archive from a byte slice.
    /// Smaller files can be read into a buffer.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use zipwire::*;
    /// let bytes = fs::read("foo.zip")?;
    /// let archive = ZipArchive::new(&bytes)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// For larger ones, memory map!
    /// ```no_run
    /// # use std::fs::{self, File};
    /// # use memmap2::Mmap;
    /// # use zipwire::*;
    /// let zip_file = File::open("foo.zip")?;
    /// let mapping = unsafe { Mmap::map(&zip_file)? };
    /// let archive = ZipArchive::new(&mapping)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(mapping: &'a [u8]) -> ZipResult<Self> {
        Self::with_options(mapping, ReadOptions::default())
    }

    /// Like [`ZipArchive::new`], with explicit [`ReadOptions`].
    pub fn with_options(mapping: &'a [u8], options: ReadOptions) -> ZipResult<Self> {
        Self::load(SegmentedMapping::new(vec![mapping]), options)
    }

    /// Opens a split archive from its segments, in order
    /// (`.z01`, `.z02`, ..., `.zip` last).
    pub fn split(segments: Vec<&'a [u8]>, options: ReadOptions) -> ZipResult<Self> {
        if segments.is_empty() {
            return Err(ZipError::InvalidUsage("a split archive needs segments"));
        }
        if segments.len() as u64 > options.max_segments as u64 {
            return Err(ZipError::UnsupportedArchive(format!(
                "{} segments exceed the configured limit of {}",
                segments.len(),
                options.max_segments,
            )));
        }
        Self::load(SegmentedMapping::new(segments), options)
    }

    fn load(mapping: SegmentedMapping<'a>, options: ReadOptions) -> ZipResult<Self> {
        let split = mapping.segment_count() > 1;
        let last = mapping.last();
        let eocdr_posit = spec::find_eocdr(last)?;
        let eocdr = spec::EndOfCentralDirectory::parse(&last[eocdr_posit..])?;
        trace!("{:?}", eocdr);

        if !split && eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(ZipError::UnsupportedArchive(format!(
                "split archive opened as a single file: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }

        let mut zip64 = false;
        let cd_start: Location;
        let cd_size: u64;
        let entry_count: u64;
        // Zip files can be prepended by arbitrary junk,
        // so all the given positions might be off.
        // Calculate the offset. (Splits don't get junk; their addressing
        // is exact.)
        let mut archive_offset = 0u64;

        let zip64_eocdr_locator_posit =
            eocdr_posit.checked_sub(spec::Zip64EndOfCentralDirectoryLocator::size_in_file());
        let locator = zip64_eocdr_locator_posit
            .and_then(|posit| spec::Zip64EndOfCentralDirectoryLocator::parse(&last[posit..]));

        if let Some(locator) = locator {
            trace!("{:?}", locator);
            zip64 = true;

            if locator.disks > options.max_segments {
                return Err(ZipError::UnsupportedArchive(format!(
                    "Zip64 locator reports {} disks, over the configured limit of {}",
                    locator.disks, options.max_segments,
                )));
            }
            if !split && locator.disks > 1 {
                return Err(ZipError::UnsupportedArchive(format!(
                    "split archive opened as a single file: Zip64 locator reports {} disks",
                    locator.disks
                )));
            }

            let zip64_eocdr = if split {
                let segment = mapping.segment(locator.disk_with_zip64_eocdr)?;
                let posit = usize(locator.zip64_eocdr_offset)?;
                if posit >= segment.len() {
                    return Err(ZipError::Truncated("Zip64 EOCDR offset out of range"));
                }
                spec::Zip64EndOfCentralDirectory::parse(&segment[posit..])?
            } else {
                // Search for the zip64 EOCDR from its nominal starting
                // position to the end of where it could be; anything it
                // moved by is the prepended-junk offset.
                let search_start = usize(locator.zip64_eocdr_offset)?;
                let search_end = zip64_eocdr_locator_posit.unwrap();
                if search_start > search_end {
                    return Err(ZipError::CorruptField(
                        "Zip64 EOCDR offset points past its locator".into(),
                    ));
                }
                let search_space = &last[search_start..search_end];
                let posit = spec::find_zip64_eocdr(search_space)?;
                archive_offset = posit as u64;
                spec::Zip64EndOfCentralDirectory::parse(&search_space[posit..])?
            };

            trace!("{:?}", zip64_eocdr);
            cd_start = Location {
                disk: zip64_eocdr.disk_with_central_directory,
                offset: zip64_eocdr.central_directory_offset + archive_offset,
            };
            cd_size = zip64_eocdr.central_directory_size;
            entry_count = zip64_eocdr.entries;
        } else if !split {
            // The offset is the actual position versus the stored one.
            let actual_cdr_posit = eocdr_posit.checked_sub(usize(eocdr.central_directory_size)?);
            let nominal_offset = usize(eocdr.central_directory_offset)?;
            archive_offset = actual_cdr_posit
                .and_then(|off| off.checked_sub(nominal_offset))
                .ok_or(ZipError::CorruptField(
                    "Invalid central directory size or offset".into(),
                ))? as u64;
            cd_start = Location {
                disk: 0,
                offset: eocdr.central_directory_offset as u64 + archive_offset,
            };
            cd_size = eocdr.central_directory_size as u64;
            entry_count = eocdr.entries as u64;
        } else {
            cd_start = Location {
                disk: eocdr.disk_with_central_directory as u32,
                offset: eocdr.central_directory_offset as u64,
            };
            cd_size = eocdr.central_directory_size as u64;
            entry_count = eocdr.entries as u64;
        }

        trace!("{} entries at {:?}", entry_count, cd_start);

        let central_directory = mapping.contiguous(cd_start, cd_size)?;
        let mut remaining: &[u8] = &central_directory;

        let mut entries = Vec::with_capacity(usize(entry_count)?);

        // Walk headers while the signature holds rather than trusting the
        // count; some archivers get the count wrong before Zip64 kicks in.
        while remaining.len() >= 4 && remaining[..4] == spec::CENTRAL_DIRECTORY_MAGIC {
            let dir_entry = spec::CentralDirectoryEntry::parse_and_consume(&mut remaining)?;
            trace!("{:?}", dir_entry);

            let entry = entry_from_central(&dir_entry, &options)?;
            if entry.extra(extra::ZIP64).is_some() {
                zip64 = true;
            }
            debug!("{:?}", entry.name);
            entries.push(entry);
        }

        if entries.len() as u64 != entry_count {
            warn!(
                "central directory holds {} entries, but the end record claims {}",
                entries.len(),
                entry_count,
            );
        }

        let mut archive = ZipArchive {
            mapping,
            entries,
            comment: options.encoding.decode(eocdr.file_comment).into_owned(),
            raw_comment: eocdr.file_comment.to_vec(),
            options,
            zip64,
            archive_offset,
            cd_start,
            cd_size,
            first_lfh_offset: 0,
        };
        archive.resolve_local_headers()?;
        Ok(archive)
    }

    /// Visits every entry's local file header to find its data offset,
    /// merge local-only extra fields, and check it doesn't run into the
    /// central directory.
    fn resolve_local_headers(&mut self) -> ZipResult<()> {
        let mut first_lfh = None;
        for entry in &mut self.entries {
            let lfh_at = Location {
                disk: entry.disk_number_start,
                offset: entry
                    .local_header_offset
                    .expect("central parse always sets the offset")
                    + self.archive_offset,
            };
            // Two reads: the fixed part names the variable lengths. Going
            // through `contiguous` keeps headers that straddle a split
            // boundary working.
            let fixed_bytes = self
                .mapping
                .contiguous(lfh_at, spec::LOCAL_FILE_HEADER_LEN)
                .map_err(|e| e.for_entry(&entry.name))?;
            let mut fixed_slice: &[u8] = &fixed_bytes;
            if fixed_slice[..4] != spec::LOCAL_FILE_HEADER_MAGIC {
                return Err(ZipError::BadSignature("Invalid local file header")
                    .for_entry(&entry.name));
            }
            fixed_slice = &fixed_slice[4..];
            let fixed = spec::LocalFileHeaderFixed::parse_and_consume(&mut fixed_slice)?;
            let variable = self
                .mapping
                .contiguous(
                    Location {
                        disk: lfh_at.disk,
                        offset: lfh_at.offset + spec::LOCAL_FILE_HEADER_LEN,
                    },
                    fixed.path_length as u64 + fixed.extra_field_length as u64,
                )
                .map_err(|e| e.for_entry(&entry.name))?;
            let (path, extra_field) = variable.split_at(fixed.path_length as usize);
            let local_header = spec::LocalFileHeader {
                fixed,
                path,
                extra_field,
            };
            trace!("{:?}", local_header);

            let data_offset = lfh_at.offset
                + spec::LOCAL_FILE_HEADER_LEN
                + local_header.fixed.path_length as u64
                + local_header.fixed.extra_field_length as u64;
            entry.data_offset = Some(data_offset);

            merge_local_extras(entry, &local_header, self.options.parse_mode)?;
            entry.apply_unicode_extras();

            // Nothing may overlap the central directory.
            let compressed = entry.compressed_size.unwrap_or(0);
            if lfh_at.disk == self.cd_start.disk
                && data_offset + compressed > self.cd_start.offset
            {
                return Err(ZipError::CorruptField(format!(
                    "{}: data overlaps central directory",
                    entry.name,
                )));
            }

            if lfh_at.disk == 0 {
                first_lfh = Some(first_lfh.map_or(lfh_at.offset, |f: u64| f.min(lfh_at.offset)));
            }
        }
        self.first_lfh_offset = first_lfh.unwrap_or(if self.cd_start.disk == 0 {
            self.cd_start.offset
        } else {
            0
        });
        Ok(())
    }

    /// Returns the entries found in the ZIP archive's central directory,
    /// in central-directory order.
    ///
    /// No effort is made to deduplicate or otherwise validate these entries.
    /// To do that, create a [`FileTree`].
    ///
    /// [`FileTree`]: trait.FileTree.html
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// The entries sorted by where their bytes actually sit in the file:
    /// `(segment, local header offset)`.
    pub fn entries_in_physical_order(&self) -> Vec<&ZipEntry> {
        let mut ordered: Vec<&ZipEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| (e.disk_number_start, e.local_header_offset));
        ordered
    }

    /// The archive comment, decoded with the configured encoding.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// The archive comment as stored.
    pub fn raw_comment(&self) -> &[u8] {
        &self.raw_comment
    }

    /// Did the archive use any Zip64 structure?
    pub fn zip64_used(&self) -> bool {
        self.zip64
    }

    /// How many segments the archive spans (1 for a normal file).
    pub fn segment_count(&self) -> u32 {
        self.mapping.segment_count()
    }

    /// The bytes before the first local file header: a self-extractor
    /// stub, a split marker, or nothing at all.
    pub fn preamble(&self) -> ZipResult<Cow<'a, [u8]>> {
        self.mapping
            .contiguous(Location { disk: 0, offset: 0 }, self.first_lfh_offset)
    }

    /// Reads the given file from the ZIP archive.
    ///
    /// Since each file in a ZIP archive is compressed independently,
    /// multiple files can be read in parallel.
    pub fn read(&self, entry: &ZipEntry) -> ZipResult<Box<dyn io::Read + Send + 'a>> {
        if entry.flags.encrypted() || entry.flags.strong_encryption() {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                entry.name
            )));
        }

        #[cfg(feature = "check-local-metadata")]
        self.check_local_metadata(entry)?;

        let method = entry.method.unwrap_or(CompressionMethod::Stored);
        let crc32 = entry.crc32.unwrap_or(0);
        let raw = self.raw_reader(entry)?;
        method::make_reader(method, crc32, &entry.name, raw)
    }

    /// Reads the entry's stored bytes without decompressing them,
    /// for archive-to-archive copies that keep the compression as-is.
    pub fn read_raw(&self, entry: &ZipEntry) -> ZipResult<Box<dyn io::Read + Send + 'a>> {
        Ok(Box::new(self.raw_reader(entry)?))
    }

    fn raw_reader(&self, entry: &ZipEntry) -> ZipResult<SegmentReader<'a>> {
        let data_offset = entry
            .data_offset
            .ok_or(ZipError::InvalidUsage("entry has no resolved data offset"))?;
        let compressed = entry
            .compressed_size
            .ok_or(ZipError::InvalidUsage("entry has no compressed size"))?;
        self.mapping.reader(
            Location {
                disk: entry.disk_number_start,
                offset: data_offset,
            },
            compressed,
        )
    }

    /// Cross-checks the local header against the central directory record.
    #[cfg(feature = "check-local-metadata")]
    fn check_local_metadata(&self, entry: &ZipEntry) -> ZipResult<()> {
        let lfh_at = Location {
            disk: entry.disk_number_start,
            offset: entry.local_header_offset.unwrap_or(0) + self.archive_offset,
        };
        let header_bytes = self.mapping.contiguous(
            lfh_at,
            spec::LOCAL_FILE_HEADER_LEN + entry.raw_name.as_deref().map_or(0, |n| n.len() as u64),
        )?;
        let mut fixed_slice = &header_bytes[4..];
        let fixed = spec::LocalFileHeaderFixed::parse_and_consume(&mut fixed_slice)?;
        let matches_name = entry
            .raw_name
            .as_deref()
            .map_or(true, |raw| *raw == header_bytes[spec::LOCAL_FILE_HEADER_LEN as usize..]);
        let matches_method = entry
            .method
            .map_or(true, |m| m.code() == fixed.compression_method);
        if !matches_name || !matches_method {
            return Err(ZipError::CorruptField(format!(
                "{}: central directory entry doesn't match local file header",
                entry.name,
            )));
        }
        Ok(())
    }
}

/// Builds a [`ZipEntry`] from one central directory record.
fn entry_from_central(
    cde: &spec::CentralDirectoryEntry<'_>,
    options: &ReadOptions,
) -> ZipResult<ZipEntry> {
    let flags = GeneralPurposeFlags(cde.flags);

    let name: String = if flags.utf8() {
        std::str::from_utf8(cde.path)?.to_owned()
    } else {
        options.encoding.decode(cde.path).into_owned()
    };
    let comment: String = if flags.utf8() {
        std::str::from_utf8(cde.file_comment)?.to_owned()
    } else {
        options.encoding.decode(cde.file_comment).into_owned()
    };
    let text_source = if flags.utf8() {
        TextSource::Utf8Flag
    } else {
        TextSource::Raw
    };

    let mut entry = ZipEntry::new(name);
    entry.raw_name = Some(cde.path.to_vec());
    entry.name_source = text_source;
    entry.comment = comment;
    entry.raw_comment = Some(cde.file_comment.to_vec());
    entry.comment_source = text_source;
    entry.flags = flags;
    entry.method = Some(CompressionMethod::from_code(cde.compression_method));
    entry.crc32 = Some(cde.crc32);
    entry.size = Some(cde.uncompressed_size as u64);
    entry.compressed_size = Some(cde.compressed_size as u64);
    entry.platform = Platform::from_code((cde.source_version >> 8) as u8);
    entry.version_made_by = (cde.source_version & 0xFF) as u8;
    entry.version_required = cde.minimum_extract_version;
    entry.internal_attributes = cde.internal_file_attributes;
    entry.external_attributes = cde.external_file_attributes;
    entry.disk_number_start = cde.disk_number as u32;
    entry.local_header_offset = Some(cde.header_offset as u64);
    entry.time = crate::dostime::dos_to_datetime(cde.dos_datetime)
        .unwrap_or_else(crate::dostime::dos_epoch);

    // Now that the sentinel slots are in place, the central extras can be
    // parsed (the Zip64 payload's contents depend on them) and applied.
    entry
        .set_central_extra(cde.extra_field, options.parse_mode)
        .map_err(|e| e.for_entry(&entry.name))?;
    entry.apply_zip64();

    // A 0xFFFF disk start outside any Zip64 extra would address nothing.
    if entry.disk_number_start == U16_SENTINEL as u32
        && !matches!(entry.extra(extra::ZIP64), Some(ExtraField::Zip64(z)) if z.disk_start.is_some())
    {
        return Err(ZipError::CorruptField(format!(
            "{}: disk start is the Zip64 sentinel but no Zip64 extra supplies it",
            entry.name,
        )));
    }

    Ok(entry)
}

/// Merges an entry's local-header extras into it.
///
/// The Zip64 field needs care: its local payload is only authoritative
/// when the local header's own 32-bit size slots hold sentinels. A writer
/// that reserved Zip64 space but rewrote real sizes in place leaves a
/// zero-filled Zip64 extra behind, and honoring it would wipe the good
/// central-directory sizes.
fn merge_local_extras(
    entry: &mut ZipEntry,
    local_header: &spec::LocalFileHeader<'_>,
    mode: ParseMode,
) -> ZipResult<()> {
    let mut parsed = extra::parse(
        local_header.extra_field,
        Side::Local,
        mode,
        entry.zip64_context(),
    )
    .map_err(|e| e.for_entry(&entry.name))?;

    let local_sizes_are_sentinels = local_header.fixed.uncompressed_size == U32_SENTINEL
        || local_header.fixed.compressed_size == U32_SENTINEL;
    if !local_sizes_are_sentinels {
        parsed
            .fields
            .retain(|field| !matches!(field, ExtraField::Zip64(_)));
    }

    entry.merge_extras(parsed, Side::Local);
    if local_sizes_are_sentinels {
        entry.apply_zip64();
    }
    Ok(())
}

/// Maps a directory's child paths to the respective entries.
pub type DirectoryContents<'a> = BTreeMap<&'a str, DirectoryEntry<'a>>;

/// A directory in a ZipArchive, including its metadata and its contents.
#[derive(Debug)]
pub struct Directory<'a> {
    pub entry: &'a ZipEntry,
    pub children: DirectoryContents<'a>,
}

impl<'a> Directory<'a> {
    fn new(entry: &'a ZipEntry) -> Self {
        Self {
            entry,
            children: DirectoryContents::new(),
        }
    }
}

/// A file or directory in a [`FileTree`]
///
/// [`FileTree`]: trait.FileTree.html
#[derive(Debug)]
pub enum DirectoryEntry<'a> {
    File(&'a ZipEntry),
    Directory(Directory<'a>),
}

impl<'a> DirectoryEntry<'a> {
    /// Returns the metadata of the entry.
    pub fn entry(&self) -> &'a ZipEntry {
        match &self {
            DirectoryEntry::File(entry) => entry,
            DirectoryEntry::Directory(dir) => dir.entry,
        }
    }

    fn name(&self) -> &'a str {
        let path = Utf8Path::new(&self.entry().name);
        path.file_name().expect("Path ended in ..")
    }
}

/// Given entries from [`ZipArchive::entries()`],
/// organize them into a tree of nested directories and files.
///
/// This does two things:
///
/// 1. It makes files easier to look up by path
///
/// 2. It validates the archive, making sure each entry has a valid path,
///    no duplicates, etc. (The ZIP file format makes no promises here.)
///
/// [`ZipArchive::entries()`]: struct.ZipArchive.html#method.entries
pub fn as_tree<'a>(entries: &'a [ZipEntry]) -> ZipResult<DirectoryContents<'a>> {
    let mut contents = DirectoryContents::new();

    for entry in entries {
        entree_entry(entry, &mut contents)?;
    }

    Ok(contents)
}

pub trait FileTree<'a> {
    /// Looks up a file or directory by its path.
    fn lookup<P: AsRef<Utf8Path>>(&self, path: P) -> ZipResult<&'a ZipEntry>;

    /// Returns an iterator over the entries in the tree, sorted by path.
    fn traverse<'b>(&'b self) -> TreeIterator<'a, 'b>;

    /// Returns an iterator over the files in the tree, sorted by path.
    fn files<'b>(&'b self) -> FileTreeIterator<'a, 'b>;

    /// Returns an iterator over the directories in the tree, sorted by path.
    fn directories<'b>(&'b self) -> DirectoryTreeIterator<'a, 'b>;
}

impl<'a> FileTree<'a> for DirectoryContents<'a> {
    fn lookup<P: AsRef<Utf8Path>>(&self, path: P) -> ZipResult<&'a ZipEntry> {
        let path = path.as_ref();
        let parent_dir = if let Some(parent) = path.parent() {
            match walk_parent_directories(parent, self) {
                Err(ZipError::NoSuchFile(_)) => Err(ZipError::NoSuchFile(path.to_owned())),
                other_result => other_result,
            }?
        } else {
            self
        };

        let base = path
            .file_name()
            .ok_or_else(|| ZipError::InvalidPath(format!("Path {} ended in ..", path)))?;

        parent_dir
            .get(base)
            .ok_or_else(|| ZipError::NoSuchFile(path.to_owned()))
            .map(|dir_entry| dir_entry.entry())
    }

    fn traverse<'b>(&'b self) -> TreeIterator<'a, 'b> {
        TreeIterator::new(self)
    }

    fn files<'b>(&'b self) -> FileTreeIterator<'a, 'b> {
        FileTreeIterator::new(self)
    }

    fn directories<'b>(&'b self) -> DirectoryTreeIterator<'a, 'b> {
        DirectoryTreeIterator::new(self)
    }
}

/// Places the given entry in the given directory tree.
fn entree_entry<'a>(entry: &'a ZipEntry, tree: &mut DirectoryContents<'a>) -> ZipResult<()> {
    let path = Utf8Path::new(&entry.name);

    let parent_dir = if let Some(parent) = path.parent() {
        walk_parent_directories_mut(parent, tree)?
    } else {
        tree
    };

    // Check: Path doesn't end in something weird.
    let _base = path
        .file_name()
        .ok_or_else(|| ZipError::Hierarchy(format!("Path {path} ended in ..")))?;

    let to_insert: DirectoryEntry = if entry.is_dir() {
        DirectoryEntry::Directory(Directory::new(entry))
    } else {
        DirectoryEntry::File(entry)
    };

    if parent_dir.insert(to_insert.name(), to_insert).is_some() {
        return Err(ZipError::Hierarchy(format!("Duplicate entry for {path}",)));
    }

    Ok(())
}

/// Used by `entree_entry()` to reach the directory where we'll insert a new entry.
fn walk_parent_directories_mut<'a, 'b>(
    path: &Utf8Path,
    tree: &'b mut DirectoryContents<'a>,
) -> ZipResult<&'b mut DirectoryContents<'a>> {
    let mut current = tree;

    for component in path.components() {
        match component {
            Utf8Component::Prefix(prefix) => {
                let prefix = prefix.as_os_str();
                return Err(ZipError::Hierarchy(format!(
                    "Prefix {} found in path {path}",
                    prefix.to_string_lossy(),
                )));
            }
            Utf8Component::RootDir => {
                warn!("Root directory found in path {path}");
                // Huh. Keep going.
            }
            Utf8Component::CurDir => {
                warn!("Current dir (.) found in path {path}");
                // Huh. Keep going.
            }
            Utf8Component::ParentDir => {
                // We could canonicalize it somewhere down the road.
                // Path::canonicalize() doesn't work because it tries
                // to actually resolve the path
                // (and failing if something doesn't exist there).
                // Maybe try https://crates.io/crates/path-clean some time?
                return Err(ZipError::Hierarchy(format!(
                    "Parent dir (..) found in path {path}",
                )));
            }

            Utf8Component::Normal(component) => {
                if let Some(child) = current.get_mut(component) {
                    match child {
                        DirectoryEntry::Directory(dir) => {
                            current = &mut dir.children;
                        }
                        _ => {
                            return Err(ZipError::Hierarchy(format!(
                                "{path} is a file, expected a directory",
                            )));
                        }
                    }
                } else {
                    return Err(ZipError::Hierarchy(format!(
                        "{path} found before parent directories",
                    )));
                }
            }
        }
    }
    Ok(current)
}

/// Used by `FileTree::lookup()` to walk the tree to the parent directory
/// where the desired file lives.
///
/// Consequently, this assumes that `path` is provided by the user,
/// and emits errors accordingly.
fn walk_parent_directories<'a, 'b>(
    path: &Utf8Path,
    tree: &'b DirectoryContents<'a>,
) -> ZipResult<&'b DirectoryContents<'a>> {
    let mut current = tree;

    for component in path.components() {
        // The path is coming from the user, not the ZIP archive.
        // So, unlike walk_parent_directories_mut(), revolt over weird stuff.
        match component {
            Utf8Component::Prefix(prefix) => {
                return Err(ZipError::InvalidPath(format!(
                    "Prefix {prefix} found in path {path}",
                )));
            }
            Utf8Component::RootDir => {
                return Err(ZipError::InvalidPath(format!(
                    "Root directory found in path {path}",
                )));
            }
            Utf8Component::CurDir => {
                return Err(ZipError::InvalidPath(format!(
                    "Current dir (.) found in path {path}",
                )));
            }
            Utf8Component::ParentDir => {
                return Err(ZipError::InvalidPath(format!(
                    "Parent dir (..) found in path {path}",
                )));
            }

            Utf8Component::Normal(component) => {
                if let Some(child) = current.get(component) {
                    match child {
                        DirectoryEntry::Directory(dir) => {
                            current = &dir.children;
                        }
                        _ => {
                            return Err(ZipError::InvalidPath(format!(
                                "{path} is a file, expected a directory",
                            )));
                        }
                    }
                } else {
                    return Err(ZipError::NoSuchFile(path.to_owned()));
                }
            }
        }
    }
    Ok(current)
}

/// Iterates over all files and directories in a [`FileTree`]
///
/// [`FileTree`]: trait.FileTree.html
pub struct TreeIterator<'a, 'b> {
    stack: Vec<btree_map::Values<'b, &'a str, DirectoryEntry<'a>>>,
}

impl<'a, 'b> TreeIterator<'a, 'b> {
    fn new(tree: &'b DirectoryContents<'a>) -> Self {
        let stack = vec![tree.values()];
        Self { stack }
    }
}

impl<'a, 'b> Iterator for TreeIterator<'a, 'b> {
    type Item = &'b DirectoryEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stack.is_empty() {
            return None;
        }
        let next = self.stack.last_mut().unwrap().next();
        match next {
            Some(entry) => {
                if let DirectoryEntry::Directory(d) = entry {
                    self.stack.push(d.children.values());
                }
                return Some(entry);
            }
            None => {
                self.stack.pop();
            }
        };
        self.next()
    }
}

/// Iterates over all files in a [`FileTree`]
///
/// [`FileTree`]: trait.FileTree.html
pub struct FileTreeIterator<'a, 'b> {
    inner: TreeIterator<'a, 'b>,
}

impl<'a, 'b> FileTreeIterator<'a, 'b> {
    fn new(tree: &'b DirectoryContents<'a>) -> Self {
        Self {
            inner: TreeIterator::new(tree),
        }
    }
}

impl<'a> Iterator for FileTreeIterator<'a, '_> {
    type Item = &'a ZipEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.stack.is_empty() {
            return None;
        }
        let next = self.inner.stack.last_mut().unwrap().next();
        match next {
            Some(DirectoryEntry::File(f)) => {
                return Some(f);
            }
            Some(DirectoryEntry::Directory(d)) => {
                self.inner.stack.push(d.children.values());
            }
            None => {
                self.inner.stack.pop();
            }
        };
        self.next()
    }
}

/// Iterates over all directories in a [`FileTree`]
///
/// [`FileTree`]: trait.FileTree.html
pub struct DirectoryTreeIterator<'a, 'b> {
    inner: TreeIterator<'a, 'b>,
}

impl<'a, 'b> DirectoryTreeIterator<'a, 'b> {
    fn new(tree: &'b DirectoryContents<'a>) -> Self {
        Self {
            inner: TreeIterator::new(tree),
        }
    }
}

impl<'a, 'b> Iterator for DirectoryTreeIterator<'a, 'b> {
    type Item = &'b Directory<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.stack.is_empty() {
            return None;
        }
        let next = self.inner.stack.last_mut().unwrap().next();
        match next {
            Some(DirectoryEntry::Directory(d)) => {
                self.inner.stack.push(d.children.values());
                return Some(d);
            }
            Some(DirectoryEntry::File(_f)) => {}
            None => {
                self.inner.stack.pop();
            }
        };
        self.next()
    }
}
