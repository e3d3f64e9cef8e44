//! The archive entry model: one record per member, shared by both readers
//! and the writer.
//!
//! An entry starts life in a reader (preferably from the central
//! directory), or empty in a caller's hands on its way to the writer.
//! Either way the invariants are the same:
//!
//! * at most one extra field per header id, insertion order preserved;
//! * the unparseable tail, if any, is singular and always last;
//! * if the data-descriptor flag is set, the local header's CRC and sizes
//!   are zero and the authoritative values follow the payload;
//! * a value too big for its 32-bit (or 16-bit) wire slot means a Zip64
//!   extra holds the real one.

use chrono::NaiveDateTime;

use crate::dostime;
use crate::extra::{self, ExtraField, ParseMode, ParsedExtras, Side, UnrecognizedExtra,
                   Zip64Context, Zip64Extra};
use crate::fields::{U16_SENTINEL, U32_SENTINEL};
use crate::method::CompressionMethod;
use crate::result::*;

/// The entry's 16-bit general purpose bit flag.
///
/// | Bit | Meaning |
/// |---|---|
/// | 0 | encrypted |
/// | 1-2 | method-specific (deflate level; implode dictionary size) |
/// | 3 | data descriptor present; LFH sizes are zero |
/// | 6 | strong encryption |
/// | 11 | names and comment are UTF-8 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneralPurposeFlags(pub u16);

impl GeneralPurposeFlags {
    const ENCRYPTED: u16 = 1;
    const DATA_DESCRIPTOR: u16 = 1 << 3;
    const STRONG_ENCRYPTION: u16 = 1 << 6;
    const UTF8: u16 = 1 << 11;

    pub fn encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn data_descriptor(self) -> bool {
        self.0 & Self::DATA_DESCRIPTOR != 0
    }

    pub fn strong_encryption(self) -> bool {
        self.0 & Self::STRONG_ENCRYPTION != 0
    }

    pub fn utf8(self) -> bool {
        self.0 & Self::UTF8 != 0
    }

    pub fn set_data_descriptor(&mut self, on: bool) {
        if on {
            self.0 |= Self::DATA_DESCRIPTOR;
        } else {
            self.0 &= !Self::DATA_DESCRIPTOR;
        }
    }

    pub fn set_utf8(&mut self, on: bool) {
        if on {
            self.0 |= Self::UTF8;
        } else {
            self.0 &= !Self::UTF8;
        }
    }
}

/// The OS a file in the archive was made on, from the top byte of
/// "version made by". Decides how [`ZipEntry::external_attributes`] is
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// MS-DOS and OS/2 (FAT / VFAT / FAT32 file systems)
    #[default]
    Fat,
    /// UNIX: the top half of the external attributes is a POSIX mode
    Unix,
    /// Anything else the APPNOTE's host table names
    Other(u8),
}

impl Platform {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Platform::Fat,
            3 => Platform::Unix,
            other => Platform::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Platform::Fat => 0,
            Platform::Unix => 3,
            Platform::Other(code) => code,
        }
    }
}

/// Where an entry's decoded name (or comment) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSource {
    /// Decoded from the raw header bytes with the configured encoding.
    #[default]
    Raw,
    /// The general purpose UTF-8 flag was set.
    Utf8Flag,
    /// A Unicode path/comment extra field supplied the text.
    UnicodeExtra,
}

/// Metadata for one file or directory in the archive.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    /// Decoded name; a trailing `/` denotes a directory.
    pub name: String,
    /// The undecoded name bytes, kept for byte-exact round trips.
    pub raw_name: Option<Vec<u8>>,
    pub name_source: TextSource,

    pub comment: String,
    pub raw_comment: Option<Vec<u8>>,
    pub comment_source: TextSource,

    /// `None` until the caller or a header says otherwise.
    pub method: Option<CompressionMethod>,
    pub size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub crc32: Option<u32>,

    pub flags: GeneralPurposeFlags,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub platform: Platform,
    /// The low byte of "version made by"; [`Self::platform`] is the high one.
    pub version_made_by: u8,
    pub version_required: u16,

    pub local_header_offset: Option<u64>,
    /// Where the entry's payload starts, once the local header was read.
    pub data_offset: Option<u64>,
    pub disk_number_start: u32,

    /// Power-of-two data alignment to request from the writer; 0 or 1
    /// means none.
    pub alignment: u16,

    /// Wall-clock modification time, stored with 2-second DOS resolution.
    pub time: NaiveDateTime,

    /// False when the payload can't be read without the central directory
    /// (a streamed STORED entry with a data descriptor).
    pub stream_contiguous: bool,

    extras: Vec<ExtraField>,
    unparseable: Option<Vec<u8>>,
}

impl ZipEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_name: None,
            name_source: TextSource::default(),
            comment: String::new(),
            raw_comment: None,
            comment_source: TextSource::default(),
            method: None,
            size: None,
            compressed_size: None,
            crc32: None,
            flags: GeneralPurposeFlags::default(),
            internal_attributes: 0,
            external_attributes: 0,
            platform: Platform::default(),
            version_made_by: 20,
            version_required: 0,
            local_header_offset: None,
            data_offset: None,
            disk_number_start: 0,
            alignment: 0,
            time: dostime::dos_epoch(),
            stream_contiguous: true,
            extras: Vec::new(),
            unparseable: None,
        }
    }

    /// A directory entry; appends the trailing `/` if the name lacks one.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        let mut entry = Self::new(name);
        entry.method = Some(CompressionMethod::Stored);
        entry.size = Some(0);
        entry.crc32 = Some(0);
        entry
    }

    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// The POSIX mode bits, when the entry was made on Unix.
    ///
    /// This library does _not_ try to convert DOS permission bits into
    /// roughly-equivalent Unix mode bits, or do other cross-OS handwaving.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.platform {
            Platform::Unix => Some(self.external_attributes >> 16),
            _ => None,
        }
    }

    /// Marks the entry as Unix-made and stores `mode` in the attribute
    /// word's top half, keeping the DOS directory bit coherent below.
    pub fn set_unix_mode(&mut self, mode: u32) {
        self.platform = Platform::Unix;
        self.external_attributes =
            (mode << 16) | if self.is_dir() { 0x10 } else { 0 };
    }

    /// The full 16-bit "version made by" word for the wire.
    pub(crate) fn version_made_by_word(&self) -> u16 {
        ((self.platform.code() as u16) << 8) | self.version_made_by as u16
    }

    // --- extra fields -----------------------------------------------------

    /// The recognized extra fields, in order.
    pub fn extras(&self) -> &[ExtraField] {
        &self.extras
    }

    /// A snapshot of the extra fields; mutating it doesn't touch the entry.
    pub fn extras_snapshot(&self, include_unparseable: bool) -> (Vec<ExtraField>, Option<Vec<u8>>) {
        (
            self.extras.clone(),
            if include_unparseable {
                self.unparseable.clone()
            } else {
                None
            },
        )
    }

    /// The unframeable tail bytes, if the extras region had any.
    pub fn unparseable_extra(&self) -> Option<&[u8]> {
        self.unparseable.as_deref()
    }

    /// Looks up an extra field by header id.
    pub fn extra(&self, header_id: u16) -> Option<&ExtraField> {
        self.extras.iter().find(|f| f.header_id() == header_id)
    }

    /// Adds an extra field, keeping at most one per header id.
    ///
    /// With `replace_existing`, a field with the same id is replaced in
    /// place; without it, an existing field wins and the new one is
    /// dropped. Returns whether the field was stored. Adding the same
    /// content twice is a no-op either way.
    pub fn add_extra(&mut self, field: ExtraField, replace_existing: bool) -> bool {
        match self.position_of(field.header_id()) {
            Some(at) if replace_existing => {
                self.extras[at] = field;
                true
            }
            Some(_) => false,
            None => {
                self.extras.push(field);
                true
            }
        }
    }

    /// Adds an extra field at index 0, displacing any prior field with the
    /// same id. The writer uses this for the Zip64 placeholder, whose
    /// offset inside the local header must be deterministic.
    pub fn add_extra_first(&mut self, field: ExtraField) {
        if let Some(at) = self.position_of(field.header_id()) {
            self.extras.remove(at);
        }
        self.extras.insert(0, field);
    }

    /// Removes and returns the extra field with the given id.
    ///
    /// Removing an id that isn't there is an error, not a silent no-op.
    pub fn remove_extra(&mut self, header_id: u16) -> ZipResult<ExtraField> {
        match self.position_of(header_id) {
            Some(at) => Ok(self.extras.remove(at)),
            None => Err(ZipError::InvalidUsage("no extra field with that header id")),
        }
    }

    fn position_of(&self, header_id: u16) -> Option<usize> {
        self.extras.iter().position(|f| f.header_id() == header_id)
    }

    /// Replaces the extras with a parse of `bytes` as *local* header data.
    pub fn set_local_extra(&mut self, bytes: &[u8], mode: ParseMode) -> ZipResult<()> {
        let parsed = extra::parse(bytes, Side::Local, mode, self.zip64_context())?;
        self.merge_extras(parsed, Side::Local);
        Ok(())
    }

    /// Merges a parse of `bytes` as *central* directory data.
    pub fn set_central_extra(&mut self, bytes: &[u8], mode: ParseMode) -> ZipResult<()> {
        let parsed = extra::parse(bytes, Side::Central, mode, self.zip64_context())?;
        self.merge_extras(parsed, Side::Central);
        Ok(())
    }

    /// Which of this entry's wire slots would hold sentinels, telling a
    /// central-side Zip64 parse which fields to expect.
    pub(crate) fn zip64_context(&self) -> Zip64Context {
        Zip64Context {
            uncompressed_size: self.size.map_or(false, |v| v >= U32_SENTINEL as u64),
            compressed_size: self
                .compressed_size
                .map_or(false, |v| v >= U32_SENTINEL as u64),
            header_offset: self
                .local_header_offset
                .map_or(false, |v| v >= U32_SENTINEL as u64),
            disk_start: self.disk_number_start >= U16_SENTINEL as u32,
        }
    }

    /// Folds freshly parsed fields into the entry.
    ///
    /// A field whose id is already present is reconciled rather than
    /// duplicated: Zip64 halves union (the central directory knows the
    /// offset, the local header the sizes), opaque fields collect both
    /// sides' bytes, and a typed field downgraded by a failed re-parse
    /// becomes an unrecognized wrapper that keeps both raw payloads so the
    /// round trip stays lossless.
    pub(crate) fn merge_extras(&mut self, parsed: ParsedExtras, side: Side) {
        for incoming in parsed.fields {
            let at = match self.position_of(incoming.header_id()) {
                None => {
                    self.extras.push(incoming);
                    continue;
                }
                Some(at) => at,
            };
            let existing = &mut self.extras[at];
            match (existing, incoming) {
                (ExtraField::Zip64(old), ExtraField::Zip64(new)) => {
                    *old = Zip64Extra {
                        uncompressed_size: new.uncompressed_size.or(old.uncompressed_size),
                        compressed_size: new.compressed_size.or(old.compressed_size),
                        header_offset: new.header_offset.or(old.header_offset),
                        disk_start: new.disk_start.or(old.disk_start),
                    };
                }
                (
                    ExtraField::Unrecognized(old) | ExtraField::StrongEncryption(old),
                    ExtraField::Unrecognized(new) | ExtraField::StrongEncryption(new),
                ) => {
                    if let Some(data) = new.local_data {
                        old.local_data = Some(data);
                    }
                    if let Some(data) = new.central_data {
                        old.central_data = Some(data);
                    }
                }
                // A known field that stopped parsing on one side: demote it,
                // but keep what both sides said.
                (existing, ExtraField::Unrecognized(new)) => {
                    let mut demoted = UnrecognizedExtra {
                        id: new.id,
                        local_data: Some(existing.local_data()),
                        central_data: Some(existing.central_data()),
                    };
                    if let Some(data) = new.local_data {
                        demoted.local_data = Some(data);
                    }
                    if let Some(data) = new.central_data {
                        demoted.central_data = Some(data);
                    }
                    *existing = ExtraField::Unrecognized(demoted);
                }
                // Otherwise the new side's typed parse wins, in place.
                (existing, incoming) => *existing = incoming,
            }
        }
        match side {
            // The local tail is what we re-emit into local headers, so it
            // displaces a central one; a central tail only fills a gap.
            Side::Local => {
                if parsed.unparseable.is_some() {
                    self.unparseable = parsed.unparseable;
                }
            }
            Side::Central => {
                if self.unparseable.is_none() {
                    self.unparseable = parsed.unparseable;
                }
            }
        }
    }

    /// Encodes the extras region for a local file header.
    pub fn local_extra_bytes(&self) -> Vec<u8> {
        extra::encode(&self.extras, self.unparseable.as_deref(), Side::Local)
    }

    /// Encodes the extras region for a central directory header.
    pub fn central_extra_bytes(&self) -> Vec<u8> {
        extra::encode(&self.extras, self.unparseable.as_deref(), Side::Central)
    }

    /// Pulls sentinel-replacing values out of a Zip64 extra, if present.
    pub(crate) fn apply_zip64(&mut self) {
        let zip64 = match self.extra(extra::ZIP64) {
            Some(ExtraField::Zip64(zip64)) => *zip64,
            _ => return,
        };
        if let Some(size) = zip64.uncompressed_size {
            self.size = Some(size);
        }
        if let Some(size) = zip64.compressed_size {
            self.compressed_size = Some(size);
        }
        if let Some(offset) = zip64.header_offset {
            self.local_header_offset = Some(offset);
        }
        if let Some(disk) = zip64.disk_start {
            self.disk_number_start = disk;
        }
    }

    /// Applies Unicode path/comment extras, when their CRCs prove they
    /// still describe the raw header bytes we decoded from.
    pub(crate) fn apply_unicode_extras(&mut self) {
        fn fresh_text(field: Option<&ExtraField>, raw: Option<&[u8]>) -> Option<String> {
            let unicode = match field {
                Some(ExtraField::UnicodePath(unicode))
                | Some(ExtraField::UnicodeComment(unicode)) => unicode,
                _ => return None,
            };
            let raw = raw?;
            if !unicode.matches(raw) {
                return None;
            }
            std::str::from_utf8(&unicode.utf8).ok().map(str::to_owned)
        }

        if self.name_source != TextSource::Utf8Flag {
            if let Some(name) = fresh_text(
                self.extra(extra::UNICODE_PATH),
                self.raw_name.as_deref(),
            ) {
                self.name = name;
                self.name_source = TextSource::UnicodeExtra;
            }
        }
        if self.comment_source != TextSource::Utf8Flag {
            if let Some(comment) = fresh_text(
                self.extra(extra::UNICODE_COMMENT),
                self.raw_comment.as_deref(),
            ) {
                self.comment = comment;
                self.comment_source = TextSource::UnicodeExtra;
            }
        }
    }
}

/// Equality is over content: headers, offsets, and both encodings of the
/// extras region. Two entries that would serialize identically are equal.
impl PartialEq for ZipEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.comment == other.comment
            && self.time == other.time
            && self.internal_attributes == other.internal_attributes
            && self.external_attributes == other.external_attributes
            && self.method == other.method
            && self.size == other.size
            && self.compressed_size == other.compressed_size
            && self.crc32 == other.crc32
            && self.flags == other.flags
            && self.local_header_offset == other.local_header_offset
            && self.data_offset == other.data_offset
            && self.local_extra_bytes() == other.local_extra_bytes()
            && self.central_extra_bytes() == other.central_extra_bytes()
    }
}

impl Eq for ZipEntry {}
