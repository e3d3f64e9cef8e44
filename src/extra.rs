//! The extra-field framework of local and central headers.
//!
//! An extra field is a `u16 header id | u16 data length | data` triple,
//! and the extras region of a header is a run of them. Some ids carry
//! different payloads in the local header than in the central directory
//! (Zip64 is the notorious one), so every field type here knows both byte
//! representations.
//!
//! Unknown ids aren't an error: they ride along as [`UnrecognizedExtra`]
//! so a rewrite of the archive preserves them byte for byte. Bytes at the
//! tail of the region that don't even frame as a triple are kept too, as
//! the "unparseable tail" — see [`ParsedExtras::unparseable`].

use log::*;

use crate::fields::*;
use crate::result::*;

/// Zip64 extended information (APPNOTE 4.5.3)
pub const ZIP64: u16 = 0x0001;
/// NTFS timestamps (APPNOTE 4.5.5)
pub const NTFS_TIMES: u16 = 0x000A;
/// Strong encryption header (APPNOTE 4.5.12); stored opaque
pub const STRONG_ENCRYPTION: u16 = 0x0017;
/// Info-ZIP extended timestamp
pub const EXTENDED_TIMESTAMP: u16 = 0x5455;
/// Info-ZIP Unix, the old variant with 32-bit times
pub const INFO_ZIP_UNIX_OLD: u16 = 0x5855;
/// Info-ZIP Unicode comment
pub const UNICODE_COMMENT: u16 = 0x6375;
/// Info-ZIP Unicode path
pub const UNICODE_PATH: u16 = 0x7075;
/// Info-ZIP New Unix ("ux"): variable-width uid/gid
pub const NEW_UNIX: u16 = 0x7875;
/// AE-x AES encryption (WinZip)
pub const AES: u16 = 0x9901;
/// Android resource alignment padding
pub const RESOURCE_ALIGNMENT: u16 = 0xA11E;

/// Which header a run of extras came from (or is headed to).
/// Several field types have asymmetric payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Central,
}

/// What to do about malformed extras.
///
/// The two failure axes are independent: the framing itself can be broken
/// (a field claims more bytes than remain), or a well-framed field with a
/// known id can fail its own payload parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Keep everything: broken framing becomes the unparseable tail,
    /// a failed known field is kept raw as unrecognized.
    #[default]
    BestEffort,
    /// Broken framing becomes the tail, but a failed known field is an error.
    StrictForKnown,
    /// Drop broken framing silently; keep failed known fields raw.
    OnlyParseableLenient,
    /// Drop broken framing silently; fail on a failed known field.
    OnlyParseableStrict,
    /// Any defect is an error.
    Draconic,
}

impl ParseMode {
    fn keeps_malformed_framing(self) -> bool {
        matches!(self, ParseMode::BestEffort | ParseMode::StrictForKnown)
    }

    fn tolerates_failed_known_field(self) -> bool {
        matches!(self, ParseMode::BestEffort | ParseMode::OnlyParseableLenient)
    }
}

/// Which central-directory slots held the 0xFFFFFFFF / 0xFFFF sentinels,
/// i.e. which fields a central Zip64 extra actually contains.
///
/// From the APPNOTE: the order of the fields in the zip64 extended
/// information record is fixed, but the fields MUST only appear if the
/// corresponding record field is set to 0xFFFF or 0xFFFFFFFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip64Context {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub header_offset: bool,
    pub disk_start: bool,
}

/// 4.5.3 Zip64 extended information extra field
///
/// In the local header the payload always carries both sizes in a fixed
/// order. In the central directory it carries exactly the fields whose
/// 32-bit (or 16-bit) slots overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64Extra {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub disk_start: Option<u32>,
}

impl Zip64Extra {
    fn parse_local(mut payload: &[u8]) -> ZipResult<Self> {
        // An empty payload is a placeholder some archivers leave behind.
        if payload.is_empty() {
            return Ok(Self::default());
        }
        if payload.len() < 16 {
            return Err(ZipError::CorruptField(
                "Zip64 extra in local header must hold both sizes or neither".into(),
            ));
        }
        let uncompressed_size = Some(read_u64(&mut payload));
        let compressed_size = Some(read_u64(&mut payload));
        let header_offset = (payload.len() >= 8).then(|| read_u64(&mut payload));
        let disk_start = (payload.len() >= 4).then(|| read_u32(&mut payload));
        Ok(Self {
            uncompressed_size,
            compressed_size,
            header_offset,
            disk_start,
        })
    }

    fn parse_central(mut payload: &[u8], context: Zip64Context) -> ZipResult<Self> {
        let mut wanted = 0;
        for flag in [
            context.uncompressed_size,
            context.compressed_size,
            context.header_offset,
        ] {
            if flag {
                wanted += 8;
            }
        }
        if context.disk_start {
            wanted += 4;
        }
        if payload.len() < wanted {
            return Err(ZipError::CorruptField(format!(
                "Zip64 extra holds {} bytes but the header's sentinels require {}",
                payload.len(),
                wanted,
            )));
        }
        let mut parsed = Self::default();
        if context.uncompressed_size {
            parsed.uncompressed_size = Some(read_u64(&mut payload));
        }
        if context.compressed_size {
            parsed.compressed_size = Some(read_u64(&mut payload));
        }
        if context.header_offset {
            parsed.header_offset = Some(read_u64(&mut payload));
        }
        if context.disk_start {
            parsed.disk_start = Some(read_u32(&mut payload));
        }
        Ok(parsed)
    }

    fn local_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        if self.uncompressed_size.is_none() && self.compressed_size.is_none() {
            // The empty-payload placeholder form.
            return out;
        }
        // Emission with only one size set is forbidden upstream.
        debug_assert!(self.uncompressed_size.is_some() && self.compressed_size.is_some());
        put_u64(&mut out, self.uncompressed_size.unwrap_or(0));
        put_u64(&mut out, self.compressed_size.unwrap_or(0));
        if let Some(offset) = self.header_offset {
            put_u64(&mut out, offset);
        }
        if let Some(disk) = self.disk_start {
            put_u32(&mut out, disk);
        }
        out
    }

    fn central_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        if let Some(size) = self.uncompressed_size {
            put_u64(&mut out, size);
        }
        if let Some(size) = self.compressed_size {
            put_u64(&mut out, size);
        }
        if let Some(offset) = self.header_offset {
            put_u64(&mut out, offset);
        }
        if let Some(disk) = self.disk_start {
            put_u32(&mut out, disk);
        }
        out
    }
}

/// 0x7075 / 0x6375: an Info-ZIP Unicode path or comment.
///
/// The CRC is of the *original* header bytes, so a consumer can tell
/// whether the Unicode text went stale after some tool rewrote the name
/// without updating the extra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeExtra {
    pub crc32_of_raw: u32,
    pub utf8: Vec<u8>,
}

impl UnicodeExtra {
    pub fn new(raw_header_bytes: &[u8], text: &str) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(raw_header_bytes);
        Self {
            crc32_of_raw: hasher.finalize(),
            utf8: text.as_bytes().to_vec(),
        }
    }

    /// Does this extra still describe the given raw header bytes?
    pub fn matches(&self, raw_header_bytes: &[u8]) -> bool {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(raw_header_bytes);
        hasher.finalize() == self.crc32_of_raw
    }

    fn parse(mut payload: &[u8]) -> ZipResult<Self> {
        if payload.len() < 5 {
            return Err(ZipError::CorruptField("Unicode extra too short".into()));
        }
        let version = read_u8(&mut payload);
        if version != 1 {
            return Err(ZipError::CorruptField(format!(
                "Unicode extra version {version}, expected 1",
            )));
        }
        let crc32_of_raw = read_u32(&mut payload);
        Ok(Self {
            crc32_of_raw,
            utf8: payload.to_vec(),
        })
    }

    fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.utf8.len());
        out.push(1);
        put_u32(&mut out, self.crc32_of_raw);
        out.extend_from_slice(&self.utf8);
        out
    }
}

/// 0x5455: Info-ZIP extended timestamp, seconds since the Unix epoch.
///
/// The local payload carries whichever of mtime/atime/ctime the flag bits
/// announce; the central payload repeats the flags but only ever carries
/// the modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedTimestampExtra {
    pub mtime: Option<u32>,
    pub atime: Option<u32>,
    pub ctime: Option<u32>,
}

impl ExtendedTimestampExtra {
    const MTIME_BIT: u8 = 1;
    const ATIME_BIT: u8 = 2;
    const CTIME_BIT: u8 = 4;

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.mtime.is_some() {
            flags |= Self::MTIME_BIT;
        }
        if self.atime.is_some() {
            flags |= Self::ATIME_BIT;
        }
        if self.ctime.is_some() {
            flags |= Self::CTIME_BIT;
        }
        flags
    }

    fn parse(mut payload: &[u8], side: Side) -> ZipResult<Self> {
        if payload.is_empty() {
            return Err(ZipError::CorruptField(
                "extended timestamp missing its flags byte".into(),
            ));
        }
        let flags = read_u8(&mut payload);
        let mut field = |bit: u8| -> ZipResult<Option<u32>> {
            if flags & bit == 0 {
                return Ok(None);
            }
            if payload.len() < 4 {
                // The central form only stores mtime no matter what the
                // flags promise for the local header.
                if side == Side::Central {
                    return Ok(None);
                }
                return Err(ZipError::CorruptField(
                    "extended timestamp shorter than its flags require".into(),
                ));
            }
            Ok(Some(read_u32(&mut payload)))
        };
        let mtime = field(Self::MTIME_BIT)?;
        let atime = field(Self::ATIME_BIT)?;
        let ctime = field(Self::CTIME_BIT)?;
        Ok(Self { mtime, atime, ctime })
    }

    fn data(&self, side: Side) -> Vec<u8> {
        let mut out = Vec::with_capacity(13);
        out.push(self.flags());
        if let Some(mtime) = self.mtime {
            put_u32(&mut out, mtime);
        }
        if side == Side::Local {
            if let Some(atime) = self.atime {
                put_u32(&mut out, atime);
            }
            if let Some(ctime) = self.ctime {
                put_u32(&mut out, ctime);
            }
        }
        out
    }
}

/// 4.5.5 NTFS extra field: three Windows FILETIMEs
/// (100ns ticks since 1601-01-01).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtfsExtra {
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
}

impl NtfsExtra {
    fn parse(mut payload: &[u8]) -> ZipResult<Self> {
        if payload.len() < 4 {
            return Err(ZipError::CorruptField("NTFS extra too short".into()));
        }
        let _reserved = read_u32(&mut payload);
        // Attributes are their own (tag, length, data) sequence.
        // Only tag 1 (the timestamp triple) means anything to us.
        while payload.len() >= 4 {
            let tag = read_u16(&mut payload);
            let length = read_u16(&mut payload) as usize;
            if length > payload.len() {
                return Err(ZipError::CorruptField(
                    "NTFS attribute longer than its extra field".into(),
                ));
            }
            let (mut attribute, rest) = payload.split_at(length);
            payload = rest;
            if tag == 1 && length >= 24 {
                return Ok(Self {
                    mtime: read_u64(&mut attribute),
                    atime: read_u64(&mut attribute),
                    ctime: read_u64(&mut attribute),
                });
            }
        }
        Err(ZipError::CorruptField(
            "NTFS extra carries no timestamp attribute".into(),
        ))
    }

    fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36);
        put_u32(&mut out, 0); // reserved
        put_u16(&mut out, 1); // timestamp attribute
        put_u16(&mut out, 24);
        put_u64(&mut out, self.mtime);
        put_u64(&mut out, self.atime);
        put_u64(&mut out, self.ctime);
        out
    }
}

/// Info-ZIP New Unix extra field ("ux", 0x7875): uid/gid with
/// variable-width storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewUnixExtra {
    pub uid: u64,
    pub gid: u64,
}

impl NewUnixExtra {
    fn parse(mut payload: &[u8]) -> ZipResult<Self> {
        if payload.is_empty() || payload[0] != 1 {
            return Err(ZipError::CorruptField(
                "New Unix extra with unknown version".into(),
            ));
        }
        payload = &payload[1..];
        let uid = Self::variable_width(&mut payload)?;
        let gid = Self::variable_width(&mut payload)?;
        Ok(Self { uid, gid })
    }

    fn variable_width(payload: &mut &[u8]) -> ZipResult<u64> {
        if payload.is_empty() {
            return Err(ZipError::CorruptField("New Unix extra truncated".into()));
        }
        let width = read_u8(payload) as usize;
        if payload.len() < width {
            return Err(ZipError::CorruptField("New Unix extra truncated".into()));
        }
        let value = match width {
            1 => read_u8(payload) as u64,
            2 => read_u16(payload) as u64,
            4 => read_u32(payload) as u64,
            8 => read_u64(payload),
            other => {
                return Err(ZipError::CorruptField(format!(
                    "New Unix extra with {other}-byte id field",
                )))
            }
        };
        Ok(value)
    }

    fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(11);
        out.push(1);
        for value in [self.uid, self.gid] {
            if value > u32::MAX as u64 {
                out.push(8);
                put_u64(&mut out, value);
            } else {
                out.push(4);
                put_u32(&mut out, value as u32);
            }
        }
        out
    }
}

/// 0x5855: the original Info-ZIP Unix extra.
///
/// The local payload is `atime mtime [uid gid]`; the central one stops
/// after mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoZipUnixOldExtra {
    pub atime: u32,
    pub mtime: u32,
    pub uid: Option<u16>,
    pub gid: Option<u16>,
}

impl InfoZipUnixOldExtra {
    fn parse(mut payload: &[u8]) -> ZipResult<Self> {
        if payload.len() < 8 {
            return Err(ZipError::CorruptField(
                "Info-ZIP Unix extra too short".into(),
            ));
        }
        let atime = read_u32(&mut payload);
        let mtime = read_u32(&mut payload);
        let (uid, gid) = if payload.len() >= 4 {
            (Some(read_u16(&mut payload)), Some(read_u16(&mut payload)))
        } else {
            (None, None)
        };
        Ok(Self {
            atime,
            mtime,
            uid,
            gid,
        })
    }

    fn data(&self, side: Side) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        put_u32(&mut out, self.atime);
        put_u32(&mut out, self.mtime);
        if side == Side::Local {
            if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
                put_u16(&mut out, uid);
                put_u16(&mut out, gid);
            }
        }
        out
    }
}

/// 0x9901: WinZip AE-x AES encryption parameters.
///
/// When present, the entry's method code is 99 and the real compression
/// method hides in here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    pub vendor_version: u16,
    /// 1 = AES-128, 2 = AES-192, 3 = AES-256
    pub strength: u8,
    pub method_code: u16,
}

impl AesExtra {
    fn parse(mut payload: &[u8]) -> ZipResult<Self> {
        if payload.len() < 7 {
            return Err(ZipError::CorruptField("AES extra too short".into()));
        }
        let vendor_version = read_u16(&mut payload);
        let vendor = [read_u8(&mut payload), read_u8(&mut payload)];
        if &vendor != b"AE" {
            return Err(ZipError::CorruptField(format!(
                "AES extra with vendor {vendor:?}, expected \"AE\"",
            )));
        }
        let strength = read_u8(&mut payload);
        let method_code = read_u16(&mut payload);
        Ok(Self {
            vendor_version,
            strength,
            method_code,
        })
    }

    fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7);
        put_u16(&mut out, self.vendor_version);
        out.extend_from_slice(b"AE");
        out.push(self.strength);
        put_u16(&mut out, self.method_code);
        out
    }
}

/// 0xA11E: alignment padding, as written by Android's zipalign for
/// uncompressed resources.
///
/// The payload is a u16 (top bit: "the method may be changed while
/// keeping alignment", low 15 bits: the alignment) followed by however
/// many padding bytes it takes to land the entry's data on a multiple of
/// that alignment. Central copies drop the padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAlignmentExtra {
    pub alignment: u16,
    pub allow_method_change: bool,
    pub padding: usize,
}

impl ResourceAlignmentExtra {
    pub const BASE_SIZE: usize = 2;

    pub fn new(alignment: u16, allow_method_change: bool, padding: usize) -> Self {
        Self {
            alignment,
            allow_method_change,
            padding,
        }
    }

    fn parse(mut payload: &[u8]) -> ZipResult<Self> {
        if payload.len() < Self::BASE_SIZE {
            return Err(ZipError::CorruptField("alignment extra too short".into()));
        }
        let padding = payload.len() - Self::BASE_SIZE;
        let word = read_u16(&mut payload);
        Ok(Self {
            alignment: word & 0x7FFF,
            allow_method_change: word & 0x8000 != 0,
            padding,
        })
    }

    fn data(&self, side: Side) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::BASE_SIZE + self.padding);
        let word = self.alignment | if self.allow_method_change { 0x8000 } else { 0 };
        put_u16(&mut out, word);
        if side == Side::Local {
            out.resize(Self::BASE_SIZE + self.padding, 0);
        }
        out
    }
}

/// An extra field we can't interpret: an unknown id, or a known id whose
/// payload failed to parse and was demoted to keep the bytes.
///
/// Both sides' raw payloads are kept so an archive rewrite is lossless
/// even when the two differ.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnrecognizedExtra {
    pub id: u16,
    pub local_data: Option<Vec<u8>>,
    pub central_data: Option<Vec<u8>>,
}

impl UnrecognizedExtra {
    pub fn from_side(id: u16, side: Side, payload: &[u8]) -> Self {
        let mut unrecognized = Self {
            id,
            ..Self::default()
        };
        unrecognized.set_side(side, payload);
        unrecognized
    }

    pub fn set_side(&mut self, side: Side, payload: &[u8]) {
        match side {
            Side::Local => self.local_data = Some(payload.to_vec()),
            Side::Central => self.central_data = Some(payload.to_vec()),
        }
    }

    fn data(&self, side: Side) -> Vec<u8> {
        // Fall back to whichever side we have; commonly only one was seen.
        let preferred = match side {
            Side::Local => self.local_data.as_ref().or(self.central_data.as_ref()),
            Side::Central => self.central_data.as_ref().or(self.local_data.as_ref()),
        };
        preferred.cloned().unwrap_or_default()
    }
}

/// One recognized (or carried-along) extra field.
///
/// The set of known ids is closed; everything else is `Unrecognized`.
/// The strong-encryption header is deliberately opaque: its payload is
/// carried raw and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Zip64(Zip64Extra),
    UnicodePath(UnicodeExtra),
    UnicodeComment(UnicodeExtra),
    ExtendedTimestamp(ExtendedTimestampExtra),
    NtfsTimes(NtfsExtra),
    NewUnix(NewUnixExtra),
    InfoZipUnixOld(InfoZipUnixOldExtra),
    Aes(AesExtra),
    ResourceAlignment(ResourceAlignmentExtra),
    StrongEncryption(UnrecognizedExtra),
    Unrecognized(UnrecognizedExtra),
}

impl ExtraField {
    pub fn header_id(&self) -> u16 {
        match self {
            ExtraField::Zip64(_) => ZIP64,
            ExtraField::UnicodePath(_) => UNICODE_PATH,
            ExtraField::UnicodeComment(_) => UNICODE_COMMENT,
            ExtraField::ExtendedTimestamp(_) => EXTENDED_TIMESTAMP,
            ExtraField::NtfsTimes(_) => NTFS_TIMES,
            ExtraField::NewUnix(_) => NEW_UNIX,
            ExtraField::InfoZipUnixOld(_) => INFO_ZIP_UNIX_OLD,
            ExtraField::Aes(_) => AES,
            ExtraField::ResourceAlignment(_) => RESOURCE_ALIGNMENT,
            ExtraField::StrongEncryption(_) => STRONG_ENCRYPTION,
            ExtraField::Unrecognized(unrecognized) => unrecognized.id,
        }
    }

    /// Parses one field's payload by id.
    ///
    /// An `Err` here means a *known* id whose payload didn't decode;
    /// the caller decides (per [`ParseMode`]) whether that's fatal.
    fn parse_one(
        id: u16,
        payload: &[u8],
        side: Side,
        context: Zip64Context,
    ) -> ZipResult<ExtraField> {
        let parsed = match id {
            ZIP64 => ExtraField::Zip64(match side {
                Side::Local => Zip64Extra::parse_local(payload)?,
                Side::Central => Zip64Extra::parse_central(payload, context)?,
            }),
            UNICODE_PATH => ExtraField::UnicodePath(UnicodeExtra::parse(payload)?),
            UNICODE_COMMENT => ExtraField::UnicodeComment(UnicodeExtra::parse(payload)?),
            EXTENDED_TIMESTAMP => {
                ExtraField::ExtendedTimestamp(ExtendedTimestampExtra::parse(payload, side)?)
            }
            NTFS_TIMES => ExtraField::NtfsTimes(NtfsExtra::parse(payload)?),
            NEW_UNIX => ExtraField::NewUnix(NewUnixExtra::parse(payload)?),
            INFO_ZIP_UNIX_OLD => {
                ExtraField::InfoZipUnixOld(InfoZipUnixOldExtra::parse(payload)?)
            }
            AES => ExtraField::Aes(AesExtra::parse(payload)?),
            RESOURCE_ALIGNMENT => {
                ExtraField::ResourceAlignment(ResourceAlignmentExtra::parse(payload)?)
            }
            // Deliberately opaque; see the module docs.
            STRONG_ENCRYPTION => {
                ExtraField::StrongEncryption(UnrecognizedExtra::from_side(id, side, payload))
            }
            unknown => {
                ExtraField::Unrecognized(UnrecognizedExtra::from_side(unknown, side, payload))
            }
        };
        Ok(parsed)
    }

    /// The payload bytes this field writes into a local header.
    pub fn local_data(&self) -> Vec<u8> {
        match self {
            ExtraField::Zip64(zip64) => zip64.local_data(),
            ExtraField::UnicodePath(unicode) | ExtraField::UnicodeComment(unicode) => {
                unicode.data()
            }
            ExtraField::ExtendedTimestamp(times) => times.data(Side::Local),
            ExtraField::NtfsTimes(times) => times.data(),
            ExtraField::NewUnix(unix) => unix.data(),
            ExtraField::InfoZipUnixOld(unix) => unix.data(Side::Local),
            ExtraField::Aes(aes) => aes.data(),
            ExtraField::ResourceAlignment(alignment) => alignment.data(Side::Local),
            ExtraField::StrongEncryption(opaque) | ExtraField::Unrecognized(opaque) => {
                opaque.data(Side::Local)
            }
        }
    }

    /// The payload bytes this field writes into a central directory header.
    pub fn central_data(&self) -> Vec<u8> {
        match self {
            ExtraField::Zip64(zip64) => zip64.central_data(),
            ExtraField::UnicodePath(unicode) | ExtraField::UnicodeComment(unicode) => {
                unicode.data()
            }
            ExtraField::ExtendedTimestamp(times) => times.data(Side::Central),
            ExtraField::NtfsTimes(times) => times.data(),
            ExtraField::NewUnix(unix) => unix.data(),
            ExtraField::InfoZipUnixOld(unix) => unix.data(Side::Central),
            ExtraField::Aes(aes) => aes.data(),
            ExtraField::ResourceAlignment(alignment) => alignment.data(Side::Central),
            ExtraField::StrongEncryption(opaque) | ExtraField::Unrecognized(opaque) => {
                opaque.data(Side::Central)
            }
        }
    }

    fn data(&self, side: Side) -> Vec<u8> {
        match side {
            Side::Local => self.local_data(),
            Side::Central => self.central_data(),
        }
    }
}

/// The result of decoding an extras region.
#[derive(Debug, Default)]
pub struct ParsedExtras {
    /// Recognized and carried-along fields, in wire order.
    pub fields: Vec<ExtraField>,
    /// Trailing bytes that didn't frame as an `(id, len, data)` triple.
    pub unparseable: Option<Vec<u8>>,
}

/// Decodes a run of extra fields.
///
/// `context` matters only for a central-side Zip64 field, whose payload
/// contents depend on which header slots held sentinels.
pub fn parse(
    mut input: &[u8],
    side: Side,
    mode: ParseMode,
    context: Zip64Context,
) -> ZipResult<ParsedExtras> {
    let mut parsed = ParsedExtras::default();

    while !input.is_empty() {
        if input.len() < 4 {
            return finish_malformed(parsed, input, mode, "extra field header");
        }
        let mut header = input;
        let id = read_u16(&mut header);
        let length = read_u16(&mut header) as usize;
        if length > header.len() {
            // A field claiming more bytes than remain can't be framed.
            return finish_malformed(parsed, input, mode, "extra field payload");
        }
        let (payload, rest) = header.split_at(length);
        input = rest;

        match ExtraField::parse_one(id, payload, side, context) {
            Ok(field) => parsed.fields.push(field),
            Err(e) if mode.tolerates_failed_known_field() => {
                debug!("Keeping extra field 0x{id:04x} raw: {e}");
                parsed
                    .fields
                    .push(ExtraField::Unrecognized(UnrecognizedExtra::from_side(
                        id, side, payload,
                    )));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(parsed)
}

fn finish_malformed(
    mut parsed: ParsedExtras,
    tail: &[u8],
    mode: ParseMode,
    what: &'static str,
) -> ZipResult<ParsedExtras> {
    if mode == ParseMode::Draconic {
        return Err(ZipError::CorruptField(format!(
            "extras region ends mid-{what} ({} bytes left)",
            tail.len(),
        )));
    }
    if mode.keeps_malformed_framing() {
        parsed.unparseable = Some(tail.to_vec());
    } else {
        debug!("Dropping {} unframeable extra bytes", tail.len());
    }
    Ok(parsed)
}

/// Encodes fields (and an optional unparseable tail) back into a header's
/// extras region.
pub fn encode(fields: &[ExtraField], unparseable: Option<&[u8]>, side: Side) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        let payload = field.data(side);
        put_u16(&mut out, field.header_id());
        put_u16(&mut out, payload.len() as u16);
        out.extend_from_slice(&payload);
    }
    // The tail rides along verbatim, framing-free by definition.
    if let Some(tail) = unparseable {
        out.extend_from_slice(tail);
    }
    out
}
