//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`], [`stream`], and [`write`] modules.
//!
//! Each record knows how to parse itself from a borrowed slice and how to
//! append itself to an output buffer, so the readers and the writer share
//! one definition of every layout.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [_Zip Files: History, Explanation and Implementation_]
//! is also a fantastic resource and a great read.
//!
//! [`read`]: ../read/index.html
//! [`stream`]: ../stream/index.html
//! [`write`]: ../write/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT
//! [_Zip Files: History, Explanation and Implementation_]: https://www.hanshq.net/zip.html

use memchr::memmem;

use crate::fields::*;
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// Local file header magic number
pub(crate) const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];
/// Central directory magic number
pub(crate) const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Data descriptor magic number (optional on the wire, written by us)
pub(crate) const DATA_DESCRIPTOR_MAGIC: [u8; 4] = [b'P', b'K', 7, 8];
/// End of central directory magic number
pub(crate) const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
pub(crate) const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Zip64 end of central directory locator magic number
pub(crate) const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Archive extra data record magic number
pub(crate) const ARCHIVE_EXTRA_DATA_MAGIC: [u8; 4] = [b'P', b'K', 6, 8];
/// "PK00", the marker a single-segment split archive starts with
pub(crate) const SPLIT_SEGMENT_MAGIC: [u8; 4] = [b'P', b'K', b'0', b'0'];

/// The trailer string of an Android APK signing block
pub(crate) const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";

/// The fixed part of a local file header is 30 bytes, signature included.
pub(crate) const LOCAL_FILE_HEADER_LEN: u64 = 30;
/// The fixed part of a central directory header is 46 bytes.
pub(crate) const CENTRAL_DIRECTORY_ENTRY_LEN: u64 = 46;
/// An End of central directory record with no comment is 22 bytes.
pub(crate) const EOCDR_MIN_LEN: usize = 22;
/// A comment caps at u16, so the EOCDR lives in the last 22 + 65535 bytes.
pub(crate) const EOCDR_SEARCH_WINDOW: usize = EOCDR_MIN_LEN + u16::MAX as usize;

/// Version needed to extract a plain deflated entry (2.0)
pub(crate) const VERSION_NEEDED_DEFAULT: u16 = 20;
/// Version needed to extract anything touched by Zip64 (4.5)
pub(crate) const VERSION_NEEDED_ZIP64: u16 = 45;

/// Checks there's enough input left for the record being parsed.
fn need(input: &[u8], len: usize, what: &'static str) -> ZipResult<()> {
    if input.len() < len {
        Err(ZipError::Truncated(what))
    } else {
        Ok(())
    }
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with disk bookkeeping that matters again
/// now that split archives are supported.
#[derive(Debug)]
pub(crate) struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes

        need(eocdr, EOCDR_MIN_LEN, "End Of Central Directory Record")?;
        // Assert the magic instead of checking for it
        // because the search should have found it.
        assert_eq!(eocdr[..4], EOCDR_MAGIC);
        eocdr = &eocdr[4..];
        let disk_number = read_u16(&mut eocdr);
        let disk_with_central_directory = read_u16(&mut eocdr);
        let entries_on_this_disk = read_u16(&mut eocdr);
        let entries = read_u16(&mut eocdr);
        let central_directory_size = read_u32(&mut eocdr);
        let central_directory_offset = read_u32(&mut eocdr);
        let comment_length = read_u16(&mut eocdr);
        need(eocdr, comment_length as usize, "archive comment")?;
        let file_comment = &eocdr[..usize(comment_length)?];

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    pub fn append_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&EOCDR_MAGIC);
        put_u16(out, self.disk_number);
        put_u16(out, self.disk_with_central_directory);
        put_u16(out, self.entries_on_this_disk);
        put_u16(out, self.entries);
        put_u32(out, self.central_directory_size);
        put_u32(out, self.central_directory_offset);
        put_u16(out, self.file_comment.len() as u16);
        out.extend_from_slice(self.file_comment);
    }
}

/// Searches backward through `mapping` for the
/// End of central directory record.
///
/// It should be right at the end of the file, but its variable-length
/// comment means we can't jump to a known offset. The comment length field
/// bounds the search to the last `22 + 0xFFFF` bytes.
pub(crate) fn find_eocdr(mapping: &[u8]) -> ZipResult<usize> {
    let window_start = mapping.len().saturating_sub(EOCDR_SEARCH_WINDOW);
    memmem::rfind(&mapping[window_start..], &EOCDR_MAGIC)
        .map(|posit| window_start + posit)
        .ok_or(ZipError::BadSignature(
            "Couldn't find End Of Central Directory Record",
        ))
}

/// Data from the Zip64 end of central directory locator
///
/// This should immediately precede the End of central directory record
/// on Zip64 files and tell us where to find the Zip64 end of central
/// directory record.
#[derive(Debug)]
pub(crate) struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_zip64_eocdr: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub fn parse(mut mapping: &[u8]) -> Option<Self> {
        // 4.3.15 Zip64 end of central directory locator
        //
        // zip64 end of central dir locator
        // signature                       4 bytes  (0x07064b50)
        // number of the disk with the
        // start of the zip64 end of
        // central directory               4 bytes
        // relative offset of the zip64
        // end of central directory record 8 bytes
        // total number of disks           4 bytes
        if mapping.len() < Self::size_in_file() || mapping[..4] != ZIP64_EOCDR_LOCATOR_MAGIC {
            return None;
        }
        mapping = &mapping[4..];
        let disk_with_zip64_eocdr = read_u32(&mut mapping);
        let zip64_eocdr_offset = read_u64(&mut mapping);
        let disks = read_u32(&mut mapping);

        Some(Self {
            disk_with_zip64_eocdr,
            zip64_eocdr_offset,
            disks,
        })
    }

    pub fn append_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ZIP64_EOCDR_LOCATOR_MAGIC);
        put_u32(out, self.disk_with_zip64_eocdr);
        put_u64(out, self.zip64_eocdr_offset);
        put_u32(out, self.disks);
    }

    pub fn size_in_file() -> usize {
        20
    }
}

/// Data from the Zip64 end of central directory record
///
/// Present when any count, size, or offset overflowed the classic EOCDR,
/// carrying the full-width versions of its fields.
#[derive(Debug)]
pub(crate) struct Zip64EndOfCentralDirectory<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
    pub extensible_data: &'a [u8],
}

impl<'a> Zip64EndOfCentralDirectory<'a> {
    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        // 4.3.14  Zip64 end of central directory record
        //
        // zip64 end of central dir
        // signature                       4 bytes  (0x06064b50)
        // size of zip64 end of central
        // directory record                8 bytes
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // number of this disk             4 bytes
        // number of the disk with the
        // start of the central directory  4 bytes
        // total number of entries in the
        // central directory on this disk  8 bytes
        // total number of entries in the
        // central directory               8 bytes
        // size of the central directory   8 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        8 bytes
        // zip64 extensible data sector    (variable size)

        need(eocdr, Self::fixed_size_in_file(), "Zip64 EOCDR")?;
        // Assert the magic instead of checking for it
        // because the search should have found it.
        assert_eq!(eocdr[..4], ZIP64_EOCDR_MAGIC);
        eocdr = &eocdr[4..];
        let eocdr_size = read_u64(&mut eocdr);
        let source_version = read_u16(&mut eocdr);
        let minimum_extract_version = read_u16(&mut eocdr);
        let disk_number = read_u32(&mut eocdr);
        let disk_with_central_directory = read_u32(&mut eocdr);
        let entries_on_this_disk = read_u64(&mut eocdr);
        let entries = read_u64(&mut eocdr);
        let central_directory_size = read_u64(&mut eocdr);
        let central_directory_offset = read_u64(&mut eocdr);

        // 4.3.14.1 The value stored into the "size of zip64 end of central
        // directory record" SHOULD be the size of the remaining
        // record and SHOULD NOT include the leading 12 bytes.
        //
        // Size = SizeOfFixedFields + SizeOfVariableData - 12.
        // (SizeOfVariableData = Size - SizeOfFixedFields + 12)

        // Check for underflow:
        let eocdr_size = usize(eocdr_size)?;
        if (eocdr_size + 12) < Self::fixed_size_in_file() {
            return Err(ZipError::CorruptField(
                "Invalid extensible data length in Zip64 End Of Central Directory Record".into(),
            ));
        }
        // We should be left with just the extensible data:
        let extensible_data_length = eocdr_size + 12 - Self::fixed_size_in_file();
        if eocdr.len() != extensible_data_length {
            return Err(ZipError::CorruptField(
                "Invalid extensible data length in Zip64 End Of Central Directory Record".into(),
            ));
        }
        let extensible_data = eocdr;

        Ok(Self {
            source_version,
            minimum_extract_version,
            disk_number,
            disk_with_central_directory,
            entries,
            entries_on_this_disk,
            central_directory_size,
            central_directory_offset,
            extensible_data,
        })
    }

    pub fn append_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ZIP64_EOCDR_MAGIC);
        // Size of the remaining record, leading 12 bytes excluded.
        put_u64(
            out,
            (Self::fixed_size_in_file() - 12 + self.extensible_data.len()) as u64,
        );
        put_u16(out, self.source_version);
        put_u16(out, self.minimum_extract_version);
        put_u32(out, self.disk_number);
        put_u32(out, self.disk_with_central_directory);
        put_u64(out, self.entries_on_this_disk);
        put_u64(out, self.entries);
        put_u64(out, self.central_directory_size);
        put_u64(out, self.central_directory_offset);
        out.extend_from_slice(self.extensible_data);
    }

    pub fn fixed_size_in_file() -> usize {
        56
    }
}

/// Finds the Zip64 end of central directory record in the given slice.
///
/// The slice should start at the Zip64 EOCDR's nominal location,
/// but we might have to do some searching since ZIP archives can have
/// arbitrary junk up front.
pub(crate) fn find_zip64_eocdr(mapping: &[u8]) -> ZipResult<usize> {
    memmem::find(mapping, &ZIP64_EOCDR_MAGIC).ok_or(ZipError::BadSignature(
        "Couldn't find zip64 End Of Central Directory Record",
    ))
}

/// Data from a central directory entry
///
/// Each of these records contains information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug)]
pub(crate) struct CentralDirectoryEntry<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_datetime: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub fn parse_and_consume(entry: &mut &'a [u8]) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        // File header:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        need(entry, CENTRAL_DIRECTORY_ENTRY_LEN as usize, "central directory entry")?;
        if entry[..4] != CENTRAL_DIRECTORY_MAGIC {
            return Err(ZipError::BadSignature("Invalid central directory entry"));
        }
        *entry = &entry[4..];
        let source_version = read_u16(entry);
        let minimum_extract_version = read_u16(entry);
        let flags = read_u16(entry);
        let compression_method = read_u16(entry);
        let dos_datetime = read_u32(entry);
        let crc32 = read_u32(entry);
        let compressed_size = read_u32(entry);
        let uncompressed_size = read_u32(entry);
        let path_length = usize(read_u16(entry))?;
        let extra_field_length = usize(read_u16(entry))?;
        let file_comment_length = usize(read_u16(entry))?;
        let disk_number = read_u16(entry);
        let internal_file_attributes = read_u16(entry);
        let external_file_attributes = read_u32(entry);
        let header_offset = read_u32(entry);
        need(
            entry,
            path_length + extra_field_length + file_comment_length,
            "central directory entry name, extras, or comment",
        )?;
        let (path, remaining) = entry.split_at(path_length);
        let (extra_field, remaining) = remaining.split_at(extra_field_length);
        let (file_comment, remaining) = remaining.split_at(file_comment_length);
        *entry = remaining;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            dos_datetime,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }

    pub fn append_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&CENTRAL_DIRECTORY_MAGIC);
        put_u16(out, self.source_version);
        put_u16(out, self.minimum_extract_version);
        put_u16(out, self.flags);
        put_u16(out, self.compression_method);
        put_u32(out, self.dos_datetime);
        put_u32(out, self.crc32);
        put_u32(out, self.compressed_size);
        put_u32(out, self.uncompressed_size);
        put_u16(out, self.path.len() as u16);
        put_u16(out, self.extra_field.len() as u16);
        put_u16(out, self.file_comment.len() as u16);
        put_u16(out, self.disk_number);
        put_u16(out, self.internal_file_attributes);
        put_u32(out, self.external_file_attributes);
        put_u32(out, self.header_offset);
        out.extend_from_slice(self.path);
        out.extend_from_slice(self.extra_field);
        out.extend_from_slice(self.file_comment);
    }
}

/// The fixed fields of a local file header, signature excluded.
///
/// The streaming reader reads the signature separately (it has to dispatch
/// on it), so the fixed part stands alone; the seekable reader's borrowed
/// [`LocalFileHeader`] composes it with the name and extras.
#[derive(Debug)]
pub(crate) struct LocalFileHeaderFixed {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_datetime: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path_length: u16,
    pub extra_field_length: u16,
}

/// The bytes of [`LocalFileHeaderFixed`], i.e. an LFH minus signature,
/// name, and extras.
pub(crate) const LOCAL_FILE_HEADER_FIXED_LEN: usize = 26;

impl LocalFileHeaderFixed {
    /// Parses the 26 bytes that follow an already-consumed LFH signature.
    pub fn parse_and_consume(header: &mut &[u8]) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        need(header, LOCAL_FILE_HEADER_FIXED_LEN, "local file header")?;
        let minimum_extract_version = read_u16(header);
        let flags = read_u16(header);
        let compression_method = read_u16(header);
        let dos_datetime = read_u32(header);
        let crc32 = read_u32(header);
        let compressed_size = read_u32(header);
        let uncompressed_size = read_u32(header);
        let path_length = read_u16(header);
        let extra_field_length = read_u16(header);

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            dos_datetime,
            crc32,
            compressed_size,
            uncompressed_size,
            path_length,
            extra_field_length,
        })
    }

    pub fn append_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&LOCAL_FILE_HEADER_MAGIC);
        put_u16(out, self.minimum_extract_version);
        put_u16(out, self.flags);
        put_u16(out, self.compression_method);
        put_u32(out, self.dos_datetime);
        put_u32(out, self.crc32);
        put_u32(out, self.compressed_size);
        put_u32(out, self.uncompressed_size);
        put_u16(out, self.path_length);
        put_u16(out, self.extra_field_length);
    }
}

/// Data from a local file header
///
/// Each file's actual contents is preceded by one of these.
/// The streaming reader decodes entries from them alone;
/// the seekable reader reads them to find where each file's data starts
/// (and to pick up extras that only live in the local header).
#[derive(Debug)]
pub(crate) struct LocalFileHeader<'a> {
    pub fixed: LocalFileHeaderFixed,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub fn parse_and_consume(header: &mut &'a [u8]) -> ZipResult<Self> {
        need(header, LOCAL_FILE_HEADER_LEN as usize, "local file header")?;
        if header[..4] != LOCAL_FILE_HEADER_MAGIC {
            return Err(ZipError::BadSignature("Invalid local file header"));
        }
        *header = &header[4..];
        let fixed = LocalFileHeaderFixed::parse_and_consume(header)?;
        need(
            header,
            fixed.path_length as usize + fixed.extra_field_length as usize,
            "local file header name or extras",
        )?;
        let (path, remaining) = header.split_at(fixed.path_length as usize);
        let (extra_field, remaining) = remaining.split_at(fixed.extra_field_length as usize);
        *header = remaining;

        Ok(Self {
            fixed,
            path,
            extra_field,
        })
    }
}

/// A data descriptor: the CRC and sizes that follow an entry's payload
/// when they weren't known at local-header time.
///
/// 4.3.9.3 says the leading signature is optional but "SHOULD be used";
/// we always write it and tolerate its absence on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Descriptor length without signature: two u32 sizes or two u64s.
    pub fn size_in_file(zip64: bool) -> usize {
        if zip64 {
            20
        } else {
            12
        }
    }

    /// Parses a descriptor from bytes that don't include a signature.
    ///
    /// 4.3.9.1: the sizes are 4 bytes each, or 8 bytes when the entry's
    /// local header carried a Zip64 extra field.
    pub fn parse(mut input: &[u8], zip64: bool) -> ZipResult<Self> {
        need(input, Self::size_in_file(zip64), "data descriptor")?;
        let crc32 = read_u32(&mut input);
        let (compressed_size, uncompressed_size) = if zip64 {
            (read_u64(&mut input), read_u64(&mut input))
        } else {
            (read_u32(&mut input) as u64, read_u32(&mut input) as u64)
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    pub fn append_to(&self, out: &mut Vec<u8>, zip64: bool) {
        out.extend_from_slice(&DATA_DESCRIPTOR_MAGIC);
        put_u32(out, self.crc32);
        if zip64 {
            put_u64(out, self.compressed_size);
            put_u64(out, self.uncompressed_size);
        } else {
            put_u32(out, self.compressed_size as u32);
            put_u32(out, self.uncompressed_size as u32);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eocdr_round_trip() {
        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: 3,
            entries: 3,
            central_directory_size: 163,
            central_directory_offset: 1042,
            file_comment: b"hello",
        };
        let mut bytes = Vec::new();
        eocdr.append_to(&mut bytes);
        assert_eq!(bytes.len(), EOCDR_MIN_LEN + 5);

        let reparsed = EndOfCentralDirectory::parse(&bytes).unwrap();
        assert_eq!(reparsed.entries, 3);
        assert_eq!(reparsed.central_directory_size, 163);
        assert_eq!(reparsed.central_directory_offset, 1042);
        assert_eq!(reparsed.file_comment, b"hello");
    }

    #[test]
    fn eocdr_search_is_bounded() {
        // A signature buried deeper than a max-length comment could push it
        // must not be found.
        let mut bytes = vec![0u8; EOCDR_SEARCH_WINDOW + 100];
        bytes[..4].copy_from_slice(&EOCDR_MAGIC);
        assert!(find_eocdr(&bytes).is_err());

        let posit = bytes.len() - 40;
        bytes[posit..posit + 4].copy_from_slice(&EOCDR_MAGIC);
        assert_eq!(find_eocdr(&bytes).unwrap(), posit);
    }

    #[test]
    fn zip64_eocdr_round_trip() {
        let eocdr = Zip64EndOfCentralDirectory {
            source_version: VERSION_NEEDED_ZIP64,
            minimum_extract_version: VERSION_NEEDED_ZIP64,
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: 70_000,
            entries: 70_000,
            central_directory_size: 0x1_0000_0000,
            central_directory_offset: 0x2_0000_0000,
            extensible_data: &[],
        };
        let mut bytes = Vec::new();
        eocdr.append_to(&mut bytes);
        assert_eq!(bytes.len(), Zip64EndOfCentralDirectory::fixed_size_in_file());

        let reparsed = Zip64EndOfCentralDirectory::parse(&bytes).unwrap();
        assert_eq!(reparsed.entries, 70_000);
        assert_eq!(reparsed.central_directory_offset, 0x2_0000_0000);
    }

    #[test]
    fn locator_rejects_other_records() {
        let mut bytes = Vec::new();
        Zip64EndOfCentralDirectoryLocator {
            disk_with_zip64_eocdr: 0,
            zip64_eocdr_offset: 12345,
            disks: 1,
        }
        .append_to(&mut bytes);
        assert_eq!(
            bytes.len(),
            Zip64EndOfCentralDirectoryLocator::size_in_file()
        );
        let locator = Zip64EndOfCentralDirectoryLocator::parse(&bytes).unwrap();
        assert_eq!(locator.zip64_eocdr_offset, 12345);

        bytes[3] = 0xFF;
        assert!(Zip64EndOfCentralDirectoryLocator::parse(&bytes).is_none());
    }

    #[test]
    fn local_header_round_trip() {
        let fixed = LocalFileHeaderFixed {
            minimum_extract_version: VERSION_NEEDED_DEFAULT,
            flags: 0x0800,
            compression_method: 8,
            dos_datetime: 0x5762_8A5C,
            crc32: 0xDEAD_BEEF,
            compressed_size: 10,
            uncompressed_size: 30,
            path_length: 5,
            extra_field_length: 0,
        };
        let mut bytes = Vec::new();
        fixed.append_to(&mut bytes);
        bytes.extend_from_slice(b"a.txt");
        assert_eq!(bytes.len() as u64, LOCAL_FILE_HEADER_LEN + 5);

        let mut slice = &bytes[..];
        let header = LocalFileHeader::parse_and_consume(&mut slice).unwrap();
        assert!(slice.is_empty());
        assert_eq!(header.path, b"a.txt");
        assert_eq!(header.fixed.crc32, 0xDEAD_BEEF);
        assert_eq!(header.fixed.flags, 0x0800);
    }

    #[test]
    fn data_descriptor_widths() {
        let descriptor = DataDescriptor {
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 3,
        };
        let mut narrow = Vec::new();
        descriptor.append_to(&mut narrow, false);
        assert_eq!(narrow.len(), 4 + DataDescriptor::size_in_file(false));
        assert_eq!(
            DataDescriptor::parse(&narrow[4..], false).unwrap(),
            descriptor
        );

        let mut wide = Vec::new();
        descriptor.append_to(&mut wide, true);
        assert_eq!(wide.len(), 4 + DataDescriptor::size_in_file(true));
        assert_eq!(DataDescriptor::parse(&wide[4..], true).unwrap(), descriptor);
    }

    #[test]
    fn truncated_central_entry() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CENTRAL_DIRECTORY_MAGIC);
        bytes.extend_from_slice(&[0; 20]);
        let mut slice = &bytes[..];
        assert!(matches!(
            CentralDirectoryEntry::parse_and_consume(&mut slice),
            Err(ZipError::Truncated(_))
        ));
    }
}
