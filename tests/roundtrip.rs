//! Write-then-read coverage: every archive here is produced by the
//! writer, then torn back apart by the readers (and often by hand).

use std::io::{Cursor, Read, Write};

use anyhow::Result;

use zipwire::read::ReadOptions;
use zipwire::write::{WriteOptions, ZipWriter};
use zipwire::{as_tree, CompressionMethod, FileTree, Zip64Mode, ZipArchive, ZipEntry, ZipError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn seekable_options(zip64: Zip64Mode) -> WriteOptions {
    WriteOptions {
        zip64,
        ..WriteOptions::default()
    }
}

#[test]
fn empty_archive_is_22_bytes() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    assert_eq!(bytes.len(), 22);
    assert_eq!(&bytes[..4], b"PK\x05\x06");
    // Everything after the signature is zero: no entries, no comment.
    assert!(bytes[4..].iter().all(|&b| b == 0));

    let archive = ZipArchive::new(&bytes)?;
    assert!(archive.entries().is_empty());
    assert!(archive.preamble()?.is_empty());
    assert!(!archive.zip64_used());
    Ok(())
}

#[test]
fn single_stored_entry_layout() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::with_options(&mut cursor, seekable_options(Zip64Mode::Never));
        let mut entry = ZipEntry::new("a.txt");
        entry.method = Some(CompressionMethod::Stored);
        writer.put_entry(entry)?;
        writer.write_all(b"hi")?;
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    // 30 (LFH) + 5 (name) + 2 (data) + 46 (CFH) + 5 (name) + 22 (EOCD)
    assert_eq!(bytes.len(), 110);

    // The local header was patched in place with the real CRC and sizes.
    let crc = u32::from_le_bytes(bytes[14..18].try_into()?);
    assert_eq!(crc, 0x68CD_D5E2);
    let compressed = u32::from_le_bytes(bytes[18..22].try_into()?);
    let uncompressed = u32::from_le_bytes(bytes[22..26].try_into()?);
    assert_eq!((compressed, uncompressed), (2, 2));

    let archive = ZipArchive::new(&bytes)?;
    let entry = &archive.entries()[0];
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.method, Some(CompressionMethod::Stored));
    assert_eq!(entry.size, Some(2));
    assert_eq!(entry.crc32, Some(0x68CD_D5E2));

    let mut contents = String::new();
    archive.read(entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "hi");
    Ok(())
}

#[test]
fn directory_entry_round_trips_with_slash() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        writer.put_entry(ZipEntry::directory("dir"))?;
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    let archive = ZipArchive::new(&bytes)?;
    let entry = &archive.entries()[0];
    assert_eq!(entry.name, "dir/");
    assert!(entry.is_dir());
    assert_eq!(entry.size, Some(0));
    assert_eq!(entry.crc32, Some(0));
    assert_eq!(entry.method, Some(CompressionMethod::Stored));
    Ok(())
}

#[test]
fn deflated_entries_and_tree_lookup() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        writer.put_entry(ZipEntry::directory("hello"))?;
        for (name, contents) in [
            ("hello/hi.txt", "hi there\n"),
            ("hello/rip.txt", "rest in peace\n"),
            ("hello/sr71.txt", &"blackbird\n".repeat(100)),
        ] {
            writer.put_entry(ZipEntry::new(name))?;
            writer.write_all(contents.as_bytes())?;
        }
        writer.finish()?;
    }
    let bytes = cursor.into_inner();

    let archive = ZipArchive::new(&bytes)?;
    assert_eq!(archive.entries().len(), 4);
    let tree = as_tree(archive.entries())?;
    tree.lookup("hello/hi.txt")?;
    tree.lookup("hello/sr71.txt")?;

    match tree.lookup("no/such/file") {
        Err(ZipError::NoSuchFile(_)) => {}
        other => panic!("lookup of a missing file gave {other:?}"),
    }
    match tree.lookup("../nope") {
        Err(ZipError::InvalidPath(_)) => {}
        other => panic!("lookup of an invalid path gave {other:?}"),
    }

    let entry = tree.lookup("hello/sr71.txt")?;
    assert_eq!(entry.method, Some(CompressionMethod::Deflate));
    let mut contents = String::new();
    archive.read(entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "blackbird\n".repeat(100));
    Ok(())
}

#[test]
fn parallel_reads_share_the_archive() -> Result<()> {
    use rayon::prelude::*;

    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        for i in 0..32 {
            writer.put_entry(ZipEntry::new(format!("file-{i}.bin")))?;
            writer.write_all(format!("contents of file {i}").repeat(50).as_bytes())?;
        }
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    let archive = ZipArchive::new(&bytes)?;

    archive
        .entries()
        .par_iter()
        .try_for_each::<_, Result<()>>(|entry| {
            let mut sink = std::io::sink();
            std::io::copy(&mut archive.read(entry)?, &mut sink)?;
            Ok(())
        })?;
    Ok(())
}

#[test]
fn zip64_always_mode_is_readable() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    let report = {
        let mut writer = ZipWriter::with_options(&mut cursor, seekable_options(Zip64Mode::Always));
        writer.put_entry(ZipEntry::new("big.txt"))?;
        writer.write_all(b"hello")?;
        writer.finish()?
    };
    assert!(report.zip64);
    let bytes = cursor.into_inner();

    // Local header: sentinel size slots, with the truth in a Zip64 extra
    // patched to the real values (16-byte payload, sizes first).
    assert_eq!(&bytes[18..26], &[0xFF; 8]);
    let name_len = u16::from_le_bytes(bytes[26..28].try_into()?) as usize;
    assert_eq!(name_len, 7);
    let extra_at = 30 + name_len;
    assert_eq!(
        u16::from_le_bytes(bytes[extra_at..extra_at + 2].try_into()?),
        0x0001
    );
    assert_eq!(
        u16::from_le_bytes(bytes[extra_at + 2..extra_at + 4].try_into()?),
        16
    );
    let uncompressed = u64::from_le_bytes(bytes[extra_at + 4..extra_at + 12].try_into()?);
    assert_eq!(uncompressed, 5);

    // The archive carries a Zip64 EOCD and locator.
    assert!(memchr::memmem::find(&bytes, b"PK\x06\x06").is_some());
    assert!(memchr::memmem::find(&bytes, b"PK\x06\x07").is_some());

    let archive = ZipArchive::new(&bytes)?;
    assert!(archive.zip64_used());
    let entry = &archive.entries()[0];
    assert_eq!(entry.size, Some(5));
    let mut contents = String::new();
    archive.read(entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "hello");
    Ok(())
}

#[test]
fn zip64_never_mode_rejects_declared_overflow() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = ZipWriter::with_options(&mut cursor, seekable_options(Zip64Mode::Never));
    let mut entry = ZipEntry::new("huge.bin");
    entry.method = Some(CompressionMethod::Stored);
    entry.size = Some(5_000_000_000);
    entry.crc32 = Some(0);
    match writer.put_entry(entry) {
        Err(ZipError::Zip64Required(name)) => assert_eq!(name, "huge.bin"),
        other => panic!("declared 5 GB under Never gave {other:?}"),
    }
    Ok(())
}

#[test]
fn sentinel_boundary_is_exact() -> Result<()> {
    init_logging();
    // 0xFFFFFFFE fits the 32-bit slot even under Never...
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = ZipWriter::with_options(&mut cursor, seekable_options(Zip64Mode::Never));
    let mut fits = ZipEntry::new("fits.bin");
    fits.method = Some(CompressionMethod::Stored);
    fits.size = Some(0xFFFF_FFFE);
    fits.crc32 = Some(0);
    assert!(writer.put_entry(fits).is_ok());
    drop(writer);

    // ...but 0xFFFFFFFF is the reserved sentinel and needs Zip64.
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = ZipWriter::with_options(&mut cursor, seekable_options(Zip64Mode::Never));
    let mut over = ZipEntry::new("over.bin");
    over.method = Some(CompressionMethod::Stored);
    over.size = Some(0xFFFF_FFFF);
    over.crc32 = Some(0);
    match writer.put_entry(over) {
        Err(ZipError::Zip64Required(_)) => {}
        other => panic!("sentinel-sized entry under Never gave {other:?}"),
    }
    Ok(())
}

#[test]
fn sixty_five_thousand_five_hundred_thirty_six_entries_force_zip64() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    let report = {
        let mut writer = ZipWriter::new(&mut cursor);
        for i in 0..65_536u32 {
            let mut entry = ZipEntry::new(format!("e{i:05}"));
            entry.method = Some(CompressionMethod::Stored);
            entry.size = Some(0);
            entry.crc32 = Some(0);
            writer.put_entry(entry)?;
        }
        writer.finish()?
    };
    assert_eq!(report.entry_count, 65_536);
    assert!(report.zip64, "65536 entries overflow the u16 count");

    let bytes = cursor.into_inner();
    let archive = ZipArchive::new(&bytes)?;
    assert_eq!(archive.entries().len(), 65_536);
    assert!(archive.zip64_used());
    Ok(())
}

#[test]
fn comments_survive_the_round_trip() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        writer.set_comment("the archive comment");
        let mut entry = ZipEntry::new("readme.txt");
        entry.comment = "the entry comment".to_owned();
        writer.put_entry(entry)?;
        writer.write_all(b"text")?;
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    let archive = ZipArchive::new(&bytes)?;
    assert_eq!(archive.comment(), "the archive comment");
    assert_eq!(archive.entries()[0].comment, "the entry comment");
    Ok(())
}

#[test]
fn unknown_extra_fields_round_trip_losslessly() -> Result<()> {
    use zipwire::extra::{ExtraField, UnrecognizedExtra};

    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let mut entry = ZipEntry::new("custom.bin");
        entry.add_extra(
            ExtraField::Unrecognized(UnrecognizedExtra {
                id: 0xC0DE,
                local_data: Some(b"local payload".to_vec()),
                central_data: Some(b"central payload".to_vec()),
            }),
            true,
        );
        writer.put_entry(entry)?;
        writer.write_all(b"x")?;
        writer.finish()?;
    }
    let bytes = cursor.into_inner();

    let archive = ZipArchive::new(&bytes)?;
    let entry = &archive.entries()[0];
    match entry.extra(0xC0DE) {
        Some(ExtraField::Unrecognized(unrecognized)) => {
            assert_eq!(unrecognized.local_data.as_deref(), Some(&b"local payload"[..]));
            assert_eq!(
                unrecognized.central_data.as_deref(),
                Some(&b"central payload"[..])
            );
        }
        other => panic!("extra came back as {other:?}"),
    }
    Ok(())
}

#[test]
fn raw_copy_preserves_compressed_bytes() -> Result<()> {
    init_logging();
    let mut first = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut first);
        writer.put_entry(ZipEntry::new("payload.txt"))?;
        writer.write_all("compressible text ".repeat(64).as_bytes())?;
        writer.finish()?;
    }
    let first_bytes = first.into_inner();
    let source = ZipArchive::new(&first_bytes)?;
    let entry = &source.entries()[0];

    let mut raw = Vec::new();
    source.read_raw(entry)?.read_to_end(&mut raw)?;
    assert_eq!(raw.len() as u64, entry.compressed_size.unwrap());

    let mut second = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut second);
        writer.add_raw_entry(entry.clone(), &raw[..])?;
        writer.finish()?;
    }
    let second_bytes = second.into_inner();

    let copied = ZipArchive::new(&second_bytes)?;
    let copied_entry = &copied.entries()[0];
    assert_eq!(copied_entry.crc32, entry.crc32);
    assert_eq!(copied_entry.compressed_size, entry.compressed_size);

    // The compressed payload moved bit for bit.
    let mut raw_again = Vec::new();
    copied.read_raw(copied_entry)?.read_to_end(&mut raw_again)?;
    assert_eq!(raw, raw_again);

    // And it still inflates to the original text.
    let mut contents = String::new();
    copied.read(copied_entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "compressible text ".repeat(64));
    Ok(())
}

#[test]
fn alignment_padding_lands_data_on_the_boundary() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        // A compressible lead-in so the aligned entry isn't at offset 0.
        writer.put_entry(ZipEntry::new("lead.txt"))?;
        writer.write_all(b"lead-in bytes")?;

        let mut entry = ZipEntry::new("resources.arsc");
        entry.method = Some(CompressionMethod::Stored);
        entry.alignment = 64;
        writer.put_entry(entry)?;
        writer.write_all(b"must start aligned")?;
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    let archive = ZipArchive::new(&bytes)?;
    let tree = as_tree(archive.entries())?;
    let entry = tree.lookup("resources.arsc")?;
    assert_eq!(entry.data_offset.unwrap() % 64, 0);

    let mut contents = String::new();
    archive.read(entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "must start aligned");
    Ok(())
}

#[test]
fn prepended_junk_becomes_the_preamble() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        writer.put_entry(ZipEntry::new("inner.txt"))?;
        writer.write_all(b"package contents")?;
        writer.finish()?;
    }
    let archive_bytes = cursor.into_inner();

    let stub = b"#!/bin/sh\necho self-extracting stub\n";
    let mut prefixed = stub.to_vec();
    prefixed.extend_from_slice(&archive_bytes);

    let archive = ZipArchive::new(&prefixed)?;
    assert_eq!(&*archive.preamble()?, &stub[..]);
    let entry = &archive.entries()[0];
    let mut contents = String::new();
    archive.read(entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "package contents");
    Ok(())
}

#[test]
fn corrupted_data_fails_the_crc_check() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let mut entry = ZipEntry::new("victim.bin");
        entry.method = Some(CompressionMethod::Stored);
        writer.put_entry(entry)?;
        writer.write_all(b"pristine data here")?;
        writer.finish()?;
    }
    let mut bytes = cursor.into_inner();
    let archive_probe = ZipArchive::new(&bytes)?;
    let data_offset = archive_probe.entries()[0].data_offset.unwrap() as usize;
    drop(archive_probe);
    bytes[data_offset] ^= 0xFF;

    let archive = ZipArchive::new(&bytes)?;
    let mut sink = Vec::new();
    let outcome = archive.read(&archive.entries()[0])?.read_to_end(&mut sink);
    assert!(outcome.is_err(), "flipped payload byte must fail the CRC");
    Ok(())
}

#[test]
fn double_finish_is_an_error() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = ZipWriter::new(&mut cursor);
    writer.finish()?;
    match writer.finish() {
        Err(ZipError::InvalidUsage(_)) => {}
        other => panic!("second finish gave {other:?}"),
    }
    Ok(())
}

#[test]
fn physical_order_differs_from_central_order_sorting() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        for name in ["zebra.txt", "apple.txt", "mango.txt"] {
            writer.put_entry(ZipEntry::new(name))?;
            writer.write_all(name.as_bytes())?;
        }
        writer.finish()?;
    }
    let bytes = cursor.into_inner();
    let archive = ZipArchive::new(&bytes)?;

    let physical: Vec<&str> = archive
        .entries_in_physical_order()
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(physical, ["zebra.txt", "apple.txt", "mango.txt"]);

    let mut offsets: Vec<u64> = archive
        .entries_in_physical_order()
        .iter()
        .map(|e| e.local_header_offset.unwrap())
        .collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
    offsets.dedup();
    assert_eq!(offsets.len(), 3);
    Ok(())
}

#[test]
fn split_archive_round_trips() -> Result<()> {
    use std::cell::RefCell;
    use std::rc::Rc;

    init_logging();

    struct SegmentBuffer {
        store: Rc<RefCell<Vec<Vec<u8>>>>,
        index: usize,
    }
    impl Write for SegmentBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.store.borrow_mut()[self.index].extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let store: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
    let make_store = store.clone();
    {
        let mut writer = ZipWriter::split(
            256,
            move |disk| {
                let mut segments = make_store.borrow_mut();
                assert_eq!(segments.len(), disk as usize);
                segments.push(Vec::new());
                Ok(SegmentBuffer {
                    store: make_store.clone(),
                    index: disk as usize,
                })
            },
            WriteOptions::default(),
        );
        for i in 0..4 {
            let mut entry = ZipEntry::new(format!("part-{i}.txt"));
            let body = format!("segmented body {i} ").repeat(10);
            entry.method = Some(CompressionMethod::Stored);
            entry.size = Some(body.len() as u64);
            entry.crc32 = Some({
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(body.as_bytes());
                hasher.finalize()
            });
            writer.put_entry(entry)?;
            writer.write_all(body.as_bytes())?;
        }
        let report = writer.finish()?;
        assert!(report.segments > 1, "256-byte segments must have rolled");
    }

    let segments = store.borrow();
    let slices: Vec<&[u8]> = segments.iter().map(|s| s.as_slice()).collect();
    let archive = ZipArchive::split(slices, ReadOptions::default())?;
    assert!(archive.segment_count() > 1);
    assert_eq!(archive.entries().len(), 4);
    for (i, entry) in archive.entries().iter().enumerate() {
        let mut contents = String::new();
        archive.read(entry)?.read_to_string(&mut contents)?;
        assert_eq!(contents, format!("segmented body {i} ").repeat(10));
    }
    Ok(())
}

#[test]
fn zip64_promotion_honors_sentinel_slots() -> Result<()> {
    init_logging();
    // Hand-built archive whose central header stores sentinels and keeps
    // the true (small) values in a Zip64 extra; a conforming reader must
    // use the extra, whatever the magnitudes.
    let mut bytes = Vec::new();

    // Local file header for "z" with real sizes.
    bytes.extend_from_slice(b"PK\x03\x04");
    bytes.extend_from_slice(&10u16.to_le_bytes()); // version needed
    bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
    bytes.extend_from_slice(&0u16.to_le_bytes()); // stored
    bytes.extend_from_slice(&0x5762_8A5Cu32.to_le_bytes()); // dos time
    bytes.extend_from_slice(&0x3524_41C2u32.to_le_bytes()); // crc of "abc"
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // name len
    bytes.extend_from_slice(&0u16.to_le_bytes()); // extra len
    bytes.extend_from_slice(b"z");
    bytes.extend_from_slice(b"abc");
    let cd_start = bytes.len() as u32;

    // Central header with sentinel sizes and a 16-byte Zip64 payload.
    bytes.extend_from_slice(b"PK\x01\x02");
    bytes.extend_from_slice(&45u16.to_le_bytes()); // made by
    bytes.extend_from_slice(&45u16.to_le_bytes()); // needed
    bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
    bytes.extend_from_slice(&0u16.to_le_bytes()); // stored
    bytes.extend_from_slice(&0x5762_8A5Cu32.to_le_bytes());
    bytes.extend_from_slice(&0x3524_41C2u32.to_le_bytes());
    bytes.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // csize sentinel
    bytes.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // usize sentinel
    bytes.extend_from_slice(&1u16.to_le_bytes()); // name len
    bytes.extend_from_slice(&20u16.to_le_bytes()); // extra len
    bytes.extend_from_slice(&0u16.to_le_bytes()); // comment len
    bytes.extend_from_slice(&0u16.to_le_bytes()); // disk
    bytes.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    bytes.extend_from_slice(&0u32.to_le_bytes()); // external attrs
    bytes.extend_from_slice(&0u32.to_le_bytes()); // lfh offset
    bytes.extend_from_slice(b"z");
    bytes.extend_from_slice(&0x0001u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(&3u64.to_le_bytes()); // true uncompressed
    bytes.extend_from_slice(&3u64.to_le_bytes()); // true compressed
    let cd_len = bytes.len() as u32 - cd_start;

    // Classic EOCD; no Zip64 end records needed for this little file.
    bytes.extend_from_slice(b"PK\x05\x06");
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&cd_len.to_le_bytes());
    bytes.extend_from_slice(&cd_start.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());

    let archive = ZipArchive::new(&bytes)?;
    let entry = &archive.entries()[0];
    assert_eq!(entry.size, Some(3));
    assert_eq!(entry.compressed_size, Some(3));
    let mut contents = String::new();
    archive.read(entry)?.read_to_string(&mut contents)?;
    assert_eq!(contents, "abc");
    Ok(())
}

#[test]
fn overlapping_central_directory_is_rejected() -> Result<()> {
    init_logging();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let mut entry = ZipEntry::new("trap.bin");
        entry.method = Some(CompressionMethod::Stored);
        writer.put_entry(entry)?;
        writer.write_all(b"0123456789")?;
        writer.finish()?;
    }
    let mut bytes = cursor.into_inner();

    // Inflate the claimed compressed size so the data would run into the
    // central directory (patch both the local and central slots).
    let lying_size = 10_000u32;
    bytes[18..22].copy_from_slice(&lying_size.to_le_bytes());
    let cfh = memchr::memmem::find(&bytes, b"PK\x01\x02").unwrap();
    bytes[cfh + 20..cfh + 24].copy_from_slice(&lying_size.to_le_bytes());

    match ZipArchive::new(&bytes) {
        Err(ZipError::CorruptField(message)) => {
            assert!(message.contains("overlaps central directory"), "{message}");
        }
        other => panic!("overlapping entry gave {other:?}"),
    }
    Ok(())
}
