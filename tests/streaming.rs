//! Forward-only reader coverage: data descriptors, preamble garbage,
//! APK signing blocks, and the writer's non-seekable output.

use std::io::{Read, Write};

use anyhow::Result;

use zipwire::stream::{StreamOptions, ZipStreamReader};
use zipwire::write::ZipWriter;
use zipwire::{CompressionMethod, ZipArchive, ZipEntry, ZipError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A streaming-written archive with one DEFLATED entry of unknown size.
fn streamed_archive(name: &str, contents: &[u8]) -> Result<(Vec<u8>, u32)> {
    let mut out = Vec::new();
    let degraded;
    {
        let mut writer = ZipWriter::streaming(&mut out);
        writer.put_entry(ZipEntry::new(name))?;
        writer.write_all(contents)?;
        degraded = writer.finish()?.degraded_to_never;
    }
    Ok((out, degraded))
}

#[test]
fn unknown_size_deflate_uses_a_data_descriptor() -> Result<()> {
    init_logging();
    let contents = "stream me without seeking ".repeat(40);
    let (bytes, degraded) = streamed_archive("flow.txt", contents.as_bytes())?;

    // AsNeeded quietly drops Zip64 for this shape; the report says so.
    assert_eq!(degraded, 1);

    // General purpose bit 3 is on, and the local CRC and sizes are zero.
    let flags = u16::from_le_bytes(bytes[6..8].try_into()?);
    assert_ne!(flags & (1 << 3), 0);
    assert!(bytes[14..26].iter().all(|&b| b == 0));
    // No Zip64 extra was written: the extra region is empty.
    let extra_len = u16::from_le_bytes(bytes[28..30].try_into()?);
    assert_eq!(extra_len, 0);
    // The payload is followed by a signed data descriptor.
    assert!(memchr::memmem::find(&bytes, b"PK\x07\x08").is_some());

    // The streaming reader recovers the entry without any seeks.
    let mut reader = ZipStreamReader::new(&bytes[..]);
    let entry = reader.next_entry()?.expect("one entry");
    assert_eq!(entry.name, "flow.txt");
    assert_eq!(entry.size, None, "sizes arrive with the descriptor");
    let mut decoded = String::new();
    reader.read_to_string(&mut decoded)?;
    assert_eq!(decoded, contents);
    let closed = reader.close_entry()?;
    assert_eq!(closed.size, Some(contents.len() as u64));
    assert!(closed.compressed_size.is_some());
    assert!(reader.next_entry()?.is_none());

    // And so does the seekable reader, descriptor and all.
    let archive = ZipArchive::new(&bytes)?;
    let entry = &archive.entries()[0];
    assert_eq!(entry.size, Some(contents.len() as u64));
    let mut via_archive = String::new();
    archive.read(entry)?.read_to_string(&mut via_archive)?;
    assert_eq!(via_archive, contents);
    Ok(())
}

#[test]
fn streaming_yields_entries_in_physical_order() -> Result<()> {
    init_logging();
    let mut out = Vec::new();
    {
        let mut writer = ZipWriter::streaming(&mut out);
        for name in ["first.txt", "second.txt", "third.txt"] {
            writer.put_entry(ZipEntry::new(name))?;
            writer.write_all(name.as_bytes())?;
        }
        writer.finish()?;
    }

    let mut reader = ZipStreamReader::new(&out[..]);
    let mut seen = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        seen.push(entry.name.clone());
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        assert_eq!(contents, entry.name);
    }
    assert_eq!(seen, ["first.txt", "second.txt", "third.txt"]);
    Ok(())
}

#[test]
fn preamble_garbage_is_tolerated_up_to_4k() -> Result<()> {
    init_logging();
    let (archive, _) = streamed_archive("buried.txt", b"dig me out")?;

    let mut garbage = b"MZ self-extractor stub ".repeat(170); // ~3.9 KiB
    assert!(garbage.len() < 4096);
    garbage.extend_from_slice(&archive);

    let mut reader = ZipStreamReader::new(&garbage[..]);
    let entry = reader.next_entry()?.expect("entry behind the stub");
    assert_eq!(entry.name, "buried.txt");
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    assert_eq!(contents, "dig me out");
    Ok(())
}

#[test]
fn garbage_past_the_search_window_fails() -> Result<()> {
    init_logging();
    let (archive, _) = streamed_archive("deep.txt", b"too deep")?;
    let mut garbage = vec![b'x'; 5000];
    garbage.extend_from_slice(&archive);

    let mut reader = ZipStreamReader::new(&garbage[..]);
    match reader.next_entry() {
        Err(ZipError::BadSignature(_)) => {}
        other => panic!("5000 garbage bytes gave {other:?}"),
    }
    Ok(())
}

#[test]
fn split_marker_is_consumed() -> Result<()> {
    init_logging();
    let (archive, _) = streamed_archive("only-segment.txt", b"contents")?;
    let mut marked = b"PK00".to_vec();
    marked.extend_from_slice(&archive);

    let mut reader = ZipStreamReader::new(&marked[..]);
    let entry = reader.next_entry()?.expect("entry after the marker");
    assert_eq!(entry.name, "only-segment.txt");
    Ok(())
}

#[test]
fn spanned_marker_needs_opt_in() -> Result<()> {
    init_logging();
    let (archive, _) = streamed_archive("spanned.txt", b"contents")?;
    let mut marked = b"PK\x07\x08".to_vec();
    marked.extend_from_slice(&archive);

    let mut reader = ZipStreamReader::new(&marked[..]);
    match reader.next_entry() {
        Err(ZipError::UnsupportedArchive(message)) => {
            assert!(message.contains("split"), "{message}");
        }
        other => panic!("spanned marker without opt-in gave {other:?}"),
    }

    let options = StreamOptions {
        skip_split_marker: true,
        ..StreamOptions::default()
    };
    let mut reader = ZipStreamReader::with_options(&marked[..], options);
    assert_eq!(reader.next_entry()?.unwrap().name, "spanned.txt");
    Ok(())
}

/// Hand-builds a STORED entry with a data descriptor, which our writer
/// (rightly) refuses to produce.
fn stored_with_descriptor(name: &[u8], contents: &[u8], signed_descriptor: bool) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(contents);
    let crc = hasher.finalize();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"PK\x03\x04");
    bytes.extend_from_slice(&10u16.to_le_bytes()); // version needed
    bytes.extend_from_slice(&(1u16 << 3).to_le_bytes()); // descriptor flag
    bytes.extend_from_slice(&0u16.to_le_bytes()); // stored
    bytes.extend_from_slice(&0u32.to_le_bytes()); // dos time
    bytes.extend_from_slice(&[0; 12]); // crc + sizes: zeros
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(name);
    bytes.extend_from_slice(contents);
    if signed_descriptor {
        bytes.extend_from_slice(b"PK\x07\x08");
    }
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&(contents.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(contents.len() as u32).to_le_bytes());
    // Close out with a bare end record so the walk stops cleanly.
    bytes.extend_from_slice(b"PK\x05\x06");
    bytes.extend_from_slice(&[0; 18]);
    bytes
}

#[test]
fn stored_descriptor_recovery_needs_opt_in() -> Result<()> {
    init_logging();
    let bytes = stored_with_descriptor(b"s.bin", b"hello world", true);

    let mut reader = ZipStreamReader::new(&bytes[..]);
    match reader.next_entry() {
        Err(ZipError::UnsupportedArchive(message)) => {
            assert!(message.contains("STORED"), "{message}");
        }
        other => panic!("stored + descriptor without opt-in gave {other:?}"),
    }
    Ok(())
}

#[test]
fn stored_descriptor_recovery_finds_the_payload() -> Result<()> {
    init_logging();
    for signed_descriptor in [true, false] {
        let bytes = stored_with_descriptor(b"s.bin", b"hello world", signed_descriptor);
        let options = StreamOptions {
            allow_stored_entries_with_data_descriptor: true,
            ..StreamOptions::default()
        };
        let mut reader = ZipStreamReader::with_options(&bytes[..], options);
        let entry = reader.next_entry()?.expect("recovered entry");
        assert_eq!(entry.name, "s.bin");
        assert_eq!(entry.size, Some(11));
        assert_eq!(entry.crc32, Some(0x0D4A_1185));
        assert!(!entry.stream_contiguous);

        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        assert_eq!(contents, "hello world");
        assert!(reader.next_entry()?.is_none());
    }
    Ok(())
}

#[test]
fn stored_descriptor_recovery_respects_the_memory_limit() -> Result<()> {
    init_logging();
    let bytes = stored_with_descriptor(b"big.bin", &vec![7u8; 100_000], true);
    let options = StreamOptions {
        allow_stored_entries_with_data_descriptor: true,
        // Less than the guard's fixed headroom: any scan at all trips it.
        memory_limit: 1 << 20,
        ..StreamOptions::default()
    };
    let mut reader = ZipStreamReader::with_options(&bytes[..], options);
    match reader.next_entry() {
        Err(ZipError::MemoryLimit(_)) => {}
        other => panic!("scan under a tiny memory limit gave {other:?}"),
    }
    Ok(())
}

#[test]
fn apk_signing_block_is_skipped() -> Result<()> {
    init_logging();
    let (archive, _) = streamed_archive("app-code.bin", b"dex dex dex")?;

    // Splice a 0x48000-byte signing block in between the last entry's
    // descriptor and the central directory.
    let cd_start = memchr::memmem::find(&archive, b"PK\x01\x02").unwrap();
    let payload_len: u64 = 0x48000;
    let mut block = Vec::new();
    block.extend_from_slice(&payload_len.to_le_bytes());
    block.resize(8 + payload_len as usize - 16, 0xAB);
    block.extend_from_slice(b"APK Sig Block 42");
    assert_eq!(block.len(), 8 + payload_len as usize);

    let mut spliced = archive[..cd_start].to_vec();
    spliced.extend_from_slice(&block);
    spliced.extend_from_slice(&archive[cd_start..]);

    let mut reader = ZipStreamReader::new(&spliced[..]);
    let entry = reader.next_entry()?.expect("the real entry");
    assert_eq!(entry.name, "app-code.bin");
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    assert_eq!(contents, "dex dex dex");
    // The block must not surface as a bogus entry.
    assert!(reader.next_entry()?.is_none());
    Ok(())
}

#[test]
fn foreign_methods_stream_raw_only() -> Result<()> {
    init_logging();
    // Hand-built LFH using method 93 (Zstandard) with made-up payload.
    let payload = b"not actually zstd";
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"PK\x03\x04");
    bytes.extend_from_slice(&20u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&93u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes()); // crc (unchecked)
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&5u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(b"z.zst");
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(b"PK\x05\x06");
    bytes.extend_from_slice(&[0; 18]);

    let mut reader = ZipStreamReader::new(&bytes[..]);
    let entry = reader.next_entry()?.expect("entry");
    assert_eq!(entry.method, Some(CompressionMethod::Zstd));

    // A decoded read refuses...
    let mut buf = [0u8; 8];
    assert!(reader.read(&mut buf).is_err());

    // ...but the raw bytes are reachable.
    let mut raw = Vec::new();
    loop {
        let mut chunk = [0u8; 8];
        let got = reader.read_raw(&mut chunk)?;
        if got == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..got]);
    }
    assert_eq!(raw, payload);
    assert!(reader.next_entry()?.is_none());
    Ok(())
}

#[test]
fn truncated_payload_is_reported() -> Result<()> {
    init_logging();
    // Incompressible payload, so halving the file is sure to cut it.
    let mut state = 0x2545_F491u32;
    let noise: Vec<u8> = (0..4096)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect();
    let (bytes, _) = streamed_archive("cut.bin", &noise)?;
    let truncated = &bytes[..bytes.len() / 2];

    let mut reader = ZipStreamReader::new(truncated);
    let _ = reader.next_entry()?.expect("header is intact");
    let mut sink = Vec::new();
    assert!(
        reader.read_to_end(&mut sink).is_err(),
        "half an archive must not read cleanly"
    );
    Ok(())
}
