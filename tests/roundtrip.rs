//! Write-then-read (and read-then-rewrite) round trips over archives
//! with a realistic mix of entries.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use tailzip::{CompressionMethod, MatchPath, ZipArchive, ZipEntry, ZipWriter};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A blob that actually exercises the compressor: repetitive enough to
/// shrink, varied enough to need real Huffman tables.
fn lorem_blob(len: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog; "
        .iter()
        .copied()
        .cycle()
        .enumerate()
        .map(|(i, b)| b.wrapping_add((i / 997) as u8))
        .take(len)
        .collect()
}

struct TestFile {
    name: &'static str,
    method: CompressionMethod,
    data: Vec<u8>,
}

fn fixture_files() -> Vec<TestFile> {
    vec![
        TestFile {
            name: "readme.txt",
            method: CompressionMethod::Deflate,
            data: lorem_blob(400),
        },
        TestFile {
            name: "assets/",
            method: CompressionMethod::Stored,
            data: Vec::new(),
        },
        TestFile {
            name: "assets/blob.bin",
            method: CompressionMethod::Deflate,
            data: lorem_blob(40_000),
        },
        TestFile {
            name: "assets/raw.dat",
            method: CompressionMethod::Stored,
            data: lorem_blob(1_000),
        },
        TestFile {
            name: "docs/readme.txt",
            method: CompressionMethod::Deflate,
            data: lorem_blob(70),
        },
    ]
}

fn write_archive(path: &Path, files: &[TestFile]) -> Result<()> {
    let mut writer = ZipWriter::create(path)?;
    for file in files {
        writer.set_method(file.method);
        writer.put_next_entry(ZipEntry::new(file.name), &mut &file.data[..])?;
    }
    writer.set_comment(&b"fixture archive"[..]);
    writer.close()?;
    Ok(())
}

fn read_all(archive: &ZipArchive, entry: &ZipEntry) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    archive.read_verified(entry)?.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[test]
fn written_archives_read_back_identically() -> Result<()> {
    init_logging();

    let files = fixture_files();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fixture.zip");
    write_archive(&path, &files)?;

    let archive = ZipArchive::open(&path)?;
    assert_eq!(archive.entries().len(), files.len());
    assert_eq!(archive.comment(), b"fixture archive");

    for (entry, expected) in archive.entries().iter().zip(&files) {
        assert_eq!(entry.name, expected.name, "order must be preserved");
        assert_eq!(entry.method, expected.method);
        assert_eq!(entry.size as usize, expected.data.len());
        assert_eq!(entry.crc32, crc32fast::hash(&expected.data));
        assert_eq!(read_all(&archive, entry)?, expected.data);
    }

    // Deflate earned its keep on the compressible blob.
    let blob = archive
        .entry("assets/blob.bin", MatchPath::Match)
        .context("blob entry missing")?;
    assert!(blob.compressed_size < blob.size);
    Ok(())
}

#[test]
fn reading_and_rewriting_preserves_everything() -> Result<()> {
    init_logging();

    let files = fixture_files();
    let dir = tempfile::tempdir()?;
    let first_path = dir.path().join("first.zip");
    write_archive(&first_path, &files)?;

    // Pump every entry of the first archive into a second one.
    let first = ZipArchive::open(&first_path)?;
    let second_path = dir.path().join("second.zip");
    let mut writer = ZipWriter::create(&second_path)?;
    for entry in first.entries() {
        writer.set_method(entry.method);
        let mut meta = ZipEntry::new(&*entry.name);
        meta.dos_time = entry.dos_time;
        writer.put_next_entry(meta, &mut first.read(entry)?)?;
    }
    writer.close()?;

    let second = ZipArchive::open(&second_path)?;
    assert_eq!(second.entries().len(), first.entries().len());
    for (rewritten, original) in second.entries().iter().zip(first.entries()) {
        assert_eq!(rewritten.name, original.name);
        assert_eq!(rewritten.method, original.method);
        assert_eq!(rewritten.size, original.size);
        assert_eq!(rewritten.crc32, original.crc32);
        assert_eq!(rewritten.dos_time, original.dos_time);
        assert_eq!(read_all(&second, rewritten)?, read_all(&first, original)?);
    }
    Ok(())
}

#[test]
fn lookups_respect_the_match_mode() -> Result<()> {
    init_logging();

    let files = fixture_files();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lookup.zip");
    write_archive(&path, &files)?;
    let archive = ZipArchive::open(&path)?;

    // Full-path matching is exact.
    assert!(archive.entry("assets/raw.dat", MatchPath::Match).is_some());
    assert!(archive.entry("raw.dat", MatchPath::Match).is_none());

    // Basename matching ignores the directories...
    let found = archive
        .entry("raw.dat", MatchPath::Ignore)
        .context("basename lookup failed")?;
    assert_eq!(found.name, "assets/raw.dat");

    // ...and ties go to the first entry in directory order.
    let duplicate = archive
        .entry("readme.txt", MatchPath::Ignore)
        .context("duplicate basename lookup failed")?;
    assert_eq!(duplicate.name, "readme.txt");

    // input_stream reports a missing entry as None, not an error.
    assert!(archive.input_stream("no/such.file", MatchPath::Match)?.is_none());

    let mut via_stream = Vec::new();
    archive
        .input_stream("docs/readme.txt", MatchPath::Match)?
        .context("stream lookup failed")?
        .read_to_end(&mut via_stream)?;
    assert_eq!(via_stream, files[4].data);
    Ok(())
}

#[test]
fn non_ascii_names_survive_the_trip() -> Result<()> {
    init_logging();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("utf8.zip");
    let mut writer = ZipWriter::create(&path)?;
    writer.put_next_entry(ZipEntry::new("noter/smörgåsbord.txt"), &mut &b"pickled herring"[..])?;
    writer.close()?;

    let archive = ZipArchive::open(&path)?;
    let entry = archive
        .entry("noter/smörgåsbord.txt", MatchPath::Match)
        .context("non-ASCII name lost")?;
    assert_eq!(read_all(&archive, entry)?, b"pickled herring");
    Ok(())
}

#[test]
fn stored_level_requests_become_stored_entries() -> Result<()> {
    init_logging();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("level0.zip");
    let mut writer = ZipWriter::create(&path)?;
    // Deflate at level 0 is a contradiction; the writer stores instead.
    writer.set_method(CompressionMethod::Deflate);
    writer.set_level(0);
    writer.put_next_entry(ZipEntry::new("as-is.bin"), &mut &lorem_blob(500)[..])?;
    writer.close()?;

    let archive = ZipArchive::open(&path)?;
    let entry = &archive.entries()[0];
    assert_eq!(entry.method, CompressionMethod::Stored);
    assert_eq!(entry.compressed_size, entry.size);
    assert_eq!(read_all(&archive, entry)?, lorem_blob(500));
    Ok(())
}

#[test]
fn many_entries_round_trip() -> Result<()> {
    init_logging();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("many.zip");
    let mut writer = ZipWriter::create(&path)?;
    for i in 0..200 {
        let name = format!("bucket_{:02}/item_{:03}.txt", i % 7, i);
        let body = format!("contents of item {}\n", i);
        writer.put_next_entry(ZipEntry::new(name), &mut body.as_bytes())?;
    }
    writer.close()?;

    let archive = ZipArchive::open(&path)?;
    assert_eq!(archive.entries().len(), 200);
    for (i, entry) in archive.entries().iter().enumerate() {
        assert_eq!(entry.name, format!("bucket_{:02}/item_{:03}.txt", i % 7, i));
        let expected = format!("contents of item {}\n", i);
        assert_eq!(read_all(&archive, entry)?, expected.as_bytes());
    }
    Ok(())
}

#[test]
fn concurrent_entry_readers_are_independent() -> Result<()> {
    init_logging();

    let files = fixture_files();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("parallel.zip");
    write_archive(&path, &files)?;
    let archive = ZipArchive::open(&path)?;

    // Open two streams, interleave the reads, and make sure neither
    // clobbers the other's position.
    let blob = archive.entry("assets/blob.bin", MatchPath::Match).unwrap();
    let raw = archive.entry("assets/raw.dat", MatchPath::Match).unwrap();
    let mut blob_reader = archive.read(blob)?;
    let mut raw_reader = archive.read(raw)?;

    let mut blob_bytes = Vec::new();
    let mut raw_bytes = Vec::new();
    let mut chunk = [0u8; 333];
    loop {
        let from_blob = blob_reader.read(&mut chunk)?;
        blob_bytes.extend_from_slice(&chunk[..from_blob]);
        let from_raw = raw_reader.read(&mut chunk)?;
        raw_bytes.extend_from_slice(&chunk[..from_raw]);
        if from_blob == 0 && from_raw == 0 {
            break;
        }
    }
    assert_eq!(blob_bytes, files[2].data);
    assert_eq!(raw_bytes, files[3].data);
    Ok(())
}

#[test]
fn embedded_archives_round_trip_through_open_at() -> Result<()> {
    init_logging();

    let files = fixture_files();
    let dir = tempfile::tempdir()?;
    let zip_path = dir.path().join("inner.zip");
    write_archive(&zip_path, &files)?;
    let zip_bytes = fs::read(&zip_path)?;

    // Sandwich the archive between host data on both sides and open it
    // with explicit offsets.
    let mut host = vec![0x11; 4096];
    host.extend_from_slice(&zip_bytes);
    host.extend_from_slice(&[0x22; 512]);
    let host_path = dir.path().join("sandwich.bin");
    fs::write(&host_path, &host)?;

    let archive = ZipArchive::open_at(&host_path, 4096, 512)?;
    assert_eq!(archive.entries().len(), files.len());
    for (entry, expected) in archive.entries().iter().zip(&files) {
        assert_eq!(read_all(&archive, entry)?, expected.data);
    }
    Ok(())
}
