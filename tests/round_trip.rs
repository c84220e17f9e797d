use std::fs;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::os::unix::fs::{symlink, FileTypeExt, MetadataExt};
use std::path::Path;

use tempfile::tempdir;
use wytar::{read_archive, Archive, ArchiveWriter, EntryType, Extractor};

/// Writes `paths` (relative to `root`) into a fresh in-memory archive.
fn archive_of(root: &Path, paths: &[&str]) -> Result<(Cursor<Vec<u8>>, Archive, u64), Box<dyn std::error::Error>> {
    let mut stream = Cursor::new(Vec::new());
    let (archive, written) = ArchiveWriter::new(&mut stream).root(root).write(Archive::new(), paths)?;
    Ok((stream, archive, written))
}

#[test]
fn test_file_and_directory_survive_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    fs::write(src.path().join("a.txt"), "hello world")?;
    fs::create_dir(src.path().join("d"))?;
    fs::write(src.path().join("d/b.txt"), "")?;

    let (mut stream, _, _) = archive_of(src.path(), &["a.txt", "d"])?;

    stream.seek(SeekFrom::Start(0))?;
    let archive = read_archive(&mut stream)?;
    let names: Vec<_> = archive.iter().map(|e| e.name_lossy().into_owned()).collect();
    assert_eq!(names, vec!["a.txt", "d/", "d/b.txt"]);
    assert_eq!(archive.find(b"a.txt").map(|e| e.size), Some(11));
    assert_eq!(archive.find(b"d/b.txt").map(|e| e.size), Some(0));

    let out = tempdir()?;
    let summary = Extractor::new(&mut stream).root(out.path()).extract::<&str>(&archive, &[])?;
    assert_eq!(summary.extracted, 3);

    assert_eq!(fs::read_to_string(out.path().join("a.txt"))?, "hello world");
    assert!(out.path().join("d").is_dir());
    assert_eq!(fs::metadata(out.path().join("d/b.txt"))?.len(), 0);
    Ok(())
}

#[test]
fn test_symlinks_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    fs::write(src.path().join("target.txt"), "payload")?;
    symlink("target.txt", src.path().join("link"))?;

    let (mut stream, original, _) = archive_of(src.path(), &["target.txt", "link"])?;
    let link = &original.entries()[1];
    assert_eq!(link.entry_type, EntryType::Symlink);
    assert_eq!(link.size, 0);

    stream.seek(SeekFrom::Start(0))?;
    let archive = read_archive(&mut stream)?;
    assert_eq!(archive, original);

    let out = tempdir()?;
    Extractor::new(&mut stream).root(out.path()).extract::<&str>(&archive, &[])?;
    assert_eq!(fs::read_link(out.path().join("link"))?, Path::new("target.txt"));
    assert_eq!(fs::read_to_string(out.path().join("link"))?, "payload");
    Ok(())
}

#[test]
fn test_duplicate_input_is_stored_once() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    let content = vec![0xa5u8; 3000];
    fs::write(src.path().join("big.bin"), &content)?;

    let (stream, archive, _) = archive_of(src.path(), &["big.bin", "big.bin"])?;
    let entries = archive.entries();
    assert_eq!(entries[1].entry_type, EntryType::Hardlink);
    assert_eq!(entries[1].link_name, entries[0].name);

    // payload bytes appear exactly once in the stream
    let bytes = stream.into_inner();
    let payload_bytes = bytes.iter().filter(|b| **b == 0xa5).count();
    assert_eq!(payload_bytes, content.len());
    Ok(())
}

#[test]
fn test_archive_ends_with_zeroed_record() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    for (name, len) in [("empty", 0usize), ("small", 100), ("block", 512), ("odd", 9000)] {
        fs::write(src.path().join(name), vec![1u8; len])?;
    }

    for inputs in [&["empty"][..], &["small", "block"][..], &["odd", "small", "block", "empty"][..]] {
        let (stream, archive, written) = archive_of(src.path(), inputs)?;
        let bytes = stream.into_inner();
        assert_eq!(written, bytes.len() as u64);
        assert_eq!(bytes.len() % 10240, 0);

        let content_end = archive.end_offset().unwrap_or(0) as usize;
        assert!(bytes.len() - content_end >= 1024);
        assert!(bytes[content_end..].iter().all(|b| *b == 0));
    }
    Ok(())
}

#[test]
fn test_directory_with_n_files_yields_n_plus_one_entries() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    fs::create_dir(src.path().join("tree"))?;
    for i in 0..7 {
        fs::write(src.path().join(format!("tree/f{i}")), format!("file {i}"))?;
    }

    let (_, archive, _) = archive_of(src.path(), &["tree"])?;
    assert_eq!(archive.len(), 8);
    assert_eq!(archive.entries()[0].entry_type, EntryType::Directory);
    assert!(archive.iter().skip(1).all(|e| e.name.starts_with(b"tree/f")));
    Ok(())
}

#[test]
fn test_empty_directory_has_zero_size() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    fs::create_dir(src.path().join("void"))?;

    let (stream, archive, _) = archive_of(src.path(), &["void"])?;
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.entries()[0].name, b"void/");

    let bytes = stream.into_inner();
    assert_eq!(&bytes[124..136], b"00000000000\0");
    Ok(())
}

#[test]
fn test_selected_extract_reads_payload_at_offset() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    fs::write(src.path().join("one"), vec![b'1'; 700])?;
    fs::write(src.path().join("two"), vec![b'2'; 5])?;

    let (mut stream, archive, _) = archive_of(src.path(), &["one", "two"])?;
    // leave the stream somewhere unrelated first
    stream.seek(SeekFrom::End(0))?;

    let out = tempdir()?;
    Extractor::new(&mut stream).root(out.path()).extract(&archive, &["two"])?;
    let mut extracted = String::new();
    fs::File::open(out.path().join("two"))?.read_to_string(&mut extracted)?;
    assert_eq!(extracted, "22222");
    Ok(())
}

#[test]
fn test_character_device_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = Cursor::new(Vec::new());
    let (written, _) = ArchiveWriter::new(&mut stream).root("/").write(Archive::new(), &["/dev/null"])?;
    assert_eq!(written.entries()[0].entry_type, EntryType::CharDevice);

    stream.seek(SeekFrom::Start(0))?;
    let archive = read_archive(&mut stream)?;
    let null = &archive.entries()[0];
    assert_eq!(null.name, b"dev/null");
    assert_eq!(null.entry_type, EntryType::CharDevice);
    assert_eq!((null.major, null.minor), (1, 3));
    assert_eq!(null.size, 0);

    // creating device nodes needs privileges the test may not have
    let scratch = tempdir()?;
    if wytar::fsx::mknod(&scratch.path().join("node"), libc::S_IFCHR, 0o666, 1, 3).is_err() {
        return Ok(());
    }

    let out = tempdir()?;
    Extractor::new(&mut stream).root(out.path()).extract::<&str>(&archive, &[])?;
    let meta = fs::symlink_metadata(out.path().join("dev/null"))?;
    assert!(meta.file_type().is_char_device());
    assert_eq!(wytar::fsx::split_dev(meta.rdev()), (1, 3));
    Ok(())
}

#[test]
fn test_deduplicated_archive_extracts() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    fs::write(src.path().join("a.txt"), "hello world")?;

    let (mut stream, archive, _) = archive_of(src.path(), &["a.txt", "a.txt"])?;
    assert_eq!(archive.entries()[1].entry_type, EntryType::Hardlink);

    let out = tempdir()?;
    let summary = Extractor::new(&mut stream).root(out.path()).extract::<&str>(&archive, &[])?;
    assert_eq!(summary.extracted, 2);
    assert_eq!(fs::read_to_string(out.path().join("a.txt"))?, "hello world");
    Ok(())
}
