//! Tests for packing and reading tutorial containers

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tutorial_pack::{
    detect, read_icon, read_item, read_project_document, BlockRange, Detection, EmbeddedPayload,
    EmbeddedState, ExportProgress, NamedSource, PackError, PackRequest, Packer, PayloadSource,
    FOOTER_LEN, MAGIC,
};

const BASE: &[u8] = b"BASEEXEBAS";
const PROJECT: &[u8] = br#"{"pages":[]}"#;

fn write_base(dir: &Path) -> PathBuf {
    let path = dir.join("player.exe");
    fs::write(&path, BASE).unwrap();
    path
}

fn embedded(path: &Path) -> EmbeddedPayload {
    detect(path)
        .unwrap()
        .into_payload()
        .expect("container should carry an embedded payload")
}

fn full_request(dir: &Path) -> PackRequest {
    let video_path = dir.join("intro.mp4");
    fs::write(&video_path, vec![0xABu8; 5000]).unwrap();

    PackRequest::new(write_base(dir), dir.join("out/tutorial.exe"), PROJECT.to_vec())
        .with_media(NamedSource::new("m1", "intro.mp4", "video/mp4", video_path))
        .with_media(NamedSource::new("m2", "slide.png", "image/png", b"PNGDATA".to_vec()))
        .with_button(NamedSource::new("b1", "next.png", "image/png", b"NEXT".to_vec()))
        .with_button(NamedSource::new("b2", "prev.png", "image/png", b"PREVIOUS".to_vec()))
        .with_app_icon(b"ICONBYTES".to_vec())
}

#[test]
fn test_end_to_end_single_media() {
    let dir = TempDir::new().unwrap();
    let media: Vec<u8> = (0x00..=0x0F).collect();
    let request = PackRequest::new(write_base(dir.path()), dir.path().join("t.exe"), PROJECT)
        .with_media(NamedSource::new("m1", "m1.bin", "video/mp4", media.clone()));

    let output = Packer::new().pack(&request).unwrap();
    let bytes = fs::read(&output.executable).unwrap();

    assert_eq!(output.base_len, 10);
    assert_eq!(&bytes[..10], BASE);
    assert_eq!(&bytes[10..26], media.as_slice());
    assert_eq!(&bytes[26..38], PROJECT);
    assert_eq!(output.size, bytes.len() as u64);

    let manifest_len = bytes.len() - FOOTER_LEN - 38;
    let mut size_field = [0u8; 8];
    size_field.copy_from_slice(&bytes[bytes.len() - 17..bytes.len() - 9]);
    assert_eq!(u64::from_le_bytes(size_field), manifest_len as u64);
    assert_eq!(&bytes[bytes.len() - 9..], MAGIC);

    let detection = detect(&output.executable).unwrap();
    assert!(detection.is_embedded());
    let payload = detection.into_payload().unwrap();
    assert_eq!(payload.read_item("m1").unwrap(), media);
    assert_eq!(payload.read_project_document().unwrap(), PROJECT);
    assert_eq!(payload.read_icon().unwrap(), None);
    assert_eq!(payload.base_image_len(), 10);
}

#[test]
fn test_roundtrip_all_blocks() {
    let dir = TempDir::new().unwrap();
    let request = full_request(dir.path());
    let output = Packer::new().pack(&request).unwrap();

    let payload = embedded(&output.executable);
    assert_eq!(payload.manifest(), &output.manifest);
    assert_eq!(payload.read_project_document().unwrap(), PROJECT);
    assert_eq!(payload.read_item("m1").unwrap(), vec![0xABu8; 5000]);
    assert_eq!(payload.read_item("m2").unwrap(), b"PNGDATA");
    assert_eq!(payload.read_item("b1").unwrap(), b"NEXT");
    assert_eq!(payload.read_item("b2").unwrap(), b"PREVIOUS");
    assert_eq!(payload.read_icon().unwrap(), Some(b"ICONBYTES".to_vec()));

    // Free functions agree with the snapshot
    let manifest = payload.manifest();
    assert_eq!(read_project_document(&output.executable, manifest).unwrap(), PROJECT);
    assert_eq!(read_item(&output.executable, manifest, "b2").unwrap(), b"PREVIOUS");
    assert_eq!(
        read_icon(&output.executable, manifest).unwrap(),
        Some(b"ICONBYTES".to_vec())
    );

    let mut streamed = Vec::new();
    assert_eq!(payload.copy_item_to("m1", &mut streamed).unwrap(), 5000);
    assert_eq!(streamed, vec![0xABu8; 5000]);
}

#[test]
fn test_blocks_in_fixed_order_and_disjoint() {
    let dir = TempDir::new().unwrap();
    let output = Packer::new().pack(&full_request(dir.path())).unwrap();
    let manifest = &output.manifest;

    let mut ranges: Vec<BlockRange> = manifest.items().map(|e| e.range()).collect();
    ranges.push(manifest.app_icon.unwrap());
    ranges.push(manifest.project_document);

    // media, buttons, icon, project document: back-to-back from the base length
    let mut expected_offset = output.base_len;
    for range in &ranges {
        assert_eq!(range.offset, expected_offset);
        expected_offset += range.size;
    }

    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
        }
    }

    let max_end = ranges.iter().map(|r| r.end().unwrap()).max().unwrap();
    assert!(max_end <= output.size - FOOTER_LEN as u64);
}

#[test]
fn test_unknown_item() {
    let dir = TempDir::new().unwrap();
    let output = Packer::new().pack(&full_request(dir.path())).unwrap();
    let payload = embedded(&output.executable);

    match payload.read_item("missing") {
        Err(PackError::UnknownItem(id)) => assert_eq!(id, "missing"),
        other => panic!("expected UnknownItem, got {:?}", other),
    }
}

#[test]
fn test_not_embedded_files() {
    let dir = TempDir::new().unwrap();
    let cases: [(&str, &[u8]); 4] = [
        ("empty", b""),
        ("one", b"M"),
        ("plain", b"MZ just a regular executable image with no footer"),
        ("almost", b"....................VISTUT_V2"),
    ];
    for (name, content) in cases {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        assert!(
            matches!(detect(&path).unwrap(), Detection::NotEmbedded),
            "{} should not be embedded",
            name
        );
    }
}

#[test]
fn test_every_manifest_byte_flip_is_detected() {
    let dir = TempDir::new().unwrap();
    let output = Packer::new().pack(&full_request(dir.path())).unwrap();
    let original = fs::read(&output.executable).unwrap();
    let manifest_start = embedded(&output.executable).manifest_offset() as usize;
    let manifest_end = original.len() - FOOTER_LEN;

    let damaged = dir.path().join("damaged.exe");
    for index in manifest_start..manifest_end {
        for mask in [0x01u8, 0xFF] {
            let mut bytes = original.clone();
            bytes[index] ^= mask;
            fs::write(&damaged, &bytes).unwrap();

            match detect(&damaged) {
                Err(e) => assert!(e.is_corruption(), "byte {} gave {}", index, e),
                Ok(_) => panic!("flipping byte {} with {:#04x} went unnoticed", index, mask),
            }
        }
    }
}

#[test]
fn test_truncated_container_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let output = Packer::new().pack(&full_request(dir.path())).unwrap();
    let bytes = fs::read(&output.executable).unwrap();

    // Keep the footer but drop the front of the file, including part of the manifest
    let truncated = dir.path().join("truncated.exe");
    let manifest_offset = embedded(&output.executable).manifest_offset() as usize;
    let manifest_len = bytes.len() - FOOTER_LEN - manifest_offset;
    let keep_from = bytes.len() - FOOTER_LEN - manifest_len / 2;
    fs::write(&truncated, &bytes[keep_from..]).unwrap();

    let err = detect(&truncated).unwrap_err();
    assert!(err.is_corruption());
    assert!(matches!(EmbeddedState::probe(&truncated), EmbeddedState::Corrupt(_)));
}

#[test]
fn test_patch_runs_before_append_and_may_resize() {
    let dir = TempDir::new().unwrap();
    let request = full_request(dir.path());

    // Simulates a resource editor that grows the executable
    let packer = Packer::new().with_patch(|exe: &Path| -> tutorial_pack::PackResult<()> {
        let mut bytes = fs::read(exe)?;
        assert!(!bytes.ends_with(MAGIC), "patch must see the bare base image");
        bytes.splice(4..4, vec![0xEEu8; 4096]);
        fs::write(exe, bytes)?;
        Ok(())
    });
    let output = packer.pack(&request).unwrap();

    assert_eq!(output.base_len, BASE.len() as u64 + 4096);
    let payload = embedded(&output.executable);
    assert_eq!(payload.read_item("m1").unwrap(), vec![0xABu8; 5000]);
    assert_eq!(payload.read_item("b2").unwrap(), b"PREVIOUS");
    assert_eq!(payload.read_project_document().unwrap(), PROJECT);
}

#[test]
fn test_patching_after_append_breaks_roundtrip() {
    let dir = TempDir::new().unwrap();
    let output = Packer::new().pack(&full_request(dir.path())).unwrap();
    let packed = fs::read(&output.executable).unwrap();

    // Resource edit inside the base image after payload append shifts every block
    let mut shifted = packed.clone();
    shifted.splice(4..4, vec![0xEEu8; 512]);
    let shifted_path = dir.path().join("shifted.exe");
    fs::write(&shifted_path, &shifted).unwrap();

    let roundtrip_ok = match detect(&shifted_path) {
        Ok(Detection::Embedded(payload)) => {
            payload.read_item("m1").ok() == Some(vec![0xABu8; 5000])
                && payload.read_item("b1").ok() == Some(b"NEXT".to_vec())
                && payload.read_project_document().ok() == Some(PROJECT.to_vec())
        }
        _ => false,
    };
    assert!(!roundtrip_ok);

    // Resource data appended past the footer hides the payload entirely
    let mut appended = packed;
    appended.extend_from_slice(&[0u8; 256]);
    let appended_path = dir.path().join("appended.exe");
    fs::write(&appended_path, &appended).unwrap();
    assert!(!detect(&appended_path).unwrap().is_embedded());
}

#[test]
fn test_failed_patch_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let request = full_request(dir.path());
    fs::create_dir_all(dir.path().join("out")).unwrap();
    fs::write(&request.output, b"previous export").unwrap();

    let packer = Packer::new().with_patch(|_: &Path| -> tutorial_pack::PackResult<()> {
        Err(PackError::ResourceEdit("rcedit exited with 1".to_string()))
    });
    let err = packer.pack(&request).unwrap_err();
    assert!(matches!(err, PackError::ExternalStep(_)));

    assert_eq!(fs::read(&request.output).unwrap(), b"previous export");
    let leftovers: Vec<_> = fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "unexpected files: {:?}", leftovers);
}

#[test]
fn test_failure_during_append_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.mp4");
    let second = dir.path().join("second.mp4");
    fs::write(&first, vec![1u8; 4096]).unwrap();
    fs::write(&second, vec![2u8; 4096]).unwrap();

    let out_dir = dir.path().join("out");
    let request = PackRequest::new(write_base(dir.path()), out_dir.join("t.exe"), PROJECT)
        .with_media(NamedSource::new("m1", "first.mp4", "video/mp4", first))
        .with_media(NamedSource::new("m2", "second.mp4", "video/mp4", second.clone()));

    // The second source disappears after the first block has been appended
    let mut sink = |p: &ExportProgress| {
        if p.index == 0 {
            fs::remove_file(&second).unwrap();
        }
    };
    let err = Packer::new()
        .with_buffer_size(512)
        .pack_with_progress(&request, &mut sink)
        .unwrap_err();
    assert!(matches!(err, PackError::Io(_)), "unexpected error: {:?}", err);

    assert!(!request.output.exists());
    let leftovers: Vec<_> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
}

#[test]
fn test_preconditions() {
    let dir = TempDir::new().unwrap();

    let missing_base = PackRequest::new(dir.path().join("nope.exe"), dir.path().join("a.exe"), PROJECT);
    assert!(matches!(
        Packer::new().pack(&missing_base),
        Err(PackError::BaseImageUnreadable { .. })
    ));

    let missing_source = PackRequest::new(write_base(dir.path()), dir.path().join("b.exe"), PROJECT)
        .with_media(NamedSource::new("m1", "gone.mp4", "video/mp4", dir.path().join("gone.mp4")));
    assert!(matches!(
        Packer::new().pack(&missing_source),
        Err(PackError::SourceNotFound(_))
    ));
    assert!(!dir.path().join("b.exe").exists());

    let duplicate = PackRequest::new(write_base(dir.path()), dir.path().join("c.exe"), PROJECT)
        .with_media(NamedSource::new("x", "a.png", "image/png", vec![1u8]))
        .with_button(NamedSource::new("x", "b.png", "image/png", vec![2u8]));
    assert!(matches!(
        Packer::new().pack(&duplicate),
        Err(PackError::DuplicateId(_))
    ));

    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"file, not a directory").unwrap();
    let unwritable = PackRequest::new(write_base(dir.path()), blocker.join("d.exe"), PROJECT);
    assert!(matches!(
        Packer::new().pack(&unwritable),
        Err(PackError::OutputUnwritable { .. })
    ));
}

#[test]
fn test_large_file_source_matches_inline() {
    let dir = TempDir::new().unwrap();
    let base = write_base(dir.path());
    let content: Vec<u8> = (0..20 * 1024 * 1024u32)
        .map(|i| (i.wrapping_mul(31) >> 3) as u8)
        .collect();
    let video = dir.path().join("big.mp4");
    fs::write(&video, &content).unwrap();

    let by_path = PackRequest::new(&base, dir.path().join("by_path.exe"), PROJECT)
        .with_media(NamedSource::new("v", "big.mp4", "video/mp4", PayloadSource::File(video)));
    let inline = PackRequest::new(&base, dir.path().join("inline.exe"), PROJECT)
        .with_media(NamedSource::new("v", "big.mp4", "video/mp4", content.clone()));

    let packer = Packer::new().with_buffer_size(64 * 1024);
    let a = packer.pack(&by_path).unwrap();
    let b = packer.pack(&inline).unwrap();

    assert_eq!(fs::read(&a.executable).unwrap(), fs::read(&b.executable).unwrap());
    assert_eq!(embedded(&a.executable).read_item("v").unwrap(), content);
}

#[test]
fn test_progress_reports_each_block() {
    let dir = TempDir::new().unwrap();
    let request = full_request(dir.path());
    let mut events: Vec<ExportProgress> = Vec::new();

    let mut sink = |p: &ExportProgress| events.push(p.clone());
    Packer::new().pack_with_progress(&request, &mut sink).unwrap();

    // 2 media + 2 buttons + icon + project document
    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|e| e.total == 6));
    assert_eq!(events[0].name, "media 'intro.mp4'");
    assert_eq!(events[5].name, "project document");
    assert!((events[5].percent - 100.0).abs() < f64::EPSILON);
}

#[test]
fn test_existing_output_is_replaced() {
    let dir = TempDir::new().unwrap();
    let request = full_request(dir.path());
    fs::create_dir_all(dir.path().join("out")).unwrap();
    fs::write(&request.output, vec![7u8; 100_000]).unwrap();

    let output = Packer::new().pack(&request).unwrap();
    assert_eq!(fs::metadata(&request.output).unwrap().len(), output.size);
    assert_eq!(embedded(&request.output).read_item("b1").unwrap(), b"NEXT");
}

#[test]
fn test_detection_metrics_and_state() {
    let dir = TempDir::new().unwrap();
    let output = Packer::new().pack(&full_request(dir.path())).unwrap();

    let mut metrics = tutorial_pack::ReadMetrics::new();
    let detection =
        tutorial_pack::detect_with_metrics(&output.executable, Some(&mut metrics)).unwrap();
    assert!(detection.is_embedded());
    let phases: Vec<&str> = metrics.phases().iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(phases, ["footer", "manifest_parse"]);
    assert!(metrics.report().contains("manifest_parse"));

    let payload = detection.into_payload().unwrap();
    assert_eq!(
        payload.read_item_with_metrics("m2", &mut metrics).unwrap(),
        b"PNGDATA"
    );
    assert_eq!(
        payload.read_project_document_with_metrics(&mut metrics).unwrap(),
        PROJECT
    );
    let phases: Vec<&str> = metrics.phases().iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        phases,
        ["footer", "manifest_parse", "item 'm2'", "project_document"]
    );
    metrics.log_report();

    let state = EmbeddedState::probe(&output.executable);
    assert_eq!(state.describe(), "Packaged tutorial with 2 media and 2 buttons");
    let payload = state.payload().unwrap();
    assert_eq!(payload.read_item("b2").unwrap(), b"PREVIOUS");
}
