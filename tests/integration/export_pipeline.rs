use librarian::device::MockTransport;
use librarian::error::LibrarianError;
use librarian::export::{ExportDestination, ExportEngine};
use librarian::import::{ImportEngine, ImportSource};
use librarian::prompt::ScriptedPrompter;
use librarian::store::{Library, SortSpec};
use serde_json::Value;

use crate::common::{three_preset_doc, write_doc};

fn seeded_library(dir: &std::path::Path) -> (Library, Vec<i64>) {
    let path = write_doc(dir, "presets.json", &three_preset_doc());
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let mut db = Library::in_memory().unwrap();
    ImportEngine::new(&mut db, &transport, &mut prompter)
        .run(&ImportSource::File(path), &[], &[], true)
        .unwrap();
    let lids = db
        .query(&[], &SortSpec::default())
        .unwrap()
        .iter()
        .map(|r| r.lid)
        .collect();
    (db, lids)
}

#[test]
fn test_export_file_roundtrips_through_import() {
    let dir = tempfile::tempdir().unwrap();
    let (mut db, lids) = seeded_library(dir.path());

    let out_path = dir.path().join("export.json");
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let summary = ExportEngine::new(&db, &transport, &mut prompter)
        .run(&lids, &ExportDestination::File(out_path.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(summary.records, 3);

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let parsed: Value = serde_json::from_str(&raw).unwrap();
    let obj = parsed.as_object().unwrap();
    assert_eq!(obj.len(), 4);
    assert_eq!(obj["0"], serde_json::json!({}));
    assert!(obj.contains_key("1") && obj.contains_key("2") && obj.contains_key("3"));

    // The exported document imports back verbatim
    let before: Vec<String> = db
        .query(&[], &SortSpec::default())
        .unwrap()
        .into_iter()
        .map(|r| r.pdata)
        .collect();
    let mut prompter = ScriptedPrompter::default();
    let outcome = ImportEngine::new(&mut db, &transport, &mut prompter)
        .run(&ImportSource::File(out_path), &[], &[], false)
        .unwrap();
    assert_eq!(outcome.imported, 3);

    let all = db.query(&[], &SortSpec::default()).unwrap();
    assert_eq!(all.len(), 6);
    let after: Vec<&str> = all[3..].iter().map(|r| r.pdata.as_str()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_export_declined_overwrite_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    let (db, lids) = seeded_library(dir.path());

    let out_path = write_doc(dir.path(), "export.json", "precious");
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::new(["n"]);
    let summary = ExportEngine::new(&db, &transport, &mut prompter)
        .run(&lids, &ExportDestination::File(out_path.clone()))
        .unwrap();
    assert!(summary.is_none());
    assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "precious");
}

#[test]
fn test_export_device_uploads_and_resets() {
    let dir = tempfile::tempdir().unwrap();
    let (db, lids) = seeded_library(dir.path());
    db.insert_palette(lids[0], 255, "[[0,255,0,0]]").unwrap();
    // Placeholder left by an import whose resource was missing
    db.insert_ledmap(lids[0], 3, "").unwrap();

    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let summary = ExportEngine::new(&db, &transport, &mut prompter)
        .run(&lids, &ExportDestination::Device)
        .unwrap()
        .unwrap();
    assert!(summary.device_reset);
    assert_eq!(summary.side_files, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].contains("ledmap3.json"));

    let uploads = transport.uploads();
    let names: Vec<&str> = uploads.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["presets.json", "palette1.json"]);
    assert!(uploads[0].1.starts_with("{\"0\":{}"));
    assert_eq!(transport.reboot_count(), 1);
}

#[test]
fn test_export_unknown_lid_rejected_before_output() {
    let dir = tempfile::tempdir().unwrap();
    let (db, _) = seeded_library(dir.path());

    let out_path = dir.path().join("export.json");
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let result = ExportEngine::new(&db, &transport, &mut prompter)
        .run(&[999], &ExportDestination::File(out_path.clone()));
    assert!(matches!(
        result,
        Err(LibrarianError::RecordNotFound { lid: 999 })
    ));
    assert!(!out_path.exists());
}

#[test]
fn test_export_offline_device_is_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let (db, lids) = seeded_library(dir.path());

    let transport = MockTransport::new();
    transport.set_offline(true);
    let mut prompter = ScriptedPrompter::default();
    let result = ExportEngine::new(&db, &transport, &mut prompter)
        .run(&lids, &ExportDestination::Device);
    assert!(matches!(
        result,
        Err(LibrarianError::DeviceUnreachable { .. })
    ));
}
