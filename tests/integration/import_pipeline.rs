use librarian::device::MockTransport;
use librarian::import::{ImportEngine, ImportSource};
use librarian::prompt::ScriptedPrompter;
use librarian::store::{Filter, FilterKey, Library, SortSpec};
use serde_json::json;

use crate::common::{doc, playlist_body, preset_body, three_preset_doc, write_doc};

fn import_file(
    db: &mut Library,
    path: std::path::PathBuf,
    answers: &[&str],
    check_duplicates: bool,
) -> librarian::import::ImportOutcome {
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::new(answers.iter().copied());
    ImportEngine::new(db, &transport, &mut prompter)
        .run(&ImportSource::File(path), &[], &[], check_duplicates)
        .unwrap()
}

#[test]
fn test_import_creates_one_record_per_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "presets.json", &three_preset_doc());

    let mut db = Library::in_memory().unwrap();
    let outcome = import_file(&mut db, path, &[], true);
    assert_eq!(outcome.imported, 3);
    assert!(!outcome.aborted);

    let rows = db.query(&[], &SortSpec::default()).unwrap();
    assert_eq!(rows.len(), 3);
    let pids: Vec<u16> = rows.iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![1, 2, 3]);
    // Records with no supplied keywords all land under the default tag
    assert!(rows.iter().all(|r| r.tag == "new"));
    // The reserved "0" entry is never imported
    assert!(rows.iter().all(|r| r.pid != 0));
}

#[test]
fn test_reimport_new_answer_assigns_lowest_unused_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "presets.json", &three_preset_doc());

    let mut db = Library::in_memory().unwrap();
    import_file(&mut db, path.clone(), &[], true);

    // Every incoming record now collides; take a new number for the first,
    // skip the rest
    let outcome = import_file(&mut db, path, &["n", "s", "s"], true);
    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.renumbered, vec![(1, 4)]);

    let rows = db
        .query(
            &[Filter {
                key: FilterKey::Pid,
                values: vec!["4".to_string()],
            }],
            &SortSpec::default(),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].pdata.starts_with("\"4\":"));
}

#[test]
fn test_renumbering_propagates_into_playlists() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_doc(
        dir.path(),
        "first.json",
        &doc(&[(5, preset_body("Shared", 40))]),
    );
    let second = write_doc(
        dir.path(),
        "second.json",
        &doc(&[
            (5, preset_body("Shared", 40)),
            (10, playlist_body("Loop", &[5, 2])),
        ]),
    );

    let mut db = Library::in_memory().unwrap();
    import_file(&mut db, first, &[], true);

    // Renumber the colliding preset to 9 explicitly
    let outcome = import_file(&mut db, second, &["9"], true);
    assert_eq!(outcome.renumbered, vec![(5, 9)]);

    let rows = db
        .query(
            &[Filter {
                key: FilterKey::Type,
                values: vec!["playlist".to_string()],
            }],
            &SortSpec::default(),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].pdata.contains("\"ps\":[9,2]"));
}

#[test]
fn test_nodup_skips_conflict_checks() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "presets.json", &three_preset_doc());

    let mut db = Library::in_memory().unwrap();
    import_file(&mut db, path.clone(), &[], true);
    let outcome = import_file(&mut db, path, &[], false);
    assert_eq!(outcome.imported, 3);

    let rows = db.query(&[], &SortSpec::default()).unwrap();
    assert_eq!(rows.len(), 6);
}

#[test]
fn test_abort_keeps_earlier_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "presets.json", &three_preset_doc());

    let mut db = Library::in_memory().unwrap();
    import_file(&mut db, path.clone(), &[], true);

    // Renumber the first collision, then pull the plug on the second
    let outcome = import_file(&mut db, path, &["n", "0"], true);
    assert!(outcome.aborted);
    assert_eq!(outcome.imported, 1);

    let rows = db.query(&[], &SortSpec::default()).unwrap();
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_replace_overwrites_first_match_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let original = write_doc(
        dir.path(),
        "original.json",
        &doc(&[(7, preset_body("Old name", 25))]),
    );
    let mut updated_body = preset_body("Old name", 25);
    updated_body["n"] = json!("New name");
    let updated = write_doc(dir.path(), "updated.json", &doc(&[(7, updated_body)]));

    let mut db = Library::in_memory().unwrap();
    import_file(&mut db, original, &[], true);
    let outcome = import_file(&mut db, updated, &["r"], true);
    assert_eq!(outcome.replaced, 1);
    assert_eq!(outcome.imported, 0);

    let rows = db.query(&[], &SortSpec::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pname, "New name");
    assert_eq!(rows[0].src, "updated.json");
}

#[test]
fn test_device_import_pulls_side_resources() {
    let mut body = preset_body("With palette", 50);
    body["seg"][0]["pal"] = json!(255);
    body["ledmap"] = json!(2);
    let document = doc(&[(1, body)]);

    let transport = MockTransport::new();
    transport.serve("presets.json", &document);
    // Encoded palette 255 lives in local slot 1; ledmap2.json stays missing
    transport.serve("palette1.json", "[[0,255,0,0],[255,255,0,0]]");

    let mut db = Library::in_memory().unwrap();
    let mut prompter = ScriptedPrompter::default();
    let outcome = ImportEngine::new(&mut db, &transport, &mut prompter)
        .run(&ImportSource::Device, &[], &[], true)
        .unwrap();
    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("ledmap2.json"));

    let rows = db.query(&[], &SortSpec::default()).unwrap();
    let lid = rows[0].lid;
    assert_eq!(rows[0].src, "device");

    let palettes = db.palettes_for(&[lid]).unwrap();
    assert_eq!(palettes.len(), 1);
    assert_eq!(palettes[0].plnum, 255);
    assert!(!palettes[0].pldata.is_empty());

    // The missing ledmap is recorded as an empty placeholder
    let ledmaps = db.ledmaps_for(&[lid]).unwrap();
    assert_eq!(ledmaps.len(), 1);
    assert_eq!(ledmaps[0].mnum, 2);
    assert!(ledmaps[0].mdata.is_empty());
}

#[test]
fn test_supplied_keywords_override_default_tag() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "presets.json", &three_preset_doc());

    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let mut db = Library::in_memory().unwrap();
    ImportEngine::new(&mut db, &transport, &mut prompter)
        .run(
            &ImportSource::File(path),
            &["warm".to_string(), "demo".to_string()],
            &["hall".to_string()],
            true,
        )
        .unwrap();

    let rows = db.query(&[], &SortSpec::default()).unwrap();
    assert!(rows.iter().all(|r| r.tag == "demo,warm"));
    assert!(rows.iter().all(|r| r.group == "hall"));
}

#[test]
fn test_unreadable_source_aborts_before_any_write() {
    let mut db = Library::in_memory().unwrap();
    let missing = std::path::PathBuf::from("/no/such/presets.json");
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let result = ImportEngine::new(&mut db, &transport, &mut prompter).run(
        &ImportSource::File(missing),
        &[],
        &[],
        true,
    );
    assert!(result.is_err());
    assert!(db.query(&[], &SortSpec::default()).unwrap().is_empty());
}
