use librarian::device::MockTransport;
use librarian::grammar;
use librarian::prompt::ScriptedPrompter;
use librarian::session::{Flow, Session};
use librarian::store::{Library, SortSpec};

use crate::common::{three_preset_doc, write_doc};

fn run(session: &mut Session, line: &str, answers: &[&str]) -> Flow {
    let cmd = grammar::parse(line).unwrap();
    let mut prompter = ScriptedPrompter::new(answers.iter().copied());
    session.dispatch(&cmd, &mut prompter).unwrap()
}

fn seeded_session(dir: &std::path::Path) -> Session {
    let path = write_doc(dir, "presets.json", &three_preset_doc());
    let db = Library::in_memory().unwrap();
    let mut session = Session::new(db, Box::new(MockTransport::new()));
    run(
        &mut session,
        &format!("import file:{}", path.display()),
        &[],
    );
    session
}

#[test]
fn test_import_command_populates_library() {
    let dir = tempfile::tempdir().unwrap();
    let session = seeded_session(dir.path());
    let rows = session.library().query(&[], &SortSpec::default()).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.tag == "new"));
}

#[test]
fn test_show_chained_export_writes_selection() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = seeded_session(dir.path());
    let out = dir.path().join("subset.json");

    run(
        &mut session,
        &format!("show pname:Sunrise export file:{}", out.display()),
        &[],
    );

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let obj = parsed.as_object().unwrap();
    // The sentinel plus the single matching record
    assert_eq!(obj.len(), 2);
    assert!(obj.contains_key("1"));
}

#[test]
fn test_delete_command_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = seeded_session(dir.path());
    session.library().insert_palette(1, 255, "[[0,1,2,3]]").unwrap();

    run(&mut session, "delete lid:1", &["y"]);

    assert!(session.library().get(1).unwrap().is_none());
    assert!(session.library().palettes_for(&[1]).unwrap().is_empty());
    assert_eq!(
        session
            .library()
            .query(&[], &SortSpec::default())
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_duplicate_records_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = seeded_session(dir.path());

    run(&mut session, "duplicate lid:3 pid:99 tag:copy", &[]);

    let copy = session.library().get(4).unwrap().unwrap();
    assert_eq!(copy.pid, 99);
    assert_eq!(copy.src, "duplicate of lid 3");
    assert_eq!(copy.tag, "copy");
    assert_eq!(copy.group, "");
    assert!(copy.pdata.starts_with("\"99\":"));
}

#[test]
fn test_quit_and_exit_end_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = seeded_session(dir.path());
    assert_eq!(run(&mut session, "quit", &[]), Flow::Quit);
    assert_eq!(run(&mut session, "exit", &[]), Flow::Quit);
}
