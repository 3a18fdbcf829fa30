use librarian::device::MockTransport;
use librarian::import::{ImportEngine, ImportSource};
use librarian::prompt::ScriptedPrompter;
use librarian::store::{Filter, FilterKey, Library, SortColumn, SortSpec};

use crate::common::{three_preset_doc, write_doc};

fn filter(key: FilterKey, values: &[&str]) -> Filter {
    Filter {
        key,
        values: values.iter().map(ToString::to_string).collect(),
    }
}

fn seeded() -> Library {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "presets.json", &three_preset_doc());
    let transport = MockTransport::new();
    let mut prompter = ScriptedPrompter::default();
    let mut db = Library::in_memory().unwrap();
    ImportEngine::new(&mut db, &transport, &mut prompter)
        .run(&ImportSource::File(path), &[], &[], true)
        .unwrap();
    db
}

#[test]
fn test_identity_follows_insertion_order() {
    let db = seeded();
    let rows = db.query(&[], &SortSpec::default()).unwrap();
    let lids: Vec<i64> = rows.iter().map(|r| r.lid).collect();
    assert_eq!(lids, vec![1, 2, 3]);
}

#[test]
fn test_default_tag_matches_every_import() {
    let db = seeded();
    let rows = db
        .query(&[filter(FilterKey::Tag, &["new"])], &SortSpec::default())
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_or_within_one_key_and_across_keys() {
    let db = seeded();
    db.update_keywords(1, "warm,new", "hall").unwrap();
    db.update_keywords(2, "cold,new", "hall").unwrap();

    // warm OR cold
    let rows = db
        .query(
            &[filter(FilterKey::Tag, &["warm", "cold"])],
            &SortSpec::default(),
        )
        .unwrap();
    assert_eq!(rows.len(), 2);

    // warm AND hall narrows to one
    let rows = db
        .query(
            &[
                filter(FilterKey::Tag, &["warm"]),
                filter(FilterKey::Group, &["hall"]),
            ],
            &SortSpec::default(),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].lid, 1);
}

#[test]
fn test_name_filter_is_substring_match() {
    let db = seeded();
    let rows = db
        .query(&[filter(FilterKey::Pname, &["sun"])], &SortSpec::default())
        .unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.pname.as_str()).collect();
    assert_eq!(names, vec!["Sunrise", "Sunset"]);
}

#[test]
fn test_sort_by_name_descending() {
    let db = seeded();
    let rows = db
        .query(
            &[],
            &SortSpec {
                column: SortColumn::Pname,
                descending: true,
            },
        )
        .unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.pname.as_str()).collect();
    assert_eq!(names, vec!["Sunset", "Sunrise", "Daylight"]);
}
