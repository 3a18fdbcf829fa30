//! Session dispatcher: routes parsed commands to their handlers and owns the
//! process-duration state (open library, device transport, sort order).
//!
//! Handlers print their own human-readable output; errors propagate to the
//! caller, which decides how to display them. A failed command never leaves a
//! half-applied write: multi-row updates go row by row through the store's
//! transactional operations.

use console::style;
use tracing::{debug, info, instrument};

use crate::canon;
use crate::error::{LibrarianError, Result};
use crate::export::{ExportDestination, ExportEngine, ExportSummary};
use crate::grammar::{Clause, OptionKind, ParsedCommand, Verb};
use crate::import::{ImportEngine, ImportOutcome, ImportSource};
use crate::device::{RECONNECT_DELAY_SECS, Transport};
use crate::prompt::Prompter;
use crate::store::{
    Filter, FilterKey, Library, NewPreset, PID_MAX, PresetRecord, SortColumn, SortSpec, merge_words,
    normalize_words,
};

/// Whether the command loop should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One interactive session over a library and a device.
pub struct Session {
    db: Library,
    transport: Box<dyn Transport>,
    sort: SortSpec,
}

impl Session {
    pub fn new(db: Library, transport: Box<dyn Transport>) -> Self {
        Self {
            db,
            transport,
            sort: SortSpec::default(),
        }
    }

    pub fn library(&self) -> &Library {
        &self.db
    }

    /// Executes one parsed command.
    #[instrument(skip_all, fields(verb = cmd.primary.verb.name()))]
    pub fn dispatch(&mut self, cmd: &ParsedCommand, prompter: &mut dyn Prompter) -> Result<Flow> {
        match cmd.primary.verb {
            Verb::Show => self.handle_show(&cmd.primary, cmd.secondary.as_ref(), prompter)?,
            Verb::Add => self.handle_keywords(&cmd.primary, true)?,
            Verb::Remove => self.handle_keywords(&cmd.primary, false)?,
            Verb::Delete => self.handle_delete(&cmd.primary, prompter)?,
            Verb::Duplicate => self.handle_duplicate(&cmd.primary)?,
            Verb::Edit => self.handle_edit(&cmd.primary)?,
            Verb::Import => self.handle_import(&cmd.primary, prompter)?,
            Verb::Export => {
                let lids = parse_lids(&cmd.primary.values("lid"))?;
                self.handle_export(&cmd.primary, &lids, prompter)?;
            }
            Verb::Sort => self.handle_sort(&cmd.primary)?,
            Verb::Help => print_help(),
            Verb::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn handle_show(
        &mut self,
        clause: &Clause,
        secondary: Option<&Clause>,
        prompter: &mut dyn Prompter,
    ) -> Result<()> {
        let filters = filters_from(clause)?;
        let records = self.db.query(&filters, &self.sort)?;

        if let Some(secondary) = secondary {
            let lids: Vec<i64> = records.iter().map(|r| r.lid).collect();
            match secondary.verb {
                Verb::Add => self.apply_keywords(&lids, secondary, true)?,
                Verb::Remove => self.apply_keywords(&lids, secondary, false)?,
                Verb::Export => {
                    self.handle_export(secondary, &lids, prompter)?;
                    print_records(&records);
                    return Ok(());
                }
                _ => {
                    return Err(LibrarianError::UnsupportedCommand {
                        verb: secondary.verb.name().to_string(),
                    });
                }
            }
            // Redisplay after the mutation so the user sees the result
            let records = self.db.query(&filters, &self.sort)?;
            print_records(&records);
            return Ok(());
        }

        print_records(&records);
        Ok(())
    }

    fn handle_keywords(&mut self, clause: &Clause, add: bool) -> Result<()> {
        let lids = parse_lids(&clause.values("lid"))?;
        if lids.is_empty() {
            return Err(LibrarianError::MissingFilter {
                verb: if add { "add" } else { "remove" }.to_string(),
            });
        }
        self.apply_keywords(&lids, clause, add)
    }

    /// Merges tag/group words into each record's keyword shell. Rows whose
    /// sets come out unchanged are not rewritten.
    fn apply_keywords(&mut self, lids: &[i64], clause: &Clause, add: bool) -> Result<()> {
        let tags = clause.values("tag");
        let groups = clause.values("group");
        if tags.is_empty() && groups.is_empty() {
            return Err(LibrarianError::BadOption {
                detail: "supply tag: or group: words to change".to_string(),
            });
        }

        let mut changed = 0usize;
        for &lid in lids {
            let record = self
                .db
                .get(lid)?
                .ok_or(LibrarianError::RecordNotFound { lid })?;
            let tag = merge_words(&record.tag, &tags, add);
            let group = merge_words(&record.group, &groups, add);
            if tag != record.tag || group != record.group {
                self.db.update_keywords(lid, &tag, &group)?;
                changed += 1;
            }
        }
        info!(changed, add, "Keyword update applied");
        println!("{changed} record(s) updated.");
        Ok(())
    }

    fn handle_delete(&mut self, clause: &Clause, prompter: &mut dyn Prompter) -> Result<()> {
        let filters = filters_from(clause)?;
        // An unfiltered delete would wipe the library; refuse it
        if filters.is_empty() {
            return Err(LibrarianError::MissingFilter {
                verb: "delete".to_string(),
            });
        }

        let candidates = self.db.query(&filters, &self.sort)?;
        if candidates.is_empty() {
            println!("Nothing matched; nothing deleted.");
            return Ok(());
        }

        print_records(&candidates);
        if !prompter.confirm(&format!(
            "Delete {} record(s) and their palettes/ledmaps? [Y/n] ",
            candidates.len()
        ))? {
            println!("Delete cancelled.");
            return Ok(());
        }

        let mut deleted = 0usize;
        for record in &candidates {
            if self.db.delete_cascade(record.lid)? {
                deleted += 1;
            }
        }
        println!("{deleted} record(s) deleted.");
        Ok(())
    }

    fn handle_duplicate(&mut self, clause: &Clause) -> Result<()> {
        let lid = required_lid(clause)?;
        let source = self
            .db
            .get(lid)?
            .ok_or(LibrarianError::RecordNotFound { lid })?;

        let pid = match clause.get("pid") {
            Some(raw) => parse_pid(raw)?,
            None => source.pid,
        };
        let pdata = if pid == source.pid {
            source.pdata.clone()
        } else {
            let (_, body) = canon::parse_fragment(&source.pdata)?;
            canon::canonicalize(&body, pid)?
        };

        let new = NewPreset {
            pid,
            pname: clause
                .get("pname")
                .map_or_else(|| source.pname.clone(), ToString::to_string),
            qll: clause
                .get("qll")
                .map_or_else(|| source.qll.clone(), ToString::to_string),
            pdata,
            rtype: source.rtype,
            src: format!("duplicate of lid {lid}"),
        };
        // A copy starts with a clean keyword slate unless words are supplied
        let tag = normalize_words(&clause.values("tag"));
        let group = normalize_words(&clause.values("group"));
        let new_lid = self.db.insert_preset(&new, &tag, &group)?;

        for palette in self.db.palettes_for(&[lid])? {
            self.db
                .insert_palette(new_lid, palette.plnum, &palette.pldata)?;
        }
        for ledmap in self.db.ledmaps_for(&[lid])? {
            self.db.insert_ledmap(new_lid, ledmap.mnum, &ledmap.mdata)?;
        }

        info!(source = lid, new_lid, "Record duplicated");
        println!("Duplicated lid {lid} as lid {new_lid}.");
        Ok(())
    }

    fn handle_edit(&mut self, clause: &Clause) -> Result<()> {
        let lid = required_lid(clause)?;
        let record = self
            .db
            .get(lid)?
            .ok_or(LibrarianError::RecordNotFound { lid })?;

        let pid = clause.get("pid").map(parse_pid).transpose()?;
        let pname = clause.get("pname");
        let qll = clause.get("qll");
        if pid.is_none() && pname.is_none() && qll.is_none() {
            return Err(LibrarianError::BadOption {
                detail: "supply pid:, pname:, or qll: to edit".to_string(),
            });
        }

        // A preset-number change must be reflected inside the stored body
        let pdata = match pid {
            Some(new_pid) if new_pid != record.pid => {
                let (_, body) = canon::parse_fragment(&record.pdata)?;
                Some(canon::canonicalize(&body, new_pid)?)
            }
            _ => None,
        };

        self.db
            .update_preset(lid, pid, pname, qll, pdata.as_deref())?;
        println!("Record lid {lid} updated.");
        Ok(())
    }

    fn handle_import(&mut self, clause: &Clause, prompter: &mut dyn Prompter) -> Result<()> {
        let source = match (clause.get("file"), clause.has_flag("device")) {
            (Some(path), false) => ImportSource::File(path.into()),
            (None, true) => ImportSource::Device,
            _ => {
                return Err(LibrarianError::BadOption {
                    detail: "import needs exactly one of file:<path> or device".to_string(),
                });
            }
        };
        let tags = clause.values("tag");
        let groups = clause.values("group");
        let check_duplicates = !clause.has_flag("nodup");

        let outcome = ImportEngine::new(&mut self.db, self.transport.as_ref(), prompter).run(
            &source,
            &tags,
            &groups,
            check_duplicates,
        )?;
        print_import_outcome(&outcome);
        Ok(())
    }

    fn handle_export(
        &mut self,
        clause: &Clause,
        lids: &[i64],
        prompter: &mut dyn Prompter,
    ) -> Result<()> {
        if lids.is_empty() {
            return Err(LibrarianError::MissingFilter {
                verb: "export".to_string(),
            });
        }
        let destination = match (clause.get("file"), clause.has_flag("device")) {
            (Some(path), false) => ExportDestination::File(path.into()),
            (None, true) => ExportDestination::Device,
            _ => {
                return Err(LibrarianError::BadOption {
                    detail: "export needs exactly one of file:<path> or device".to_string(),
                });
            }
        };

        let summary =
            ExportEngine::new(&self.db, self.transport.as_ref(), prompter).run(lids, &destination)?;
        match summary {
            Some(summary) => print_export_summary(&summary, &destination),
            None => println!("Export cancelled."),
        }
        Ok(())
    }

    fn handle_sort(&mut self, clause: &Clause) -> Result<()> {
        if let Some(by) = clause.get("by") {
            self.sort.column =
                SortColumn::from_key(by).ok_or_else(|| LibrarianError::BadOption {
                    detail: format!("'{by}' is not a sortable column"),
                })?;
        }
        if let Some(dir) = clause.get("dir") {
            self.sort.descending = match dir.to_ascii_lowercase().as_str() {
                "asc" => false,
                "desc" => true,
                other => {
                    return Err(LibrarianError::BadOption {
                        detail: format!("sort direction '{other}' is not asc or desc"),
                    });
                }
            };
        }
        debug!(column = ?self.sort.column, descending = self.sort.descending, "Sort order set");
        println!(
            "Sorting by {:?} {}.",
            self.sort.column,
            if self.sort.descending {
                "descending"
            } else {
                "ascending"
            }
        );
        Ok(())
    }
}

/// Builds store filters from the filter options present in a clause.
fn filters_from(clause: &Clause) -> Result<Vec<Filter>> {
    let mut filters = Vec::new();
    for key in clause.option_keys() {
        let Some(filter_key) = FilterKey::from_key(key) else {
            continue;
        };
        let values = clause.values(key);
        if !values.is_empty() {
            filters.push(Filter {
                key: filter_key,
                values,
            });
        }
    }
    Ok(filters)
}

fn parse_lids(values: &[String]) -> Result<Vec<i64>> {
    values
        .iter()
        .map(|v| {
            v.parse::<i64>().map_err(|_| LibrarianError::BadOption {
                detail: format!("'{v}' is not a record identity"),
            })
        })
        .collect()
}

fn required_lid(clause: &Clause) -> Result<i64> {
    let raw = clause.get("lid").ok_or_else(|| LibrarianError::MissingFilter {
        verb: clause.verb.name().to_string(),
    })?;
    raw.parse::<i64>().map_err(|_| LibrarianError::BadOption {
        detail: format!("'{raw}' is not a record identity"),
    })
}

fn parse_pid(raw: &str) -> Result<u16> {
    let value: i64 = raw.parse().map_err(|_| LibrarianError::BadOption {
        detail: format!("'{raw}' is not a preset number"),
    })?;
    if !(0..=i64::from(PID_MAX)).contains(&value) {
        return Err(LibrarianError::InvalidPresetNumber { value });
    }
    Ok(value as u16)
}

fn print_records(records: &[PresetRecord]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    println!(
        "{}",
        style(format!(
            "{:>5} {:>4} {:<24} {:<8} {:<8} {:<20} {:<20} {:<16} {:<10}",
            "lid", "pid", "pname", "qll", "type", "tag", "group", "src", "date"
        ))
        .bold()
    );
    for r in records {
        println!(
            "{:>5} {:>4} {:<24} {:<8} {:<8} {:<20} {:<20} {:<16} {:<10}",
            r.lid,
            r.pid,
            truncate(&r.pname, 24),
            truncate(&r.qll, 8),
            r.rtype.as_str(),
            truncate(&r.tag, 20),
            truncate(&r.group, 20),
            truncate(&r.src, 16),
            // RFC 3339 timestamps show just their date part
            &r.date[..r.date.len().min(10)],
        );
    }
    println!("{} record(s).", records.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}~")
    }
}

fn print_import_outcome(outcome: &ImportOutcome) {
    println!(
        "Imported {}, replaced {}, skipped {}.",
        style(outcome.imported).green(),
        outcome.replaced,
        outcome.skipped
    );
    for (old, new) in &outcome.renumbered {
        println!("  preset {old} renumbered to {new}");
    }
    for warning in &outcome.warnings {
        println!("{} {warning}", style("Warning:").yellow());
    }
    if outcome.aborted {
        println!("Import stopped at your request; earlier records were kept.");
    }
}

fn print_export_summary(summary: &ExportSummary, destination: &ExportDestination) {
    for warning in &summary.warnings {
        println!("{} {warning}", style("Warning:").yellow());
    }
    match destination {
        ExportDestination::File(path) => println!(
            "Exported {} record(s) and {} side file(s) to {}.",
            summary.records,
            summary.side_files,
            path.display()
        ),
        ExportDestination::Device => println!(
            "Uploaded {} record(s) and {} side file(s); device is resetting (about {}s).",
            summary.records, summary.side_files, RECONNECT_DELAY_SECS
        ),
    }
}

fn print_help() {
    println!("{}", style("Commands").bold());
    for verb in [
        Verb::Show,
        Verb::Add,
        Verb::Remove,
        Verb::Delete,
        Verb::Duplicate,
        Verb::Edit,
        Verb::Import,
        Verb::Export,
        Verb::Sort,
        Verb::Help,
        Verb::Quit,
    ] {
        let options: Vec<String> = verb
            .options()
            .iter()
            .map(|spec| match spec.kind {
                OptionKind::Flag => spec.key.to_string(),
                OptionKind::Value => format!("{}:<value>", spec.key),
                OptionKind::List => format!("{}:<v,v,..>", spec.key),
            })
            .collect();
        println!(
            "  {:<10} {}",
            style(verb.name()).cyan(),
            options.join(" ")
        );
    }
    println!("\nChain 'add', 'remove', or 'export' after 'show' to act on the shown records.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockTransport;
    use crate::grammar;
    use crate::prompt::ScriptedPrompter;
    use crate::store::RecordType;

    fn session_with(records: &[(u16, &str, &str, &str)]) -> Session {
        let mut db = Library::in_memory().unwrap();
        for (pid, name, tag, group) in records {
            let new = NewPreset {
                pid: *pid,
                pname: (*name).to_string(),
                qll: String::new(),
                pdata: format!("\"{pid}\":{{\"n\":\"{name}\",\"on\":true}}"),
                rtype: RecordType::Preset,
                src: "test".to_string(),
            };
            db.insert_preset(&new, tag, group).unwrap();
        }
        Session::new(db, Box::new(MockTransport::new()))
    }

    fn run(session: &mut Session, line: &str) -> Result<Flow> {
        let cmd = grammar::parse(line)?;
        let mut prompter = ScriptedPrompter::default();
        session.dispatch(&cmd, &mut prompter)
    }

    #[test]
    fn test_quit_flow() {
        let mut s = session_with(&[]);
        assert_eq!(run(&mut s, "quit").unwrap(), Flow::Quit);
        assert_eq!(run(&mut s, "help").unwrap(), Flow::Continue);
    }

    #[test]
    fn test_add_and_remove_keywords() {
        let mut s = session_with(&[(1, "Alpha", "new", "")]);
        run(&mut s, "add lid:1 tag:warm,blue").unwrap();
        let record = s.db.get(1).unwrap().unwrap();
        assert_eq!(record.tag, "blue,new,warm");

        run(&mut s, "remove lid:1 tag:new").unwrap();
        let record = s.db.get(1).unwrap().unwrap();
        assert_eq!(record.tag, "blue,warm");
    }

    #[test]
    fn test_show_chained_add() {
        let mut s = session_with(&[(1, "Alpha", "sunset", ""), (2, "Beta", "other", "")]);
        run(&mut s, "show tag:sunset add group:favorites").unwrap();
        assert_eq!(s.db.get(1).unwrap().unwrap().group, "favorites");
        assert_eq!(s.db.get(2).unwrap().unwrap().group, "");
    }

    #[test]
    fn test_delete_requires_filter() {
        let mut s = session_with(&[(1, "Alpha", "", "")]);
        assert!(matches!(
            run(&mut s, "delete"),
            Err(LibrarianError::MissingFilter { .. })
        ));
    }

    #[test]
    fn test_delete_with_confirmation() {
        let mut s = session_with(&[(1, "Alpha", "old", ""), (2, "Beta", "keep", "")]);
        let cmd = grammar::parse("delete tag:old").unwrap();
        let mut prompter = ScriptedPrompter::new(["y"]);
        s.dispatch(&cmd, &mut prompter).unwrap();
        assert!(s.db.get(1).unwrap().is_none());
        assert!(s.db.get(2).unwrap().is_some());
    }

    #[test]
    fn test_delete_declined() {
        let mut s = session_with(&[(1, "Alpha", "old", "")]);
        let cmd = grammar::parse("delete tag:old").unwrap();
        let mut prompter = ScriptedPrompter::new(["n"]);
        s.dispatch(&cmd, &mut prompter).unwrap();
        assert!(s.db.get(1).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_with_overrides() {
        let mut s = session_with(&[(3, "Origin", "keep,these", "grp")]);
        run(&mut s, "duplicate lid:1 pid:99").unwrap();

        let copy = s.db.get(2).unwrap().unwrap();
        assert_eq!(copy.pid, 99);
        assert_eq!(copy.pname, "Origin");
        assert_eq!(copy.src, "duplicate of lid 1");
        // Keywords do not carry over
        assert_eq!(copy.tag, "");
        assert_eq!(copy.group, "");
        // Body reflects the new preset number
        assert!(copy.pdata.starts_with("\"99\":"));
    }

    #[test]
    fn test_duplicate_clones_side_resources() {
        let mut s = session_with(&[(3, "Origin", "", "")]);
        s.db.insert_palette(1, 255, "[[0,255,0,0]]").unwrap();
        run(&mut s, "duplicate lid:1").unwrap();
        let palettes = s.db.palettes_for(&[2]).unwrap();
        assert_eq!(palettes.len(), 1);
        assert_eq!(palettes[0].plnum, 255);
    }

    #[test]
    fn test_edit_pid_rewrites_body() {
        let mut s = session_with(&[(3, "Alpha", "", "")]);
        run(&mut s, "edit lid:1 pid:7 pname:Renamed").unwrap();
        let record = s.db.get(1).unwrap().unwrap();
        assert_eq!(record.pid, 7);
        assert_eq!(record.pname, "Renamed");
        assert!(record.pdata.starts_with("\"7\":"));
    }

    #[test]
    fn test_edit_rejects_out_of_range_pid() {
        let mut s = session_with(&[(3, "Alpha", "", "")]);
        assert!(matches!(
            run(&mut s, "edit lid:1 pid:251"),
            Err(LibrarianError::InvalidPresetNumber { value: 251 })
        ));
    }

    #[test]
    fn test_sort_state_applies_to_show() {
        let mut s = session_with(&[(5, "B", "", ""), (2, "A", "", "")]);
        run(&mut s, "sort by:pid dir:desc").unwrap();
        let rows = s.db.query(&[], &s.sort).unwrap();
        assert_eq!(rows[0].pid, 5);

        assert!(run(&mut s, "sort dir:sideways").is_err());
    }

    #[test]
    fn test_malformed_import_survives_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut s = session_with(&[]);
        let err = run(&mut s, &format!("import file:{}", path.display())).unwrap_err();
        // Resource errors discard the command but keep the loop running
        assert!(matches!(err, LibrarianError::InvalidJson { .. }));
        assert!(err.is_user_recoverable());
    }

    #[test]
    fn test_import_requires_source() {
        let mut s = session_with(&[]);
        assert!(matches!(
            run(&mut s, "import tag:x"),
            Err(LibrarianError::BadOption { .. })
        ));
    }

    #[test]
    fn test_export_requires_destination_and_lids() {
        let mut s = session_with(&[(1, "A", "", "")]);
        assert!(matches!(
            run(&mut s, "export file:out.json"),
            Err(LibrarianError::MissingFilter { .. })
        ));
        assert!(matches!(
            run(&mut s, "export lid:1"),
            Err(LibrarianError::BadOption { .. })
        ));
    }
}
