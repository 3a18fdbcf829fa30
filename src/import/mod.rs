//! ImportEngine: decodes an external preset document, detects near-duplicate
//! records, resolves number conflicts interactively, and repairs playlist
//! cross-references after renumbering.
//!
//! Failure semantics: a read/parse failure on the source aborts the import
//! before any row is written; a per-record canonicalization failure aborts the
//! whole import (corrupt source); a typed `0` during conflict resolution stops
//! further records but keeps prior commits; a missing palette/ledmap resource
//! is a warning recorded as an empty payload, never a hard failure.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::canon;
use crate::device::{Fetched, PRESETS_FILE, Transport, ledmap_file, palette_file};
use crate::error::{LibrarianError, Result};
use crate::prompt::Prompter;
use crate::store::{
    DEFAULT_TAG, Library, NewPreset, PALETTE_NUM_MAX, PALETTE_NUM_MIN, PID_MAX, RecordType,
    normalize_words, palette_slot,
};

/// Where an import reads from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    File(PathBuf),
    Device,
}

/// What happened during one import call.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub imported: usize,
    pub replaced: usize,
    pub skipped: usize,
    /// `(old, new)` device preset number rewrites.
    pub renumbered: Vec<(u16, u16)>,
    /// True when the user typed `0` to stop; prior commits remain.
    pub aborted: bool,
    pub warnings: Vec<String>,
}

/// Conflict-resolution choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Skip,
    Replace,
    Keep,
    Renumber(u16),
    Abort,
}

/// One import run over a library, transport, and prompter.
pub struct ImportEngine<'a> {
    db: &'a mut Library,
    transport: &'a dyn Transport,
    prompter: &'a mut dyn Prompter,
}

impl<'a> ImportEngine<'a> {
    pub fn new(
        db: &'a mut Library,
        transport: &'a dyn Transport,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            db,
            transport,
            prompter,
        }
    }

    /// Imports every record of the source document, in ascending
    /// preset-number order.
    #[instrument(skip_all, fields(source = ?source))]
    pub fn run(
        &mut self,
        source: &ImportSource,
        tags: &[String],
        groups: &[String],
        check_duplicates: bool,
    ) -> Result<ImportOutcome> {
        let (document, src_label) = self.load_document(source)?;
        let entries = numbered_entries(&document)?;
        info!(records = entries.len(), src = %src_label, "Import starting");

        // Tags default to a single marker when the caller supplies nothing
        let tag = if tags.is_empty() && groups.is_empty() {
            DEFAULT_TAG.to_string()
        } else {
            normalize_words(tags)
        };
        let group = normalize_words(groups);

        let mut outcome = ImportOutcome::default();
        let mut renumber_map: HashMap<u16, u16> = HashMap::new();
        let mut playlists: Vec<(i64, u16, Value)> = Vec::new();
        let mut resource_cache: HashMap<String, Option<String>> = HashMap::new();

        for (pid, body) in entries {
            let rtype = if canon::is_playlist(&body) {
                RecordType::Playlist
            } else {
                RecordType::Preset
            };
            // A record that cannot be canonicalized means a corrupt source
            let pdata = canon::canonicalize(&body, pid)?;

            let mut final_pid = pid;
            if check_duplicates {
                let fp = fingerprint(&pdata, rtype);
                let matches = self.db.find_by_fingerprint(&fp)?;
                if !matches.is_empty() {
                    match self.resolve_conflict(pid, &body, &matches)? {
                        Resolution::Skip => {
                            outcome.skipped += 1;
                            continue;
                        }
                        Resolution::Replace => {
                            // First-match-wins: only the first matching row is
                            // updated even when several matched. Known
                            // limitation, preserved deliberately.
                            let target = matches[0].lid;
                            let new = new_preset(pid, &body, &pdata, rtype, &src_label);
                            self.db.replace_preset(target, &new, &tag, &group)?;
                            outcome.replaced += 1;
                            continue;
                        }
                        Resolution::Keep => {}
                        Resolution::Renumber(new_pid) => {
                            renumber_map.insert(pid, new_pid);
                            outcome.renumbered.push((pid, new_pid));
                            final_pid = new_pid;
                        }
                        Resolution::Abort => {
                            outcome.aborted = true;
                            break;
                        }
                    }
                }
            }

            let pdata = if final_pid == pid {
                pdata
            } else {
                canon::canonicalize(&body, final_pid)?
            };
            let new = new_preset(final_pid, &body, &pdata, rtype, &src_label);
            let lid = self.db.insert_preset(&new, &tag, &group)?;
            outcome.imported += 1;

            if rtype == RecordType::Playlist {
                playlists.push((lid, final_pid, body.clone()));
            } else {
                self.collect_side_resources(
                    lid,
                    &body,
                    source,
                    &mut resource_cache,
                    &mut outcome.warnings,
                )?;
            }
        }

        self.rewrite_playlists(&playlists, &renumber_map, &mut outcome.warnings)?;

        info!(
            imported = outcome.imported,
            replaced = outcome.replaced,
            skipped = outcome.skipped,
            aborted = outcome.aborted,
            "Import finished"
        );
        Ok(outcome)
    }

    fn load_document(&self, source: &ImportSource) -> Result<(Value, String)> {
        let (raw, label) = match source {
            ImportSource::File(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    LibrarianError::DocumentRead {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let label = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
                (raw, label)
            }
            ImportSource::Device => match self.transport.fetch(PRESETS_FILE)? {
                Fetched::Found(raw) => (raw, "device".to_string()),
                Fetched::NotFound => {
                    return Err(LibrarianError::DocumentRead {
                        path: PRESETS_FILE.to_string(),
                        reason: "not found on device".to_string(),
                    });
                }
            },
        };

        let document: Value =
            serde_json::from_str(&raw).map_err(|e| LibrarianError::InvalidJson {
                context: label.clone(),
                reason: e.to_string(),
            })?;
        Ok((document, label))
    }

    /// Runs the interactive conflict-resolution state machine for one
    /// candidate. Unusable answers re-prompt.
    fn resolve_conflict(
        &mut self,
        pid: u16,
        body: &Value,
        matches: &[crate::store::PresetRecord],
    ) -> Result<Resolution> {
        let name = body.get("n").and_then(Value::as_str).unwrap_or("");
        let mut header = format!("Incoming preset {pid} '{name}' resembles:\n");
        for m in matches {
            header.push_str(&format!(
                "  lid {} pid {} '{}' [{}]\n",
                m.lid, m.pid, m.pname, m.src
            ));
        }
        let prompt = format!("{header}[s]kip, [r]eplace, [k]eep, [n]ew, or number (0 aborts): ");

        loop {
            let answer = self.prompter.ask(&prompt)?;
            let answer = answer.trim().to_ascii_lowercase();
            match answer.as_str() {
                "s" | "skip" => return Ok(Resolution::Skip),
                "r" | "replace" => return Ok(Resolution::Replace),
                "k" | "keep" => return Ok(Resolution::Keep),
                "n" | "new" => {
                    let next = self.db.lowest_unused_pid()?.ok_or_else(|| {
                        LibrarianError::Other("no unused preset number left in 1-250".to_string())
                    })?;
                    return Ok(Resolution::Renumber(next));
                }
                _ => {}
            }
            if let Ok(number) = answer.parse::<u16>() {
                if number == 0 {
                    return Ok(Resolution::Abort);
                }
                if number > PID_MAX {
                    continue;
                }
                if self.db.used_pids()?.contains(&number) {
                    debug!(number, "Requested preset number already in use");
                    continue;
                }
                return Ok(Resolution::Renumber(number));
            }
        }
    }

    /// Scans segments for custom-palette references and the body for a ledmap
    /// reference, resolving each from the import source.
    fn collect_side_resources(
        &mut self,
        lid: i64,
        body: &Value,
        source: &ImportSource,
        cache: &mut HashMap<String, Option<String>>,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(segments) = body.get("seg").and_then(Value::as_array) {
            for seg in segments {
                let Some(pal) = seg.get("pal").and_then(Value::as_u64) else {
                    continue;
                };
                let pal = u16::try_from(pal).unwrap_or(0);
                if !(PALETTE_NUM_MIN..=PALETTE_NUM_MAX).contains(&pal) {
                    continue;
                }
                if self.db.has_palette(lid, pal)? {
                    continue;
                }
                let name = palette_file(palette_slot(pal));
                let payload = self.resolve_resource(&name, source, cache, warnings)?;
                self.db.insert_palette(lid, pal, &payload.unwrap_or_default())?;
            }
        }

        if let Some(mnum) = body.get("ledmap").and_then(Value::as_u64) {
            let mnum = u16::try_from(mnum).unwrap_or(0);
            if mnum <= 9 && !self.db.has_ledmap(lid, mnum)? {
                let name = ledmap_file(mnum);
                let payload = self.resolve_resource(&name, source, cache, warnings)?;
                self.db.insert_ledmap(lid, mnum, &payload.unwrap_or_default())?;
            }
        }
        Ok(())
    }

    /// Loads one side-resource document from the same source as the import,
    /// caching slot data within the call. A missing or unparsable resource
    /// yields `None` and a warning.
    fn resolve_resource(
        &self,
        name: &str,
        source: &ImportSource,
        cache: &mut HashMap<String, Option<String>>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<String>> {
        if let Some(cached) = cache.get(name) {
            return Ok(cached.clone());
        }

        let raw = match source {
            ImportSource::File(path) => {
                let sibling = path.parent().map_or_else(
                    || PathBuf::from(name),
                    |dir| dir.join(name),
                );
                match std::fs::read_to_string(&sibling) {
                    Ok(raw) => Some(raw),
                    Err(e) => {
                        warn!(name, error = %e, "Side resource unavailable");
                        warnings.push(format!("{name}: {e}"));
                        None
                    }
                }
            }
            ImportSource::Device => match self.transport.fetch(name)? {
                Fetched::Found(raw) => Some(raw),
                Fetched::NotFound => {
                    warn!(name, "Side resource not found on device");
                    warnings.push(format!("{name}: not found on device"));
                    None
                }
            },
        };

        let validated = raw.filter(|raw| {
            let ok = serde_json::from_str::<Value>(raw).is_ok();
            if !ok {
                warn!(name, "Side resource is not valid JSON");
                warnings.push(format!("{name}: not valid JSON"));
            }
            ok
        });

        cache.insert(name.to_string(), validated.clone());
        Ok(validated)
    }

    /// Rewrites embedded preset-number lists in every stashed playlist using
    /// the renumber map; numbers absent from the map are left unchanged.
    fn rewrite_playlists(
        &mut self,
        playlists: &[(i64, u16, Value)],
        map: &HashMap<u16, u16>,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        if map.is_empty() {
            return Ok(());
        }

        for (lid, pid, body) in playlists {
            let mut body = body.clone();
            let Some(ps) = body
                .get_mut("playlist")
                .and_then(|p| p.get_mut("ps"))
                .and_then(Value::as_array_mut)
            else {
                continue;
            };

            let mut changed = false;
            for entry in ps.iter_mut() {
                let Some(old) = entry.as_u64().and_then(|n| u16::try_from(n).ok()) else {
                    continue;
                };
                if let Some(&new) = map.get(&old) {
                    *entry = Value::from(new);
                    changed = true;
                }
            }

            if changed {
                match canon::canonicalize(&body, *pid) {
                    Ok(pdata) => {
                        self.db.update_pdata(*lid, &pdata)?;
                        debug!(lid, pid, "Rewrote playlist references");
                    }
                    Err(e) => warnings.push(format!("playlist {pid}: {e}")),
                }
            }
        }
        Ok(())
    }
}

fn new_preset(pid: u16, body: &Value, pdata: &str, rtype: RecordType, src: &str) -> NewPreset {
    NewPreset {
        pid,
        pname: body
            .get("n")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        qll: body
            .get("ql")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        pdata: pdata.to_string(),
        rtype,
        src: src.to_string(),
    }
}

/// Content fingerprint used for duplicate detection.
///
/// For a preset this is the serialized segment-array substring (or everything
/// after the numeric prefix when there is no segment array); for a playlist,
/// everything from the playlist marker onward. Intentionally a fuzzy
/// substring heuristic; swap here and in `Library::find_by_fingerprint` to
/// change it without touching callers.
pub fn fingerprint(pdata: &str, rtype: RecordType) -> String {
    let marker = match rtype {
        RecordType::Playlist => "\"playlist\"",
        RecordType::Preset => "\"seg\"",
    };
    if let Some(at) = pdata.find(marker) {
        return pdata[at..].to_string();
    }
    pdata
        .find(':')
        .map_or_else(|| pdata.to_string(), |at| pdata[at + 1..].to_string())
}

/// Extracts the numbered entries of a preset document, skipping the reserved
/// `"0"` sentinel, in ascending preset-number order.
fn numbered_entries(document: &Value) -> Result<Vec<(u16, Value)>> {
    let obj = document
        .as_object()
        .ok_or_else(|| LibrarianError::InvalidJson {
            context: "preset document".to_string(),
            reason: "top level is not an object".to_string(),
        })?;

    let mut entries: Vec<(u16, Value)> = obj
        .iter()
        .filter_map(|(key, body)| {
            let pid = key.parse::<u16>().ok()?;
            if pid == 0 || pid > PID_MAX {
                return None;
            }
            Some((pid, body.clone()))
        })
        .collect();
    entries.sort_by_key(|(pid, _)| *pid);
    Ok(entries)
}
