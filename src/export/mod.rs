//! ExportEngine: assembles selected records into a device-shaped preset
//! document and delivers it to a file or straight to the controller.
//!
//! The assembled document is validated by re-parsing before anything is
//! written or uploaded; an invalid assembly aborts the export with nothing
//! touched on the destination side.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::device::{PRESETS_FILE, RECONNECT_DELAY_SECS, Transport, ledmap_file, palette_file};
use crate::error::{LibrarianError, Result};
use crate::prompt::Prompter;
use crate::store::{Library, palette_slot};

/// Where an export writes to.
#[derive(Debug, Clone)]
pub enum ExportDestination {
    File(PathBuf),
    Device,
}

/// What an export produced.
#[derive(Debug, Default)]
pub struct ExportSummary {
    /// Records included in the preset document.
    pub records: usize,
    /// Side files written or uploaded alongside it.
    pub side_files: usize,
    /// True when the device was asked to reset after upload.
    pub device_reset: bool,
    pub warnings: Vec<String>,
}

/// One export run over a library, transport, and prompter.
pub struct ExportEngine<'a> {
    db: &'a Library,
    transport: &'a dyn Transport,
    prompter: &'a mut dyn Prompter,
}

impl<'a> ExportEngine<'a> {
    pub fn new(
        db: &'a Library,
        transport: &'a dyn Transport,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            db,
            transport,
            prompter,
        }
    }

    /// Exports the given records, in identity order, to the destination.
    ///
    /// Returns `Ok(None)` when the user declined an overwrite.
    #[instrument(skip_all, fields(records = lids.len(), dest = ?destination))]
    pub fn run(
        &mut self,
        lids: &[i64],
        destination: &ExportDestination,
    ) -> Result<Option<ExportSummary>> {
        let mut lids = lids.to_vec();
        lids.sort_unstable();
        lids.dedup();

        let mut fragments = Vec::with_capacity(lids.len());
        for &lid in &lids {
            let record = self
                .db
                .get(lid)?
                .ok_or(LibrarianError::RecordNotFound { lid })?;
            fragments.push(record.pdata);
        }

        let document = assemble_document(&fragments);
        // Re-parse before touching the destination; a failure here means a
        // stored body is corrupt.
        serde_json::from_str::<Value>(&document).map_err(|e| {
            LibrarianError::ExportInvalid(format!("assembled document is not valid JSON: {e}"))
        })?;

        let mut summary = ExportSummary {
            records: lids.len(),
            ..ExportSummary::default()
        };
        let side_files = self.collect_side_files(&lids, &mut summary.warnings)?;

        match destination {
            ExportDestination::File(path) => {
                if path.exists() && !self.prompter.confirm(&format!(
                    "{} exists. Overwrite? [Y/n] ",
                    path.display()
                ))? {
                    info!(path = %path.display(), "Export declined by user");
                    return Ok(None);
                }
                write_file(path, &document)?;
                summary.side_files = side_files.len();
                let dir = path.parent().map_or_else(PathBuf::new, PathBuf::from);
                for (name, body) in &side_files {
                    write_file(&dir.join(name), body)?;
                }
                info!(path = %path.display(), records = summary.records, "Export written");
            }
            ExportDestination::Device => {
                let staging = std::env::temp_dir().join("preset-librarian");
                std::fs::create_dir_all(&staging)?;

                let doc_path = staging.join(PRESETS_FILE);
                write_file(&doc_path, &document)?;
                self.transport.upload(PRESETS_FILE, &doc_path)?;

                summary.side_files = side_files.len();
                for (name, body) in &side_files {
                    let side_path = staging.join(name);
                    write_file(&side_path, body)?;
                    self.transport.upload(name, &side_path)?;
                }

                self.transport.reboot()?;
                summary.device_reset = true;
                info!(
                    records = summary.records,
                    side_files = summary.side_files,
                    reconnect_secs = RECONNECT_DELAY_SECS,
                    "Export uploaded, device resetting"
                );
            }
        }
        Ok(Some(summary))
    }

    /// Gathers palette and ledmap payloads for the exported records. Empty
    /// payloads (imported as placeholders for missing resources) are skipped
    /// with a warning; when two records reference the same slot the first
    /// payload wins.
    fn collect_side_files(
        &self,
        lids: &[i64],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<(String, String)>> {
        let mut by_name: HashMap<String, String> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for palette in self.db.palettes_for(lids)? {
            let name = palette_file(palette_slot(palette.plnum));
            if palette.pldata.is_empty() {
                warn!(name, lid = palette.plid, "Skipping empty palette payload");
                warnings.push(format!("{name}: empty payload, skipped"));
                continue;
            }
            if !by_name.contains_key(&name) {
                order.push(name.clone());
                by_name.insert(name, palette.pldata);
            }
        }

        for ledmap in self.db.ledmaps_for(lids)? {
            let name = ledmap_file(ledmap.mnum);
            if ledmap.mdata.is_empty() {
                warn!(name, lid = ledmap.mlid, "Skipping empty ledmap payload");
                warnings.push(format!("{name}: empty payload, skipped"));
                continue;
            }
            if !by_name.contains_key(&name) {
                order.push(name.clone());
                by_name.insert(name, ledmap.mdata);
            }
        }

        for name in &order {
            serde_json::from_str::<Value>(&by_name[name]).map_err(|e| {
                LibrarianError::ExportInvalid(format!("{name} payload is not valid JSON: {e}"))
            })?;
        }

        debug!(count = order.len(), "Collected side files");
        Ok(order
            .into_iter()
            .map(|name| {
                let body = by_name.remove(&name).unwrap_or_default();
                (name, body)
            })
            .collect())
    }
}

/// Joins canonical fragments into a full preset document, with the reserved
/// `"0"` slot first as the device expects.
fn assemble_document(fragments: &[String]) -> String {
    let mut doc = String::from("{\"0\":{}");
    for fragment in fragments {
        doc.push(',');
        doc.push_str(fragment);
    }
    doc.push('}');
    doc
}

fn write_file(path: &std::path::Path, body: &str) -> Result<()> {
    std::fs::write(path, body).map_err(|e| LibrarianError::DocumentRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
