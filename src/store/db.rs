//! SQLite operations for the preset library.
//!
//! All statements are parameterized; the one reserved word among the column
//! names (`group`) goes through an identifier-quoting helper wherever it
//! appears in generated SQL.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, params, types::Value as SqlValue};
use tracing::{debug, info, instrument, trace};

use super::{
    Filter, FilterKey, LedmapRecord, NewPreset, PaletteRecord, PresetRecord, RecordType,
    SortColumn, SortSpec,
};
use crate::error::{LibrarianError, Result, ResultExt};

/// Library schema. Integrity between the tables is maintained by application
/// logic, so no foreign-key constraints are declared.
const SCHEMA_SQL: &str = r#"
-- Preset and playlist records
CREATE TABLE IF NOT EXISTS presets (
    lid INTEGER PRIMARY KEY AUTOINCREMENT,
    pid INTEGER NOT NULL,
    pname TEXT NOT NULL DEFAULT '',
    qll TEXT NOT NULL DEFAULT '',
    pdata TEXT NOT NULL,
    type TEXT NOT NULL,
    src TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL
);

-- Keyword shell, one row per preset, kid == lid
CREATE TABLE IF NOT EXISTS keywords (
    kid INTEGER PRIMARY KEY,
    tag TEXT NOT NULL DEFAULT '',
    "group" TEXT NOT NULL DEFAULT ''
);

-- Custom palette payloads, zero-to-many per preset
CREATE TABLE IF NOT EXISTS palettes (
    palid INTEGER PRIMARY KEY AUTOINCREMENT,
    plid INTEGER NOT NULL,
    plnum INTEGER NOT NULL,
    pldata TEXT NOT NULL DEFAULT ''
);

-- Ledmap payloads; one per preset in practice, not enforced
CREATE TABLE IF NOT EXISTS ledmaps (
    mapid INTEGER PRIMARY KEY AUTOINCREMENT,
    mlid INTEGER NOT NULL,
    mnum INTEGER NOT NULL,
    mdata TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_presets_pid ON presets(pid);
CREATE INDEX IF NOT EXISTS idx_palettes_plid ON palettes(plid);
CREATE INDEX IF NOT EXISTS idx_ledmaps_mlid ON ledmaps(mlid);
"#;

/// Column names that collide with SQL reserved words.
const RESERVED_COLUMNS: &[&str] = &["group"];

/// Quotes an identifier when it collides with a reserved word.
fn quoted(column: &str) -> String {
    if RESERVED_COLUMNS.contains(&column) {
        format!("\"{column}\"")
    } else {
        column.to_string()
    }
}

const SELECT_RECORD: &str = r#"SELECT p.lid, p.pid, p.pname, p.qll, p.pdata, p.type, p.src, p.date, k.tag, k."group"
 FROM presets p JOIN keywords k ON k.kid = p.lid"#;

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Database wrapper for the preset library.
pub struct Library {
    conn: Connection,
}

impl Library {
    /// Opens the library, creating parent directories and the schema as
    /// needed.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        debug!(path = %path.display(), "Opening library database");
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        info!(path = %path.display(), "Library database ready");
        Ok(db)
    }

    /// Creates an in-memory library (used by tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Checks whether a datastore file exists and carries the expected schema.
    pub fn schema_present<P: AsRef<Path>>(path: P) -> Result<bool> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(false);
        }
        let conn = Connection::open(path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('presets', 'keywords', 'palettes', 'ledmaps')",
            [],
            |row| row.get(0),
        )?;
        Ok(count == 4)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // === Preset + keyword lifecycle ===

    /// Inserts a preset and its keyword shell atomically, returning the new
    /// surrogate identity.
    #[instrument(skip(self, new), fields(pid = new.pid, pname = %new.pname))]
    pub fn insert_preset(&mut self, new: &NewPreset, tag: &str, group: &str) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO presets (pid, pname, qll, pdata, type, src, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.pid,
                new.pname,
                new.qll,
                new.pdata,
                new.rtype.as_str(),
                new.src,
                now(),
            ],
        )?;
        let lid = tx.last_insert_rowid();
        tx.execute(
            &format!(
                "INSERT INTO keywords (kid, tag, {}) VALUES (?1, ?2, ?3)",
                quoted("group")
            ),
            params![lid, tag, group],
        )?;
        tx.commit()?;
        debug!(lid, "Inserted preset record");
        Ok(lid)
    }

    /// Loads one record by surrogate identity.
    pub fn get(&self, lid: i64) -> Result<Option<PresetRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_RECORD} WHERE p.lid = ?1"))?;
        let mut rows = stmt.query_map(params![lid], map_record)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Filtered, sorted read query: AND across distinct filter keys, OR
    /// across comma-values within one key.
    #[instrument(skip(self, filters))]
    pub fn query(&self, filters: &[Filter], sort: &SortSpec) -> Result<Vec<PresetRecord>> {
        let mut sql = SELECT_RECORD.to_string();
        let mut values: Vec<SqlValue> = Vec::new();
        let mut clauses: Vec<String> = Vec::new();

        for filter in filters {
            let mut alternatives = Vec::with_capacity(filter.values.len());
            for value in &filter.values {
                if filter.key.is_numeric() {
                    let n: i64 = value.parse().map_err(|_| LibrarianError::BadOption {
                        detail: format!("'{value}' is not a number"),
                    })?;
                    values.push(SqlValue::Integer(n));
                    alternatives.push(format!("{} = ?{}", column_expr(filter.key), values.len()));
                } else {
                    values.push(SqlValue::Text(format!("%{value}%")));
                    alternatives.push(format!(
                        "{} LIKE ?{}",
                        column_expr(filter.key),
                        values.len()
                    ));
                }
            }
            if !alternatives.is_empty() {
                clauses.push(format!("({})", alternatives.join(" OR ")));
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY {} {}",
            sort_expr(sort.column),
            if sort.descending { "DESC" } else { "ASC" }
        ));

        trace!(%sql, "Running filtered query");
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(values), map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(count = records.len(), "Query complete");
        Ok(records)
    }

    /// Finds records whose stored body contains the fingerprint as a
    /// substring. Deliberately fuzzy; see the import engine.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<PresetRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{SELECT_RECORD} WHERE instr(p.pdata, ?1) > 0 ORDER BY p.lid"
            ))?;
        let records = stmt
            .query_map(params![fingerprint], map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Updates only the supplied preset fields; refreshes the date stamp.
    pub fn update_preset(
        &self,
        lid: i64,
        pid: Option<u16>,
        pname: Option<&str>,
        qll: Option<&str>,
        pdata: Option<&str>,
    ) -> Result<()> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        let push = |column: &str, value: SqlValue, values: &mut Vec<SqlValue>, sets: &mut Vec<String>| {
            values.push(value);
            sets.push(format!("{column} = ?{}", values.len()));
        };

        if let Some(pid) = pid {
            push("pid", SqlValue::Integer(i64::from(pid)), &mut values, &mut sets);
        }
        if let Some(pname) = pname {
            push("pname", SqlValue::Text(pname.to_string()), &mut values, &mut sets);
        }
        if let Some(qll) = qll {
            push("qll", SqlValue::Text(qll.to_string()), &mut values, &mut sets);
        }
        if let Some(pdata) = pdata {
            push("pdata", SqlValue::Text(pdata.to_string()), &mut values, &mut sets);
        }
        if sets.is_empty() {
            return Ok(());
        }
        push("date", SqlValue::Text(now()), &mut values, &mut sets);

        values.push(SqlValue::Integer(lid));
        let sql = format!(
            "UPDATE presets SET {} WHERE lid = ?{}",
            sets.join(", "),
            values.len()
        );
        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(values))?;
        if changed == 0 {
            return Err(LibrarianError::RecordNotFound { lid });
        }
        Ok(())
    }

    /// Rewrites only the stored body of a record.
    pub fn update_pdata(&self, lid: i64, pdata: &str) -> Result<()> {
        self.update_preset(lid, None, None, None, Some(pdata))
    }

    /// Overwrites the tag/group sets of a keyword shell.
    pub fn update_keywords(&self, kid: i64, tag: &str, group: &str) -> Result<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE keywords SET tag = ?1, {} = ?2 WHERE kid = ?3",
                quoted("group")
            ),
            params![tag, group, kid],
        )?;
        if changed == 0 {
            return Err(LibrarianError::RecordNotFound { lid: kid });
        }
        Ok(())
    }

    /// Conflict-resolution Replace: overwrites the preset and keyword fields
    /// of an existing row in place.
    #[instrument(skip(self, new))]
    pub fn replace_preset(
        &mut self,
        lid: i64,
        new: &NewPreset,
        tag: &str,
        group: &str,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE presets SET pid = ?1, pname = ?2, qll = ?3, pdata = ?4, type = ?5, src = ?6, date = ?7
             WHERE lid = ?8",
            params![
                new.pid,
                new.pname,
                new.qll,
                new.pdata,
                new.rtype.as_str(),
                new.src,
                now(),
                lid,
            ],
        )?;
        if changed == 0 {
            return Err(LibrarianError::RecordNotFound { lid });
        }
        tx.execute(
            &format!(
                "UPDATE keywords SET tag = ?1, {} = ?2 WHERE kid = ?3",
                quoted("group")
            ),
            params![tag, group, lid],
        )?;
        tx.commit()?;
        info!(lid, "Replaced record in place");
        Ok(())
    }

    /// Deletes a record and cascades across its keyword, palette, and ledmap
    /// rows. Returns false if no such record existed.
    #[instrument(skip(self))]
    pub fn delete_cascade(&mut self, lid: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM presets WHERE lid = ?1", params![lid])?;
        tx.execute("DELETE FROM keywords WHERE kid = ?1", params![lid])?;
        tx.execute("DELETE FROM palettes WHERE plid = ?1", params![lid])?;
        tx.execute("DELETE FROM ledmaps WHERE mlid = ?1", params![lid])?;
        tx.commit()?;
        if deleted > 0 {
            info!(lid, "Deleted record with cascade");
        }
        Ok(deleted > 0)
    }

    /// The lowest unused device preset number in 1..=250.
    pub fn lowest_unused_pid(&self) -> Result<Option<u16>> {
        let used = self.used_pids()?;
        Ok((1..=super::PID_MAX).find(|n| !used.contains(n)))
    }

    /// All device preset numbers currently in use.
    pub fn used_pids(&self) -> Result<Vec<u16>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT pid FROM presets")?;
        let pids = stmt
            .query_map([], |row| row.get::<_, u16>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pids)
    }

    // === Side resources ===

    pub fn insert_palette(&self, plid: i64, plnum: u16, pldata: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO palettes (plid, plnum, pldata) VALUES (?1, ?2, ?3)",
            params![plid, plnum, pldata],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn has_palette(&self, plid: i64, plnum: u16) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM palettes WHERE plid = ?1 AND plnum = ?2",
            params![plid, plnum],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Palette rows owned by any of the given identities, in identity order.
    pub fn palettes_for(&self, lids: &[i64]) -> Result<Vec<PaletteRecord>> {
        let mut out = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT palid, plid, plnum, pldata FROM palettes WHERE plid = ?1 ORDER BY plnum",
        )?;
        for &lid in lids {
            let rows = stmt.query_map(params![lid], |row| {
                Ok(PaletteRecord {
                    palid: row.get(0)?,
                    plid: row.get(1)?,
                    plnum: row.get(2)?,
                    pldata: row.get(3)?,
                })
            })?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    pub fn insert_ledmap(&self, mlid: i64, mnum: u16, mdata: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO ledmaps (mlid, mnum, mdata) VALUES (?1, ?2, ?3)",
            params![mlid, mnum, mdata],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn has_ledmap(&self, mlid: i64, mnum: u16) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledmaps WHERE mlid = ?1 AND mnum = ?2",
            params![mlid, mnum],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ledmap rows owned by any of the given identities, in identity order.
    pub fn ledmaps_for(&self, lids: &[i64]) -> Result<Vec<LedmapRecord>> {
        let mut out = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT mapid, mlid, mnum, mdata FROM ledmaps WHERE mlid = ?1 ORDER BY mnum",
        )?;
        for &lid in lids {
            let rows = stmt.query_map(params![lid], |row| {
                Ok(LedmapRecord {
                    mapid: row.get(0)?,
                    mlid: row.get(1)?,
                    mnum: row.get(2)?,
                    mdata: row.get(3)?,
                })
            })?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }
}

fn column_expr(key: FilterKey) -> String {
    match key {
        FilterKey::Lid => "p.lid".to_string(),
        FilterKey::Pid => "p.pid".to_string(),
        FilterKey::Pname => "p.pname".to_string(),
        FilterKey::Qll => "p.qll".to_string(),
        FilterKey::Type => "p.type".to_string(),
        FilterKey::Src => "p.src".to_string(),
        FilterKey::Tag => "k.tag".to_string(),
        FilterKey::Group => format!("k.{}", quoted("group")),
    }
}

const fn sort_expr(column: SortColumn) -> &'static str {
    match column {
        SortColumn::Lid => "p.lid",
        SortColumn::Pid => "p.pid",
        SortColumn::Pname => "p.pname",
        SortColumn::Qll => "p.qll",
        SortColumn::Type => "p.type",
        SortColumn::Src => "p.src",
        SortColumn::Date => "p.date",
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PresetRecord> {
    let rtype: String = row.get(5)?;
    Ok(PresetRecord {
        lid: row.get(0)?,
        pid: row.get(1)?,
        pname: row.get(2)?,
        qll: row.get(3)?,
        pdata: row.get(4)?,
        rtype: RecordType::from_str(&rtype),
        src: row.get(6)?,
        date: row.get(7)?,
        tag: row.get(8)?,
        group: row.get(9)?,
    })
}

/// Returns the default database path.
///
/// Location: `<data-local>/preset-librarian/library.db`
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| {
        LibrarianError::Other("Could not determine local data directory".to_string())
    })?;
    Ok(data_dir.join("preset-librarian").join("library.db"))
}
