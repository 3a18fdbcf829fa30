//! The four-table relational data model and its record types.
//!
//! Referential integrity is maintained by application logic, not by datastore
//! constraints: a PresetRecord and its KeywordRecord share one identity and
//! are created and destroyed together; Palette/Ledmap rows hang off the same
//! identity and go away with it.

mod db;

pub use db::{Library, default_db_path};

use std::collections::BTreeSet;

/// Device preset number bounds (inclusive).
pub const PID_MIN: u16 = 0;
pub const PID_MAX: u16 = 250;

/// Tag assigned by Import when neither tags nor groups are supplied.
pub const DEFAULT_TAG: &str = "new";

/// Encoded custom-palette slot range inside a segment's `pal` value.
pub const PALETTE_NUM_MIN: u16 = 247;
pub const PALETTE_NUM_MAX: u16 = 256;

/// Local slot index (0-9) for an encoded palette number.
pub const fn palette_slot(plnum: u16) -> u16 {
    PALETTE_NUM_MAX - plnum
}

/// Record kind stored in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Preset,
    Playlist,
}

impl RecordType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preset => "preset",
            Self::Playlist => "playlist",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s == "playlist" {
            Self::Playlist
        } else {
            Self::Preset
        }
    }
}

/// A preset row joined with its keyword shell.
#[derive(Debug, Clone)]
pub struct PresetRecord {
    /// Surrogate identity, immutable and unique.
    pub lid: i64,
    /// Device preset number; not unique across records.
    pub pid: u16,
    pub pname: String,
    pub qll: String,
    /// Canonical JSON fragment `"NN":{...}`.
    pub pdata: String,
    pub rtype: RecordType,
    /// Provenance label: file name, "device", or a duplication note.
    pub src: String,
    pub date: String,
    /// Sorted, deduplicated comma-joined tag set.
    pub tag: String,
    /// Sorted, deduplicated comma-joined group set.
    pub group: String,
}

/// Fields for a new preset+keyword pair.
#[derive(Debug, Clone)]
pub struct NewPreset {
    pub pid: u16,
    pub pname: String,
    pub qll: String,
    pub pdata: String,
    pub rtype: RecordType,
    pub src: String,
}

#[derive(Debug, Clone)]
pub struct PaletteRecord {
    pub palid: i64,
    /// Owning preset's lid.
    pub plid: i64,
    /// Encoded slot number (247-256).
    pub plnum: u16,
    pub pldata: String,
}

#[derive(Debug, Clone)]
pub struct LedmapRecord {
    pub mapid: i64,
    /// Owning preset's lid.
    pub mlid: i64,
    /// Slot number (0-9).
    pub mnum: u16,
    pub mdata: String,
}

/// Queryable columns for Show/Delete filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Lid,
    Pid,
    Pname,
    Qll,
    Tag,
    Group,
    Type,
    Src,
}

impl FilterKey {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "lid" => Some(Self::Lid),
            "pid" => Some(Self::Pid),
            "pname" => Some(Self::Pname),
            "qll" => Some(Self::Qll),
            "tag" => Some(Self::Tag),
            "group" => Some(Self::Group),
            "type" => Some(Self::Type),
            "src" => Some(Self::Src),
            _ => None,
        }
    }

    /// Numeric keys compare exactly; text keys compare as substring.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Lid | Self::Pid)
    }
}

/// One filter: OR across its comma-values, AND across distinct filters.
#[derive(Debug, Clone)]
pub struct Filter {
    pub key: FilterKey,
    pub values: Vec<String>,
}

/// Sortable columns for Show output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Lid,
    Pid,
    Pname,
    Qll,
    Type,
    Src,
    Date,
}

impl SortColumn {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "lid" => Some(Self::Lid),
            "pid" => Some(Self::Pid),
            "pname" => Some(Self::Pname),
            "qll" => Some(Self::Qll),
            "type" => Some(Self::Type),
            "src" => Some(Self::Src),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

/// Process-duration sort state used by all Show queries.
#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub column: SortColumn,
    pub descending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: SortColumn::Lid,
            descending: false,
        }
    }
}

/// Normalizes a word list into the stored sorted, deduplicated comma form.
pub fn normalize_words(words: &[String]) -> String {
    let set: BTreeSet<&str> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect();
    set.into_iter().collect::<Vec<_>>().join(",")
}

/// Adds or removes words from a stored comma-joined set, returning the
/// recomputed sorted, deduplicated form.
pub fn merge_words(existing: &str, words: &[String], add: bool) -> String {
    let mut set: BTreeSet<String> = existing
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
        .collect();
    for word in words {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        if add {
            set.insert(word.to_string());
        } else {
            set.remove(word);
        }
    }
    set.into_iter().collect::<Vec<_>>().join(",")
}
