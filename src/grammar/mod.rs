//! CommandGrammar: parses a committed line into one primary clause and an
//! optional chained secondary clause.
//!
//! Each clause is a verb plus the typed options registered for that verb.
//! Options are `key:value` tokens; flags are bare tokens whose presence sets a
//! boolean; list-valued keys accept comma-separated values (duplicate commas
//! collapse); quoted values preserve embedded spaces.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LibrarianError, Result};

/// Verbs understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Show,
    Add,
    Remove,
    Delete,
    Duplicate,
    Edit,
    Import,
    Export,
    Sort,
    Help,
    Quit,
}

/// How an option's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Single value after the colon.
    Value,
    /// Comma-separated values after the colon.
    List,
    /// Bare token; presence sets a boolean.
    Flag,
}

/// One registered option key for a verb.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub key: &'static str,
    pub kind: OptionKind,
}

const fn value(key: &'static str) -> OptionSpec {
    OptionSpec {
        key,
        kind: OptionKind::Value,
    }
}
const fn list(key: &'static str) -> OptionSpec {
    OptionSpec {
        key,
        kind: OptionKind::List,
    }
}
const fn flag(key: &'static str) -> OptionSpec {
    OptionSpec {
        key,
        kind: OptionKind::Flag,
    }
}

/// Filter keys shared by Show and Delete.
const FILTER_OPTIONS: &[OptionSpec] = &[
    list("lid"),
    list("pid"),
    list("pname"),
    list("qll"),
    list("tag"),
    list("group"),
    list("type"),
    list("src"),
];

const KEYWORD_OPTIONS: &[OptionSpec] = &[list("lid"), list("tag"), list("group")];

const DUPLICATE_OPTIONS: &[OptionSpec] = &[
    value("lid"),
    value("pid"),
    value("pname"),
    value("qll"),
    list("tag"),
    list("group"),
];

const EDIT_OPTIONS: &[OptionSpec] = &[
    value("lid"),
    value("pid"),
    value("pname"),
    value("qll"),
];

const IMPORT_OPTIONS: &[OptionSpec] = &[
    value("file"),
    flag("device"),
    list("tag"),
    list("group"),
    flag("nodup"),
];

const EXPORT_OPTIONS: &[OptionSpec] = &[list("lid"), value("file"), flag("device")];

const SORT_OPTIONS: &[OptionSpec] = &[value("by"), value("dir")];

/// Verbs that may start a chained secondary clause.
const SECONDARY_VERBS: &[&str] = &["add", "remove", "export"];

impl Verb {
    /// Case-insensitive verb lookup.
    pub fn lookup(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "show" => Some(Self::Show),
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "delete" => Some(Self::Delete),
            "duplicate" => Some(Self::Duplicate),
            "edit" => Some(Self::Edit),
            "import" => Some(Self::Import),
            "export" => Some(Self::Export),
            "sort" => Some(Self::Sort),
            "help" => Some(Self::Help),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }

    /// The option keys registered for this verb.
    pub const fn options(self) -> &'static [OptionSpec] {
        match self {
            Self::Show | Self::Delete => FILTER_OPTIONS,
            Self::Add | Self::Remove => KEYWORD_OPTIONS,
            Self::Duplicate => DUPLICATE_OPTIONS,
            Self::Edit => EDIT_OPTIONS,
            Self::Import => IMPORT_OPTIONS,
            Self::Export => EXPORT_OPTIONS,
            Self::Sort => SORT_OPTIONS,
            Self::Help | Self::Quit => &[],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Delete => "delete",
            Self::Duplicate => "duplicate",
            Self::Edit => "edit",
            Self::Import => "import",
            Self::Export => "export",
            Self::Sort => "sort",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }
}

/// One parsed verb+options clause.
#[derive(Debug, Clone)]
pub struct Clause {
    pub verb: Verb,
    options: BTreeMap<String, String>,
    flags: BTreeSet<String>,
}

impl Clause {
    /// Raw option value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Comma-list option split into its values. Empty when absent.
    pub fn values(&self, key: &str) -> Vec<String> {
        self.options
            .get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.flags.contains(key)
    }

    pub fn option_keys(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }
}

/// Immutable result of parsing one committed line.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub primary: Clause,
    pub secondary: Option<Clause>,
}

/// Parses a free-text command line.
///
/// An unmatched verb or unregistered option discards the whole command; no
/// partial execution happens.
pub fn parse(line: &str) -> Result<ParsedCommand> {
    let tokens = tokenize(line);
    if tokens.is_empty() {
        return Err(LibrarianError::UnsupportedCommand {
            verb: String::new(),
        });
    }

    // A secondary verb appearing after position 0 splits the line there
    let split_at = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, t)| SECONDARY_VERBS.contains(&t.to_ascii_lowercase().as_str()))
        .map(|(i, _)| i);

    let (head, tail) = match split_at {
        Some(i) => (&tokens[..i], Some(&tokens[i..])),
        None => (&tokens[..], None),
    };

    let primary = parse_clause(head)?;
    let secondary = tail.map(|t| parse_clause(t)).transpose()?;

    Ok(ParsedCommand { primary, secondary })
}

fn parse_clause(tokens: &[String]) -> Result<Clause> {
    let verb = Verb::lookup(&tokens[0]).ok_or_else(|| LibrarianError::UnsupportedCommand {
        verb: tokens[0].clone(),
    })?;
    let specs = verb.options();

    let mut options = BTreeMap::new();
    let mut flags = BTreeSet::new();

    for token in &tokens[1..] {
        if let Some((key, raw)) = token.split_once(':') {
            let key = key.to_ascii_lowercase();
            let spec = specs.iter().find(|s| s.key == key).ok_or_else(|| {
                LibrarianError::UnknownOption {
                    verb: verb.name().to_string(),
                    key: key.clone(),
                }
            })?;
            let normalized = match spec.kind {
                OptionKind::List => normalize_list(raw),
                OptionKind::Value => raw.to_string(),
                OptionKind::Flag => {
                    return Err(LibrarianError::BadOption {
                        detail: format!("'{key}' takes no value"),
                    });
                }
            };
            options.insert(key, normalized);
        } else {
            let key = token.to_ascii_lowercase();
            let known = specs
                .iter()
                .any(|s| s.key == key && s.kind == OptionKind::Flag);
            if !known {
                return Err(LibrarianError::UnknownOption {
                    verb: verb.name().to_string(),
                    key,
                });
            }
            flags.insert(key);
        }
    }

    Ok(Clause {
        verb,
        options,
        flags,
    })
}

/// Collapses duplicate commas and surrounding whitespace in a list value.
fn normalize_list(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Whitespace tokenizer with quote support.
///
/// Runs of whitespace collapse; a `'...'` or `"..."` segment keeps embedded
/// spaces and sheds its quotes, so `pname:'Warm white'` is one token.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.trim().chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
