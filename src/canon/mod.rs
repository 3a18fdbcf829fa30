//! Canonicalizing JSON reformatter for preset and playlist bodies.
//!
//! The device format is loosely typed; this module imposes a deterministic,
//! level-by-level key order and coerces values by key class so that stored
//! records compare and fingerprint reliably. Keys present in the input but
//! absent from the fixed order are appended afterward in encounter order —
//! unknown keys are never dropped. Output is a JSON fragment of the form
//! `"NN":{...}` that must re-parse once wrapped in an enclosing object.

use serde_json::Value;

use crate::error::{LibrarianError, Result};

/// Segment count the device expects in an uploaded preset.
pub const MAX_SEGMENTS: usize = 32;

/// Placeholder padding records grouped per output line, for readability only.
const PAD_PER_LINE: usize = 10;

/// Minimal placeholder segment accepted by the device.
const SEG_PLACEHOLDER: &str = "{\"stop\":0}";

/// Top-level preset key order. `seg` always renders last.
const PRESET_KEYS: &[&str] = &["on", "n", "ql", "bri", "transition", "mainseg", "ledmap", "seg"];

/// Segment key order, split across three sub-groups: addressing, state, effect.
const SEG_KEYS: &[&[&str]] = &[
    &["id", "start", "stop", "grp", "spc", "of"],
    &["on", "frz", "bri", "cct", "set", "n"],
    &["col", "fx", "sx", "ix", "pal", "c1", "c2", "c3", "sel", "rev", "mi"],
];

/// Top-level playlist key order; the nested `playlist` object has its own.
const PLAYLIST_TOP_KEYS: &[&str] = &["on", "n", "ql", "playlist"];
const PLAYLIST_KEYS: &[&str] = &["ps", "dur", "transition", "repeat", "r", "end"];

/// Keys rendered as literal booleans from any truthy/falsy input.
const BOOL_KEYS: &[&str] = &["on", "frz", "sel", "rev", "mi", "r"];

/// Keys rendered as unquoted numbers.
const NUM_KEYS: &[&str] = &[
    "bri", "transition", "mainseg", "ledmap", "id", "start", "stop", "grp", "spc", "of", "cct",
    "set", "fx", "sx", "ix", "pal", "c1", "c2", "c3", "dur", "repeat", "end",
];

/// Keys rendered as quoted strings.
const STRING_KEYS: &[&str] = &["n", "ql"];

/// True when the body carries the playlist marker.
pub fn is_playlist(body: &Value) -> bool {
    body.get("playlist").is_some()
}

/// Canonicalizes a preset or playlist body into its stored fragment form.
///
/// Returns `InvalidJson` if the body is not an object or the produced text
/// fails to re-parse — malformed text is never emitted.
pub fn canonicalize(body: &Value, pid: u16) -> Result<String> {
    let obj = body.as_object().ok_or_else(|| LibrarianError::InvalidJson {
        context: format!("preset {pid}"),
        reason: "body is not an object".to_string(),
    })?;

    let inner = if is_playlist(body) {
        render_object(obj, PLAYLIST_TOP_KEYS, |key, value| {
            if key == "playlist" {
                value
                    .as_object()
                    .map(|p| render_object(p, PLAYLIST_KEYS, render_coerced))
            } else {
                Some(render_coerced(key, value))
            }
            .unwrap_or_else(|| render_coerced(key, value))
        })
    } else {
        render_object(obj, PRESET_KEYS, |key, value| {
            if key == "seg" {
                render_segments(value)
            } else {
                render_coerced(key, value)
            }
        })
    };

    let out = format!("\"{pid}\":{inner}");

    // The fragment must independently re-parse once wrapped
    let wrapped = format!("{{{out}}}");
    serde_json::from_str::<Value>(&wrapped).map_err(|e| LibrarianError::InvalidJson {
        context: format!("canonicalized preset {pid}"),
        reason: e.to_string(),
    })?;

    Ok(out)
}

/// Parses a stored `"NN":{...}` fragment back into its number and body.
pub fn parse_fragment(pdata: &str) -> Result<(u16, Value)> {
    let wrapped = format!("{{{pdata}}}");
    let value: Value =
        serde_json::from_str(&wrapped).map_err(|e| LibrarianError::InvalidJson {
            context: "stored record".to_string(),
            reason: e.to_string(),
        })?;
    let obj = value.as_object().filter(|o| o.len() == 1).ok_or_else(|| {
        LibrarianError::InvalidJson {
            context: "stored record".to_string(),
            reason: "expected a single numbered entry".to_string(),
        }
    })?;
    let (key, body) = obj.iter().next().map(|(k, v)| (k.clone(), v.clone())).expect("len checked");
    let pid = key.parse::<u16>().map_err(|_| LibrarianError::InvalidJson {
        context: "stored record".to_string(),
        reason: format!("non-numeric preset key '{key}'"),
    })?;
    Ok((pid, body))
}

/// Renders an object with a fixed key order, appending unknown keys in
/// encounter order.
fn render_object<F>(
    obj: &serde_json::Map<String, Value>,
    order: &[&str],
    mut render: F,
) -> String
where
    F: FnMut(&str, &Value) -> String,
{
    let mut parts = Vec::with_capacity(obj.len());
    for &key in order {
        if let Some(value) = obj.get(key) {
            parts.push(format!("\"{key}\":{}", render(key, value)));
        }
    }
    for (key, value) in obj {
        if !order.contains(&key.as_str()) {
            parts.push(format!("\"{key}\":{}", render(key, value)));
        }
    }
    format!("{{{}}}", parts.join(","))
}

/// Coerces a scalar by key class; containers and unknown keys pass through
/// with their input value serialized as-is.
fn render_coerced(key: &str, value: &Value) -> String {
    if value.is_object() || value.is_array() {
        return value.to_string();
    }
    if BOOL_KEYS.contains(&key) {
        return if truthy(value) { "true" } else { "false" }.to_string();
    }
    if NUM_KEYS.contains(&key) {
        return render_number(value);
    }
    if STRING_KEYS.contains(&key) {
        return match value {
            Value::String(s) => Value::String(s.clone()).to_string(),
            other => format!("\"{other}\""),
        };
    }
    value.to_string()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            s == "true" || s == "on" || s.parse::<f64>().is_ok_and(|f| f != 0.0)
        }
        _ => false,
    }
}

fn render_number(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::String(s) => {
            let s = s.trim();
            if s.parse::<i64>().is_ok() || s.parse::<f64>().is_ok() {
                s.to_string()
            } else {
                "0".to_string()
            }
        }
        _ => "0".to_string(),
    }
}

/// Renders the segment array padded to [`MAX_SEGMENTS`] entries.
///
/// Real segments get one line each; trailing placeholders are grouped
/// [`PAD_PER_LINE`] per line. The grouping is a formatting choice with no
/// semantic weight.
fn render_segments(value: &Value) -> String {
    let rendered: Vec<String> = match value {
        Value::Array(elements) => elements
            .iter()
            .map(|seg| match seg.as_object() {
                Some(obj) => render_object(obj, &seg_key_order(), render_coerced),
                None => seg.to_string(),
            })
            .collect(),
        other => return other.to_string(),
    };

    // Trailing entries identical to the placeholder are padding, whether they
    // arrived as input or get appended here; keep them chunked either way so
    // repeated canonicalization is stable.
    let real_len = rendered
        .iter()
        .rposition(|s| s != SEG_PLACEHOLDER)
        .map_or(0, |i| i + 1);

    let mut lines: Vec<String> = rendered[..real_len].to_vec();
    let pad_total = MAX_SEGMENTS.saturating_sub(real_len);
    let mut remaining = pad_total;
    while remaining > 0 {
        let chunk = remaining.min(PAD_PER_LINE);
        lines.push(vec![SEG_PLACEHOLDER; chunk].join(","));
        remaining -= chunk;
    }

    format!("[\n{}\n]", lines.join(",\n"))
}

fn seg_key_order() -> Vec<&'static str> {
    SEG_KEYS.iter().flat_map(|group| group.iter().copied()).collect()
}
