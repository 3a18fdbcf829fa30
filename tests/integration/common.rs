//! Shared fixtures: preset documents and files for the pipeline tests.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

/// A plain single-segment preset body.
pub fn preset_body(name: &str, stop: u64) -> Value {
    json!({
        "on": true,
        "n": name,
        "bri": 128,
        "seg": [{"id": 0, "start": 0, "stop": stop, "fx": 0, "pal": 0}]
    })
}

/// A playlist body cycling through the given preset numbers.
pub fn playlist_body(name: &str, ps: &[u64]) -> Value {
    json!({
        "on": true,
        "n": name,
        "playlist": {
            "ps": ps,
            "dur": ps.iter().map(|_| 100).collect::<Vec<_>>(),
            "transition": ps.iter().map(|_| 7).collect::<Vec<_>>(),
            "repeat": 0,
            "end": 0
        }
    })
}

/// Assembles a device-shaped preset document with the reserved `"0"` slot.
pub fn doc(entries: &[(u16, Value)]) -> String {
    let mut map = serde_json::Map::new();
    map.insert("0".to_string(), json!({}));
    for (pid, body) in entries {
        map.insert(pid.to_string(), body.clone());
    }
    Value::Object(map).to_string()
}

/// A three-preset document used by most import tests.
pub fn three_preset_doc() -> String {
    doc(&[
        (1, preset_body("Sunrise", 30)),
        (2, preset_body("Daylight", 60)),
        (3, preset_body("Sunset", 90)),
    ])
}

pub fn write_doc(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
