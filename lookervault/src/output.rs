//! Structured summary printing. Progress bars are out of scope (spec.md
//! §1 Non-goals); a run prints one plain-text block to stderr, or one JSON
//! object to stdout with `--json`, after it finishes.

use serde::Serialize;

pub fn emit<T: Serialize + std::fmt::Display>(value: &T, json: bool) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("failed to serialize summary: {e}"),
        }
    } else {
        eprintln!("{value}");
    }
}
