//! Cross-platform filename sanitization for the folder unpack strategy
//! (§4.6): Unicode-normalizes to NFC, strips characters any of
//! Windows/macOS/Linux reject, and resolves post-sanitization collisions
//! with a `(2)`, `(3)`, … suffix.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;

const RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Normalizes and strips a single path segment so it is a valid file or
/// directory name on every major OS. Does not touch path separators; callers
/// sanitize one segment at a time.
pub fn sanitize_segment(name: &str) -> String {
    let normalized: String = name.nfc().collect();
    let mut cleaned: String = normalized
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if (c as u32) < 0x20 => '_',
            c => c,
        })
        .collect();

    cleaned = cleaned.trim_end_matches(['.', ' ']).to_string();
    if cleaned.is_empty() {
        cleaned = "_".to_string();
    }
    if RESERVED_WINDOWS_NAMES.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.push('_');
    }
    cleaned
}

/// Resolves collisions among sanitized segments that share a parent
/// directory by appending ` (2)`, ` (3)`, … to later entries, in the order
/// given. Intended to be called once per sibling group.
#[derive(Debug, Default)]
pub struct CollisionResolver {
    seen: HashMap<String, u32>,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, name: &str) -> String {
        let count = self.seen.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            name.to_string()
        } else {
            format!("{name} ({count})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_reserved_characters() {
        assert_eq!(sanitize_segment("Q4: Sales / Regional?"), "Q4_ Sales _ Regional_");
    }

    #[test]
    fn normalizes_to_nfc() {
        let decomposed = "e\u{0301}cole"; // e + combining acute accent
        let sanitized = sanitize_segment(decomposed);
        assert_eq!(sanitized.chars().count(), 5);
    }

    #[test]
    fn guards_reserved_windows_names() {
        assert_eq!(sanitize_segment("CON"), "CON_");
        assert_eq!(sanitize_segment("con"), "con_");
    }

    #[test]
    fn collision_resolver_suffixes_repeats() {
        let mut resolver = CollisionResolver::new();
        assert_eq!(resolver.resolve("Sales"), "Sales");
        assert_eq!(resolver.resolve("Sales"), "Sales (2)");
        assert_eq!(resolver.resolve("Sales"), "Sales (3)");
        assert_eq!(resolver.resolve("Marketing"), "Marketing");
    }
}
