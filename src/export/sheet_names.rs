//! Sheet name rules: invalid characters, the 31-character limit and collisions.

use std::collections::HashSet;

/// Longest sheet name a workbook accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const INVALID_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Replace characters a sheet name cannot hold and cut it to the length limit.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let name = trim_edges(&truncate_chars(cleaned.trim(), MAX_SHEET_NAME_LEN));

    if name.is_empty() {
        return "Sheet".to_string();
    }
    name
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Sheet names may not start or end with an apostrophe.
fn trim_edges(value: &str) -> String {
    value.trim_matches(|c: char| c == '\'' || c.is_whitespace()).to_string()
}

/// Hands out unique sheet names within one workbook.
///
/// Names compare case-insensitively, as spreadsheet applications do.
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitized name for `raw`, suffixed ` (2)`, ` (3)`... when already taken.
    pub fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 2;
        loop {
            let suffix = format!(" ({})", counter);
            let stem = truncate_chars(&base, MAX_SHEET_NAME_LEN - suffix.chars().count());
            let candidate = format!("{}{}", trim_edges(&stem), suffix);

            if self.used.insert(candidate.to_lowercase()) {
                log::warn!(
                    "Sheet name '{}' already used, writing '{}' as '{}'",
                    base,
                    raw,
                    candidate
                );
                return candidate;
            }
            counter += 1;
        }
    }
}
