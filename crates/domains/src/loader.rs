use std::fs;

use anyhow::{Context, Result};

const STRIPPED_PREFIXES: &[&str] = &["https-", "https.", "http-", "http.", "0.0.0.0 ", "127.0.0.1 "];

/// Reads `sources` (semicolon-separated file paths), strips comments and the
/// well-known hosts-file-style prefixes, and hands each resulting entry to
/// `add`. Returns the number of entries inserted. A missing or unreadable
/// file is fatal — there is no partial-success mode.
pub fn load_domains(sources: &str, mut add: impl FnMut(&str)) -> Result<usize> {
    let mut count = 0;
    for source in sources.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let contents = fs::read_to_string(source)
            .with_context(|| format!("failed to read domain list {source}"))?;
        for raw_line in contents.lines() {
            if let Some(entry) = clean_line(raw_line) {
                add(&entry);
                count += 1;
            }
        }
    }
    Ok(count)
}

fn clean_line(raw_line: &str) -> Option<String> {
    let line = raw_line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return None;
    }
    let mut entry = line;
    for prefix in STRIPPED_PREFIXES {
        if let Some(rest) = entry.strip_prefix(prefix) {
            entry = rest;
            break;
        }
    }
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }
    Some(entry.to_ascii_lowercase())
}
