//! Application property documents
//!
//! The application configuration is `.properties` text: one `key=value` per
//! logical line, `key: value` and `key value` accepted as well. Lines whose
//! first non-blank character is `#` or `!` are comments and a trailing `\`
//! joins the next physical line.
//!
//! Keys and values are unescaped the way Java property files are: `\t`,
//! `\n`, `\r` and `\f` are control characters, `\uXXXX` is a UTF-16 code
//! unit, and a backslash before any other character keeps that character
//! literally. An escaped `=`, `:` or space does not end the key.

use crate::constants::ALL_CONFIG_NAMES;
use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Parsed application property document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppProperties {
    entries: BTreeMap<String, String>,
}

impl AppProperties {
    /// Parse property text. Later duplicates win.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut logical = String::new();

        for raw in text.lines() {
            let line = raw.trim_start();
            if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }

            if let Some(stripped) = continued(line) {
                logical.push_str(stripped);
                continue;
            }
            logical.push_str(line);

            if let Some((key, value)) = split_entry(&logical) {
                entries.insert(key, value);
            }
            logical.clear();
        }

        // Dangling continuation on the last line
        if let Some((key, value)) = split_entry(&logical) {
            entries.insert(key, value);
        }

        Self { entries }
    }

    /// Read and parse a property file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let props = Self::parse(&text);
        info!(path = %path.display(), entries = props.len(), "Loaded application properties");
        Ok(props)
    }

    /// Look up a property value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a property that must be present
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| ConfigError::missing_property(key))
    }

    /// Split a comma-separated property into trimmed, non-empty items
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(split_list)
    }

    /// The master list of message type ids, in declared order
    pub fn message_type_ids(&self) -> Result<Vec<String>> {
        let ids = split_list(self.require(ALL_CONFIG_NAMES)?);
        debug!(count = ids.len(), "Resolved master message type list");
        Ok(ids)
    }

    /// Set or replace a property
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a comma-separated value into trimmed, non-empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn continued(line: &str) -> Option<&str> {
    let trailing = line.len() - line.trim_end_matches('\\').len();
    // An even run of backslashes is a literal, not a continuation
    if trailing % 2 == 1 {
        Some(&line[..line.len() - 1])
    } else {
        None
    }
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut sep = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            sep = i;
            break;
        }
    }

    let key = &line[..sep];
    let mut rest = line[sep..].trim_start();
    if let Some(stripped) = rest.strip_prefix('=').or_else(|| rest.strip_prefix(':')) {
        rest = stripped.trim_start();
    }

    Some((unescape(key), unescape(rest.trim_end())))
}

/// Decode backslash escapes; a malformed `\u` leaves its characters literal
fn unescape(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut units: Vec<u16> = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'u') {
            let hex: String = chars.clone().skip(1).take(4).collect();
            if let Some(unit) = parse_code_unit(&hex) {
                chars.nth(4);
                units.push(unit);
                continue;
            }
        }

        flush_units(&mut units, &mut out);
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{0C}'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    flush_units(&mut units, &mut out);
    out
}

fn parse_code_unit(hex: &str) -> Option<u16> {
    if hex.len() != 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(hex, 16).ok()
}

/// Decode buffered `\uXXXX` units so surrogate pairs join into one char
fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    out.extend(
        char::decode_utf16(units.drain(..)).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
    );
}
