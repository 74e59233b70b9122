//! Earlier `version(...)` directives of an existing Spack `package.py`
//!
//! Only the version lines are carried over. Everything else in the file
//! (docstring, homepage, `depends_on`) is regenerated from the database.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::{Error, Result};

static VERSION_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*version\(").expect("version call pattern is valid")
});

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(\S.*)$")
        .expect("keyword argument pattern is valid")
});

const CHECKSUM_KEYS: [&str; 6] = ["md5", "sha1", "sha224", "sha256", "sha384", "sha512"];

/// One `version()` line of a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousVersion {
    pub version: String,
    /// Keyword arguments in file order, values exactly as written
    pub arguments: Vec<(String, String)>,
}

impl PreviousVersion {
    pub fn checksum(&self) -> Option<(&str, &str)> {
        self.arguments
            .iter()
            .find(|(key, _)| CHECKSUM_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn directive(&self) -> String {
        let mut line = format!("version(\"{}\"", self.version);
        for (key, value) in &self.arguments {
            line.push_str(&format!(", {}={}", key, value));
        }
        line.push(')');
        line
    }
}

/// Read the version lines of the recipe at `path`.
pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<PreviousVersion>> {
    let path = path.as_ref();
    info!("Reading existing recipe {:?}", path);
    parse(&fs::read_to_string(path)?)
}

/// Collect every `version(...)` call found at the start of a line.
pub fn parse(text: &str) -> Result<Vec<PreviousVersion>> {
    let mut versions = Vec::new();
    for call in VERSION_CALL_RE.find_iter(text) {
        let arguments = call_arguments(&text[call.end()..]).ok_or_else(|| {
            Error::MalformedRecipe(format!("unterminated call: {}", line_at(text, call.end())))
        })?;
        versions.push(parse_call(arguments)?);
    }
    debug!("Found {} existing versions", versions.len());
    Ok(versions)
}

fn line_at(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = text[offset..].find('\n').map_or(text.len(), |i| offset + i);
    text[start..end].trim()
}

/// Text up to the parenthesis closing the call, quotes respected.
fn call_arguments(rest: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')') if depth == 0 => return Some(&rest[..i]),
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Split on commas outside quotes and brackets.
fn split_arguments(arguments: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in arguments.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(arguments[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(arguments[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

fn string_literal(s: &str) -> Option<&str> {
    let quote = s.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    s.strip_prefix(quote)?.strip_suffix(quote)
}

fn parse_call(arguments: &str) -> Result<PreviousVersion> {
    let malformed = || Error::MalformedRecipe(format!("version({})", arguments.trim()));

    let mut parts = split_arguments(arguments).into_iter();
    let version = parts
        .next()
        .and_then(string_literal)
        .filter(|v| !v.is_empty())
        .ok_or_else(malformed)?
        .to_string();

    let mut keywords = Vec::new();
    for part in parts {
        let caps = KEYWORD_RE.captures(part).ok_or_else(malformed)?;
        keywords.push((caps[1].to_string(), caps[2].trim_end().to_string()));
    }

    let previous = PreviousVersion {
        version,
        arguments: keywords,
    };
    if previous.checksum().is_none() {
        return Err(malformed());
    }
    Ok(previous)
}
