//! Dependency field parsing and Spack `depends_on` rendering
//!
//! CRAN fields such as `Imports` hold entries like
//! `Rcpp (>= 1.0.8), data.table`. Each entry becomes one
//! `depends_on("r-<name>[@range]", type=("build", "run"))` line.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([^\s(]+)\s*(?:\(\s*(>=|<=|>|<|==)\s*([^),\s]+)\s*(?:,\s*(>=|<=|>|<)\s*([^)\s]+)\s*)?\))?$",
    )
    .expect("dependency pattern is valid")
});

const DEPENDENCY_TYPES: &str = r#"("build", "run")"#;

/// Inclusive version bounds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<String>,
    pub max: Option<String>,
}

impl VersionRange {
    fn constrain(&mut self, op: &str, version: &str) {
        if op.starts_with('>') {
            self.min = Some(version.to_string());
        } else if op.starts_with('<') {
            self.max = Some(version.to_string());
        } else if op.starts_with('=') {
            self.min = Some(version.to_string());
            self.max = Some(version.to_string());
        }
    }

    /// Spack constraint suffix: `@min:max`, `@min:`, `@:max` or nothing.
    pub fn to_spack(&self) -> String {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => format!("@{}:{}", min, max),
            (Some(min), None) => format!("@{}:", min),
            (None, Some(max)) => format!("@:{}", max),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: VersionRange,
}

impl Dependency {
    pub fn parse(entry: &str) -> Result<Self> {
        let caps = DEPENDENCY_RE
            .captures(entry.trim())
            .ok_or_else(|| Error::MalformedDependency(entry.to_string()))?;

        let mut version = VersionRange::default();
        if let (Some(op), Some(ver)) = (caps.get(2), caps.get(3)) {
            version.constrain(op.as_str(), ver.as_str());
        }
        if let (Some(op), Some(ver)) = (caps.get(4), caps.get(5)) {
            version.constrain(op.as_str(), ver.as_str());
        }

        Ok(Self {
            name: caps[1].to_string(),
            version,
        })
    }

    /// Spack package name; R itself is the bare `r` package.
    pub fn spack_name(&self) -> String {
        if self.name == "R" {
            return "r".to_string();
        }
        format!("r-{}", self.name.to_lowercase().replace('.', "-"))
    }

    pub fn spec(&self) -> String {
        format!("{}{}", self.spack_name(), self.version.to_spack())
    }

    pub fn directive(&self) -> String {
        format!("depends_on(\"{}\", type={})", self.spec(), DEPENDENCY_TYPES)
    }
}

/// Split a field on top-level commas, ignoring commas inside parentheses.
pub fn split_entries(field: &str) -> Result<Vec<&str>> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in field.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::MalformedDependency(field.to_string()))?;
            }
            ',' if depth == 0 => {
                entries.push(field[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::MalformedDependency(field.to_string()));
    }
    entries.push(field[start..].trim());

    entries.retain(|entry| !entry.is_empty());
    Ok(entries)
}

/// Parse an optional dependency field; an absent field yields no dependencies.
pub fn parse_field(field: Option<&str>) -> Result<Vec<Dependency>> {
    match field {
        Some(field) => split_entries(field)?
            .into_iter()
            .map(Dependency::parse)
            .collect(),
        None => Ok(Vec::new()),
    }
}
