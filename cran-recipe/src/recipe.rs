//! Spack recipe rendering

use std::fmt;

use cran_db::PackageRecord;

use crate::deps::{self, Dependency};
use crate::existing::PreviousVersion;
use crate::Result;

const INDENT: &str = "    ";

/// Everything printed for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub title: String,
    pub description: String,
    pub homepage: Option<String>,
    pub cran: String,
    pub version: String,
    pub sha256: String,
    /// Older releases listed after the current one
    pub previous_versions: Vec<PreviousVersion>,
    pub dependencies: Vec<Dependency>,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Recipe {
    /// Build from a looked-up record and the archive checksum.
    ///
    /// Dependencies come from `Imports`, preceded by `Depends` when
    /// `include_depends` is set.
    pub fn from_record(record: &PackageRecord, sha256: String, include_depends: bool) -> Result<Self> {
        let mut dependencies = Vec::new();
        if include_depends {
            dependencies.extend(deps::parse_field(record.depends.as_deref())?);
        }
        dependencies.extend(deps::parse_field(record.imports.as_deref())?);

        Ok(Self {
            title: collapse_whitespace(&record.title),
            description: collapse_whitespace(&record.description),
            homepage: record.url.clone(),
            cran: record.name.clone(),
            version: record.version.clone(),
            sha256,
            previous_versions: Vec::new(),
            dependencies,
        })
    }

    /// Keep older `version()` lines; an entry for the current version is
    /// replaced by the freshly computed checksum.
    pub fn with_previous_versions(mut self, versions: Vec<PreviousVersion>) -> Self {
        self.previous_versions = versions
            .into_iter()
            .filter(|previous| previous.version != self.version)
            .collect();
        self
    }

    /// `R` followed by the capitalized alphanumeric runs of the name.
    pub fn class_name(&self) -> String {
        let mut class = String::from("R");
        for part in self.cran.split(|c: char| !c.is_ascii_alphanumeric()) {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                class.extend(first.to_uppercase());
                class.push_str(chars.as_str());
            }
        }
        class
    }

    fn body_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("\"\"\"{}", self.title),
            String::new(),
            self.description.clone(),
            "\"\"\"".to_string(),
            String::new(),
        ];
        if let Some(homepage) = &self.homepage {
            lines.push(format!("homepage = \"{}\"", homepage));
        }
        lines.push(format!("cran = \"{}\"", self.cran));
        lines.push(String::new());
        lines.push(format!(
            "version(\"{}\", sha256=\"{}\")",
            self.version, self.sha256
        ));
        lines.extend(self.previous_versions.iter().map(PreviousVersion::directive));
        lines.push(String::new());
        lines.extend(self.dependencies.iter().map(Dependency::directive));
        lines.push(String::new());
        lines
    }

    /// The paste-able recipe body.
    pub fn render_body(&self) -> String {
        let mut out = self.body_lines().join("\n");
        out.push('\n');
        out
    }

    /// A complete `package.py` with import and class statement.
    pub fn render_package(&self) -> String {
        let mut out = format!(
            "from spack.package import *\n\n\nclass {}(RPackage):\n",
            self.class_name()
        );
        for line in self.body_lines() {
            if !line.is_empty() {
                out.push_str(INDENT);
                out.push_str(&line);
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_body())
    }
}
