//! Package record lookup

use tracing::{debug, warn};

use crate::table::Table;
use crate::{Error, Result};

pub const PACKAGE: &str = "Package";
pub const TITLE: &str = "Title";
pub const DESCRIPTION: &str = "Description";
pub const VERSION: &str = "Version";
pub const URL: &str = "URL";
pub const IMPORTS: &str = "Imports";
pub const DEPENDS: &str = "Depends";

/// One row of the package database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub title: String,
    pub description: String,
    pub version: String,
    pub url: Option<String>,
    /// Raw `Imports` field
    pub imports: Option<String>,
    /// Raw `Depends` field
    pub depends: Option<String>,
}

impl PackageRecord {
    /// Find `name` in the `Package` column.
    ///
    /// When several rows carry the same name the first one wins.
    pub fn lookup(table: &Table, name: &str) -> Result<Self> {
        if table.column(PACKAGE).is_none() {
            return Err(Error::MissingField {
                package: name.to_string(),
                field: PACKAGE.to_string(),
            });
        }

        let rows = table.rows_matching(PACKAGE, name);
        let row = match rows.as_slice() {
            [] => return Err(Error::PackageNotFound(name.to_string())),
            [row] => *row,
            [first, ..] => {
                warn!(
                    "{} rows match package {}, using row {}",
                    rows.len(),
                    name,
                    first
                );
                *first
            }
        };
        debug!("Package {} found at row {}", name, row);

        let required = |field: &str| {
            table
                .cell(field, row)
                .map(str::to_string)
                .ok_or_else(|| Error::MissingField {
                    package: name.to_string(),
                    field: field.to_string(),
                })
        };
        let optional = |field: &str| {
            table
                .cell(field, row)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            name: name.to_string(),
            title: required(TITLE)?,
            description: required(DESCRIPTION)?,
            version: required(VERSION)?,
            url: optional(URL),
            imports: optional(IMPORTS),
            depends: optional(DEPENDS),
        })
    }
}
