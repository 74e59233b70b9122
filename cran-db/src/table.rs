//! Column-oriented in-memory table
//!
//! Every cell is text; `None` marks R's `NA` or a field a record did not
//! carry.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::rds::{self, format_real, Sexp, Value};
use crate::{dcf, Error, Result};

pub type Column = Vec<Option<String>>;

/// On-disk layout of the package database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseFormat {
    /// Sniff the first bytes of the file
    #[default]
    Auto,
    /// R serialization, as in `packages.rds`
    Rds,
    /// Debian control format, as in `PACKAGES`
    Dcf,
}

impl FromStr for DatabaseFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DatabaseFormat::Auto),
            "rds" => Ok(DatabaseFormat::Rds),
            "dcf" | "packages" => Ok(DatabaseFormat::Dcf),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl DatabaseFormat {
    pub fn detect(head: &[u8]) -> Self {
        if rds::looks_like_rds(head) {
            DatabaseFormat::Rds
        } else {
            DatabaseFormat::Dcf
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: IndexMap<String, Column>,
    rows: usize,
}

impl Table {
    /// Build a table, checking that all columns share one length.
    pub fn from_columns<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Column)>,
    {
        let mut table = Table::default();
        for (name, values) in columns {
            if table.columns.is_empty() {
                table.rows = values.len();
            } else if values.len() != table.rows {
                return Err(Error::NotATable(format!(
                    "column {} has {} rows, expected {}",
                    name,
                    values.len(),
                    table.rows
                )));
            }
            table.columns.insert(name, values);
        }
        Ok(table)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<String>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Value at `row` in `column`; `None` for a missing column, NA or out of range.
    pub fn cell(&self, column: &str, row: usize) -> Option<&str> {
        self.columns
            .get(column)
            .and_then(|values| values.get(row))
            .and_then(|value| value.as_deref())
    }

    /// Indices of rows whose `column` equals `value`, in table order.
    pub fn rows_matching(&self, column: &str, value: &str) -> Vec<usize> {
        self.column(column)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_deref() == Some(value))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read a database file from disk.
    pub fn load<P: AsRef<Path>>(path: P, format: DatabaseFormat) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let format = match format {
            DatabaseFormat::Auto => DatabaseFormat::detect(reader.fill_buf()?),
            other => other,
        };
        info!("Loading {:?} database from {:?}", format, path);

        let table = match format {
            DatabaseFormat::Rds => Table::from_sexp(&rds::read_rds(reader)?)?,
            _ => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                dcf::parse(&String::from_utf8_lossy(&bytes))?
            }
        };

        debug!(
            "Loaded {} rows x {} columns",
            table.rows,
            table.columns.len()
        );
        Ok(table)
    }

    /// Convert a decoded data frame, named list or character matrix.
    pub fn from_sexp(sexp: &Sexp) -> Result<Self> {
        if sexp.attribute("dim").is_some() {
            return Self::from_matrix(sexp);
        }

        let Value::List(columns) = &sexp.value else {
            return Err(Error::NotATable(format!(
                "top-level object is a {}",
                sexp.value.type_name()
            )));
        };
        let names = sexp
            .names()
            .ok_or_else(|| Error::NotATable("list without names".into()))?;
        if names.len() != columns.len() {
            return Err(Error::NotATable("names do not match columns".into()));
        }

        let mut converted = Vec::with_capacity(columns.len());
        for (name, column) in names.iter().zip(columns) {
            let name = name.clone().unwrap_or_default();
            let values = column_values(column)
                .map_err(|e| Error::NotATable(format!("column {}: {}", name, e)))?;
            converted.push((name, values));
        }
        Self::from_columns(converted)
    }

    fn from_matrix(sexp: &Sexp) -> Result<Self> {
        let (rows, cols) = match sexp.attribute("dim").map(|d| &d.value) {
            Some(Value::Integer(dim)) if dim.len() == 2 => match (dim[0], dim[1]) {
                (Some(r), Some(c)) if r >= 0 && c >= 0 => (r as usize, c as usize),
                _ => return Err(Error::NotATable("invalid matrix dimensions".into())),
            },
            _ => return Err(Error::NotATable("only two-dimensional arrays are tables".into())),
        };

        let colnames = match sexp.attribute("dimnames").map(|d| &d.value) {
            Some(Value::List(dimnames)) if dimnames.len() == 2 => match &dimnames[1].value {
                Value::Character(names) if names.len() == cols => names.clone(),
                _ => return Err(Error::NotATable("matrix has no column names".into())),
            },
            _ => return Err(Error::NotATable("matrix has no dimnames".into())),
        };

        let cells = column_values(sexp)?;
        if cells.len() != rows * cols {
            return Err(Error::NotATable(format!(
                "matrix holds {} cells, expected {}",
                cells.len(),
                rows * cols
            )));
        }

        let mut cells = cells.into_iter();
        let columns = colnames.into_iter().map(|name| {
            (
                name.unwrap_or_default(),
                cells.by_ref().take(rows).collect::<Column>(),
            )
        });
        Self::from_columns(columns.collect::<Vec<_>>())
    }
}

/// Render an atomic vector as text cells; factors resolve to their labels.
fn column_values(column: &Sexp) -> Result<Column> {
    match &column.value {
        Value::Character(values) => Ok(values.clone()),
        Value::Integer(codes) => match column.attribute("levels").map(|l| &l.value) {
            Some(Value::Character(levels)) => Ok(codes
                .iter()
                .map(|code| {
                    code.and_then(|c| usize::try_from(c - 1).ok())
                        .and_then(|i| levels.get(i).cloned().flatten())
                })
                .collect()),
            _ => Ok(codes.iter().map(|v| v.map(|v| v.to_string())).collect()),
        },
        Value::Real(values) => Ok(values
            .iter()
            .map(|v| (!v.is_nan()).then(|| format_real(*v)))
            .collect()),
        Value::Logical(values) => Ok(values
            .iter()
            .map(|v| v.map(|b| (if b { "TRUE" } else { "FALSE" }).to_string()))
            .collect()),
        other => Err(Error::NotATable(format!(
            "{} column is not atomic",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{character_matrix, data_frame};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_data_frame() {
        let bytes = data_frame(&[
            ("Package", vec![Some("R6"), Some("cli")]),
            ("Version", vec![Some("2.5.1"), Some("3.6.3")]),
            ("URL", vec![None, Some("https://cli.r-lib.org")]),
        ]);
        let sexp = rds::decode(bytes.as_slice()).unwrap();
        assert!(sexp.inherits("data.frame"));
        let table = Table::from_sexp(&sexp).unwrap();

        assert_eq!(table.rows(), 2);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["Package", "Version", "URL"]
        );
        assert_eq!(table.cell("Version", 1), Some("3.6.3"));
        assert_eq!(table.cell("URL", 0), None);
        assert_eq!(table.cell("Missing", 0), None);
    }

    #[test]
    fn test_from_character_matrix() {
        let bytes = character_matrix(
            &["Package", "Version"],
            &[
                vec![Some("R6"), Some("2.5.1")],
                vec![Some("cli"), Some("3.6.3")],
                vec![Some("rlang"), None],
            ],
        );
        let table = Table::from_sexp(&rds::decode(bytes.as_slice()).unwrap()).unwrap();

        assert_eq!(table.rows(), 3);
        assert_eq!(table.cell("Package", 2), Some("rlang"));
        assert_eq!(table.cell("Version", 1), Some("3.6.3"));
        assert_eq!(table.cell("Version", 2), None);
    }

    #[test]
    fn test_factor_column() {
        let mut column = Sexp::new(Value::Integer(vec![Some(2), None, Some(1)]));
        column.attributes.push((
            "levels".into(),
            Sexp::new(Value::Character(vec![Some("a".into()), Some("b".into())])),
        ));
        assert_eq!(
            column_values(&column).unwrap(),
            vec![Some("b".to_string()), None, Some("a".to_string())]
        );
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let err = Table::from_columns(vec![
            ("a".to_string(), vec![Some("1".to_string())]),
            ("b".to_string(), vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::NotATable(_)));
    }

    #[test]
    fn test_rows_matching_keeps_duplicates() {
        let table = Table::from_columns(vec![(
            "Package".to_string(),
            vec![Some("a".into()), Some("b".into()), Some("a".into())],
        )])
        .unwrap();
        assert_eq!(table.rows_matching("Package", "a"), vec![0, 2]);
        assert!(table.rows_matching("Package", "z").is_empty());
        assert!(table.rows_matching("Other", "a").is_empty());
    }

    #[test]
    fn test_load_detects_format() {
        let mut rds_file = NamedTempFile::new().unwrap();
        rds_file
            .write_all(&data_frame(&[("Package", vec![Some("R6")])]))
            .unwrap();
        let table = Table::load(rds_file.path(), DatabaseFormat::Auto).unwrap();
        assert_eq!(table.cell("Package", 0), Some("R6"));

        let mut dcf_file = NamedTempFile::new().unwrap();
        dcf_file.write_all(b"Package: cli\nVersion: 3.6.3\n").unwrap();
        let table = Table::load(dcf_file.path(), DatabaseFormat::Auto).unwrap();
        assert_eq!(table.cell("Version", 0), Some("3.6.3"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("RDS".parse::<DatabaseFormat>().unwrap(), DatabaseFormat::Rds);
        assert_eq!("packages".parse::<DatabaseFormat>().unwrap(), DatabaseFormat::Dcf);
        assert!("yaml".parse::<DatabaseFormat>().is_err());
    }
}
