//! Parser for CRAN's `PACKAGES` index (Debian control file syntax)
//!
//! Records are separated by blank lines. Continuation lines start with
//! whitespace and are joined to the previous field with a single space.

use indexmap::IndexMap;

use crate::table::{Column, Table};
use crate::{Error, Result};

pub fn parse(text: &str) -> Result<Table> {
    let mut columns: IndexMap<String, Column> = IndexMap::new();
    let mut rows = 0usize;
    let mut record: IndexMap<String, String> = IndexMap::new();

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            flush(&mut columns, &mut rows, &mut record);
            continue;
        }

        if line.starts_with([' ', '\t']) {
            let Some((_, value)) = record.last_mut() else {
                return Err(Error::Dcf {
                    line: idx + 1,
                    message: "continuation line without a field".into(),
                });
            };
            let continued = line.trim();
            if continued != "." {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(continued);
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::Dcf {
                line: idx + 1,
                message: format!("expected `Field: value`, got {:?}", line),
            });
        };
        record.insert(key.trim().to_string(), value.trim().to_string());
    }
    flush(&mut columns, &mut rows, &mut record);

    Table::from_columns(columns)
}

fn flush(
    columns: &mut IndexMap<String, Column>,
    rows: &mut usize,
    record: &mut IndexMap<String, String>,
) {
    if record.is_empty() {
        return;
    }
    for (name, values) in columns.iter_mut() {
        values.push(record.shift_remove(name));
    }
    for (name, value) in record.drain(..) {
        let mut values = vec![None; *rows];
        values.push(Some(value));
        columns.insert(name, values);
    }
    *rows += 1;
}
