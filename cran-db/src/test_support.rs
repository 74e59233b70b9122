//! XDR serialization writer for building RDS fixtures in tests

use crate::rds::{
    CHARSXP, HAS_ATTR, HAS_TAG, INTSXP, IS_OBJECT, LISTSXP, NILVALUE_SXP, REALSXP, STRSXP,
    SYMSXP, VECSXP,
};

const UTF8_MASK: i32 = 1 << 3;
const NA_INTEGER: i32 = i32::MIN;

pub(crate) struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new(version: i32) -> Self {
        let mut w = Self {
            buf: b"X\n".to_vec(),
        };
        w.int(version);
        // written by R 4.3.0
        w.int(0x04_03_00);
        if version == 3 {
            w.int(0x03_05_00);
            w.int(5);
            w.bytes(b"UTF-8");
        } else {
            w.int(0x02_03_00);
        }
        w
    }

    pub fn int(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn flags(&mut self, kind: u8, levels: i32, is_obj: bool, has_attr: bool, has_tag: bool) {
        let mut flags = kind as i32 | (levels << 12);
        if is_obj {
            flags |= IS_OBJECT;
        }
        if has_attr {
            flags |= HAS_ATTR;
        }
        if has_tag {
            flags |= HAS_TAG;
        }
        self.int(flags);
    }

    pub fn nil(&mut self) {
        self.int(NILVALUE_SXP as i32);
    }

    pub fn charsxp(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.flags(CHARSXP, UTF8_MASK, false, false, false);
                self.int(s.len() as i32);
                self.bytes(s.as_bytes());
            }
            None => {
                self.flags(CHARSXP, 0, false, false, false);
                self.int(-1);
            }
        }
    }

    pub fn symbol(&mut self, name: &str) {
        self.int(SYMSXP as i32);
        self.charsxp(Some(name));
    }

    pub fn strsxp(&mut self, values: &[Option<&str>], has_attr: bool) {
        self.flags(STRSXP, 0, false, has_attr, false);
        self.int(values.len() as i32);
        for value in values {
            self.charsxp(*value);
        }
    }

    pub fn intsxp(&mut self, values: &[i32], has_attr: bool) {
        self.flags(INTSXP, 0, false, has_attr, false);
        self.int(values.len() as i32);
        for value in values {
            self.int(*value);
        }
    }

    pub fn realsxp(&mut self, values: &[f64]) {
        self.flags(REALSXP, 0, false, false, false);
        self.int(values.len() as i32);
        for value in values {
            self.bytes(&value.to_be_bytes());
        }
    }

    /// Start a tagged attribute cell; the value must follow.
    pub fn attr(&mut self, name: &str) {
        self.flags(LISTSXP, 0, false, false, true);
        self.symbol(name);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// A `data.frame` of character columns.
pub(crate) fn data_frame(columns: &[(&str, Vec<Option<&str>>)]) -> Vec<u8> {
    let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
    let mut w = XdrWriter::new(3);
    w.flags(VECSXP, 0, true, true, false);
    w.int(columns.len() as i32);
    for (_, values) in columns {
        w.strsxp(values, false);
    }
    w.attr("names");
    let names: Vec<Option<&str>> = columns.iter().map(|(name, _)| Some(*name)).collect();
    w.strsxp(&names, false);
    w.attr("class");
    w.strsxp(&[Some("data.frame")], false);
    w.attr("row.names");
    w.intsxp(&[NA_INTEGER, -(rows as i32)], false);
    w.nil();
    w.finish()
}

/// A character matrix with column names, given row by row.
pub(crate) fn character_matrix(colnames: &[&str], rows: &[Vec<Option<&str>>]) -> Vec<u8> {
    let mut values = Vec::new();
    for col in 0..colnames.len() {
        for row in rows {
            values.push(row[col]);
        }
    }
    let mut w = XdrWriter::new(2);
    w.strsxp(&values, true);
    w.attr("dim");
    w.intsxp(&[rows.len() as i32, colnames.len() as i32], false);
    w.attr("dimnames");
    w.flags(VECSXP, 0, false, false, false);
    w.int(2);
    w.nil();
    let names: Vec<Option<&str>> = colnames.iter().map(|c| Some(*c)).collect();
    w.strsxp(&names, false);
    w.nil();
    w.finish()
}
