//! Decoder for R's serialization format (the payload of `.rds` files)
//!
//! Only the XDR (big-endian) encoding is handled, in serialization
//! versions 2 and 3. Language objects, closures and environments are walked
//! so the stream stays aligned, but their contents are not kept.

use std::io::{BufRead, BufReader, Read};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::debug;
use xz2::read::XzDecoder;

use crate::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

pub const SYMSXP: u8 = 1;
pub const LISTSXP: u8 = 2;
const CLOSXP: u8 = 3;
const ENVSXP: u8 = 4;
const PROMSXP: u8 = 5;
const LANGSXP: u8 = 6;
const SPECIALSXP: u8 = 7;
const BUILTINSXP: u8 = 8;
pub const CHARSXP: u8 = 9;
pub const LGLSXP: u8 = 10;
pub const INTSXP: u8 = 13;
pub const REALSXP: u8 = 14;
const CPLXSXP: u8 = 15;
pub const STRSXP: u8 = 16;
const DOTSXP: u8 = 17;
pub const VECSXP: u8 = 19;
const EXPRSXP: u8 = 20;
const EXTPTRSXP: u8 = 22;
const WEAKREFSXP: u8 = 23;
const RAWSXP: u8 = 24;
const S4SXP: u8 = 25;

const ALTREP_SXP: u8 = 238;
const BASEENV_SXP: u8 = 241;
const EMPTYENV_SXP: u8 = 242;
const PERSISTSXP: u8 = 247;
const PACKAGESXP: u8 = 248;
const NAMESPACESXP: u8 = 249;
const BASENAMESPACE_SXP: u8 = 250;
const MISSINGARG_SXP: u8 = 251;
const UNBOUNDVALUE_SXP: u8 = 252;
const GLOBALENV_SXP: u8 = 253;
pub const NILVALUE_SXP: u8 = 254;
pub const REFSXP: u8 = 255;

pub const IS_OBJECT: i32 = 1 << 8;
pub const HAS_ATTR: i32 = 1 << 9;
pub const HAS_TAG: i32 = 1 << 10;

const LATIN1_MASK: i32 = 1 << 2;
const NA_INTEGER: i32 = i32::MIN;

/// Compression wrapper around a serialization stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    /// Detect compression from the first bytes of a file.
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            return Compression::Gzip;
        }
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Compression::Bzip2;
        }
        if bytes.starts_with(&XZ_MAGIC) {
            return Compression::Xz;
        }
        Compression::None
    }

    fn wrap_reader<'a, R: Read + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new(reader)),
        }
    }
}

/// Whether `head` looks like the start of an RDS file.
pub fn looks_like_rds(head: &[u8]) -> bool {
    Compression::from_magic_bytes(head) != Compression::None
        || head.starts_with(b"X\n")
        || head.starts_with(b"A\n")
        || head.starts_with(b"B\n")
}

/// Payload of a decoded R object
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Logical(Vec<Option<bool>>),
    Integer(Vec<Option<i32>>),
    Real(Vec<f64>),
    Complex(Vec<(f64, f64)>),
    Character(Vec<Option<String>>),
    List(Vec<Sexp>),
    Raw(Vec<u8>),
    Symbol(String),
    Pairlist(Vec<(Option<String>, Sexp)>),
    Environment,
    /// Object that was skipped over; holds the SEXP type code
    Opaque(u8),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Logical(_) => "logical",
            Value::Integer(_) => "integer",
            Value::Real(_) => "double",
            Value::Complex(_) => "complex",
            Value::Character(_) => "character",
            Value::List(_) => "list",
            Value::Raw(_) => "raw",
            Value::Symbol(_) => "symbol",
            Value::Pairlist(_) => "pairlist",
            Value::Environment => "environment",
            Value::Opaque(_) => "language object",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Value::Null | Value::Environment | Value::Opaque(_) => 0,
            Value::Symbol(_) => 1,
            Value::Logical(v) => v.len(),
            Value::Integer(v) => v.len(),
            Value::Real(v) => v.len(),
            Value::Complex(v) => v.len(),
            Value::Character(v) => v.len(),
            Value::List(v) => v.len(),
            Value::Raw(v) => v.len(),
            Value::Pairlist(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded R object with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Sexp {
    pub value: Value,
    pub attributes: Vec<(String, Sexp)>,
}

impl Sexp {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            attributes: Vec::new(),
        }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn attribute(&self, name: &str) -> Option<&Sexp> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// The `names` attribute, when it is a character vector.
    pub fn names(&self) -> Option<&[Option<String>]> {
        match self.attribute("names").map(|n| &n.value) {
            Some(Value::Character(names)) => Some(names),
            _ => None,
        }
    }

    pub fn inherits(&self, class: &str) -> bool {
        match self.attribute("class").map(|c| &c.value) {
            Some(Value::Character(classes)) => classes.iter().flatten().any(|c| c == class),
            _ => false,
        }
    }

    fn into_attributes(self) -> Vec<(String, Sexp)> {
        match self.value {
            Value::Pairlist(items) => items
                .into_iter()
                .filter_map(|(tag, value)| tag.map(|tag| (tag, value)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Read an `.rds` stream, undoing any compression first.
pub fn read_rds<R: Read>(reader: R) -> Result<Sexp> {
    let mut reader = BufReader::new(reader);
    let compression = Compression::from_magic_bytes(reader.fill_buf()?);
    debug!("RDS compression: {:?}", compression);
    decode(compression.wrap_reader(reader))
}

/// Decode an uncompressed serialization stream.
pub fn decode<R: Read>(reader: R) -> Result<Sexp> {
    let mut decoder = Decoder {
        reader,
        refs: Vec::new(),
    };
    decoder.read_header()?;
    decoder.read_item()
}

struct Decoder<R> {
    reader: R,
    refs: Vec<Sexp>,
}

struct Flags {
    kind: u8,
    levels: i32,
    has_attr: bool,
    has_tag: bool,
    raw: i32,
}

impl Flags {
    fn unpack(raw: i32) -> Self {
        Self {
            kind: (raw & 0xFF) as u8,
            levels: raw >> 12,
            has_attr: raw & HAS_ATTR != 0,
            has_tag: raw & HAS_TAG != 0,
            raw,
        }
    }
}

fn is_pairlist_kind(kind: u8) -> bool {
    matches!(kind, LISTSXP | LANGSXP | CLOSXP | PROMSXP | DOTSXP)
}

impl<R: Read> Decoder<R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Decode("unexpected end of stream".into())
            } else {
                Error::Io(e)
            }
        })
    }

    fn read_int(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_double(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(len.min(1 << 20));
        (&mut self.reader).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(Error::Decode("unexpected end of stream".into()));
        }
        Ok(bytes)
    }

    fn read_length(&mut self) -> Result<usize> {
        match self.read_int()? {
            -1 => {
                let upper = self.read_int()? as u32 as u64;
                let lower = self.read_int()? as u32 as u64;
                usize::try_from((upper << 32) | lower)
                    .map_err(|_| Error::Decode("vector length overflows usize".into()))
            }
            len if len < 0 => Err(Error::Decode(format!("negative vector length {}", len))),
            len => Ok(len as usize),
        }
    }

    fn read_header(&mut self) -> Result<()> {
        let mut format = [0u8; 2];
        self.fill(&mut format)?;
        match &format {
            b"X\n" => {}
            b"A\n" => return Err(Error::UnsupportedFormat("ASCII serialization".into())),
            b"B\n" => return Err(Error::UnsupportedFormat("native binary serialization".into())),
            b"RD" => return Err(Error::UnsupportedFormat("RData workspace, not an RDS file".into())),
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "unknown header {:02x}{:02x}",
                    other[0], other[1]
                )))
            }
        }

        let version = self.read_int()?;
        let writer = self.read_int()?;
        let _min_reader = self.read_int()?;
        debug!(
            "Serialization version {} written by R {}.{}.{}",
            version,
            writer >> 16,
            (writer >> 8) & 0xFF,
            writer & 0xFF
        );

        match version {
            2 => Ok(()),
            3 => {
                let len = self.read_int()?;
                if len < 0 {
                    return Err(Error::Decode("negative native encoding length".into()));
                }
                self.read_bytes(len as usize)?;
                Ok(())
            }
            other => Err(Error::UnsupportedFormat(format!(
                "serialization version {}",
                other
            ))),
        }
    }

    fn read_item(&mut self) -> Result<Sexp> {
        let flags = self.read_int()?;
        self.read_item_with(Flags::unpack(flags))
    }

    fn read_item_with(&mut self, flags: Flags) -> Result<Sexp> {
        let kind = flags.kind;
        match kind {
            NILVALUE_SXP => return Ok(Sexp::null()),
            EMPTYENV_SXP | BASEENV_SXP | GLOBALENV_SXP | BASENAMESPACE_SXP => {
                return Ok(Sexp::new(Value::Environment))
            }
            UNBOUNDVALUE_SXP | MISSINGARG_SXP => return Ok(Sexp::new(Value::Opaque(flags.kind))),
            REFSXP => {
                let index = match flags.raw >> 8 {
                    0 => self.read_int()?,
                    i => i,
                };
                return usize::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| self.refs.get(i))
                    .cloned()
                    .ok_or_else(|| Error::Decode(format!("dangling reference {}", index)));
            }
            PERSISTSXP => {
                self.read_string_vec()?;
                let sexp = Sexp::new(Value::Opaque(PERSISTSXP));
                self.refs.push(sexp.clone());
                return Ok(sexp);
            }
            SYMSXP => {
                let name = self.read_item()?;
                let name = match name.value {
                    Value::Character(mut v) if v.len() == 1 => v.pop().flatten().unwrap_or_default(),
                    other => {
                        return Err(Error::Decode(format!(
                            "symbol name is a {}",
                            other.type_name()
                        )))
                    }
                };
                let sexp = Sexp::new(Value::Symbol(name));
                self.refs.push(sexp.clone());
                return Ok(sexp);
            }
            PACKAGESXP | NAMESPACESXP => {
                self.read_string_vec()?;
                let sexp = Sexp::new(Value::Environment);
                self.refs.push(sexp.clone());
                return Ok(sexp);
            }
            ENVSXP => {
                let _locked = self.read_int()?;
                let sexp = Sexp::new(Value::Environment);
                self.refs.push(sexp.clone());
                // enclosure, frame, hash table, attributes
                for _ in 0..4 {
                    self.read_item()?;
                }
                return Ok(sexp);
            }
            _ if is_pairlist_kind(kind) => return self.read_pairlist(flags),
            ALTREP_SXP => return self.read_altrep(),
            _ => {}
        }

        let value = match kind {
            SPECIALSXP | BUILTINSXP => {
                let len = self.read_int()?.max(0) as usize;
                self.read_bytes(len)?;
                Value::Opaque(flags.kind)
            }
            EXTPTRSXP => {
                self.refs.push(Sexp::new(Value::Opaque(EXTPTRSXP)));
                // protected value, tag
                self.read_item()?;
                self.read_item()?;
                Value::Opaque(EXTPTRSXP)
            }
            WEAKREFSXP => {
                self.refs.push(Sexp::new(Value::Opaque(WEAKREFSXP)));
                Value::Opaque(WEAKREFSXP)
            }
            CHARSXP => Value::Character(vec![self.read_char(flags.levels)?]),
            LGLSXP => {
                let len = self.read_length()?;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    values.push(match self.read_int()? {
                        NA_INTEGER => None,
                        0 => Some(false),
                        _ => Some(true),
                    });
                }
                Value::Logical(values)
            }
            INTSXP => {
                let len = self.read_length()?;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    values.push(Some(self.read_int()?).filter(|v| *v != NA_INTEGER));
                }
                Value::Integer(values)
            }
            REALSXP => {
                let len = self.read_length()?;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    values.push(self.read_double()?);
                }
                Value::Real(values)
            }
            CPLXSXP => {
                let len = self.read_length()?;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    values.push((self.read_double()?, self.read_double()?));
                }
                Value::Complex(values)
            }
            STRSXP => {
                let len = self.read_length()?;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    let element = Flags::unpack(self.read_int()?);
                    if element.kind != CHARSXP {
                        return Err(Error::Decode(format!(
                            "character vector element has type {}",
                            element.kind
                        )));
                    }
                    values.push(self.read_char(element.levels)?);
                }
                Value::Character(values)
            }
            VECSXP | EXPRSXP => {
                let len = self.read_length()?;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    values.push(self.read_item()?);
                }
                Value::List(values)
            }
            RAWSXP => {
                let len = self.read_length()?;
                Value::Raw(self.read_bytes(len)?)
            }
            S4SXP => Value::Opaque(S4SXP),
            other => {
                return Err(Error::Decode(format!(
                    "unsupported SEXP type {}",
                    other
                )))
            }
        };

        let attributes = if flags.has_attr {
            self.read_item()?.into_attributes()
        } else {
            Vec::new()
        };

        Ok(Sexp { value, attributes })
    }

    fn read_char(&mut self, levels: i32) -> Result<Option<String>> {
        let len = self.read_int()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(Error::Decode(format!("negative string length {}", len)));
        }
        let bytes = self.read_bytes(len as usize)?;
        if levels & LATIN1_MASK != 0 {
            return Ok(Some(bytes.iter().map(|&b| b as char).collect()));
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_string_vec(&mut self) -> Result<Vec<Option<String>>> {
        if self.read_int()? != 0 {
            return Err(Error::Decode("names in persistent strings are not supported".into()));
        }
        let len = self.read_length()?;
        let mut values = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            match self.read_item()?.value {
                Value::Character(mut v) if v.len() == 1 => values.push(v.pop().flatten()),
                other => {
                    return Err(Error::Decode(format!(
                        "string vector element is a {}",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(values)
    }

    /// Read a chain of cons cells iteratively.
    fn read_pairlist(&mut self, head: Flags) -> Result<Sexp> {
        let head_kind = head.kind;
        let mut attributes = Vec::new();
        let mut items = Vec::new();
        let mut flags = head;

        loop {
            if flags.has_attr {
                let attr = self.read_item()?.into_attributes();
                if items.is_empty() {
                    attributes = attr;
                }
            }
            let tag = if flags.has_tag {
                match self.read_item()?.value {
                    Value::Symbol(name) => Some(name),
                    _ => None,
                }
            } else {
                None
            };
            let car = self.read_item()?;
            items.push((tag, car));

            let next = Flags::unpack(self.read_int()?);
            if next.kind == NILVALUE_SXP {
                break;
            }
            if is_pairlist_kind(next.kind) {
                flags = next;
                continue;
            }
            // dotted tail
            let tail = self.read_item_with(next)?;
            items.push((None, tail));
            break;
        }

        let value = if head_kind == LISTSXP {
            Value::Pairlist(items)
        } else {
            Value::Opaque(head_kind)
        };
        Ok(Sexp { value, attributes })
    }

    fn read_altrep(&mut self) -> Result<Sexp> {
        let info = self.read_item()?;
        let state = self.read_item()?;
        let attributes = self.read_item()?.into_attributes();

        let class = match &info.value {
            Value::Pairlist(items) => match items.first().map(|(_, s)| &s.value) {
                Some(Value::Symbol(name)) => name.clone(),
                _ => String::new(),
            },
            _ => String::new(),
        };

        let value = expand_altrep(&class, state)?;
        Ok(Sexp { value, attributes })
    }
}

fn expand_altrep(class: &str, state: Sexp) -> Result<Value> {
    match class {
        "compact_intseq" => {
            let (len, start, step) = seq_state(&state)?;
            Ok(Value::Integer(
                (0..len).map(|i| Some((start + step * i as f64) as i32)).collect(),
            ))
        }
        "compact_realseq" => {
            let (len, start, step) = seq_state(&state)?;
            Ok(Value::Real((0..len).map(|i| start + step * i as f64).collect()))
        }
        "deferred_string" => {
            let arg = first_cell(state)?;
            Ok(Value::Character(match arg.value {
                Value::Integer(v) => v.into_iter().map(|x| x.map(|x| x.to_string())).collect(),
                Value::Real(v) => v
                    .into_iter()
                    .map(|x| (!x.is_nan()).then(|| format_real(x)))
                    .collect(),
                Value::Character(v) => v,
                other => {
                    return Err(Error::Decode(format!(
                        "deferred_string over a {}",
                        other.type_name()
                    )))
                }
            }))
        }
        wrapper if wrapper.starts_with("wrap_") => Ok(first_cell(state)?.value),
        other => Err(Error::Decode(format!("unsupported ALTREP class '{}'", other))),
    }
}

fn seq_state(state: &Sexp) -> Result<(usize, f64, f64)> {
    match &state.value {
        Value::Real(v) if v.len() == 3 && v[0] >= 0.0 => Ok((v[0] as usize, v[1], v[2])),
        other => Err(Error::Decode(format!(
            "compact sequence state is a {}",
            other.type_name()
        ))),
    }
}

fn first_cell(state: Sexp) -> Result<Sexp> {
    match state.value {
        Value::Pairlist(items) => items
            .into_iter()
            .next()
            .map(|(_, s)| s)
            .ok_or_else(|| Error::Decode("empty ALTREP state".into())),
        Value::List(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| Error::Decode("empty ALTREP state".into())),
        other => Err(Error::Decode(format!(
            "ALTREP state is a {}",
            other.type_name()
        ))),
    }
}

/// Render a double the way it reads in a DESCRIPTION file.
pub fn format_real(x: f64) -> String {
    if x.is_infinite() {
        return if x > 0.0 { "Inf".into() } else { "-Inf".into() };
    }
    if x.fract() == 0.0 && x.abs() < 1e15 {
        return format!("{}", x as i64);
    }
    format!("{}", x)
}
