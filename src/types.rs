//! Bind data types, directions and values

use crate::lob::Lob;
use std::{fmt, io::Read};

/// Declared type of a bind parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// Character data bound inline as a string
    String,
    /// Binary data bound inline as a byte buffer
    Buffer,
    /// Character large object, always bound as a locator stream
    Clob,
    /// Binary large object, always bound as a locator stream
    Blob,
    Number,
}

impl SqlType {
    /// Returns `true` for the inline scalar types - STRING and BUFFER.
    pub fn is_scalar(self) -> bool {
        matches!(self, SqlType::String | SqlType::Buffer)
    }

    /// Returns the LOB kind of CLOB and BLOB types.
    pub fn lob_kind(self) -> Option<LobKind> {
        match self {
            SqlType::Clob => Some(LobKind::Clob),
            SqlType::Blob => Some(LobKind::Blob),
            _             => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SqlType::String => "STRING",
            SqlType::Buffer => "BUFFER",
            SqlType::Clob   => "CLOB",
            SqlType::Blob   => "BLOB",
            SqlType::Number => "NUMBER",
        };
        f.write_str(name)
    }
}

/// Bind direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// client to server
    In,
    /// server to client
    Out,
    /// both ways
    InOut,
}

impl Direction {
    /// Returns `true` if the bind sends data to the server.
    pub fn is_in(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    /// Returns `true` if the bind receives data from the server.
    pub fn is_out(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// Kind of a large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    Clob,
    Blob,
}

impl LobKind {
    /// Returns the SQL type under which a locator of this kind is bound.
    pub fn sql_type(self) -> SqlType {
        match self {
            LobKind::Clob => SqlType::Clob,
            LobKind::Blob => SqlType::Blob,
        }
    }
}

/// Character encoding a CLOB reader can decode chunks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
}

/**
    A byte or character source that feeds an IN CLOB or BLOB bind.

    The source is piped into a temporary LOB before the statement is executed.
*/
pub struct LobSource(pub(crate) Box<dyn Read + Send>);

impl LobSource {
    pub fn new(src: impl Read + Send + 'static) -> Self {
        Self(Box::new(src))
    }
}

impl fmt::Debug for LobSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("LobSource")
    }
}

/**
    Runtime value of a bind argument.

    This mirrors what a caller can hand to the driver, including values that
    are not valid for the declared type. Validation decides what to do with
    them (see [`BindDescriptor`](crate::BindDescriptor)).
*/
#[derive(Debug)]
pub enum Value {
    Null,
    /// The value was not provided at all
    Undefined,
    Str(String),
    Bytes(Vec<u8>),
    Number(f64),
    Bool(bool),
    /// Locator backed LOB, i.e. a LOB fetched earlier
    Lob(Lob),
    /// Data source for a new LOB
    Source(LobSource),
    /// An arbitrary object, which cannot be coerced into anything
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Creates a source value from any reader, i.e. an open file.
    pub fn source(src: impl Read + Send + 'static) -> Self {
        Value::Source(LobSource::new(src))
    }

    /// Returns `true` for the values that are bound as SQL NULL when sent to the server.
    pub(crate) fn is_nullish(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => true,
            Value::Str(txt)                => txt.is_empty(),
            Value::Bytes(bin)              => bin.is_empty(),
            _                              => false,
        }
    }

    /// Name of the value kind for diagnostics
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Null      => "null",
            Value::Undefined => "undefined",
            Value::Str(_)    => "string",
            Value::Bytes(_)  => "bytes",
            Value::Number(_) => "number",
            Value::Bool(_)   => "boolean",
            Value::Lob(_)    => "lob",
            Value::Source(_) => "source",
            Value::Object(_) => "object",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

macro_rules! impl_value_from_num {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(val: $t) -> Self {
                    Value::Number(val as f64)
                }
            }
        )+
    };
}

impl_value_from_num!{ i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64 }

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::Str(val.to_owned())
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::Str(val)
    }
}

impl From<&[u8]> for Value {
    fn from(val: &[u8]) -> Self {
        Value::Bytes(val.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Value::Bytes(val)
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Bool(val)
    }
}

impl From<Lob> for Value {
    fn from(val: Lob) -> Self {
        Value::Lob(val)
    }
}

impl From<LobSource> for Value {
    fn from(val: LobSource) -> Self {
        Value::Source(val)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        val.map(Into::into).unwrap_or(Value::Null)
    }
}
