//! Bind validation and normalization

use super::{args::{BindDescriptor, Slot}, policy::{self, Materialization}};
use crate::{Config, Error, Lob, LobSource, Result, Value, err::NJS_BUFFER_TOO_SMALL, types::{Direction, LobKind, SqlType}};

/// Validated bind data
#[derive(Debug)]
pub(crate) enum Payload {
    Null,
    Number(f64),
    Text(String),
    Binary(Vec<u8>),
    Lob(Lob),
    /// Content for a new temporary LOB
    Source(LobSource),
}

impl Payload {
    fn len(&self) -> Option<usize> {
        match self {
            Payload::Text(txt)  => Some(txt.len()),
            Payload::Binary(bin) => Some(bin.len()),
            _ => None,
        }
    }
}

/**
    A validated bind ready for submission.

    It carries the effective size bound of the inline value and the materialization
    mode decided for it.
*/
#[derive(Debug)]
pub struct NormalizedBind {
    slot: Slot,
    sql_type: SqlType,
    dir: Direction,
    pub(crate) payload: Payload,
    size_bound: Option<usize>,
    mode: Materialization,
}

impl NormalizedBind {
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn dir(&self) -> Direction {
        self.dir
    }

    /**
        Returns the effective size bound of the inline value. It is the declared
        `max_size`, or for IN OUT binds without one, the length of the IN value.
        `None` means unbounded.
    */
    pub fn size_bound(&self) -> Option<usize> {
        self.size_bound
    }

    pub fn mode(&self) -> Materialization {
        self.mode
    }

    /// Returns `true` if the bind carries no payload, i.e. it is sent as SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self.payload, Payload::Null)
    }

    /// LOB kind of a streamed bind.
    pub(crate) fn lob_kind(&self) -> Option<LobKind> {
        match self.sql_type {
            SqlType::String | SqlType::Clob => Some(LobKind::Clob),
            SqlType::Buffer | SqlType::Blob => Some(LobKind::Blob),
            SqlType::Number => None,
        }
    }
}

fn lob_matches(lob: &Lob, sql_type: SqlType) -> bool {
    match lob.kind() {
        LobKind::Clob => matches!(sql_type, SqlType::String | SqlType::Clob),
        LobKind::Blob => matches!(sql_type, SqlType::Buffer | SqlType::Blob),
    }
}

fn mismatch(slot: &Slot, sql_type: SqlType, value: &Value) -> Error {
    tracing::debug!(%slot, %sql_type, value = value.kind_name(), "bind value does not match its type");
    Error::bind_type_mismatch(slot)
}

fn to_payload(slot: &Slot, sql_type: SqlType, value: Value) -> Result<Payload> {
    if let Value::Object(_) = value {
        return Err( Error::invalid_bind_type(slot) );
    }
    if value.is_nullish() {
        return Ok( Payload::Null );
    }
    match (sql_type, value) {
        (SqlType::Number, Value::Number(num)) => Ok( Payload::Number(num) ),
        (SqlType::String, Value::Str(txt)) | (SqlType::Clob, Value::Str(txt)) => Ok( Payload::Text(txt) ),
        (SqlType::Buffer, Value::Bytes(bin)) | (SqlType::Blob, Value::Bytes(bin)) => Ok( Payload::Binary(bin) ),
        (SqlType::Number, value) => Err( mismatch(slot, sql_type, &value) ),
        (_, Value::Lob(lob)) if lob_matches(&lob, sql_type) => Ok( Payload::Lob(lob) ),
        (_, Value::Source(src)) => Ok( Payload::Source(src) ),
        (_, value) => Err( mismatch(slot, sql_type, &value) ),
    }
}

/**
    Validates a bind specification and resolves it into a normalized bind.

    Validation never performs I/O. It fails with:
    - `NJS-011` when the value's primitive kind (number, `NaN`, boolean, string vs bytes)
      does not match the declared type,
    - `NJS-012` when the value is an object that cannot be coerced into anything,
    - `NJS-016` when an IN value is longer than the declared `max_size` or than the
      configured inline maximum.

    `null`, an absent value, and an empty string or buffer are bound as SQL NULL.
    The value of an OUT bind is ignored.

    # Example

    ```
    use lobbind::{BindDescriptor, Config, ErrorKind, Materialization, Slot, SqlType, validate_and_normalize};

    let cfg = Config::default();
    let bind = validate_and_normalize(Slot::Position(0), BindDescriptor::new("x".repeat(65535), SqlType::String), &cfg)?;
    assert_eq!(bind.mode(), Materialization::Inline { limit: None });

    let res = validate_and_normalize(Slot::Position(0), BindDescriptor::new(0, SqlType::String), &cfg);
    assert_eq!(res.unwrap_err().kind(), ErrorKind::BindTypeMismatch);
    # Ok::<(),lobbind::Error>(())
    ```
*/
pub fn validate_and_normalize(slot: Slot, desc: BindDescriptor, cfg: &Config) -> Result<NormalizedBind> {
    let sql_type = desc.sql_type();
    let dir = desc.dir();
    let max_size = desc.max_size();
    let payload = if dir.is_in() {
        to_payload(&slot, sql_type, desc.value)?
    } else {
        Payload::Null
    };
    if let Some(len) = payload.len() {
        if max_size.map_or(false, |max_size| len > max_size) {
            return Err( Error::buffer_too_small() );
        }
        if sql_type.is_scalar() && len > cfg.max_inline_size() {
            return Err( Error::driver(NJS_BUFFER_TOO_SMALL, format_args!("value of parameter {} exceeds the maximum inline size of {} bytes", slot, cfg.max_inline_size())) );
        }
    }
    let size_bound = match dir {
        Direction::InOut if max_size.is_none() => Some(payload.len().unwrap_or(0)),
        _ => max_size,
    };
    let mode = policy::decide(sql_type, &payload, size_bound);
    tracing::trace!(%slot, %sql_type, ?dir, ?size_bound, ?mode, "bind normalized");
    Ok(NormalizedBind { slot, sql_type, dir, payload, size_bound, mode })
}
