//! Inline versus stream materialization of binds and their results

use super::{bind::{NormalizedBind, Payload}, exec::OutValue};
use crate::{Error, Result, err::ORA_INCONSISTENT_TYPES, types::{Direction, LobKind, SqlType}};

/// Representation of a bind value on one side of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialization {
    /// A scalar transferred with the call, limited to `limit` bytes when the limit is known
    Inline { limit: Option<usize> },
    /// A locator backed LOB stream
    Stream,
}

/// Decides how an IN value is submitted.
pub(crate) fn decide(sql_type: SqlType, payload: &Payload, size_bound: Option<usize>) -> Materialization {
    match (sql_type, payload) {
        (SqlType::Clob, _) | (SqlType::Blob, _) => Materialization::Stream,
        (_, Payload::Lob(_)) | (_, Payload::Source(_)) => Materialization::Stream,
        _ => Materialization::Inline { limit: size_bound },
    }
}

/**
    Returns the representation of the bind for the given direction.

    For `In` it is how the value is submitted. For `Out` (and `InOut`) it is the shape
    of the returned value:
    - CLOB and BLOB binds are always streams, regardless of `max_size`,
    - STRING and BUFFER binds are inline scalars bounded by the bind's size bound.

    An IN OUT bind thus follows IN rules for submission and OUT rules for the result.

    This is the decision only. The materialized value of an OUT bind is what
    [`OutBinds`](crate::OutBinds) holds after the call: `OutValue::Str`, `OutValue::Bytes`
    or `OutValue::Number` for `Inline`, and `OutValue::Lob`, an open stream handle, for `Stream`.
    SQL NULL is `OutValue::Null` either way.
*/
pub fn materialize(bind: &NormalizedBind, dir: Direction) -> Materialization {
    if !dir.is_out() {
        return bind.mode();
    }
    match bind.sql_type() {
        SqlType::Clob | SqlType::Blob => Materialization::Stream,
        SqlType::Number => Materialization::Inline { limit: None },
        SqlType::String | SqlType::Buffer => Materialization::Inline { limit: bind.size_bound() },
    }
}

fn check_bound(bind: &NormalizedBind, len: usize) -> Result<()> {
    match bind.size_bound() {
        Some(limit) if len > limit => Err( Error::buffer_too_small() ),
        _ => Ok(()),
    }
}

fn inconsistent(bind: &NormalizedBind, value: &OutValue) -> Error {
    Error::oracle(ORA_INCONSISTENT_TYPES, format_args!("inconsistent datatypes: expected {} got {}", bind.sql_type(), value.type_name()))
}

/**
    Shapes a value returned by the server for an OUT or IN OUT bind.

    A LOB returned into a STRING or BUFFER bind is drained into an inline scalar.
    SQL NULL, as well as an empty scalar, becomes `OutValue::Null`.
*/
pub(crate) fn resolve_out(bind: &NormalizedBind, value: OutValue) -> Result<OutValue> {
    let shape = materialize(bind, Direction::Out);
    match (shape, value) {
        (_, OutValue::Null) => Ok( OutValue::Null ),
        (Materialization::Stream, OutValue::Lob(lob)) if Some(lob.kind()) == bind.lob_kind() => Ok( OutValue::Lob(lob) ),
        (Materialization::Inline { .. }, OutValue::Lob(lob)) if Some(lob.kind()) == bind.lob_kind() => {
            // characters never take less than a byte each
            check_bound(bind, lob.len()? as usize)?;
            let value = match lob.kind() {
                LobKind::Clob => OutValue::Str(lob.read_to_string()?),
                LobKind::Blob => OutValue::Bytes(lob.read_to_vec()?),
            };
            resolve_out(bind, value)
        }
        (Materialization::Inline { .. }, OutValue::Str(txt)) if bind.sql_type() == SqlType::String => {
            check_bound(bind, txt.len())?;
            Ok( if txt.is_empty() { OutValue::Null } else { OutValue::Str(txt) } )
        }
        (Materialization::Inline { .. }, OutValue::Bytes(bin)) if bind.sql_type() == SqlType::Buffer => {
            check_bound(bind, bin.len())?;
            Ok( if bin.is_empty() { OutValue::Null } else { OutValue::Bytes(bin) } )
        }
        (Materialization::Inline { .. }, OutValue::Number(num)) if bind.sql_type() == SqlType::Number => Ok( OutValue::Number(num) ),
        (Materialization::Inline { .. }, OutValue::Number(num)) if bind.sql_type() == SqlType::String => {
            resolve_out(bind, OutValue::Str(num.to_string()))
        }
        (_, value) => Err( inconsistent(bind, &value) ),
    }
}
