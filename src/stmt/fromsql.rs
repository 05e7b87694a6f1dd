use super::exec::OutValue;
use crate::{Error, Lob, Result, types::LobKind};

/// A trait for types which instances can be created from the returned values.
pub trait FromSql : Sized {
    /**
        Converts, if possible, the returned value into the requested type. Returns error
        if the conversion fails or if it is not defined for the value.
    */
    fn value(col: &OutValue) -> Result<Self>;
}

fn cannot_convert(col: &OutValue, into: &str) -> Error {
    Error::msg(format!("cannot convert {} into {}", col.type_name(), into))
}

impl FromSql for String {
    fn value(col: &OutValue) -> Result<Self> {
        match col {
            OutValue::Str(txt)    => Ok( txt.clone() ),
            OutValue::Number(num) => Ok( num.to_string() ),
            OutValue::Lob(lob) if lob.kind() == LobKind::Clob => lob.try_clone()?.read_to_string(),
            _ => Err( cannot_convert(col, "String") ),
        }
    }
}

impl FromSql for Vec<u8> {
    fn value(col: &OutValue) -> Result<Self> {
        match col {
            OutValue::Bytes(bin) => Ok( bin.clone() ),
            OutValue::Str(txt)   => Ok( txt.as_bytes().to_vec() ),
            OutValue::Lob(lob)   => lob.try_clone()?.read_to_vec(),
            _ => Err( cannot_convert(col, "Vec<u8>") ),
        }
    }
}

impl FromSql for f64 {
    fn value(col: &OutValue) -> Result<Self> {
        match col {
            OutValue::Number(num) => Ok( *num ),
            _ => Err( cannot_convert(col, "f64") ),
        }
    }
}

impl FromSql for i64 {
    fn value(col: &OutValue) -> Result<Self> {
        match col {
            OutValue::Number(num) if num.fract() == 0.0 => Ok( *num as i64 ),
            _ => Err( cannot_convert(col, "i64") ),
        }
    }
}

impl FromSql for Lob {
    fn value(col: &OutValue) -> Result<Self> {
        match col {
            OutValue::Lob(lob) => lob.try_clone(),
            _ => Err( cannot_convert(col, "Lob") ),
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn value(col: &OutValue) -> Result<Self> {
        match col {
            OutValue::Null => Ok( None ),
            _ => T::value(col).map(Some),
        }
    }
}
