//! SQL statement arguments

use crate::{Lob, LobSource, Value, types::{Direction, SqlType}};
use std::fmt;

/**
    Bind specification of a single statement parameter.

    A descriptor is created per call and consumed by validation. Bare values
    converted into a descriptor become IN binds with the type inferred from
    the value:

    | value                  | type   |
    |------------------------|--------|
    | number                 | NUMBER |
    | string, null, absent   | STRING |
    | bytes                  | BUFFER |
    | LOB                    | CLOB or BLOB, per LOB kind |
    | source                 | BLOB   |

    # Example

    ```
    use lobbind::{BindDescriptor, SqlType, Direction};

    let arg = BindDescriptor::from("Hello, World!");
    assert_eq!(arg.sql_type(), SqlType::String);
    assert_eq!(arg.dir(), Direction::In);

    let arg = BindDescriptor::output(SqlType::Buffer).with_max_size(50000);
    assert_eq!(arg.dir(), Direction::Out);
    assert_eq!(arg.max_size(), Some(50000));
    ```
*/
#[derive(Debug)]
pub struct BindDescriptor {
    pub(crate) value: Value,
    sql_type: SqlType,
    dir: Direction,
    max_size: Option<usize>,
}

impl BindDescriptor {
    /// Creates an IN bind of the specified type.
    pub fn new(value: impl Into<Value>, sql_type: SqlType) -> Self {
        Self { value: value.into(), sql_type, dir: Direction::In, max_size: None }
    }

    /// Creates an OUT bind of the specified type.
    pub fn output(sql_type: SqlType) -> Self {
        Self { value: Value::Undefined, sql_type, dir: Direction::Out, max_size: None }
    }

    /// Creates an IN OUT bind of the specified type.
    pub fn in_out(value: impl Into<Value>, sql_type: SqlType) -> Self {
        Self { value: value.into(), sql_type, dir: Direction::InOut, max_size: None }
    }

    /// Sets the maximum size, in bytes, of the inline value.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn dir(&self) -> Direction {
        self.dir
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn infer(value: Value) -> Self {
        let sql_type = match &value {
            Value::Number(_) | Value::Bool(_) => SqlType::Number,
            Value::Bytes(_)                   => SqlType::Buffer,
            Value::Lob(lob)                   => lob.kind().sql_type(),
            Value::Source(_)                  => SqlType::Blob,
            _                                 => SqlType::String,
        };
        Self::new(value, sql_type)
    }
}

macro_rules! impl_descriptor_from {
    ($($t:ty),+) => {
        $(
            impl From<$t> for BindDescriptor {
                fn from(val: $t) -> Self {
                    Self::infer(Value::from(val))
                }
            }
        )+
    };
}

impl_descriptor_from!{ i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64 }
impl_descriptor_from!{ &str, String, &[u8], Vec<u8>, bool, Lob, LobSource }

impl From<Value> for BindDescriptor {
    fn from(val: Value) -> Self {
        Self::infer(val)
    }
}

impl<T: Into<Value>> From<Option<T>> for BindDescriptor {
    fn from(val: Option<T>) -> Self {
        Self::infer(Value::from(val))
    }
}

/// Identifies a bind parameter either by its zero-based position or by its placeholder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Position(usize),
    Name(String),
}

impl Slot {
    /// Returns `true` if this slot identifies the same parameter as `other`.
    /// Names are compared case-insensitively and without the leading colon.
    pub fn matches(&self, other: &Slot) -> bool {
        match (self, other) {
            (Slot::Position(this), Slot::Position(that)) => this == that,
            (Slot::Name(this), Slot::Name(that)) => {
                this.trim_start_matches(':').eq_ignore_ascii_case(that.trim_start_matches(':'))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Slot::Position(pos) => write!(f, "{}", pos + 1),
            Slot::Name(name)    => write!(f, ":{}", name.trim_start_matches(':')),
        }
    }
}

impl From<usize> for Slot {
    fn from(pos: usize) -> Self {
        Slot::Position(pos)
    }
}

impl From<&str> for Slot {
    fn from(name: &str) -> Self {
        Slot::Name(name.trim_start_matches(':').to_owned())
    }
}

/**
    Bind collection of a statement. A single call binds either by position or by name.

    Positional binds may mix bare values with full descriptors:

    ```
    use lobbind::{Binds, BindDescriptor, SqlType};

    let binds = Binds::from((6, BindDescriptor::in_out("abc", SqlType::String).with_max_size(10)));
    assert_eq!(binds.len(), 2);

    let binds = Binds::from([
        (":id",  BindDescriptor::from(7)),
        (":txt", BindDescriptor::new("text", SqlType::Clob)),
    ]);
    assert_eq!(binds.len(), 2);
    ```
*/
#[derive(Debug)]
pub enum Binds {
    Positional(Vec<BindDescriptor>),
    Named(Vec<(String, BindDescriptor)>),
}

impl Binds {
    pub fn len(&self) -> usize {
        match self {
            Binds::Positional(args) => args.len(),
            Binds::Named(args)      => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_slots(self) -> Vec<(Slot, BindDescriptor)> {
        match self {
            Binds::Positional(args) => args.into_iter().enumerate().map(|(pos, arg)| (Slot::Position(pos), arg)).collect(),
            Binds::Named(args)      => args.into_iter().map(|(name, arg)| (Slot::from(name.as_str()), arg)).collect(),
        }
    }
}

impl From<()> for Binds {
    fn from(_: ()) -> Self {
        Binds::Positional(Vec::new())
    }
}

impl From<Vec<BindDescriptor>> for Binds {
    fn from(args: Vec<BindDescriptor>) -> Self {
        Binds::Positional(args)
    }
}

impl<const N: usize> From<[BindDescriptor; N]> for Binds {
    fn from(args: [BindDescriptor; N]) -> Self {
        Binds::Positional(args.into())
    }
}

impl From<Vec<(String, BindDescriptor)>> for Binds {
    fn from(args: Vec<(String, BindDescriptor)>) -> Self {
        Binds::Named(args)
    }
}

impl<const N: usize> From<[(&str, BindDescriptor); N]> for Binds {
    fn from(args: [(&str, BindDescriptor); N]) -> Self {
        Binds::Named(args.into_iter().map(|(name, arg)| (name.to_owned(), arg)).collect())
    }
}

macro_rules! impl_binds_from_tuple {
    ($($t:ident $v:ident),+) => {
        impl<$($t),+> From<($($t,)+)> for Binds where $($t: Into<BindDescriptor>),+ {
            fn from(($($v,)+): ($($t,)+)) -> Self {
                Binds::Positional(vec![$($v.into()),+])
            }
        }
    };
}

impl_binds_from_tuple!{ A a }
impl_binds_from_tuple!{ A a, B b }
impl_binds_from_tuple!{ A a, B b, C c }
impl_binds_from_tuple!{ A a, B b, C c, D d }
impl_binds_from_tuple!{ A a, B b, C c, D d, E e }
impl_binds_from_tuple!{ A a, B b, C c, D d, E e, F f }
