//! SQL or PL/SQL statement binds, execution and results

mod args;
mod bind;
mod policy;
mod exec;
mod rows;
mod fromsql;

pub use args::{BindDescriptor, Binds, Slot};
pub use bind::{NormalizedBind, validate_and_normalize};
pub use policy::{Materialization, materialize};
pub use exec::{ExecOptions, ExecutionResult, OutBinds, OutValue};
pub use rows::{Rows, Row};
pub use fromsql::FromSql;
