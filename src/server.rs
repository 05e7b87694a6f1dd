//! Contracts of the database services the bind engine talks to.
//!
//! The engine never speaks a wire protocol itself. It hands normalized
//! binds to an [`Executor`], drives transactions through [`Transaction`]
//! and moves LOB content through [`LobStorage`]. [`MemoryServer`](crate::memdb::MemoryServer)
//! implements all three in process.

use crate::{Result, types::{Direction, LobKind, SqlType}};

/// Server side identity of a large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub id: u64,
    pub kind: LobKind,
}

/// A value as it crosses the server boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerValue {
    Null,
    Number(f64),
    Text(String),
    Binary(Vec<u8>),
    Locator(Locator),
}

impl ServerValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ServerValue::Null)
    }
}

/// A bind as submitted to the server.
#[derive(Debug, Clone)]
pub struct ServerBind {
    /// Placeholder name (without the leading colon) for named binds
    pub name: Option<String>,
    pub sql_type: SqlType,
    pub dir: Direction,
    /// IN data; replaced by the server with the OUT data after execution
    pub value: ServerValue,
    /// Size of the buffer the client allocated for OUT data, if any
    pub buffer_size: Option<usize>,
}

/// Result of a statement execution
#[derive(Debug, Default)]
pub struct Outcome {
    pub rows_affected: u64,
    /// Result set of a query
    pub rows: Vec<Vec<ServerValue>>,
}

/// SQL/PLSQL execution service
pub trait Executor {
    /**
        Executes the statement with the provided binds.

        OUT values are written back into the `value` of the respective bind.
        A failed statement leaves no effects behind.
    */
    fn execute(&self, sql: &str, binds: &mut [ServerBind]) -> Result<Outcome>;
}

/// Identity of a savepoint within the current transaction
pub type SavepointId = u64;

/// Transaction control service
pub trait Transaction {
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
    /**
        Marks the current state of the transaction. Savepoints end with the
        transaction that set them.
    */
    fn savepoint(&self) -> Result<SavepointId>;
    /**
        Undoes the changes made after the savepoint was set. The transaction
        itself stays open, as does the savepoint.
    */
    fn rollback_to(&self, savepoint: SavepointId) -> Result<()>;
    /// Forgets the savepoint and the ones set after it. Their changes stay.
    fn release_savepoint(&self, savepoint: SavepointId) -> Result<()>;
}

/**
    Locator based LOB I/O.

    Offsets and amounts count characters for CLOBs and bytes for BLOBs.
    CLOB content crosses the boundary as UTF-8.
*/
pub trait LobStorage {
    /// Returns the LOB length in characters (CLOB) or bytes (BLOB).
    fn lob_len(&self, loc: &Locator) -> Result<u64>;
    /// Reads up to `amount` characters or bytes starting at `offset`.
    fn lob_read(&self, loc: &Locator, offset: u64, amount: usize) -> Result<Vec<u8>>;
    /// Writes `data` at `offset`. Returns the number of characters or bytes written.
    fn lob_write(&self, loc: &Locator, offset: u64, data: &[u8]) -> Result<u64>;
    /// Returns the server's preferred transfer unit for this LOB.
    fn lob_chunk_size(&self, loc: &Locator) -> Result<usize>;
    /// Creates a new temporary LOB.
    fn lob_create_temporary(&self, kind: LobKind) -> Result<Locator>;
    /// Returns a new locator (a new client reference) to the same LOB.
    fn lob_assign(&self, loc: &Locator) -> Result<Locator>;
    /// Releases a client reference to the locator.
    fn lob_release(&self, loc: &Locator);
}

/// Everything a session needs from the database.
pub trait Backend: Executor + Transaction + LobStorage + Send + Sync {}

impl<T> Backend for T where T: Executor + Transaction + LobStorage + Send + Sync {}

impl From<f64> for ServerValue {
    fn from(num: f64) -> Self {
        ServerValue::Number(num)
    }
}

impl From<i64> for ServerValue {
    fn from(num: i64) -> Self {
        ServerValue::Number(num as f64)
    }
}

impl From<String> for ServerValue {
    fn from(txt: String) -> Self {
        ServerValue::Text(txt)
    }
}

impl From<&str> for ServerValue {
    fn from(txt: &str) -> Self {
        ServerValue::Text(txt.to_owned())
    }
}

impl From<Vec<u8>> for ServerValue {
    fn from(bin: Vec<u8>) -> Self {
        ServerValue::Binary(bin)
    }
}

impl From<Locator> for ServerValue {
    fn from(loc: Locator) -> Self {
        ServerValue::Locator(loc)
    }
}

impl<T: Into<ServerValue>> From<Option<T>> for ServerValue {
    fn from(val: Option<T>) -> Self {
        val.map_or(ServerValue::Null, Into::into)
    }
}
