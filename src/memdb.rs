/*!
In-memory database server.

`MemoryServer` implements the [`Backend`](crate::server::Backend) services in process.
It has no SQL parser. Statements are registered by their text together with their
declared parameters and a body that does the work:

```
use lobbind::{BindDescriptor, Direction, ExecOptions, SqlType, memdb::{MemoryServer, DataType, Param}};
use std::sync::Arc;

let server = MemoryServer::new();
server.create_table("docs", &[("id", DataType::Number), ("body", DataType::Clob)])?;
server.define(
    "BEGIN add_doc(:id, :body); END;",
    vec![Param::new("id", DataType::Number, Direction::In), Param::new("body", DataType::Clob, Direction::In)],
    |call| {
        let row = call.args().to_vec();
        call.insert("docs", row)?;
        Ok(1)
    }
);

let session = lobbind::env()?.connect(Arc::new(server));
let res = session.execute(
    "BEGIN add_doc(:id, :body); END;",
    (1, BindDescriptor::new("x".repeat(65535), SqlType::String)),
    &ExecOptions::new().with_auto_commit(true)
)?;
assert_eq!(res.rows_affected(), 1);
# Ok::<(),lobbind::Error>(())
```

Transactions are snapshots of the tables and of the persistent LOBs. Every
statement is atomic. Temporary LOBs and client references to LOBs are not
transactional.

Binding follows the usual server conversions:
- a STRING or BUFFER value bound to a CLOB or BLOB parameter becomes a temporary LOB,
- unless a STRING or BUFFER bind is IN OUT and its value is longer than the 32767 bytes PL/SQL scalar limit,
  which fails with `ORA-01460`,
- a LOB parameter returned into a STRING or BUFFER bind with no buffer size fails
  with `ORA-06502`,
- empty strings are NULL.
*/

mod lobs;
mod call;

pub use call::{Call, Param};

use crate::{
    Error, Result,
    err::{ORA_NO_SUCH_TABLE, ORA_PLSQL_COMPILATION},
    server::{Executor, LobStorage, Locator, Outcome, SavepointId, ServerBind, ServerValue, Transaction},
    types::LobKind,
};
use call::Routine;
use lobs::LobData;
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, fmt, sync::Arc};

/// Chunk size the server reports for its LOBs
pub const DEFAULT_CHUNK_SIZE : usize = 8132;

/// Largest string or raw value PL/SQL handles as a scalar
pub(crate) const PLSQL_SCALAR_LIMIT : usize = 32767;

/// ORA-00955: name is already used by an existing object
const ORA_NAME_IN_USE : i32 = 955;

/// ORA-01086: savepoint never established in this session or is invalid
const ORA_SAVEPOINT_UNKNOWN : i32 = 1086;

/// Column and parameter data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Number,
    /// Character data of the specified maximum length in bytes
    Varchar2(usize),
    /// Binary data of the specified maximum length
    Raw(usize),
    Clob,
    Blob,
}

impl DataType {
    pub fn lob_kind(self) -> Option<LobKind> {
        match self {
            DataType::Clob => Some(LobKind::Clob),
            DataType::Blob => Some(LobKind::Blob),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataType::Number        => f.write_str("NUMBER"),
            DataType::Varchar2(len) => write!(f, "VARCHAR2({})", len),
            DataType::Raw(len)      => write!(f, "RAW({})", len),
            DataType::Clob          => f.write_str("CLOB"),
            DataType::Blob          => f.write_str("BLOB"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<(String, DataType)>,
    rows: Vec<Vec<ServerValue>>,
}

/// Transactional part of the server state
#[derive(Debug, Clone, Default)]
struct Db {
    tables: HashMap<String, Table>,
    /// LOBs that are (or were created to be) stored in tables
    lobs: HashMap<u64, LobData>,
}

#[derive(Debug, Default)]
struct State {
    committed: Db,
    working: Db,
    temps: HashMap<u64, LobData>,
    /// Client references per LOB
    refs: HashMap<u64, usize>,
    next_id: u64,
    /// Savepoints of the pending transaction, oldest first
    savepoints: Vec<(SavepointId, Db)>,
    next_savepoint: SavepointId,
}

/**
    Provisioning of the tables and routines a workload needs.
*/
pub trait Schema {
    fn create_schema(&self, server: &MemoryServer) -> Result<()>;
    fn drop_schema(&self, server: &MemoryServer) -> Result<()>;
}

/// In-memory database server
pub struct MemoryServer {
    state: Mutex<State>,
    routines: RwLock<HashMap<String, Arc<Routine>>>,
    chunk_size: usize,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

fn statement_key(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Creates a server that reports the specified LOB chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            routines: RwLock::new(HashMap::new()),
            chunk_size: chunk_size.max(1),
        }
    }

    /**
        Creates a table. Like any DDL it takes effect immediately, independently of
        the pending transaction.
    */
    pub fn create_table(&self, name: &str, columns: &[(&str, DataType)]) -> Result<()> {
        let key = name.to_uppercase();
        let mut state = self.state.lock();
        if state.committed.tables.contains_key(&key) || state.working.tables.contains_key(&key) {
            return Err( Error::oracle(ORA_NAME_IN_USE, "name is already used by an existing object") );
        }
        let table = Table {
            columns: columns.iter().map(|(name, data_type)| (name.to_uppercase(), *data_type)).collect(),
            rows: Vec::new(),
        };
        for (_, db) in state.savepoints.iter_mut() {
            db.tables.insert(key.clone(), table.clone());
        }
        state.committed.tables.insert(key.clone(), table.clone());
        state.working.tables.insert(key, table);
        tracing::debug!(table = name, "table created");
        Ok(())
    }

    /// Drops a table. Like any DDL it takes effect immediately.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let key = name.to_uppercase();
        let mut state = self.state.lock();
        let in_committed = state.committed.tables.remove(&key).is_some();
        let in_working = state.working.tables.remove(&key).is_some();
        for (_, db) in state.savepoints.iter_mut() {
            db.tables.remove(&key);
        }
        if !in_committed && !in_working {
            return Err( Error::oracle(ORA_NO_SUCH_TABLE, "table or view does not exist") );
        }
        tracing::debug!(table = name, "table dropped");
        Ok(())
    }

    /**
        Registers a statement. The text is matched after whitespace is collapsed.
        Parameters are bound either by position or, when binds are named, by name.
    */
    pub fn define<F>(&self, sql: &str, params: Vec<Param>, body: F)
    where F: Fn(&mut Call) -> Result<u64> + Send + Sync + 'static
    {
        let routine = Routine::new(params, Box::new(body));
        self.routines.write().insert(statement_key(sql), Arc::new(routine));
    }

    /// Forgets a registered statement.
    pub fn undefine(&self, sql: &str) {
        self.routines.write().remove(&statement_key(sql));
    }

    /// Returns the number of LOB references currently held by clients.
    pub fn lob_references(&self) -> usize {
        self.state.lock().references()
    }

    /// Returns the number of temporary LOBs that are allocated.
    pub fn temporary_lobs(&self) -> usize {
        self.state.lock().temps.len()
    }
}

impl Executor for MemoryServer {
    fn execute(&self, sql: &str, binds: &mut [ServerBind]) -> Result<Outcome> {
        let key = statement_key(sql);
        let routine = self.routines.read().get(&key).cloned()
            .ok_or_else(|| Error::oracle(ORA_PLSQL_COMPILATION, format_args!("PLS-00201: statement is not defined: {}", key)))?;

        let mut state = self.state.lock();
        let savepoint = state.working.clone();
        let mut call = Call::new(&mut state);
        let res = routine.invoke(&mut call, binds);
        call.finish();
        match res {
            Ok((rows_affected, rows)) => {
                tracing::trace!(sql = %key, rows_affected, rows = rows.len(), "statement executed");
                Ok(Outcome { rows_affected, rows })
            }
            Err(err) => {
                state.working = savepoint;
                tracing::trace!(sql = %key, error = %err, "statement failed");
                Err(err)
            }
        }
    }
}

impl Transaction for MemoryServer {
    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.collect_garbage();
        state.committed = state.working.clone();
        state.savepoints.clear();
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.working = state.committed.clone();
        state.savepoints.clear();
        Ok(())
    }

    fn savepoint(&self) -> Result<SavepointId> {
        let mut state = self.state.lock();
        state.next_savepoint += 1;
        let id = state.next_savepoint;
        let snapshot = state.working.clone();
        state.savepoints.push((id, snapshot));
        Ok(id)
    }

    fn rollback_to(&self, savepoint: SavepointId) -> Result<()> {
        let mut state = self.state.lock();
        let pos = state.savepoints.iter().position(|(id, _)| *id == savepoint)
            .ok_or_else(|| Error::oracle(ORA_SAVEPOINT_UNKNOWN, "savepoint never established in this session or is invalid"))?;
        // later savepoints are erased
        state.savepoints.truncate(pos + 1);
        state.working = state.savepoints[pos].1.clone();
        tracing::trace!(savepoint, "rolled back to savepoint");
        Ok(())
    }

    fn release_savepoint(&self, savepoint: SavepointId) -> Result<()> {
        let mut state = self.state.lock();
        let pos = state.savepoints.iter().position(|(id, _)| *id == savepoint)
            .ok_or_else(|| Error::oracle(ORA_SAVEPOINT_UNKNOWN, "savepoint never established in this session or is invalid"))?;
        state.savepoints.truncate(pos);
        Ok(())
    }
}

impl LobStorage for MemoryServer {
    fn lob_len(&self, loc: &Locator) -> Result<u64> {
        Ok( self.state.lock().lob(loc)?.len() )
    }

    fn lob_read(&self, loc: &Locator, offset: u64, amount: usize) -> Result<Vec<u8>> {
        Ok( self.state.lock().lob(loc)?.read(offset, amount) )
    }

    fn lob_write(&self, loc: &Locator, offset: u64, data: &[u8]) -> Result<u64> {
        self.state.lock().lob_mut(loc)?.write(offset, data)
    }

    fn lob_chunk_size(&self, loc: &Locator) -> Result<usize> {
        self.state.lock().lob(loc)?;
        Ok(self.chunk_size)
    }

    fn lob_create_temporary(&self, kind: LobKind) -> Result<Locator> {
        let mut state = self.state.lock();
        let loc = state.new_temp(LobData::empty(kind));
        state.grant(&loc);
        Ok(loc)
    }

    fn lob_assign(&self, loc: &Locator) -> Result<Locator> {
        let mut state = self.state.lock();
        state.lob(loc)?;
        state.grant(loc);
        Ok(*loc)
    }

    fn lob_release(&self, loc: &Locator) {
        self.state.lock().release(loc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, types::{Direction, SqlType}};

    fn bind(sql_type: SqlType, dir: Direction, value: ServerValue) -> ServerBind {
        ServerBind { name: None, sql_type, dir, value, buffer_size: None }
    }

    fn server() -> Result<MemoryServer> {
        let server = MemoryServer::new();
        server.create_table("t", &[("id", DataType::Number), ("c", DataType::Clob)])?;
        server.define(
            "INSERT INTO t VALUES (:1, :2)",
            vec![Param::new("1", DataType::Number, Direction::In), Param::new("2", DataType::Clob, Direction::In)],
            |call| {
                let row = call.args().to_vec();
                call.insert("t", row)?;
                Ok(1)
            }
        );
        server.define(
            "SELECT c FROM t WHERE id = :1",
            vec![Param::new("1", DataType::Number, Direction::In)],
            |call| {
                let id = call.arg(0).clone();
                for row in call.select("t", |row| row[0] == id)? {
                    call.emit(vec![row[1].clone()]);
                }
                Ok(0)
            }
        );
        server.define(
            "BEGIN :1 := :2; END;",
            vec![Param::new("1", DataType::Clob, Direction::Out), Param::new("2", DataType::Clob, Direction::In)],
            |call| {
                let val = call.arg(1).clone();
                call.set(0, val);
                Ok(0)
            }
        );
        Ok(server)
    }

    fn locator(val: &ServerValue) -> Locator {
        match val {
            ServerValue::Locator(loc) => *loc,
            other => panic!("expected a locator, got {:?}", other),
        }
    }

    #[test]
    fn rollback_discards_rows_and_their_lobs() -> Result<()> {
        let server = server()?;
        let mut binds = [
            bind(SqlType::Number, Direction::In, ServerValue::Number(1.0)),
            bind(SqlType::String, Direction::In, ServerValue::Text("abc".into())),
        ];
        server.execute("INSERT INTO t VALUES (:1, :2)", &mut binds)?;
        // the conversion temporary is gone
        assert_eq!(server.temporary_lobs(), 0);

        let mut binds = [bind(SqlType::Number, Direction::In, ServerValue::Number(1.0))];
        let outcome = server.execute("SELECT c FROM t WHERE id = :1", &mut binds)?;
        assert_eq!(outcome.rows.len(), 1);
        let loc = locator(&outcome.rows[0][0]);
        assert_eq!(server.lob_references(), 1);
        assert_eq!(server.lob_read(&loc, 0, 100)?, b"abc");

        server.rollback()?;
        assert_eq!(server.lob_len(&loc).unwrap_err().code(), "ORA-22922");
        server.lob_release(&loc);
        assert_eq!(server.lob_references(), 0);

        let outcome = server.execute("SELECT c FROM t WHERE id = :1", &mut binds)?;
        assert!(outcome.rows.is_empty());
        Ok(())
    }

    #[test]
    fn failed_statement_leaves_no_effects() -> Result<()> {
        let server = server()?;
        let mut binds = [
            bind(SqlType::Number, Direction::In, ServerValue::Number(1.0)),
            bind(SqlType::Buffer, Direction::In, ServerValue::Binary(vec![1, 2, 3])),
        ];
        let err = server.execute("INSERT INTO t VALUES (:1, :2)", &mut binds).unwrap_err();
        assert_eq!(err.code(), "ORA-00932");

        let mut binds = [bind(SqlType::Number, Direction::In, ServerValue::Number(1.0))];
        assert!(server.execute("SELECT c FROM t WHERE id = :1", &mut binds)?.rows.is_empty());
        assert_eq!(server.execute("SELECT * FROM t", &mut []).unwrap_err().code(), "ORA-06550");
        Ok(())
    }

    #[test]
    fn rollback_to_savepoint_keeps_earlier_work() -> Result<()> {
        let server = server()?;
        let mut binds = [
            bind(SqlType::Number, Direction::In, ServerValue::Number(1.0)),
            bind(SqlType::String, Direction::In, ServerValue::Text("kept".into())),
        ];
        server.execute("INSERT INTO t VALUES (:1, :2)", &mut binds)?;

        let savepoint = server.savepoint()?;
        let mut binds = [
            bind(SqlType::Number, Direction::In, ServerValue::Number(2.0)),
            bind(SqlType::String, Direction::In, ServerValue::Text("undone".into())),
        ];
        server.execute("INSERT INTO t VALUES (:1, :2)", &mut binds)?;
        server.rollback_to(savepoint)?;

        let mut binds = [bind(SqlType::Number, Direction::In, ServerValue::Number(2.0))];
        assert!(server.execute("SELECT c FROM t WHERE id = :1", &mut binds)?.rows.is_empty());
        let mut binds = [bind(SqlType::Number, Direction::In, ServerValue::Number(1.0))];
        let outcome = server.execute("SELECT c FROM t WHERE id = :1", &mut binds)?;
        let loc = locator(&outcome.rows[0][0]);
        assert_eq!(server.lob_read(&loc, 0, 100)?, b"kept");
        server.lob_release(&loc);

        // the savepoint outlives a rollback to it, but not the transaction
        server.rollback_to(savepoint)?;
        server.commit()?;
        assert_eq!(server.rollback_to(savepoint).unwrap_err().code(), "ORA-01086");

        let savepoint = server.savepoint()?;
        server.release_savepoint(savepoint)?;
        assert_eq!(server.rollback_to(savepoint).unwrap_err().code(), "ORA-01086");
        Ok(())
    }

    #[test]
    fn in_out_scalar_limit() -> Result<()> {
        let server = MemoryServer::new();
        server.define(
            "BEGIN p(:1); END;",
            vec![Param::new("1", DataType::Clob, Direction::InOut)],
            |_| Ok(0)
        );
        let mut binds = [ServerBind { buffer_size: Some(40000), ..bind(SqlType::String, Direction::InOut, ServerValue::Text("x".repeat(32768))) }];
        let err = server.execute("BEGIN p(:1); END;", &mut binds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionUnsupported);

        let mut binds = [ServerBind { buffer_size: Some(40000), ..bind(SqlType::String, Direction::InOut, ServerValue::Text("x".repeat(32767))) }];
        server.execute("BEGIN p(:1); END;", &mut binds)?;
        assert_eq!(binds[0].value, ServerValue::Text("x".repeat(32767)));
        assert_eq!(server.temporary_lobs(), 0);
        Ok(())
    }

    #[test]
    fn unsized_scalar_out_of_a_lob() -> Result<()> {
        let server = server()?;
        let mut binds = [
            bind(SqlType::String, Direction::Out, ServerValue::Null),
            bind(SqlType::String, Direction::In, ServerValue::Text("abc".into())),
        ];
        let err = server.execute("BEGIN :1 := :2; END;", &mut binds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericOrValue);

        binds[0].buffer_size = Some(10);
        server.execute("BEGIN :1 := :2; END;", &mut binds)?;
        assert_eq!(binds[0].value, ServerValue::Text("abc".into()));
        Ok(())
    }

    #[test]
    fn lob_out_is_handed_to_the_client() -> Result<()> {
        let server = server()?;
        let mut binds = [
            bind(SqlType::Clob, Direction::Out, ServerValue::Null),
            bind(SqlType::Clob, Direction::In, ServerValue::Text("abc".into())),
        ];
        server.execute("BEGIN :1 := :2; END;", &mut binds)?;
        let loc = locator(&binds[0].value);
        assert_eq!(server.lob_len(&loc)?, 3);
        assert_eq!(server.temporary_lobs(), 1);
        server.lob_release(&loc);
        assert_eq!(server.temporary_lobs(), 0);
        Ok(())
    }

    #[test]
    fn ddl() -> Result<()> {
        let server = server()?;
        assert_eq!(server.create_table("T", &[]).unwrap_err().code(), "ORA-00955");
        server.drop_table("t")?;
        assert_eq!(server.drop_table("t").unwrap_err().code(), "ORA-00942");
        Ok(())
    }
}
