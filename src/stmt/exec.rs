//! Statement execution coordinator

use super::{
    args::{Binds, Slot},
    bind::{NormalizedBind, Payload, validate_and_normalize},
    fromsql::FromSql,
    policy::{self, Materialization},
    rows::Rows,
};
use crate::{
    Error, Lob, LobSource, Result, Session,
    server::{Outcome, ServerBind, ServerValue},
    session::{StatementMark, SvcCtx},
    types::{Direction, LobKind},
};
use std::{io::Read, sync::Arc};

/// Execution options
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    auto_commit: Option<bool>,
}

impl ExecOptions {
    /// Returns options that use the session defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits the transaction when the statement (and any LOB write it implies) succeeds.
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    /// Returns the auto-commit override. `None` means the session configuration decides.
    pub fn auto_commit(&self) -> Option<bool> {
        self.auto_commit
    }
}

/// A value received from the server, either as an OUT bind or as a column of a fetched row.
#[derive(Debug)]
pub enum OutValue {
    Null,
    Number(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// An open LOB. It is the caller's responsibility to drain or close it.
    Lob(Lob),
}

impl OutValue {
    pub(crate) fn from_server(value: ServerValue, svc: &Arc<SvcCtx>) -> Self {
        match value {
            ServerValue::Null         => OutValue::Null,
            ServerValue::Number(num)  => OutValue::Number(num),
            ServerValue::Text(txt)    => OutValue::Str(txt),
            ServerValue::Binary(bin)  => OutValue::Bytes(bin),
            ServerValue::Locator(loc) => OutValue::Lob(Lob::make(loc, svc.clone())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, OutValue::Null)
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            OutValue::Null      => "NULL",
            OutValue::Number(_) => "NUMBER",
            OutValue::Str(_)    => "STRING",
            OutValue::Bytes(_)  => "BUFFER",
            OutValue::Lob(lob)  => match lob.kind() {
                LobKind::Clob => "CLOB",
                LobKind::Blob => "BLOB",
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OutValue::Str(txt) => Some(txt.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            OutValue::Bytes(bin) => Some(bin.as_slice()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OutValue::Number(num) => Some(*num),
            _ => None,
        }
    }

    pub fn into_lob(self) -> Option<Lob> {
        match self {
            OutValue::Lob(lob) => Some(lob),
            _ => None,
        }
    }

    /// Converts the value into the requested type. LOBs are drained (through a new locator).
    pub fn get<T: FromSql>(&self) -> Result<T> {
        T::value(self)
    }
}

/// OUT binds of an executed statement, keyed by the bind position or name.
#[derive(Debug, Default)]
pub struct OutBinds {
    entries: Vec<(Slot, OutValue)>,
}

impl OutBinds {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value of the OUT bind at the given zero-based position or with the given name.
    pub fn get(&self, slot: impl Into<Slot>) -> Option<&OutValue> {
        let slot = slot.into();
        self.entries.iter().find(|(key, _)| key.matches(&slot)).map(|(_, val)| val)
    }

    /// Removes the value from the collection. This is how LOB handles are taken over.
    pub fn take(&mut self, slot: impl Into<Slot>) -> Option<OutValue> {
        let slot = slot.into();
        let pos = self.entries.iter().position(|(key, _)| key.matches(&slot))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &OutValue)> {
        self.entries.iter().map(|(key, val)| (key, val))
    }
}

/// Result of a successful statement execution
#[derive(Debug)]
pub struct ExecutionResult {
    rows_affected: u64,
    out_binds: OutBinds,
}

impl ExecutionResult {
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn out_binds(&self) -> &OutBinds {
        &self.out_binds
    }

    pub fn out_binds_mut(&mut self) -> &mut OutBinds {
        &mut self.out_binds
    }

    pub fn into_out_binds(self) -> OutBinds {
        self.out_binds
    }
}

/// Everything a statement produced, before commit
struct Submitted {
    rows_affected: u64,
    out_binds: OutBinds,
    rows: Vec<Vec<OutValue>>,
}

impl Session {
    fn normalize(&self, binds: Binds) -> Result<Vec<NormalizedBind>> {
        binds.into_slots().into_iter()
            .map(|(slot, desc)| validate_and_normalize(slot, desc, self.config()))
            .collect()
    }

    /// Copies the source into a new temporary LOB. The write stream is closed when this returns.
    fn pipe_source(&self, kind: LobKind, mut src: LobSource) -> Result<Lob> {
        let lob = Lob::temp(self, kind)?;
        let held = lob.try_clone()?;
        let mut writer = lob.writer()?;
        let len = writer.pipe_from(&mut src.0)?;
        tracing::debug!(?kind, len, "source piped into a temporary LOB");
        Ok(held)
    }

    fn server_bind(&self, bind: &mut NormalizedBind, held: &mut Vec<Lob>) -> Result<ServerBind> {
        let value = match std::mem::replace(&mut bind.payload, Payload::Null) {
            Payload::Null        => ServerValue::Null,
            Payload::Number(num) => ServerValue::Number(num),
            Payload::Text(txt)   => ServerValue::Text(txt),
            Payload::Binary(bin) => ServerValue::Binary(bin),
            Payload::Lob(lob) => {
                let loc = *lob.locator();
                held.push(lob);
                ServerValue::Locator(loc)
            }
            Payload::Source(src) => {
                let kind = bind.lob_kind().ok_or_else(|| Error::bind_type_mismatch(bind.slot()))?;
                let lob = self.pipe_source(kind, src)?;
                let loc = *lob.locator();
                held.push(lob);
                ServerValue::Locator(loc)
            }
        };
        let buffer_size = match (bind.dir().is_out(), policy::materialize(bind, Direction::Out)) {
            (true, Materialization::Inline { limit }) => limit,
            _ => None,
        };
        let name = match bind.slot() {
            Slot::Name(name) => Some(name.clone()),
            Slot::Position(_) => None,
        };
        Ok(ServerBind { name, sql_type: bind.sql_type(), dir: bind.dir(), value, buffer_size })
    }

    /// Submits the binds and shapes the results. The caller holds the execution lock.
    fn submit(&self, svc: &Arc<SvcCtx>, sql: &str, mut binds: Vec<NormalizedBind>) -> Result<Submitted> {
        // LOBs referenced by IN binds must stay alive until the server is done with them
        let mut held = Vec::new();
        let mut server_binds = Vec::with_capacity(binds.len());
        for bind in binds.iter_mut() {
            server_binds.push(self.server_bind(bind, &mut held)?);
        }

        let Outcome { rows_affected, rows } = svc.backend().execute(sql, &mut server_binds)?;
        drop(held);

        // Wrap every returned locator first, so that all of them are released if shaping fails
        let received: Vec<(NormalizedBind, OutValue)> = binds.into_iter().zip(server_binds)
            .filter(|(bind, _)| bind.dir().is_out())
            .map(|(bind, server_bind)| {
                let value = OutValue::from_server(server_bind.value, svc);
                (bind, value)
            })
            .collect();
        let rows: Vec<Vec<OutValue>> = rows.into_iter()
            .map(|row| row.into_iter().map(|val| OutValue::from_server(val, svc)).collect())
            .collect();

        let mut entries = Vec::with_capacity(received.len());
        for (bind, value) in received {
            let value = policy::resolve_out(&bind, value)?;
            entries.push((bind.slot().clone(), value));
        }
        Ok(Submitted { rows_affected, out_binds: OutBinds { entries }, rows })
    }

    /// Undoes what the statement did and keeps the rest of the transaction.
    fn undo(svc: &SvcCtx, mark: StatementMark) {
        if let Err(err) = svc.undo(mark) {
            tracing::warn!(error = %err, "failed to undo the statement");
        }
    }

    fn run(&self, sql: &str, binds: Binds, auto_commit: bool) -> Result<(Submitted, StatementMark)> {
        // validation happens before any I/O
        let binds = self.normalize(binds)?;
        let svc = self.get_svc();
        let _exec = svc.lock_exec();
        let mark = svc.mark()?;
        let res = self.submit(&svc, sql, binds).and_then(|submitted| {
            if auto_commit {
                svc.commit()?;
            }
            Ok(submitted)
        });
        match res {
            Ok(submitted) => Ok((submitted, mark)),
            Err(err) => {
                tracing::debug!(error = %err, "statement failed");
                // the server undoes its own failures, but not those the client detects after the call
                Self::undo(&svc, mark);
                Err(err)
            }
        }
    }

    /**
        Executes a statement.

        Binds are validated before anything is sent to the server. IN values that are
        byte or character sources are piped into temporary LOBs, whose write streams
        are closed, before the statement is submitted. OUT binds come back as inline
        scalars or as open LOB handles.

        A failure of any part of the call is reported as a single error and no OUT
        binds are returned. The effects of a failed call are undone, while the work done
        earlier in the transaction is kept. Auto-commit only commits after a successful call.

        # Example

        ```
        use lobbind::{BindDescriptor, Direction, ExecOptions, SqlType, memdb::{MemoryServer, DataType, Param}};
        use std::sync::Arc;

        let server = MemoryServer::new();
        server.define(
            "BEGIN :out := UPPER(:txt); END;",
            vec![Param::new("out", DataType::Varchar2(100), Direction::Out), Param::new("txt", DataType::Varchar2(100), Direction::In)],
            |call| {
                let txt = call.text(1)?.unwrap_or_default();
                call.set(0, txt.to_uppercase());
                Ok(0)
            }
        );
        let session = lobbind::env()?.connect(Arc::new(server));

        let res = session.execute(
            "BEGIN :out := UPPER(:txt); END;",
            (BindDescriptor::output(SqlType::String).with_max_size(100), "hello"),
            &ExecOptions::new()
        )?;
        assert_eq!(res.out_binds().get(0).and_then(|val| val.as_str()), Some("HELLO"));
        # Ok::<(),lobbind::Error>(())
        ```
    */
    #[tracing::instrument(level = "debug", skip_all, fields(sql = %sql))]
    pub fn execute(&self, sql: &str, binds: impl Into<Binds>, opts: &ExecOptions) -> Result<ExecutionResult> {
        let auto_commit = opts.auto_commit().unwrap_or(self.config().auto_commit());
        let (Submitted { rows_affected, out_binds, .. }, mark) = self.run(sql, binds.into(), auto_commit)?;
        self.ctx().release(mark);
        tracing::debug!(rows_affected, out_binds = out_binds.len(), "executed");
        Ok(ExecutionResult { rows_affected, out_binds })
    }

    /**
        Executes a query and returns its rows. LOB columns are returned as open LOB
        handles. Queries never commit.
    */
    #[tracing::instrument(level = "debug", skip_all, fields(sql = %sql))]
    pub fn query(&self, sql: &str, binds: impl Into<Binds>) -> Result<Rows> {
        let (Submitted { rows, .. }, mark) = self.run(sql, binds.into(), false)?;
        self.ctx().release(mark);
        tracing::debug!(rows = rows.len(), "fetched");
        Ok(Rows::new(rows))
    }

    /**
        Executes a statement that returns a LOB locator, i.e. an `INSERT ... RETURNING`
        of an `EMPTY_CLOB()`, and pipes the source into that LOB.

        The transaction is committed (when auto-commit is requested) only after the write
        stream has been closed. If piping fails the stream is errored and the statement is
        undone, together with the failure of its stream. The rest of the transaction is
        kept and can still be committed.

        The returned result does not include the consumed LOB bind.
    */
    #[tracing::instrument(level = "debug", skip_all, fields(sql = %sql))]
    pub fn execute_streaming<R: Read>(&self, sql: &str, binds: impl Into<Binds>, slot: impl Into<Slot>, mut src: R, opts: &ExecOptions) -> Result<ExecutionResult> {
        let auto_commit = opts.auto_commit().unwrap_or(self.config().auto_commit());
        let slot = slot.into();
        let (Submitted { rows_affected, mut out_binds, .. }, mark) = self.run(sql, binds.into(), false)?;

        let piped = match out_binds.take(slot.clone()) {
            Some(OutValue::Lob(lob)) => lob.writer().and_then(|mut writer| writer.pipe_from(&mut src)),
            Some(other) => Err( Error::msg(format!("OUT bind {} returned {} rather than a LOB", slot, other.type_name())) ),
            None => Err( Error::msg(format!("statement has no OUT bind {}", slot)) ),
        };
        let res = piped.and_then(|len| {
            tracing::debug!(len, "LOB write stream closed");
            if auto_commit {
                self.commit()?;
            }
            Ok(())
        });
        match res {
            Ok(()) => {
                self.ctx().release(mark);
                Ok(ExecutionResult { rows_affected, out_binds })
            }
            Err(err) => {
                tracing::debug!(error = %err, "streaming statement failed");
                let svc = self.get_svc();
                let _exec = svc.lock_exec();
                Self::undo(&svc, mark);
                Err(err)
            }
        }
    }
}
