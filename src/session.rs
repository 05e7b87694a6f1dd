//! User Session

use crate::{Config, Error, Result, err::NJS_LOB_WRITE_PENDING, server::{Backend, SavepointId}};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Bookkeeping of the current transaction.
#[derive(Debug, Default)]
struct TxState {
    /// Incremented every time a transaction ends
    generation: u64,
    /// LOB write streams that have not reached `closed` yet
    open_writers: usize,
    /// LOB write streams that failed within this transaction
    failed_writers: usize,
}

/// Point of the current transaction a statement can be undone to.
#[derive(Debug)]
pub(crate) struct StatementMark {
    generation: u64,
    failed_writers: usize,
    savepoint: SavepointId,
}

/// Representation of the service context.
/// It is behind `Arc` as LOB handles need it to outlive the `Session`.
pub(crate) struct SvcCtx {
    backend: Arc<dyn Backend>,
    config: Config,
    /// Serializes statement execution and transaction control
    exec: Mutex<()>,
    tx: Mutex<TxState>,
}

impl Drop for SvcCtx {
    fn drop(&mut self) {
        // best effort, nothing we can do if it fails
        let _ = self.backend.rollback();
    }
}

impl SvcCtx {
    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn lock_exec(&self) -> MutexGuard<'_, ()> {
        self.exec.lock()
    }

    /// Returns the generation of the current transaction.
    pub(crate) fn generation(&self) -> u64 {
        self.tx.lock().generation
    }

    /// Registers a new write stream and returns the generation it belongs to.
    pub(crate) fn writer_opened(&self) -> u64 {
        let mut tx = self.tx.lock();
        tx.open_writers += 1;
        tx.generation
    }

    pub(crate) fn writer_closed(&self, generation: u64) {
        let mut tx = self.tx.lock();
        if tx.generation == generation {
            tx.open_writers = tx.open_writers.saturating_sub(1);
        }
    }

    pub(crate) fn writer_failed(&self, generation: u64) {
        let mut tx = self.tx.lock();
        if tx.generation == generation {
            tx.open_writers = tx.open_writers.saturating_sub(1);
            tx.failed_writers += 1;
        }
    }

    /// Commits the current transaction. The caller must hold the execution lock.
    pub(crate) fn commit(&self) -> Result<()> {
        let mut tx = self.tx.lock();
        if tx.open_writers > 0 {
            return Err( Error::driver(NJS_LOB_WRITE_PENDING, format_args!("cannot commit while {} LOB write stream(s) are open", tx.open_writers)) );
        }
        if tx.failed_writers > 0 {
            return Err( Error::driver(NJS_LOB_WRITE_PENDING, "a LOB write stream failed in this transaction, it must be rolled back") );
        }
        self.backend.commit()?;
        tx.generation += 1;
        tracing::debug!(generation = tx.generation, "committed");
        Ok(())
    }

    /// Marks the state the next statement starts from. The caller must hold the execution lock.
    pub(crate) fn mark(&self) -> Result<StatementMark> {
        let tx = self.tx.lock();
        let savepoint = self.backend.savepoint()?;
        Ok(StatementMark { generation: tx.generation, failed_writers: tx.failed_writers, savepoint })
    }

    /**
        Undoes the effects of a failed statement, including the failures of the write
        streams it opened, and keeps the rest of the transaction. Nothing is done if the
        transaction has ended since the mark was taken. The caller must hold the execution lock.
    */
    pub(crate) fn undo(&self, mark: StatementMark) -> Result<()> {
        let mut tx = self.tx.lock();
        if tx.generation != mark.generation {
            return Ok(());
        }
        self.backend.rollback_to(mark.savepoint)?;
        tx.failed_writers = mark.failed_writers;
        tracing::debug!(generation = tx.generation, savepoint = mark.savepoint, "statement undone");
        Ok(())
    }

    /// Keeps the effects of a successful statement.
    pub(crate) fn release(&self, mark: StatementMark) {
        let tx = self.tx.lock();
        if tx.generation == mark.generation {
            if let Err(err) = self.backend.release_savepoint(mark.savepoint) {
                tracing::warn!(error = %err, savepoint = mark.savepoint, "failed to release the statement savepoint");
            }
        }
    }

    /// Rolls back the current transaction. The caller must hold the execution lock.
    pub(crate) fn rollback(&self) -> Result<()> {
        let mut tx = self.tx.lock();
        let res = self.backend.rollback();
        // Streams of the ended transaction are orphaned regardless of the outcome
        tx.generation += 1;
        tx.open_writers = 0;
        tx.failed_writers = 0;
        tracing::debug!(generation = tx.generation, "rolled back");
        res
    }
}

/// Represents a user session
pub struct Session {
    ctx: Arc<SvcCtx>,
}

impl Session {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        let ctx = SvcCtx {
            backend, config,
            exec: Mutex::new(()),
            tx: Mutex::new(TxState::default()),
        };
        Self { ctx: Arc::new(ctx) }
    }

    pub(crate) fn get_svc(&self) -> Arc<SvcCtx> {
        self.ctx.clone()
    }

    pub(crate) fn ctx(&self) -> &SvcCtx {
        &self.ctx
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /**
        Commits the current transaction.

        Commit is refused with `NJS-041` while any LOB write stream opened in this
        transaction has not reached `closed`, or if one of them failed. In the latter
        case the transaction must be rolled back.
    */
    pub fn commit(&self) -> Result<()> {
        let _exec = self.ctx.lock_exec();
        self.ctx.commit()
    }

    /**
        Rolls back the current transaction.

        LOB write streams still open in this transaction are orphaned: their
        locators no longer accept writes.
    */
    pub fn rollback(&self) -> Result<()> {
        let _exec = self.ctx.lock_exec();
        self.ctx.rollback()
    }

    /// Returns the number of LOB write streams in the current transaction that are not closed yet.
    pub fn pending_lob_writes(&self) -> usize {
        self.ctx.tx.lock().open_writers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, memdb::MemoryServer};

    #[test]
    fn commit_waits_for_writers() -> Result<()> {
        let session = Session::new(Arc::new(MemoryServer::new()), Config::default());
        let ctx = session.get_svc();

        let gen = ctx.writer_opened();
        assert_eq!(session.pending_lob_writes(), 1);
        let err = session.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LobWritePending);

        ctx.writer_closed(gen);
        assert_eq!(session.pending_lob_writes(), 0);
        session.commit()?;
        assert_eq!(ctx.generation(), gen + 1);
        Ok(())
    }

    #[test]
    fn failed_writer_forces_rollback() -> Result<()> {
        let session = Session::new(Arc::new(MemoryServer::new()), Config::default());
        let ctx = session.get_svc();

        let gen = ctx.writer_opened();
        ctx.writer_failed(gen);
        assert_eq!(session.commit().unwrap_err().kind(), ErrorKind::LobWritePending);

        session.rollback()?;
        session.commit()?;
        Ok(())
    }

    #[test]
    fn stale_writer_does_not_affect_next_transaction() -> Result<()> {
        let session = Session::new(Arc::new(MemoryServer::new()), Config::default());
        let ctx = session.get_svc();

        let gen = ctx.writer_opened();
        session.rollback()?;
        let next = ctx.writer_opened();
        ctx.writer_failed(gen);
        assert_eq!(session.pending_lob_writes(), 1);
        ctx.writer_closed(next);
        session.commit()?;
        Ok(())
    }

    #[test]
    fn undo_forgives_failures_after_the_mark() -> Result<()> {
        let session = Session::new(Arc::new(MemoryServer::new()), Config::default());
        let ctx = session.get_svc();

        let open = ctx.writer_opened();
        let mark = ctx.mark()?;
        let gen = ctx.writer_opened();
        ctx.writer_failed(gen);
        ctx.undo(mark)?;
        // the stream opened before the mark is still pending
        assert_eq!(session.pending_lob_writes(), 1);
        ctx.writer_closed(open);
        session.commit()?;

        // a mark of an ended transaction is ignored
        let mark = ctx.mark()?;
        session.rollback()?;
        ctx.undo(mark)?;
        Ok(())
    }
}
