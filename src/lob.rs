//! Locator backed large objects (LOBs) and their streams.

mod blocking;

#[cfg(feature="nonblocking")]
#[cfg_attr(docsrs, doc(cfg(feature="nonblocking")))]
mod nonblocking;

pub use blocking::{LobReader, LobWriter, LobEvents};

use crate::{Error, Result, Session, env::MAX_LOB_CHUNK_SIZE, err::ORA_LOCATOR_SPANS_TX, server::Locator, session::SvcCtx, types::LobKind};
use once_cell::sync::OnceCell;
use std::{fmt, sync::Arc};

/// Lifecycle state of a LOB stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobState {
    /// Consumer role, no data has been produced yet
    OpenForRead,
    /// Producer role, accepting chunks
    OpenForWrite,
    /// Consumer role, at least one chunk has been produced
    Draining,
    /// Terminal. The stream reached its end or was closed explicitly.
    Closed,
    /// Terminal. The stream failed and reported its error.
    Errored,
}

impl LobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LobState::Closed | LobState::Errored)
    }
}

/// A piece of LOB content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Vec<u8>),
    /// Decoded CLOB text, produced when an encoding was requested
    Text(String),
}

impl Chunk {
    /// Returns the chunk length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Chunk::Bytes(bin) => bin.len(),
            Chunk::Text(txt)  => txt.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Chunk::Bytes(bin) => bin.as_slice(),
            Chunk::Text(txt)  => txt.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Chunk::Bytes(bin) => bin,
            Chunk::Text(txt)  => txt.into_bytes(),
        }
    }
}

/// Notifications produced by a LOB read stream.
#[derive(Debug)]
pub enum LobEvent {
    Data(Chunk),
    /// Reported at most once. No events follow it.
    Error(Error),
    /// End of data
    End,
    /// The stream is closed and its locator released
    Close,
}

/**
    LOB locator.

    A `Lob` is a handle to a server side large object. It does not move any data by
    itself. Content is read through a [`LobReader`] and written through a [`LobWriter`],
    both of which take ownership of the locator, so that only one stream can use it.

    The locator reference is released when the `Lob` (or the stream that owns it)
    is dropped or closed.
*/
pub struct Lob {
    locator: Locator,
    svc: Arc<SvcCtx>,
    /// Transaction in which the locator was obtained
    generation: u64,
    chunk_size: OnceCell<usize>,
}

impl Drop for Lob {
    fn drop(&mut self) {
        self.svc.backend().lob_release(&self.locator);
    }
}

impl fmt::Debug for Lob {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lob")
            .field("locator", &self.locator)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Lob {
    pub(crate) fn make(locator: Locator, svc: Arc<SvcCtx>) -> Self {
        let generation = svc.generation();
        Self { locator, svc, generation, chunk_size: OnceCell::new() }
    }

    pub(crate) fn svc(&self) -> &SvcCtx {
        &self.svc
    }

    /**
        Creates a new temporary LOB.

        # Example

        ```
        use lobbind::{Lob, LobKind, memdb::MemoryServer};
        use std::sync::Arc;

        let session = lobbind::env()?.connect(Arc::new(MemoryServer::new()));
        let lob = Lob::temp(&session, LobKind::Clob)?;
        let mut writer = lob.writer()?;
        writer.write_str("Hello, World!")?;
        writer.close()?;
        # Ok::<(),lobbind::Error>(())
        ```
    */
    pub fn temp(session: &Session, kind: LobKind) -> Result<Self> {
        let locator = session.ctx().backend().lob_create_temporary(kind)?;
        Ok( Self::make(locator, session.get_svc()) )
    }

    /**
        Creates a new locator that points to the same LOB data as this one.
        Each locator holds its own reference, so the LOB stays alive until
        both are released.
    */
    pub fn try_clone(&self) -> Result<Self> {
        let locator = self.svc.backend().lob_assign(&self.locator)?;
        Ok( Self { locator, svc: self.svc.clone(), generation: self.generation, chunk_size: OnceCell::new() } )
    }

    pub fn kind(&self) -> LobKind {
        self.locator.kind
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /**
        Returns the length of a LOB.

        For character LOBs, it is the number of characters; for binary LOBs it is
        the number of bytes in the LOB.
    */
    pub fn len(&self) -> Result<u64> {
        self.svc.backend().lob_len(&self.locator)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok( self.len()? == 0 )
    }

    /**
        Returns the transfer unit used by streams of this LOB. It is either the configured
        chunk size or, when none was configured, the chunk size reported by the server.
        Streams allocate a buffer of this size, thus a reported size above
        `MAX_LOB_CHUNK_SIZE` is an error.
    */
    pub fn chunk_size(&self) -> Result<usize> {
        self.chunk_size.get_or_try_init(||
            match self.svc.config().lob_chunk_size() {
                Some(size) => Ok(size),
                None => match self.svc.backend().lob_chunk_size(&self.locator)? {
                    size if size > MAX_LOB_CHUNK_SIZE => Err( Error::msg(format!("server reported LOB chunk size {} exceeds {}", size, MAX_LOB_CHUNK_SIZE)) ),
                    size => Ok(size.max(1)),
                },
            }
        ).map(|size| *size)
    }

    /// Opens the LOB for reading. The returned stream is in the `OpenForRead` state.
    pub fn reader(self) -> LobReader {
        LobReader::new(self)
    }

    /**
        Opens the LOB for writing. The returned stream is in the `OpenForWrite` state.

        # Failures

        Returns `ORA-22990` if the locator was obtained in a transaction that has
        since ended.
    */
    pub fn writer(self) -> Result<LobWriter> {
        if self.generation != self.svc.generation() {
            return Err( Error::oracle(ORA_LOCATOR_SPANS_TX, "LOB locators cannot span transactions") );
        }
        LobWriter::new(self)
    }

    /// Reads the entire CLOB content as text.
    pub fn read_to_string(self) -> Result<String> {
        self.reader().read_to_string()
    }

    /// Reads the entire LOB content as bytes.
    pub fn read_to_vec(self) -> Result<Vec<u8>> {
        self.reader().read_to_vec()
    }
}
