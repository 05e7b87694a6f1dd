//! LOB read and write streams

use super::{Chunk, Lob, LobEvent, LobState};
use crate::{Error, Result, err::ORA_LOCATOR_SPANS_TX, types::{Encoding, LobKind}};
use std::io::{self, Read};

fn invalid_text(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, err))
}

/**
    Consumer side of a LOB.

    Content is produced as a lazy, finite, non-restartable sequence of chunks.
    The chunk size is the LOB transfer unit and is not caller controlled.
    Reaching the end of data closes the stream and releases its locator.
*/
pub struct LobReader {
    lob: Option<Lob>,
    kind: LobKind,
    state: LobState,
    encoding: Option<Encoding>,
    /// Characters (CLOB) or bytes (BLOB) consumed so far
    offset: u64,
    total: Option<u64>,
}

impl LobReader {
    pub(super) fn new(lob: Lob) -> Self {
        let kind = lob.kind();
        Self { lob: Some(lob), kind, state: LobState::OpenForRead, encoding: None, offset: 0, total: None }
    }

    pub fn state(&self) -> LobState {
        self.state
    }

    pub fn kind(&self) -> LobKind {
        self.kind
    }

    /**
        Requests chunks to be delivered as decoded text rather than raw bytes.
        Only character LOBs can be decoded.
    */
    pub fn set_encoding(&mut self, encoding: Encoding) -> Result<()> {
        if self.kind != LobKind::Clob {
            return Err( Error::new("encoding can only be set on a CLOB stream") );
        }
        self.check_readable()?;
        self.encoding = Some(encoding);
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        match self.state {
            LobState::Closed  => Err( Error::invalid_lob("stream is closed") ),
            LobState::Errored => Err( Error::stream_errored() ),
            _ => Ok(()),
        }
    }

    /**
        Returns the next chunk or `None` at the end of data.

        # Failures

        - Any I/O failure puts the stream into the `Errored` state. The failure is returned once,
          subsequent reads fail with `NJS-084`.
        - Reading a closed stream fails with `NJS-022`.
    */
    pub fn read(&mut self) -> Result<Option<Chunk>> {
        self.check_readable()?;
        match self.fetch() {
            Ok(Some(chunk)) => {
                self.state = LobState::Draining;
                Ok(Some(chunk))
            }
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "LOB read failed");
                self.state = LobState::Errored;
                self.lob = None;
                Err(err)
            }
        }
    }

    fn fetch(&mut self) -> Result<Option<Chunk>> {
        let lob = match self.lob.as_ref() {
            Some(lob) => lob,
            None => return Err( Error::invalid_lob("locator is released") ),
        };
        let total = match self.total {
            Some(total) => total,
            None => {
                let total = lob.len()?;
                self.total = Some(total);
                total
            }
        };
        if self.offset >= total {
            return Ok(None);
        }
        let amount = std::cmp::min(lob.chunk_size()? as u64, total - self.offset) as usize;
        let data = lob.svc().backend().lob_read(lob.locator(), self.offset, amount)?;
        if data.is_empty() {
            return Ok(None);
        }
        let chunk = match self.kind {
            LobKind::Blob => {
                self.offset += data.len() as u64;
                Chunk::Bytes(data)
            }
            LobKind::Clob => {
                let text = String::from_utf8(data).map_err(invalid_text)?;
                self.offset += text.chars().count() as u64;
                match self.encoding {
                    Some(Encoding::Utf8) => Chunk::Text(text),
                    None => Chunk::Bytes(text.into_bytes()),
                }
            }
        };
        tracing::trace!(offset = self.offset, len = chunk.len(), "LOB chunk read");
        Ok(Some(chunk))
    }

    fn finish(&mut self) {
        self.state = LobState::Closed;
        self.lob = None;
    }

    /**
        Closes the stream before its natural end. The locator reference is released.
        Closing an already closed stream is a no-op.
    */
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            LobState::Errored => Err( Error::stream_errored() ),
            _ => {
                self.finish();
                Ok(())
            }
        }
    }

    /// Drains the stream into a string. Only valid for CLOBs.
    pub fn read_to_string(mut self) -> Result<String> {
        if self.kind != LobKind::Clob {
            return Err( Error::new("BLOB content cannot be read as text") );
        }
        self.set_encoding(Encoding::Utf8)?;
        let mut text = String::new();
        while let Some(chunk) = self.read()? {
            match chunk {
                Chunk::Text(txt) => text.push_str(&txt),
                Chunk::Bytes(bin) => text.push_str(std::str::from_utf8(&bin).map_err(invalid_text)?),
            }
        }
        Ok(text)
    }

    /// Drains the stream into a byte vector.
    pub fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.read()? {
            data.extend_from_slice(chunk.as_bytes());
        }
        Ok(data)
    }

    /// Converts the stream into a sequence of `data`, `end`, `close` or `error` notifications.
    pub fn events(self) -> LobEvents {
        LobEvents { reader: self, ended: false, done: false }
    }
}

impl Iterator for LobReader {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.is_terminal() {
            return None;
        }
        self.read().transpose()
    }
}

/// Notification sequence of a [`LobReader`].
pub struct LobEvents {
    reader: LobReader,
    ended: bool,
    done: bool,
}

impl LobEvents {
    pub fn state(&self) -> LobState {
        self.reader.state()
    }
}

impl Iterator for LobEvents {
    type Item = LobEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.ended {
            self.done = true;
            return Some(LobEvent::Close);
        }
        match self.reader.read() {
            Ok(Some(chunk)) => Some(LobEvent::Data(chunk)),
            Ok(None) => {
                self.ended = true;
                Some(LobEvent::End)
            }
            Err(err) => {
                self.done = true;
                Some(LobEvent::Error(err))
            }
        }
    }
}

/**
    Producer side of a LOB.

    Chunks are buffered up to the LOB transfer unit before they are written to the
    locator. `close` flushes whatever is buffered. The transaction that owns the
    locator cannot be committed until the writer is closed.
*/
#[derive(Debug)]
pub struct LobWriter {
    lob: Option<Lob>,
    kind: LobKind,
    state: LobState,
    generation: u64,
    /// Characters (CLOB) or bytes (BLOB) written so far
    offset: u64,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl Drop for LobWriter {
    fn drop(&mut self) {
        if self.state == LobState::OpenForWrite {
            tracing::warn!(offset = self.offset, "LOB write stream dropped before it was closed");
            if let Some(lob) = self.lob.as_ref() {
                lob.svc().writer_failed(self.generation);
            }
        }
    }
}

impl LobWriter {
    pub(super) fn new(lob: Lob) -> Result<Self> {
        let chunk_size = lob.chunk_size()?;
        let generation = lob.svc().writer_opened();
        let kind = lob.kind();
        Ok(Self {
            lob: Some(lob), kind, generation, chunk_size,
            state: LobState::OpenForWrite, offset: 0,
            buf: Vec::with_capacity(chunk_size),
        })
    }

    pub fn state(&self) -> LobState {
        self.state
    }

    pub fn kind(&self) -> LobKind {
        self.kind
    }

    pub(super) fn check_writable(&self) -> Result<()> {
        match self.state {
            LobState::Errored => Err( Error::stream_errored() ),
            LobState::OpenForWrite => Ok(()),
            _ => Err( Error::invalid_lob("stream is closed") ),
        }
    }

    /// Moves the stream into the `Errored` state and returns the error to report.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if self.state == LobState::OpenForWrite {
            tracing::warn!(error = %err, offset = self.offset, "LOB write failed");
            self.state = LobState::Errored;
            if let Some(lob) = self.lob.take() {
                lob.svc().writer_failed(self.generation);
            }
        }
        err
    }

    /**
        Appends a chunk. CLOB chunks must be UTF-8. A multi-byte character may be split
        between consecutive chunks.
    */
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check_writable()?;
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.chunk_size {
            if let Err(err) = self.flush_buffered(false) {
                return Err(self.fail(err));
            }
        }
        Ok(data.len())
    }

    /// Appends text to a CLOB.
    pub fn write_str(&mut self, text: &str) -> Result<usize> {
        self.write(text.as_bytes())
    }

    /// Returns the length of the buffered prefix that can be sent now.
    fn ready_len(&self, all: bool) -> Result<usize> {
        match self.kind {
            LobKind::Blob => Ok(
                if all { self.buf.len() } else { self.buf.len() - self.buf.len() % self.chunk_size }
            ),
            LobKind::Clob => match std::str::from_utf8(&self.buf) {
                Ok(_) => Ok(self.buf.len()),
                // incomplete trailing character, wait for the rest of it
                Err(err) if err.error_len().is_none() && !all => Ok(err.valid_up_to()),
                Err(err) => Err(invalid_text(err)),
            },
        }
    }

    fn flush_buffered(&mut self, all: bool) -> Result<()> {
        let ready = self.ready_len(all)?;
        let lob = match self.lob.as_ref() {
            Some(lob) => lob,
            None => return Err( Error::invalid_lob("locator is released") ),
        };
        let mut start = 0;
        while start < ready {
            let mut end = std::cmp::min(start + self.chunk_size, ready);
            if self.kind == LobKind::Clob {
                // pieces must end on a character boundary
                while end < ready && (self.buf[end] & 0xC0) == 0x80 {
                    end += 1;
                }
            }
            if lob.svc().generation() != self.generation {
                return Err( Error::oracle(ORA_LOCATOR_SPANS_TX, "LOB locators cannot span transactions") );
            }
            let written = lob.svc().backend().lob_write(lob.locator(), self.offset, &self.buf[start..end])?;
            self.offset += written;
            tracing::trace!(offset = self.offset, len = end - start, "LOB chunk written");
            start = end;
        }
        self.buf.drain(..ready);
        Ok(())
    }

    /**
        Signals the end of input. Buffered chunks are flushed to the locator, then the
        stream moves to the `Closed` state and the locator is released.
    */
    pub fn close(&mut self) -> Result<()> {
        self.check_writable()?;
        if let Err(err) = self.flush_buffered(true) {
            return Err(self.fail(err));
        }
        self.state = LobState::Closed;
        if let Some(lob) = self.lob.take() {
            lob.svc().writer_closed(self.generation);
        }
        tracing::debug!(len = self.offset, "LOB write stream closed");
        Ok(())
    }

    /**
        Copies everything the source produces into the LOB and closes the stream.
        Returns the number of bytes copied.

        A source read failure puts the stream into the `Errored` state.
    */
    pub fn pipe_from<R: Read + ?Sized>(&mut self, src: &mut R) -> Result<u64> {
        self.check_writable()?;
        let mut piece = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let len = match src.read(&mut piece) {
                Ok(0) => break,
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.fail(Error::Io(err))),
            };
            self.write(&piece[..len])?;
            total += len as u64;
        }
        self.close()?;
        Ok(total)
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl io::Write for LobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        LobWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        // data is flushed in transfer units; the tail is flushed by `close`
        Ok(())
    }
}
