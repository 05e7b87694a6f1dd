/*!
Nonblocking mode LOB methods.

Locator I/O itself is synchronous (it is serialized by the session anyway). Only
the source that feeds a LOB write stream is read asynchronously, so that a slow
producer, like a file or a socket, does not block the executor thread while the
LOB is being filled.
*/

use super::LobWriter;
use crate::{Error, Result};
use tokio_rt::io::{AsyncRead, AsyncReadExt};

impl LobWriter {
    /**
        Copies everything the asynchronous source produces into the LOB and closes
        the stream. Returns the number of bytes copied.

        A source read failure puts the stream into the `Errored` state.

        # Example

        ```
        use lobbind::{Lob, LobKind, memdb::MemoryServer};
        use std::sync::Arc;

        # let rt = tokio_rt::runtime::Builder::new_current_thread().build()?;
        # rt.block_on(async {
        let session = lobbind::env()?.connect(Arc::new(MemoryServer::new()));
        let lob = Lob::temp(&session, LobKind::Blob)?;
        let copy = lob.try_clone()?;
        let mut writer = lob.writer()?;
        let mut src: &[u8] = &[1, 2, 3, 4, 5];
        let len = writer.pipe_from_async(&mut src).await?;
        assert_eq!(len, 5);
        assert_eq!(copy.read_to_vec()?, [1, 2, 3, 4, 5]);
        # Ok::<(),lobbind::Error>(())
        # })?;
        # Ok::<(),Box<dyn std::error::Error>>(())
        ```
    */
    pub async fn pipe_from_async<R>(&mut self, src: &mut R) -> Result<u64>
    where R: AsyncRead + Unpin + ?Sized
    {
        self.check_writable()?;
        let mut piece = vec![0u8; self.chunk_size()];
        let mut total = 0u64;
        loop {
            let len = match src.read(&mut piece).await {
                Ok(0) => break,
                Ok(len) => len,
                Err(err) => return Err(self.fail(Error::Io(err))),
            };
            self.write(&piece[..len])?;
            total += len as u64;
        }
        self.close()?;
        Ok(total)
    }
}
