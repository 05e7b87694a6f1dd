#![cfg_attr(not(doctest), doc=include_str!("../README.md"))]

#![cfg_attr(docsrs, feature(doc_cfg))]

mod err;
mod types;
mod env;
mod session;
mod stmt;
mod lob;

pub mod server;
pub mod memdb;

pub use err::{Error, ErrorKind};
pub use env::{Config, Environment, DEFAULT_MAX_INLINE_SIZE, MAX_LOB_CHUNK_SIZE};
pub use session::Session;
pub use types::{SqlType, Direction, LobKind, Encoding, Value, LobSource};
pub use lob::{Lob, LobReader, LobWriter, LobEvents, LobEvent, LobState, Chunk};
pub use stmt::{
    BindDescriptor, Binds, Slot, NormalizedBind, validate_and_normalize, Materialization, materialize,
    ExecOptions, ExecutionResult, OutBinds, OutValue, Rows, Row, FromSql,
};
pub use server::{Locator, ServerValue};

pub type Result<T> = std::result::Result<T, Error>;

/**
    Returns a new environment configured from the process environment.

    While there can be multiple environments, most applications most likely will
    need only one. It might be created either in `main` function:

    ```
    use lobbind::memdb::MemoryServer;
    use std::sync::Arc;

    fn main() -> lobbind::Result<()> {
        let env = lobbind::env()?;
        let session = env.connect(Arc::new(MemoryServer::new()));
        // ...
        Ok(())
    }
    ```

    or it might be created statically:

    ```
    use lobbind::{Environment, Result};
    use once_cell::sync::OnceCell;

    fn lobbind_env() -> Result<&'static Environment> {
        static ENV: OnceCell<Environment> = OnceCell::new();
        ENV.get_or_try_init(||
            lobbind::env()
        )
    }

    fn main() -> Result<()> {
        let env = lobbind_env()?;
        assert!(env.config().lob_chunk_size().map_or(true, |size| size > 0));
        Ok(())
    }
    ```
*/
pub fn env() -> Result<Environment> {
    Environment::new()
}
