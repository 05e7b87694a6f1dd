//! Engine environment and configuration

use crate::{Error, Result, Session, server::Backend};
use std::{str::FromStr, sync::Arc};

/// Default upper limit of an INLINE payload. Independent of the legacy 32K/64K bind ceilings.
pub const DEFAULT_MAX_INLINE_SIZE : usize = 1 << 30;

/// Largest accepted LOB transfer unit
pub const MAX_LOB_CHUNK_SIZE : usize = 1 << 30;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    lob_chunk_size: Option<usize>,
    max_inline_size: usize,
    auto_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { lob_chunk_size: None, max_inline_size: DEFAULT_MAX_INLINE_SIZE, auto_commit: false }
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse::<T>()
            .map(Some)
            .map_err(|_| Error::msg(format!("{} has invalid value '{}'", name, val))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /**
        Creates configuration from the process environment.

        Recognized variables:
        - `LOBBIND_LOB_CHUNK_SIZE` - LOB transfer unit in characters (CLOB) or bytes (BLOB)
        - `LOBBIND_MAX_INLINE_SIZE` - upper limit of an inline string or buffer bind
        - `LOBBIND_AUTOCOMMIT` - `true` or `false`

        Variables that are not set keep their default values.
    */
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(size) = env_var::<usize>("LOBBIND_LOB_CHUNK_SIZE")? {
            cfg = cfg.with_lob_chunk_size(size)?;
        }
        if let Some(size) = env_var::<usize>("LOBBIND_MAX_INLINE_SIZE")? {
            cfg = cfg.with_max_inline_size(size);
        }
        if let Some(auto_commit) = env_var::<bool>("LOBBIND_AUTOCOMMIT")? {
            cfg = cfg.with_auto_commit(auto_commit);
        }
        Ok(cfg)
    }

    /// Sets the LOB transfer unit. Zero and sizes above `MAX_LOB_CHUNK_SIZE` are rejected.
    pub fn with_lob_chunk_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err( Error::new("LOB chunk size must be positive") );
        }
        if size > MAX_LOB_CHUNK_SIZE {
            return Err( Error::msg(format!("LOB chunk size {} exceeds {}", size, MAX_LOB_CHUNK_SIZE)) );
        }
        self.lob_chunk_size = Some(size);
        Ok(self)
    }

    pub fn with_max_inline_size(mut self, size: usize) -> Self {
        self.max_inline_size = size;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// LOB transfer unit. `None` means the server reported chunk size is used.
    pub fn lob_chunk_size(&self) -> Option<usize> {
        self.lob_chunk_size
    }

    pub fn max_inline_size(&self) -> usize {
        self.max_inline_size
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }
}

/// Represents the engine environment from which sessions are created.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    config: Config,
}

impl Environment {
    /**
        Returns a new environment configured from the process environment.

        # Example

        ```
        let env = lobbind::Environment::new()?;
        assert!(env.config().max_inline_size() > 65535);
        # Ok::<(),lobbind::Error>(())
        ```
    */
    pub fn new() -> Result<Self> {
        Ok(Self { config: Config::from_env()? })
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a new session over the provided database backend.
    pub fn connect(&self, backend: Arc<dyn Backend>) -> Session {
        Session::new(backend, self.config.clone())
    }
}
