use std::{cmp, fmt, io};

/// NJS-011: encountered bind value and type mismatch
pub(crate) const NJS_BIND_TYPE_MISMATCH  : u16 = 11;
/// NJS-012: encountered invalid bind datatype
pub(crate) const NJS_INVALID_BIND_TYPE   : u16 = 12;
/// NJS-016: buffer is too small for OUT binds
pub(crate) const NJS_BUFFER_TOO_SMALL    : u16 = 16;
/// NJS-022: invalid Lob
pub(crate) const NJS_INVALID_LOB         : u16 = 22;
/// NJS-041: cannot commit while a LOB write stream is open
pub(crate) const NJS_LOB_WRITE_PENDING   : u16 = 41;
/// NJS-084: LOB stream has already reported an error
pub(crate) const NJS_STREAM_ERRORED      : u16 = 84;

/// ORA-00932: inconsistent datatypes
pub(crate) const ORA_INCONSISTENT_TYPES  : i32 = 932;
/// ORA-01460: unimplemented or unreasonable conversion requested
pub(crate) const ORA_BAD_CONVERSION      : i32 = 1460;
/// ORA-06502: PL/SQL: numeric or value error
pub(crate) const ORA_NUMERIC_OR_VALUE    : i32 = 6502;
/// ORA-06550: PL/SQL compilation error (unknown statement or parameter)
pub(crate) const ORA_PLSQL_COMPILATION   : i32 = 6550;
/// ORA-00942: table or view does not exist
pub(crate) const ORA_NO_SUCH_TABLE       : i32 = 942;
/// ORA-22922: nonexistent LOB value
pub(crate) const ORA_NONEXISTENT_LOB     : i32 = 22922;
/// ORA-22990: LOB locators cannot span transactions
pub(crate) const ORA_LOCATOR_SPANS_TX    : i32 = 22990;

/// Stable classification of an [`Error`]. Callers should branch on this
/// rather than on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A bind value's primitive kind is incompatible with its declared type
    BindTypeMismatch,
    /// A non-coercible complex object was bound as a string or a buffer
    BindDatatypeInvalid,
    /// The declared `max_size` cannot hold the value
    InsufficientBuffer,
    /// The server cannot perform a scalar to LOB (or back) conversion
    ConversionUnsupported,
    /// The LOB stream has already failed and reported its error
    StreamAlreadyErrored,
    /// Generic server side numeric or value error
    NumericOrValue,
    /// The LOB handle is closed, of the wrong role, or its locator is gone
    InvalidLob,
    /// A commit was requested while a LOB write is open or has failed
    LobWritePending,
    /// Reading the data source that feeds a LOB failed
    Io,
    /// Any other server reported error
    Server,
    /// Misuse of the API
    Interface,
}

/// Represents possible errors returned from lobbind
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Interface(String),
    #[error("NJS-{code:03}: {msg}")]
    Driver { code: u16, msg: String },
    #[error("ORA-{0:05}: {1}")]
    Oracle(i32, String),
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl cmp::PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::Oracle(this_code, _), Error::Oracle(other_code, _)) => this_code == other_code,
            (Error::Driver { code: this_code, .. }, Error::Driver { code: other_code, .. }) => this_code == other_code,
            (Error::Interface(this_msg), Error::Interface(other_msg)) => this_msg == other_msg,
            (Error::Io(this_err), Error::Io(other_err)) => this_err.kind() == other_err.kind(),
            _ => false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            err => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}

impl Error {
    pub(crate) fn new(msg: &str) -> Self {
        Error::Interface( msg.to_owned() )
    }

    pub(crate) fn msg(msg: String) -> Self {
        Error::Interface(msg)
    }

    pub(crate) fn driver(code: u16, msg: impl fmt::Display) -> Self {
        Error::Driver { code, msg: msg.to_string() }
    }

    pub(crate) fn oracle(code: i32, msg: impl fmt::Display) -> Self {
        Error::Oracle(code, msg.to_string())
    }

    pub(crate) fn bind_type_mismatch(param: impl fmt::Display) -> Self {
        Self::driver(NJS_BIND_TYPE_MISMATCH, format_args!("encountered bind value and type mismatch in parameter {}", param))
    }

    pub(crate) fn invalid_bind_type(param: impl fmt::Display) -> Self {
        Self::driver(NJS_INVALID_BIND_TYPE, format_args!("encountered invalid bind datatype in parameter {}", param))
    }

    pub(crate) fn buffer_too_small() -> Self {
        Self::driver(NJS_BUFFER_TOO_SMALL, "buffer is too small for OUT binds")
    }

    pub(crate) fn invalid_lob(reason: &str) -> Self {
        Self::driver(NJS_INVALID_LOB, format_args!("invalid Lob: {}", reason))
    }

    pub(crate) fn stream_errored() -> Self {
        Self::driver(NJS_STREAM_ERRORED, "LOB stream has already reported an error")
    }

    pub(crate) fn numeric_or_value(detail: &str) -> Self {
        Self::oracle(ORA_NUMERIC_OR_VALUE, format_args!("PL/SQL: numeric or value error: {}", detail))
    }

    pub(crate) fn bad_conversion() -> Self {
        Self::oracle(ORA_BAD_CONVERSION, "unimplemented or unreasonable conversion requested")
    }

    /// Returns the stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Interface(_) => ErrorKind::Interface,
            Error::Io(_) => ErrorKind::Io,
            Error::Driver { code, .. } => match *code {
                NJS_BIND_TYPE_MISMATCH => ErrorKind::BindTypeMismatch,
                NJS_INVALID_BIND_TYPE  => ErrorKind::BindDatatypeInvalid,
                NJS_BUFFER_TOO_SMALL   => ErrorKind::InsufficientBuffer,
                NJS_STREAM_ERRORED     => ErrorKind::StreamAlreadyErrored,
                NJS_LOB_WRITE_PENDING  => ErrorKind::LobWritePending,
                NJS_INVALID_LOB        => ErrorKind::InvalidLob,
                _                      => ErrorKind::Interface,
            },
            Error::Oracle(code, _) => match *code {
                ORA_BAD_CONVERSION     => ErrorKind::ConversionUnsupported,
                ORA_NUMERIC_OR_VALUE   => ErrorKind::NumericOrValue,
                ORA_NONEXISTENT_LOB    => ErrorKind::InvalidLob,
                ORA_LOCATOR_SPANS_TX   => ErrorKind::InvalidLob,
                _                      => ErrorKind::Server,
            },
        }
    }

    /**
        Returns the stable code of the error, i.e. `NJS-011` or `ORA-01460`.
        Interface and I/O errors return an empty string.
    */
    pub fn code(&self) -> String {
        match self {
            Error::Driver { code, .. } => format!("NJS-{:03}", code),
            Error::Oracle(code, _)     => format!("ORA-{:05}", code),
            _                          => String::new(),
        }
    }

    /// Returns `true` if the error was reported by the server rather than detected by the client.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Oracle(..))
    }
}
