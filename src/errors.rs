//! Error taxonomy for the storage/execution core.
//!
//! Parse/prepare and execute failures are ordinary `Result` values the
//! caller is expected to handle and report. `Fatal` models a core
//! invariant violation (corrupt page geometry, I/O failure mid-flush,
//! an out-of-bounds page index): the storage layer never panics or exits
//! on its own, it returns `Error::Fatal`, and the process entry point is
//! the one place that turns that into a logged `process::exit`.
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Tokenizer/parser/validator failures.
    Syntax(String),
    /// Schema or row construction failures (bad column, bad type, too many columns).
    Schema(String),
    /// Catalog/table-level failures (not found, already exists, table full).
    Db(String),
    /// Binary (de)serialization failures (catalog sidecar, row codec).
    Encoding(String),
    /// Poisoned table mutex.
    LockTable(String),
    /// Attempted insert of a key already present.
    DuplicateKey(u32),
    /// Core invariant violated; the process must not continue.
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Syntax(msg) => write!(f, "syntax error: {}", msg),
            Error::Schema(msg) => write!(f, "schema error: {}", msg),
            Error::Db(msg) => write!(f, "{}", msg),
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
            Error::LockTable(msg) => write!(f, "lock error: {}", msg),
            Error::DuplicateKey(id) => write!(f, "duplicate key: {}", id),
            Error::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Error {
        Error::Encoding(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Error {
        Error::Encoding(err.to_string())
    }
}

/// Build an `Error` variant from a format string, e.g. `err!(Db, "table '{}' not found", name)`.
#[macro_export]
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($($arg)*))
    };
}

/// Log and terminate the process on a fatal core-invariant violation.
/// The only caller of this should be a process entry point observing
/// `Error::Fatal` bubble out of the storage layer.
pub fn die(e: &Error) -> ! {
    tracing::error!("fatal error, terminating: {}", e);
    std::process::exit(1);
}
