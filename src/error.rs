use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `wytar` crate.
#[derive(Debug, Error)]
pub enum TarError {
    /// The archive chain handed to an operation is not usable for it.
    #[error("invalid archive chain: {0}")]
    InvalidChain(&'static str),

    /// `lstat` failed on a path that was to be archived.
    #[error("cannot stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The filesystem object has a type ustar cannot represent (e.g. a socket).
    #[error("cannot archive '{}': unsupported file type ({kind})", path.display())]
    UnsupportedType { path: PathBuf, kind: &'static str },

    /// The target of a symbolic link could not be read.
    #[error("could not read link '{}': {source}", path.display())]
    LinkRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Repositioning the archive stream failed.
    #[error("unable to seek archive to offset {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The current position of the archive stream could not be queried.
    #[error("unable to determine archive stream position: {0}")]
    Position(#[source] std::io::Error),

    /// An I/O call transferred fewer bytes than requested.
    #[error("short transfer on '{}': expected {expected} bytes, got {actual}", path.display())]
    ShortTransfer {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the archive stream itself failed.
    #[error("archive stream I/O error at offset {offset}: {source}")]
    Stream {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The filesystem object to be created is already present.
    #[error("'{}' already exists", path.display())]
    AlreadyExists { path: PathBuf },

    /// An entry without a name cannot be extracted.
    #[error("attempted to extract entry with empty name")]
    EmptyName,

    /// The entry name would leave the extraction root.
    #[error("path traversal attempt in archive: {}", .0.display())]
    PathTraversal(PathBuf),

    /// One or more entries failed to extract; each failure has been logged.
    #[error("{failed} of {total} entries failed to extract")]
    Extract { failed: usize, total: usize },
}

impl TarError {
    /// Wraps an I/O error with the path it happened on, mapping "already exists" to its own
    /// variant so callers can decide whether to swallow it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::AlreadyExists => TarError::AlreadyExists { path },
            _ => TarError::Io { path, source },
        }
    }

    /// Returns true for the error that non-regular entry creation tolerates.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, TarError::AlreadyExists { .. })
    }
}

pub type Result<T, E = TarError> = std::result::Result<T, E>;
