use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, KatError>;

/// Exit status used when the run was cancelled by SIGINT (128 + 2).
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Debug, thiserror::Error)]
pub enum KatError {
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot probe {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("encoding {} failed with exit code {code}", source_path.display())]
    Encode { source_path: PathBuf, code: i32 },

    #[error(
        "output {} rejected: duration {actual}s differs from source {expected}s",
        path.display()
    )]
    Validation {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("interrupted")]
    Interrupted,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KatError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn already_exists(path: impl Into<PathBuf>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            KatError::Interrupted => INTERRUPTED_EXIT_CODE,
            _ => 1,
        }
    }
}
