use crate::DocId;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source record could not be turned into a [`crate::Document`].
    #[error("malformed document at position {position}: {reason}")]
    MalformedDocument { position: usize, reason: String },

    #[error("document id {0} appears more than once in the corpus")]
    DuplicateDocument(DocId),

    /// A single-term operation received text that does not reduce to exactly one term.
    #[error("invalid term {input:?}: expected exactly one token, got {tokens:?}")]
    InvalidTerm { input: String, tokens: Vec<String> },

    #[error("unknown document id {0}")]
    UnknownDocument(DocId),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("non-finite score {score} for document {doc_id}")]
    InvalidScore { doc_id: DocId, score: f64 },

    /// No complete snapshot on disk; the index has to be rebuilt.
    #[error("index snapshot not built: {} is missing", path.display())]
    MissingSnapshot { path: PathBuf },

    #[error("corrupt index snapshot at {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptSnapshot { path: path.into(), reason: reason.into() }
    }

    /// True when the caller should rebuild instead of treating this as a failure.
    pub fn is_missing_snapshot(&self) -> bool {
        matches!(self, Error::MissingSnapshot { .. })
    }

    /// True for errors caused by the caller's input rather than the environment.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::MalformedDocument { .. }
                | Error::DuplicateDocument(_)
                | Error::InvalidTerm { .. }
                | Error::InvalidParameter { .. }
                | Error::InvalidScore { .. }
        )
    }
}
