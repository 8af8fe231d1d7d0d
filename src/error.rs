use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the corpus, training, vocabulary and evaluation stages.
#[derive(Debug, Error)]
pub enum WordvecError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot read corpus file {path}: {source}")]
    Corpus { path: PathBuf, source: io::Error },
    #[error("malformed corpus record in {path} line {line}: {source}")]
    CorpusRecord {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("invalid word pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("analogy at line {line} has {found} entries, expected 4")]
    AnalogyFormat { line: usize, found: usize },
    #[error("malformed vectors file at line {line}: {reason}")]
    VectorsFormat { line: usize, reason: String },
    #[error("word '{0}' not in vocabulary")]
    NotInVocabulary(String),
    #[error("length of vectors and tokens mismatch: {tokens} tokens, {vectors} vectors")]
    LengthMismatch { tokens: usize, vectors: usize },
    #[error("{stage} exited with status {code}")]
    StageFailed { stage: String, code: i32 },
    #[error("no word occurs at least {min_count} times, vocabulary is empty")]
    EmptyVocabulary { min_count: usize },
    #[error("cannot bootstrap: {0}")]
    InvalidSample(String),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    Npy(#[from] ndarray_npy::ReadNpyError),
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl WordvecError {
    /// Process exit status for this error. A failed external stage hands its
    /// own status back to the caller.
    pub fn exit_code(&self) -> i32 {
        match self {
            WordvecError::StageFailed { code, .. } => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, WordvecError>;
