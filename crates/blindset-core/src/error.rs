//! Error taxonomy
//!
//! Arithmetic, pool and configuration errors are fatal to a run. Crypto and
//! lookup errors are per-record: batch operations wrap them in a
//! [`RecordFailure`] and keep going.

use thiserror::Error;

/// Field or curve precondition violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("modular inverse of zero")]
    ZeroDivisor,

    #[error("curve precondition violated: {0}")]
    CurvePreconditionViolated(String),
}

/// Token cipher failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("token authentication failed")]
    AuthenticationFailed,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token encryption failed")]
    EncryptionFailed,

    #[error("invalid token key: {0}")]
    InvalidKey(String),
}

/// Missing keyed-store entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no bucket assignment for index {0}")]
    NotFound(u64),

    #[error("bucket {0} not found")]
    BucketNotFound(u64),
}

/// Protocol-level outcome surfaced as an error only on request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("inconclusive: no bucket matched after examining {examined} buckets")]
    Inconclusive { examined: usize },
}

/// Worker pool failure
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),

    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("result index {index} out of range for {len} slots")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("result index {0} written twice")]
    DuplicateIndex(usize),

    #[error("result index {0} never written")]
    MissingIndex(usize),
}

/// Configuration failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid integer {value:?} for {field}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Split a per-record failure from one that must abort the batch
    pub fn into_record_error(self) -> std::result::Result<RecordError, Error> {
        match self {
            Error::Crypto(e) => Ok(RecordError::Crypto(e)),
            Error::Lookup(e) => Ok(RecordError::Lookup(e)),
            other => Err(other),
        }
    }
}

/// Reason a single record was skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// A skipped record and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position of the record in the submitted batch
    pub record: usize,
    pub reason: RecordError,
}

/// Outcome of a batch: completed records plus skipped ones
#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    /// `(record, output)` in submission order
    pub completed: Vec<(usize, T)>,
    pub skipped: Vec<RecordFailure>,
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self {
            completed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Record the outcome of one record
    pub fn push(&mut self, record: usize, outcome: std::result::Result<T, RecordError>) {
        match outcome {
            Ok(value) => self.completed.push((record, value)),
            Err(reason) => {
                tracing::warn!(record, error = %reason, "Skipping record");
                self.skipped.push(RecordFailure { record, reason });
            }
        }
    }

    /// Total records seen
    pub fn len(&self) -> usize {
        self.completed.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self::new()
    }
}
