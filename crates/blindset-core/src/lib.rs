//! blindset-core: shared kernel for the blinded bucket membership protocol
//!
//! A data owner commits a set of private bits into fixed-size buckets. A client
//! learns the bit behind one privately chosen index by relaying blinded curve
//! points through an intermediary and an aggregating server:
//!
//! ```text
//! owner (setup) --digests-------------------------------+
//!        |                                               v
//!        +--universe--> client --blinded + token--> intermediary
//!                         ^                          |   |
//!                         |                 reveal   |   | responses + routing token
//!                         +--------------------------+   v
//!                         +------------------aggregate-- server
//! ```
//!
//! This crate holds everything the roles share:
//! - Field and short-Weierstrass curve arithmetic over `BigUint` coordinates
//! - The hash-based bucket distribution engine with padding
//! - Scalar sampling, the token cipher and the keyed store collaborators
//! - The bounded worker pool with index-addressed write-back
//! - Hand-off artifacts, configuration and the error taxonomy
//!
//! # Threat Model
//!
//! | Information | Intermediary | Server | Client |
//! |-------------|--------------|--------|--------|
//! | Queried index | YES - decrypts the query token | NO | YES |
//! | Queried bucket | YES | YES - decrypts the routing token | NO |
//! | Bit values | NO - sees only blinded points | YES - stores the bucket table | Only the queried bit |
//! | Blinding scalar `r` | YES | NO | NO |
//! | Session scalar `m` | NO | NO | YES |
//!
//! Non-goals: constant-time arithmetic, subgroup validation, key provisioning.

pub mod artifacts;
pub mod bucket;
pub mod config;
pub mod curve;
pub mod error;
pub mod field;
pub mod pool;
pub mod scalar;
pub mod store;
pub mod token;

pub use artifacts::{
    AggregateResult, BlindedUniverse, BucketDigests, Decision, ResponseArray, RevealValue,
    Universe,
};
pub use bucket::{distribute_entries, BucketTable, DatasetEntry, Slot, SlotRef};
pub use config::{CurveConfig, ProtocolConfig};
pub use curve::{CurveParams, Point};
pub use error::{
    ArithmeticError, BatchReport, ConfigError, CryptoError, Error, LookupError, PoolError,
    ProtocolError, RecordError, RecordFailure,
};
pub use pool::WorkerPool;
pub use scalar::{sample_scalar, ScalarBias};
pub use store::{KeyedStore, MemoryStore};
pub use token::{QueryToken, TokenKey};

pub use num_bigint::BigUint;

pub type Result<T> = std::result::Result<T, Error>;

/// Protocol constants
pub mod constants {
    /// Default size of the bounded worker pool
    pub const DEFAULT_WORKERS: usize = 8;

    /// Default dataset size (N) for generated deployments
    pub const DEFAULT_DATASET_SIZE: usize = 49;

    /// Default bucket count (B) for generated deployments
    pub const DEFAULT_BUCKET_COUNT: usize = 13;

    /// Width of the integer carried inside a query token
    pub const TOKEN_PLAINTEXT_LEN: usize = 8;

    /// AES-GCM nonce length
    pub const TOKEN_NONCE_LEN: usize = 12;

    /// AES-GCM tag length
    pub const TOKEN_TAG_LEN: usize = 16;
}
