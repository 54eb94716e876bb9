//! blindset-client: querying party
//!
//! Blinds the universe with a session scalar `m`, seals the probe index for the
//! intermediary, and turns the server's aggregate plus the reveal value into a
//! membership decision.

pub mod blind;
pub mod verify;

pub use blind::ClientSession;
pub use verify::{verify, BucketCheck, Verdict};
