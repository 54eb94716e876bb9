//! blindset-intermediary: response phase
//!
//! Knows the global scalar `r` and the index-to-slot lookup view. For each query
//! token it blinds the client's universe twice over: `r` everywhere, `r + t`
//! at the target slot position, plus a private reveal value `t * m * U[target]`.

pub mod responder;

pub use responder::{NonceSource, Responder, Response, ResponseTask, Stage, TaskRole};
