//! blindset-server: aggregation phase
//!
//! Holds the bucket view (bit values per slot) and recombines a published
//! response array into one aggregate point for the routed bucket.

pub mod aggregate;

pub use aggregate::Aggregator;
