//! blindset-owner: data owner setup
//!
//! Generates the universe and private bits, distributes them into padded
//! buckets, and commits each bucket into a digest under the global scalar `r`.

pub mod setup;

pub use setup::{
    compute_blinded_base, compute_digests, generate_entries, generate_universe, run_setup,
    run_setup_with, validate_entries, SetupOutput, SetupParams,
};
