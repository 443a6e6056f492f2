//! Shared primitives for the Physalia HMM toolkit.
//!
//! `physalia-core` provides the foundation the domain crates build on:
//!
//! - **Error types** — [`PhysaliaError`] and [`Result`] for structured error handling
//! - **Log-domain arithmetic** — [`log_sum_exp`] and friends for underflow-free
//!   probability computation
//! - **Deterministic randomness** — [`Xorshift64`], a minimal seeded PRNG for
//!   reproducible sampling

pub mod error;
pub mod logprob;
pub mod rng;

pub use error::{PhysaliaError, Result};
pub use logprob::{log_sum_exp, log_sum_exp_slice};
pub use rng::Xorshift64;
