//! Discrete hidden Markov models for the Physalia toolkit.
//!
//! Features:
//!
//! - **Model description** — [`Hmm`] over caller-chosen state and observation
//!   types, with optional terminal-state semantics
//! - **Inference** — streaming forward/backward passes and the fused
//!   [`ForwardBackward`] smoother
//! - **Decoding** — [`most_likely`], the Viterbi path
//! - **Training** — [`baum_welch`], one parallel Expectation-Maximization step
//! - **Sampling** — [`HmmSampler`] for generative draws
//!
//! All probabilities live in the log domain; negative infinity denotes an
//! impossible event and absent map entries mean probability zero.
//!
//! # Quick start
//!
//! ```
//! use physalia_hmm::{most_likely, Hmm, TabularEmitter, Transition};
//!
//! let mut emitter = TabularEmitter::new();
//! emitter.insert("rain", "umbrella", 0.9f64.ln());
//! emitter.insert("rain", "none", 0.1f64.ln());
//! emitter.insert("sun", "umbrella", 0.2f64.ln());
//! emitter.insert("sun", "none", 0.8f64.ln());
//!
//! let mut h = Hmm::new(vec!["rain", "sun"], emitter);
//! h.init.insert("rain", 0.5f64.ln());
//! h.init.insert("sun", 0.5f64.ln());
//! for (from, to, p) in [
//!     ("rain", "rain", 0.7f64),
//!     ("rain", "sun", 0.3),
//!     ("sun", "rain", 0.4),
//!     ("sun", "sun", 0.6),
//! ] {
//!     h.transitions.insert(Transition { from, to }, p.ln());
//! }
//!
//! let path = most_likely(&h, &["umbrella", "umbrella", "none"]).unwrap();
//! assert_eq!(path, vec!["rain", "rain", "sun"]);
//! ```

pub mod baum_welch;
mod cache;
pub mod emitter;
pub mod forward_backward;
pub mod model;
pub mod sample;
pub mod viterbi;

#[cfg(test)]
mod testutil;

pub use baum_welch::baum_welch;
pub use emitter::{Emitter, TabularEmitter};
pub use forward_backward::{
    backward_probs, forward_probs, log_likelihood, BackwardProbs, ForwardBackward, ForwardProbs,
};
pub use model::{random_hmm, Hmm, Transition};
pub use sample::{sample_index, HmmSampler};
pub use viterbi::most_likely;
