//! The emission capability: conditional distributions of observations.
//!
//! An [`Emitter`] describes how hidden states produce observations. The
//! inference and training algorithms consume emitters abstractly through two
//! operations (sampling and log-probability lookup); [`TabularEmitter`] is
//! the reference implementation, a sparse table of per-state categorical
//! distributions, and is what [`baum_welch`](crate::baum_welch) rebuilds
//! during the M-step.

use std::collections::HashMap;
use std::hash::Hash;

use physalia_core::Xorshift64;

use crate::sample::sample_index;

/// Conditional distribution of observations given hidden states.
pub trait Emitter {
    /// Hidden state identifier. Compared only for equality.
    type State;

    /// Observation emitted at one timestep.
    type Obs;

    /// Sample an observation conditioned on the hidden state.
    ///
    /// Only required to be well-defined for states with nonzero emission
    /// probability mass; implementations may panic otherwise.
    fn sample(&self, rng: &mut Xorshift64, state: &Self::State) -> Self::Obs;

    /// Conditional log-probability of `obs` for each queried state, in
    /// order. Impossible pairs map to `f64::NEG_INFINITY`.
    fn log_probs(&self, obs: &Self::Obs, states: &[Self::State]) -> Vec<f64>;
}

/// Sparse tabular emitter: `state -> (observation -> log-probability)`.
///
/// Pairs absent from the table have probability zero. Each state's listed
/// observations are expected to carry log-probabilities summing to one in
/// probability space; nothing enforces this, and Baum-Welch output always
/// satisfies it.
#[derive(Debug, Clone, Default)]
pub struct TabularEmitter<S, O>(pub HashMap<S, HashMap<O, f64>>);

impl<S: Eq + Hash, O: Eq + Hash> TabularEmitter<S, O> {
    /// Create an empty table.
    pub fn new() -> Self {
        TabularEmitter(HashMap::new())
    }

    /// Set the emission log-probability for one (state, observation) pair.
    pub fn insert(&mut self, state: S, obs: O, log_prob: f64) {
        self.0.entry(state).or_default().insert(obs, log_prob);
    }
}

impl<S: Eq + Hash + Clone, O: Eq + Hash + Clone> Emitter for TabularEmitter<S, O> {
    type State = S;
    type Obs = O;

    /// # Panics
    ///
    /// Panics if `state` has no entries in the table (zero emission mass).
    fn sample(&self, rng: &mut Xorshift64, state: &S) -> O {
        let dist = self
            .0
            .get(state)
            .filter(|d| !d.is_empty())
            .expect("tabular emitter: state has no emission distribution");
        let mut obses = Vec::with_capacity(dist.len());
        let mut probs = Vec::with_capacity(dist.len());
        for (obs, &log_prob) in dist {
            obses.push(obs);
            probs.push(log_prob.exp());
        }
        obses[sample_index(rng, &probs)].clone()
    }

    fn log_probs(&self, obs: &O, states: &[S]) -> Vec<f64> {
        states
            .iter()
            .map(|state| {
                self.0
                    .get(state)
                    .and_then(|dist| dist.get(obs))
                    .copied()
                    .unwrap_or(f64::NEG_INFINITY)
            })
            .collect()
    }
}
