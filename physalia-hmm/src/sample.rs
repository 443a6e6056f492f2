//! Generative sampling: drawing state/observation sequences from a model.
//!
//! None of the inference algorithms use this module; it exists for data
//! generation and for Monte Carlo cross-checks of the exact algorithms.

use std::hash::Hash;

use physalia_core::{PhysaliaError, Result, Xorshift64};

use crate::cache::ModelCache;
use crate::emitter::Emitter;
use crate::model::Hmm;

/// Categorical draw over unnormalized probabilities (probability space,
/// not log).
///
/// # Panics
///
/// Panics on an empty slice.
pub fn sample_index(rng: &mut Xorshift64, probs: &[f64]) -> usize {
    assert!(!probs.is_empty(), "cannot sample from an empty list");
    let mut offset = rng.next_f64() * probs.iter().sum::<f64>();
    for (i, p) in probs.iter().enumerate() {
        offset -= p;
        if offset < 0.0 {
            return i;
        }
    }
    probs.len() - 1
}

/// Reusable sampler for one model: the categorical tables for the initial
/// distribution and for each state's outgoing transitions are precomputed
/// once, so repeated draws are cheap.
pub struct HmmSampler<'a, E: Emitter> {
    h: &'a Hmm<E>,
    terminal: Option<usize>,
    init_states: Vec<usize>,
    init_probs: Vec<f64>,
    /// Per from-state transition targets and probabilities.
    targets: Vec<Vec<usize>>,
    probs: Vec<Vec<f64>>,
}

impl<'a, E> HmmSampler<'a, E>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    pub fn new(h: &'a Hmm<E>) -> Self {
        let cache = ModelCache::new(h);
        let n = cache.len();

        let mut init_states = Vec::with_capacity(h.init.len());
        let mut init_probs = Vec::with_capacity(h.init.len());
        for (state, &log_prob) in &h.init {
            if let Some(&i) = cache.s2i.get(state) {
                init_states.push(i);
                init_probs.push(log_prob.exp());
            }
        }

        let mut targets = vec![Vec::new(); n];
        let mut probs = vec![Vec::new(); n];
        for tr in &cache.transitions {
            targets[tr.from].push(tr.to);
            probs[tr.from].push(tr.log_prob.exp());
        }

        HmmSampler {
            h,
            terminal: h.terminal.as_ref().and_then(|t| cache.s2i.get(t).copied()),
            init_states,
            init_probs,
            targets,
            probs,
        }
    }

    /// Draw a complete state/observation sequence, walking from the
    /// initial distribution until the terminal state absorbs the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the model has no terminal state (the walk would
    /// never end), or if the walk reaches a state with no outgoing
    /// transitions.
    pub fn sample(&self, rng: &mut Xorshift64) -> Result<(Vec<E::State>, Vec<E::Obs>)> {
        let Some(terminal) = self.terminal else {
            return Err(PhysaliaError::InvalidInput(
                "sample: model has no terminal state".into(),
            ));
        };
        self.walk(rng, Some(terminal), usize::MAX)
    }

    /// Draw a sequence of at most `len` emitting states. Terminating
    /// models may stop early by reaching the terminal state; models
    /// without one always produce exactly `len` states.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk reaches a state with no outgoing
    /// transitions before `len` states are drawn.
    pub fn sample_len(
        &self,
        rng: &mut Xorshift64,
        len: usize,
    ) -> Result<(Vec<E::State>, Vec<E::Obs>)> {
        self.walk(rng, self.terminal, len)
    }

    fn walk(
        &self,
        rng: &mut Xorshift64,
        terminal: Option<usize>,
        max_len: usize,
    ) -> Result<(Vec<E::State>, Vec<E::Obs>)> {
        let mut states = Vec::new();
        let mut obses = Vec::new();
        if self.init_states.is_empty() {
            return Err(PhysaliaError::InvalidInput(
                "sample: empty initial distribution".into(),
            ));
        }

        let mut state = self.init_states[sample_index(rng, &self.init_probs)];
        while states.len() < max_len && Some(state) != terminal {
            let value = &self.h.states[state];
            states.push(value.clone());
            obses.push(self.h.emitter.sample(rng, value));
            if self.targets[state].is_empty() {
                if states.len() == max_len {
                    break;
                }
                return Err(PhysaliaError::InvalidInput(format!(
                    "sample: no transitions out of state index {state}"
                )));
            }
            state = self.targets[state][sample_index(rng, &self.probs[state])];
        }
        Ok((states, obses))
    }
}

impl<E> Hmm<E>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    /// Draw one complete sequence. See [`HmmSampler::sample`]; for
    /// repeated draws build the sampler once.
    pub fn sample(&self, rng: &mut Xorshift64) -> Result<(Vec<E::State>, Vec<E::Obs>)> {
        HmmSampler::new(self).sample(rng)
    }

    /// Draw a sequence of at most `len` states. See
    /// [`HmmSampler::sample_len`].
    pub fn sample_len(
        &self,
        rng: &mut Xorshift64,
        len: usize,
    ) -> Result<(Vec<E::State>, Vec<E::Obs>)> {
        HmmSampler::new(self).sample_len(rng, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::TabularEmitter;
    use crate::testutil::{reference_hmm, reference_hmm_no_terminal};

    #[test]
    fn sample_index_follows_the_weights() {
        let mut rng = Xorshift64::new(5);
        let probs = [1.0, 2.0, 1.0];
        let mut counts = [0usize; 3];
        let n = 40_000;
        for _ in 0..n {
            counts[sample_index(&mut rng, &probs)] += 1;
        }
        let freqs: Vec<f64> = counts.iter().map(|&c| c as f64 / n as f64).collect();
        assert!((freqs[0] - 0.25).abs() < 0.015);
        assert!((freqs[1] - 0.50).abs() < 0.015);
        assert!((freqs[2] - 0.25).abs() < 0.015);
    }

    #[test]
    fn sample_requires_a_terminal_state() {
        let h = reference_hmm_no_terminal();
        let mut rng = Xorshift64::new(1);
        assert!(h.sample(&mut rng).is_err());
    }

    #[test]
    fn empty_initial_distribution_is_an_error() {
        let mut h = reference_hmm();
        h.init.clear();
        let mut rng = Xorshift64::new(1);
        assert!(h.sample(&mut rng).is_err());
    }

    #[test]
    fn dead_end_state_is_an_error() {
        let mut emitter = TabularEmitter::new();
        emitter.insert("a", "x", 0.0);
        let mut h = Hmm::new(vec!["a"], emitter);
        h.init.insert("a", 0.0);
        let mut rng = Xorshift64::new(1);
        assert!(h.sample_len(&mut rng, 5).is_err());
        // A dead end at exactly the requested length is not an error.
        assert!(h.sample_len(&mut rng, 1).is_ok());
    }

    #[test]
    fn sample_len_is_exact_without_terminal() {
        let h = reference_hmm_no_terminal();
        let sampler = HmmSampler::new(&h);
        let mut rng = Xorshift64::new(42);
        for len in [0, 1, 5, 20] {
            let (states, obses) = sampler.sample_len(&mut rng, len).unwrap();
            assert_eq!(states.len(), len);
            assert_eq!(obses.len(), len);
        }
    }

    #[test]
    fn sampled_sequences_respect_the_model() {
        let h = reference_hmm();
        let sampler = HmmSampler::new(&h);
        let mut rng = Xorshift64::new(9);
        for _ in 0..200 {
            let (states, obses) = sampler.sample(&mut rng).unwrap();
            assert_eq!(states.len(), obses.len());
            for (state, obs) in states.iter().zip(&obses) {
                assert_ne!(*state, "D");
                assert!(h.emitter.log_probs(obs, &[*state])[0] > f64::NEG_INFINITY);
            }
        }
    }

    #[test]
    fn empty_sequence_rate_matches_terminal_init_mass() {
        let h = reference_hmm();
        let sampler = HmmSampler::new(&h);
        let mut rng = Xorshift64::new(77);
        let n = 50_000;
        let mut empty = 0usize;
        for _ in 0..n {
            if sampler.sample(&mut rng).unwrap().0.is_empty() {
                empty += 1;
            }
        }
        let rate = empty as f64 / n as f64;
        assert!((rate - 0.1).abs() < 0.01, "empty rate {rate}");
    }
}
