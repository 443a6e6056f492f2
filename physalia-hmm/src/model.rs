//! The hidden Markov model description.
//!
//! An [`Hmm`] is a passive bundle of parameters: an ordered state list, an
//! optional terminal state, an emission model, and sparse initial and
//! transition distributions stored in the log domain. Absent entries denote
//! probability zero. Models are treated as immutable by every algorithm;
//! [`baum_welch`](crate::baum_welch) returns a fresh model instead of
//! mutating its input.

use std::collections::HashMap;
use std::hash::Hash;

use physalia_core::Xorshift64;

use crate::emitter::{Emitter, TabularEmitter};

/// An ordered pair of states with an associated transition probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
}

/// A discrete-state hidden Markov model.
///
/// The state list fixes the index assignment used by the internal
/// performance layer; its order is otherwise irrelevant. The terminal
/// state, when present, marks an absorbing "end of sequence" state that
/// never emits an observation and is implied one position past the last
/// observation.
#[derive(Debug, Clone)]
pub struct Hmm<E: Emitter> {
    /// All allowed states, deduplicated, in index order.
    pub states: Vec<E::State>,

    /// Absorbing end-of-sequence state, if this model is terminating.
    pub terminal: Option<E::State>,

    /// Emission model.
    pub emitter: E,

    /// Initial state log-distribution. Absent states have probability zero.
    pub init: HashMap<E::State, f64>,

    /// Transition log-probabilities. Absent transitions have probability
    /// zero.
    pub transitions: HashMap<Transition<E::State>, f64>,
}

impl<E: Emitter> Hmm<E>
where
    E::State: Eq + Hash,
{
    /// Create a model with empty initial and transition distributions and
    /// no terminal state.
    pub fn new(states: Vec<E::State>, emitter: E) -> Self {
        Hmm {
            states,
            terminal: None,
            emitter,
            init: HashMap::new(),
            transitions: HashMap::new(),
        }
    }

    /// Initial log-probability of a state (negative infinity if absent).
    pub fn init_prob(&self, state: &E::State) -> f64 {
        self.init.get(state).copied().unwrap_or(f64::NEG_INFINITY)
    }

    /// Transition log-probability (negative infinity if absent).
    pub fn transition_prob(&self, from: &E::State, to: &E::State) -> f64
    where
        E::State: Clone,
    {
        self.transitions
            .get(&Transition {
                from: from.clone(),
                to: to.clone(),
            })
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }
}

/// Build a model with uniformly random, properly normalized initial,
/// transition, and emission distributions.
///
/// All probabilities are nonzero. The terminal state, when given, emits
/// nothing and has no outgoing transitions but may carry initial and
/// incoming transition mass. Intended for tests and for seeding EM.
pub fn random_hmm<S, O>(
    rng: &mut Xorshift64,
    states: &[S],
    terminal: Option<&S>,
    observations: &[O],
) -> Hmm<TabularEmitter<S, O>>
where
    S: Clone + Eq + Hash,
    O: Clone + Eq + Hash,
{
    let init = random_log_dist(rng, states.iter());

    let mut transitions = HashMap::new();
    let mut emitter = TabularEmitter::new();
    for from in states {
        if terminal == Some(from) {
            continue;
        }
        for (to, log_prob) in random_log_dist(rng, states.iter()) {
            transitions.insert(
                Transition {
                    from: from.clone(),
                    to,
                },
                log_prob,
            );
        }
        for (obs, log_prob) in random_log_dist(rng, observations.iter()) {
            emitter.insert(from.clone(), obs, log_prob);
        }
    }

    Hmm {
        states: states.to_vec(),
        terminal: terminal.cloned(),
        emitter,
        init,
        transitions,
    }
}

/// Random normalized categorical distribution over `keys`, in log domain.
fn random_log_dist<'a, K, I>(rng: &mut Xorshift64, keys: I) -> HashMap<K, f64>
where
    K: Clone + Eq + Hash + 'a,
    I: Iterator<Item = &'a K>,
{
    let weighted: Vec<(K, f64)> = keys.map(|k| (k.clone(), rng.next_f64() + 1e-3)).collect();
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    weighted
        .into_iter()
        .map(|(k, w)| (k, (w / total).ln()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use physalia_core::log_sum_exp_slice;

    #[test]
    fn absent_entries_are_impossible() {
        let mut h: Hmm<TabularEmitter<&str, &str>> =
            Hmm::new(vec!["a", "b"], TabularEmitter::new());
        h.init.insert("a", 0.0);
        h.transitions.insert(Transition { from: "a", to: "b" }, 0.0);

        assert_eq!(h.init_prob(&"a"), 0.0);
        assert_eq!(h.init_prob(&"b"), f64::NEG_INFINITY);
        assert_eq!(h.transition_prob(&"a", &"b"), 0.0);
        assert_eq!(h.transition_prob(&"b", &"a"), f64::NEG_INFINITY);
    }

    #[test]
    fn random_hmm_rows_are_normalized() {
        let mut rng = Xorshift64::new(1234);
        let states = [0, 1, 2, 3];
        let obses = ["a", "b", "c"];
        let h = random_hmm(&mut rng, &states, Some(&3), &obses);

        let init_total: Vec<f64> = h.init.values().copied().collect();
        assert!((log_sum_exp_slice(&init_total)).abs() < 1e-9);

        for from in [0, 1, 2] {
            let row: Vec<f64> = states
                .iter()
                .map(|to| h.transition_prob(&from, to))
                .collect();
            assert!((log_sum_exp_slice(&row)).abs() < 1e-9);

            let emis: Vec<f64> = h.emitter.0[&from].values().copied().collect();
            assert_eq!(emis.len(), obses.len());
            assert!((log_sum_exp_slice(&emis)).abs() < 1e-9);
        }
    }

    #[test]
    fn random_hmm_terminal_has_no_outgoing_rows() {
        let mut rng = Xorshift64::new(99);
        let h = random_hmm(&mut rng, &[0, 1, 2], Some(&2), &["x"]);
        assert!(h.transitions.keys().all(|t| t.from != 2));
        assert!(!h.emitter.0.contains_key(&2));
        // It may still be entered and started in.
        assert!(h.init.contains_key(&2));
        assert!(h.transitions.contains_key(&Transition { from: 0, to: 2 }));
    }
}
