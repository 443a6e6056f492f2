//! Index-based performance layer.
//!
//! Models key their parameters by opaque state values; the algorithms
//! instead run over dense integer indices. [`ModelCache`] derives the
//! state-to-index bijection and a flattened transition list once per
//! inference call, and [`LogStateMap`] is the array-backed, presence-tracked
//! replacement for a `HashMap<State, f64>` that every per-timestep
//! distribution is accumulated in.

use std::collections::HashMap;
use std::hash::Hash;

use physalia_core::log_sum_exp;

use crate::emitter::Emitter;
use crate::model::Hmm;

/// A transition re-expressed over dense state indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CachedTransition {
    pub from: usize,
    pub to: usize,
    pub log_prob: f64,
}

/// Derived per-invocation index data: the state↔index bijection and the
/// flattened transition list. Building it is `O(|states| + |transitions|)`
/// and cannot fail; a zero-state model produces an empty cache.
#[derive(Debug)]
pub(crate) struct ModelCache<S> {
    pub s2i: HashMap<S, usize>,
    pub transitions: Vec<CachedTransition>,
}

impl<S: Clone + Eq + Hash> ModelCache<S> {
    pub fn new<E>(h: &Hmm<E>) -> Self
    where
        E: Emitter<State = S>,
    {
        let s2i: HashMap<S, usize> = h
            .states
            .iter()
            .enumerate()
            .map(|(i, state)| (state.clone(), i))
            .collect();
        let transitions = h
            .transitions
            .iter()
            .map(|(trans, &log_prob)| CachedTransition {
                from: s2i[&trans.from],
                to: s2i[&trans.to],
                log_prob,
            })
            .collect();
        ModelCache { s2i, transitions }
    }

    pub fn len(&self) -> usize {
        self.s2i.len()
    }
}

/// Array-backed partial map from state index to an accumulated log-value.
///
/// The index space is fixed at construction. Entries are either present or
/// absent; absent means probability zero. Never shared between accumulation
/// steps.
#[derive(Debug, Clone)]
pub(crate) struct LogStateMap {
    values: Vec<f64>,
    present: Vec<bool>,
}

impl LogStateMap {
    pub fn new(n: usize) -> Self {
        LogStateMap {
            values: vec![0.0; n],
            present: vec![false; n],
        }
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        if self.present[i] {
            Some(self.values[i])
        } else {
            None
        }
    }

    /// Unconditionally overwrite the entry.
    pub fn set(&mut self, i: usize, v: f64) {
        self.values[i] = v;
        self.present[i] = true;
    }

    /// Log-sum-exp the value into the entry. Negative-infinity values are
    /// dropped so that impossible outcomes never materialize entries.
    pub fn accumulate_log(&mut self, i: usize, v: f64) {
        if v == f64::NEG_INFINITY {
            return;
        }
        if self.present[i] {
            self.values[i] = log_sum_exp(self.values[i], v);
        } else {
            self.set(i, v);
        }
    }

    /// Add `delta` to every present entry (log-domain renormalization).
    pub fn shift_all(&mut self, delta: f64) {
        for (i, &present) in self.present.iter().enumerate() {
            if present {
                self.values[i] += delta;
            }
        }
    }

    /// Present entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.present
            .iter()
            .enumerate()
            .filter(|(_, &present)| present)
            .map(|(i, _)| (i, self.values[i]))
    }

    /// Convert back to a state-keyed map through the inverse bijection.
    pub fn to_state_map<S: Clone + Eq + Hash>(&self, states: &[S]) -> HashMap<S, f64> {
        self.iter().map(|(i, v)| (states[i].clone(), v)).collect()
    }
}
