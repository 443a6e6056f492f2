//! Baum-Welch: one Expectation-Maximization step over a batch of
//! observation sequences.
//!
//! Each sequence's forward-backward computation runs without any shared
//! mutable state; the posterior statistics it yields are then folded into
//! shared tallies under one coarse lock, held only for the duration of each
//! in-memory tally mutation. Workers pull sequences from the shared input
//! iterator until it is exhausted, and normalization runs once after the
//! explicit join.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use physalia_core::{log_sum_exp, PhysaliaError, Result};

use crate::emitter::{Emitter, TabularEmitter};
use crate::forward_backward::ForwardBackward;
use crate::model::{Hmm, Transition};

/// Log-sum-exp a value into a map entry, inserting on first touch.
fn tally_into<K: Eq + Hash>(map: &mut HashMap<K, f64>, key: K, v: f64) {
    map.entry(key)
        .and_modify(|old| *old = log_sum_exp(*old, v))
        .or_insert(v);
}

/// Posterior statistics accumulated across sequences, all in the log
/// domain.
struct Tallies<S, O> {
    init: HashMap<S, f64>,
    /// Log-count of contributing sequences.
    init_total: f64,
    trans: HashMap<Transition<S>, f64>,
    from_totals: HashMap<S, f64>,
    emit: HashMap<S, HashMap<O, f64>>,
    emit_totals: HashMap<S, f64>,
}

impl<S: Clone + Eq + Hash, O: Clone + Eq + Hash> Tallies<S, O> {
    fn new() -> Self {
        Tallies {
            init: HashMap::new(),
            init_total: f64::NEG_INFINITY,
            trans: HashMap::new(),
            from_totals: HashMap::new(),
            emit: HashMap::new(),
            emit_totals: HashMap::new(),
        }
    }

    /// An empty sequence: one more observed sequence, beginning (and
    /// ending) in the terminal state.
    fn add_empty(&mut self, terminal: &S) {
        self.init_total = log_sum_exp(self.init_total, 0.0);
        tally_into(&mut self.init, terminal.clone(), 0.0);
    }

    fn add_initial(&mut self, dist: &HashMap<S, f64>) {
        self.init_total = log_sum_exp(self.init_total, 0.0);
        for (state, &prob) in dist {
            tally_into(&mut self.init, state.clone(), prob);
        }
    }

    fn add_transition_step(
        &mut self,
        prev_dist: &HashMap<S, f64>,
        cond_dist: &HashMap<S, HashMap<S, f64>>,
    ) {
        for (state, &prob) in prev_dist {
            tally_into(&mut self.from_totals, state.clone(), prob);
        }
        for (from, tos) in cond_dist {
            // Conditional rows are keyed by from-states with posterior
            // mass, so the prior is always present.
            let Some(&prior) = prev_dist.get(from) else {
                continue;
            };
            for (to, &cond_prob) in tos {
                // Recombine the conditional with the prior posterior into
                // a joint over the transition.
                tally_into(
                    &mut self.trans,
                    Transition {
                        from: from.clone(),
                        to: to.clone(),
                    },
                    cond_prob + prior,
                );
            }
        }
    }

    fn add_emission_step(&mut self, dist: &HashMap<S, f64>, obs: &O) {
        for (state, &prob) in dist {
            tally_into(&mut self.emit_totals, state.clone(), prob);
            tally_into(
                self.emit.entry(state.clone()).or_default(),
                obs.clone(),
                prob,
            );
        }
    }

    /// Divide every tally by its marginal and assemble the updated model.
    fn normalize<E>(mut self, h: &Hmm<E>) -> Hmm<TabularEmitter<S, O>>
    where
        E: Emitter<State = S, Obs = O>,
    {
        for (trans, prob) in self.trans.iter_mut() {
            *prob -= self.from_totals[&trans.from];
        }
        for prob in self.init.values_mut() {
            *prob -= self.init_total;
        }
        for (state, emissions) in self.emit.iter_mut() {
            let total = self.emit_totals[state];
            for prob in emissions.values_mut() {
                *prob -= total;
            }
        }

        Hmm {
            states: h.states.clone(),
            terminal: h.terminal.clone(),
            emitter: TabularEmitter(self.emit),
            init: self.init,
            transitions: self.trans,
        }
    }
}

/// Fold one sequence's posterior statistics into the shared tallies.
///
/// The forward-backward computation runs outside the lock; the lock is
/// taken separately for each logical tally mutation.
fn accumulate_sequence<E>(
    h: &Hmm<E>,
    seq: &[E::Obs],
    tallies: &Mutex<Tallies<E::State, E::Obs>>,
) where
    E: Emitter + Sync,
    E::State: Clone + Eq + Hash + Send + Sync,
    E::Obs: Clone + Eq + Hash + Sync,
{
    if seq.is_empty() {
        // Meaningful only for terminating models: an instance that begins
        // and ends without emitting.
        if let Some(terminal) = &h.terminal {
            tallies.lock().unwrap().add_empty(terminal);
        }
        return;
    }

    let fb = ForwardBackward::new(h, seq);

    let first = fb.dist(0).unwrap();
    tallies.lock().unwrap().add_initial(&first);

    for t in 1..=seq.len() {
        if t == seq.len() && h.terminal.is_none() {
            // Without a terminal state the successor of the last
            // observation is undefined, so transitions into it are not
            // estimable.
            break;
        }
        let prev_dist = fb.dist(t - 1).unwrap();
        let cond_dist = fb.cond_dist(t).unwrap();
        tallies
            .lock()
            .unwrap()
            .add_transition_step(&prev_dist, &cond_dist);
    }

    for (t, obs) in seq.iter().enumerate() {
        let dist = fb.dist(t).unwrap();
        tallies.lock().unwrap().add_emission_step(&dist, obs);
    }
}

/// Apply one Baum-Welch step, re-estimating the initial, transition, and
/// emission parameters from the posterior statistics of `data`.
///
/// Returns a new model sharing the input's state list and terminal state;
/// the emitter is always rebuilt as a [`TabularEmitter`], whatever the
/// input model used. Empty sequences are legal for terminating models and
/// count toward the initial distribution of the terminal state.
///
/// `workers` bounds the worker tasks pulling sequences from `data`;
/// `0` uses the default thread pool. Sequences may arrive from an
/// unbounded iterator; the call returns once it is exhausted.
///
/// # Errors
///
/// Returns an error if the worker pool cannot be constructed.
pub fn baum_welch<E, I>(
    h: &Hmm<E>,
    data: I,
    workers: usize,
) -> Result<Hmm<TabularEmitter<E::State, E::Obs>>>
where
    E: Emitter + Sync,
    E::State: Clone + Eq + Hash + Send + Sync,
    E::Obs: Clone + Eq + Hash + Send + Sync,
    I: IntoIterator<Item = Vec<E::Obs>>,
    I::IntoIter: Send,
{
    let tallies = Mutex::new(Tallies::new());

    #[cfg(feature = "parallel")]
    {
        use rayon::iter::{ParallelBridge, ParallelIterator};

        let run = |seq: Vec<E::Obs>| accumulate_sequence(h, &seq, &tallies);
        let iter = data.into_iter();
        if workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| PhysaliaError::Other(format!("worker pool: {e}")))?;
            pool.install(move || iter.par_bridge().for_each(run));
        } else {
            iter.par_bridge().for_each(run);
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = workers;
        for seq in data {
            accumulate_sequence(h, &seq, &tallies);
        }
    }

    let tallies = tallies
        .into_inner()
        .map_err(|_| PhysaliaError::Other("tally lock poisoned".into()))?;
    Ok(tallies.normalize(h))
}
