//! Forward-backward inference: per-timestep state distributions, smoothing,
//! and sequence likelihood.
//!
//! The forward pass produces, for each timestep, the joint log-probability
//! of the observation prefix and the state at that timestep; the backward
//! pass produces the log-probability of the observation suffix (and
//! termination, for terminating models) given the state. Both are exposed
//! as lazy one-shot streams, and
//! [`ForwardBackward`] fuses them into smoothed posteriors
//! ([`dist`](ForwardBackward::dist)), transition posteriors
//! ([`cond_dist`](ForwardBackward::cond_dist)), and the sequence
//! log-likelihood.

use std::collections::HashMap;
use std::hash::Hash;

use physalia_core::{log_sum_exp, PhysaliaError, Result};

use crate::cache::{LogStateMap, ModelCache};
use crate::emitter::Emitter;
use crate::model::Hmm;

// ---------------------------------------------------------------------------
// Pass primitives over the index cache
// ---------------------------------------------------------------------------

fn init_forward<E>(h: &Hmm<E>, cache: &ModelCache<E::State>) -> LogStateMap
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let mut running = LogStateMap::new(cache.len());
    for (state, &log_prob) in &h.init {
        if let Some(&i) = cache.s2i.get(state) {
            running.set(i, log_prob);
        }
    }
    running
}

/// One forward timestep: combine the running distribution with the current
/// emission probabilities into this timestep's output, then propagate
/// through the transition list into the next running distribution.
fn forward_step(
    cache: &ModelCache<impl Clone + Eq + Hash>,
    emit: &[f64],
    running: &LogStateMap,
) -> (LogStateMap, LogStateMap) {
    let mut out = LogStateMap::new(cache.len());
    for (i, prior) in running.iter() {
        let joint = prior + emit[i];
        if joint != f64::NEG_INFINITY {
            out.set(i, joint);
        }
    }

    let mut next = LogStateMap::new(cache.len());
    for tr in &cache.transitions {
        if let Some(prior) = running.get(tr.from) {
            next.accumulate_log(tr.to, prior + tr.log_prob + emit[tr.from]);
        }
    }
    (out, next)
}

/// The backward pass's starting distribution, covering "everything after
/// the last observation".
///
/// Without a terminal state there is nothing left to explain, so every
/// state gets log-probability 0. With a terminal state, a state explains
/// termination exactly when it has a direct edge to the terminal state, and
/// with that edge's probability; all other states start impossible.
fn init_backward<E>(h: &Hmm<E>, cache: &ModelCache<E::State>) -> LogStateMap
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let mut running = LogStateMap::new(cache.len());
    match &h.terminal {
        None => {
            for i in 0..cache.len() {
                running.set(i, 0.0);
            }
        }
        Some(terminal) => {
            if let Some(&ti) = cache.s2i.get(terminal) {
                for tr in &cache.transitions {
                    if tr.to == ti {
                        running.set(tr.from, tr.log_prob);
                    }
                }
            }
        }
    }
    running
}

/// One backward timestep: fold the current observation's emissions and the
/// successor distribution back through the transition list.
fn backward_step(
    cache: &ModelCache<impl Clone + Eq + Hash>,
    emit: &[f64],
    running: &LogStateMap,
) -> LogStateMap {
    let mut prev = LogStateMap::new(cache.len());
    for tr in &cache.transitions {
        if let Some(next_val) = running.get(tr.to) {
            prev.accumulate_log(tr.from, tr.log_prob + next_val + emit[tr.to]);
        }
    }
    prev
}

// ---------------------------------------------------------------------------
// One-shot streams
// ---------------------------------------------------------------------------

/// Stream the forward distributions for `obs`: one state-keyed map of joint
/// log-probabilities per observation, in temporal order.
///
/// States with zero probability are omitted from each map. The stream is
/// one-shot: once drained it cannot be replayed.
pub fn forward_probs<'a, E>(h: &'a Hmm<E>, obs: &'a [E::Obs]) -> ForwardProbs<'a, E>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let cache = ModelCache::new(h);
    let running = init_forward(h, &cache);
    ForwardProbs {
        h,
        obs,
        cache,
        running,
        t: 0,
    }
}

/// One-shot forward stream. See [`forward_probs`].
pub struct ForwardProbs<'a, E: Emitter> {
    h: &'a Hmm<E>,
    obs: &'a [E::Obs],
    cache: ModelCache<E::State>,
    running: LogStateMap,
    t: usize,
}

impl<E> Iterator for ForwardProbs<'_, E>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    type Item = HashMap<E::State, f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.t >= self.obs.len() {
            return None;
        }
        let emit = self.h.emitter.log_probs(&self.obs[self.t], &self.h.states);
        let (out, next) = forward_step(&self.cache, &emit, &self.running);
        self.running = next;
        self.t += 1;
        Some(out.to_state_map(&self.h.states))
    }
}

/// Stream the backward distributions for `obs`, in reverse temporal order:
/// the first yielded map belongs to the final timestep.
///
/// Each map gives the log-probability of the observations strictly after
/// that timestep (and of termination, for terminating models) conditioned
/// on the state. One-shot, like [`forward_probs`].
pub fn backward_probs<'a, E>(h: &'a Hmm<E>, obs: &'a [E::Obs]) -> BackwardProbs<'a, E>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let cache = ModelCache::new(h);
    let running = init_backward(h, &cache);
    BackwardProbs {
        h,
        obs,
        cache,
        running,
        remaining: obs.len(),
    }
}

/// One-shot backward stream. See [`backward_probs`].
pub struct BackwardProbs<'a, E: Emitter> {
    h: &'a Hmm<E>,
    obs: &'a [E::Obs],
    cache: ModelCache<E::State>,
    running: LogStateMap,
    remaining: usize,
}

impl<E> Iterator for BackwardProbs<'_, E>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    type Item = HashMap<E::State, f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        // Emit before updating: the running distribution is this timestep's
        // backward value, and the update folds in this timestep's emission.
        let out = self.running.to_state_map(&self.h.states);
        let t = self.remaining - 1;
        let emit = self.h.emitter.log_probs(&self.obs[t], &self.h.states);
        self.running = backward_step(&self.cache, &emit, &self.running);
        self.remaining -= 1;
        Some(out)
    }
}

fn collect_forward<E>(
    h: &Hmm<E>,
    cache: &ModelCache<E::State>,
    obs: &[E::Obs],
) -> Vec<HashMap<E::State, f64>>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let mut running = init_forward(h, cache);
    obs.iter()
        .map(|o| {
            let emit = h.emitter.log_probs(o, &h.states);
            let (out, next) = forward_step(cache, &emit, &running);
            running = next;
            out.to_state_map(&h.states)
        })
        .collect()
}

fn collect_backward<E>(
    h: &Hmm<E>,
    cache: &ModelCache<E::State>,
    obs: &[E::Obs],
) -> Vec<HashMap<E::State, f64>>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let mut running = init_backward(h, cache);
    (0..obs.len())
        .rev()
        .map(|t| {
            let out = running.to_state_map(&h.states);
            let emit = h.emitter.log_probs(&obs[t], &h.states);
            running = backward_step(cache, &emit, &running);
            out
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fused forward-backward
// ---------------------------------------------------------------------------

/// Materialized forward and backward passes over one observation sequence.
///
/// Construction runs the two passes as a fork-join pair sharing one index
/// cache, then retains both output arrays for the lifetime of the value.
pub struct ForwardBackward<'a, E: Emitter> {
    h: &'a Hmm<E>,
    obs: &'a [E::Obs],
    cache: ModelCache<E::State>,
    forward: Vec<HashMap<E::State, f64>>,
    /// Reverse temporal order: `backward[i]` belongs to timestep
    /// `obs.len() - 1 - i`.
    backward: Vec<HashMap<E::State, f64>>,
}

impl<'a, E> ForwardBackward<'a, E>
where
    E: Emitter + Sync,
    E::State: Clone + Eq + Hash + Send + Sync,
    E::Obs: Sync,
{
    /// Run both passes to completion and retain their outputs.
    pub fn new(h: &'a Hmm<E>, obs: &'a [E::Obs]) -> Self {
        let cache = ModelCache::new(h);

        #[cfg(feature = "parallel")]
        let (forward, backward) = rayon::join(
            || collect_forward(h, &cache, obs),
            || collect_backward(h, &cache, obs),
        );

        #[cfg(not(feature = "parallel"))]
        let (forward, backward) = (collect_forward(h, &cache, obs), collect_backward(h, &cache, obs));

        ForwardBackward {
            h,
            obs,
            cache,
            forward,
            backward,
        }
    }

    /// Log-likelihood of the whole observation sequence (including
    /// termination, for terminating models).
    ///
    /// For an empty sequence this is 0 for non-terminating models, and the
    /// initial log-probability of the terminal state otherwise.
    pub fn log_likelihood(&self) -> f64 {
        if self.obs.is_empty() {
            return match &self.h.terminal {
                None => 0.0,
                Some(terminal) => self.h.init_prob(terminal),
            };
        }
        let last_forward = &self.forward[self.obs.len() - 1];
        let first_backward = &self.backward[0];
        let mut total = f64::NEG_INFINITY;
        for (state, &f) in last_forward {
            if let Some(&b) = first_backward.get(state) {
                total = log_sum_exp(total, f + b);
            }
        }
        total
    }

    /// Smoothed posterior at timestep `t`: the normalized log-probability
    /// of each state given the entire observation sequence. States with
    /// zero posterior probability are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error unless `t < obs.len()`.
    pub fn dist(&self, t: usize) -> Result<HashMap<E::State, f64>> {
        if t >= self.obs.len() {
            return Err(PhysaliaError::InvalidInput(format!(
                "dist: timestep {t} out of range for sequence of length {}",
                self.obs.len()
            )));
        }
        let fwd = &self.forward[t];
        let bwd = &self.backward[self.obs.len() - 1 - t];

        let mut joint = LogStateMap::new(self.cache.len());
        let mut total = f64::NEG_INFINITY;
        for (state, &f) in fwd {
            if let Some(&b) = bwd.get(state) {
                let v = f + b;
                if v != f64::NEG_INFINITY {
                    total = log_sum_exp(total, v);
                    joint.set(self.cache.s2i[state], v);
                }
            }
        }
        joint.shift_all(-total);
        Ok(joint.to_state_map(&self.h.states))
    }

    /// Conditional distribution of the state at timestep `t` given the
    /// state at `t - 1` and the entire observation sequence, for
    /// `1 <= t <= obs.len()`.
    ///
    /// `t == obs.len()` queries the implicit position after the last
    /// observation: for terminating models only transitions into the
    /// terminal state contribute there.
    ///
    /// The result maps each from-state with nonzero posterior mass at
    /// `t - 1` to a normalized log-distribution over destination states.
    /// Conditioning on a from-state with zero prior probability is outside
    /// the contract and yields no row.
    ///
    /// # Errors
    ///
    /// Returns an error unless `1 <= t <= obs.len()`.
    #[allow(clippy::type_complexity)]
    pub fn cond_dist(&self, t: usize) -> Result<HashMap<E::State, HashMap<E::State, f64>>> {
        let len = self.obs.len();
        if t < 1 || t > len {
            return Err(PhysaliaError::InvalidInput(format!(
                "cond_dist: timestep {t} out of range [1, {len}]"
            )));
        }
        let prior = self.dist(t - 1)?;

        // Emission and backward terms only exist before the implicit
        // post-sequence position.
        let emit = if t < len {
            Some(self.h.emitter.log_probs(&self.obs[t], &self.h.states))
        } else {
            None
        };
        let bwd = if t < len {
            Some(&self.backward[len - 1 - t])
        } else {
            None
        };

        let mut grouped: HashMap<E::State, Vec<(E::State, f64)>> = HashMap::new();
        for (trans, &trans_prob) in &self.h.transitions {
            if t == len {
                if let Some(terminal) = &self.h.terminal {
                    if trans.to != *terminal {
                        continue;
                    }
                }
            }
            let Some(&prior_prob) = prior.get(&trans.from) else {
                continue;
            };
            let mut joint = prior_prob + trans_prob;
            if let (Some(emit), Some(bwd)) = (&emit, bwd) {
                let Some(&b) = bwd.get(&trans.to) else {
                    continue;
                };
                joint += emit[self.cache.s2i[&trans.to]] + b;
            }
            if joint != f64::NEG_INFINITY {
                grouped
                    .entry(trans.from.clone())
                    .or_default()
                    .push((trans.to.clone(), joint));
            }
        }

        let mut res = HashMap::new();
        for (from, tos) in grouped {
            let total = tos
                .iter()
                .fold(f64::NEG_INFINITY, |acc, &(_, v)| log_sum_exp(acc, v));
            res.insert(
                from,
                tos.into_iter().map(|(to, v)| (to, v - total)).collect(),
            );
        }
        Ok(res)
    }
}

/// Log-likelihood of an observation sequence under a model.
///
/// Convenience wrapper that runs a full [`ForwardBackward`] computation.
pub fn log_likelihood<E>(h: &Hmm<E>, obs: &[E::Obs]) -> f64
where
    E: Emitter + Sync,
    E::State: Clone + Eq + Hash + Send + Sync,
    E::Obs: Sync,
{
    ForwardBackward::new(h, obs).log_likelihood()
}
