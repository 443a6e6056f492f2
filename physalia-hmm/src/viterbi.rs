//! Viterbi decoding: the single most probable hidden-state path.

use std::hash::Hash;

use crate::cache::ModelCache;
use crate::emitter::Emitter;
use crate::model::Hmm;

/// A candidate path ending in a particular state, carried through the
/// dynamic program with its cumulative log-probability.
#[derive(Debug, Clone)]
struct ViterbiPath {
    /// State indices, oldest first.
    seq: Vec<usize>,
    log_prob: f64,
}

/// The most probable state sequence explaining `obs`, or `None` when no
/// hidden sequence can explain it.
///
/// For terminating models the result is the best path that reaches the
/// terminal state after the final observation, with the implicit
/// non-emitting terminal hop trimmed off; failing to reach the terminal
/// state is a normal `None`, not an error. For non-terminating models the
/// globally best-scoring path wins.
///
/// Exact score ties are broken in favor of the transition examined later,
/// which depends on hash iteration order; callers must not rely on a
/// specific tie-break.
pub fn most_likely<E>(h: &Hmm<E>, obs: &[E::Obs]) -> Option<Vec<E::State>>
where
    E: Emitter,
    E::State: Clone + Eq + Hash,
{
    let cache = ModelCache::new(h);
    let n = cache.len();

    // One live path per state present in the initial distribution.
    let mut paths: Vec<Option<ViterbiPath>> = vec![None; n];
    for (state, &log_prob) in &h.init {
        if let Some(&i) = cache.s2i.get(state) {
            paths[i] = Some(ViterbiPath {
                seq: vec![i],
                log_prob,
            });
        }
    }

    for (t, o) in obs.iter().enumerate() {
        // Fold this observation's emission into every live path. Paths
        // that collapse to -inf stay live; no transition will ever extend
        // them into a better candidate than an existing finite one, and
        // dropping them here would complicate the bookkeeping for nothing.
        let emit = h.emitter.log_probs(o, &h.states);
        for (i, path) in paths.iter_mut().enumerate() {
            if let Some(path) = path {
                path.log_prob += emit[i];
            }
        }

        // After the final observation there is no next emitting state to
        // transition to, unless a terminal state makes the post-sequence
        // position real.
        if h.terminal.is_some() || t + 1 < obs.len() {
            let mut next: Vec<Option<ViterbiPath>> = vec![None; n];
            for tr in &cache.transitions {
                let Some(path) = &paths[tr.from] else {
                    continue;
                };
                let log_prob = path.log_prob + tr.log_prob;
                if log_prob == f64::NEG_INFINITY {
                    continue;
                }
                let better = match &next[tr.to] {
                    Some(existing) => log_prob >= existing.log_prob,
                    None => true,
                };
                if better {
                    let mut seq = path.seq.clone();
                    seq.push(tr.to);
                    next[tr.to] = Some(ViterbiPath { seq, log_prob });
                }
            }
            paths = next;
        }
    }

    let best = match &h.terminal {
        Some(terminal) => {
            let ti = *cache.s2i.get(terminal)?;
            let mut path = paths.into_iter().nth(ti).flatten()?;
            if path.log_prob == f64::NEG_INFINITY {
                return None;
            }
            // Drop the implicit terminal hop.
            path.seq.pop();
            path
        }
        None => {
            let mut best: Option<ViterbiPath> = None;
            for path in paths.into_iter().flatten() {
                if path.log_prob == f64::NEG_INFINITY {
                    continue;
                }
                let better = match &best {
                    Some(b) => path.log_prob >= b.log_prob,
                    None => true,
                };
                if better {
                    best = Some(path);
                }
            }
            best?
        }
    };

    Some(best.seq.iter().map(|&i| h.states[i].clone()).collect())
}
