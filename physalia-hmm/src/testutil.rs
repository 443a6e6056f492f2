//! Shared fixtures for the unit tests: a small hand-written reference
//! model and brute-force enumeration helpers that the exact algorithms are
//! checked against.

use std::collections::HashMap;

use physalia_core::log_sum_exp;

use crate::emitter::{Emitter, TabularEmitter};
use crate::model::{Hmm, Transition};

pub(crate) type TestHmm = Hmm<TabularEmitter<&'static str, &'static str>>;

/// Four states with a terminal `D`, emissions over `{x, y, z}`.
pub(crate) fn reference_hmm() -> TestHmm {
    let mut emitter = TabularEmitter::new();
    emitter.insert("A", "x", 0.3f64.ln());
    emitter.insert("A", "z", 0.7f64.ln());
    emitter.insert("B", "x", 0.01f64.ln());
    emitter.insert("B", "y", 0.69f64.ln());
    emitter.insert("B", "z", 0.3f64.ln());
    emitter.insert("C", "x", 0.8f64.ln());
    emitter.insert("C", "y", 0.1f64.ln());
    emitter.insert("C", "z", 0.1f64.ln());

    let mut h = Hmm::new(vec!["A", "B", "C", "D"], emitter);
    h.terminal = Some("D");
    h.init.insert("A", 0.4f64.ln());
    h.init.insert("C", 0.5f64.ln());
    h.init.insert("D", 0.1f64.ln());

    let table: [(&str, &str, f64); 11] = [
        ("A", "A", 0.3),
        ("A", "B", 0.2),
        ("A", "C", 0.5),
        ("B", "A", 0.5),
        ("B", "B", 0.1),
        ("B", "C", 0.2),
        ("B", "D", 0.2),
        ("C", "A", 0.3),
        ("C", "B", 0.1),
        ("C", "C", 0.1),
        ("C", "D", 0.5),
    ];
    for (from, to, p) in table {
        h.transitions.insert(Transition { from, to }, p.ln());
    }
    h
}

pub(crate) fn reference_obs() -> Vec<&'static str> {
    vec!["x", "z", "y", "x"]
}

/// The reference model reshaped as in the original non-terminating
/// scenario: `D` becomes an ordinary absorbing state that emits `x`.
pub(crate) fn reference_hmm_no_terminal() -> TestHmm {
    let mut h = reference_hmm();
    h.terminal = None;
    h.emitter.insert("D", "x", 0.0);
    h.transitions.insert(Transition { from: "D", to: "D" }, 0.0);
    h
}

/// Every state-index sequence of the given length.
pub(crate) fn enumerate_paths(n_states: usize, len: usize) -> Vec<Vec<usize>> {
    let mut paths: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in 0..len {
        paths = paths
            .into_iter()
            .flat_map(|p| {
                (0..n_states).map(move |s| {
                    let mut q = p.clone();
                    q.push(s);
                    q
                })
            })
            .collect();
    }
    paths
}

/// Joint log-probability of a hidden path and the observations it emits,
/// optionally including the hop into the terminal state at the end.
pub(crate) fn path_log_joint(
    h: &TestHmm,
    path: &[usize],
    obs: &[&'static str],
    terminate: bool,
) -> f64 {
    let mut total = h.init_prob(&h.states[path[0]]);
    for (i, &s) in path.iter().enumerate() {
        if i > 0 {
            total += h.transition_prob(&h.states[path[i - 1]], &h.states[s]);
        }
        total += h.emitter.log_probs(&obs[i], &[h.states[s]])[0];
    }
    if terminate {
        let terminal = h.terminal.expect("terminate requires a terminal state");
        total += h.transition_prob(&h.states[*path.last().unwrap()], &terminal);
    }
    total
}

/// Brute-force `P(state_t = s, obs[0..=t])` for every state, by summing
/// over all hidden prefixes. No termination factor; this is exactly the
/// forward quantity.
pub(crate) fn brute_force_forward(
    h: &TestHmm,
    obs: &[&'static str],
    t: usize,
) -> HashMap<&'static str, f64> {
    let mut res = HashMap::new();
    for path in enumerate_paths(h.states.len(), t + 1) {
        let joint = path_log_joint(h, &path, &obs[..=t], false);
        if joint != f64::NEG_INFINITY {
            let entry = res.entry(h.states[path[t]]).or_insert(f64::NEG_INFINITY);
            *entry = log_sum_exp(*entry, joint);
        }
    }
    res
}

/// Brute-force posterior over full hidden paths:
/// `P(path, obs, termination)` for every explaining path, keyed by path.
pub(crate) fn brute_force_paths(
    h: &TestHmm,
    obs: &[&'static str],
    terminate: bool,
) -> Vec<(Vec<usize>, f64)> {
    enumerate_paths(h.states.len(), obs.len())
        .into_iter()
        .map(|path| {
            let joint = path_log_joint(h, &path, obs, terminate);
            (path, joint)
        })
        .filter(|(_, joint)| *joint != f64::NEG_INFINITY)
        .collect()
}

/// Brute-force total sequence probability, termination included when the
/// model terminates.
pub(crate) fn brute_force_log_likelihood(h: &TestHmm, obs: &[&'static str]) -> f64 {
    brute_force_paths(h, obs, h.terminal.is_some())
        .into_iter()
        .fold(f64::NEG_INFINITY, |acc, (_, joint)| {
            log_sum_exp(acc, joint)
        })
}
