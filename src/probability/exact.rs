//! Exact enumeration for heterogeneous reliability.
//!
//! Sums over every pre-prepared set `V_pp` containing the proposer and every
//! prepared set `V_p ⊆ V_pp` large enough to pass its gate. Given `V_p`, each
//! member commits independently, so the commit gate is a Poisson-binomial tail
//! and needs no further enumeration. Worlds lighter than
//! [`PRUNE_FLOOR`](crate::types::constants::PRUNE_FLOOR) are skipped.

use super::distributions::poisson_binomial_tail;
use crate::consensus::QuorumRule;
use crate::reliability::ReliabilityMatrix;
use crate::types::{constants::PRUNE_FLOOR, NodeId};

type Mask = u32;

fn members(mask: Mask, n: usize) -> impl Iterator<Item = NodeId> {
    (0..n).filter(move |&i| mask & (1 << i) != 0)
}

/// Probability that `target` collects `threshold` messages from `senders`
fn pass_probability(matrix: &ReliabilityMatrix, senders: Mask, target: NodeId, threshold: usize, n: usize) -> f64 {
    let incoming: Vec<f64> = members(senders, n)
        .filter(|&s| s != target)
        .map(|s| matrix.get(s, target))
        .collect();
    poisson_binomial_tail(&incoming, threshold)
}

/// Probability that exactly the members of `chosen` (a submask of `universe`)
/// succeed, each independently with `probs[i]`
fn subset_weight(chosen: Mask, universe: Mask, probs: &[f64], n: usize) -> f64 {
    members(universe, n)
        .map(|i| if chosen & (1 << i) != 0 { probs[i] } else { 1.0 - probs[i] })
        .product()
}

/// Iterate all submasks of `mask`, including `mask` itself and the empty mask
fn submasks(mask: Mask) -> impl Iterator<Item = Mask> {
    let mut next = Some(mask);
    std::iter::from_fn(move || {
        let current = next?;
        next = if current == 0 { None } else { Some((current - 1) & mask) };
        Some(current)
    })
}

pub fn success_probability(rule: QuorumRule, proposer: NodeId, matrix: &ReliabilityMatrix) -> f64 {
    let n = rule.node_count();
    if n == 0 || proposer >= n {
        return 0.0;
    }
    let needed = rule.success_threshold();
    let k_prepare = rule.prepare_threshold();
    let k_commit = rule.commit_threshold();
    let everyone: Mask = ((1u64 << n) - 1) as Mask;
    let proposer_bit: Mask = 1 << proposer;

    let pre_prepare_probs: Vec<f64> = (0..n)
        .map(|i| if i == proposer { 1.0 } else { matrix.get(proposer, i) })
        .collect();

    let mut total = 0.0;
    for pre_prepared in submasks(everyone) {
        if pre_prepared & proposer_bit == 0 || (pre_prepared.count_ones() as usize) < needed {
            continue;
        }
        let w_pp = subset_weight(pre_prepared, everyone, &pre_prepare_probs, n);
        if w_pp < PRUNE_FLOOR {
            continue;
        }

        // the proposer never sends prepare
        let prepare_senders = pre_prepared & !proposer_bit;
        let mut prepare_probs = vec![0.0; n];
        for t in members(pre_prepared, n) {
            prepare_probs[t] = pass_probability(matrix, prepare_senders, t, k_prepare, n);
        }

        for prepared in submasks(pre_prepared) {
            if (prepared.count_ones() as usize) < needed {
                continue;
            }
            let w_p = w_pp * subset_weight(prepared, pre_prepared, &prepare_probs, n);
            if w_p < PRUNE_FLOOR {
                continue;
            }
            let commit_probs: Vec<f64> = members(prepared, n)
                .map(|t| pass_probability(matrix, prepared, t, k_commit, n))
                .collect();
            total += w_p * poisson_binomial_tail(&commit_probs, needed);
        }
    }
    total.clamp(0.0, 1.0)
}
