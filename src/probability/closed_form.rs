//! Closed form for the homogeneous full mesh.
//!
//! With every transmission succeeding independently with probability `p`:
//!
//! * `|V_pp| - 1 ~ Bin(N-1, p)`
//! * given `|V_pp| = x`, the proposer prepares with `q_prop = P(Bin(x-1, p) >= k)`
//!   and each other member with `q_other = P(Bin(x-2, p) >= k)`
//! * given `|V_p| = y`, each member commits with `q_c = P(Bin(y-1, p) >= k)`

use super::distributions::{binomial_pmf, binomial_tail};
use crate::consensus::QuorumRule;

/// `P(|V_p| = y | |V_pp| = x)`; the proposer is always one of the `x`
fn prepared_given_pre_prepared(x: usize, y: usize, rule: QuorumRule, p: f64) -> f64 {
    let k = rule.prepare_threshold();
    let others = x.saturating_sub(1);
    let q_prop = binomial_tail(others, k, p);
    let q_other = binomial_tail(x.saturating_sub(2), k, p);

    let with_proposer = if y >= 1 { q_prop * binomial_pmf(others, y - 1, q_other) } else { 0.0 };
    let without_proposer = (1.0 - q_prop) * binomial_pmf(others, y, q_other);
    with_proposer + without_proposer
}

/// `P(|V_c| >= N - f | |V_p| = y)`
fn commit_given_prepared(y: usize, rule: QuorumRule, p: f64) -> f64 {
    let q_c = binomial_tail(y.saturating_sub(1), rule.commit_threshold(), p);
    binomial_tail(y, rule.success_threshold(), q_c)
}

pub fn success_probability(rule: QuorumRule, p: f64) -> f64 {
    let n = rule.node_count();
    if n == 0 {
        return 0.0;
    }
    let needed = rule.success_threshold();
    let mut total = 0.0;
    for x in needed.max(1)..=n {
        let p_x = binomial_pmf(n - 1, x - 1, p);
        if p_x == 0.0 {
            continue;
        }
        for y in needed..=x {
            let p_y = prepared_given_pre_prepared(x, y, rule, p);
            if p_y == 0.0 {
                continue;
            }
            total += p_x * p_y * commit_given_prepared(y, rule, p);
        }
    }
    total.clamp(0.0, 1.0)
}
