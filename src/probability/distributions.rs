//! Binomial and Poisson-binomial helpers for small node counts.

/// `C(n, k)` as a float; exact for the node counts this crate handles
pub fn choose(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// `P(Bin(n, p) = k)`
pub fn binomial_pmf(n: usize, k: usize, p: f64) -> f64 {
    if k > n {
        return 0.0;
    }
    // powi(0) is 1 even for a zero base, which handles p = 0 and p = 1
    choose(n, k) * p.powi(k as i32) * (1.0 - p).powi((n - k) as i32)
}

/// `P(Bin(n, p) >= k)`
pub fn binomial_tail(n: usize, k: usize, p: f64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    (k..=n).map(|i| binomial_pmf(n, i, p)).sum::<f64>().clamp(0.0, 1.0)
}

/// Distribution of the number of successes among independent trials with
/// individual probabilities `probabilities`; entry `i` is `P(count = i)`
pub fn poisson_binomial(probabilities: &[f64]) -> Vec<f64> {
    let mut dist = vec![0.0; probabilities.len() + 1];
    dist[0] = 1.0;
    for (done, &p) in probabilities.iter().enumerate() {
        for count in (0..=done + 1).rev() {
            let stay = dist[count] * (1.0 - p);
            let step = if count > 0 { dist[count - 1] * p } else { 0.0 };
            dist[count] = stay + step;
        }
    }
    dist
}

/// `P(successes >= k)` among independent trials with the given probabilities
pub fn poisson_binomial_tail(probabilities: &[f64], k: usize) -> f64 {
    if k == 0 {
        return 1.0;
    }
    if k > probabilities.len() {
        return 0.0;
    }
    poisson_binomial(probabilities)[k..].iter().sum::<f64>().clamp(0.0, 1.0)
}
