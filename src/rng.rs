//! Sampling helpers over the realization RNG.
//!
//! All distribution draws in the hot path go through these functions so the
//! guards (zero rates, empty counts, probabilities outside [0, 1]) live in
//! one place.

use rand::{Rng, RngCore};
use rand_distr::{Binomial, Distribution, Poisson};

/// Exponential waiting time with the given rate. A non-positive rate means
/// the transition never fires.
pub fn rand_exp(rate: f64, rng: &mut dyn RngCore) -> f64 {
    if rate <= 0.0 {
        return f64::INFINITY;
    }
    let u: f64 = rng.random();
    -(1.0 - u).ln() / rate
}

/// Exponential waiting time floored at one day.
///
/// Legacy behavior of the event-driven engine's stage-progression draws; do
/// not replace with the pure exponential.
pub fn rand_exp_min1(rate: f64, rng: &mut dyn RngCore) -> f64 {
    rand_exp(rate, rng).max(1.0)
}

/// One binomial draw with the probability clamped into [0, 1].
pub fn rand_binomial(n: u64, p: f64, rng: &mut dyn RngCore) -> u64 {
    if n == 0 {
        return 0;
    }
    let p = p.clamp(0.0, 1.0);
    if p == 0.0 {
        return 0;
    }
    if p == 1.0 {
        return n;
    }
    Binomial::new(n, p)
        .expect("clamped binomial parameters are valid")
        .sample(rng)
}

/// One Poisson draw; non-positive intensity yields zero.
pub fn rand_poisson(lambda: f64, rng: &mut dyn RngCore) -> f64 {
    if lambda <= 0.0 {
        return 0.0;
    }
    Poisson::new(lambda)
        .expect("positive Poisson intensity is valid")
        .sample(rng)
}

/// Uniform integer in `[lower, upper]`, inclusive on both ends.
pub fn rand_int(lower: u64, upper: u64, rng: &mut dyn RngCore) -> u64 {
    rng.random_range(lower..=upper)
}
