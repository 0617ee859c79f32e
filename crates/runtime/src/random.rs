//! Deterministic pseudo-random numbers
//!
//! A 64-bit linear congruential generator using Knuth's MMIX constants.
//! One process-wide state: RANDOMIZE is global in the source language,
//! and identical seeds must replay identical sequences on every
//! platform.

use crate::trap::{TrapClass, rt_trap_class};
use std::sync::atomic::{AtomicU64, Ordering};

const MULTIPLIER: u64 = 6364136223846793005;
const INCREMENT: u64 = 1442695040888963407;
const DEFAULT_SEED: u64 = 0x5eed_1234_abcd_0001;

static STATE: AtomicU64 = AtomicU64::new(DEFAULT_SEED);

fn next_state() -> u64 {
    let mut cur = STATE.load(Ordering::Relaxed);
    loop {
        let next = cur.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        match STATE.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => cur = actual,
        }
    }
}

/// Seed the generator.
#[unsafe(no_mangle)]
pub extern "C" fn rt_randomize_u64(seed: u64) {
    STATE.store(seed, Ordering::Relaxed);
}

/// Signed-seed convenience used by RANDOMIZE with negative arguments.
#[unsafe(no_mangle)]
pub extern "C" fn rt_randomize_i64(seed: i64) {
    rt_randomize_u64(seed as u64);
}

/// Next value in `[0, 1)`, mapped from the high 53 bits for full double
/// precision.
#[unsafe(no_mangle)]
pub extern "C" fn rt_rnd() -> f64 {
    let bits = next_state() >> 11;
    bits as f64 / (1u64 << 53) as f64
}

/// Uniform integer in `[0, max)`; non-positive `max` is a domain error.
#[unsafe(no_mangle)]
pub extern "C" fn rt_rand_int(max: i64) -> i64 {
    if max <= 0 {
        rt_trap_class(TrapClass::DomainError, "RND upper bound must be positive");
        return 0;
    }
    ((next_state() >> 1) % max as u64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_same_seed_same_sequence() {
        rt_randomize_u64(42);
        let first: Vec<f64> = (0..8).map(|_| rt_rnd()).collect();
        rt_randomize_u64(42);
        let second: Vec<f64> = (0..8).map(|_| rt_rnd()).collect();
        assert_eq!(first, second);
    }

    #[test]
    #[serial]
    fn test_values_in_unit_interval() {
        rt_randomize_u64(7);
        for _ in 0..1000 {
            let v = rt_rnd();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    #[serial]
    fn test_rand_int_range_and_determinism() {
        rt_randomize_u64(99);
        let first: Vec<i64> = (0..100).map(|_| rt_rand_int(6)).collect();
        assert!(first.iter().all(|v| (0..6).contains(v)));
        rt_randomize_u64(99);
        let second: Vec<i64> = (0..100).map(|_| rt_rand_int(6)).collect();
        assert_eq!(first, second);
    }

    #[test]
    #[serial]
    fn test_different_seeds_diverge() {
        rt_randomize_u64(1);
        let a = rt_rnd();
        rt_randomize_u64(2);
        let b = rt_rnd();
        assert_ne!(a, b);
    }
}
