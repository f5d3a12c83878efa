//! Randomness for jitter and header values.
//!
//! Everything is drawn from the OS CSPRNG so the traffic carries no
//! reproducible PRNG fingerprint. A broken random source is not an attack
//! condition we can route around, so it takes the process down.

use tracing::error;

/// Source of uniform indexes in `[0, n)`. Swappable so tests can pin values.
pub type Randn = fn(usize) -> usize;

/// Returns a uniformly distributed index in `[0, n)`, or 0 when `n` is 0.
pub fn rand_index(n: usize) -> usize {
    if n <= 1 {
        return 0;
    }

    let n = n as u64;
    // Largest multiple of n that fits in u64; values above it would bias the modulo.
    let zone = u64::MAX - (u64::MAX % n);
    loop {
        let v = next_u64();
        if v < zone {
            return (v % n) as usize;
        }
    }
}

fn next_u64() -> u64 {
    let mut buf = [0u8; 8];
    if let Err(e) = getrandom::getrandom(&mut buf) {
        error!(error = %e, "failed to generate random number");
        std::process::abort();
    }
    u64::from_le_bytes(buf)
}
