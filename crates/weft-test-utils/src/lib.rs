//! Test fixtures for Weft development.
//!
//! Schedulers with fixed diagnostics, seeded input data, and payloads that
//! fail or block on demand.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use weft_sched::{Diagnostic, DiagnosticsConfig, Scheduler, SchedulerConfig};

/// A scheduler whose diagnostics deny, regardless of build profile.
pub fn strict_scheduler(workers: usize) -> Scheduler {
    scheduler_with(workers, DiagnosticsConfig::strict())
}

/// A scheduler whose aliasing check only warns.
pub fn lenient_scheduler(workers: usize) -> Scheduler {
    scheduler_with(
        workers,
        DiagnosticsConfig {
            aliasing: Diagnostic::Warn,
            scoped_overdue: Diagnostic::Warn,
        },
    )
}

pub fn scheduler_with(workers: usize, diagnostics: DiagnosticsConfig) -> Scheduler {
    let config = SchedulerConfig {
        diagnostics,
        shutdown_timeout_ms: 2_000,
        ..SchedulerConfig::with_workers(workers)
    };
    Scheduler::new(config).expect("test scheduler config is valid")
}

/// Deterministic integers in `-1000..1000`.
pub fn seeded_i32(seed: u64, len: usize) -> Vec<i32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1000..1000)).collect()
}

/// Deterministic floats in `[-1, 1)`.
pub fn seeded_f32(seed: u64, len: usize) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Deterministic bytes.
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.random()).collect()
}
