//! Scheduler configuration, diagnostics policy, and validation.

use std::error::Error;
use std::fmt;

use weft_buffer::RegistryConfig;

// ── Diagnostic ─────────────────────────────────────────────────────

/// What to do when a diagnostic check fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Fail the operation with an error.
    Deny,
    /// Log through `tracing::warn!` and proceed.
    Warn,
    /// Skip the check entirely.
    Off,
}

impl Diagnostic {
    /// `Deny` in debug builds, `Off` in release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Deny
        } else {
            Self::Off
        }
    }

    /// Whether the check runs at all.
    pub fn is_enabled(self) -> bool {
        self != Self::Off
    }
}

/// Policies for the scheduler's diagnostic checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Conflicting views between concurrently runnable tasks, or within
    /// one task.
    pub aliasing: Diagnostic,
    /// Scoped buffers still alive past their cycle budget.
    pub scoped_overdue: Diagnostic,
}

impl DiagnosticsConfig {
    /// Every check denies.
    pub fn strict() -> Self {
        Self {
            aliasing: Diagnostic::Deny,
            scoped_overdue: Diagnostic::Deny,
        }
    }

    /// Every check is skipped.
    pub fn off() -> Self {
        Self {
            aliasing: Diagnostic::Off,
            scoped_overdue: Diagnostic::Off,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            aliasing: Diagnostic::for_build(),
            scoped_overdue: Diagnostic::for_build(),
        }
    }
}

// ── SchedulerConfig ────────────────────────────────────────────────

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of worker threads. `None` = one per available core, clamped
    /// to `[1, MAX_WORKERS]`.
    pub worker_count: Option<usize>,
    /// Diagnostic policies.
    pub diagnostics: DiagnosticsConfig,
    /// How long `shutdown` waits for live tasks before cancelling the ones
    /// that have not started. Default: 1000.
    pub shutdown_timeout_ms: u64,
    /// Limits for the scheduler's buffer registry.
    pub registry: RegistryConfig,
}

impl SchedulerConfig {
    /// Upper bound on explicit worker counts.
    pub const MAX_WORKERS: usize = 256;

    /// Default drain budget at shutdown.
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1000;

    /// A config with `workers` threads and default everything else.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            worker_count: Some(workers),
            ..Self::default()
        }
    }

    /// Resolve the actual worker count, applying auto-detection if `None`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, Self::MAX_WORKERS),
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(n) = self.worker_count {
            if n == 0 || n > Self::MAX_WORKERS {
                return Err(ConfigError::InvalidWorkerCount { configured: n });
            }
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::ZeroShutdownTimeout);
        }
        if self.registry.max_buffers == 0 {
            return Err(ConfigError::InvalidRegistry {
                reason: "max_buffers must be at least 1".into(),
            });
        }
        if self.registry.max_bytes == 0 {
            return Err(ConfigError::InvalidRegistry {
                reason: "max_bytes must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            diagnostics: DiagnosticsConfig::default(),
            shutdown_timeout_ms: Self::DEFAULT_SHUTDOWN_TIMEOUT_MS,
            registry: RegistryConfig::default(),
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while constructing a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Worker count is zero or above [`SchedulerConfig::MAX_WORKERS`].
    InvalidWorkerCount {
        /// The configured count.
        configured: usize,
    },
    /// `shutdown_timeout_ms` is zero.
    ZeroShutdownTimeout,
    /// Registry limits are unusable.
    InvalidRegistry {
        /// Which limit is invalid.
        reason: String,
    },
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWorkerCount { configured } => write!(
                f,
                "worker_count {configured} is outside [1, {}]",
                SchedulerConfig::MAX_WORKERS
            ),
            Self::ZeroShutdownTimeout => write!(f, "shutdown_timeout_ms must be at least 1"),
            Self::InvalidRegistry { reason } => write!(f, "invalid registry config: {reason}"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.resolved_worker_count() >= 1);
    }

    #[test]
    fn zero_workers_rejected() {
        assert_eq!(
            SchedulerConfig::with_workers(0).validate(),
            Err(ConfigError::InvalidWorkerCount { configured: 0 })
        );
    }

    #[test]
    fn too_many_workers_rejected() {
        assert!(SchedulerConfig::with_workers(SchedulerConfig::MAX_WORKERS + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = SchedulerConfig {
            shutdown_timeout_ms: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroShutdownTimeout));
    }

    #[test]
    fn diagnostics_follow_build_profile() {
        let d = DiagnosticsConfig::default();
        if cfg!(debug_assertions) {
            assert_eq!(d.aliasing, Diagnostic::Deny);
        } else {
            assert_eq!(d.aliasing, Diagnostic::Off);
        }
        assert!(!Diagnostic::Off.is_enabled());
    }
}
