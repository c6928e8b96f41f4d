//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Counter for unique [`RegistryId`] allocation.
static REGISTRY_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Identity of one buffer registry within the process.
///
/// Every registry takes a fresh id at construction, so buffers from two
/// registries never share a [`BufferId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(pub u32);

impl RegistryId {
    /// Allocate a fresh, never-before-returned id. Thread-safe.
    pub fn next() -> Self {
        Self(REGISTRY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifies a buffer within the process.
///
/// The `registry` names the allocating registry and the `index` one of its
/// slots. The `generation` is bumped every time the slot is reused, so an
/// id captured before a release never compares equal to the buffer that
/// later occupies the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId {
    /// The registry that allocated the buffer.
    pub registry: RegistryId,
    /// Registry slot index.
    pub index: u32,
    /// Slot generation at allocation time.
    pub generation: u32,
}

impl BufferId {
    /// Create an id from its parts.
    pub const fn new(registry: RegistryId, index: u32, generation: u32) -> Self {
        Self {
            registry,
            index,
            generation,
        }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer#{}v{}@{}",
            self.index, self.generation, self.registry
        )
    }
}

/// Counter for unique [`TaskId`] allocation.
static TASK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a task within the process.
///
/// Allocated from a monotonic atomic counter when the task is built, so two
/// tasks never share an id even across schedulers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a fresh, never-before-returned id. Thread-safe.
    pub fn next() -> Self {
        Self(TASK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Monotonically increasing scheduling-cycle counter.
///
/// A cycle is one scheduling period, typically one rendered frame. The
/// counter starts at 0 and advances at each scheduling boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(pub u64);

impl CycleId {
    /// Number of boundaries crossed between `self` and a later cycle.
    pub fn cycles_until(self, later: CycleId) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CycleId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
