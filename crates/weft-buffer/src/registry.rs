//! Live-buffer bookkeeping: id allocation, capacity, and cycle epochs.

use std::any::type_name;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use weft_core::{BufferError, BufferId, CycleId, LifetimeClass, RegistryId};

use crate::buffer::Buffer;
use crate::config::RegistryConfig;
use crate::element::Element;
use crate::shared::BufferShared;
use crate::storage::ByteStorage;

/// A scoped buffer that outlived its cycle budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverdueBuffer {
    /// The overdue buffer.
    pub id: BufferId,
    /// Cycle current when the buffer was created.
    pub allocated: CycleId,
    /// The declared budget.
    pub max_cycles_alive: u32,
    /// Element type name, for diagnostics.
    pub element_type: &'static str,
    /// Allocation size.
    pub byte_len: usize,
}

struct Entry {
    byte_len: usize,
    lifetime: LifetimeClass,
    allocated: CycleId,
    element_type: &'static str,
    overdue_reported: bool,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct RegistryState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live_bytes: usize,
    live_count: usize,
    cycle: CycleId,
}

struct RegistryInner {
    id: RegistryId,
    config: RegistryConfig,
    state: Mutex<RegistryState>,
}

/// Allocator and ledger for every live [`Buffer`].
///
/// Cheap to clone; clones share one ledger. Slots are reused after release
/// with their generation bumped, so stale [`BufferId`]s never match.
#[derive(Clone)]
pub struct BufferRegistry {
    inner: Arc<RegistryInner>,
}

impl BufferRegistry {
    /// Create an empty registry at cycle 0.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                id: RegistryId::next(),
                config,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// This registry's process-unique id.
    pub fn id(&self) -> RegistryId {
        self.inner.id
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a zero-initialised buffer of `len` elements.
    ///
    /// Fails with [`BufferError::AllocationFailed`] for a zero length, a
    /// zero-sized element type, a byte size that overflows, a request that
    /// would exceed the configured limits, or an allocator refusal.
    pub fn create<T: Element>(
        &self,
        len: usize,
        lifetime: LifetimeClass,
    ) -> Result<Buffer<T>, BufferError> {
        let elem = std::mem::size_of::<T>();
        let fail = |requested_bytes: usize, reason: &str| BufferError::AllocationFailed {
            requested_bytes,
            reason: reason.to_string(),
        };
        if len == 0 {
            return Err(fail(0, "length must be at least 1"));
        }
        if elem == 0 {
            return Err(fail(0, "zero-sized element type"));
        }
        let byte_len = len
            .checked_mul(elem)
            .ok_or_else(|| fail(usize::MAX, "byte size overflows usize"))?;

        let id = self.reserve(byte_len, lifetime, type_name::<T>())?;
        let storage = match ByteStorage::try_zeroed(byte_len) {
            Ok(s) => s,
            Err(e) => {
                self.unregister(id);
                return Err(e);
            }
        };
        tracing::trace!(buffer = %id, elements = len, byte_len, ?lifetime, "buffer created");
        let shared = BufferShared::new(id, storage, type_name::<T>());
        Ok(Buffer::new(self.clone(), Arc::new(shared), len, lifetime))
    }

    /// Allocate a buffer and copy `data` into it.
    pub fn create_from_slice<T: Element>(
        &self,
        data: &[T],
        lifetime: LifetimeClass,
    ) -> Result<Buffer<T>, BufferError> {
        let mut buffer = self.create(data.len(), lifetime)?;
        buffer.copy_from(data)?;
        Ok(buffer)
    }

    fn reserve(
        &self,
        byte_len: usize,
        lifetime: LifetimeClass,
        element_type: &'static str,
    ) -> Result<BufferId, BufferError> {
        let config = &self.inner.config;
        let mut state = self.state();
        if state.live_count >= config.max_buffers {
            return Err(BufferError::AllocationFailed {
                requested_bytes: byte_len,
                reason: format!("registry holds the maximum of {} buffers", config.max_buffers),
            });
        }
        let within_budget = state
            .live_bytes
            .checked_add(byte_len)
            .is_some_and(|total| total <= config.max_bytes);
        if !within_budget {
            return Err(BufferError::AllocationFailed {
                requested_bytes: byte_len,
                reason: format!(
                    "{} of {} registry bytes in use",
                    state.live_bytes, config.max_bytes
                ),
            });
        }

        let entry = Entry {
            byte_len,
            lifetime,
            allocated: state.cycle,
            element_type,
            overdue_reported: false,
        };
        let id = match state.free.pop() {
            Some(index) => {
                let slot = &mut state.slots[index as usize];
                slot.entry = Some(entry);
                BufferId::new(self.inner.id, index, slot.generation)
            }
            None => {
                let index = u32::try_from(state.slots.len()).map_err(|_| {
                    BufferError::AllocationFailed {
                        requested_bytes: byte_len,
                        reason: "buffer index space exhausted".to_string(),
                    }
                })?;
                state.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                BufferId::new(self.inner.id, index, 0)
            }
        };
        state.live_bytes += byte_len;
        state.live_count += 1;
        Ok(id)
    }

    /// Drop the ledger entry for `id`. Returns `false` if it was not live.
    pub(crate) fn unregister(&self, id: BufferId) -> bool {
        if id.registry != self.inner.id {
            return false;
        }
        let mut state = self.state();
        let Some(slot) = state.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation {
            return false;
        }
        let Some(entry) = slot.entry.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        state.free.push(id.index);
        state.live_bytes -= entry.byte_len;
        state.live_count -= 1;
        true
    }

    /// Whether `id` names a buffer that has not been released.
    pub fn is_live(&self, id: BufferId) -> bool {
        if id.registry != self.inner.id {
            return false;
        }
        let state = self.state();
        state
            .slots
            .get(id.index as usize)
            .is_some_and(|s| s.generation == id.generation && s.entry.is_some())
    }

    /// The current cycle.
    pub fn current_cycle(&self) -> CycleId {
        self.state().cycle
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.state().live_count
    }

    /// Total bytes held by live buffers.
    pub fn live_bytes(&self) -> usize {
        self.state().live_bytes
    }

    /// Cross a scheduling boundary.
    ///
    /// Returns the new cycle and every scoped buffer that became overdue at
    /// it, in slot order. A buffer created at cycle `c` with budget `k` is
    /// overdue at cycle `n` once `n - c > k`; each buffer is reported once.
    pub fn advance_cycle(&self) -> (CycleId, Vec<OverdueBuffer>) {
        let mut state = self.state();
        state.cycle = CycleId(state.cycle.0 + 1);
        let now = state.cycle;
        let mut overdue = Vec::new();
        for (index, slot) in state.slots.iter_mut().enumerate() {
            let generation = slot.generation;
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            let Some(budget) = entry.lifetime.max_cycles_alive() else {
                continue;
            };
            if entry.overdue_reported || entry.allocated.cycles_until(now) <= u64::from(budget) {
                continue;
            }
            entry.overdue_reported = true;
            overdue.push(OverdueBuffer {
                id: BufferId::new(self.inner.id, index as u32, generation),
                allocated: entry.allocated,
                max_cycles_alive: budget,
                element_type: entry.element_type,
                byte_len: entry.byte_len,
            });
        }
        (now, overdue)
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for BufferRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("BufferRegistry")
            .field("cycle", &state.cycle)
            .field("live_count", &state.live_count)
            .field("live_bytes", &state.live_bytes)
            .finish()
    }
}
