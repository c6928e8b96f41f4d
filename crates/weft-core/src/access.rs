//! Access modes and buffer lifetime classes.

use std::fmt;

/// How a view may touch the memory it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Loads only.
    ReadOnly,
    /// Stores only.
    WriteOnly,
    /// Loads and stores.
    ReadWrite,
}

impl AccessMode {
    /// Whether this mode permits loads.
    pub fn can_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Whether this mode permits stores.
    pub fn can_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// Two accesses to overlapping memory conflict when either one mutates.
    pub fn conflicts_with(self, other: AccessMode) -> bool {
        self.can_write() || other.can_write()
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::WriteOnly => write!(f, "write-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// How long a buffer is expected to live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifetimeClass {
    /// Survives across any number of cycles; released at teardown.
    Persistent,
    /// Must be released within `max_cycles_alive` scheduling boundaries of
    /// its allocation. Overdue buffers are reported, not silently leaked.
    Scoped {
        /// Number of boundaries the buffer may survive.
        max_cycles_alive: u32,
    },
}

impl LifetimeClass {
    /// Shorthand for `Scoped { max_cycles_alive }`.
    pub const fn scoped(max_cycles_alive: u32) -> Self {
        Self::Scoped { max_cycles_alive }
    }

    /// The cycle budget, or `None` for persistent buffers.
    pub fn max_cycles_alive(self) -> Option<u32> {
        match self {
            Self::Persistent => None,
            Self::Scoped { max_cycles_alive } => Some(max_cycles_alive),
        }
    }
}
