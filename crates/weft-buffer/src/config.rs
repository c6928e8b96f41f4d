//! Registry capacity limits.

/// Configuration for a [`BufferRegistry`](crate::BufferRegistry).
///
/// Both limits bound live (unreleased) buffers only; releasing a buffer
/// returns its bytes and its slot.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Maximum total bytes across live buffers.
    ///
    /// Default: 4 GiB (saturated to `usize::MAX` on 32-bit targets).
    pub max_bytes: usize,

    /// Maximum number of live buffers. Default: 65_536.
    pub max_buffers: usize,
}

impl RegistryConfig {
    /// Default byte budget.
    pub const DEFAULT_MAX_BYTES: u64 = 4 * 1024 * 1024 * 1024;

    /// Default live-buffer budget.
    pub const DEFAULT_MAX_BUFFERS: usize = 65_536;

    /// A config with no practical limits.
    pub fn unbounded() -> Self {
        Self {
            max_bytes: usize::MAX,
            max_buffers: u32::MAX as usize,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_bytes: usize::try_from(Self::DEFAULT_MAX_BYTES).unwrap_or(usize::MAX),
            max_buffers: Self::DEFAULT_MAX_BUFFERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_buffers, 65_536);
        assert!(config.max_bytes >= u32::MAX as usize);
    }
}
