//! Marshalling limits.

/// Largest array the bus accepts: 64 MiB.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 67_108_864;

/// Knobs applied while marshalling host values.
///
/// ```rust
/// use dbus_marshal::MarshalConfig;
///
/// let config = MarshalConfig::default().max_array_length(16);
/// assert_eq!(config.max_array_len(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalConfig {
    max_array_length: usize,
}

impl MarshalConfig {
    pub const fn new() -> Self {
        MarshalConfig {
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }

    /// Set the largest number of elements any single array or dict may hold.
    pub const fn max_array_length(mut self, max: usize) -> Self {
        self.max_array_length = max;
        self
    }

    pub const fn max_array_len(&self) -> usize {
        self.max_array_length
    }
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self::new()
    }
}
