//! Configurable limits for bounded decoding.

/// Wire-level limits for message decoding.
///
/// These limits are enforced during decoding to prevent resource exhaustion
/// and bound memory use per datagram. Snapshot and command body limits
/// belong to higher layers (codec/command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum datagram size in bytes.
    pub max_message_bytes: usize,

    /// Maximum length of a string in a control message.
    pub max_string_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // 64 KB is generous for most realtime scenarios
            max_message_bytes: 64 * 1024,
            max_string_bytes: 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_message_bytes: 4096,
            max_string_bytes: 64,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_message_bytes: usize::MAX,
            max_string_bytes: usize::MAX,
        }
    }
}
