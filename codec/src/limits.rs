//! Limits for snapshot encoding and decoding.

/// Codec-specific limits enforced on snapshot bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum number of entity records in one snapshot.
    pub max_entities: usize,
    /// Maximum number of fields in one entity record.
    pub max_fields_per_entity: usize,
    /// Maximum size of one entity record's field data.
    pub max_record_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_entities: 4096,
            max_fields_per_entity: 255,
            max_record_bytes: u16::MAX as usize,
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_entities: 32,
            max_fields_per_entity: 16,
            max_record_bytes: 512,
        }
    }

    /// Creates limits bounded only by the wire format itself.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_entities: u32::MAX as usize,
            max_fields_per_entity: u16::MAX as usize,
            max_record_bytes: u16::MAX as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_reasonable() {
        let limits = CodecLimits::default();
        assert_eq!(limits.max_entities, 4096);
        assert_eq!(limits.max_fields_per_entity, 255);
        assert_eq!(limits.max_record_bytes, 65535);
    }

    #[test]
    fn testing_limits_smaller() {
        let test_limits = CodecLimits::for_testing();
        let default_limits = CodecLimits::default();
        assert!(test_limits.max_entities < default_limits.max_entities);
        assert!(test_limits.max_record_bytes < default_limits.max_record_bytes);
    }

    #[test]
    fn unlimited_stays_within_wire_widths() {
        let limits = CodecLimits::unlimited();
        assert!(limits.max_record_bytes <= u16::MAX as usize);
        assert!(limits.max_fields_per_entity <= u16::MAX as usize);
    }
}
