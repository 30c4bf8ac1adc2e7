use crate::error::{ClockError, ClockResult};

/// Parameters of the clock delta model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    /// Network time ticks per second.
    pub network_time_precision: f64,
    /// Width of wire timestamps: 16 (wrapping) or 32.
    pub network_time_bits: u32,
    /// Seconds of uncertainty gained per second since the last resync.
    pub clock_drift_per_second: f64,
    /// Minimum seconds between peer resyncs.
    pub p2p_resync_delay: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            network_time_precision: 100.0,
            network_time_bits: 16,
            clock_drift_per_second: 1.0 / 3600.0,
            p2p_resync_delay: 10.0,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> ClockResult<()> {
        if !(self.network_time_precision.is_finite() && self.network_time_precision > 0.0) {
            return Err(ClockError::InvalidPrecision {
                value: self.network_time_precision,
            });
        }
        if !matches!(self.network_time_bits, 16 | 32) {
            return Err(ClockError::UnsupportedBits {
                bits: self.network_time_bits,
            });
        }
        if !(self.clock_drift_per_second.is_finite() && self.clock_drift_per_second >= 0.0) {
            return Err(ClockError::InvalidDriftRate {
                value: self.clock_drift_per_second,
            });
        }
        Ok(())
    }
}

/// Retry policy of the request/response sync cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSyncConfig {
    /// Seconds between sync attempts.
    pub min_wait: f64,
    /// Uncertainty above which the request is repeated.
    pub max_uncertainty: f64,
    /// Requests per sync before accepting a poor result.
    pub max_attempts: u32,
    /// Known asymmetric skew subtracted from every sample.
    pub extra_skew: f64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            min_wait: 10.0,
            max_uncertainty: 1.0,
            max_attempts: 5,
            extra_skew: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ClockConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let zero = ClockConfig {
            network_time_precision: 0.0,
            ..ClockConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ClockError::InvalidPrecision { .. })
        ));

        let bits = ClockConfig {
            network_time_bits: 24,
            ..ClockConfig::default()
        };
        assert_eq!(bits.validate(), Err(ClockError::UnsupportedBits { bits: 24 }));

        let drift = ClockConfig {
            clock_drift_per_second: f64::NAN,
            ..ClockConfig::default()
        };
        assert!(matches!(
            drift.validate(),
            Err(ClockError::InvalidDriftRate { .. })
        ));
    }
}
