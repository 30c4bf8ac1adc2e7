//! Clock delta estimation.

use log::{debug, info};

use crate::config::ClockConfig;
use crate::error::ClockResult;

/// Sign-extends the low 16 bits of `value`.
#[must_use]
pub const fn sign_extend16(value: i32) -> i32 {
    (value.wrapping_add(32768) & 0xFFFF) - 32768
}

/// Estimated offset between the local clock and network time.
///
/// `delta` is `local - network` in seconds. The estimate carries an
/// uncertainty that grows with the configured drift rate until the next
/// resync; intersecting a new sample with the grown interval can only
/// narrow it. All times are seconds on the local clock, passed in by the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockDelta {
    config: ClockConfig,
    delta: f64,
    uncertainty: Option<f64>,
    last_resync: f64,
    latency: f64,
}

impl ClockDelta {
    pub fn new(config: ClockConfig) -> ClockResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            delta: 0.0,
            uncertainty: None,
            last_resync: 0.0,
            latency: 0.0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ClockConfig {
        &self.config
    }

    #[must_use]
    pub const fn delta(&self) -> f64 {
        self.delta
    }

    /// Current uncertainty, grown by drift since the last resync. `None`
    /// until the first sync.
    #[must_use]
    pub fn uncertainty(&self, now: f64) -> Option<f64> {
        self.uncertainty.map(|uncertainty| {
            let elapsed = now - self.last_resync;
            uncertainty + elapsed * self.config.clock_drift_per_second
        })
    }

    #[must_use]
    pub const fn is_synchronized(&self) -> bool {
        self.uncertainty.is_some()
    }

    #[must_use]
    pub const fn latency(&self) -> f64 {
        self.latency
    }

    #[must_use]
    pub const fn last_resync(&self) -> f64 {
        self.last_resync
    }

    pub fn clear(&mut self) {
        self.delta = 0.0;
        self.uncertainty = None;
        self.last_resync = 0.0;
        self.latency = 0.0;
    }

    /// Folds a candidate delta into the estimate.
    ///
    /// Overlapping intervals are intersected. Disjoint intervals replace the
    /// estimate when `trust_new` is set and are otherwise discarded, in which
    /// case `false` is returned and nothing changes.
    pub fn new_delta(
        &mut self,
        local_time: f64,
        mut candidate: f64,
        mut candidate_uncertainty: f64,
        trust_new: bool,
    ) -> bool {
        if let Some(old_uncertainty) = self.uncertainty(local_time) {
            debug!(
                "previous delta {:.4}s +/- {old_uncertainty:.4}s, new {candidate:.4}s +/- {candidate_uncertainty:.4}s",
                self.delta
            );
            let low = (self.delta - old_uncertainty).max(candidate - candidate_uncertainty);
            let high = (self.delta + old_uncertainty).min(candidate + candidate_uncertainty);

            if low > high {
                if !trust_new {
                    info!("discarding new clock delta {candidate:.4}s");
                    return false;
                }
                info!("discarding previous clock delta {:.4}s", self.delta);
            } else {
                candidate = (low + high) / 2.0;
                candidate_uncertainty = (high - low) / 2.0;
            }
        }

        self.delta = candidate;
        self.uncertainty = Some(candidate_uncertainty);
        self.last_resync = local_time;
        true
    }

    /// Resyncs from a network timestamp observed at `local_time`.
    pub fn resynchronize(
        &mut self,
        local_time: f64,
        network_time: i32,
        uncertainty: f64,
        latency: f64,
        trust_new: bool,
    ) -> bool {
        let candidate = local_time - f64::from(network_time) / self.config.network_time_precision;
        let accepted = self.new_delta(local_time, candidate, uncertainty, trust_new);
        self.latency = latency;
        accepted
    }

    /// Resyncs from a peer's report of its own time.
    ///
    /// `timestamp` is the network time at which our request was sent and
    /// `peer_time` the peer's network-relative time on receipt. Requests are
    /// rate limited by `p2p_resync_delay`, and answers older than that delay
    /// are ignored.
    pub fn peer_resync(&mut self, now: f64, timestamp: i32, peer_time: f64, uncertainty: f64) -> bool {
        let delay = self.config.p2p_resync_delay;
        if now - self.last_resync < delay {
            return false;
        }

        let local = self.network_to_local_time(timestamp, now);
        let elapsed = now - local;
        if elapsed <= 0.0 || elapsed > delay {
            info!("ignoring stale peer resync, elapsed {elapsed:.3}s");
            return false;
        }

        let candidate = (local + now) / 2.0 - peer_time - elapsed / 2.0;
        info!("peer sync +/- {uncertainty:.4}s, elapsed {elapsed:.3}s");
        self.new_delta(local, candidate, uncertainty, false)
    }

    /// Converts a wire timestamp to local time using the configured width
    /// and precision.
    #[must_use]
    pub fn network_to_local_time(&self, network_time: i32, now: f64) -> f64 {
        self.network_to_local_time_with(
            network_time,
            now,
            self.config.network_time_bits,
            self.config.network_time_precision,
        )
    }

    /// Converts a wire timestamp to local time.
    ///
    /// With 16-bit timestamps only the difference from the network time
    /// predicted at `now` is sign-extended, so values on either side of the
    /// wrap map to nearby local times.
    #[must_use]
    pub fn network_to_local_time_with(
        &self,
        network_time: i32,
        now: f64,
        bits: u32,
        ticks_per_sec: f64,
    ) -> f64 {
        let predicted = ((now - self.delta) * ticks_per_sec + 0.5).floor() as i64;
        let raw = (i64::from(network_time) - predicted) as i32;
        let diff = if bits == 16 { sign_extend16(raw) } else { raw };
        now + f64::from(diff) / ticks_per_sec
    }

    /// Network time at `local_time` using the configured width and precision.
    #[must_use]
    pub fn local_to_network_time(&self, local_time: f64) -> i32 {
        self.local_to_network_time_with(
            local_time,
            self.config.network_time_bits,
            self.config.network_time_precision,
        )
    }

    #[must_use]
    pub fn local_to_network_time_with(&self, local_time: f64, bits: u32, ticks_per_sec: f64) -> i32 {
        let ticks = ((local_time - self.delta) * ticks_per_sec + 0.5).floor() as i64 as i32;
        if bits == 16 {
            sign_extend16(ticks)
        } else {
            ticks
        }
    }

    /// Seconds since the wire timestamp, never negative.
    #[must_use]
    pub fn local_elapsed_time(&self, network_time: i32, now: f64) -> f64 {
        (now - self.network_to_local_time(network_time, now)).max(0.0)
    }

    /// Shifts the estimate after the local clock jumped by `offset` seconds.
    pub fn reset_clock(&mut self, offset: f64) {
        self.delta += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn clock() -> ClockDelta {
        ClockDelta::new(ClockConfig::default()).unwrap()
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend16(0), 0);
        assert_eq!(sign_extend16(32767), 32767);
        assert_eq!(sign_extend16(32768), -32768);
        assert_eq!(sign_extend16(65535), -1);
        assert_eq!(sign_extend16(65536 + 5), 5);
        assert_eq!(sign_extend16(-65534), 2);
    }

    #[test]
    fn first_sample_is_adopted() {
        let mut clock = clock();
        assert_eq!(clock.uncertainty(0.0), None);
        assert!(clock.new_delta(5.0, 1.5, 0.25, false));
        assert!(approx(clock.delta(), 1.5));
        assert!(approx(clock.uncertainty(5.0).unwrap(), 0.25));
        assert!(approx(clock.last_resync(), 5.0));
    }

    #[test]
    fn uncertainty_grows_with_drift() {
        let mut clock = clock();
        clock.new_delta(0.0, 0.0, 0.1, true);
        assert!(approx(clock.uncertainty(3600.0).unwrap(), 1.1));
    }

    #[test]
    fn overlap_takes_the_intersection() {
        let mut clock = clock();
        clock.new_delta(0.0, 1.0, 0.5, true);
        // [0.5, 1.5] and [1.2, 1.6] intersect in [1.2, 1.5].
        assert!(clock.new_delta(0.0, 1.4, 0.2, false));
        assert!(approx(clock.delta(), 1.35));
        assert!(approx(clock.uncertainty(0.0).unwrap(), 0.15));
    }

    #[test]
    fn disjoint_untrusted_is_discarded() {
        let mut clock = clock();
        clock.new_delta(0.0, 1.0, 0.1, true);
        assert!(!clock.new_delta(1.0, 5.0, 0.1, false));
        assert!(approx(clock.delta(), 1.0));
        assert!(approx(clock.last_resync(), 0.0));
    }

    #[test]
    fn disjoint_trusted_replaces() {
        let mut clock = clock();
        clock.new_delta(0.0, 1.0, 0.1, true);
        assert!(clock.new_delta(1.0, 5.0, 0.3, true));
        assert!(approx(clock.delta(), 5.0));
        assert!(approx(clock.uncertainty(1.0).unwrap(), 0.3));
    }

    #[test]
    fn resynchronize_uses_precision() {
        let mut clock = clock();
        clock.resynchronize(20.0, 1500, 0.05, 0.1, true);
        assert!(approx(clock.delta(), 5.0));
        assert!(approx(clock.latency(), 0.1));
    }

    #[test]
    fn wire_time_after_wraparound_stays_close() {
        let clock = clock();
        let now = 655.35;
        let at_max = clock.network_to_local_time(65535, now);
        let after_wrap = clock.network_to_local_time(0, now);
        let one_more = clock.network_to_local_time(1, now);
        assert!(approx(after_wrap - at_max, 0.01));
        assert!(approx(one_more - at_max, 0.02));
    }

    #[test]
    fn local_network_roundtrip() {
        let mut clock = clock();
        clock.new_delta(0.0, 12.5, 0.01, true);
        let now = 700.0;
        let net = clock.local_to_network_time(now);
        assert!((-32768..=32767).contains(&net));
        assert!(approx(clock.network_to_local_time(net, now), now));
    }

    #[test]
    fn thirty_two_bit_timestamps_do_not_wrap() {
        let clock = clock();
        let net = clock.local_to_network_time_with(1000.0, 32, 100.0);
        assert_eq!(net, 100_000);
        assert!(approx(clock.network_to_local_time_with(net, 1000.0, 32, 100.0), 1000.0));
    }

    #[test]
    fn elapsed_is_clamped() {
        let clock = clock();
        let now = 10.0;
        let future = clock.local_to_network_time(now + 1.0);
        assert!(approx(clock.local_elapsed_time(future, now), 0.0));
        let past = clock.local_to_network_time(now - 0.5);
        assert!(approx(clock.local_elapsed_time(past, now), 0.5));
    }

    #[test]
    fn peer_resync_rate_limited_and_stale() {
        let mut clock = clock();
        clock.new_delta(100.0, 0.0, 0.5, true);
        // Within the resync delay.
        assert!(!clock.peer_resync(105.0, 0, 0.0, 0.1));

        // Sent 20 s ago, older than the delay.
        let stale = clock.local_to_network_time(100.0);
        assert!(!clock.peer_resync(120.0, stale, 120.0, 0.1));

        // Sent 1 s ago; the peer's time matches ours.
        let sent = clock.local_to_network_time(119.0);
        assert!(clock.peer_resync(120.0, sent, 119.0, 0.1));
        assert!(approx(clock.last_resync(), 119.0));
    }

    #[test]
    fn reset_clock_shifts_delta() {
        let mut clock = clock();
        clock.new_delta(0.0, 2.0, 0.1, true);
        clock.reset_clock(-0.5);
        assert!(approx(clock.delta(), 1.5));
        clock.clear();
        assert!(!clock.is_synchronized());
    }
}
