//! Request/response time synchronization against the server clock.

use log::{debug, info};
use wire::{ClockSyncRequest, ClockSyncResponse};

use crate::config::TimeSyncConfig;
use crate::delta::ClockDelta;

/// What a CLOCK_SYNC_RESPONSE led to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// The response belonged to an earlier request.
    Ignored,
    /// Uncertainty is still too high; send this request again.
    Retry(ClockSyncRequest),
    /// The clock is synchronized within the configured bound.
    Synced { uncertainty: f64 },
    /// Attempts ran out; the best estimate so far is kept.
    GaveUp { uncertainty: f64 },
}

/// Client side of the clock sync cycle.
///
/// Each sync sends a request tagged with a wrapping context byte and
/// measures the round trip. The midpoint of the round trip is paired with
/// the server's timestamp; half the round trip bounds the error.
#[derive(Debug, Clone)]
pub struct TimeSync {
    config: TimeSyncConfig,
    this_context: Option<u8>,
    next_context: u8,
    attempts: u32,
    start: f64,
    last_attempt: Option<f64>,
}

impl TimeSync {
    #[must_use]
    pub const fn new(config: TimeSyncConfig) -> Self {
        Self {
            config,
            this_context: None,
            next_context: 0,
            attempts: 0,
            start: 0.0,
            last_attempt: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TimeSyncConfig {
        &self.config
    }

    /// The context of the outstanding request, if any.
    #[must_use]
    pub const fn pending_context(&self) -> Option<u8> {
        self.this_context
    }

    /// Starts a new sync unless the previous one began less than
    /// `min_wait` seconds ago.
    pub fn synchronize(&mut self, now: f64, reason: &str) -> Option<ClockSyncRequest> {
        if let Some(last) = self.last_attempt {
            let since = now - last;
            debug!("time since last clock sync: {since:.3}s");
            if since < self.config.min_wait {
                return None;
            }
        }

        let context = self.next_context;
        self.this_context = Some(context);
        self.next_context = context.wrapping_add(1);
        self.attempts = 0;
        self.start = now;
        self.last_attempt = Some(now);
        info!("clock sync: {reason}");
        Some(ClockSyncRequest { context })
    }

    /// Applies the server's answer to `clock`.
    pub fn handle_response(
        &mut self,
        clock: &mut ClockDelta,
        now: f64,
        response: &ClockSyncResponse,
    ) -> SyncOutcome {
        if self.this_context != Some(response.context) {
            info!(
                "ignoring clock sync response for old context {}",
                response.context
            );
            return SyncOutcome::Ignored;
        }

        let elapsed = now - self.start;
        self.attempts += 1;
        info!("clock sync round trip took {:.1} ms", elapsed * 1000.0);

        let skew = self.config.extra_skew;
        let midpoint = (self.start + now) / 2.0 - skew;
        let uncertainty = elapsed / 2.0 + skew.abs();
        clock.resynchronize(midpoint, response.timestamp, uncertainty, elapsed / 2.0, true);

        let uncertainty = clock.uncertainty(now).unwrap_or(uncertainty);
        info!("local clock uncertainty +/- {uncertainty:.4}s");

        if uncertainty > self.config.max_uncertainty {
            if self.attempts < self.config.max_attempts {
                info!("clock uncertainty too high, trying again");
                self.start = now;
                return SyncOutcome::Retry(ClockSyncRequest {
                    context: response.context,
                });
            }
            info!("giving up on clock uncertainty requirement");
            self.this_context = None;
            return SyncOutcome::GaveUp { uncertainty };
        }

        self.this_context = None;
        SyncOutcome::Synced { uncertainty }
    }
}
