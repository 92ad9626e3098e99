//! Minute Rotation Task
//!
//! [`RequestTimeSeries::rotate`] must be called once per minute from exactly
//! one place. This module owns that place: a tokio task ticking on a fixed
//! interval, independent of request traffic.
//!
//! ```ignore
//! let stats = Arc::new(RequestTimeSeries::new());
//! let handle = spawn_rotation(stats.clone(), ROTATION_PERIOD);
//!
//! // During shutdown:
//! handle.abort();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::time_series::RequestTimeSeries;

/// Production cadence: one slot per minute.
pub const ROTATION_PERIOD: Duration = Duration::from_secs(60);

/// Spawn the rotation loop.
///
/// The first rotation happens one full `period` after the call. Missed ticks
/// (a stalled runtime) are skipped rather than replayed, so a stall shows up
/// as a single long minute instead of a burst of empty ones.
pub fn spawn_rotation(
    stats: Arc<RequestTimeSeries>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            stats.rotate();
            tracing::trace!(
                index = stats.current_index(),
                minutes = stats.minutes_collected(),
                "Request time series rotated"
            );
        }
    })
}
