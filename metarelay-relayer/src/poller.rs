//! Background event reconciliation.

use std::time::Duration;

use metarelay::{ChainRpc, EventPoller};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Polls `poller` every `interval` until `shutdown` is cancelled.
///
/// Errors are logged and the next tick retries from the cursor, so a node
/// outage only delays the projection.
pub async fn run_event_poller<R: ChainRpc>(
    tag: String,
    mut poller: EventPoller<R>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => match poller.poll().await {
                Ok(0) => {}
                Ok(added) => tracing::info!(deployment = %tag, added, cursor = poller.cursor(), "registrations reconciled"),
                Err(e) => tracing::warn!(deployment = %tag, error = %e, kind = e.kind(), "event poll failed"),
            },
        }
    }
    tracing::debug!(deployment = %tag, "event poller stopped");
}
