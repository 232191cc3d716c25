use crate::{messages::ToCoordinator, CoordinatorHandle};
use std::time::Duration;

/// Schedules a self-delivered `Retry` after the backoff for retry
/// attempt `attempt` (1-indexed) elapses: `2^attempt` seconds.
/// `attempt = 0` would be the untried initial attempt and is never
/// scheduled here (it runs immediately, with no sleep).
///
/// This is a plain `tokio::spawn` + `sleep`, the same shape used
/// throughout the reference control-plane tooling for best-effort
/// background timers; there is no persistent timer wheel; a
/// `round`-tagged message that arrives after the coordinator has moved
/// on is simply ignored by the coordinator itself.
pub(crate) fn schedule_retry(handle: CoordinatorHandle, round: u64, attempt: u32) {
    let delay = Duration::from_secs(2u64.saturating_pow(attempt));
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        handle.send(ToCoordinator::Retry { round });
    });
}
