//! Periodic tasks owned by an application.

use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a periodic task.
///
/// The task runs until it is cancelled or its application stops. Dropping the handle does not
/// cancel the task.
#[derive(Debug, Clone)]
pub struct PeriodicHandle {
    token: CancellationToken,
}

impl PeriodicHandle {
    pub(super) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Cancels the task. The callback is not called again.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Calls `callback` every `period`, starting one period from the first poll, until the token is
/// cancelled.
pub(super) async fn run<F>(period: Duration, token: CancellationToken, mut callback: F)
where
    F: FnMut() + Send + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => callback(),
        }
    }
}
