// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::tail::error::{Error, Result};

/// Granularity at which sleeps notice cancellation.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Exponential backoff for polling loops.
///
/// Each call to [`Backoff::wait`] sleeps for the current delay and doubles it,
/// capped at `max_backoff`. Sleeping stops early when the token is cancelled.
pub struct Backoff {
    cancel: CancellationToken,
    current_backoff: Duration,
    max_backoff: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl Backoff {
    pub fn new(
        cancel: &CancellationToken,
        initial_backoff: Duration,
        max_backoff: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            cancel: cancel.clone(),
            current_backoff: initial_backoff.min(max_backoff),
            max_backoff,
            max_attempts,
            attempts: 0,
        }
    }

    /// Sleep for the current delay.
    ///
    /// Fails with `Cancelled` if the token fires first, and with
    /// `RetriesExhausted` once the attempt budget is used up.
    pub fn wait(&mut self) -> Result<()> {
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return Err(Error::RetriesExhausted(self.attempts));
            }
        }
        self.attempts += 1;

        sleep(&self.cancel, self.current_backoff)?;

        self.current_backoff = (self.current_backoff * 2).min(self.max_backoff);
        Ok(())
    }

    /// Number of waits performed so far.
    #[cfg(test)]
    fn attempts(&self) -> u32 {
        self.attempts
    }

    #[cfg(test)]
    fn current_backoff(&self) -> Duration {
        self.current_backoff
    }
}

/// Sleep for `duration` in short slices, returning `Cancelled` as soon as the token fires.
pub fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep((deadline - now).min(CANCEL_CHECK_INTERVAL));
    }
}
