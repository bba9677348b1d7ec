//! Exponential backoff with jitter.

use std::future::Future;

use rand::Rng;
use tokio::time::sleep;

use crate::prelude::*;

pub struct Backoff {
    delay_millis: u64,
    max_delay_millis: u64,
    n_attempts: u32,
}

impl Backoff {
    pub fn new(initial_delay_millis: u64, max_delay_millis: u64) -> Self {
        Self {
            delay_millis: initial_delay_millis.max(1),
            max_delay_millis,
            n_attempts: 1,
        }
    }

    /// Delay before the next attempt, doubled each time until the maximum.
    pub fn next(&mut self) -> StdDuration {
        let delay_millis = self.delay_millis;
        self.delay_millis = self.max_delay_millis.max(1).min(delay_millis.saturating_mul(2));
        self.n_attempts += 1;
        StdDuration::from_millis(delay_millis + rand::thread_rng().gen_range(0..delay_millis))
    }

    /// Attempts made so far, including the first one.
    pub const fn n_attempts(&self) -> u32 {
        self.n_attempts
    }

    /// Calls `attempt` until it succeeds or `max_attempts` attempts have failed.
    ///
    /// The last error is returned.
    pub async fn retry<T, F, Fut>(mut self, max_attempts: u32, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match attempt().await {
                Ok(value) => break Ok(value),
                Err(error) if self.n_attempts() < max_attempts => {
                    let delay = self.next();
                    info!(n_attempts = self.n_attempts(), ?delay, "retrying: {:#}", error);
                    sleep(delay).await;
                }
                Err(error) => break Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delays_grow_up_to_max_ok() {
        let mut backoff = Backoff::new(100, 300);
        assert!(backoff.next() < StdDuration::from_millis(200));
        assert!(backoff.next() < StdDuration::from_millis(400));
        let delay = backoff.next();
        assert!(delay >= StdDuration::from_millis(300));
        assert!(delay < StdDuration::from_millis(600));
        assert_eq!(backoff.n_attempts(), 4);
    }

    #[tokio::test]
    async fn retry_until_success_ok() -> Result {
        let n_calls = &AtomicU32::new(0);
        let value = Backoff::new(1, 1)
            .retry(3, || async move {
                match n_calls.fetch_add(1, Ordering::Relaxed) {
                    0 => bail!("flaky"),
                    n => Ok(n),
                }
            })
            .await?;
        assert_eq!(value, 1);
        Ok(())
    }

    #[tokio::test]
    async fn retry_gives_up_ok() {
        let n_calls = &AtomicU32::new(0);
        let result: Result<()> = Backoff::new(1, 1)
            .retry(3, || async move {
                n_calls.fetch_add(1, Ordering::Relaxed);
                bail!("down")
            })
            .await;
        assert!(result.is_err());
        assert_eq!(n_calls.load(Ordering::Relaxed), 3);
    }
}
