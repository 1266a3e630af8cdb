use std::{future::Future, num::NonZeroU32, time::Duration};

/// Bounded retry schedule.
///
/// A schedule of `attempts` polls, separated by `attempts - 1` sleeps. The first sleep lasts
/// `interval`; each subsequent base delay is multiplied by `factor`. Each sleep is extended by a
/// random fraction of its base delay, up to `jitter`.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    pub interval: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub attempts: NonZeroU32,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Aborted(E),
}

// === impl Backoff ===

impl Default for Backoff {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            factor: 1.0,
            jitter: 1.0,
            attempts: NonZeroU32::MIN.saturating_add(4),
        }
    }
}

impl Backoff {
    /// Polls until `poll` yields a value, fails, or the attempt budget is spent.
    ///
    /// `poll` receives the 1-based attempt number and returns `Ok(Some(_))` when done, `Ok(None)`
    /// to keep polling, or `Err(_)` to abort immediately.
    pub async fn retry<T, E, F, Fut>(&self, mut poll: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let attempts = self.attempts.get();
        let mut delay = self.interval;
        for attempt in 1..=attempts {
            if let Some(value) = poll(attempt).await.map_err(RetryError::Aborted)? {
                return Ok(value);
            }
            if attempt < attempts {
                let sleep = self.jittered(delay);
                tokio::time::sleep(sleep).await;
                delay = delay.mul_f64(self.factor.max(0.0));
            }
        }
        Err(RetryError::Exhausted { attempts })
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        delay + delay.mul_f64(self.jitter * rand::random::<f64>())
    }
}
