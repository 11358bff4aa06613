use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ChatId, DeliverySink};
use crate::errors::SendError;
use crate::record::{DeliveryRef, SourceKey};

/// Attempt limit and escalating delays for a rate-limited call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: usize,
    delays: Vec<Duration>,
}

impl Default for BackoffPolicy {
    /// Up to three calls, waiting 3 and then 10 seconds in between. Longer schedules keep
    /// escalating to 30 seconds.
    fn default() -> Self {
        Self::new(3, [3, 10, 30].map(Duration::from_secs))
    }
}

impl BackoffPolicy {
    /// Make at most `max_attempts` calls, waiting `delays[n]` before retry `n + 1`.
    ///
    /// The last delay is reused when there are more retries than delays.
    pub fn new(max_attempts: usize, delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays: delays.into_iter().collect(),
        }
    }

    /// Maximum number of calls, including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Scheduled wait after failed `attempt` (1-based).
    fn delay(&self, attempt: usize) -> Duration {
        self.delays
            .get(attempt - 1)
            .or(self.delays.last())
            .copied()
            .unwrap_or_default()
    }

    /// Run `call` until it's not rate limited or attempts are exhausted.
    ///
    /// Waits for the scheduled delay, or for the server provided `retry_after` if it's longer.
    /// Any other error is returned immediately.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, SendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SendError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(SendError::RateLimited { retry_after }) => {
                    if attempt >= self.max_attempts {
                        warn!(operation, attempt, "still rate limited, giving up");
                        return Err(SendError::RateLimited { retry_after });
                    }
                    let delay = self.delay(attempt);
                    let wait = retry_after.map_or(delay, |server| server.max(delay));
                    warn!(operation, attempt, ?wait, "rate limited, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                result => {
                    if attempt > 1 {
                        debug!(operation, attempt, ok = result.is_ok(), "retried call finished");
                    }
                    return result;
                }
            }
        }
    }
}

/// [`DeliverySink`] decorator retrying every rate-limited call with [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Throttled<D> {
    inner: D,
    policy: BackoffPolicy,
}

impl<D> Throttled<D> {
    pub fn new(inner: D, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: DeliverySink> DeliverySink for Throttled<D> {
    async fn send_by_reference(
        &self,
        chat: ChatId,
        reference: &DeliveryRef,
        share_key: &SourceKey,
    ) -> Result<(), SendError> {
        self.policy
            .retry("send_by_reference", || {
                self.inner.send_by_reference(chat, reference, share_key)
            })
            .await
    }

    async fn send_by_bytes(
        &self,
        chat: ChatId,
        filename: &str,
        content: &[u8],
        share_key: &SourceKey,
    ) -> Result<Option<DeliveryRef>, SendError> {
        self.policy
            .retry("send_by_bytes", || {
                self.inner.send_by_bytes(chat, filename, content, share_key)
            })
            .await
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), SendError> {
        self.policy
            .retry("send_text", || self.inner.send_text(chat, text))
            .await
    }

    async fn send_upload_action(&self, chat: ChatId) -> Result<(), SendError> {
        self.policy
            .retry("send_upload_action", || self.inner.send_upload_action(chat))
            .await
    }
}
