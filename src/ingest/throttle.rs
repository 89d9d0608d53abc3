use std::time::Duration;

/// How long the driver pauses between two targets.
pub trait WaitStrategy {
    async fn wait(&self);
}

/// Sleeps a constant amount between targets. The only throttling there is:
/// no backoff, no rate-limit headers.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl WaitStrategy for FixedDelay {
    async fn wait(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Used when a source is configured with a zero delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl WaitStrategy for NoDelay {
    async fn wait(&self) {}
}
