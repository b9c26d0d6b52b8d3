use async_trait::async_trait;

/// What a feed transport should do with a message after handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processed; never deliver again.
    Ack,
    /// Permanently unprocessable; drop without retry.
    Reject,
    /// Transient failure; deliver the same message again.
    Requeue,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Delivery;
}
