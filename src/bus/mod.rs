//! Topic-addressed pub/sub transport seam.
//!
//! The pipeline depends only on this contract. `mqtt` drives a session
//! against an external broker; `memory` is the in-process stand-in used
//! by tests and broker-less development runs. Both honor the same
//! retained-message semantics, so neither publishers nor the aggregator
//! can tell them apart.

pub mod memory;
pub mod mqtt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BusError;

/// Buffered messages per subscriber before the bus starts dropping for
/// that subscriber.
pub(crate) const SUBSCRIBER_BUFFER: usize = 64;

/// Delivery guarantee requested for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryLevel {
    /// At-least-once, with the last value retained so late subscribers
    /// get an immediate snapshot. For slow feeds.
    Retained,
    /// Fire-and-forget, nothing retained. For high-frequency feeds where
    /// staleness is cheap and retention is wasteful.
    BestEffort,
}

impl DeliveryLevel {
    pub fn retains(self) -> bool {
        matches!(self, DeliveryLevel::Retained)
    }
}

/// One message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// The publish/subscribe contract the pipeline relies on.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        delivery: DeliveryLevel,
    ) -> Result<(), BusError>;

    /// Subscribe to a set of topics. Retained messages on those topics
    /// arrive immediately; afterwards the receiver yields messages in
    /// per-topic arrival order. No ordering holds across topics.
    async fn subscribe(&self, topics: &[&str]) -> Result<mpsc::Receiver<BusMessage>, BusError>;
}
