//! Signal sources.
//!
//! Each adapter turns one upstream feed (or simulation) into classified
//! `Reading`s. Polling never fails outward: acquisition errors degrade to
//! the last good reading or a synthetic one, flagged via `is_fallback`.

pub mod pulse;
pub mod transit;
pub mod weather;

use async_trait::async_trait;

use crate::types::{Reading, Source};

/// One signal source, driven by a single publisher task.
///
/// `poll` takes `&mut self` so each task owns its adapter outright; the
/// last-good cache lives inside the adapter and needs no locking.
#[async_trait]
pub trait SourceAdapter: Send {
    fn source(&self) -> Source;

    /// Produce the next reading. Infallible by contract: failures are
    /// absorbed into a fallback reading.
    async fn poll(&mut self) -> Reading;
}
