//! Read-only surface over the aggregated state.

use tokio::sync::watch;

use crate::types::AggregatedState;

/// Cloneable handle for downstream consumers (render loop, web push).
///
/// Every accessor yields a consistent whole-value snapshot as of one
/// recompute; the live map inside the aggregator is never exposed.
#[derive(Clone)]
pub struct StateHandle {
    rx: watch::Receiver<AggregatedState>,
}

impl StateHandle {
    pub(crate) fn new(rx: watch::Receiver<AggregatedState>) -> StateHandle {
        StateHandle { rx }
    }

    /// The state as of the last recompute.
    pub fn snapshot(&self) -> AggregatedState {
        self.rx.borrow().clone()
    }

    /// Wait until the aggregator publishes a state newer than the last
    /// one seen through this handle. Errors only when the aggregator is
    /// gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// Wait for a state satisfying `predicate` and return it.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&AggregatedState) -> bool,
    ) -> Result<AggregatedState, watch::error::RecvError> {
        let state = self.rx.wait_for(predicate).await?;
        Ok(state.clone())
    }
}
