//! Contract of the remote board collaborator.

use async_trait::async_trait;
use std::sync::Arc;

use crate::boards::{BoardCall, BoardDocument, BoardId};
use crate::errors::Result;

/// Receives board documents from a subscription.
pub type SnapshotSink = Arc<dyn Fn(BoardDocument) + Send + Sync>;

/// Live document subscription.
pub trait RemoteSubscription: Send {
    /// Stop delivery. No snapshot reaches the sink once this returns.
    fn unsubscribe(self: Box<Self>);
}

/// Real-time board document source plus the remote mutating calls.
///
/// Implementations must deliver the current document at least once right
/// after `subscribe` (possibly before it returns) and again on every change,
/// in server commit order. `call` must run as one server transaction that
/// also stamps `lastActionSequences[caller] = sequence`, and must reject
/// without partial application.
#[async_trait]
pub trait BoardGateway: Send + Sync {
    fn subscribe(
        &self,
        board_id: &BoardId,
        sink: SnapshotSink,
    ) -> Result<Box<dyn RemoteSubscription>>;

    async fn call(&self, call: BoardCall) -> Result<()>;
}
