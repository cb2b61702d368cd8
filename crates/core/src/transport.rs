use async_trait::async_trait;

use crate::error::SendError;
use crate::message::Grid;

/// The physical display's write API.
///
/// Implementations own authentication and the network timeout; a send that
/// exceeds its timeout is a failed delivery, never a hang. The engine calls
/// this from exactly one task at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, grid: &Grid) -> Result<(), SendError>;
}
