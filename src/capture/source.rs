use async_trait::async_trait;

use crate::capture::types::RawFrame;
use crate::errors::PilotResult;

/// A user-mediated screen or window share.
#[async_trait]
pub trait DisplaySource: Send + Sync {
    /// Asks the user for a share and suspends until they grant it, deny it,
    /// or dismiss the picker. Denial and dismissal are `PermissionDenied`.
    async fn request_share(&self) -> PilotResult<Box<dyn FrameStream>>;
}

/// A live capture stream obtained from a [`DisplaySource`].
#[async_trait]
pub trait FrameStream: Send {
    /// Waits for the next available frame.
    async fn next_frame(&mut self) -> PilotResult<RawFrame>;

    /// Number of tracks still running. Zero once stopped.
    fn active_tracks(&self) -> usize;

    /// Stops every track. Must be idempotent.
    fn stop(&mut self);

    fn monitor_index(&self) -> u32 {
        0
    }
}
