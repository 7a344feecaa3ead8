use std::path::PathBuf;

use async_trait::async_trait;

use crate::capture::source::{DisplaySource, FrameStream};
use crate::capture::types::RawFrame;
use crate::errors::{PilotError, PilotResult};

/// Serves a screenshot that already exists on disk as if it were a one-track
/// share. Used for headless runs.
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

struct StillStream {
    path: PathBuf,
    running: bool,
}

#[async_trait]
impl DisplaySource for StillImageSource {
    async fn request_share(&self) -> PilotResult<Box<dyn FrameStream>> {
        if !self.path.is_file() {
            return Err(PilotError::NoActiveDisplay);
        }
        Ok(Box::new(StillStream {
            path: self.path.clone(),
            running: true,
        }))
    }
}

#[async_trait]
impl FrameStream for StillStream {
    async fn next_frame(&mut self) -> PilotResult<RawFrame> {
        if !self.running {
            return Err(PilotError::PermissionDenied("stream already stopped".into()));
        }
        let bytes = tokio::fs::read(&self.path).await?;
        let rgba = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| PilotError::PermissionDenied(format!("join: {e}")))??
            .to_rgba8();
        Ok(RawFrame {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.running)
    }

    fn stop(&mut self) {
        self.running = false;
    }
}
