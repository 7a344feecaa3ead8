// Live monitor capture backed by xcap.
use async_trait::async_trait;

use crate::capture::source::{DisplaySource, FrameStream};
use crate::capture::types::RawFrame;
use crate::errors::{PilotError, PilotResult};

/// Captures one monitor. On macOS the first grab triggers the system
/// screen-recording prompt; a refusal shows up as a capture error.
pub struct XcapSource {
    monitor_index: usize,
}

impl XcapSource {
    pub fn new(monitor_index: usize) -> Self {
        Self { monitor_index }
    }
}

struct MonitorStream {
    monitor: Option<xcap::Monitor>,
    monitor_index: u32,
}

#[async_trait]
impl DisplaySource for XcapSource {
    async fn request_share(&self) -> PilotResult<Box<dyn FrameStream>> {
        let index = self.monitor_index;
        let monitor = tokio::task::spawn_blocking(move || {
            let monitors = xcap::Monitor::all()
                .map_err(|e| PilotError::PermissionDenied(format!("enumerate monitors: {e}")))?;
            tracing::debug!(count = monitors.len(), index, "monitors enumerated");
            monitors
                .into_iter()
                .nth(index)
                .ok_or(PilotError::NoActiveDisplay)
        })
        .await
        .map_err(|e| PilotError::PermissionDenied(format!("join: {e}")))??;

        Ok(Box::new(MonitorStream {
            monitor: Some(monitor),
            monitor_index: index as u32,
        }))
    }
}

#[async_trait]
impl FrameStream for MonitorStream {
    async fn next_frame(&mut self) -> PilotResult<RawFrame> {
        let Some(monitor) = self.monitor.take() else {
            return Err(PilotError::PermissionDenied("stream already stopped".into()));
        };
        let img = tokio::task::spawn_blocking(move || monitor.capture_image())
            .await
            .map_err(|e| PilotError::PermissionDenied(format!("join: {e}")))?
            .map_err(|e| PilotError::PermissionDenied(format!("capture frame: {e}")))?;

        let (width, height) = (img.width(), img.height());
        Ok(RawFrame {
            width,
            height,
            rgba: img.into_raw(),
        })
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.monitor.is_some())
    }

    fn stop(&mut self) {
        self.monitor = None;
    }

    fn monitor_index(&self) -> u32 {
        self.monitor_index
    }
}
