use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

/// Geometry of a captured frame. Captures are kept at the source's native
/// resolution, so these are physical pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMeta {
    pub monitor_index: u32,
    pub physical_width: u32,
    pub physical_height: u32,
}

impl CaptureMeta {
    pub fn new(monitor_index: u32, physical_width: u32, physical_height: u32) -> Self {
        Self {
            monitor_index,
            physical_width,
            physical_height,
        }
    }
}

/// One raw video frame as handed over by a [`FrameStream`](super::source::FrameStream).
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// A single still image, PNG encoded as base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenCapture {
    png_base64: String,
    meta: CaptureMeta,
    captured_at: DateTime<Utc>,
}

impl ScreenCapture {
    pub fn new(png_base64: String, meta: CaptureMeta) -> Self {
        Self {
            png_base64,
            meta,
            captured_at: Utc::now(),
        }
    }

    /// Rasterizes exactly `frame` to PNG without scaling.
    pub fn rasterize(frame: RawFrame, monitor_index: u32) -> PilotResult<Self> {
        let RawFrame { width, height, rgba } = frame;
        let canvas = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            PilotError::PermissionDenied(format!(
                "frame buffer does not match {width}×{height}"
            ))
        })?;

        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;

        let png_base64 = base64::engine::general_purpose::STANDARD.encode(&png);
        Ok(Self::new(png_base64, CaptureMeta::new(monitor_index, width, height)))
    }

    pub fn png_base64(&self) -> &str {
        &self.png_base64
    }

    pub fn meta(&self) -> &CaptureMeta {
        &self.meta
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn is_empty(&self) -> bool {
        self.png_base64.is_empty()
    }

    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.png_base64)
    }
}
