use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::ScreenCapture;
use crate::perception::types::{Resolution, Screenshot, ScreenshotMeta};

/// Captures one monitor through `xcap` and encodes it as PNG.
pub struct XcapScreen {
    monitor_index: usize,
}

impl XcapScreen {
    pub fn new(monitor_index: usize) -> Self {
        Self { monitor_index }
    }
}

impl Default for XcapScreen {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl ScreenCapture for XcapScreen {
    async fn capture(&self) -> PilotResult<Screenshot> {
        let index = self.monitor_index;
        // xcap and the PNG encoder are both blocking.
        tokio::task::spawn_blocking(move || capture_blocking(index))
            .await
            .map_err(|e| PilotError::Perception(format!("join: {e}")))?
    }
}

fn capture_blocking(index: usize) -> PilotResult<Screenshot> {
    let monitors =
        xcap::Monitor::all().map_err(|e| PilotError::Perception(format!("list monitors: {e}")))?;
    let monitor = monitors
        .get(index)
        .ok_or_else(|| PilotError::Perception(format!("monitor {index} not found")))?;
    let captured = monitor
        .capture_image()
        .map_err(|e| PilotError::Perception(format!("capture: {e}")))?;

    let (width, height) = (captured.width(), captured.height());
    let rgba = image::RgbaImage::from_raw(width, height, captured.into_raw())
        .ok_or_else(|| PilotError::Perception("capture buffer has unexpected size".into()))?;
    let png = encode_png(&rgba)?;

    tracing::debug!(monitor = index, width, height, bytes = png.len(), "screenshot captured");

    Ok(Screenshot {
        image_base64: base64::engine::general_purpose::STANDARD.encode(&png),
        meta: ScreenshotMeta {
            monitor_index: index as u32,
            resolution: Resolution::new(width, height),
            captured_at: chrono::Utc::now(),
        },
    })
}

pub fn encode_png(rgba: &image::RgbaImage) -> PilotResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    rgba.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| PilotError::Perception(format!("png encode: {e}")))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_png_signature() {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
