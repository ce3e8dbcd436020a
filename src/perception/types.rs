use serde::{Deserialize, Serialize};

/// Display size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub monitor_index: u32,
    pub resolution: Resolution,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// A PNG screenshot ready to be attached to a model request.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image_base64: String,
    pub meta: ScreenshotMeta,
}

impl Screenshot {
    /// `data:` URI accepted by OpenAI-compatible `image_url` parts.
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.image_base64)
    }
}
