use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::perception::types::{Resolution, Screenshot};

/// Source of full-screen screenshots.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> PilotResult<Screenshot>;
}

/// Answers "how large is the screen right now".
#[async_trait]
pub trait DisplayInfo: Send + Sync {
    async fn screen_resolution(&self) -> PilotResult<Resolution>;
}
