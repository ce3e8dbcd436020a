// Virtual-grid → physical-pixel mapping.
use std::sync::Arc;

use crate::directive::{CoordSpace, Point};
use crate::perception::traits::DisplayInfo;
use crate::perception::types::Resolution;

/// Side length of the virtual grid used by the box dialect.
pub const GRID_SIZE: u32 = 1000;

/// Converts model-space coordinates to screen pixels using the display size at
/// the moment of the call.
pub struct Normalizer {
    display: Arc<dyn DisplayInfo>,
    fallback: Resolution,
}

impl Normalizer {
    pub fn new(display: Arc<dyn DisplayInfo>, fallback: Resolution) -> Self {
        Self { display, fallback }
    }

    /// Current display size. A failed query degrades to the fallback resolution
    /// instead of failing the caller.
    pub async fn resolution(&self) -> Resolution {
        match self.display.screen_resolution().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback_width = self.fallback.width,
                    fallback_height = self.fallback.height,
                    "resolution query failed, using fallback"
                );
                self.fallback
            }
        }
    }

    /// `nx`, `ny` on the 0–1000 grid → pixels. Out-of-range input is not clamped.
    pub async fn normalize(&self, nx: u32, ny: u32) -> (i32, i32) {
        let screen = self.resolution().await;
        scale(nx, ny, screen)
    }

    /// Pixels for `point`; screen-space points pass through untouched.
    pub async fn resolve(&self, point: Point) -> (i32, i32) {
        match point.space {
            CoordSpace::Screen => (clamp_i32(point.x as f64), clamp_i32(point.y as f64)),
            CoordSpace::Normalized => self.normalize(point.x, point.y).await,
        }
    }
}

pub fn scale(nx: u32, ny: u32, screen: Resolution) -> (i32, i32) {
    let grid = GRID_SIZE as f64;
    let px = (screen.width as f64 * nx as f64 / grid).round();
    let py = (screen.height as f64 * ny as f64 / grid).round();
    (clamp_i32(px), clamp_i32(py))
}

// Saturates only at the i32 range, which the OS layer cannot address anyway.
fn clamp_i32(v: f64) -> i32 {
    v.min(i32::MAX as f64) as i32
}
