//! GUI automation fallback.
//!
//! Used only when the engine's command interface cannot express an
//! operation. A playbook of capture/locate/act/verify steps drives the
//! engine window through an [`AutomationDriver`].

mod automation;
mod bridge_driver;
mod playbook;
mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use automation::{FallbackAdapter, FallbackError, FallbackReport};
pub use bridge_driver::BridgeDriver;
pub use playbook::{default_playbooks, Playbook, PlaybookStep, Region, StepAction};
pub use simulated::{SimulatedDesktop, SimulatedScreen};

/// An RGB screen capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major, 3 bytes per pixel.
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgb: vec![0; (width * height * 3) as usize],
        }
    }

    /// SHA-256 over the pixels of `region`, or of the whole frame.
    pub fn fingerprint(&self, region: Option<&Region>) -> String {
        let mut hasher = Sha256::new();
        match region {
            None => hasher.update(&self.rgb),
            Some(region) => {
                let x0 = region.x.min(self.width);
                let y0 = region.y.min(self.height);
                let x1 = region.x.saturating_add(region.width).min(self.width);
                let y1 = region.y.saturating_add(region.height).min(self.height);
                for y in y0..y1 {
                    let start = ((y * self.width + x0) * 3) as usize;
                    let end = ((y * self.width + x1) * 3) as usize;
                    if let Some(row) = self.rgb.get(start..end) {
                        hasher.update(row);
                    }
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Input action failed: {0}")]
    Input(String),
}

/// Primitive screen actions against the engine window.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    async fn capture(&self) -> Result<Frame, DriverError>;
    async fn click(&self, at: Point) -> Result<(), DriverError>;
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;
    async fn key(&self, combo: &str) -> Result<(), DriverError>;
    async fn move_to(&self, at: Point) -> Result<(), DriverError>;
    async fn scroll(&self, at: Point, delta: i32) -> Result<(), DriverError>;
    async fn drag(&self, from: Point, to: Point) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_fingerprint_ignores_changes_elsewhere() {
        let before = Frame::blank(10, 10);
        let mut after = before.clone();
        // pixel (9, 9)
        after.rgb[(9 * 10 + 9) * 3] = 255;

        let region = Region {
            x: 0,
            y: 0,
            width: 5,
            height: 5,
        };
        assert_eq!(
            before.fingerprint(Some(&region)),
            after.fingerprint(Some(&region))
        );
        assert_ne!(before.fingerprint(None), after.fingerprint(None));
    }

    #[test]
    fn test_fingerprint_clamps_region() {
        let frame = Frame::blank(4, 4);
        let region = Region {
            x: 2,
            y: 2,
            width: 100,
            height: 100,
        };
        assert_eq!(frame.fingerprint(Some(&region)).len(), 64);
    }
}
