use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AutomationDriver, DriverError, Frame, Point};
use crate::bridge::BridgeClient;

#[derive(Debug, Deserialize)]
struct CaptureReply {
    width: u32,
    height: u32,
    rgb_base64: String,
}

/// Screen capture and input through the host bridge.
#[derive(Debug, Clone)]
pub struct BridgeDriver {
    client: BridgeClient,
}

impl BridgeDriver {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }

    async fn input(&self, action: &str, body: Value) -> Result<(), DriverError> {
        let envelope = self
            .client
            .post(&format!("input/{}", action), &body)
            .await
            .map_err(|e| DriverError::Input(e.to_string()))?;
        if envelope.ok {
            Ok(())
        } else {
            Err(DriverError::Input(format!("{}: {}", action, envelope.message)))
        }
    }
}

#[async_trait]
impl AutomationDriver for BridgeDriver {
    async fn capture(&self) -> Result<Frame, DriverError> {
        let envelope = self
            .client
            .post("screen/capture", &json!({}))
            .await
            .map_err(|e| DriverError::Capture(e.to_string()))?;
        if !envelope.ok {
            return Err(DriverError::Capture(envelope.message));
        }
        let reply: CaptureReply = envelope
            .data_as()
            .map_err(|e| DriverError::Capture(e.to_string()))?;
        let rgb = STANDARD
            .decode(reply.rgb_base64.as_bytes())
            .map_err(|e| DriverError::Capture(e.to_string()))?;

        let expected = (reply.width as usize) * (reply.height as usize) * 3;
        if rgb.len() != expected {
            return Err(DriverError::Capture(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                reply.width,
                reply.height,
                rgb.len()
            )));
        }
        Ok(Frame {
            width: reply.width,
            height: reply.height,
            rgb,
        })
    }

    async fn click(&self, at: Point) -> Result<(), DriverError> {
        self.input("click", json!({ "x": at.x, "y": at.y })).await
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.input("type", json!({ "text": text })).await
    }

    async fn key(&self, combo: &str) -> Result<(), DriverError> {
        self.input("key", json!({ "combo": combo })).await
    }

    async fn move_to(&self, at: Point) -> Result<(), DriverError> {
        self.input("move", json!({ "x": at.x, "y": at.y })).await
    }

    async fn scroll(&self, at: Point, delta: i32) -> Result<(), DriverError> {
        self.input("scroll", json!({ "x": at.x, "y": at.y, "delta": delta }))
            .await
    }

    async fn drag(&self, from: Point, to: Point) -> Result<(), DriverError> {
        self.input(
            "drag",
            json!({ "from": { "x": from.x, "y": from.y }, "to": { "x": to.x, "y": to.y } }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn driver_for(server: &MockServer) -> BridgeDriver {
        BridgeDriver::new(BridgeClient::new(server.uri(), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_capture_decodes_frame() {
        let server = MockServer::start().await;
        let pixels = vec![10u8; 2 * 2 * 3];
        Mock::given(method("POST"))
            .and(path("/screen/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "data": { "width": 2, "height": 2, "rgb_base64": STANDARD.encode(&pixels) }
            })))
            .mount(&server)
            .await;

        let frame = driver_for(&server).capture().await.unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.rgb, pixels);
    }

    #[tokio::test]
    async fn test_capture_rejects_truncated_pixels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/screen/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "data": { "width": 4, "height": 4, "rgb_base64": STANDARD.encode([0u8; 3]) }
            })))
            .mount(&server)
            .await;

        let err = driver_for(&server).capture().await.unwrap_err();
        assert!(matches!(err, DriverError::Capture(_)));
    }

    #[tokio::test]
    async fn test_click_posts_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/input/click"))
            .and(body_json(json!({ "x": 120, "y": 45 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        driver_for(&server)
            .click(Point { x: 120, y: 45 })
            .await
            .unwrap();
    }
}
