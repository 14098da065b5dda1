use std::path::Path;

use async_trait::async_trait;
use procflow_core::{PortRole, StencilRef, StreamEnd};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use super::{EngineBackend, EngineFault, EngineResult, FaultClass, PhaseProp, StreamReadout};
use crate::bridge::{BridgeClient, BridgeError};

/// Engine reached through the host bridge at `POST {base}/engine/{command}`.
#[derive(Debug, Clone)]
pub struct BridgeEngine {
    client: BridgeClient,
}

impl BridgeEngine {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }

    async fn command(&self, command: &str, body: Value) -> EngineResult<Value> {
        debug!(command = %command, "Engine bridge call");
        let envelope = self
            .client
            .post(&format!("engine/{}", command), &body)
            .await
            .map_err(|e| match e {
                BridgeError::Connect(msg) => EngineFault::disconnected(msg),
                other => EngineFault::transient(other.to_string()),
            })?;

        if envelope.ok {
            return Ok(envelope.data);
        }
        let (class, code) = envelope
            .fault
            .map(|f| {
                (
                    FaultClass::parse(&f.class).unwrap_or(FaultClass::Rejected),
                    f.code,
                )
            })
            .unwrap_or((FaultClass::Rejected, 0));
        Err(EngineFault::new(class, code, envelope.message))
    }

    async fn command_as<T: DeserializeOwned>(&self, command: &str, body: Value) -> EngineResult<T> {
        let data = self.command(command, body).await?;
        serde_json::from_value(data).map_err(|e| {
            EngineFault::rejected(-1, format!("malformed '{}' reply: {}", command, e))
        })
    }
}

#[async_trait]
impl EngineBackend for BridgeEngine {
    async fn new_project(&self) -> EngineResult<()> {
        self.command("new_project", json!({})).await.map(|_| ())
    }

    async fn add_flowsheet(&self, name: &str) -> EngineResult<String> {
        self.command_as("add_flowsheet", json!({ "name": name })).await
    }

    async fn add_component(&self, name: &str) -> EngineResult<()> {
        self.command("add_component", json!({ "name": name }))
            .await
            .map(|_| ())
    }

    async fn environment_components(&self) -> EngineResult<Vec<String>> {
        self.command_as("environment_components", json!({})).await
    }

    async fn add_block(&self, stencil: StencilRef, name: &str) -> EngineResult<String> {
        self.command_as(
            "add_block",
            json!({ "stencil": stencil.stencil, "master": stencil.master, "name": name }),
        )
        .await
    }

    async fn add_stream(&self, name: &str) -> EngineResult<String> {
        self.command_as("add_stream", json!({ "name": name })).await
    }

    async fn glue(
        &self,
        stream_id: &str,
        end: StreamEnd,
        block_id: &str,
        role: PortRole,
        port: u32,
    ) -> EngineResult<()> {
        self.command(
            "glue",
            json!({
                "stream": stream_id,
                "end": end.as_str(),
                "block": block_id,
                "role": role.as_str(),
                "port": port,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn set_phase_property(
        &self,
        stream_id: &str,
        phase: i32,
        property: PhaseProp,
        value: f64,
    ) -> EngineResult<()> {
        self.command(
            "set_phase_property",
            json!({
                "stream": stream_id,
                "phase": phase,
                "property": property.index(),
                "value": value,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn set_composition(
        &self,
        stream_id: &str,
        phase: i32,
        basis: i32,
        values: &[f64],
    ) -> EngineResult<()> {
        self.command(
            "set_composition",
            json!({ "stream": stream_id, "phase": phase, "basis": basis, "values": values }),
        )
        .await
        .map(|_| ())
    }

    async fn flash(&self, stream_id: &str) -> EngineResult<()> {
        self.command("flash", json!({ "stream": stream_id }))
            .await
            .map(|_| ())
    }

    async fn solve(&self) -> EngineResult<i32> {
        self.command_as("solve", json!({})).await
    }

    async fn read_stream(&self, stream_id: &str) -> EngineResult<StreamReadout> {
        self.command_as("read_stream", json!({ "stream": stream_id }))
            .await
    }

    async fn list_streams(&self) -> EngineResult<Vec<String>> {
        self.command_as("list_streams", json!({})).await
    }

    async fn save_as(&self, path: &Path) -> EngineResult<()> {
        self.command("save_as", json!({ "path": path.display().to_string() }))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> EngineResult<()> {
        self.command("close", json!({})).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn engine_for(server: &MockServer) -> BridgeEngine {
        BridgeEngine::new(BridgeClient::new(server.uri(), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_success_envelope_decodes_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/engine/add_block"))
            .and(body_json(json!({
                "stencil": "Column.vss",
                "master": "Distill",
                "name": "301-E"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": true, "message": "", "data": "DTWR-100" })),
            )
            .mount(&server)
            .await;

        let id = engine_for(&server)
            .add_block(procflow_core::BlockKind::AmineTreater.stencil(), "301-E")
            .await
            .unwrap();
        assert_eq!(id, "DTWR-100");
    }

    #[tokio::test]
    async fn test_fault_envelope_maps_class() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/engine/solve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "message": "solver busy",
                "fault": { "class": "transient", "code": 7 }
            })))
            .mount(&server)
            .await;

        let fault = engine_for(&server).solve().await.unwrap_err();
        assert_eq!(fault.class, FaultClass::Transient);
        assert_eq!(fault.code, 7);
        assert_eq!(fault.message, "solver busy");
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_disconnected() {
        let engine = BridgeEngine::new(BridgeClient::new(
            "http://127.0.0.1:1",
            Duration::from_secs(2),
        ));
        let fault = engine.new_project().await.unwrap_err();
        assert_eq!(fault.class, FaultClass::Disconnected);
    }

    #[tokio::test]
    async fn test_readout_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/engine/read_stream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "data": {
                    "temperature_k": 323.15,
                    "pressure_pa": 660300.0,
                    "mole_fractions": [0.7, 0.3]
                }
            })))
            .mount(&server)
            .await;

        let readout = engine_for(&server).read_stream("220").await.unwrap();
        assert_eq!(readout.temperature_k, Some(323.15));
        assert!(readout.molar_flow_mol_s.is_none());
        assert_eq!(readout.mole_fractions, vec![0.7, 0.3]);
    }
}
