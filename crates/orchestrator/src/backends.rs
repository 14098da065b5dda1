use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procflow_core::BlockKind;
use uuid::Uuid;

use crate::bridge::BridgeClient;
use crate::config::BackendConfig;
use crate::engine::{BridgeEngine, EngineBackend, SimulatedEngine};
use crate::fallback::{AutomationDriver, BridgeDriver, SimulatedDesktop, SimulatedScreen};

/// Capture size of the simulated engine window.
pub const SIMULATED_SCREEN: (u32, u32) = (1920, 1080);

/// Hands each new session its engine connection and automation driver.
pub trait BackendFactory: Send + Sync {
    fn engine(&self, session_id: Uuid) -> Arc<dyn EngineBackend>;
    fn driver(&self, session_id: Uuid) -> Arc<dyn AutomationDriver>;

    /// Drop whatever the factory still holds for a closed session.
    fn release(&self, _session_id: Uuid) {}
}

pub fn from_config(config: &BackendConfig) -> Arc<dyn BackendFactory> {
    match config {
        BackendConfig::Simulated {
            unsupported_blocks,
            latency_ms,
            frozen_screen,
        } => {
            let mut backends = SimulatedBackends::new()
                .with_unsupported(unsupported_blocks.clone())
                .with_latency(Duration::from_millis(*latency_ms));
            if *frozen_screen {
                backends = backends.with_frozen_screen();
            }
            Arc::new(backends)
        }
        BackendConfig::Bridge {
            base_url,
            request_timeout_ms,
        } => Arc::new(BridgeBackends::new(BridgeClient::new(
            base_url.clone(),
            Duration::from_millis(*request_timeout_ms),
        ))),
    }
}

/// One in-process engine and engine window per session. Keeps a handle on
/// each so callers can inspect or perturb a running session.
#[derive(Default)]
pub struct SimulatedBackends {
    unsupported: Vec<BlockKind>,
    latency: Option<Duration>,
    frozen_screen: bool,
    engines: Mutex<HashMap<Uuid, Arc<SimulatedEngine>>>,
    screens: Mutex<HashMap<Uuid, Arc<SimulatedScreen>>>,
}

impl SimulatedBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unsupported(mut self, kinds: Vec<BlockKind>) -> Self {
        self.unsupported = kinds;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = (!latency.is_zero()).then_some(latency);
        self
    }

    pub fn with_frozen_screen(mut self) -> Self {
        self.frozen_screen = true;
        self
    }

    pub fn engine_for(&self, session_id: Uuid) -> Option<Arc<SimulatedEngine>> {
        self.engines.lock().ok()?.get(&session_id).cloned()
    }

    pub fn screen_for(&self, session_id: Uuid) -> Option<Arc<SimulatedScreen>> {
        self.screens.lock().ok()?.get(&session_id).cloned()
    }
}

impl BackendFactory for SimulatedBackends {
    fn engine(&self, session_id: Uuid) -> Arc<dyn EngineBackend> {
        let mut engine = SimulatedEngine::new().with_unsupported_kinds(&self.unsupported);
        if let Some(latency) = self.latency {
            engine = engine.with_latency(latency);
        }
        let engine = Arc::new(engine);
        if let Ok(mut engines) = self.engines.lock() {
            engines.insert(session_id, Arc::clone(&engine));
        }
        engine
    }

    fn driver(&self, session_id: Uuid) -> Arc<dyn AutomationDriver> {
        let (width, height) = SIMULATED_SCREEN;
        let mut screen = SimulatedScreen::new(width, height);
        if self.frozen_screen {
            screen = screen.frozen();
        }
        let screen = Arc::new(screen);
        if let Ok(mut screens) = self.screens.lock() {
            screens.insert(session_id, Arc::clone(&screen));
        }
        let driver: Arc<dyn AutomationDriver> = match self.engine_for(session_id) {
            Some(engine) => Arc::new(SimulatedDesktop::new(screen, engine)),
            None => screen,
        };
        driver
    }

    fn release(&self, session_id: Uuid) {
        if let Ok(mut engines) = self.engines.lock() {
            engines.remove(&session_id);
        }
        if let Ok(mut screens) = self.screens.lock() {
            screens.remove(&session_id);
        }
    }
}

/// Every session talks to the same host bridge.
#[derive(Debug, Clone)]
pub struct BridgeBackends {
    client: BridgeClient,
}

impl BridgeBackends {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }
}

impl BackendFactory for BridgeBackends {
    fn engine(&self, _session_id: Uuid) -> Arc<dyn EngineBackend> {
        Arc::new(BridgeEngine::new(self.client.clone()))
    }

    fn driver(&self, _session_id: Uuid) -> Arc<dyn AutomationDriver> {
        Arc::new(BridgeDriver::new(self.client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_backends_track_sessions() {
        let backends = SimulatedBackends::new();
        let id = Uuid::new_v4();

        let _engine = backends.engine(id);
        let _driver = backends.driver(id);

        assert!(backends.engine_for(id).is_some());
        assert!(backends.screen_for(id).is_some());
        assert!(backends.engine_for(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_release_forgets_session() {
        let backends = SimulatedBackends::new();
        let kept = Uuid::new_v4();
        let closed = Uuid::new_v4();
        for id in [kept, closed] {
            let _engine = backends.engine(id);
            let _driver = backends.driver(id);
        }

        backends.release(closed);

        assert!(backends.engine_for(closed).is_none());
        assert!(backends.screen_for(closed).is_none());
        assert!(backends.engine_for(kept).is_some());
        assert!(backends.screen_for(kept).is_some());
    }
}
