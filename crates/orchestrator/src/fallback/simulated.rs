use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AutomationDriver, DriverError, Frame, Point};
use crate::engine::{SimulatedEngine, STREAM_MASTER};

/// In-memory screen for offline runs.
///
/// Every input action redraws the whole window, so verification of any region
/// sees a change. A frozen screen records actions but never repaints.
pub struct SimulatedScreen {
    state: Mutex<ScreenState>,
    frozen: bool,
}

struct ScreenState {
    frame: Frame,
    actions: usize,
    typed: Vec<String>,
    keys: Vec<String>,
    cursor: Point,
}

impl SimulatedScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(ScreenState {
                frame: Frame::blank(width, height),
                actions: 0,
                typed: Vec::new(),
                keys: Vec::new(),
                cursor: Point { x: 0, y: 0 },
            }),
            frozen: false,
        }
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn action_count(&self) -> usize {
        self.state.lock().map(|s| s.actions).unwrap_or(0)
    }

    pub fn cursor(&self) -> Option<Point> {
        self.state.lock().ok().map(|s| s.cursor)
    }

    pub fn typed(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.typed.clone())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.keys.clone())
            .unwrap_or_default()
    }

    fn act(&self, at: Option<Point>, typed: Option<&str>) -> Result<(), DriverError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DriverError::Input("screen state poisoned".to_string()))?;
        state.actions += 1;
        if let Some(text) = typed {
            state.typed.push(text.to_string());
        }
        if let Some(at) = at {
            state.cursor = at;
        }
        if !self.frozen {
            state.frame.rgb.iter_mut().for_each(|px| *px = px.wrapping_add(1));
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationDriver for SimulatedScreen {
    async fn capture(&self) -> Result<Frame, DriverError> {
        self.state
            .lock()
            .map(|s| s.frame.clone())
            .map_err(|_| DriverError::Capture("screen state poisoned".to_string()))
    }

    async fn click(&self, at: Point) -> Result<(), DriverError> {
        self.act(Some(at), None)
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.act(None, Some(text))
    }

    async fn key(&self, combo: &str) -> Result<(), DriverError> {
        self.state
            .lock()
            .map_err(|_| DriverError::Input("screen state poisoned".to_string()))?
            .keys
            .push(combo.to_string());
        self.act(None, None)
    }

    async fn move_to(&self, at: Point) -> Result<(), DriverError> {
        self.act(Some(at), None)
    }

    async fn scroll(&self, at: Point, _delta: i32) -> Result<(), DriverError> {
        self.act(Some(at), None)
    }

    async fn drag(&self, _from: Point, to: Point) -> Result<(), DriverError> {
        self.act(Some(to), None)
    }
}

/// Engine window wired to a [`SimulatedEngine`].
///
/// Interprets the gestures of the default playbooks: text typed into the
/// shape search picks a master, a drag drops it (or the stream tool when
/// nothing was searched), and the next typed text names the dropped shape.
/// `ctrl+shift+s`, a typed path and `enter` save the project. A frozen
/// window ignores everything.
pub struct SimulatedDesktop {
    screen: Arc<SimulatedScreen>,
    engine: Arc<SimulatedEngine>,
    ui: Mutex<UiState>,
}

#[derive(Default)]
struct UiState {
    search: Option<String>,
    dropped: Option<String>,
    save_dialog: bool,
    save_path: Option<PathBuf>,
}

impl SimulatedDesktop {
    pub fn new(screen: Arc<SimulatedScreen>, engine: Arc<SimulatedEngine>) -> Self {
        Self {
            screen,
            engine,
            ui: Mutex::new(UiState::default()),
        }
    }

    pub fn screen(&self) -> &Arc<SimulatedScreen> {
        &self.screen
    }

    fn ui(&self) -> Result<std::sync::MutexGuard<'_, UiState>, DriverError> {
        self.ui
            .lock()
            .map_err(|_| DriverError::Input("ui state poisoned".to_string()))
    }
}

#[async_trait]
impl AutomationDriver for SimulatedDesktop {
    async fn capture(&self) -> Result<Frame, DriverError> {
        self.screen.capture().await
    }

    async fn click(&self, at: Point) -> Result<(), DriverError> {
        self.screen.click(at).await
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.screen.type_text(text).await?;
        if self.screen.is_frozen() {
            return Ok(());
        }
        let mut ui = self.ui()?;
        if ui.save_dialog {
            ui.save_path = Some(PathBuf::from(text));
        } else if let Some(master) = ui.dropped.take() {
            self.engine
                .place_shape(&master, text)
                .map_err(|fault| DriverError::Input(fault.to_string()))?;
        } else {
            ui.search = Some(text.to_string());
        }
        Ok(())
    }

    async fn key(&self, combo: &str) -> Result<(), DriverError> {
        self.screen.key(combo).await?;
        if self.screen.is_frozen() {
            return Ok(());
        }
        let path = {
            let mut ui = self.ui()?;
            match combo {
                "ctrl+shift+s" => {
                    ui.save_dialog = true;
                    None
                }
                "enter" if ui.save_dialog => {
                    ui.save_dialog = false;
                    ui.save_path.take()
                }
                "escape" => {
                    *ui = UiState::default();
                    None
                }
                _ => None,
            }
        };
        if let Some(path) = path {
            self.engine
                .write_snapshot(&path)
                .await
                .map_err(|fault| DriverError::Input(fault.to_string()))?;
        }
        Ok(())
    }

    async fn move_to(&self, at: Point) -> Result<(), DriverError> {
        self.screen.move_to(at).await
    }

    async fn scroll(&self, at: Point, delta: i32) -> Result<(), DriverError> {
        self.screen.scroll(at, delta).await
    }

    async fn drag(&self, from: Point, to: Point) -> Result<(), DriverError> {
        self.screen.drag(from, to).await?;
        if !self.screen.is_frozen() {
            let mut ui = self.ui()?;
            let master = ui.search.take().unwrap_or_else(|| STREAM_MASTER.to_string());
            ui.dropped = Some(master);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use procflow_core::{PortRole, StreamEnd};

    use super::*;
    use crate::engine::EngineBackend;

    async fn open_engine() -> Arc<SimulatedEngine> {
        let engine = Arc::new(SimulatedEngine::new());
        engine.new_project().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_search_drag_name_places_block() {
        let engine = open_engine().await;
        let desktop = SimulatedDesktop::new(Arc::new(SimulatedScreen::new(32, 32)), engine.clone());
        let at = Point { x: 1, y: 1 };

        desktop.type_text("Distill").await.unwrap();
        desktop.drag(at, at).await.unwrap();
        desktop.type_text("301-E").await.unwrap();

        engine.add_stream("220").await.unwrap();
        engine
            .glue("220", StreamEnd::Downstream, "301-E", PortRole::Inlet, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_frozen_window_ignores_gestures() {
        let engine = open_engine().await;
        let screen = Arc::new(SimulatedScreen::new(32, 32).frozen());
        let desktop = SimulatedDesktop::new(screen.clone(), engine.clone());
        let at = Point { x: 1, y: 1 };

        desktop.drag(at, at).await.unwrap();
        desktop.type_text("210").await.unwrap();

        assert_eq!(screen.action_count(), 2);
        assert!(engine.list_streams().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_dialog_writes_snapshot() {
        let engine = open_engine().await;
        let desktop = SimulatedDesktop::new(Arc::new(SimulatedScreen::new(32, 32)), engine);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("301.pmx");

        desktop.key("ctrl+shift+s").await.unwrap();
        desktop.type_text(path.to_str().unwrap()).await.unwrap();
        desktop.key("enter").await.unwrap();

        assert!(path.exists());
    }
}
