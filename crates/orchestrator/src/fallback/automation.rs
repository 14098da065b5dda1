use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::playbook::render;
use super::{AutomationDriver, DriverError, Frame, Playbook, PlaybookStep, StepAction};
use crate::config::FallbackSettings;

const SELECT_ALL: &str = "ctrl+a";
const DELETE_SELECTION: &str = "backspace";

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("step {step} showed no visual change after {attempts} attempts")]
    Exhausted { step: usize, attempts: u32 },

    #[error("step {step} timed out after {after_ms}ms")]
    Timeout { step: usize, after_ms: u64 },

    #[error("cancelled before step {step}")]
    Cancelled { step: usize },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReport {
    pub steps: usize,
    /// Act/verify cycles summed over all steps.
    pub attempts: u32,
}

/// Runs one operation's playbook through a bounded
/// capture, locate, act, verify loop.
///
/// Holds no state between operations except the most recent capture, which
/// serves as the "before" frame of the next step.
pub struct FallbackAdapter {
    driver: Arc<dyn AutomationDriver>,
    settings: FallbackSettings,
    last_capture: Mutex<Option<Frame>>,
}

impl FallbackAdapter {
    pub fn new(driver: Arc<dyn AutomationDriver>, settings: FallbackSettings) -> Self {
        Self {
            driver,
            settings,
            last_capture: Mutex::new(None),
        }
    }

    pub async fn run(
        &self,
        operation: &str,
        playbook: &Playbook,
        vars: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<FallbackReport, FallbackError> {
        info!(
            operation = %operation,
            steps = playbook.steps.len(),
            "Running GUI fallback playbook"
        );

        let mut attempts = 0;
        for (index, step) in playbook.steps.iter().enumerate() {
            let step_no = index + 1;
            let timeout = self.settings.step_timeout();
            let used = tokio::time::timeout(timeout, self.run_step(step_no, step, vars, cancel))
                .await
                .map_err(|_| FallbackError::Timeout {
                    step: step_no,
                    after_ms: timeout.as_millis() as u64,
                })??;
            attempts += used;
        }

        Ok(FallbackReport {
            steps: playbook.steps.len(),
            attempts,
        })
    }

    async fn run_step(
        &self,
        step_no: usize,
        step: &PlaybookStep,
        vars: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<u32, FallbackError> {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(FallbackError::Cancelled { step: step_no });
            }

            let before = match self.last_capture.lock().await.take() {
                Some(frame) => frame,
                None => self.driver.capture().await?,
            };
            let target = step.region.locate(&before);
            debug!(
                step = step_no,
                attempt,
                x = target.x,
                y = target.y,
                description = %step.description,
                "Fallback act"
            );

            match &step.action {
                StepAction::Click => self.driver.click(target).await?,
                StepAction::Type { text } => {
                    self.driver.click(target).await?;
                    if attempt > 1 {
                        // the earlier attempt may have typed into the field
                        self.driver.key(SELECT_ALL).await?;
                        self.driver.key(DELETE_SELECTION).await?;
                    }
                    self.driver.type_text(&render(text, vars)).await?;
                }
                StepAction::Key { combo } => self.driver.key(combo).await?,
                StepAction::Move => self.driver.move_to(target).await?,
                StepAction::Scroll { delta } => self.driver.scroll(target, *delta).await?,
                StepAction::Drag { to } => self.driver.drag(target, to.locate(&before)).await?,
            }

            if cancel.is_cancelled() {
                return Err(FallbackError::Cancelled { step: step_no });
            }

            tokio::time::sleep(self.settings.verify_wait()).await;
            let after = self.driver.capture().await?;
            let region = step.verify_region.as_ref();
            let changed = before.fingerprint(region) != after.fingerprint(region);
            *self.last_capture.lock().await = Some(after);

            if changed {
                return Ok(attempt);
            }
            warn!(
                step = step_no,
                attempt,
                max_attempts,
                "No visual change observed after fallback action"
            );
        }

        Err(FallbackError::Exhausted {
            step: step_no,
            attempts: max_attempts,
        })
    }
}

impl std::fmt::Debug for FallbackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackAdapter")
            .field("settings", &self.settings)
            .finish()
    }
}
