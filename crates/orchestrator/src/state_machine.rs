use procflow_core::{Session, WorkflowPhase};

use crate::error::{OrchestratorError, Result};

/// Phase transitions of a flowsheet session plus the per-stream locks that
/// ride on top of them.
pub struct FlowsheetStateMachine;

impl FlowsheetStateMachine {
    pub fn validate_transition(from: &WorkflowPhase, to: &WorkflowPhase) -> Result<()> {
        if from == to || Self::allowed_transitions(from).contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidRequest(format!(
                "illegal phase transition {} -> {}",
                from, to
            )))
        }
    }

    /// One step forward, the re-open back-edge from a solved flowsheet, and
    /// teardown.
    pub fn allowed_transitions(from: &WorkflowPhase) -> Vec<WorkflowPhase> {
        let mut allowed: Vec<WorkflowPhase> = from.next().into_iter().collect();
        if from.is_solved() {
            allowed.push(WorkflowPhase::PropertiesSet);
        }
        if *from != WorkflowPhase::Uninitialized {
            allowed.push(WorkflowPhase::Uninitialized);
        }
        allowed
    }

    pub fn can_transition(from: &WorkflowPhase, to: &WorkflowPhase) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    pub fn next_phase(current: &WorkflowPhase) -> Option<WorkflowPhase> {
        current.next()
    }

    pub fn previous_phase(current: &WorkflowPhase) -> Option<WorkflowPhase> {
        let index = WorkflowPhase::ALL.iter().position(|p| p == current)?;
        index.checked_sub(1).map(|i| WorkflowPhase::ALL[i])
    }

    /// Phase after a successful operation. Forward results never regress the
    /// session; back-edges land exactly on their target.
    pub fn advance(
        current: WorkflowPhase,
        resulting: Option<WorkflowPhase>,
        back_edge: bool,
    ) -> Result<WorkflowPhase> {
        let Some(resulting) = resulting else {
            return Ok(current);
        };
        let target = if back_edge {
            resulting
        } else {
            current.max(resulting)
        };
        Self::validate_transition(&current, &target)?;
        Ok(target)
    }

    /// A flashed stream is locked against property and composition writes.
    pub fn check_stream_writable(session: &Session, stream: &str, operation: &str) -> Result<()> {
        match session.stream(stream) {
            Some(s) if s.flashed => Err(OrchestratorError::sequence(
                operation,
                session.phase,
                Some("adjust_parameters"),
                format!(
                    "stream '{}' is flashed and locked; adjust parameters to re-open it",
                    stream
                ),
            )),
            _ => Ok(()),
        }
    }

    pub fn check_ready_to_flash(session: &Session, stream: &str) -> Result<()> {
        let Some(s) = session.stream(stream) else {
            return Ok(());
        };
        if !s.properties.is_fully_specified() {
            return Err(OrchestratorError::sequence(
                "flash_stream",
                session.phase,
                Some("set_stream_properties"),
                format!(
                    "stream '{}' needs temperature, pressure and a flow before flashing",
                    stream
                ),
            ));
        }
        if s.composition.is_none() {
            return Err(OrchestratorError::sequence(
                "flash_stream",
                session.phase,
                Some("set_stream_composition"),
                format!("stream '{}' has no composition", stream),
            ));
        }
        Ok(())
    }

    /// Every stream feeding a block must be flashed before solving.
    pub fn check_ready_to_solve(session: &Session) -> Result<()> {
        let mut inlets = session.inlet_streams().filter(|s| s.is_feed()).peekable();
        if inlets.peek().is_none() {
            return Err(OrchestratorError::sequence(
                "run_simulation",
                session.phase,
                Some("connect_stream"),
                "no feed streams are connected to any block",
            ));
        }
        let unflashed: Vec<&str> = inlets
            .filter(|s| !s.flashed)
            .map(|s| s.name.as_str())
            .collect();
        if unflashed.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::sequence(
                "run_simulation",
                session.phase,
                Some("flash_stream"),
                format!("feed streams not flashed: {}", unflashed.join(", ")),
            ))
        }
    }
}
