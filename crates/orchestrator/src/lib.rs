pub mod backends;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod operation;
pub mod registry;
pub mod resources;
pub mod results;
pub mod scenario;
pub mod session_manager;
pub mod state_machine;

pub use backends::{BackendFactory, BridgeBackends, SimulatedBackends};
pub use config::{BackendConfig, FallbackSettings, OrchestratorConfig};
pub use dispatcher::{Dispatcher, RetryPolicy};
pub use error::{OrchestratorError, Result};
pub use gate::ValidationGate;
pub use operation::{Operation, OperationOutput, OperationResponse, SpeciesList};
pub use registry::{OperationRegistry, OperationSpec};
pub use results::ResultAggregator;
pub use scenario::{run_scenario, AmineTreaterScenario, ScenarioCase, ScenarioReport};
pub use session_manager::{SessionManager, SessionSummary};
pub use state_machine::FlowsheetStateMachine;
