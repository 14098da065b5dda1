mod block;
mod composition;
mod phase;
mod results;
mod session;
mod species;
mod stream;
mod target;
pub mod units;

pub use block::{Block, BlockKind, ConnectionPoint, PortRole, StencilRef};
pub use composition::{Composition, CompositionInput, COMPOSITION_TOLERANCE};
pub use phase::WorkflowPhase;
pub use results::{ResultField, SimulationOutcome, StreamResults};
pub use session::{Backend, OperationRecord, Session};
pub use species::{lookup_species, resolve_species, ComponentSet, ResolvedSpecies, SpeciesInfo};
pub use stream::{Endpoint, Stream, StreamDirection, StreamEnd};
pub use target::{
    AdjustmentSuggestion, Assessment, AssessmentReport, Comparison, PerformanceTarget,
    TargetProperty,
};
pub use units::{PhaseProperties, StreamConditions};
