//! RAII resource guards for automatic cleanup.
//!
//! - [`OperationGuard`] - reports an operation that never reached completion

mod operation_guard;

pub use operation_guard::OperationGuard;
