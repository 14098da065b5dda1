//! Domain model for flowsheet construction sessions.
//!
//! Everything in this crate is pure data: sessions, the registered component
//! set, blocks and streams, canonical phase properties, compositions and
//! performance targets. Conversion between domain units (°C, kPa, kmol/h) and
//! canonical SI happens here so every other crate only sees one unit system.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::CoreError;
