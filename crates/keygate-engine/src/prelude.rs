//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_engine::prelude::*;` to import all essential types.

// Errors
pub use crate::{EngineError, EngineResult};

// Gate
pub use crate::{AccessDecision, AccessGate, AccessGateBuilder, AccessRequest, Charge, Payment};

// Resources
pub use crate::GatedResource;
