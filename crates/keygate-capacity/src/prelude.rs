//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_capacity::prelude::*;` to import all essential types.

pub use crate::{
    CapacityError, CapacityLedger, CapacityRegistry, CapacityResult, ExceededReason,
    LedgerSnapshot, Restriction,
};
