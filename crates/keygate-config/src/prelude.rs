//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_config::prelude::*;` to import all essential types.

pub use crate::{ConfigError, ConfigResult};

pub use crate::{Config, ConfigLayer, ResolvedConfig};
