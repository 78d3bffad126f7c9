//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_auth::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuthError, AuthResult};

// Contexts
pub use crate::{
    AuthorizationContext, AuthorizationContextIssuer, Subject, ValidityWindow, address_of,
};

// Scope
pub use crate::{ResourceGrant, ResourceKind, ResourcePattern};
