//! Authorization context error types.

use keygate_crypto::CryptoError;
use thiserror::Error;

/// Errors from issuing or checking authorization contexts.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The signer could not produce the context's proof.
    #[error("signing failed: {0}")]
    Signing(#[source] CryptoError),

    /// The validity window is empty or inverted.
    #[error("invalid validity window: {reason}")]
    InvalidWindow {
        /// What is wrong with it.
        reason: String,
    },

    /// A context was requested with no resource scope.
    #[error("resource scope is empty")]
    EmptyScope,

    /// The domain or statement binding is unusable.
    #[error("invalid {field}: {reason}")]
    InvalidBinding {
        /// `domain` or `statement`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A resource pattern could not be compiled.
    #[error("invalid resource pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The context's proof does not verify against its subject's key.
    #[error("authorization context proof is invalid")]
    InvalidSignature,

    /// The context has expired.
    #[error("authorization context {context_id} expired at {expired_at}")]
    Expired {
        /// The context.
        context_id: String,
        /// Its expiry time (RFC 3339).
        expired_at: String,
    },

    /// The context is not valid yet.
    #[error("authorization context {context_id} is not valid before {issued_at}")]
    NotYetValid {
        /// The context.
        context_id: String,
        /// Its issuance time (RFC 3339).
        issued_at: String,
    },

    /// No scope entry covers the requested resource.
    #[error("authorization context does not cover {kind} resource {resource}")]
    OutOfScope {
        /// The requested resource kind.
        kind: String,
        /// The requested resource id.
        resource: String,
    },
}

impl AuthError {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Signing(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result type for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;
