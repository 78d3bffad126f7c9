//! Authorization contexts.
//!
//! A context binds a subject identity to a resource scope for a bounded
//! window, together with human-readable `domain` and `statement` strings
//! that tie it to the application that requested it. The subject signs all
//! of it; the signature is the context's `proof`.
//!
//! Contexts are immutable once issued and end only by expiry.

use std::time::Duration;

use alloy_primitives::{Address, keccak256};
use chrono::{DateTime, TimeDelta, Utc};
use keygate_crypto::{ContentHash, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::resource::{ResourceGrant, ResourceKind};

/// Version of the signing data format.
/// Increment this when the signing data structure changes.
const SIGNING_DATA_VERSION: u8 = 0x01;

/// Write a length-prefixed byte slice to the output buffer.
///
/// Format: 4-byte little-endian length followed by the data.
#[allow(clippy::cast_possible_truncation)]
fn write_length_prefixed(data: &mut Vec<u8>, bytes: &[u8]) {
    // Context fields are short; nothing approaches u32::MAX.
    data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(bytes);
}

/// Signature scheme of a subject's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// Ed25519.
    Ed25519,
}

impl SignatureScheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
        }
    }
}

/// The address a key speaks for: the last 20 bytes of the Keccak-256 hash
/// of the raw public key.
#[must_use]
pub fn address_of(public_key: &PublicKey) -> Address {
    Address::from_word(keccak256(public_key.as_bytes()))
}

/// The identity a context is issued to.
///
/// `address` is derived from `public_key`; a deserialized subject whose
/// address does not match its key fails [`AuthorizationContext::verify_proof`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Address conditions are evaluated for.
    pub address: Address,
    /// Key that signed the context.
    pub public_key: PublicKey,
    /// Scheme of `public_key`.
    pub scheme: SignatureScheme,
}

impl Subject {
    /// An ed25519 subject for `public_key`.
    #[must_use]
    pub fn ed25519(public_key: PublicKey) -> Self {
        Self {
            address: address_of(&public_key),
            public_key,
            scheme: SignatureScheme::Ed25519,
        }
    }
}

/// When a context is valid: from `issued_at` until just before `expires_at`.
///
/// Both bounds are truncated to whole seconds so the signed timestamps and
/// the stored ones are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ValidityWindow {
    /// Create a window.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidWindow`] unless `expires_at > issued_at`
    /// after truncation to seconds.
    pub fn new(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> AuthResult<Self> {
        let issued_at = truncate_to_secs(issued_at);
        let expires_at = truncate_to_secs(expires_at);
        if expires_at <= issued_at {
            return Err(AuthError::InvalidWindow {
                reason: format!(
                    "expires_at ({}) must be after issued_at ({})",
                    expires_at.to_rfc3339(),
                    issued_at.to_rfc3339()
                ),
            });
        }
        Ok(Self {
            issued_at,
            expires_at,
        })
    }

    /// A window of length `ttl` starting now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidWindow`] if `ttl` is shorter than one
    /// second or too long to represent.
    pub fn starting_now(ttl: Duration) -> AuthResult<Self> {
        Self::starting_at(Utc::now(), ttl)
    }

    /// A window of length `ttl` starting at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidWindow`] if `ttl` is shorter than one
    /// second or too long to represent.
    pub fn starting_at(issued_at: DateTime<Utc>, ttl: Duration) -> AuthResult<Self> {
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::InvalidWindow {
                reason: format!("ttl of {}s is out of range", ttl.as_secs()),
            })?;
        Self::new(issued_at, expires_at)
    }

    /// Start of the window.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// End of the window (exclusive).
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

fn truncate_to_secs(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

/// Where a context is in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Before `expires_at`.
    Valid,
    /// At or after `expires_at`. Terminal.
    Expired,
}

/// A signed, scoped, time-bounded authorization.
///
/// Fields serialize in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// Unique context identifier.
    pub id: Uuid,
    /// Who the context was issued to.
    pub subject: Subject,
    /// What it grants, in issuance order.
    pub resource_scope: Vec<ResourceGrant>,
    /// Start of validity.
    pub issued_at: DateTime<Utc>,
    /// End of validity (exclusive).
    pub expires_at: DateTime<Utc>,
    /// Origin the context was requested for.
    pub domain: String,
    /// Human-readable statement the subject agreed to.
    pub statement: String,
    /// Subject's signature over [`signing_data`](Self::signing_data).
    pub proof: Signature,
}

impl AuthorizationContext {
    /// The bytes the proof signs (everything except the proof).
    ///
    /// Format (v1):
    /// - 1 byte: version (0x01)
    /// - Length-prefixed context ID (UUID bytes)
    /// - 20 bytes: subject address
    /// - 32 bytes: subject public key
    /// - Length-prefixed signature scheme name
    /// - 4 bytes: number of scope entries
    /// - For each entry: length-prefixed kind, length-prefixed pattern
    /// - 8 bytes: `issued_at` timestamp (i64 LE)
    /// - 8 bytes: `expires_at` timestamp (i64 LE)
    /// - Length-prefixed domain
    /// - Length-prefixed statement
    #[must_use]
    pub fn signing_data(&self) -> Vec<u8> {
        signing_data(
            &self.id,
            &self.subject,
            &self.resource_scope,
            self.issued_at,
            self.expires_at,
            &self.domain,
            &self.statement,
        )
    }

    /// Check the proof against the subject's key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSignature`] if it does not verify, if the
    /// subject's address is not the one its key speaks for, or if a
    /// timestamp carries sub-second precision the proof does not cover.
    pub fn verify_proof(&self) -> AuthResult<()> {
        if self.subject.address != address_of(&self.subject.public_key) {
            return Err(AuthError::InvalidSignature);
        }
        if self.issued_at.timestamp_subsec_nanos() != 0
            || self.expires_at.timestamp_subsec_nanos() != 0
        {
            return Err(AuthError::InvalidSignature);
        }
        self.subject
            .public_key
            .verify(&self.signing_data(), &self.proof)
            .map_err(|_| AuthError::InvalidSignature)
    }

    /// Lifecycle state at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> ContextState {
        if now < self.expires_at {
            ContextState::Valid
        } else {
            ContextState::Expired
        }
    }

    /// Whether the context is valid for `(kind, resource_id)` at `now`.
    ///
    /// True iff `now < expires_at` and some scope entry covers the pair.
    /// Does not check the proof; see [`authorize`](Self::authorize).
    #[must_use]
    pub fn validate(&self, kind: ResourceKind, resource_id: &str, now: DateTime<Utc>) -> bool {
        self.state_at(now) == ContextState::Valid && self.covers(kind, resource_id)
    }

    /// Whether some scope entry covers `(kind, resource_id)`.
    #[must_use]
    pub fn covers(&self, kind: ResourceKind, resource_id: &str) -> bool {
        self.resource_scope
            .iter()
            .any(|grant| grant.covers(kind, resource_id))
    }

    /// Full check for use at a trust boundary: proof, window (with `skew`
    /// tolerance on both ends) and scope.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSignature`], [`AuthError::Expired`],
    /// [`AuthError::NotYetValid`] or [`AuthError::OutOfScope`].
    pub fn authorize(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        now: DateTime<Utc>,
        skew: Duration,
    ) -> AuthResult<()> {
        self.verify_proof()?;

        let skew = TimeDelta::from_std(skew).unwrap_or(TimeDelta::zero());
        let expires = self.expires_at.checked_add_signed(skew).unwrap_or(self.expires_at);
        if now >= expires {
            return Err(AuthError::Expired {
                context_id: self.id.to_string(),
                expired_at: self.expires_at.to_rfc3339(),
            });
        }
        let starts = self.issued_at.checked_sub_signed(skew).unwrap_or(self.issued_at);
        if now < starts {
            return Err(AuthError::NotYetValid {
                context_id: self.id.to_string(),
                issued_at: self.issued_at.to_rfc3339(),
            });
        }

        if !self.covers(kind, resource_id) {
            return Err(AuthError::OutOfScope {
                kind: kind.to_string(),
                resource: resource_id.to_string(),
            });
        }
        Ok(())
    }

    /// Hash of the signed content, for logs and audit.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::hash(&self.signing_data())
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn signing_data(
    id: &Uuid,
    subject: &Subject,
    scope: &[ResourceGrant],
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    domain: &str,
    statement: &str,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(256);

    data.push(SIGNING_DATA_VERSION);
    write_length_prefixed(&mut data, id.as_bytes());

    data.extend_from_slice(subject.address.as_slice());
    data.extend_from_slice(subject.public_key.as_bytes());
    write_length_prefixed(&mut data, subject.scheme.as_str().as_bytes());

    data.extend_from_slice(&(scope.len() as u32).to_le_bytes());
    for grant in scope {
        write_length_prefixed(&mut data, grant.kind.as_str().as_bytes());
        write_length_prefixed(&mut data, grant.pattern.as_str().as_bytes());
    }

    data.extend_from_slice(&issued_at.timestamp().to_le_bytes());
    data.extend_from_slice(&expires_at.timestamp().to_le_bytes());

    write_length_prefixed(&mut data, domain.as_bytes());
    write_length_prefixed(&mut data, statement.as_bytes());

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_window_must_move_forward() {
        assert!(ValidityWindow::new(at(100), at(101)).is_ok());
        assert!(matches!(
            ValidityWindow::new(at(100), at(100)),
            Err(AuthError::InvalidWindow { .. })
        ));
        assert!(ValidityWindow::new(at(100), at(50)).is_err());
    }

    #[test]
    fn test_window_truncates_to_seconds() {
        let issued = at(100) + TimeDelta::milliseconds(750);
        let window = ValidityWindow::starting_at(issued, Duration::from_secs(60)).unwrap();
        assert_eq!(window.issued_at(), at(100));
        assert_eq!(window.expires_at(), at(160));

        // Sub-second ttl collapses to an empty window.
        assert!(ValidityWindow::starting_at(at(100), Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_subject_address_follows_key() {
        let key = keygate_crypto::KeyPair::from_secret_key(&[1u8; 32]).unwrap();
        let other = keygate_crypto::KeyPair::from_secret_key(&[2u8; 32]).unwrap();

        let subject = Subject::ed25519(key.export_public_key());
        assert_eq!(subject.address, address_of(&key.export_public_key()));
        assert_eq!(subject, Subject::ed25519(key.export_public_key()));
        assert_ne!(subject.address, address_of(&other.export_public_key()));
        assert_ne!(subject.address, Address::ZERO);
    }

    #[test]
    fn test_window_rejects_huge_ttl() {
        assert!(ValidityWindow::starting_at(at(100), Duration::MAX).is_err());
    }
}
