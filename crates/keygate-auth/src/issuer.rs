//! Issuing authorization contexts.

use std::time::Duration;

use keygate_crypto::Signer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{AuthorizationContext, Subject, ValidityWindow, signing_data};
use crate::error::{AuthError, AuthResult};
use crate::resource::ResourceGrant;

/// Default context lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default domain binding.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Default statement binding.
pub const DEFAULT_STATEMENT: &str = "Decrypt condition-gated data";

const MAX_BINDING_LEN: usize = 1024;

/// Issues signed [`AuthorizationContext`]s.
///
/// Holds the default domain, statement and lifetime used by
/// [`issue_default`](Self::issue_default). Issuing never touches shared
/// mutable state, so a slow external signer blocks only its own caller.
#[derive(Debug, Clone)]
pub struct AuthorizationContextIssuer {
    domain: String,
    statement: String,
    ttl: Duration,
}

impl Default for AuthorizationContextIssuer {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            statement: DEFAULT_STATEMENT.to_string(),
            ttl: DEFAULT_TTL,
        }
    }
}

impl AuthorizationContextIssuer {
    /// Create an issuer with the default bindings and a 24 hour lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the default statement.
    #[must_use]
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = statement.into();
        self
    }

    /// Set the default lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The default lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a context using the default domain, statement and a window of
    /// the default lifetime starting now.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub async fn issue_default(
        &self,
        signer: &dyn Signer,
        resource_scope: Vec<ResourceGrant>,
    ) -> AuthResult<AuthorizationContext> {
        let window = ValidityWindow::starting_now(self.ttl)?;
        self.issue(
            signer,
            resource_scope,
            &self.domain,
            &self.statement,
            window,
        )
        .await
    }

    /// Build and sign a context for the identity `signer` holds the key of.
    ///
    /// The subject's address is derived from the signer's public key, so a
    /// context can only ever speak for the signer's own address.
    ///
    /// # Errors
    ///
    /// - [`AuthError::EmptyScope`] if `resource_scope` is empty.
    /// - [`AuthError::InvalidBinding`] if `domain` is empty, or either binding
    ///   contains control characters or is too long.
    /// - [`AuthError::Signing`] if the signer cannot sign.
    pub async fn issue(
        &self,
        signer: &dyn Signer,
        resource_scope: Vec<ResourceGrant>,
        domain: &str,
        statement: &str,
        window: ValidityWindow,
    ) -> AuthResult<AuthorizationContext> {
        if resource_scope.is_empty() {
            return Err(AuthError::EmptyScope);
        }
        check_binding("domain", domain, false)?;
        check_binding("statement", statement, true)?;

        let id = Uuid::new_v4();
        let subject = Subject::ed25519(signer.public_key());
        let address = subject.address;
        let data = signing_data(
            &id,
            &subject,
            &resource_scope,
            window.issued_at(),
            window.expires_at(),
            domain,
            statement,
        );

        debug!(context_id = %id, %address, "signing authorization context");
        let proof = signer.sign(&data).await.map_err(AuthError::Signing)?;

        let context = AuthorizationContext {
            id,
            subject,
            resource_scope,
            issued_at: window.issued_at(),
            expires_at: window.expires_at(),
            domain: domain.to_string(),
            statement: statement.to_string(),
            proof,
        };
        info!(
            context_id = %id,
            %address,
            key_id = %subject.public_key.key_id_hex(),
            scope_entries = context.resource_scope.len(),
            expires_at = %context.expires_at.to_rfc3339(),
            "authorization context issued"
        );
        Ok(context)
    }
}

fn check_binding(field: &'static str, value: &str, allow_empty: bool) -> AuthResult<()> {
    let reason = if !allow_empty && value.trim().is_empty() {
        "must not be empty"
    } else if value.len() > MAX_BINDING_LEN {
        "is too long"
    } else if value.chars().any(char::is_control) {
        "contains control characters"
    } else {
        return Ok(());
    };
    Err(AuthError::InvalidBinding {
        field,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextState;
    use crate::resource::ResourceKind;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};
    use keygate_crypto::{CryptoError, CryptoResult, KeyPair, PublicKey, Signature};

    struct OfflineSigner(PublicKey);

    #[async_trait]
    impl Signer for OfflineSigner {
        fn public_key(&self) -> PublicKey {
            self.0
        }

        async fn sign(&self, _message: &[u8]) -> CryptoResult<Signature> {
            Err(CryptoError::SignerUnavailable("wallet locked".to_string()))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn scope() -> Vec<ResourceGrant> {
        vec![
            ResourceGrant::new(ResourceKind::ConditionDecryption, "ab*").unwrap(),
            ResourceGrant::any(ResourceKind::PredicateExecution),
        ]
    }

    async fn issue_at(keypair: &KeyPair, issued: i64, expires: i64) -> AuthorizationContext {
        AuthorizationContextIssuer::new()
            .issue(
                keypair,
                scope(),
                "localhost",
                "Decrypt test data",
                ValidityWindow::new(at(issued), at(expires)).unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let keypair = KeyPair::generate();
        let context = issue_at(&keypair, 1_000, 2_000).await;

        assert_eq!(
            context.subject.address,
            crate::context::address_of(&keypair.export_public_key())
        );
        assert_eq!(context.subject.public_key, keypair.export_public_key());
        assert_eq!(context.domain, "localhost");
        context.verify_proof().unwrap();
    }

    #[tokio::test]
    async fn test_validate_expiry_and_scope() {
        let keypair = KeyPair::generate();
        let context = issue_at(&keypair, 1_000, 2_000).await;
        let kind = ResourceKind::ConditionDecryption;

        assert!(context.validate(kind, "abcd", at(1_500)));
        assert!(context.validate(kind, "abcd", at(1_999)));
        assert!(!context.validate(kind, "abcd", at(2_000)));
        assert!(!context.validate(kind, "abcd", at(9_999)));
        assert_eq!(context.state_at(at(2_000)), ContextState::Expired);

        assert!(!context.validate(ResourceKind::CapacityDelegation, "abcd", at(1_500)));
        assert!(!context.validate(kind, "zzzz", at(1_500)));
        assert!(context.validate(ResourceKind::PredicateExecution, "Qm123", at(1_500)));
    }

    #[tokio::test]
    async fn test_tampering_breaks_proof() {
        let keypair = KeyPair::generate();
        let context = issue_at(&keypair, 1_000, 2_000).await;

        let mut widened = context.clone();
        widened.resource_scope.push(ResourceGrant::any(ResourceKind::CapacityDelegation));
        assert!(matches!(widened.verify_proof(), Err(AuthError::InvalidSignature)));

        let mut extended = context.clone();
        extended.expires_at = at(3_000);
        assert!(extended.verify_proof().is_err());

        let mut nudged = context.clone();
        nudged.expires_at += TimeDelta::milliseconds(500);
        assert!(nudged.verify_proof().is_err());

        let mut stolen = context;
        stolen.subject.address = alloy_primitives::Address::repeat_byte(0x99);
        assert!(matches!(stolen.verify_proof(), Err(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_stored_exact_grant_does_not_widen() {
        let keypair = KeyPair::generate();
        let exact = ResourceGrant {
            kind: ResourceKind::ConditionDecryption,
            pattern: crate::resource::ResourcePattern::exact("ab*").unwrap(),
        };
        let context = AuthorizationContextIssuer::new()
            .issue(
                &keypair,
                vec![exact],
                "localhost",
                "",
                ValidityWindow::new(at(1_000), at(2_000)).unwrap(),
            )
            .await
            .unwrap();
        let kind = ResourceKind::ConditionDecryption;
        assert!(!context.validate(kind, "abcdef", at(1_500)));

        let json = serde_json::to_string(&context).unwrap();
        let stored: AuthorizationContext = serde_json::from_str(&json).unwrap();
        stored.verify_proof().unwrap();
        assert!(stored.validate(kind, "ab*", at(1_500)));
        assert!(!stored.validate(kind, "abcdef", at(1_500)));
    }

    #[tokio::test]
    async fn test_foreign_address_claim_rejected() {
        let victim = KeyPair::generate();
        let intruder = KeyPair::generate();
        let victim_address = crate::context::address_of(&victim.export_public_key());

        // A context re-signed by another key for the victim's address.
        let mut forged = issue_at(&intruder, 1_000, 2_000).await;
        forged.subject.address = victim_address;
        forged.proof = intruder.sign(&forged.signing_data());

        assert!(matches!(forged.verify_proof(), Err(AuthError::InvalidSignature)));
        assert!(matches!(
            forged.authorize(
                ResourceKind::ConditionDecryption,
                "abcd",
                at(1_500),
                Duration::ZERO
            ),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_authorize_with_skew() {
        let keypair = KeyPair::generate();
        let context = issue_at(&keypair, 1_000, 2_000).await;
        let kind = ResourceKind::ConditionDecryption;
        let skew = Duration::from_secs(30);

        context.authorize(kind, "abcd", at(1_500), skew).unwrap();
        context.authorize(kind, "abcd", at(2_010), skew).unwrap();
        assert!(matches!(
            context.authorize(kind, "abcd", at(2_030), skew),
            Err(AuthError::Expired { .. })
        ));
        assert!(matches!(
            context.authorize(kind, "abcd", at(900), skew),
            Err(AuthError::NotYetValid { .. })
        ));
        assert!(matches!(
            context.authorize(kind, "zzzz", at(1_500), skew),
            Err(AuthError::OutOfScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_signer_unavailable() {
        let signer = OfflineSigner(KeyPair::generate().export_public_key());
        let err = AuthorizationContextIssuer::new()
            .issue_default(&signer, scope())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Signing(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_rejects_empty_scope_and_bad_bindings() {
        let keypair = KeyPair::generate();
        let issuer = AuthorizationContextIssuer::new();
        let window = ValidityWindow::new(at(1), at(2)).unwrap();

        let err = issuer
            .issue(&keypair, vec![], "localhost", "", window)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmptyScope));

        let err = issuer
            .issue(&keypair, scope(), " ", "", window)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidBinding { field: "domain", .. }));

        let err = issuer
            .issue(&keypair, scope(), "localhost", "line\nbreak", window)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidBinding { field: "statement", .. }));
    }

    #[tokio::test]
    async fn test_default_window_is_a_day() {
        let keypair = KeyPair::generate();
        let context = AuthorizationContextIssuer::new()
            .with_domain("app.example")
            .issue_default(&keypair, scope())
            .await
            .unwrap();
        assert_eq!(context.domain, "app.example");
        assert_eq!(context.statement, DEFAULT_STATEMENT);
        assert_eq!(
            context.expires_at.signed_duration_since(context.issued_at),
            TimeDelta::hours(24)
        );
    }

    #[tokio::test]
    async fn test_serialized_context_still_verifies() {
        let keypair = KeyPair::generate();
        let context = issue_at(&keypair, 1_000, 2_000).await;
        let json = serde_json::to_string(&context).unwrap();
        let back: AuthorizationContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, context);
        back.verify_proof().unwrap();

        let keys: Vec<String> = serde_json::from_str::<serde_json::Value>(&json)
            .unwrap()
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys.len(), 8);
    }
}
