//! The signing seam used by the authorization context issuer.
//!
//! Signing may be local (an in-process [`KeyPair`]) or delegated to an
//! external wallet or remote signer, so the trait is async and fallible.

use async_trait::async_trait;

use crate::error::CryptoResult;
use crate::keypair::{KeyPair, PublicKey};
use crate::signature::Signature;

/// Something that can sign on behalf of an identity.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key of the identity this signer signs for.
    fn public_key(&self) -> PublicKey;

    /// Sign `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignerUnavailable`](crate::CryptoError::SignerUnavailable)
    /// when the signing capability cannot be reached.
    async fn sign(&self, message: &[u8]) -> CryptoResult<Signature>;
}

#[async_trait]
impl Signer for KeyPair {
    fn public_key(&self) -> PublicKey {
        self.export_public_key()
    }

    async fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        Ok(KeyPair::sign(self, message))
    }
}
