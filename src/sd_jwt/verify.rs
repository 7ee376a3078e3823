//! Verification of SD-JWTs and SD-JWT presentations.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::instrument;

use super::{SdJwt, SdJwtKb};
use crate::error::{Error, Result};
use crate::provider::{PublicKeyJwk, SignatureVerifier};

impl SdJwt {
    /// Verify the issuer signature and resolve the claim object.
    ///
    /// Time claims (`exp`, `nbf`, `iat`) are **not** enforced here; the
    /// caller applies whatever time policy it has, against whatever clock
    /// it trusts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureVerification`] when the signature does not
    /// verify with `issuer_key`, and the errors of disclosure processing.
    #[instrument(level = "debug", skip_all)]
    pub async fn verify<V: SignatureVerifier>(
        &self, issuer_key: &PublicKeyJwk, verifier: &V,
    ) -> Result<Map<String, Value>> {
        tracing::debug!("sd_jwt::verify");

        self.jws.verify(issuer_key, verifier).await?;
        self.disclosed_object()
    }
}

impl SdJwtKb {
    /// Verify a presentation end to end and resolve the claim object:
    ///
    /// 1. the KB-JWT signature, with the `cnf.jwk` key bound at issuance;
    /// 2. `sd_hash`, binding the KB-JWT to the exact presented bytes;
    /// 3. the verifier's `nonce`, `aud`, and creation-time predicates;
    /// 4. the issuer signature over the SD-JWT itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureVerification`], [`Error::SdHashMismatch`],
    /// [`Error::NonceRejected`], [`Error::AudienceRejected`], or
    /// [`Error::CreationTimeRejected`] for the corresponding failures, and
    /// the errors of [`SdJwt::verify`].
    #[instrument(level = "debug", skip_all)]
    pub async fn verify<V: SignatureVerifier>(
        &self, issuer_key: &PublicKeyJwk, verifier: &V, check_nonce: impl FnOnce(&str) -> bool,
        check_audience: impl FnOnce(&str) -> bool,
        check_creation_time: impl FnOnce(DateTime<Utc>) -> bool,
    ) -> Result<Map<String, Value>> {
        tracing::debug!("sd_jwt::verify_kb");

        // the KB-JWT must be signed with the key bound at issuance
        let Some(kb_key) = self.sd_jwt().key_binding_key() else {
            return Err(Error::SignatureVerification);
        };
        self.kb_jws().verify(&kb_key, verifier).await?;

        let claims = self.kb_claims()?;
        let expected = self
            .sd_jwt()
            .digest_alg()
            .encoded_digest(self.sd_jwt().compact().as_bytes());
        if claims.sd_hash != expected {
            return Err(Error::SdHashMismatch);
        }

        if !check_nonce(&claims.nonce) {
            return Err(Error::NonceRejected);
        }
        if !check_audience(&claims.aud) {
            return Err(Error::AudienceRejected);
        }
        if !check_creation_time(claims.iat) {
            return Err(Error::CreationTimeRejected);
        }

        self.sd_jwt().verify(issuer_key, verifier).await
    }
}
