//! Key-binding presentation: close a filtered SD-JWT with a KB-JWT proving
//! possession of the key bound in `cnf.jwk`.

use chrono::{DateTime, Utc};
use tracing::instrument;

use super::{KbJwtClaims, SdJwt, SdJwtKb};
use crate::error::{Error, Result};
use crate::jose::{self, CompactJws, JwtType, Protected};
use crate::provider::{Clock, Signer, SystemClock};

/// Builds an SD-JWT presentation
/// `<Issuer-signed JWT>~<Disclosure 1>~...~<Disclosure N>~<KB-JWT>`.
pub struct SdJwtKbBuilder<'c, J, S> {
    sd_jwt: J,
    nonce: Option<String>,
    audience: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    clock: Option<&'c dyn Clock>,
    signer: S,
}

impl<J: std::fmt::Debug, S: std::fmt::Debug> std::fmt::Debug for SdJwtKbBuilder<'_, J, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdJwtKbBuilder")
            .field("sd_jwt", &self.sd_jwt)
            .field("nonce", &self.nonce)
            .field("audience", &self.audience)
            .field("issued_at", &self.issued_at)
            .field("clock", &self.clock.as_ref().map(|_| "<dyn Clock>"))
            .field("signer", &self.signer)
            .finish()
    }
}

/// Builder has no SD-JWT.
#[doc(hidden)]
pub struct NoSdJwt;
/// Builder has an SD-JWT.
#[doc(hidden)]
pub struct HasSdJwt(SdJwt);

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for SdJwtKbBuilder<'_, NoSdJwt, NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl SdJwtKbBuilder<'_, NoSdJwt, NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sd_jwt: NoSdJwt,
            nonce: None,
            audience: None,
            issued_at: None,
            clock: None,
            signer: NoSigner,
        }
    }
}

// Credential to present
impl<'c, S> SdJwtKbBuilder<'c, NoSdJwt, S> {
    /// Set the (typically filtered) SD-JWT to present.
    #[must_use]
    pub fn sd_jwt(self, sd_jwt: SdJwt) -> SdJwtKbBuilder<'c, HasSdJwt, S> {
        SdJwtKbBuilder {
            sd_jwt: HasSdJwt(sd_jwt),
            nonce: self.nonce,
            audience: self.audience,
            issued_at: self.issued_at,
            clock: self.clock,
            signer: self.signer,
        }
    }
}

// Verifier-supplied values and optional fields
impl<'c, J, S> SdJwtKbBuilder<'c, J, S> {
    /// Set the nonce supplied by the verifier.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the audience: the verifier this presentation is meant for.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the KB-JWT creation time explicitly. When absent, the clock is
    /// consulted.
    #[must_use]
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Set the clock used when no explicit creation time is given.
    /// Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: &'c dyn Clock) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Signer
impl<'c, J> SdJwtKbBuilder<'c, J, NoSigner> {
    /// Set the key-binding Signer: the holder key whose public half the
    /// issuer bound into `cnf.jwk`.
    #[must_use]
    pub fn signer<S: Signer>(self, signer: &'_ S) -> SdJwtKbBuilder<'c, J, HasSigner<'_, S>> {
        SdJwtKbBuilder {
            sd_jwt: self.sd_jwt,
            nonce: self.nonce,
            audience: self.audience,
            issued_at: self.issued_at,
            clock: self.clock,
            signer: HasSigner(signer),
        }
    }
}

impl<S: Signer> SdJwtKbBuilder<'_, HasSdJwt, HasSigner<'_, S>> {
    /// Build the presentation: bind `nonce`, `aud`, `iat`, and the digest
    /// of the compact SD-JWT into a KB-JWT and append it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMismatch`] when the signer's public key differs
    /// from `cnf.jwk` (or no key was bound), [`Error::MissingClaim`]
    /// without a nonce or audience, and [`Error::Signing`] when the signer
    /// capability fails.
    #[instrument(level = "debug", skip_all)]
    pub async fn build(self) -> Result<SdJwtKb> {
        tracing::debug!("sd_jwt::present");

        let sd_jwt = self.sd_jwt.0;
        let nonce = self.nonce.ok_or(Error::MissingClaim("nonce"))?;
        let aud = self.audience.ok_or(Error::MissingClaim("aud"))?;

        // the signer must hold the key bound at issuance
        let Some(bound_key) = sd_jwt.key_binding_key() else {
            return Err(Error::KeyMismatch);
        };
        let signer_key =
            self.signer.0.verifying_key().await.map_err(|e| Error::Signing(e.to_string()))?;
        if signer_key != bound_key {
            return Err(Error::KeyMismatch);
        }

        let iat = match self.issued_at {
            Some(at) => at,
            None => self.clock.map_or_else(|| SystemClock.now(), Clock::now),
        };
        let claims = KbJwtClaims {
            nonce,
            aud,
            iat,
            sd_hash: sd_jwt.digest_alg().encoded_digest(sd_jwt.compact().as_bytes()),
        };
        let header =
            Protected { alg: self.signer.0.algorithm(), typ: JwtType::KbJwt, x5c: None };

        let kb_jwt = jose::sign(&header, &claims, self.signer.0).await?;
        let kb = CompactJws::decode(&kb_jwt)?;
        let compact = format!("{}{kb_jwt}", sd_jwt.compact());

        Ok(SdJwtKb::from_parts(compact, sd_jwt, kb))
    }
}
