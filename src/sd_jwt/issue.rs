//! SD-JWT issuance: walk a claim tree, emit recursive disclosures, sign the
//! remaining body.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::{Map, Value};
use tracing::instrument;

use super::{ARRAY_DIGEST_KEY, DIGESTS_KEY, FORBIDDEN_SD_CLAIMS, KeyBinding, SD_ALG_KEY, SdJwt};
use crate::digest::DigestAlg;
use crate::disclosure::{DEFAULT_SALT_SIZE, Disclosure};
use crate::error::{Error, Result};
use crate::jose::{self, CompactJws, JwtType, Protected};
use crate::provider::{PublicKeyJwk, Rng, Signer};

/// Issues an IETF `dc+sd-jwt` format credential.
///
/// Selectively disclosable claims become disclosures: primitives directly,
/// objects and arrays recursively, so that nested claims can be disclosed
/// on their own. Always-present claims ride in the body untouched and must
/// include `iss`.
pub struct SdJwtBuilder<'r, C, S> {
    claims: C,
    registered: Map<String, Value>,
    digest_alg: DigestAlg,
    salt_size: usize,
    decoys: usize,
    key_binding: Option<PublicKeyJwk>,
    x5c: Option<Vec<String>>,
    rng: Option<&'r mut dyn Rng>,
    signer: S,
}

impl<C: std::fmt::Debug, S: std::fmt::Debug> std::fmt::Debug for SdJwtBuilder<'_, C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdJwtBuilder")
            .field("claims", &self.claims)
            .field("registered", &self.registered)
            .field("digest_alg", &self.digest_alg)
            .field("salt_size", &self.salt_size)
            .field("decoys", &self.decoys)
            .field("key_binding", &self.key_binding)
            .field("x5c", &self.x5c)
            .field("rng", &self.rng.as_ref().map(|_| "<dyn Rng>"))
            .field("signer", &self.signer)
            .finish()
    }
}

/// Builder has no claims.
#[doc(hidden)]
pub struct NoClaims;
/// Builder has claims.
#[doc(hidden)]
pub struct HasClaims(Map<String, Value>);

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for SdJwtBuilder<'_, NoClaims, NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl SdJwtBuilder<'_, NoClaims, NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            claims: NoClaims,
            registered: Map::new(),
            digest_alg: DigestAlg::default(),
            salt_size: DEFAULT_SALT_SIZE,
            decoys: 0,
            key_binding: None,
            x5c: None,
            rng: None,
            signer: NoSigner,
        }
    }
}

// Selectively disclosable claims
impl<'r, S> SdJwtBuilder<'r, NoClaims, S> {
    /// Set the selectively disclosable claims.
    #[must_use]
    pub fn claims(self, claims: Map<String, Value>) -> SdJwtBuilder<'r, HasClaims, S> {
        SdJwtBuilder {
            claims: HasClaims(claims),
            registered: self.registered,
            digest_alg: self.digest_alg,
            salt_size: self.salt_size,
            decoys: self.decoys,
            key_binding: self.key_binding,
            x5c: self.x5c,
            rng: self.rng,
            signer: self.signer,
        }
    }
}

// Optional fields
impl<'r, C, S> SdJwtBuilder<'r, C, S> {
    /// Set the always-present claims (`iss` is required; `sub`, `vct`,
    /// `iat`, `nbf`, `exp` are typical).
    #[must_use]
    pub fn registered_claims(mut self, claims: Map<String, Value>) -> Self {
        self.registered = claims;
        self
    }

    /// Set the digest algorithm written to `_sd_alg`. Defaults to
    /// `sha-256`.
    #[must_use]
    pub fn digest_alg(mut self, alg: DigestAlg) -> Self {
        self.digest_alg = alg;
        self
    }

    /// Set the disclosure salt size in bytes. Defaults to 16 (128 bits).
    #[must_use]
    pub fn salt_size(mut self, bytes: usize) -> Self {
        self.salt_size = bytes;
        self
    }

    /// Add `count` decoy digests to the top-level `_sd` array.
    #[must_use]
    pub fn decoys(mut self, count: usize) -> Self {
        self.decoys = count;
        self
    }

    /// Set the holder public key carried in `cnf.jwk`.
    #[must_use]
    pub fn key_binding(mut self, jwk: PublicKeyJwk) -> Self {
        self.key_binding = Some(jwk);
        self
    }

    /// Set the X.509 chain for the issuer header (base64 DER, signing
    /// certificate first).
    #[must_use]
    pub fn x5c(mut self, chain: Vec<String>) -> Self {
        self.x5c = Some(chain);
        self
    }

    /// Set the randomness source used to draw salts. Defaults to the
    /// thread RNG.
    #[must_use]
    pub fn rng(mut self, rng: &'r mut dyn Rng) -> Self {
        self.rng = Some(rng);
        self
    }
}

// Signer
impl<'r, C> SdJwtBuilder<'r, C, NoSigner> {
    /// Set the credential Signer.
    #[must_use]
    pub fn signer<S: Signer>(self, signer: &'_ S) -> SdJwtBuilder<'r, C, HasSigner<'_, S>> {
        SdJwtBuilder {
            claims: self.claims,
            registered: self.registered,
            digest_alg: self.digest_alg,
            salt_size: self.salt_size,
            decoys: self.decoys,
            key_binding: self.key_binding,
            x5c: self.x5c,
            rng: self.rng,
            signer: HasSigner(signer),
        }
    }
}

impl<S: Signer> SdJwtBuilder<'_, HasClaims, HasSigner<'_, S>> {
    /// Build the credential: emit disclosures in depth-first claim order,
    /// sign the body, and assemble the compact serialization
    /// `<Issuer-signed JWT>~<Disclosure 1>~...~<Disclosure N>~`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForbiddenSdClaim`] when a registered claim is
    /// offered for selective disclosure, [`Error::MissingClaim`] without an
    /// `iss`, and [`Error::Signing`] when the signer capability fails.
    #[instrument(level = "debug", skip_all)]
    pub async fn build(self) -> Result<SdJwt> {
        tracing::debug!("sd_jwt::issue");

        if !self.registered.contains_key("iss") {
            return Err(Error::MissingClaim("iss"));
        }

        let mut thread_rng = rand::rng();
        let rng: &mut dyn Rng = match self.rng {
            Some(injected) => injected,
            None => &mut thread_rng,
        };

        let mut disclosures = vec![];
        let mut sd = vec![];
        for (name, value) in self.claims.0 {
            if FORBIDDEN_SD_CLAIMS.contains(&name.as_str()) {
                return Err(Error::ForbiddenSdClaim(name));
            }
            let digest = insert_claim(
                Some(&name),
                value,
                self.digest_alg,
                self.salt_size,
                rng,
                &mut disclosures,
            )?;
            sd.push(Value::String(digest));
        }
        for _ in 0..self.decoys {
            sd.push(Value::String(decoy_digest(self.digest_alg, self.salt_size, rng)));
        }

        let mut body = self.registered;
        if !sd.is_empty() {
            body.insert(DIGESTS_KEY.to_string(), Value::Array(sd));
        }
        body.insert(SD_ALG_KEY.to_string(), Value::String(self.digest_alg.as_str().to_string()));
        if let Some(jwk) = self.key_binding {
            let cnf = serde_json::to_value(KeyBinding::Jwk(jwk))
                .map_err(|e| Error::Signing(e.to_string()))?;
            body.insert("cnf".to_string(), cnf);
        }

        let header = Protected {
            alg: self.signer.0.algorithm(),
            typ: JwtType::SdJwt,
            x5c: self.x5c,
        };
        let jwt = jose::sign(&header, &body, self.signer.0).await?;
        let jws = CompactJws::decode(&jwt)?;

        Ok(SdJwt::from_parts(
            jwt,
            jws,
            self.digest_alg,
            disclosures.iter().map(|d| d.encoded().to_string()).collect(),
        ))
    }
}

// Emit a disclosure for one claim, recursing into objects and arrays so
// each nested claim gets a disclosure of its own. Returns the digest the
// enclosing structure embeds.
fn insert_claim(
    name: Option<&str>, value: Value, alg: DigestAlg, salt_size: usize, rng: &mut dyn Rng,
    disclosures: &mut Vec<Disclosure>,
) -> Result<String> {
    let mapped = match value {
        Value::Object(object) => {
            let mut digests = vec![];
            for (sub_name, sub_value) in object {
                let digest =
                    insert_claim(Some(&sub_name), sub_value, alg, salt_size, rng, disclosures)?;
                digests.push(Value::String(digest));
            }
            let mut mapped = Map::new();
            mapped.insert(DIGESTS_KEY.to_string(), Value::Array(digests));
            Value::Object(mapped)
        }
        Value::Array(elements) => {
            let mut hidden = vec![];
            for element in elements {
                let digest = insert_claim(None, element, alg, salt_size, rng, disclosures)?;
                let mut entry = Map::new();
                entry.insert(ARRAY_DIGEST_KEY.to_string(), Value::String(digest));
                hidden.push(Value::Object(entry));
            }
            Value::Array(hidden)
        }
        primitive => primitive,
    };

    let disclosure = Disclosure::new(name, mapped, alg, rng, salt_size)?;
    let digest = disclosure.hashed().to_string();
    disclosures.push(disclosure);
    Ok(digest)
}

// A decoy is the digest of nothing but fresh salt; verifiers skip digests
// with no matching disclosure.
fn decoy_digest(alg: DigestAlg, salt_size: usize, rng: &mut dyn Rng) -> String {
    let mut salt = vec![0u8; salt_size];
    rng.fill(&mut salt);
    alg.encoded_digest(Base64UrlUnpadded::encode_string(&salt).as_bytes())
}
