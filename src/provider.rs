//! # Capability Providers
//!
//! The credential core signs, verifies, draws randomness, and reads the
//! clock only through the traits below. Hosts supply implementations backed
//! by whatever they have: an in-process key, a platform keystore, an HSM.
//! The core holds no key material and no process-wide handles of its own.

use std::fmt::{self, Display};
use std::future::Future;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// JOSE signing algorithms the core recognizes in `alg` headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Edwards-curve signatures (Ed25519).
    #[default]
    EdDSA,
    /// ECDSA over P-256 with SHA-256.
    Es256,
}

impl Algorithm {
    /// The JOSE identifier written to `alg` headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EdDSA => "EdDSA",
            Self::Es256 => "ES256",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EdDSA" => Ok(Self::EdDSA),
            "ES256" => Ok(Self::Es256),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A public key in JWK form, as carried in `cnf.jwk`.
///
/// Two keys are the same key when `kty`, `crv`, `x`, and `y` match.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PublicKeyJwk {
    /// Key type, e.g. `OKP` or `EC`.
    pub kty: String,

    /// Curve, e.g. `Ed25519` or `P-256`.
    pub crv: String,

    /// Base64url-encoded x-coordinate (or Edwards public key bytes).
    pub x: String,

    /// Base64url-encoded y-coordinate, for curves that carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// A signing capability: an issuer key for SD-JWT issuance or a holder key
/// for key binding. The returned signature must match [`Signer::algorithm`].
pub trait Signer: Send + Sync {
    /// Sign `msg`, returning the raw signature bytes.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// The public half of the signing key.
    fn verifying_key(&self) -> impl Future<Output = Result<PublicKeyJwk>> + Send;

    /// The JOSE algorithm the signatures are made with.
    fn algorithm(&self) -> Algorithm;
}

/// A signature-verification capability.
pub trait SignatureVerifier: Send + Sync {
    /// Check `signature` over `msg` against `key`. An `Err` means the
    /// signature does not verify (or the algorithm/key cannot be used).
    fn verify(
        &self, msg: &[u8], signature: &[u8], key: &PublicKeyJwk, alg: Algorithm,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// A source of randomness for disclosure salts.
///
/// Any [`rand::RngCore`] qualifies; tests inject a deterministic stream.
pub trait Rng {
    /// Fill `buf` with random bytes.
    fn fill(&mut self, buf: &mut [u8]);
}

impl<T: rand::RngCore> Rng for T {
    fn fill(&mut self, buf: &mut [u8]) {
        self.fill_bytes(buf);
    }
}

/// A clock, consulted only when a presentation is built without an explicit
/// creation time.
pub trait Clock {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The host system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
