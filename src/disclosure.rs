//! # Claim Disclosures
//!
//! A disclosure carries one selectively disclosable claim out of band: a
//! JSON array `[salt, name, value]` for object claims or `[salt, value]`
//! for array elements, base64url-encoded. Only the salted hash of that
//! encoding appears in the issuer-signed JWT.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::Value;

use crate::digest::DigestAlg;
use crate::error::{Error, Result};
use crate::provider::Rng;

/// Default salt size in bytes (128 bits).
pub const DEFAULT_SALT_SIZE: usize = 16;

/// A single claim disclosure.
///
/// The canonical base64url string and the digest are fixed at construction;
/// a disclosure received off the wire is hashed over the exact bytes
/// received, never re-serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disclosure {
    salt: String,
    name: Option<String>,
    value: Value,
    encoded: String,
    hash: String,
}

impl Disclosure {
    /// Create a disclosure for claim `name` (or an array element when
    /// `name` is `None`) with a fresh salt drawn from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCompactSd`] if the claim value cannot be
    /// serialized.
    pub fn new(
        name: Option<&str>, value: Value, alg: DigestAlg, rng: &mut dyn Rng, salt_size: usize,
    ) -> Result<Self> {
        let mut salt_bytes = vec![0u8; salt_size];
        rng.fill(&mut salt_bytes);
        let salt = Base64UrlUnpadded::encode_string(&salt_bytes);

        let array = match name {
            Some(name) => Value::Array(vec![salt.clone().into(), name.into(), value.clone()]),
            None => Value::Array(vec![salt.clone().into(), value.clone()]),
        };
        let json = serde_json::to_vec(&array)
            .map_err(|e| Error::MalformedCompactSd(format!("unserializable claim: {e}")))?;
        let encoded = Base64UrlUnpadded::encode_string(&json);
        let hash = alg.encoded_digest(encoded.as_bytes());

        Ok(Self { salt, name: name.map(ToOwned::to_owned), value, encoded, hash })
    }

    /// Parse a disclosure from its base64url wire form, hashing the string
    /// exactly as received.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCompactSd`] unless the string decodes to a
    /// JSON array `[salt, name, value]` or `[salt, value]`.
    pub fn parse(encoded: &str, alg: DigestAlg) -> Result<Self> {
        let json = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| Error::MalformedCompactSd(format!("invalid disclosure encoding: {e}")))?;
        let Value::Array(elements) = serde_json::from_slice(&json)
            .map_err(|e| Error::MalformedCompactSd(format!("invalid disclosure JSON: {e}")))?
        else {
            return Err(Error::MalformedCompactSd("disclosure is not a JSON array".to_string()));
        };

        let (salt, name, value) = match elements.as_slice() {
            [Value::String(salt), Value::String(name), value] => {
                (salt.clone(), Some(name.clone()), value.clone())
            }
            [Value::String(salt), value] => (salt.clone(), None, value.clone()),
            _ => {
                return Err(Error::MalformedCompactSd(
                    "disclosure must be [salt, name, value] or [salt, value]".to_string(),
                ));
            }
        };

        let hash = alg.encoded_digest(encoded.as_bytes());
        Ok(Self { salt, name, value, encoded: encoded.to_string(), hash })
    }

    /// The salt, base64url-encoded.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// The claim name. `None` for array-element disclosures.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The claim value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// The canonical base64url string, as sent on the wire.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The disclosure digest: base64url of the hash of the canonical
    /// string.
    #[must_use]
    pub fn hashed(&self) -> &str {
        &self.hash
    }
}
