//! # Digest and Base64URL Utilities
//!
//! The thin hashing contract the disclosure and SD-JWT machinery is wired
//! to: the SHA-2 family selected by the `_sd_alg` identifier, and base64url
//! without padding.

use std::fmt::{self, Display};
use std::str::FromStr;

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::error::Error;

/// The `_sd_alg` identifier written when the issuer does not choose one.
pub const DEFAULT_SD_ALG: &str = "sha-256";

/// Digest algorithms usable for disclosure hashing, named by their IANA
/// hash identifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DigestAlg {
    /// `sha-256`, the SD-JWT default.
    #[default]
    Sha256,
    /// `sha-384`.
    Sha384,
    /// `sha-512`.
    Sha512,
}

impl DigestAlg {
    /// The IANA identifier, as written to `_sd_alg`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha384 => "sha-384",
            Self::Sha512 => "sha-512",
        }
    }

    /// Hash `data`, returning the raw digest.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Hash `data` and base64url-encode the digest, the form disclosure
    /// digests and `sd_hash` take on the wire.
    #[must_use]
    pub fn encoded_digest(self, data: &[u8]) -> String {
        Base64UrlUnpadded::encode_string(&self.digest(data))
    }
}

/// Base64url-encode without padding, the alphabet every credential format
/// here uses.
#[must_use]
pub fn base64url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

/// Decode base64url without padding. Padding characters and any other
/// deviation from the URL-safe alphabet are rejected.
///
/// # Errors
///
/// Returns the underlying decoding error for malformed input.
pub fn base64url_decode(encoded: &str) -> Result<Vec<u8>, base64ct::Error> {
    Base64UrlUnpadded::decode_vec(encoded)
}

impl FromStr for DigestAlg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha-256" => Ok(Self::Sha256),
            "sha-384" => Ok(Self::Sha384),
            "sha-512" => Ok(Self::Sha512),
            other => Err(Error::UnsupportedDigest(other.to_string())),
        }
    }
}

impl Display for DigestAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identifiers_round_trip() {
        for alg in [DigestAlg::Sha256, DigestAlg::Sha384, DigestAlg::Sha512] {
            assert_eq!(alg.as_str().parse::<DigestAlg>().unwrap(), alg);
        }
        assert_eq!(
            "sha3-256".parse::<DigestAlg>().unwrap_err(),
            Error::UnsupportedDigest("sha3-256".to_string())
        );
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(DigestAlg::Sha256.digest(b"abc").len(), 32);
        assert_eq!(DigestAlg::Sha384.digest(b"abc").len(), 48);
        assert_eq!(DigestAlg::Sha512.digest(b"abc").len(), 64);
    }

    #[test]
    fn encoded_digest_is_base64url_nopad() {
        // SHA-256("") = e3b0c442...
        let encoded = DigestAlg::Sha256.encoded_digest(b"");
        assert_eq!(encoded, "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU");
        assert!(!encoded.contains('='));
    }

    #[test]
    fn base64url_rejects_padding() {
        let encoded = base64url_encode(b"salt");
        assert_eq!(encoded, "c2FsdA");
        assert_eq!(base64url_decode("c2FsdA").unwrap(), b"salt");
        assert!(base64url_decode("c2FsdA==").is_err());
        assert!(base64url_decode("c2Fs dA").is_err());
    }
}
