//! Error types shared across the credential core.

use thiserror::Error as ThisError;

use crate::cbor;

/// Errors surfaced by disclosure, SD-JWT, and JOSE processing.
///
/// Decode and verification failures are reported at the first inconsistency;
/// nothing is retried and no partial output is kept.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    /// A JWT was not three dot-separated base64url segments, or a segment
    /// did not decode.
    #[error("malformed JWT: {0}")]
    MalformedJwt(String),

    /// A compact SD-JWT or disclosure did not match the serialization the
    /// SD-JWT draft requires.
    #[error("malformed compact SD-JWT: {0}")]
    MalformedCompactSd(String),

    /// A compact SD-JWT without the mandatory trailing `~`.
    #[error("compact SD-JWT must end with '~'")]
    MissingTrailingTilde,

    /// A JOSE signature did not verify.
    #[error("signature verification failed")]
    SignatureVerification,

    /// A signing operation failed in the signer capability.
    #[error("signing failed: {0}")]
    Signing(String),

    /// An `_sd_alg` identifier naming no supported digest.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigest(String),

    /// A JOSE `alg` identifier naming no supported algorithm.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A registered claim offered for selective disclosure.
    #[error("claim \"{0}\" cannot be selectively disclosable")]
    ForbiddenSdClaim(String),

    /// A disclosure tried to introduce a claim name that already exists at
    /// the same level.
    #[error("claim \"{0}\" is already present")]
    DuplicateClaim(String),

    /// A disclosure carrying the reserved claim name `_sd` or `...`.
    #[error("disclosure claim name \"{0}\" is not permitted")]
    IllegalDisclosureClaimName(String),

    /// A claim the operation requires was absent.
    #[error("required claim \"{0}\" is missing")]
    MissingClaim(&'static str),

    /// The key-binding signer's public key does not match the `cnf.jwk`
    /// carried in the issuer-signed body.
    #[error("key binding signer does not match cnf.jwk")]
    KeyMismatch,

    /// The `sd_hash` in a KB-JWT does not match the presented SD-JWT.
    #[error("sd_hash does not match the presented SD-JWT")]
    SdHashMismatch,

    /// The verifier's nonce predicate rejected the KB-JWT.
    #[error("nonce rejected by verifier policy")]
    NonceRejected,

    /// The verifier's audience predicate rejected the KB-JWT.
    #[error("audience rejected by verifier policy")]
    AudienceRejected,

    /// The verifier's creation-time predicate rejected the KB-JWT.
    #[error("creation time rejected by verifier policy")]
    CreationTimeRejected,

    /// A CBOR codec failure.
    #[error(transparent)]
    Cbor(#[from] cbor::Error),
}

/// Shorthand result for fallible core operations.
pub type Result<T> = std::result::Result<T, Error>;
