//! Fixed Ed25519 keystores for the issuer and holder roles.

use anyhow::{Result, anyhow};
use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest as _, Sha256};

use crate::provider::{Algorithm, PublicKeyJwk, SignatureVerifier, Signer};

const ISSUER_SEED: &str = "credence:test:issuer:key-0";
const HOLDER_SEED: &str = "credence:test:holder:key-0";

fn signing_key(seed: &str) -> SigningKey {
    SigningKey::from_bytes(&Sha256::digest(seed.as_bytes()).into())
}

fn jwk(key: &VerifyingKey) -> PublicKeyJwk {
    PublicKeyJwk {
        kty: "OKP".to_string(),
        crv: "Ed25519".to_string(),
        x: Base64UrlUnpadded::encode_string(key.as_bytes()),
        y: None,
    }
}

/// The issuer's signing key.
#[derive(Default, Clone, Debug)]
pub struct IssuerKeystore;

impl IssuerKeystore {
    /// The issuer's public key as a JWK.
    #[must_use]
    pub fn public_jwk(&self) -> PublicKeyJwk {
        jwk(&signing_key(ISSUER_SEED).verifying_key())
    }
}

impl Signer for IssuerKeystore {
    async fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(signing_key(ISSUER_SEED).sign(msg).to_vec())
    }

    async fn verifying_key(&self) -> Result<PublicKeyJwk> {
        Ok(self.public_jwk())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }
}

/// The holder's key-binding key.
#[derive(Default, Clone, Debug)]
pub struct HolderKeystore;

impl HolderKeystore {
    /// The holder's public key as a JWK, the value issuers put in
    /// `cnf.jwk`.
    #[must_use]
    pub fn public_jwk(&self) -> PublicKeyJwk {
        jwk(&signing_key(HOLDER_SEED).verifying_key())
    }
}

impl Signer for HolderKeystore {
    async fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(signing_key(HOLDER_SEED).sign(msg).to_vec())
    }

    async fn verifying_key(&self) -> Result<PublicKeyJwk> {
        Ok(self.public_jwk())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }
}

/// Verifies `EdDSA` signatures against an Ed25519 JWK.
#[derive(Default, Clone, Debug)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    async fn verify(
        &self, msg: &[u8], signature: &[u8], key: &PublicKeyJwk, alg: Algorithm,
    ) -> Result<()> {
        if alg != Algorithm::EdDSA {
            return Err(anyhow!("unsupported algorithm: {alg}"));
        }
        if key.kty != "OKP" || key.crv != "Ed25519" {
            return Err(anyhow!("not an Ed25519 key"));
        }

        let decoded = Base64UrlUnpadded::decode_vec(&key.x)?;
        let bytes: [u8; 32] =
            decoded.as_slice().try_into().map_err(|_| anyhow!("invalid public key length"))?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)?;
        let signature = Signature::from_slice(signature)?;

        verifying_key.verify(msg, &signature).map_err(|e| anyhow!("invalid signature: {e}"))
    }
}
