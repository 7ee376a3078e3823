//! # JOSE Compact Serialization
//!
//! Assembly and parsing of compact JWS strings ([RFC 7515]): base64url of
//! header, payload, and signature joined by `.`. The issuer-signed JWT and
//! the key-binding JWT both travel in this form; signing and verification
//! happen through the capability traits in [`crate::provider`].
//!
//! [RFC 7515]: https://www.rfc-editor.org/rfc/rfc7515

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::provider::{Algorithm, PublicKeyJwk, SignatureVerifier, Signer};

/// JWT `typ` header options.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum JwtType {
    /// JWT `typ` for SD-JWT credentials.
    #[serde(rename = "dc+sd-jwt")]
    #[default]
    SdJwt,

    /// JWT `typ` for Key Binding JWT.
    #[serde(rename = "kb+jwt")]
    KbJwt,
}

impl From<JwtType> for String {
    fn from(t: JwtType) -> Self {
        match t {
            JwtType::SdJwt => "dc+sd-jwt".to_string(),
            JwtType::KbJwt => "kb+jwt".to_string(),
        }
    }
}

/// The protected header of a compact JWS produced by this crate.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Protected {
    /// Signing algorithm, matching the signer capability.
    pub alg: Algorithm,

    /// Media type of the secured payload.
    pub typ: JwtType,

    /// X.509 certificate chain: base64 DER, signing certificate first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

/// A parsed compact JWS: decoded header and claims plus the exact bytes the
/// signature covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactJws {
    /// Decoded protected header.
    pub header: Map<String, Value>,

    /// Decoded claims set.
    pub claims: Map<String, Value>,

    /// The `<header>.<payload>` prefix the signature is computed over.
    pub signing_input: String,

    /// Decoded signature bytes.
    pub signature: Vec<u8>,
}

impl CompactJws {
    /// Parse a compact JWS into its three segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedJwt`] unless the string is three
    /// dot-separated base64url segments with JSON-object header and claims.
    pub fn decode(jwt: &str) -> Result<Self> {
        let segments: Vec<&str> = jwt.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = segments.as_slice() else {
            return Err(Error::MalformedJwt(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let header = decode_object(header_b64, "header")?;
        let claims = decode_object(claims_b64, "claims")?;
        let signature = Base64UrlUnpadded::decode_vec(signature_b64)
            .map_err(|e| Error::MalformedJwt(format!("invalid signature encoding: {e}")))?;

        Ok(Self {
            header,
            claims,
            signing_input: format!("{header_b64}.{claims_b64}"),
            signature,
        })
    }

    /// The header's `alg`, parsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedJwt`] when `alg` is absent and
    /// [`Error::UnsupportedAlgorithm`] when it names no known algorithm.
    pub fn algorithm(&self) -> Result<Algorithm> {
        self.header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedJwt("missing alg header".to_string()))?
            .parse()
    }

    /// Verify the signature over [`Self::signing_input`] with `key`, using
    /// the algorithm the header names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureVerification`] when the signature does not
    /// verify.
    pub async fn verify<V: SignatureVerifier>(&self, key: &PublicKeyJwk, verifier: &V) -> Result<()> {
        let alg = self.algorithm()?;
        verifier
            .verify(self.signing_input.as_bytes(), &self.signature, key, alg)
            .await
            .map_err(|_| Error::SignatureVerification)
    }
}

/// Sign `claims` under `header`, producing the compact serialization.
///
/// # Errors
///
/// Returns [`Error::Signing`] when the signer capability fails.
pub async fn sign<S: Signer, T: Serialize>(
    header: &Protected, claims: &T, signer: &S,
) -> Result<String> {
    let header_json =
        serde_json::to_vec(header).map_err(|e| Error::Signing(e.to_string()))?;
    let claims_json = serde_json::to_vec(claims).map_err(|e| Error::Signing(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        Base64UrlUnpadded::encode_string(&header_json),
        Base64UrlUnpadded::encode_string(&claims_json)
    );
    let signature = signer
        .try_sign(signing_input.as_bytes())
        .await
        .map_err(|e| Error::Signing(e.to_string()))?;

    Ok(format!("{signing_input}.{}", Base64UrlUnpadded::encode_string(&signature)))
}

fn decode_object(b64: &str, what: &str) -> Result<Map<String, Value>> {
    let bytes = Base64UrlUnpadded::decode_vec(b64)
        .map_err(|e| Error::MalformedJwt(format!("invalid {what} encoding: {e}")))?;
    let Value::Object(object) = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedJwt(format!("invalid {what} JSON: {e}")))?
    else {
        return Err(Error::MalformedJwt(format!("{what} is not a JSON object")));
    };
    Ok(object)
}
