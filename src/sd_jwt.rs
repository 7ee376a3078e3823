//! # Selective-Disclosure JWT (SD-JWT)
//!
//! Issuance, filtered presentation, key binding, and verification of
//! credentials in the format of [I-D.ietf-oauth-selective-disclosure-jwt]:
//! an issuer-signed JWT whose selectively disclosable claims are replaced by
//! salted digests, followed by the matching disclosures,
//! `<Issuer-signed JWT>~<Disclosure 1>~...~<Disclosure N>~`, optionally
//! closed by a key-binding JWT.
//!
//! [I-D.ietf-oauth-selective-disclosure-jwt]: https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-17.html

mod filter;
mod issue;
mod present;
mod verify;

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::serde::{ts_seconds, ts_seconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use self::issue::SdJwtBuilder;
pub use self::present::SdJwtKbBuilder;
use crate::digest::DigestAlg;
use crate::disclosure::Disclosure;
use crate::error::{Error, Result};
use crate::jose::CompactJws;
use crate::provider::PublicKeyJwk;

/// The claim key holding disclosure digests inside an object.
pub const DIGESTS_KEY: &str = "_sd";
/// The claim key naming the digest algorithm, at top level only.
pub const SD_ALG_KEY: &str = "_sd_alg";
/// The single key of the object form hiding an array element.
pub const ARRAY_DIGEST_KEY: &str = "...";

/// Registered JWT claims that must never be selectively disclosable.
pub const FORBIDDEN_SD_CLAIMS: [&str; 5] = ["iss", "exp", "nbf", "cnf", "aud"];

/// Registered claims of an issuer-signed SD-JWT body.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SdJwtClaims {
    /// Digests of selective disclosure claims. Each digest is a hash (using
    /// the `_sd_alg` hashing algorithm) of the base64url-encoded Disclosure.
    #[serde(rename = "_sd")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sd: Vec<String>,

    /// Algorithm used to generate `_sd` digests. A default of `sha-256` is
    /// used when not set.
    #[serde(rename = "_sd_alg")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd_alg: Option<String>,

    /// The Issuer (as a URI) of the credential.
    pub iss: String,

    /// The identifier of the Subject of the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// The type of credential represented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,

    /// The time of issuance.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<DateTime<Utc>>,

    /// The time before which the credential must not be accepted.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<DateTime<Utc>>,

    /// The expiry time of the credential.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<DateTime<Utc>>,

    /// The public key the Key Binding JWT must be secured with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<KeyBinding>,
}

/// The binding between an SD-JWT and the holder's public key.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyBinding {
    /// The public key is bound to the SD-JWT using a JWK.
    Jwk(PublicKeyJwk),
}

/// Claims of a Key Binding JWT.
///
/// A Key Binding JWT is "tied to" an SD-JWT when its payload is signed using
/// the key included in the SD-JWT payload, and the KB-JWT contains a hash
/// of the SD-JWT in its `sd_hash` claim.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KbJwtClaims {
    /// The value of nonce supplied by the Verifier.
    pub nonce: String,

    /// The intended receiver of the presentation.
    pub aud: String,

    /// The time the Key Binding JWT was created.
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,

    /// The base64url-encoded hash value over the Issuer-signed JWT and the
    /// selected Disclosures.
    pub sd_hash: String,
}

/// An SD-JWT: the issuer-signed JWT plus the disclosures travelling with
/// it, in issuance order.
///
/// Values are immutable once parsed or issued; filtering produces a new
/// `SdJwt` that shares the issuer signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdJwt {
    compact: String,
    jwt: String,
    jws: CompactJws,
    digest_alg: DigestAlg,
    disclosures: Vec<String>,
}

impl SdJwt {
    /// Parse the compact serialization
    /// `<Issuer-signed JWT>~<Disclosure 1>~...~<Disclosure N>~`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingTrailingTilde`] without the mandatory final
    /// `~`, [`Error::MalformedCompactSd`] for empty or undecodable
    /// disclosure segments, [`Error::MalformedJwt`] when the JWT segment is
    /// broken, and [`Error::UnsupportedDigest`] for an unknown `_sd_alg`.
    pub fn parse(compact: &str) -> Result<Self> {
        if !compact.ends_with('~') {
            return Err(Error::MissingTrailingTilde);
        }
        let segments: Vec<&str> = compact.split('~').collect();
        let jwt = segments[0];
        let jws = CompactJws::decode(jwt)?;
        let digest_alg = digest_alg(&jws.claims)?;

        let mut disclosures = vec![];
        for segment in &segments[1..segments.len() - 1] {
            if segment.is_empty() {
                return Err(Error::MalformedCompactSd(
                    "empty disclosure segment".to_string(),
                ));
            }
            // validate the wire form up front
            Disclosure::parse(segment, digest_alg)?;
            disclosures.push((*segment).to_string());
        }

        Ok(Self {
            compact: compact.to_string(),
            jwt: jwt.to_string(),
            jws,
            digest_alg,
            disclosures,
        })
    }

    pub(crate) fn from_parts(jwt: String, jws: CompactJws, digest_alg: DigestAlg, disclosures: Vec<String>) -> Self {
        let mut compact = format!("{jwt}~");
        for disclosure in &disclosures {
            compact.push_str(disclosure);
            compact.push('~');
        }
        Self { compact, jwt, jws, digest_alg, disclosures }
    }

    /// The compact serialization, trailing `~` included.
    #[must_use]
    pub fn compact(&self) -> &str {
        &self.compact
    }

    /// The issuer-signed JWT segment.
    #[must_use]
    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    /// The decoded JOSE header.
    #[must_use]
    pub const fn header(&self) -> &Map<String, Value> {
        &self.jws.header
    }

    /// The decoded, unprocessed body: digests still in place of the
    /// selectively disclosable claims.
    #[must_use]
    pub const fn claims(&self) -> &Map<String, Value> {
        &self.jws.claims
    }

    /// The issuer signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.jws.signature
    }

    /// The digest algorithm named by `_sd_alg` (default `sha-256`).
    #[must_use]
    pub const fn digest_alg(&self) -> DigestAlg {
        self.digest_alg
    }

    /// The disclosures travelling with the JWT, in issuance order.
    #[must_use]
    pub fn disclosures(&self) -> &[String] {
        &self.disclosures
    }

    /// The body's registered claims in typed form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedJwt`] when registered claims have the
    /// wrong shape.
    pub fn sd_claims(&self) -> Result<SdJwtClaims> {
        serde_json::from_value(Value::Object(self.jws.claims.clone()))
            .map_err(|e| Error::MalformedJwt(format!("invalid registered claims: {e}")))
    }

    /// The key-binding public key carried in `cnf.jwk`, when present.
    #[must_use]
    pub fn key_binding_key(&self) -> Option<PublicKeyJwk> {
        let cnf = self.jws.claims.get("cnf")?;
        let KeyBinding::Jwk(jwk) = serde_json::from_value(cnf.clone()).ok()?;
        Some(jwk)
    }

    /// Resolve the claim object: splice every disclosure whose digest is
    /// referenced, drop `_sd`/`_sd_alg` bookkeeping and unmatched digests.
    ///
    /// This does **not** verify the issuer signature; use
    /// [`SdJwt::verify`] for that.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateClaim`],
    /// [`Error::IllegalDisclosureClaimName`], or
    /// [`Error::MalformedCompactSd`] when the disclosures are inconsistent
    /// with the body.
    pub fn disclosed_object(&self) -> Result<Map<String, Value>> {
        self.process(&mut |_, _, _| {})
    }

    /// Map of disclosure digest to parsed disclosure.
    pub(crate) fn disclosure_map(&self) -> Result<HashMap<String, Disclosure>> {
        self.disclosures
            .iter()
            .map(|encoded| {
                let disclosure = Disclosure::parse(encoded, self.digest_alg)?;
                Ok((disclosure.hashed().to_string(), disclosure))
            })
            .collect()
    }

    /// Walk the body, splicing disclosures. `visit` sees every resolved
    /// claim with its path and, for spliced claims, the anchoring
    /// disclosure.
    pub(crate) fn process(
        &self, visit: &mut dyn FnMut(&[String], &Value, Option<&Disclosure>),
    ) -> Result<Map<String, Value>> {
        let disclosures = self.disclosure_map()?;
        let mut path = vec![];
        process_object(&self.jws.claims, &disclosures, &mut path, visit)
    }
}

impl Display for SdJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact)
    }
}

impl FromStr for SdJwt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// An SD-JWT presentation: an [`SdJwt`] closed by a Key Binding JWT,
/// `<Issuer-signed JWT>~<Disclosure 1>~...~<Disclosure N>~<KB-JWT>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdJwtKb {
    compact: String,
    sd_jwt: SdJwt,
    kb: CompactJws,
}

impl SdJwtKb {
    /// Parse a presentation. The compact form must **not** end with `~`:
    /// that would be a bare SD-JWT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCompactSd`] when the KB-JWT is absent and
    /// the errors of [`SdJwt::parse`] for the leading part.
    pub fn parse(compact: &str) -> Result<Self> {
        if compact.ends_with('~') {
            return Err(Error::MalformedCompactSd(
                "presentation is missing its key-binding JWT".to_string(),
            ));
        }
        let Some(split) = compact.rfind('~') else {
            return Err(Error::MalformedCompactSd("not an SD-JWT presentation".to_string()));
        };

        let sd_jwt = SdJwt::parse(&compact[..=split])?;
        let kb = CompactJws::decode(&compact[split + 1..])?;
        if kb.header.get("typ").and_then(Value::as_str) != Some("kb+jwt") {
            return Err(Error::MalformedJwt(
                "key-binding JWT must carry typ \"kb+jwt\"".to_string(),
            ));
        }

        Ok(Self { compact: compact.to_string(), sd_jwt, kb })
    }

    pub(crate) const fn from_parts(compact: String, sd_jwt: SdJwt, kb: CompactJws) -> Self {
        Self { compact, sd_jwt, kb }
    }

    /// The compact serialization.
    #[must_use]
    pub fn compact(&self) -> &str {
        &self.compact
    }

    /// The presented SD-JWT, trailing `~` included in its compact form.
    #[must_use]
    pub const fn sd_jwt(&self) -> &SdJwt {
        &self.sd_jwt
    }

    /// The decoded KB-JWT header.
    #[must_use]
    pub const fn kb_header(&self) -> &Map<String, Value> {
        &self.kb.header
    }

    /// The KB-JWT claims in typed form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedJwt`] when `nonce`, `aud`, `iat`, or
    /// `sd_hash` are missing or mistyped.
    pub fn kb_claims(&self) -> Result<KbJwtClaims> {
        serde_json::from_value(Value::Object(self.kb.claims.clone()))
            .map_err(|e| Error::MalformedJwt(format!("invalid key-binding claims: {e}")))
    }

    pub(crate) const fn kb_jws(&self) -> &CompactJws {
        &self.kb
    }
}

impl Display for SdJwtKb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact)
    }
}

impl FromStr for SdJwtKb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn digest_alg(claims: &Map<String, Value>) -> Result<DigestAlg> {
    match claims.get(SD_ALG_KEY) {
        None => Ok(DigestAlg::default()),
        Some(Value::String(alg)) => alg.parse(),
        Some(other) => Err(Error::MalformedCompactSd(format!("invalid _sd_alg: {other}"))),
    }
}

fn process_object(
    object: &Map<String, Value>, disclosures: &HashMap<String, Disclosure>,
    path: &mut Vec<String>, visit: &mut dyn FnMut(&[String], &Value, Option<&Disclosure>),
) -> Result<Map<String, Value>> {
    let mut out = Map::new();

    for (name, value) in object {
        if name == DIGESTS_KEY || name == SD_ALG_KEY {
            continue;
        }
        path.push(name.clone());
        let processed = process_value(value, disclosures, path, visit)?;
        visit(path, &processed, None);
        out.insert(name.clone(), processed);
        path.pop();
    }

    let Some(digests) = object.get(DIGESTS_KEY) else {
        return Ok(out);
    };
    let Some(digests) = digests.as_array() else {
        return Err(Error::MalformedCompactSd("_sd is not an array".to_string()));
    };
    for digest in digests {
        let Some(digest) = digest.as_str() else {
            return Err(Error::MalformedCompactSd("_sd digest is not a string".to_string()));
        };
        // digests with no disclosure stay hidden
        let Some(disclosure) = disclosures.get(digest) else {
            continue;
        };
        let Some(name) = disclosure.name() else {
            return Err(Error::MalformedCompactSd(
                "object disclosure is missing its claim name".to_string(),
            ));
        };
        if name == DIGESTS_KEY || name == ARRAY_DIGEST_KEY {
            return Err(Error::IllegalDisclosureClaimName(name.to_string()));
        }
        if out.contains_key(name) {
            return Err(Error::DuplicateClaim(name.to_string()));
        }
        path.push(name.to_string());
        let processed = process_value(disclosure.value(), disclosures, path, visit)?;
        visit(path, &processed, Some(disclosure));
        out.insert(name.to_string(), processed);
        path.pop();
    }

    Ok(out)
}

fn process_value(
    value: &Value, disclosures: &HashMap<String, Disclosure>, path: &mut Vec<String>,
    visit: &mut dyn FnMut(&[String], &Value, Option<&Disclosure>),
) -> Result<Value> {
    match value {
        Value::Object(object) => {
            Ok(Value::Object(process_object(object, disclosures, path, visit)?))
        }
        Value::Array(elements) => {
            let mut out = vec![];
            for (index, element) in elements.iter().enumerate() {
                path.push(index.to_string());
                if let Some(digest) = array_digest(element) {
                    // hidden element: splice when disclosed, drop otherwise
                    if let Some(disclosure) = disclosures.get(digest) {
                        if disclosure.name().is_some() {
                            return Err(Error::MalformedCompactSd(
                                "array disclosure must not carry a claim name".to_string(),
                            ));
                        }
                        let processed =
                            process_value(disclosure.value(), disclosures, path, visit)?;
                        visit(path, &processed, Some(disclosure));
                        out.push(processed);
                    }
                } else {
                    out.push(process_value(element, disclosures, path, visit)?);
                }
                path.pop();
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn array_digest(element: &Value) -> Option<&str> {
    let object = element.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(ARRAY_DIGEST_KEY)?.as_str()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::test_utils::SeedRng;

    fn disclosure(name: Option<&str>, value: Value, seed: u64) -> Disclosure {
        let mut rng = SeedRng::new(seed);
        Disclosure::new(name, value, DigestAlg::Sha256, &mut rng, 16).unwrap()
    }

    // assemble an SdJwt around a hand-built body, bypassing signing
    fn sd_jwt(body: Value, disclosures: &[&Disclosure]) -> SdJwt {
        use base64ct::{Base64UrlUnpadded, Encoding};

        let header = json!({"alg": "EdDSA", "typ": "dc+sd-jwt"});
        let jwt = format!(
            "{}.{}.{}",
            Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header).unwrap()),
            Base64UrlUnpadded::encode_string(&serde_json::to_vec(&body).unwrap()),
            Base64UrlUnpadded::encode_string(b"sig")
        );
        let mut compact = format!("{jwt}~");
        for d in disclosures {
            compact.push_str(d.encoded());
            compact.push('~');
        }
        SdJwt::parse(&compact).unwrap()
    }

    #[test]
    fn parse_requires_trailing_tilde() {
        assert_eq!(SdJwt::parse("a.b.c").unwrap_err(), Error::MissingTrailingTilde);
    }

    #[test]
    fn parse_rejects_empty_segments() {
        let d = disclosure(Some("a"), json!(1), 0);
        let jwt = sd_jwt(json!({"iss": "x"}), &[&d]).jwt;
        let compact = format!("{jwt}~~{}~", d.encoded());
        assert!(matches!(SdJwt::parse(&compact), Err(Error::MalformedCompactSd(_))));
    }

    #[test]
    fn parse_rejects_unknown_sd_alg() {
        let token = sd_jwt(json!({"iss": "x"}), &[]);
        let body = json!({"iss": "x", "_sd_alg": "md5"});
        let compact = format!(
            "{}.{}.{}~",
            token.jwt.split('.').next().unwrap(),
            {
                use base64ct::{Base64UrlUnpadded, Encoding};
                Base64UrlUnpadded::encode_string(&serde_json::to_vec(&body).unwrap())
            },
            "c2ln"
        );
        assert_eq!(
            SdJwt::parse(&compact).unwrap_err(),
            Error::UnsupportedDigest("md5".to_string())
        );
    }

    #[test]
    fn processing_splices_disclosures() {
        let given = disclosure(Some("given_name"), json!("Alice"), 1);
        let age = disclosure(Some("age_over_21"), json!(true), 2);
        let token = sd_jwt(
            json!({
                "iss": "https://iss.example",
                "_sd": [given.hashed(), age.hashed()],
                "_sd_alg": "sha-256",
            }),
            &[&given, &age],
        );

        let resolved = token.disclosed_object().unwrap();
        assert_eq!(resolved.get("given_name"), Some(&json!("Alice")));
        assert_eq!(resolved.get("age_over_21"), Some(&json!(true)));
        assert_eq!(resolved.get("iss"), Some(&json!("https://iss.example")));
        assert!(!resolved.contains_key(DIGESTS_KEY));
        assert!(!resolved.contains_key(SD_ALG_KEY));
    }

    #[test]
    fn unknown_digests_resolve_to_nothing() {
        let token = sd_jwt(
            json!({"iss": "x", "_sd": ["AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"]}),
            &[],
        );
        let resolved = token.disclosed_object().unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("iss"));
    }

    #[test]
    fn duplicate_claims_are_rejected() {
        let dup = disclosure(Some("given_name"), json!("Mallory"), 3);
        let token = sd_jwt(
            json!({"iss": "x", "given_name": "Alice", "_sd": [dup.hashed()]}),
            &[&dup],
        );
        assert_eq!(
            token.disclosed_object().unwrap_err(),
            Error::DuplicateClaim("given_name".to_string())
        );
    }

    #[test]
    fn reserved_claim_names_are_rejected() {
        let evil = disclosure(Some("_sd"), json!(["x"]), 4);
        let token = sd_jwt(json!({"iss": "x", "_sd": [evil.hashed()]}), &[&evil]);
        assert_eq!(
            token.disclosed_object().unwrap_err(),
            Error::IllegalDisclosureClaimName("_sd".to_string())
        );

        let evil = disclosure(Some("..."), json!(1), 5);
        let token = sd_jwt(json!({"iss": "x", "_sd": [evil.hashed()]}), &[&evil]);
        assert_eq!(
            token.disclosed_object().unwrap_err(),
            Error::IllegalDisclosureClaimName("...".to_string())
        );
    }

    #[test]
    fn hidden_array_elements() {
        let fr = disclosure(None, json!("FR"), 6);
        let token = sd_jwt(
            json!({
                "iss": "x",
                "nationalities": [{"...": fr.hashed()}, {"...": "unknown-digest"}, "DE"],
            }),
            &[&fr],
        );

        let resolved = token.disclosed_object().unwrap();
        // disclosed element spliced, unknown digest dropped, plain kept
        assert_eq!(resolved.get("nationalities"), Some(&json!(["FR", "DE"])));
    }

    #[test]
    fn recursive_disclosures_resolve_depth_first() {
        // street hidden inside address, address itself hidden
        let street = disclosure(Some("street"), json!("Main"), 7);
        let address = disclosure(Some("address"), json!({"_sd": [street.hashed()]}), 8);
        let token = sd_jwt(json!({"iss": "x", "_sd": [address.hashed()]}), &[&street, &address]);

        let resolved = token.disclosed_object().unwrap();
        assert_eq!(resolved.get("address"), Some(&json!({"street": "Main"})));
    }

    #[test]
    fn five_levels_of_nesting() {
        let e = disclosure(Some("e"), json!(5), 10);
        let d = disclosure(Some("d"), json!({"_sd": [e.hashed()]}), 11);
        let c = disclosure(Some("c"), json!({"_sd": [d.hashed()]}), 12);
        let b = disclosure(Some("b"), json!({"_sd": [c.hashed()]}), 13);
        let a = disclosure(Some("a"), json!({"_sd": [b.hashed()]}), 14);
        let token =
            sd_jwt(json!({"iss": "x", "_sd": [a.hashed()]}), &[&a, &b, &c, &d, &e]);

        let resolved = token.disclosed_object().unwrap();
        assert_eq!(
            resolved.get("a"),
            Some(&json!({"b": {"c": {"d": {"e": 5}}}}))
        );
    }

    #[test]
    fn visit_reports_paths_and_anchors() {
        let street = disclosure(Some("street"), json!("Main"), 15);
        let address = disclosure(Some("address"), json!({"_sd": [street.hashed()]}), 16);
        let token = sd_jwt(json!({"iss": "x", "_sd": [address.hashed()]}), &[&street, &address]);

        let mut seen = vec![];
        token
            .process(&mut |path, _, disclosure| {
                seen.push((path.join("."), disclosure.map(|d| d.hashed().to_string())));
            })
            .unwrap();

        assert!(seen.contains(&("iss".to_string(), None)));
        assert!(seen.contains(&("address".to_string(), Some(address.hashed().to_string()))));
        assert!(
            seen.contains(&("address.street".to_string(), Some(street.hashed().to_string())))
        );
    }

    #[test]
    fn presentation_must_not_end_with_tilde() {
        assert!(matches!(SdJwtKb::parse("a.b.c~d1~"), Err(Error::MalformedCompactSd(_))));
        assert!(matches!(SdJwtKb::parse("a.b.c"), Err(Error::MalformedCompactSd(_))));
    }
}
