//! Selecting which disclosures travel with a presentation.
//!
//! After the caller's selection, the filter restores referential closure:
//! every retained disclosure's digest must stay reachable from the
//! issuer-signed body, so an inner claim drags its enclosing disclosure
//! back in.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::instrument;

use super::{DIGESTS_KEY, SdJwt, array_digest};
use crate::error::Result;

impl SdJwt {
    /// Keep only the disclosures whose resolved claims satisfy `include`.
    ///
    /// The predicate sees each disclosure-anchored claim's path (object
    /// keys and array indices, root first) and resolved value. Disclosures
    /// needed to keep an included claim reachable are retained regardless
    /// of the predicate; issuance order is preserved; the issuer signature
    /// is untouched.
    ///
    /// # Errors
    ///
    /// Returns the errors of disclosure processing.
    #[instrument(level = "debug", skip_all)]
    pub fn filter<F>(&self, mut include: F) -> Result<Self>
    where
        F: FnMut(&[String], &Value) -> bool,
    {
        tracing::debug!("sd_jwt::filter");

        let disclosures = self.disclosure_map()?;

        // apply the caller's selection to every anchored claim
        let mut kept = HashSet::new();
        self.process(&mut |path, value, disclosure| {
            if let Some(disclosure) = disclosure {
                if include(path, value) {
                    kept.insert(disclosure.hashed().to_string());
                }
            }
        })?;

        // digest -> the disclosure whose mapped value embeds it
        let mut parent: HashMap<String, String> = HashMap::new();
        for (digest, disclosure) in &disclosures {
            let mut embedded = vec![];
            embedded_digests(disclosure.value(), &mut embedded);
            for inner in embedded {
                parent.insert(inner, digest.clone());
            }
        }

        // close over the parent chain until a fixed point
        let mut queue: Vec<String> = kept.iter().cloned().collect();
        while let Some(digest) = queue.pop() {
            if let Some(outer) = parent.get(&digest) {
                if kept.insert(outer.clone()) {
                    queue.push(outer.clone());
                }
            }
        }

        let remaining = self
            .disclosures
            .iter()
            .filter(|encoded| kept.contains(&self.digest_alg.encoded_digest(encoded.as_bytes())))
            .cloned()
            .collect();

        Ok(Self::from_parts(self.jwt.clone(), self.jws.clone(), self.digest_alg, remaining))
    }

    /// Keep the disclosures whose claim paths start with one of the
    /// requested paths.
    ///
    /// # Errors
    ///
    /// Returns the errors of disclosure processing.
    pub fn filter_paths(&self, paths: &[&[&str]]) -> Result<Self> {
        self.filter(|path, _| {
            paths.iter().any(|requested| {
                requested.len() <= path.len()
                    && requested.iter().zip(path).all(|(a, b)| *a == b.as_str())
            })
        })
    }
}

// Every digest the value makes reachable, however deeply nested.
fn embedded_digests(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            if let Some(Value::Array(digests)) = object.get(DIGESTS_KEY) {
                for digest in digests {
                    if let Some(digest) = digest.as_str() {
                        out.push(digest.to_string());
                    }
                }
            }
            for (key, nested) in object {
                if key != DIGESTS_KEY {
                    embedded_digests(nested, out);
                }
            }
        }
        Value::Array(elements) => {
            for element in elements {
                if let Some(digest) = array_digest(element) {
                    out.push(digest.to_string());
                } else {
                    embedded_digests(element, out);
                }
            }
        }
        _ => {}
    }
}
