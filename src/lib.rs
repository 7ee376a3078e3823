//! The codec core of a selective-disclosure identity credential library:
//! a CBOR encoder/decoder for the wire format of [ISO/IEC 18013-5] mobile
//! documents, and an SD-JWT engine implementing issuance, filtered
//! presentation, key binding, and verification per
//! [I-D.ietf-oauth-selective-disclosure-jwt].
//!
//! The crate is purely data-transforming: signing, signature verification,
//! randomness, and the clock are capability traits in [`provider`] that the
//! host implements. Values are immutable once constructed and safe to share
//! across threads.
//!
//! [ISO/IEC 18013-5]: https://www.iso.org/standard/69084.html
//! [I-D.ietf-oauth-selective-disclosure-jwt]: https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-17.html

pub mod cbor;
pub mod digest;
mod disclosure;
mod error;
pub mod jose;
pub mod provider;
pub mod sd_jwt;
pub mod test_utils;

pub use crate::digest::DigestAlg;
pub use crate::disclosure::{DEFAULT_SALT_SIZE, Disclosure};
pub use crate::error::{Error, Result};
pub use crate::sd_jwt::{SdJwt, SdJwtBuilder, SdJwtKb, SdJwtKbBuilder};
