//! # Concise Binary Object Representation (CBOR)
//!
//! An encoder/decoder for the subset of [RFC 8949] used by ISO/IEC 18013-5
//! mobile documents: unsigned and negative integers, byte strings, text
//! strings, arrays, maps, semantic tags, and the simple values `true`,
//! `false`, and `null`.
//!
//! Floating-point shapes and simple values other than 20/21/22 are rejected
//! on parse. Indefinite-length arrays and maps are accepted on parse; the
//! encoder only ever emits definite lengths. Map entries can be put into the
//! canonical order mobile-document verifiers expect (shorter encoded key
//! first, lexicographic bytes otherwise) with [`Map::canonicalize`].
//!
//! [RFC 8949]: https://www.rfc-editor.org/rfc/rfc8949

mod item;
mod parse;
mod pretty;

use thiserror::Error as ThisError;

pub use self::item::{Item, Map};
pub use self::parse::{Flow, Visitor, parse, parse_stream, parse_view};
pub use self::pretty::PrettyPrinter;

/// Maximum nesting depth accepted by the parser.
pub const MAX_DEPTH: usize = 1000;

/// Simple value for `false` (major type 7).
pub(crate) const SIMPLE_FALSE: u8 = 20;
/// Simple value for `true` (major type 7).
pub(crate) const SIMPLE_TRUE: u8 = 21;
/// Simple value for `null` (major type 7).
pub(crate) const SIMPLE_NULL: u8 = 22;
/// Additional info marking an indefinite length (or the `0xFF` break byte).
pub(crate) const ADDL_INDEFINITE: u8 = 31;
/// The break stop-code terminating an indefinite-length container.
pub(crate) const BREAK: u8 = 0xff;

/// The major type carried in the top 3 bits of every item header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MajorType {
    /// Major type 0: unsigned integer.
    UInt = 0,
    /// Major type 1: negative integer, encoded as `-1 - n`.
    NInt = 1,
    /// Major type 2: byte string.
    BStr = 2,
    /// Major type 3: UTF-8 text string.
    TStr = 3,
    /// Major type 4: array of items.
    Array = 4,
    /// Major type 5: map of item pairs.
    Map = 5,
    /// Major type 6: semantic tag.
    Tag = 6,
    /// Major type 7: simple values.
    Simple = 7,
}

impl MajorType {
    pub(crate) const fn from_initial_byte(byte: u8) -> Self {
        match byte >> 5 {
            0 => Self::UInt,
            1 => Self::NInt,
            2 => Self::BStr,
            3 => Self::TStr,
            4 => Self::Array,
            5 => Self::Map,
            6 => Self::Tag,
            _ => Self::Simple,
        }
    }
}

/// Errors surfaced by the codec. Parse errors carry the byte offset of the
/// first inconsistency.
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    /// The input contained no bytes.
    #[error("input is empty")]
    EmptyInput,

    /// The input ended before the current item was complete.
    #[error("buffer too short at offset {0}")]
    BufferTooShort(usize),

    /// Containers nested deeper than [`MAX_DEPTH`].
    #[error("nesting exceeds {MAX_DEPTH} levels at offset {0}")]
    DepthExceeded(usize),

    /// Additional info 28-30, or 31 where an indefinite length is not
    /// permitted.
    #[error("reserved additional info at offset {0}")]
    ReservedAdditionalInfo(usize),

    /// A negative integer whose magnitude does not fit `i64`.
    #[error("negative integer overflow at offset {0}")]
    NintOverflow(usize),

    /// A simple value other than `false`, `true`, or `null`, including all
    /// floating-point shapes.
    #[error("unsupported simple value {value} at offset {offset}")]
    UnsupportedSimple {
        /// The additional info field of the offending header.
        value: u8,
        /// Offset of the offending header byte.
        offset: usize,
    },

    /// An indefinite-length map terminated after a key but before its value.
    #[error("map is missing the value for its final key at offset {0}")]
    NotEnoughEntries(usize),

    /// A text string that is not valid UTF-8.
    #[error("text string is not valid UTF-8 at offset {0}")]
    InvalidUtf8(usize),

    /// The output buffer is too small for the encoded item.
    #[error("output buffer too small: need {need} bytes, have {have}")]
    BufferOverflow {
        /// Bytes required by the encoded item.
        need: usize,
        /// Bytes available in the output buffer.
        have: usize,
    },
}

impl Error {
    /// Byte offset of the first inconsistency, where one applies.
    #[must_use]
    pub const fn offset(&self) -> usize {
        match self {
            Self::EmptyInput | Self::BufferOverflow { .. } => 0,
            Self::BufferTooShort(pos)
            | Self::DepthExceeded(pos)
            | Self::ReservedAdditionalInfo(pos)
            | Self::NintOverflow(pos)
            | Self::NotEnoughEntries(pos)
            | Self::InvalidUtf8(pos) => *pos,
            Self::UnsupportedSimple { offset, .. } => *offset,
        }
    }
}

/// Size of a header whose additional-info value is `addl`: the initial byte
/// plus 0, 1, 2, 4, or 8 big-endian length bytes.
#[must_use]
pub const fn header_size(addl: u64) -> usize {
    if addl < 24 {
        1
    } else if addl <= u8::MAX as u64 {
        2
    } else if addl <= u16::MAX as u64 {
        3
    } else if addl <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Emit the header for `major` with additional-info value `addl`, using the
/// shortest form.
pub(crate) fn write_header(emit: &mut dyn FnMut(u8), major: MajorType, addl: u64) {
    let initial = (major as u8) << 5;
    match header_size(addl) {
        1 => emit(initial | addl as u8),
        2 => {
            emit(initial | 24);
            emit(addl as u8);
        }
        3 => {
            emit(initial | 25);
            for b in (addl as u16).to_be_bytes() {
                emit(b);
            }
        }
        5 => {
            emit(initial | 26);
            for b in (addl as u32).to_be_bytes() {
                emit(b);
            }
        }
        _ => {
            emit(initial | 27);
            for b in addl.to_be_bytes() {
                emit(b);
            }
        }
    }
}
