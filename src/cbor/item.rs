//! The CBOR data item model and encoder.

use std::cmp::Ordering;

use super::{
    Error, MajorType, SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE, header_size, write_header,
};

/// A single CBOR data item.
///
/// Byte and text strings come in an owned and a borrowed-view flavour. Views
/// are produced by [`parse_view`](super::parse_view) and point into the
/// buffer being parsed; they must not outlive it. An owned string and a view
/// never compare equal, even with identical contents, so that ownership
/// transitions stay visible to callers.
///
/// [`Item::Encoded`] carries an opaque, already-encoded fragment. It takes
/// part in encoding (the bytes are spliced in verbatim) and in equality (raw
/// byte comparison) but nothing else.
#[derive(Clone, Debug)]
pub enum Item<'a> {
    /// Unsigned integer (major type 0).
    UInt(u64),
    /// Negative integer (major type 1). The value is strictly negative.
    NInt(i64),
    /// Owned byte string (major type 2).
    BStr(Vec<u8>),
    /// Borrowed byte string pointing into a parse buffer.
    BStrView(&'a [u8]),
    /// Owned text string (major type 3).
    TStr(String),
    /// Borrowed text string pointing into a parse buffer.
    TStrView(&'a str),
    /// Array of items (major type 4).
    Array(Vec<Item<'a>>),
    /// Map of key/value pairs (major type 5).
    Map(Map<'a>),
    /// Semantic tag wrapping one item (major type 6). Nested tags chain.
    Tag(u64, Box<Item<'a>>),
    /// Simple values 20 and 21.
    Bool(bool),
    /// Simple value 22.
    Null,
    /// A pre-encoded fragment, spliced into the output verbatim.
    Encoded(Vec<u8>),
}

impl<'a> Item<'a> {
    /// The item's major type. Tags are transparent: a tagged item reports
    /// the major type of the innermost non-tag item. An [`Item::Encoded`]
    /// reports the major type of its first byte.
    #[must_use]
    pub fn major_type(&self) -> MajorType {
        match self {
            Self::UInt(_) => MajorType::UInt,
            Self::NInt(_) => MajorType::NInt,
            Self::BStr(_) | Self::BStrView(_) => MajorType::BStr,
            Self::TStr(_) | Self::TStrView(_) => MajorType::TStr,
            Self::Array(_) => MajorType::Array,
            Self::Map(_) => MajorType::Map,
            Self::Tag(_, inner) => inner.major_type(),
            Self::Bool(_) | Self::Null => MajorType::Simple,
            Self::Encoded(bytes) => bytes
                .first()
                .map_or(MajorType::Simple, |b| MajorType::from_initial_byte(*b)),
        }
    }

    /// Number of semantic tags wrapping this item.
    #[must_use]
    pub fn semantic_tag_count(&self) -> usize {
        match self {
            Self::Tag(_, inner) => 1 + inner.semantic_tag_count(),
            _ => 0,
        }
    }

    /// The `n`-th semantic tag on this item. The innermost tag is index 0;
    /// the outermost is index `semantic_tag_count() - 1`.
    #[must_use]
    pub fn semantic_tag(&self, n: usize) -> Option<u64> {
        let Self::Tag(tag, inner) = self else {
            return None;
        };
        let inner_count = inner.semantic_tag_count();
        match n.cmp(&inner_count) {
            Ordering::Equal => Some(*tag),
            Ordering::Less => inner.semantic_tag(n),
            Ordering::Greater => None,
        }
    }

    /// Strip all semantic tags, yielding the innermost item.
    #[must_use]
    pub fn untag(&self) -> &Self {
        match self {
            Self::Tag(_, inner) => inner.untag(),
            other => other,
        }
    }

    /// The value as `u64` if the item is an unsigned integer.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as `i64` if the item is an integer in range.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::UInt(n) if *n <= i64::MAX as u64 => Some(*n as i64),
            Self::NInt(n) => Some(*n),
            _ => None,
        }
    }

    /// The contents of an owned or borrowed byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::BStr(b) => Some(b),
            Self::BStrView(b) => Some(b),
            _ => None,
        }
    }

    /// The contents of an owned or borrowed text string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::TStr(s) => Some(s),
            Self::TStrView(s) => Some(s),
            _ => None,
        }
    }

    /// The elements of an array item.
    #[must_use]
    pub const fn as_array(&self) -> Option<&Vec<Item<'a>>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The map behind a map item.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map<'a>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The value of a boolean item.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the item is `null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The exact number of bytes [`Item::encode`] will produce.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::UInt(n) => header_size(*n),
            Self::NInt(n) => header_size(nint_raw(*n)),
            Self::BStr(b) => header_size(b.len() as u64) + b.len(),
            Self::BStrView(b) => header_size(b.len() as u64) + b.len(),
            Self::TStr(s) => header_size(s.len() as u64) + s.len(),
            Self::TStrView(s) => header_size(s.len() as u64) + s.len(),
            Self::Array(items) => {
                header_size(items.len() as u64)
                    + items.iter().map(Self::encoded_size).sum::<usize>()
            }
            Self::Map(map) => {
                header_size(map.len() as u64)
                    + map
                        .entries()
                        .iter()
                        .map(|(k, v)| k.encoded_size() + v.encoded_size())
                        .sum::<usize>()
            }
            Self::Tag(tag, inner) => header_size(*tag) + inner.encoded_size(),
            Self::Bool(_) | Self::Null => 1,
            Self::Encoded(bytes) => bytes.len(),
        }
    }

    /// Encode the item, feeding each output byte to `emit`.
    pub fn encode_stream(&self, emit: &mut dyn FnMut(u8)) {
        match self {
            Self::UInt(n) => write_header(emit, MajorType::UInt, *n),
            Self::NInt(n) => write_header(emit, MajorType::NInt, nint_raw(*n)),
            Self::BStr(b) => encode_bytes(emit, MajorType::BStr, b),
            Self::BStrView(b) => encode_bytes(emit, MajorType::BStr, b),
            Self::TStr(s) => encode_bytes(emit, MajorType::TStr, s.as_bytes()),
            Self::TStrView(s) => encode_bytes(emit, MajorType::TStr, s.as_bytes()),
            Self::Array(items) => {
                write_header(emit, MajorType::Array, items.len() as u64);
                for item in items {
                    item.encode_stream(emit);
                }
            }
            Self::Map(map) => {
                write_header(emit, MajorType::Map, map.len() as u64);
                for (key, value) in map.entries() {
                    key.encode_stream(emit);
                    value.encode_stream(emit);
                }
            }
            Self::Tag(tag, inner) => {
                write_header(emit, MajorType::Tag, *tag);
                inner.encode_stream(emit);
            }
            Self::Bool(b) => emit(((MajorType::Simple as u8) << 5) | if *b { SIMPLE_TRUE } else { SIMPLE_FALSE }),
            Self::Null => emit(((MajorType::Simple as u8) << 5) | SIMPLE_NULL),
            Self::Encoded(bytes) => {
                for b in bytes {
                    emit(*b);
                }
            }
        }
    }

    /// Encode the item into a new buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        self.encode_stream(&mut |b| out.push(b));
        out
    }

    /// Encode the item into the front of `buf`, returning the number of
    /// bytes written. When `buf` is too small nothing at all is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferOverflow`] if the encoded item does not fit.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let need = self.encoded_size();
        if need > buf.len() {
            return Err(Error::BufferOverflow { need, have: buf.len() });
        }
        let mut pos = 0;
        self.encode_stream(&mut |b| {
            buf[pos] = b;
            pos += 1;
        });
        Ok(pos)
    }

    /// Convert borrowed views into owned strings, releasing the backing
    /// buffer.
    #[must_use]
    pub fn into_owned(self) -> Item<'static> {
        match self {
            Self::UInt(n) => Item::UInt(n),
            Self::NInt(n) => Item::NInt(n),
            Self::BStr(b) => Item::BStr(b),
            Self::BStrView(b) => Item::BStr(b.to_vec()),
            Self::TStr(s) => Item::TStr(s),
            Self::TStrView(s) => Item::TStr(s.to_owned()),
            Self::Array(items) => Item::Array(items.into_iter().map(Self::into_owned).collect()),
            Self::Map(map) => {
                let canonical = map.canonical;
                Item::Map(Map {
                    entries: map
                        .entries
                        .into_iter()
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect(),
                    canonical,
                })
            }
            Self::Tag(tag, inner) => Item::Tag(tag, Box::new(inner.into_owned())),
            Self::Bool(b) => Item::Bool(b),
            Self::Null => Item::Null,
            Self::Encoded(bytes) => Item::Encoded(bytes),
        }
    }

    // Canonicalize every map nested below this item, in place.
    fn canonicalize_nested(&mut self) {
        match self {
            Self::Map(map) => map.canonicalize(true),
            Self::Array(items) => {
                for item in items {
                    item.canonicalize_nested();
                }
            }
            Self::Tag(_, inner) => inner.canonicalize_nested(),
            _ => {}
        }
    }
}

/// Total order on map keys: shorter encoding first, lexicographic bytes for
/// equal lengths.
#[must_use]
pub(crate) fn key_cmp(a: &Item, b: &Item) -> Ordering {
    let (size_a, size_b) = (a.encoded_size(), b.encoded_size());
    match size_a.cmp(&size_b) {
        Ordering::Equal => a.encode().cmp(&b.encode()),
        other => other,
    }
}

// NINT carries -1 - n on the wire; `value` is strictly negative.
const fn nint_raw(value: i64) -> u64 {
    (-1 - value) as u64
}

fn encode_bytes(emit: &mut dyn FnMut(u8), major: MajorType, bytes: &[u8]) {
    write_header(emit, major, bytes.len() as u64);
    for b in bytes {
        emit(*b);
    }
}

impl PartialEq for Item<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::NInt(a), Self::NInt(b)) => a == b,
            (Self::BStr(a), Self::BStr(b)) => a == b,
            (Self::BStrView(a), Self::BStrView(b)) => a == b,
            (Self::TStr(a), Self::TStr(b)) => a == b,
            (Self::TStrView(a), Self::TStrView(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Tag(ta, ia), Self::Tag(tb, ib)) => ta == tb && ia == ib,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Null, Self::Null) => true,
            (Self::Encoded(a), Self::Encoded(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Item<'_> {}

impl From<u64> for Item<'_> {
    fn from(n: u64) -> Self {
        Self::UInt(n)
    }
}

impl From<i64> for Item<'_> {
    fn from(n: i64) -> Self {
        if n < 0 { Self::NInt(n) } else { Self::UInt(n as u64) }
    }
}

impl From<&str> for Item<'_> {
    fn from(s: &str) -> Self {
        Self::TStr(s.to_owned())
    }
}

impl From<String> for Item<'_> {
    fn from(s: String) -> Self {
        Self::TStr(s)
    }
}

impl From<Vec<u8>> for Item<'_> {
    fn from(b: Vec<u8>) -> Self {
        Self::BStr(b)
    }
}

impl From<bool> for Item<'_> {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<'a> From<Vec<Item<'a>>> for Item<'a> {
    fn from(items: Vec<Item<'a>>) -> Self {
        Self::Array(items)
    }
}

impl<'a> From<Map<'a>> for Item<'a> {
    fn from(map: Map<'a>) -> Self {
        Self::Map(map)
    }
}

/// An ordered CBOR map.
///
/// Entries keep their insertion (or wire) order until
/// [`canonicalize`](Self::canonicalize) sorts them. The codec does not
/// enforce key uniqueness. Lookup compares keys by canonical encoding, so an
/// owned key finds an entry stored under an equivalent view key.
#[derive(Clone, Debug, Default)]
pub struct Map<'a> {
    pub(crate) entries: Vec<(Item<'a>, Item<'a>)>,
    pub(crate) canonical: bool,
}

impl<'a> Map<'a> {
    /// An empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new(), canonical: false }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the entries are currently in canonical order.
    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Append an entry, clearing the canonical flag.
    pub fn push(&mut self, key: impl Into<Item<'a>>, value: impl Into<Item<'a>>) {
        self.canonical = false;
        self.entries.push((key.into(), value.into()));
    }

    /// The entries in their current order.
    #[must_use]
    pub fn entries(&self) -> &[(Item<'a>, Item<'a>)] {
        &self.entries
    }

    /// Mutable access to the entries. Clears the canonical flag: the caller
    /// may reorder or rewrite keys.
    pub fn entries_mut(&mut self) -> &mut Vec<(Item<'a>, Item<'a>)> {
        self.canonical = false;
        &mut self.entries
    }

    /// Look up a value by key. Binary search when the map is canonical,
    /// linear scan otherwise. Keys match when their encodings match.
    #[must_use]
    pub fn get(&self, key: &Item) -> Option<&Item<'a>> {
        if self.canonical {
            self.entries
                .binary_search_by(|(k, _)| key_cmp(k, key))
                .ok()
                .map(|idx| &self.entries[idx].1)
        } else {
            self.entries
                .iter()
                .find(|(k, _)| key_cmp(k, key) == Ordering::Equal)
                .map(|(_, v)| v)
        }
    }

    /// Sort entries into canonical order: shorter encoded key first,
    /// lexicographic bytes for equal lengths. With `recurse`, maps nested in
    /// keys and values are canonicalized first.
    pub fn canonicalize(&mut self, recurse: bool) {
        if recurse {
            for (key, value) in &mut self.entries {
                key.canonicalize_nested();
                value.canonicalize_nested();
            }
        }
        self.entries.sort_by(|(a, _), (b, _)| key_cmp(a, b));
        self.canonical = true;
    }
}

impl PartialEq for Map<'_> {
    // Entry order matters; the canonical flag does not.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Map<'_> {}

impl<'a> FromIterator<(Item<'a>, Item<'a>)> for Map<'a> {
    fn from_iter<T: IntoIterator<Item = (Item<'a>, Item<'a>)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect(), canonical: false }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uint_encoding() {
        assert_eq!(Item::UInt(10).encode(), vec![0x0a]);
        assert_eq!(Item::UInt(100).encode(), vec![0x18, 0x64]);
        assert_eq!(Item::UInt(1000).encode(), vec![0x19, 0x03, 0xe8]);
    }

    #[test]
    fn nint_encoding() {
        assert_eq!(Item::NInt(-1).encode(), vec![0x20]);
        assert_eq!(Item::NInt(-10).encode(), vec![0x29]);
        assert_eq!(Item::NInt(-100).encode(), vec![0x38, 0x63]);
        assert_eq!(Item::NInt(-1000).encode(), vec![0x39, 0x03, 0xe7]);
    }

    #[test]
    fn string_encoding() {
        assert_eq!(Item::from("IETF").encode(), vec![0x64, 0x49, 0x45, 0x54, 0x46]);
        assert_eq!(Item::BStr(vec![1, 2, 3, 4]).encode(), vec![0x44, 1, 2, 3, 4]);
        assert_eq!(Item::TStrView("a").encode(), vec![0x61, 0x61]);
    }

    #[test]
    fn simple_encoding() {
        assert_eq!(Item::Bool(false).encode(), vec![0xf4]);
        assert_eq!(Item::Bool(true).encode(), vec![0xf5]);
        assert_eq!(Item::Null.encode(), vec![0xf6]);
    }

    #[test]
    fn encoded_size_matches_encode() {
        let item = Item::Array(vec![
            Item::UInt(1),
            Item::NInt(-500),
            Item::from("hello"),
            Item::BStr(vec![0; 300]),
            Item::Tag(24, Box::new(Item::BStr(vec![0xa0]))),
            Item::Map([(Item::from("k"), Item::Bool(true))].into_iter().collect()),
        ]);
        assert_eq!(item.encoded_size(), item.encode().len());
    }

    #[test]
    fn encode_into_rejects_short_buffer() {
        let item = Item::from("hello");
        let mut buf = [0u8; 3];
        let err = item.encode_into(&mut buf).unwrap_err();
        assert_eq!(err, Error::BufferOverflow { need: 6, have: 3 });
        // nothing written
        assert_eq!(buf, [0u8; 3]);

        let mut buf = [0u8; 6];
        assert_eq!(item.encode_into(&mut buf).unwrap(), 6);
        assert_eq!(&buf, &[0x65, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn canonical_order() {
        let mut map = Map::new();
        map.push("bb", Item::UInt(1));
        map.push("a", Item::UInt(2));
        assert!(!map.is_canonical());

        map.canonicalize(false);
        assert!(map.is_canonical());
        assert_eq!(map.entries()[0].0, Item::from("a"));
        assert_eq!(map.entries()[1].0, Item::from("bb"));
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let mut map: Map = [
            (Item::from("zz"), Item::UInt(0)),
            (Item::from("b"), Item::UInt(1)),
            (Item::UInt(10), Item::UInt(2)),
            (Item::from("a"), Item::UInt(3)),
        ]
        .into_iter()
        .collect();

        map.canonicalize(false);
        let once = map.clone();
        map.canonicalize(false);
        assert_eq!(map, once);

        // strictly increasing keys
        for pair in map.entries().windows(2) {
            assert_eq!(key_cmp(&pair[0].0, &pair[1].0), Ordering::Less);
        }
    }

    #[test]
    fn canonicalize_recurses() {
        let mut inner = Map::new();
        inner.push("dd", Item::UInt(1));
        inner.push("c", Item::UInt(2));

        let mut outer = Map::new();
        outer.push("x", Item::Map(inner));
        outer.canonicalize(true);

        let Some(Item::Map(inner)) = outer.get(&Item::from("x")) else {
            panic!("inner map missing");
        };
        assert!(inner.is_canonical());
        assert_eq!(inner.entries()[0].0, Item::from("c"));
    }

    #[test]
    fn mutation_clears_canonical_flag() {
        let mut map: Map = [(Item::from("a"), Item::UInt(1))].into_iter().collect();
        map.canonicalize(false);
        assert!(map.is_canonical());

        let _ = map.entries_mut();
        assert!(!map.is_canonical());

        map.canonicalize(false);
        map.push("b", Item::UInt(2));
        assert!(!map.is_canonical());
    }

    #[test]
    fn canonical_lookup() {
        let mut map = Map::new();
        for key in ["one", "two", "three", "four", "aa"] {
            map.push(key, Item::from(key.to_uppercase()));
        }
        map.canonicalize(false);

        assert_eq!(map.get(&Item::from("three")), Some(&Item::from("THREE")));
        assert_eq!(map.get(&Item::from("missing")), None);
    }

    #[test]
    fn view_and_owned_are_distinct() {
        assert_ne!(Item::BStr(vec![1, 2]), Item::BStrView(&[1, 2]));
        assert_ne!(Item::TStr("a".into()), Item::TStrView("a"));
        assert_eq!(Item::BStrView(&[1, 2]), Item::BStrView(&[1, 2]));
        assert_eq!(Item::TStr("a".into()), Item::TStr("a".into()));
    }

    #[test]
    fn tag_chain() {
        let item = Item::Tag(998, Box::new(Item::Tag(997, Box::new(Item::UInt(42)))));
        assert_eq!(item.major_type(), MajorType::UInt);
        assert_eq!(item.semantic_tag_count(), 2);
        assert_eq!(item.semantic_tag(0), Some(997));
        assert_eq!(item.semantic_tag(1), Some(998));
        assert_eq!(item.semantic_tag(2), None);
        assert_eq!(item.untag(), &Item::UInt(42));
    }

    #[test]
    fn encoded_fragment() {
        let raw = Item::UInt(1000).encode();
        let item = Item::Encoded(raw.clone());
        assert_eq!(item.encode(), raw);
        assert_eq!(item.encoded_size(), raw.len());
        assert_eq!(item.major_type(), MajorType::UInt);
        assert_eq!(item, Item::Encoded(raw));
        assert_ne!(Item::Encoded(Item::UInt(1).encode()), Item::UInt(1));
    }
}
