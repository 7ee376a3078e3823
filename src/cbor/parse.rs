//! Recursive-descent CBOR parsing, in streaming and tree shapes.

use super::item::{Item, Map};
use super::{ADDL_INDEFINITE, BREAK, Error, MAX_DEPTH, MajorType};

/// Whether parsing continues after a visitor callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep parsing.
    Continue,
    /// Abort the parse at the current position.
    Stop,
}

/// Callbacks invoked by [`parse_stream`] as items complete.
///
/// Items are delivered post-order: leaves arrive through [`Visitor::item`]
/// as they are decoded, containers (arrays, maps, tags) arrive through
/// [`Visitor::item_end`] once all their children have been delivered. The
/// three positions locate the item in the input: `hdr_begin` is the offset
/// of its header byte, `value_begin` the offset just past the header, and
/// `end` the offset past the complete item.
pub trait Visitor<'a> {
    /// A complete non-container item.
    fn item(&mut self, item: &Item<'a>, hdr_begin: usize, value_begin: usize, end: usize) -> Flow {
        let _ = (item, hdr_begin, value_begin, end);
        Flow::Continue
    }

    /// A completed container, with all children already delivered.
    fn item_end(
        &mut self, item: &Item<'a>, hdr_begin: usize, value_begin: usize, end: usize,
    ) -> Flow {
        let _ = (item, hdr_begin, value_begin, end);
        Flow::Continue
    }

    /// A parse error at `pos`. The parse stops after this call.
    fn error(&mut self, pos: usize, error: &Error) {
        let _ = (pos, error);
    }
}

/// Parse the first complete item, producing an owned tree and the byte
/// position just past it.
///
/// # Errors
///
/// Returns a [`Error`] locating the first inconsistency in the input.
pub fn parse(data: &[u8]) -> Result<(Item<'static>, usize), Error> {
    let (item, end) = run(data, false, &mut NulVisitor)?;
    Ok((item.into_owned(), end))
}

/// Parse the first complete item, borrowing byte and text strings from
/// `data` instead of copying them.
///
/// # Errors
///
/// Returns a [`Error`] locating the first inconsistency in the input.
pub fn parse_view(data: &[u8]) -> Result<(Item<'_>, usize), Error> {
    run(data, true, &mut NulVisitor)
}

/// Parse the first complete item, delivering every item to `visitor`.
/// Strings are borrowed from `data`.
///
/// Returns the byte position just past the first complete item, or, when
/// the visitor returned [`Flow::Stop`], the position reached when it did.
///
/// # Errors
///
/// Returns a [`Error`] locating the first inconsistency; the same error is
/// also reported through [`Visitor::error`].
pub fn parse_stream<'a>(
    data: &'a [u8], visitor: &mut dyn Visitor<'a>,
) -> Result<usize, Error> {
    let mut parser = Parser { buf: data, views: true, visitor };
    if data.is_empty() {
        let err = Error::EmptyInput;
        parser.visitor.error(0, &err);
        return Err(err);
    }
    match parser.item(0, 0) {
        Ok((_, end)) => Ok(end),
        Err(Halt::Stopped(pos)) => Ok(pos),
        Err(Halt::Error(err)) => {
            parser.visitor.error(err.offset(), &err);
            Err(err)
        }
    }
}

fn run<'a>(
    data: &'a [u8], views: bool, visitor: &mut dyn Visitor<'a>,
) -> Result<(Item<'a>, usize), Error> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }
    let mut parser = Parser { buf: data, views, visitor };
    match parser.item(0, 0) {
        Ok(done) => Ok(done),
        Err(Halt::Stopped(_)) => unreachable!("the null visitor never stops"),
        Err(Halt::Error(err)) => Err(err),
    }
}

struct NulVisitor;

impl Visitor<'_> for NulVisitor {}

enum Halt {
    Error(Error),
    Stopped(usize),
}

impl From<Error> for Halt {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

struct Header {
    major: MajorType,
    addl: u8,
    value: u64,
    value_begin: usize,
}

struct Parser<'a, 'v> {
    buf: &'a [u8],
    views: bool,
    visitor: &'v mut dyn Visitor<'a>,
}

impl<'a> Parser<'a, '_> {
    fn header(&self, pos: usize) -> Result<Header, Error> {
        let Some(initial) = self.buf.get(pos) else {
            return Err(Error::BufferTooShort(pos));
        };
        let major = MajorType::from_initial_byte(*initial);
        let addl = initial & 0x1f;

        let (value, len) = match addl {
            0..=23 => (u64::from(addl), 0),
            24..=27 => {
                let len = 1usize << (addl - 24);
                let Some(bytes) = self.buf.get(pos + 1..pos + 1 + len) else {
                    return Err(Error::BufferTooShort(pos));
                };
                let mut value = 0u64;
                for b in bytes {
                    value = (value << 8) | u64::from(*b);
                }
                (value, len)
            }
            28..=30 => return Err(Error::ReservedAdditionalInfo(pos)),
            _ => (0, 0),
        };

        Ok(Header { major, addl, value, value_begin: pos + 1 + len })
    }

    fn item(&mut self, pos: usize, depth: usize) -> Result<(Item<'a>, usize), Halt> {
        if depth > MAX_DEPTH {
            return Err(Error::DepthExceeded(pos).into());
        }
        let hdr = self.header(pos)?;

        match hdr.major {
            MajorType::UInt => {
                reject_indefinite(&hdr, pos)?;
                self.leaf(Item::UInt(hdr.value), pos, &hdr, hdr.value_begin)
            }
            MajorType::NInt => {
                reject_indefinite(&hdr, pos)?;
                if hdr.value > i64::MAX as u64 {
                    return Err(Error::NintOverflow(pos).into());
                }
                self.leaf(Item::NInt(-1 - hdr.value as i64), pos, &hdr, hdr.value_begin)
            }
            MajorType::BStr | MajorType::TStr => self.string(pos, &hdr),
            MajorType::Array => self.array(pos, &hdr, depth),
            MajorType::Map => self.map(pos, &hdr, depth),
            MajorType::Tag => {
                reject_indefinite(&hdr, pos)?;
                let (inner, end) = self.item(hdr.value_begin, depth + 1)?;
                let item = Item::Tag(hdr.value, Box::new(inner));
                self.container(item, pos, &hdr, end)
            }
            MajorType::Simple => {
                let item = match hdr.addl {
                    super::SIMPLE_FALSE => Item::Bool(false),
                    super::SIMPLE_TRUE => Item::Bool(true),
                    super::SIMPLE_NULL => Item::Null,
                    // a break byte with no open indefinite container
                    ADDL_INDEFINITE => return Err(Error::ReservedAdditionalInfo(pos).into()),
                    value => {
                        return Err(Error::UnsupportedSimple { value, offset: pos }.into());
                    }
                };
                self.leaf(item, pos, &hdr, pos + 1)
            }
        }
    }

    fn string(&mut self, pos: usize, hdr: &Header) -> Result<(Item<'a>, usize), Halt> {
        reject_indefinite(hdr, pos)?;
        let remaining = (self.buf.len() - hdr.value_begin) as u64;
        if hdr.value > remaining {
            return Err(Error::BufferTooShort(hdr.value_begin).into());
        }
        let end = hdr.value_begin + hdr.value as usize;
        let bytes = &self.buf[hdr.value_begin..end];

        let item = if hdr.major == MajorType::BStr {
            if self.views { Item::BStrView(bytes) } else { Item::BStr(bytes.to_vec()) }
        } else {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| Error::InvalidUtf8(hdr.value_begin))?;
            if self.views { Item::TStrView(text) } else { Item::TStr(text.to_owned()) }
        };
        self.leaf(item, pos, hdr, end)
    }

    fn array(&mut self, pos: usize, hdr: &Header, depth: usize) -> Result<(Item<'a>, usize), Halt> {
        let mut items = vec![];
        let end = if hdr.addl == ADDL_INDEFINITE {
            let mut cur = hdr.value_begin;
            loop {
                match self.buf.get(cur) {
                    None => return Err(Error::BufferTooShort(cur).into()),
                    Some(&BREAK) => break cur + 1,
                    Some(_) => {
                        let (child, next) = self.item(cur, depth + 1)?;
                        items.push(child);
                        cur = next;
                    }
                }
            }
        } else {
            // each element takes at least one byte
            if hdr.value > (self.buf.len() - hdr.value_begin) as u64 {
                return Err(Error::BufferTooShort(pos).into());
            }
            items.reserve(hdr.value as usize);
            let mut cur = hdr.value_begin;
            for _ in 0..hdr.value {
                let (child, next) = self.item(cur, depth + 1)?;
                items.push(child);
                cur = next;
            }
            cur
        };
        self.container(Item::Array(items), pos, hdr, end)
    }

    fn map(&mut self, pos: usize, hdr: &Header, depth: usize) -> Result<(Item<'a>, usize), Halt> {
        let mut entries = vec![];
        let end = if hdr.addl == ADDL_INDEFINITE {
            let mut cur = hdr.value_begin;
            loop {
                match self.buf.get(cur) {
                    None => return Err(Error::BufferTooShort(cur).into()),
                    Some(&BREAK) => break cur + 1,
                    Some(_) => {
                        let (key, after_key) = self.item(cur, depth + 1)?;
                        if self.buf.get(after_key) == Some(&BREAK) {
                            return Err(Error::NotEnoughEntries(after_key).into());
                        }
                        let (value, next) = self.item(after_key, depth + 1)?;
                        entries.push((key, value));
                        cur = next;
                    }
                }
            }
        } else {
            // each entry takes at least two bytes
            if hdr.value > (self.buf.len() - hdr.value_begin) as u64 / 2 {
                return Err(Error::BufferTooShort(pos).into());
            }
            entries.reserve(hdr.value as usize);
            let mut cur = hdr.value_begin;
            for _ in 0..hdr.value {
                let (key, after_key) = self.item(cur, depth + 1)?;
                let (value, next) = self.item(after_key, depth + 1)?;
                entries.push((key, value));
                cur = next;
            }
            cur
        };

        let map = Map { entries, canonical: false };
        self.container(Item::Map(map), pos, hdr, end)
    }

    fn leaf(
        &mut self, item: Item<'a>, pos: usize, hdr: &Header, end: usize,
    ) -> Result<(Item<'a>, usize), Halt> {
        if self.visitor.item(&item, pos, hdr.value_begin, end) == Flow::Stop {
            return Err(Halt::Stopped(end));
        }
        Ok((item, end))
    }

    fn container(
        &mut self, item: Item<'a>, pos: usize, hdr: &Header, end: usize,
    ) -> Result<(Item<'a>, usize), Halt> {
        if self.visitor.item_end(&item, pos, hdr.value_begin, end) == Flow::Stop {
            return Err(Halt::Stopped(end));
        }
        Ok((item, end))
    }
}

fn reject_indefinite(hdr: &Header, pos: usize) -> Result<(), Error> {
    if hdr.addl == ADDL_INDEFINITE {
        return Err(Error::ReservedAdditionalInfo(pos));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(item: &Item<'static>) {
        let encoded = item.encode();
        let (parsed, end) = parse(&encoded).expect("should parse");
        assert_eq!(end, encoded.len());
        assert_eq!(&parsed, item);
        assert_eq!(parsed.encode(), encoded);
    }

    #[test]
    fn roundtrips() {
        roundtrip(&Item::UInt(0));
        roundtrip(&Item::UInt(23));
        roundtrip(&Item::UInt(24));
        roundtrip(&Item::UInt(u64::MAX));
        roundtrip(&Item::NInt(-1));
        roundtrip(&Item::NInt(i64::MIN));
        roundtrip(&Item::BStr(vec![0; 300]));
        roundtrip(&Item::TStr("selective disclosure".into()));
        roundtrip(&Item::Bool(true));
        roundtrip(&Item::Bool(false));
        roundtrip(&Item::Null);
        roundtrip(&Item::Array(vec![]));
        roundtrip(&Item::Tag(
            18,
            Box::new(Item::Array(vec![Item::UInt(1), Item::from("payload")])),
        ));
        roundtrip(&Item::Map(
            [
                (Item::from("a"), Item::UInt(2)),
                (Item::from("bb"), Item::UInt(1)),
            ]
            .into_iter()
            .collect(),
        ));
    }

    #[test]
    fn trailing_bytes_are_left_alone() {
        let (item, end) = parse(&[0x01, 0x02]).unwrap();
        assert_eq!(item, Item::UInt(1));
        assert_eq!(end, 1);
    }

    #[test]
    fn views_borrow_from_input() {
        let data = Item::Array(vec![Item::from("txt"), Item::BStr(vec![1, 2])]).encode();
        let (item, _) = parse_view(&data).unwrap();
        let Item::Array(items) = item else { panic!("expected array") };
        assert_eq!(items[0], Item::TStrView("txt"));
        assert_eq!(items[1], Item::BStrView(&[1, 2]));

        // the owning parse yields owned strings
        let (item, _) = parse(&data).unwrap();
        let Item::Array(items) = item else { panic!("expected array") };
        assert_eq!(items[0], Item::TStr("txt".into()));
    }

    #[test]
    fn indefinite_array() {
        let (item, end) = parse(&[0x9f, 0x01, 0x02, 0xff]).unwrap();
        assert_eq!(item, Item::Array(vec![Item::UInt(1), Item::UInt(2)]));
        assert_eq!(end, 4);

        // re-encoding uses the definite form
        assert_eq!(item.encode(), vec![0x82, 0x01, 0x02]);
    }

    #[test]
    fn indefinite_map() {
        let (item, end) = parse(&[0xbf, 0x61, 0x61, 0x01, 0xff]).unwrap();
        let expected: Map = [(Item::from("a"), Item::UInt(1))].into_iter().collect();
        assert_eq!(item, Item::Map(expected));
        assert_eq!(end, 5);
    }

    #[test]
    fn indefinite_map_missing_value() {
        let err = parse(&[0xbf, 0x61, 0x61, 0xff]).unwrap_err();
        assert_eq!(err, Error::NotEnoughEntries(3));
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse(&[]).unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn truncated_inputs() {
        assert_eq!(parse(&[0x19, 0x03]).unwrap_err(), Error::BufferTooShort(0));
        assert_eq!(parse(&[0x44, 0x01]).unwrap_err(), Error::BufferTooShort(1));
        assert_eq!(parse(&[0x82, 0x01]).unwrap_err(), Error::BufferTooShort(0));
        assert_eq!(parse(&[0x9f, 0x01]).unwrap_err(), Error::BufferTooShort(2));
    }

    #[test]
    fn reserved_additional_info() {
        assert_eq!(parse(&[0x1c]).unwrap_err(), Error::ReservedAdditionalInfo(0));
        // indefinite-length strings are not accepted
        assert_eq!(parse(&[0x5f, 0xff]).unwrap_err(), Error::ReservedAdditionalInfo(0));
        assert_eq!(parse(&[0x7f, 0xff]).unwrap_err(), Error::ReservedAdditionalInfo(0));
        // a stray break byte
        assert_eq!(parse(&[0xff]).unwrap_err(), Error::ReservedAdditionalInfo(0));
    }

    #[test]
    fn nint_overflow() {
        // -1 - 2^63 does not fit an i64
        let mut data = vec![0x3b, 0x80, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(parse(&data).unwrap_err(), Error::NintOverflow(0));

        // -1 - (2^63 - 1) == i64::MIN just fits
        data[1] = 0x7f;
        data[2..].fill(0xff);
        assert_eq!(parse(&data).unwrap().0, Item::NInt(i64::MIN));
    }

    #[test]
    fn unsupported_simple_values() {
        // simple value 23 (undefined)
        assert_eq!(
            parse(&[0xf7]).unwrap_err(),
            Error::UnsupportedSimple { value: 23, offset: 0 }
        );
        // half-precision float
        assert_eq!(
            parse(&[0xf9, 0x3c, 0x00]).unwrap_err(),
            Error::UnsupportedSimple { value: 25, offset: 0 }
        );
        // one-byte simple value
        assert_eq!(
            parse(&[0xf8, 0x20]).unwrap_err(),
            Error::UnsupportedSimple { value: 24, offset: 0 }
        );
    }

    #[test]
    fn invalid_utf8() {
        assert_eq!(parse(&[0x62, 0xff, 0xfe]).unwrap_err(), Error::InvalidUtf8(1));
    }

    #[test]
    fn depth_limit() {
        let mut data = vec![0x81; MAX_DEPTH];
        data.push(0x01);
        assert!(parse(&data).is_ok());

        let mut data = vec![0x81; MAX_DEPTH + 1];
        data.push(0x01);
        assert_eq!(parse(&data).unwrap_err(), Error::DepthExceeded(MAX_DEPTH + 1));
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<(String, usize, usize, usize)>,
        stop_after: Option<usize>,
    }

    impl<'a> Visitor<'a> for Recorder {
        fn item(&mut self, item: &Item<'a>, hdr: usize, value: usize, end: usize) -> Flow {
            self.events.push((format!("{item:?}"), hdr, value, end));
            if self.stop_after == Some(self.events.len()) { Flow::Stop } else { Flow::Continue }
        }

        fn item_end(&mut self, item: &Item<'a>, hdr: usize, value: usize, end: usize) -> Flow {
            self.events.push((format!("end {:?}", item.major_type()), hdr, value, end));
            Flow::Continue
        }
    }

    #[test]
    fn visitor_sees_post_order() {
        // {"a": [1]}
        let data = [0xa1, 0x61, 0x61, 0x81, 0x01];
        let mut visitor = Recorder::default();
        let end = parse_stream(&data, &mut visitor).unwrap();
        assert_eq!(end, data.len());

        let kinds: Vec<&str> = visitor.events.iter().map(|(k, ..)| k.as_str()).collect();
        assert_eq!(kinds, vec![
            "TStrView(\"a\")",
            "UInt(1)",
            "end Array",
            "end Map",
        ]);
        // positions of the inner array: header at 3, value at 4, end at 5
        assert_eq!(visitor.events[2].1, 3);
        assert_eq!(visitor.events[2].2, 4);
        assert_eq!(visitor.events[2].3, 5);
    }

    #[test]
    fn visitor_can_abort() {
        let data = Item::Array(vec![Item::UInt(1), Item::UInt(2), Item::UInt(3)]).encode();
        let mut visitor = Recorder { stop_after: Some(1), ..Recorder::default() };
        let pos = parse_stream(&data, &mut visitor).unwrap();
        assert_eq!(visitor.events.len(), 1);
        assert_eq!(pos, 2);
    }

    #[test]
    fn visitor_observes_errors() {
        #[derive(Default)]
        struct Failures(Vec<usize>);
        impl Visitor<'_> for Failures {
            fn error(&mut self, pos: usize, _: &Error) {
                self.0.push(pos);
            }
        }

        let mut visitor = Failures::default();
        let err = parse_stream(&[0x82, 0x01], &mut visitor).unwrap_err();
        assert_eq!(err, Error::BufferTooShort(0));
        assert_eq!(visitor.0, vec![0]);
    }
}
