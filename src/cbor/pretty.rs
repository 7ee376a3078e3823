//! Human-readable rendering of CBOR items, loosely following the diagnostic
//! notation of RFC 8949 §8. Not part of the wire contract.

use std::fmt::Write as _;

use super::item::{Item, Map};

/// Renders items as diagnostic text.
///
/// Long byte strings can be truncated and the values of selected map keys
/// elided, which keeps golden-file output stable when a structure embeds
/// signatures or other freshly random material.
#[derive(Clone, Debug)]
pub struct PrettyPrinter {
    max_bstr: usize,
    omit_keys: Vec<String>,
}

impl Default for PrettyPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrettyPrinter {
    /// A printer showing at most 32 bytes per byte string and eliding
    /// nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { max_bstr: 32, omit_keys: Vec::new() }
    }

    /// Show at most `max` bytes of each byte string.
    #[must_use]
    pub const fn truncate_bstr(mut self, max: usize) -> Self {
        self.max_bstr = max;
        self
    }

    /// Replace the value under text key `key` with `"[elided]"` wherever it
    /// appears.
    #[must_use]
    pub fn omit_key(mut self, key: impl Into<String>) -> Self {
        self.omit_keys.push(key.into());
        self
    }

    /// Render `item` as indented diagnostic text.
    #[must_use]
    pub fn print(&self, item: &Item) -> String {
        let mut out = String::new();
        self.item(&mut out, item, 0);
        out
    }

    fn item(&self, out: &mut String, item: &Item, indent: usize) {
        match item {
            Item::UInt(n) => {
                let _ = write!(out, "{n}");
            }
            Item::NInt(n) => {
                let _ = write!(out, "{n}");
            }
            Item::BStr(b) => self.bytes(out, b),
            Item::BStrView(b) => self.bytes(out, b),
            Item::TStr(s) => {
                let _ = write!(out, "{s:?}");
            }
            Item::TStrView(s) => {
                let _ = write!(out, "{s:?}");
            }
            Item::Array(items) => {
                if items.is_empty() {
                    out.push_str("[]");
                    return;
                }
                out.push_str("[\n");
                for (i, child) in items.iter().enumerate() {
                    pad(out, indent + 1);
                    self.item(out, child, indent + 1);
                    if i + 1 < items.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                pad(out, indent);
                out.push(']');
            }
            Item::Map(map) => self.map(out, map, indent),
            Item::Tag(tag, inner) => {
                let _ = write!(out, "{tag}(");
                self.item(out, inner, indent);
                out.push(')');
            }
            Item::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Item::Null => out.push_str("null"),
            Item::Encoded(bytes) => {
                let _ = write!(out, "<<{} encoded bytes>>", bytes.len());
            }
        }
    }

    fn map(&self, out: &mut String, map: &Map, indent: usize) {
        if map.is_empty() {
            out.push_str("{}");
            return;
        }
        out.push_str("{\n");
        for (i, (key, value)) in map.entries().iter().enumerate() {
            pad(out, indent + 1);
            self.item(out, key, indent + 1);
            out.push_str(": ");
            if key.as_str().is_some_and(|k| self.omit_keys.iter().any(|o| o == k)) {
                out.push_str("\"[elided]\"");
            } else {
                self.item(out, value, indent + 1);
            }
            if i + 1 < map.len() {
                out.push(',');
            }
            out.push('\n');
        }
        pad(out, indent);
        out.push('}');
    }

    fn bytes(&self, out: &mut String, bytes: &[u8]) {
        if bytes.len() > self.max_bstr {
            let _ = write!(
                out,
                "h'{}…' ({} bytes)",
                hex::encode(&bytes[..self.max_bstr]),
                bytes.len()
            );
        } else {
            let _ = write!(out, "h'{}'", hex::encode(bytes));
        }
    }
}

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalars() {
        let printer = PrettyPrinter::new();
        assert_eq!(printer.print(&Item::UInt(42)), "42");
        assert_eq!(printer.print(&Item::NInt(-7)), "-7");
        assert_eq!(printer.print(&Item::from("hi")), "\"hi\"");
        assert_eq!(printer.print(&Item::Bool(true)), "true");
        assert_eq!(printer.print(&Item::Null), "null");
        assert_eq!(printer.print(&Item::BStr(vec![0xde, 0xad])), "h'dead'");
        assert_eq!(printer.print(&Item::Tag(24, Box::new(Item::UInt(1)))), "24(1)");
    }

    #[test]
    fn truncates_byte_strings() {
        let printer = PrettyPrinter::new().truncate_bstr(4);
        let rendered = printer.print(&Item::BStr(vec![0xab; 10]));
        assert_eq!(rendered, "h'abababab…' (10 bytes)");
    }

    #[test]
    fn omits_keys() {
        let map: Map = [
            (Item::from("name"), Item::from("value")),
            (Item::from("signature"), Item::BStr(vec![1, 2, 3])),
        ]
        .into_iter()
        .collect();

        let printer = PrettyPrinter::new().omit_key("signature");
        let rendered = printer.print(&Item::Map(map));
        assert!(rendered.contains("\"name\": \"value\""));
        assert!(rendered.contains("\"signature\": \"[elided]\""));
        assert!(!rendered.contains("h'010203'"));
    }

    #[test]
    fn nested_layout() {
        let item = Item::Array(vec![Item::UInt(1), Item::Array(vec![])]);
        assert_eq!(PrettyPrinter::new().print(&item), "[\n  1,\n  []\n]");
    }
}
