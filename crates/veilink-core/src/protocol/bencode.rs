// ============================================
// File: crates/veilink-core/src/protocol/bencode.rs
// ============================================
//! # Bencode Codec
//!
//! ## Creation Reason
//! Link frames are serialized with bencode: a small self-describing
//! grammar of integers, byte strings, lists and dictionaries. This module
//! is the only place that knows the grammar.
//!
//! ## Main Functionality
//! - `Value`: Tagged variant over the four bencode types
//! - `Dictionary`: Byte-keyed map that always iterates in wire order
//! - `encode` / `encode_into`: Canonical encoding
//! - `decode` / `decode_from`: Recursive-descent decoding
//!
//! ## Grammar
//! ```text
//! value   := integer | bytes | list | dict
//! integer := 'i' '-'? digits 'e'      (no leading zeros, no -0)
//! bytes   := digits ':' <digits raw bytes>
//! list    := 'l' value* 'e'
//! dict    := 'd' (bytes value)* 'e'   (keys emitted sorted)
//! ```
//!
//! ## Decoding Strategy
//! The decoder pulls one byte at a time from any `std::io::Read`, so it
//! consumes exactly the bytes of one value and leaves the reader
//! positioned right after it. Slices work through `&mut &[u8]`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The encoder must emit dictionary keys in byte order. `Dictionary`
//!   is backed by a `BTreeMap<Vec<u8>, _>`, which gives exactly that
//! - The decoder does NOT check key order on input
//! - Keep the depth and length limits; frames come from untrusted peers
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use std::collections::BTreeMap;
use std::io::Read;

use bytes::{BufMut, BytesMut};

use crate::error::CodecError;

// ============================================
// Constants
// ============================================

/// Largest byte string the decoder accepts.
pub const MAX_BYTES_LEN: usize = 16 * 1024 * 1024;

/// Deepest list/dictionary nesting the decoder accepts.
pub const MAX_DEPTH: usize = 64;

// ============================================
// Value
// ============================================

/// One bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Signed 64-bit integer.
    Integer(i64),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Dictionary keyed by byte strings.
    Dict(Dictionary),
}

impl Value {
    /// Returns the variant name, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Dict(_) => "dictionary",
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the byte string, if this is one.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the byte string as UTF-8 text, if it is valid text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the list, if this is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the dictionary, if this is one.
    #[must_use]
    pub const fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the integer or a `TypeMismatch` error.
    ///
    /// # Errors
    /// Fails if the value is not an integer.
    pub fn try_integer(&self) -> Result<i64, CodecError> {
        self.as_integer().ok_or_else(|| self.mismatch("integer"))
    }

    /// Returns the byte string or a `TypeMismatch` error.
    ///
    /// # Errors
    /// Fails if the value is not a byte string.
    pub fn try_bytes(&self) -> Result<&[u8], CodecError> {
        self.as_bytes().ok_or_else(|| self.mismatch("bytes"))
    }

    /// Returns the byte string as text or a `TypeMismatch` error.
    ///
    /// # Errors
    /// Fails if the value is not a byte string holding UTF-8.
    pub fn try_str(&self) -> Result<&str, CodecError> {
        self.as_str().ok_or_else(|| self.mismatch("utf-8 string"))
    }

    /// Returns the list or a `TypeMismatch` error.
    ///
    /// # Errors
    /// Fails if the value is not a list.
    pub fn try_list(&self) -> Result<&[Value], CodecError> {
        self.as_list().ok_or_else(|| self.mismatch("list"))
    }

    /// Returns the dictionary or a `TypeMismatch` error.
    ///
    /// # Errors
    /// Fails if the value is not a dictionary.
    pub fn try_dict(&self) -> Result<&Dictionary, CodecError> {
        self.as_dict().ok_or_else(|| self.mismatch("dictionary"))
    }

    fn mismatch(&self, expected: &'static str) -> CodecError {
        CodecError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Dictionary> for Value {
    fn from(d: Dictionary) -> Self {
        Self::Dict(d)
    }
}

// ============================================
// Dictionary
// ============================================

/// Bencode dictionary.
///
/// Keys are raw byte strings. Iteration always follows byte-lexicographic
/// key order regardless of insertion order, which is the order the
/// encoder writes.
///
/// # Example
/// ```
/// use veilink_core::protocol::bencode::{encode, Dictionary, Value};
///
/// let mut d = Dictionary::new();
/// d.insert("spam", "eggs");
/// d.insert("cow", "moo");
/// assert_eq!(encode(&Value::Dict(d)), b"d3:cow3:moo4:spam4:eggse");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary(BTreeMap<Vec<u8>, Value>);

impl Dictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a value, returning the previous value for the key.
    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.as_ref().to_vec(), value.into())
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&Value> {
        self.0.get(key.as_ref())
    }

    /// Removes a key.
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Option<Value> {
        self.0.remove(key.as_ref())
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.0.contains_key(key.as_ref())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Value)> {
        self.0.iter().map(|(k, v)| (k.as_slice(), v))
    }
}

impl<K: AsRef<[u8]>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut d = Self::new();
        for (k, v) in iter {
            d.insert(k, v);
        }
        d
    }
}

// ============================================
// Encoding
// ============================================

/// Encodes a value into a fresh byte vector.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

/// Appends the canonical encoding of `value` to `buf`.
pub fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Integer(n) => {
            buf.put_u8(b'i');
            buf.put_slice(n.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        Value::Bytes(b) => put_byte_string(b, buf),
        Value::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        Value::Dict(d) => {
            buf.put_u8(b'd');
            for (key, item) in d.iter() {
                put_byte_string(key, buf);
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_byte_string(bytes: &[u8], buf: &mut BytesMut) {
    buf.reserve(bytes.len() + 8);
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

// ============================================
// Decoding
// ============================================

/// Decodes exactly one value occupying the whole buffer.
///
/// # Errors
/// Returns `CodecError` on any grammar violation, including bytes left
/// over after the value.
pub fn decode(input: &[u8]) -> Result<Value, CodecError> {
    let mut cursor = input;
    let value = decode_from(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: cursor.len(),
        });
    }
    Ok(value)
}

/// Decodes one value from a reader, leaving it positioned after the value.
///
/// # Errors
/// Returns `CodecError` on any grammar violation or reader failure.
pub fn decode_from<R: Read>(reader: &mut R) -> Result<Value, CodecError> {
    Decoder { reader, depth: 0 }.read_value()
}

/// Recursive-descent reader over a byte stream.
struct Decoder<'a, R: Read> {
    reader: &'a mut R,
    depth: usize,
}

impl<R: Read> Decoder<'_, R> {
    fn next_byte(&mut self, context: &'static str) -> Result<u8, CodecError> {
        let mut byte = [0u8; 1];
        self.reader
            .read_exact(&mut byte)
            .map_err(|e| CodecError::from_read(e, context))?;
        Ok(byte[0])
    }

    fn read_value(&mut self) -> Result<Value, CodecError> {
        let tag = self.next_byte("type tag")?;
        self.read_tagged(tag)
    }

    fn read_tagged(&mut self, tag: u8) -> Result<Value, CodecError> {
        match tag {
            b'i' => self.read_integer().map(Value::Integer),
            b'0'..=b'9' => self.read_byte_string(tag).map(Value::Bytes),
            b'l' => self.read_list(),
            b'd' => self.read_dict(),
            other => Err(CodecError::UnexpectedByte {
                byte: other,
                expected: "type tag",
            }),
        }
    }

    /// Reads decimal digits starting with `first` up to `terminator`.
    fn read_number(
        &mut self,
        first: u8,
        terminator: u8,
        field: &'static str,
    ) -> Result<u64, CodecError> {
        if !first.is_ascii_digit() {
            return Err(CodecError::UnexpectedByte {
                byte: first,
                expected: "digit",
            });
        }

        if first == b'0' {
            let next = self.next_byte(field)?;
            if next == terminator {
                return Ok(0);
            }
            if next.is_ascii_digit() {
                return Err(CodecError::LeadingZero { field });
            }
            return Err(CodecError::UnexpectedByte {
                byte: next,
                expected: "terminator",
            });
        }

        let mut value = u64::from(first - b'0');
        loop {
            let byte = self.next_byte(field)?;
            if byte == terminator {
                return Ok(value);
            }
            if !byte.is_ascii_digit() {
                return Err(CodecError::UnexpectedByte {
                    byte,
                    expected: "digit",
                });
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(byte - b'0')))
                .ok_or(CodecError::Overflow { field })?;
        }
    }

    fn read_integer(&mut self) -> Result<i64, CodecError> {
        let mut first = self.next_byte("integer")?;
        let negative = first == b'-';
        if negative {
            first = self.next_byte("integer")?;
        }
        if first == b'e' {
            return Err(CodecError::EmptyInteger);
        }

        let magnitude = self.read_number(first, b'e', "integer")?;
        if !negative {
            return i64::try_from(magnitude).map_err(|_| CodecError::Overflow { field: "integer" });
        }
        if magnitude == 0 {
            return Err(CodecError::NegativeZero);
        }
        // i64::MIN has no positive counterpart
        if magnitude == i64::MIN.unsigned_abs() {
            return Ok(i64::MIN);
        }
        i64::try_from(magnitude)
            .map(|m| -m)
            .map_err(|_| CodecError::Overflow { field: "integer" })
    }

    fn read_byte_string(&mut self, first: u8) -> Result<Vec<u8>, CodecError> {
        let length = self.read_number(first, b':', "length")?;
        let length = usize::try_from(length).map_err(|_| CodecError::Overflow { field: "length" })?;
        if length > MAX_BYTES_LEN {
            return Err(CodecError::LengthTooLarge {
                length,
                max: MAX_BYTES_LEN,
            });
        }

        let mut data = Vec::with_capacity(length.min(4096));
        (&mut *self.reader)
            .take(length as u64)
            .read_to_end(&mut data)
            .map_err(CodecError::Io)?;
        if data.len() < length {
            return Err(CodecError::UnexpectedEof {
                context: "byte string",
            });
        }
        Ok(data)
    }

    fn enter(&mut self) -> Result<(), CodecError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CodecError::NestingTooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn read_list(&mut self) -> Result<Value, CodecError> {
        self.enter()?;
        let mut items = Vec::new();
        loop {
            let tag = self.next_byte("list")?;
            if tag == b'e' {
                break;
            }
            items.push(self.read_tagged(tag)?);
        }
        self.depth -= 1;
        Ok(Value::List(items))
    }

    fn read_dict(&mut self) -> Result<Value, CodecError> {
        self.enter()?;
        let mut dict = Dictionary::new();
        loop {
            let tag = self.next_byte("dictionary")?;
            if tag == b'e' {
                break;
            }
            if !tag.is_ascii_digit() {
                return Err(CodecError::NonStringKey { tag });
            }
            let key = self.read_byte_string(tag)?;
            let value = self.read_value()?;
            dict.insert(key, value);
        }
        self.depth -= 1;
        Ok(Value::Dict(dict))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dict<const N: usize>(entries: [(&str, Value); N]) -> Value {
        Value::Dict(entries.into_iter().collect())
    }

    #[test]
    fn test_decode_examples() {
        assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Vec::new()));
        assert_eq!(decode(b"4:spam").unwrap(), Value::from("spam"));
        assert_eq!(
            decode(b"d3:cow3:moo4:spam4:eggse").unwrap(),
            dict([("cow", Value::from("moo")), ("spam", Value::from("eggs"))])
        );
        assert_eq!(
            decode(b"l4:spam4:eggse").unwrap(),
            Value::List(vec![Value::from("spam"), Value::from("eggs")])
        );
        assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
        assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
    }

    #[test]
    fn test_leading_zero_rejected() {
        assert!(matches!(
            decode(b"i03e"),
            Err(CodecError::LeadingZero { field: "integer" })
        ));
        assert!(matches!(
            decode(b"03:abc"),
            Err(CodecError::LeadingZero { field: "length" })
        ));
        assert!(matches!(decode(b"i-0e"), Err(CodecError::NegativeZero)));
        assert!(matches!(decode(b"ie"), Err(CodecError::EmptyInteger)));
        assert!(matches!(decode(b"i-e"), Err(CodecError::EmptyInteger)));
    }

    #[test]
    fn test_unexpected_bytes() {
        assert!(matches!(
            decode(b"x"),
            Err(CodecError::UnexpectedByte { byte: b'x', .. })
        ));
        assert!(matches!(
            decode(b"i12xe"),
            Err(CodecError::UnexpectedByte { byte: b'x', .. })
        ));
        assert!(matches!(
            decode(b"4xspam"),
            Err(CodecError::UnexpectedByte { byte: b'x', .. })
        ));
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(
            decode(b"5:spam"),
            Err(CodecError::UnexpectedEof { context: "byte string" })
        ));
        assert!(matches!(decode(b"i12"), Err(CodecError::UnexpectedEof { .. })));
        assert!(matches!(decode(b"l4:spam"), Err(CodecError::UnexpectedEof { .. })));
        assert!(matches!(decode(b""), Err(CodecError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_non_string_key() {
        assert!(matches!(
            decode(b"di1e3:fooe"),
            Err(CodecError::NonStringKey { tag: b'i' })
        ));
    }

    #[test]
    fn test_unsorted_input_accepted() {
        let value = decode(b"d4:spam4:eggs3:cow3:mooe").unwrap();
        // re-encoding canonicalizes
        assert_eq!(encode(&value), b"d3:cow3:moo4:spam4:eggse");
    }

    #[test]
    fn test_encode_sorts_nested_keys() {
        let inner = dict([("zeta", Value::Integer(1)), ("alpha", Value::Integer(2))]);
        let outer = dict([("p", inner), ("m", Value::Integer(5))]);
        assert_eq!(encode(&outer), b"d1:mi5e1:pd5:alphai2e4:zetai1eee");
    }

    #[test]
    fn test_round_trip() {
        let value = dict([
            ("int", Value::Integer(i64::MIN)),
            ("max", Value::Integer(i64::MAX)),
            ("raw", Value::Bytes(vec![0, 0xff, b':', b'e'])),
            (
                "list",
                Value::List(vec![
                    Value::Integer(-7),
                    Value::List(Vec::new()),
                    Value::Dict(Dictionary::new()),
                ]),
            ),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_integer_overflow() {
        assert!(matches!(
            decode(b"i9223372036854775808e"),
            Err(CodecError::Overflow { .. })
        ));
        assert_eq!(
            decode(b"i-9223372036854775808e").unwrap(),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_stream_positioning() {
        let mut stream: &[u8] = b"i1e4:spamXYZ";
        assert_eq!(decode_from(&mut stream).unwrap(), Value::Integer(1));
        assert_eq!(decode_from(&mut stream).unwrap(), Value::from("spam"));
        assert_eq!(stream, b"XYZ");
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert!(matches!(
            decode(b"i1ei2e"),
            Err(CodecError::TrailingBytes { count: 3 })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let mut deep = vec![b'l'; MAX_DEPTH + 1];
        deep.extend(vec![b'e'; MAX_DEPTH + 1]);
        assert!(matches!(decode(&deep), Err(CodecError::NestingTooDeep { .. })));

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(vec![b'e'; MAX_DEPTH]);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_oversized_length_rejected() {
        let input = format!("{}:", MAX_BYTES_LEN + 1);
        assert!(matches!(
            decode(input.as_bytes()),
            Err(CodecError::LengthTooLarge { .. })
        ));
    }

    #[test]
    fn test_typed_accessors() {
        let v = Value::from("text");
        assert_eq!(v.try_str().unwrap(), "text");
        assert!(matches!(
            v.try_integer(),
            Err(CodecError::TypeMismatch { expected: "integer", found: "bytes" })
        ));
        assert!(Value::Integer(1).as_dict().is_none());
        assert_eq!(Value::Bytes(vec![0xff]).as_str(), None);
    }
}
