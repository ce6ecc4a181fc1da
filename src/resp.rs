//! RESP codec.
//!
//! Converts between wire bytes and [`RespValue`]s.
//!
//! ## Wire Format
//! ```text
//! +OK\r\n                      simple string
//! -ERR message\r\n             error
//! :42\r\n                      integer (digits only, no sign on decode)
//! $5\r\nhello\r\n              bulk string
//! *2\r\n$3\r\nGET\r\n$1\r\nk\r\n  array
//! ```
//!
//! Decoding never panics on short input: a buffer that stops in the middle of
//! a value yields [`EngineError::Incomplete`], anything that can never become
//! valid RESP yields [`EngineError::Protocol`].
//!
//! Strings are UTF-8 text. A simple or bulk string carrying bytes that are not
//! valid UTF-8 is rejected with [`EngineError::Protocol`], so keys and values
//! are binary-safe only within UTF-8.
//!
//! Arrays may nest at most [`MAX_NESTING_DEPTH`] levels and a bulk string or
//! array may announce at most [`MAX_FRAME_LEN`] bytes or elements; anything
//! larger is a protocol error rather than a reason to keep buffering.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EngineError, EngineResult};

/// Literal reply for a successful write.
pub const OK: &[u8] = b"+OK\r\n";

/// Literal reply for a command queued inside MULTI.
pub const QUEUED: &[u8] = b"+QUEUED\r\n";

/// Literal reply for a missing key under GET.
pub const NIL: &[u8] = b"+nil\r\n";

/// Deepest array nesting accepted on decode.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Largest bulk string length or array count accepted on decode.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

/// A decoded protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Simple or bulk string; both decode to text.
    Text(String),
    /// Integer reply.
    Integer(i64),
    /// Error reply, without the leading `-`.
    Error(String),
    /// Array of nested values.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Borrow the text if this value is a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RespValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode the first value in `data`.
///
/// Fails with [`EngineError::NoData`] on an empty buffer.
pub fn decode(data: &[u8]) -> EngineResult<RespValue> {
    if data.is_empty() {
        return Err(EngineError::NoData);
    }
    let (value, _) = decode_one(data)?;
    Ok(value)
}

/// Decode one value and report how many bytes it occupied.
pub fn decode_one(data: &[u8]) -> EngineResult<(RespValue, usize)> {
    decode_nested(data, 0)
}

fn decode_nested(data: &[u8], depth: usize) -> EngineResult<(RespValue, usize)> {
    let Some(&marker) = data.first() else {
        return Err(EngineError::NoData);
    };
    if depth > MAX_NESTING_DEPTH {
        return Err(EngineError::Protocol(format!(
            "arrays nested deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }

    match marker {
        b'+' => read_simple_string(data).map(|(s, n)| (RespValue::Text(s), n)),
        b'-' => read_error(data).map(|(s, n)| (RespValue::Error(s), n)),
        b':' => read_int64(data).map(|(v, n)| (RespValue::Integer(v), n)),
        b'$' => read_bulk_string(data).map(|(s, n)| (RespValue::Text(s), n)),
        b'*' => read_array(data, depth).map(|(v, n)| (RespValue::Array(v), n)),
        other => Err(EngineError::Protocol(format!(
            "unexpected marker byte 0x{:02x}",
            other
        ))),
    }
}

/// Values decoded from the front of a buffer, up to the first bad frame.
#[derive(Debug, Default)]
pub struct DecodedPrefix {
    /// Every complete value before the first malformed frame.
    pub values: Vec<RespValue>,
    /// Bytes occupied by `values`.
    pub consumed: usize,
    /// The malformed frame that stopped decoding, if any.
    pub error: Option<EngineError>,
}

/// Decode complete values from the front of `data` until the buffer runs
/// out, a partial value is reached, or a frame turns out to be malformed.
///
/// Values decoded before a malformed frame are kept.
pub fn decode_prefix(data: &[u8]) -> DecodedPrefix {
    let mut prefix = DecodedPrefix::default();
    while prefix.consumed < data.len() {
        match decode_one(&data[prefix.consumed..]) {
            Ok((value, consumed)) => {
                prefix.values.push(value);
                prefix.consumed += consumed;
            }
            Err(EngineError::Incomplete) => break,
            Err(e) => {
                prefix.error = Some(e);
                break;
            }
        }
    }
    prefix
}

/// Decode every complete value at the front of `data`.
///
/// Returns the values and the number of bytes they occupied. A trailing
/// partial value is not an error; it is left unconsumed for the next read.
/// A malformed frame anywhere fails the whole call.
pub fn decode_all(data: &[u8]) -> EngineResult<(Vec<RespValue>, usize)> {
    if data.is_empty() {
        return Err(EngineError::NoData);
    }

    let prefix = decode_prefix(data);
    match prefix.error {
        Some(e) => Err(e),
        None => Ok((prefix.values, prefix.consumed)),
    }
}

/// Decode a single array whose elements are all text, i.e. one command line.
pub fn decode_array_string(data: &[u8]) -> EngineResult<Vec<String>> {
    let value = decode(data)?;
    to_array_string(value)
}

/// Convert an already decoded array of text into its tokens.
pub fn to_array_string(value: RespValue) -> EngineResult<Vec<String>> {
    match value {
        RespValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Text(s) => Ok(s),
                other => Err(EngineError::Protocol(format!(
                    "expected bulk string in command, got {:?}",
                    other
                ))),
            })
            .collect(),
        other => Err(EngineError::Protocol(format!(
            "expected array, got {:?}",
            other
        ))),
    }
}

/// Read up to the first `\r\n` after the marker byte.
fn read_line(data: &[u8]) -> EngineResult<(&[u8], usize)> {
    let Some(cr) = data.iter().skip(1).position(|&b| b == b'\r').map(|p| p + 1) else {
        return Err(EngineError::Incomplete);
    };
    match data.get(cr + 1) {
        None => Err(EngineError::Incomplete),
        Some(b'\n') => Ok((&data[1..cr], cr + 2)),
        Some(_) => Err(EngineError::Protocol("expected '\\n' after '\\r'".to_string())),
    }
}

fn utf8(bytes: &[u8]) -> EngineResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| EngineError::Protocol("invalid UTF-8 in string".to_string()))
}

fn read_simple_string(data: &[u8]) -> EngineResult<(String, usize)> {
    let (line, consumed) = read_line(data)?;
    Ok((utf8(line)?, consumed))
}

fn read_error(data: &[u8]) -> EngineResult<(String, usize)> {
    read_simple_string(data)
}

fn read_int64(data: &[u8]) -> EngineResult<(i64, usize)> {
    let (line, consumed) = read_line(data)?;
    if line.is_empty() {
        return Err(EngineError::Protocol("empty integer".to_string()));
    }

    let mut value: i64 = 0;
    for &b in line {
        if !b.is_ascii_digit() {
            return Err(EngineError::Protocol("invalid integer".to_string()));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or_else(|| EngineError::Protocol("integer overflow".to_string()))?;
    }
    Ok((value, consumed))
}

/// Read the decimal length that follows a `$` or `*` marker.
///
/// `data` starts right after the marker. The consumed count is the digits
/// plus the two terminator bytes.
fn read_length(data: &[u8]) -> EngineResult<(usize, usize)> {
    let digits = data.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == data.len() {
        return Err(EngineError::Incomplete);
    }
    if digits == 0 {
        return Err(EngineError::Protocol("invalid length".to_string()));
    }

    let mut length: usize = 0;
    for &b in &data[..digits] {
        length = length
            .checked_mul(10)
            .and_then(|v| v.checked_add(usize::from(b - b'0')))
            .ok_or_else(|| EngineError::Protocol("length overflow".to_string()))?;
    }

    if length > MAX_FRAME_LEN {
        return Err(EngineError::Protocol(format!(
            "length {} exceeds {}",
            length, MAX_FRAME_LEN
        )));
    }

    expect_crlf(&data[digits..])?;
    Ok((length, digits + 2))
}

fn expect_crlf(data: &[u8]) -> EngineResult<()> {
    if data.len() < 2 {
        if CRLF.starts_with(data) {
            return Err(EngineError::Incomplete);
        }
        return Err(EngineError::Protocol("expected CRLF".to_string()));
    }
    if &data[..2] != CRLF {
        return Err(EngineError::Protocol("expected CRLF".to_string()));
    }
    Ok(())
}

fn read_bulk_string(data: &[u8]) -> EngineResult<(String, usize)> {
    let mut pos = 1;
    let (len, delta) = read_length(&data[pos..])?;
    pos += delta;

    let end = pos
        .checked_add(len)
        .ok_or_else(|| EngineError::Protocol("length overflow".to_string()))?;
    if data.len() < end {
        return Err(EngineError::Incomplete);
    }
    expect_crlf(&data[end..])?;

    Ok((utf8(&data[pos..end])?, end + 2))
}

fn read_array(data: &[u8], depth: usize) -> EngineResult<(Vec<RespValue>, usize)> {
    let mut pos = 1;
    let (count, delta) = read_length(&data[pos..])?;
    pos += delta;

    // The count comes off the wire, so do not trust it for the allocation.
    let mut elements = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        if pos >= data.len() {
            return Err(EngineError::Incomplete);
        }
        let (elem, delta) = decode_nested(&data[pos..], depth + 1)?;
        elements.push(elem);
        pos += delta;
    }

    Ok((elements, pos))
}

// =============================================================================
// Encoding
// =============================================================================

/// Values that can be rendered as a RESP reply.
///
/// `simple` only affects text: `true` renders a simple string, `false` a
/// bulk string.
pub trait Encode {
    fn encode_into(&self, buf: &mut BytesMut, simple: bool);
}

/// Encode `value` into a fresh buffer.
pub fn encode<T: Encode + ?Sized>(value: &T, simple: bool) -> Bytes {
    let mut buf = BytesMut::new();
    value.encode_into(&mut buf, simple);
    buf.freeze()
}

fn put_header(buf: &mut BytesMut, marker: u8, n: impl ToString) {
    buf.put_u8(marker);
    buf.put_slice(n.to_string().as_bytes());
    buf.put_slice(CRLF);
}

impl Encode for str {
    fn encode_into(&self, buf: &mut BytesMut, simple: bool) {
        if simple {
            buf.put_u8(b'+');
        } else {
            put_header(buf, b'$', self.len());
        }
        buf.put_slice(self.as_bytes());
        buf.put_slice(CRLF);
    }
}

impl Encode for String {
    fn encode_into(&self, buf: &mut BytesMut, simple: bool) {
        self.as_str().encode_into(buf, simple);
    }
}

impl Encode for i64 {
    fn encode_into(&self, buf: &mut BytesMut, _simple: bool) {
        put_header(buf, b':', self);
    }
}

impl Encode for EngineError {
    fn encode_into(&self, buf: &mut BytesMut, _simple: bool) {
        buf.put_u8(b'-');
        buf.put_slice(self.to_string().as_bytes());
        buf.put_slice(CRLF);
    }
}

impl Encode for [String] {
    fn encode_into(&self, buf: &mut BytesMut, _simple: bool) {
        put_header(buf, b'*', self.len());
        for item in self {
            item.encode_into(buf, false);
        }
    }
}

impl Encode for Vec<String> {
    fn encode_into(&self, buf: &mut BytesMut, simple: bool) {
        self.as_slice().encode_into(buf, simple);
    }
}

/// The unit value has no wire form and encodes to nothing.
impl Encode for () {
    fn encode_into(&self, _buf: &mut BytesMut, _simple: bool) {}
}

impl Encode for RespValue {
    fn encode_into(&self, buf: &mut BytesMut, simple: bool) {
        match self {
            RespValue::Text(s) => s.encode_into(buf, simple),
            RespValue::Integer(n) => n.encode_into(buf, simple),
            RespValue::Error(msg) => {
                buf.put_u8(b'-');
                buf.put_slice(msg.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Array(items) => {
                put_header(buf, b'*', items.len());
                for item in items {
                    item.encode_into(buf, false);
                }
            }
        }
    }
}
