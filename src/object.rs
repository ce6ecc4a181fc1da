//! Stored objects: a packed type/encoding byte, the payload, and the LRU
//! clock sample.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EngineError, EngineResult};

// The type lives in the high nibble, the encoding in the low nibble.
pub const OBJ_TYPE_STRING: u8 = 0 << 4;

pub const OBJ_ENCODING_RAW: u8 = 0;
pub const OBJ_ENCODING_INT: u8 = 1;
pub const OBJ_ENCODING_EMBSTR: u8 = 8;

const TYPE_MASK: u8 = 0b1111_0000;
const ENCODING_MASK: u8 = 0b0000_1111;

/// Strings shorter than this are stored with the embedded encoding.
pub const EMBSTR_SIZE_LIMIT: usize = 44;

static NEXT_OBJ_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one constructed object.
///
/// Two objects holding equal values still have different ids; the expiry
/// index is keyed by this, not by the key name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u64);

impl ObjId {
    fn next() -> Self {
        ObjId(NEXT_OBJ_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Payload of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
}

impl Value {
    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(s) => s,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value bound to a key in the store.
#[derive(Debug)]
pub struct Obj {
    id: ObjId,
    type_encoding: u8,
    value: Value,
    last_accessed_at: u32,
}

impl Obj {
    /// Create an object with an explicit type and encoding.
    pub fn new(value: Value, o_type: u8, o_enc: u8) -> Self {
        Self {
            id: ObjId::next(),
            type_encoding: o_type | o_enc,
            value,
            last_accessed_at: 0,
        }
    }

    /// Create a string object, deducing the encoding from its text.
    pub fn from_string(s: impl Into<String>) -> Self {
        let s = s.into();
        let (o_type, o_enc) = deduce_type_encoding(&s);
        Self::new(Value::Str(s), o_type, o_enc)
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn type_encoding(&self) -> u8 {
        self.type_encoding
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn last_accessed_at(&self) -> u32 {
        self.last_accessed_at
    }

    /// Record an access at the given LRU clock.
    pub fn touch(&mut self, lru_clock: u32) {
        self.last_accessed_at = lru_clock;
    }

    /// Replace the payload in place, keeping the identity.
    pub fn set_value(&mut self, value: Value, o_type: u8, o_enc: u8) {
        self.value = value;
        self.type_encoding = o_type | o_enc;
    }
}

pub fn get_type(te: u8) -> u8 {
    te & TYPE_MASK
}

pub fn get_encoding(te: u8) -> u8 {
    te & ENCODING_MASK
}

pub fn assert_type(te: u8, t: u8) -> EngineResult<()> {
    if get_type(te) != t {
        return Err(EngineError::WrongType);
    }
    Ok(())
}

pub fn assert_encoding(te: u8, e: u8) -> EngineResult<()> {
    if get_encoding(te) != e {
        return Err(EngineError::WrongEncoding);
    }
    Ok(())
}

/// Pick the type and encoding for a freshly written string.
pub fn deduce_type_encoding(value: &str) -> (u8, u8) {
    let o_type = OBJ_TYPE_STRING;
    if value.parse::<i64>().is_ok() {
        return (o_type, OBJ_ENCODING_INT);
    }
    if value.len() < EMBSTR_SIZE_LIMIT {
        return (o_type, OBJ_ENCODING_EMBSTR);
    }
    (o_type, OBJ_ENCODING_RAW)
}
