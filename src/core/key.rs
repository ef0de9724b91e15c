//! Document keys with a collection prefix.
//!
//! Keys arrive from the wire already prefixed with an unsigned-LEB128
//! collection id. Log output must never carry raw key bytes: use
//! [`DocKey::tagged`] which wraps the key in `<ud>` markers so downstream
//! redaction can strip user data.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Collection namespace id carried as the key prefix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(u32);

impl CollectionId {
    pub const DEFAULT: CollectionId = CollectionId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid:{:#x}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key too short for collection prefix ({len} bytes)")]
    Truncated { len: usize },
    #[error("collection prefix overflows u32")]
    PrefixOverflow,
}

/// Opaque document key: LEB128 collection prefix followed by the key body.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    bytes: Bytes,
}

impl DocKey {
    /// Builds a key from a collection id and raw body bytes.
    pub fn new(collection: CollectionId, body: impl AsRef<[u8]>) -> Self {
        let body = body.as_ref();
        let mut buf = BytesMut::with_capacity(body.len() + 5);
        encode_leb128(&mut buf, collection.get());
        buf.put_slice(body);
        Self {
            bytes: buf.freeze(),
        }
    }

    /// Wraps already-encoded wire bytes, validating the prefix.
    pub fn from_encoded(bytes: Bytes) -> Result<Self, KeyError> {
        decode_leb128(&bytes)?;
        Ok(Self { bytes })
    }

    pub fn collection_id(&self) -> CollectionId {
        let (id, _) = decode_leb128(&self.bytes).expect("doc key prefix validated");
        CollectionId(id)
    }

    pub fn body(&self) -> &[u8] {
        let (_, used) = decode_leb128(&self.bytes).expect("doc key prefix validated");
        &self.bytes[used..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Display adapter tagging the key as user data for log redaction.
    pub fn tagged(&self) -> TaggedKey<'_> {
        TaggedKey { key: self }
    }
}

impl fmt::Debug for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DocKey({}, {:?})",
            self.collection_id(),
            String::from_utf8_lossy(self.body())
        )
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.collection_id(),
            String::from_utf8_lossy(self.body())
        )
    }
}

/// `<ud>…</ud>` wrapper for log output.
pub struct TaggedKey<'a> {
    key: &'a DocKey,
}

impl fmt::Display for TaggedKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ud>{}</ud>", self.key)
    }
}

fn encode_leb128(buf: &mut BytesMut, mut value: u32) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_leb128(bytes: &[u8]) -> Result<(u32, usize), KeyError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    for (idx, &byte) in bytes.iter().enumerate() {
        let low = u32::from(byte & 0x7f);
        if shift >= 32 || (shift == 28 && low > 0x0f) {
            return Err(KeyError::PrefixOverflow);
        }
        value |= low << shift;
        if byte & 0x80 == 0 {
            return Ok((value, idx + 1));
        }
        shift += 7;
    }
    Err(KeyError::Truncated { len: bytes.len() })
}
