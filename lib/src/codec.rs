//! Canonical, tagged, JSON-like serialization (spec.md §4.1).
//!
//! Every CAS object is stored as:
//!
//! ```text
//! <tag line>\n<canonical JSON header>\n[<raw tail bytes>]
//! ```
//!
//! The tag sits at byte offset 0 so a reader can reject unknown kinds before
//! attempting to parse the body (`CorruptObject`, forward-compatible). The
//! header is canonical JSON: `serde_json::Map` is backed by a `BTreeMap`
//! unless the `preserve_order` feature is enabled (it isn't here), so object
//! keys come out sorted for free; we never construct a `serde_json::Number`
//! from a float, so "floats forbidden" holds by construction as long as
//! callers stick to integer fields. Blob bodies are the one case that
//! doesn't fit in JSON cleanly: above [`RAW_BLOB_THRESHOLD`] bytes they are
//! appended as a raw tail instead of being embedded as an escaped JSON
//! string ("a binary escape for blob bodies", spec.md §4.1).

use std::fmt;

use blake2::Blake2s256;
use blake2::Digest as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Inline blobs up to this size are embedded in the JSON header as a base64
/// string; larger blobs are written as a raw tail instead.
pub const RAW_BLOB_THRESHOLD: usize = 1 << 20; // 1 MiB

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("object has no tag line")]
    MissingTag,
    #[error("unknown object kind {0:?}")]
    UnknownKind(String),
    #[error("malformed canonical header")]
    MalformedHeader(#[source] serde_json::Error),
    #[error("object body did not match its declared kind")]
    SchemaMismatch(#[source] serde_json::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// A decoded, not-yet-typed object: the kind tag, the JSON header, and an
/// optional raw tail (present only for out-of-line blob bodies).
pub struct RawObject {
    pub kind: String,
    pub header: serde_json::Value,
    pub tail: Option<Vec<u8>>,
}

/// Encodes `header` as the canonical body of a `kind`-tagged object, with no
/// raw tail. Used by every non-blob object kind.
pub fn encode<T: Serialize>(kind: &str, header: &T) -> Vec<u8> {
    encode_with_tail(kind, header, None)
}

/// Encodes `header` plus an optional raw byte tail (used only for blob
/// bodies that exceed [`RAW_BLOB_THRESHOLD`]).
pub fn encode_with_tail<T: Serialize>(kind: &str, header: &T, tail: Option<&[u8]>) -> Vec<u8> {
    let header_bytes = serde_json::to_vec(header).expect("object headers are always encodable");
    let mut buf = Vec::with_capacity(kind.len() + 1 + header_bytes.len() + 1);
    buf.extend_from_slice(kind.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(&header_bytes);
    if let Some(tail) = tail {
        buf.push(b'\n');
        buf.extend_from_slice(tail);
    }
    buf
}

/// Splits stored bytes back into their tag, header, and raw tail (if any).
/// Does not know about specific object kinds; [`decode_typed`] builds on
/// this to materialize a concrete Rust type.
pub fn decode_raw(bytes: &[u8]) -> CodecResult<RawObject> {
    let newline = bytes.iter().position(|&b| b == b'\n').ok_or(CodecError::MissingTag)?;
    let kind = std::str::from_utf8(&bytes[..newline])
        .map_err(|_| CodecError::MissingTag)?
        .to_owned();
    let rest = &bytes[newline + 1..];
    // The header is itself a single JSON value; serde_json::Deserializer can
    // tell us exactly how many bytes it consumed, so anything after that
    // (skipping one separating newline) is the raw tail.
    let mut de = serde_json::Deserializer::from_slice(rest).into_iter::<serde_json::Value>();
    let header = de
        .next()
        .ok_or(CodecError::MissingTag)?
        .map_err(CodecError::MalformedHeader)?;
    let consumed = de.byte_offset();
    let tail = match rest.get(consumed..) {
        Some([]) | None => None,
        Some(remainder) => Some(remainder.strip_prefix(b"\n").unwrap_or(remainder).to_vec()),
    };
    Ok(RawObject { kind, header, tail })
}

/// Decodes and type-checks the header of a raw object against an expected
/// kind tag.
pub fn decode_typed<T: DeserializeOwned>(raw: &RawObject, expected_kind: &str) -> CodecResult<T> {
    if raw.kind != expected_kind {
        return Err(CodecError::UnknownKind(raw.kind.clone()));
    }
    serde_json::from_value(raw.header.clone()).map_err(CodecError::SchemaMismatch)
}

/// Domain-separated content hash: `hash(kind ‖ canonical_bytes)`. Since the
/// stored bytes already begin with `kind\n`, hashing the stored bytes
/// directly satisfies the domain separation spec.md §4.1 calls for.
pub fn hash_stored_bytes(stored: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    hasher.update(stored);
    hasher.finalize().into()
}

/// Formats a 32-byte hash as lowercase hex.
pub fn format_hash(hash: &[u8; 32]) -> String {
    crate::hex_util::encode_hex(hash)
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawObject")
            .field("kind", &self.kind)
            .field("header", &self.header)
            .field("tail_len", &self.tail.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Point {
        y: i64,
        x: i64,
    }

    #[test]
    fn keys_come_out_sorted() {
        let bytes = encode("point", &Point { y: 2, x: 1 });
        let body = bytes.splitn(2, |&b| b == b'\n').nth(1).unwrap();
        assert_eq!(body, br#"{"x":1,"y":2}"#);
    }

    #[test]
    fn roundtrip_without_tail() {
        let p = Point { x: 5, y: -3 };
        let bytes = encode("point", &p);
        let raw = decode_raw(&bytes).unwrap();
        assert_eq!(raw.kind, "point");
        assert!(raw.tail.is_none());
        let decoded: Point = decode_typed(&raw, "point").unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn roundtrip_with_tail() {
        let tail = b"binary\x00payload";
        let bytes = encode_with_tail("blob", &Point { x: 1, y: 1 }, Some(tail));
        let raw = decode_raw(&bytes).unwrap();
        assert_eq!(raw.tail.as_deref(), Some(&tail[..]));
    }

    #[test]
    fn unknown_kind_is_rejected_by_typed_decode() {
        let bytes = encode("point", &Point { x: 0, y: 0 });
        let raw = decode_raw(&bytes).unwrap();
        assert!(matches!(
            decode_typed::<Point>(&raw, "other"),
            Err(CodecError::UnknownKind(_))
        ));
    }

    #[test]
    fn identical_values_hash_identically() {
        let a = encode("point", &Point { x: 1, y: 2 });
        let b = encode("point", &Point { x: 1, y: 2 });
        assert_eq!(hash_stored_bytes(&a), hash_stored_bytes(&b));
    }

    #[test]
    fn missing_newline_is_an_error() {
        assert!(matches!(decode_raw(b"no-newline-here"), Err(CodecError::MissingTag)));
    }
}
