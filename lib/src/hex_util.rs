// Copyright 2023 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lowercase hex helpers for hashes and hash prefixes (spec.md §4.1: hashes
//! are presented as lowercase hex; truncation prefixes resolve against
//! currently-reachable objects).

/// Encodes `data` as a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decodes a full hex string. Returns `None` on odd length or invalid digits.
pub fn decode_hex(hex_str: impl AsRef<[u8]>) -> Option<Vec<u8>> {
    hex::decode(hex_str.as_ref()).ok()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes a hex string prefix, which may have an odd number of digits. The
/// odd trailing digit is zero-filled into the low nibble of the last byte.
/// Returns `(bytes, has_odd_byte)`.
pub fn decode_hex_prefix(prefix: impl AsRef<[u8]>) -> Option<(Vec<u8>, bool)> {
    let prefix = prefix.as_ref();
    let mut decoded = Vec::with_capacity(prefix.len().div_ceil(2));
    let mut chunks = prefix.chunks_exact(2);
    for chunk in &mut chunks {
        let [hi, lo] = chunk.try_into().unwrap();
        decoded.push(hex_value(hi)? << 4 | hex_value(lo)?);
    }
    match chunks.remainder() {
        [] => Some((decoded, false)),
        &[hi] => {
            decoded.push(hex_value(hi)? << 4);
            Some((decoded, true))
        }
        _ => unreachable!(),
    }
}

/// Length, in hex digits, of the common prefix of two byte sequences.
pub fn common_hex_len(bytes_a: &[u8], bytes_b: &[u8]) -> usize {
    std::iter::zip(bytes_a, bytes_b)
        .enumerate()
        .find_map(|(i, (a, b))| match a ^ b {
            0 => None,
            d if d & 0xf0 == 0 => Some(i * 2 + 1),
            _ => Some(i * 2),
        })
        .unwrap_or_else(|| bytes_a.len().min(bytes_b.len()) * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_hex() {
        let bytes = b"\x01\x23\x45\x67\x89\xab\xcd\xef";
        assert_eq!(encode_hex(bytes), "0123456789abcdef");
        assert_eq!(decode_hex("0123456789abcdef"), Some(bytes.to_vec()));
        assert_eq!(decode_hex("0123456789ABCDEF"), Some(bytes.to_vec()));
        assert_eq!(decode_hex("abc"), None); // odd length
        assert_eq!(decode_hex("zz"), None); // invalid digit
    }

    #[test]
    fn prefix_decode() {
        assert_eq!(decode_hex_prefix(""), Some((vec![], false)));
        assert_eq!(decode_hex_prefix("1"), Some((vec![0x10], true)));
        assert_eq!(decode_hex_prefix("12"), Some((vec![0x12], false)));
        assert_eq!(decode_hex_prefix("123"), Some((vec![0x12, 0x30], true)));
        assert_eq!(decode_hex_prefix("0x1"), None);
    }

    #[test]
    fn common_prefix_length() {
        assert_eq!(common_hex_len(b"\x12\x34", b"\x12\x34"), 4);
        assert_eq!(common_hex_len(b"\x12\x34", b"\x12\x30"), 3);
        assert_eq!(common_hex_len(b"\x12\x34", b"\x1a\x34"), 1);
        assert_eq!(common_hex_len(b"\x02\x34", b"\x12\x34"), 0);
    }
}
