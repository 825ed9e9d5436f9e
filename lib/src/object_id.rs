// Copyright 2020-2024 The Jujutsu Authors
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

//! Content-hash identifiers for CAS objects (spec.md §4.1, §4.2).
//!
//! Every CAS object kind gets its own newtype over a 32-byte hash so the
//! compiler stops us from, say, handing a `TreeId` to a function that wants
//! a `CommitId`. All of them share the same representation and hex
//! formatting; [`id_type!`] generates the boilerplate.

use std::fmt;
use std::fmt::Debug;

use crate::hex_util;

pub const HASH_LEN: usize = 32;

pub trait ObjectId {
    fn object_type(&self) -> &'static str;
    fn as_bytes(&self) -> &[u8];
    fn to_bytes(&self) -> Vec<u8>;
    fn hex(&self) -> String;
    fn from_bytes(bytes: &[u8]) -> Self
    where
        Self: Sized;
    fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self>
    where
        Self: Sized;
}

macro_rules! id_type {
    ($(#[$attr:meta])* $vis:vis $name:ident) => {
        $(#[$attr])*
        #[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
        $vis struct $name(Vec<u8>);

        impl $name {
            pub fn new(value: Vec<u8>) -> Self {
                Self(value)
            }

            pub fn from_bytes(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }

            pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
                hex_util::decode_hex(hex).map(Self)
            }

            pub fn from_hex(hex: &str) -> Self {
                Self::try_from_hex(hex).expect("valid hex id literal")
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.hex()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.hex())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.hex().serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let hex_str = String::deserialize(deserializer)?;
                Self::try_from_hex(&hex_str)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid hex id {hex_str:?}")))
            }
        }

        impl crate::object_id::ObjectId for $name {
            fn object_type(&self) -> &'static str {
                stringify!($name)
            }

            fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            fn to_bytes(&self) -> Vec<u8> {
                self.0.clone()
            }

            fn hex(&self) -> String {
                hex_util::encode_hex(&self.0)
            }

            fn from_bytes(bytes: &[u8]) -> Self {
                Self::from_bytes(bytes)
            }

            fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
                Self::try_from_hex(hex)
            }
        }
    };
}

id_type!(
    /// Hash of a `Blob` (spec.md §3).
    pub BlobId
);
id_type!(
    /// Hash of a `File` record wrapping a blob with properties.
    pub FileId
);
id_type!(
    /// Hash of a `Tree` directory listing.
    pub TreeId
);
id_type!(
    /// Hash of a `Commit`.
    pub CommitId
);
id_type!(
    /// Hash of a `ChangelogEntry`.
    pub ChangelogId
);
id_type!(
    /// Hash of one revision of a `Branch` object. Distinct from the branch's
    /// stable `uuid` (spec.md H4): every head/base move writes a new
    /// `BranchId`.
    pub BranchId
);
id_type!(
    /// Hash of one revision of a `Session` object.
    pub SessionId
);
id_type!(
    /// Hash of a working-copy `Manifest` snapshot.
    pub ManifestId
);
id_type!(
    /// Hash of a `StashEntry`.
    pub StashId
);
id_type!(
    /// Hash of a `Settings` object.
    pub SettingsId
);
id_type!(
    /// Hash of an `ActionRecord` (spec.md §4.5).
    pub ActionId
);
id_type!(
    /// Hash of a redo-stack node (spec.md §4.5, redo branching).
    pub RedoNodeId
);
id_type!(
    /// Hash of a `Registry` snapshot mapping live branch/session uuids to
    /// their current object (see SPEC_FULL.md §5).
    pub RegistryId
);

/// An identifier prefix with facilities for converting between bytes and a
/// hex string. Used to resolve user-typed short hashes (spec.md §4.1).
#[derive(Clone, PartialEq, Eq)]
pub struct HexPrefix {
    min_prefix_bytes: Vec<u8>,
    has_odd_byte: bool,
}

impl HexPrefix {
    pub fn try_from_hex(prefix: impl AsRef<[u8]>) -> Option<Self> {
        let (min_prefix_bytes, has_odd_byte) = hex_util::decode_hex_prefix(prefix)?;
        Some(Self {
            min_prefix_bytes,
            has_odd_byte,
        })
    }

    pub fn hex(&self) -> String {
        let mut hex_string = hex_util::encode_hex(&self.min_prefix_bytes);
        if self.has_odd_byte {
            hex_string.pop().unwrap();
        }
        hex_string
    }

    pub fn as_full_bytes(&self) -> Option<&[u8]> {
        (!self.has_odd_byte).then_some(&self.min_prefix_bytes)
    }

    fn split_odd_byte(&self) -> (Option<u8>, &[u8]) {
        if self.has_odd_byte {
            let (&odd, prefix) = self.min_prefix_bytes.split_last().unwrap();
            (Some(odd), prefix)
        } else {
            (None, &self.min_prefix_bytes)
        }
    }

    pub fn matches<Q: ObjectId>(&self, id: &Q) -> bool {
        let id_bytes = id.as_bytes();
        let (maybe_odd, prefix) = self.split_odd_byte();
        if id_bytes.starts_with(prefix) {
            match maybe_odd {
                Some(odd) => matches!(id_bytes.get(prefix.len()), Some(v) if v & 0xf0 == odd),
                None => true,
            }
        } else {
            false
        }
    }
}

impl Debug for HexPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HexPrefix").field(&self.hex()).finish()
    }
}

/// The result of resolving a (possibly ambiguous) hash prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixResolution<T> {
    NoMatch,
    SingleMatch(T),
    AmbiguousMatch,
}

impl<T> PrefixResolution<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PrefixResolution<U> {
        match self {
            Self::NoMatch => PrefixResolution::NoMatch,
            Self::SingleMatch(x) => PrefixResolution::SingleMatch(f(x)),
            Self::AmbiguousMatch => PrefixResolution::AmbiguousMatch,
        }
    }
}

/// Resolves a hex prefix against a sorted, deduplicated slice of ids.
pub fn resolve_prefix<'a, T: ObjectId>(
    ids: impl Iterator<Item = &'a T>,
    prefix: &HexPrefix,
) -> PrefixResolution<&'a T>
where
    T: 'a,
{
    let mut matches = ids.filter(|id| prefix.matches(*id));
    match matches.next() {
        None => PrefixResolution::NoMatch,
        Some(first) => {
            if matches.next().is_some() {
                PrefixResolution::AmbiguousMatch
            } else {
                PrefixResolution::SingleMatch(first)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_debug() {
        let id = CommitId::from_hex("deadbeef0123");
        assert_eq!(format!("{id}"), "deadbeef0123");
        assert_eq!(format!("{id:.6}"), "deadbe");
    }

    #[test]
    fn prefix_matching() {
        let id = CommitId::from_hex("1234");
        assert!(HexPrefix::try_from_hex("12").unwrap().matches(&id));
        assert!(HexPrefix::try_from_hex("123").unwrap().matches(&id));
        assert!(!HexPrefix::try_from_hex("13").unwrap().matches(&id));
    }

    #[test]
    fn resolve_prefix_ambiguity() {
        let ids = vec![CommitId::from_hex("1234"), CommitId::from_hex("1256")];
        let prefix = HexPrefix::try_from_hex("12").unwrap();
        assert_eq!(
            resolve_prefix(ids.iter(), &prefix),
            PrefixResolution::AmbiguousMatch
        );
        let prefix = HexPrefix::try_from_hex("123").unwrap();
        assert_eq!(
            resolve_prefix(ids.iter(), &prefix),
            PrefixResolution::SingleMatch(&ids[0])
        );
    }
}
