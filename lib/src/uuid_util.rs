//! Stable identifiers that survive rewrites (spec.md H4: "Branch `uuid` is
//! immutable; `name` is mutable"). Unlike the hashes in [`crate::object_id`],
//! a `Uuid` does not change when the object it names is replaced by a new
//! CAS revision.

use std::fmt;

use rand::RngCore as _;

use crate::hex_util;

const UUID_LEN: usize = 16;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid(Vec<u8>);

impl Uuid {
    /// Generates a new random identifier. Used whenever a new branch,
    /// session, or author record is created.
    pub fn new_random() -> Self {
        let mut bytes = vec![0u8; UUID_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Option<Self> {
        hex_util::decode_hex(hex_str).map(Self)
    }

    pub fn hex(&self) -> String {
        hex_util::encode_hex(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Uuid").field(&self.hex()).finish()
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl serde::Serialize for Uuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.hex().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Uuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        Self::from_hex(&hex_str)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid uuid {hex_str:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_uuids_differ() {
        assert_ne!(Uuid::new_random(), Uuid::new_random());
    }

    #[test]
    fn roundtrips_through_hex() {
        let id = Uuid::new_random();
        assert_eq!(Uuid::from_hex(&id.hex()).as_ref(), Some(&id));
    }
}
