use sha2::{Digest, Sha256};

/// ViewId is the stable, content-addressed identity of a [`crate::View`]:
/// a hash of its schema and storage location. Two views with the same
/// identity are the same view for the purposes of the scheduler, even if
/// their in-memory descriptors were built independently.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId([u8; 16]);

impl ViewId {
    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    /// Derives a `ViewId` from a view's schema and its storage location: a
    /// stable identity that does not change as long as neither does.
    pub fn derive(schema: &str, full_path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(schema.as_bytes());
        hasher.update([0u8]); // separator, to avoid ambiguous concatenation
        hasher.update(full_path.as_bytes());
        let digest = hasher.finalize();

        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }

    pub fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        let exact: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(exact))
    }
}

impl std::str::FromStr for ViewId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl serde::Serialize for ViewId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        format!("{self}").serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for ViewId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        Self::from_hex(s.as_ref()).map_err(|err| D::Error::custom(format!("invalid view id: {err}")))
    }
}

/// VersionDigest is a stable hash of a view's resource hashes concatenated
/// with its transformation definition. It is opaque to the scheduler:
/// it is only ever compared for equality against what the schema service
/// has stored.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VersionDigest(String);

impl VersionDigest {
    pub fn compute(resource_hashes: &[String], definition: &str) -> Self {
        let mut hasher = Sha256::new();
        for hash in resource_hashes {
            hasher.update(hash.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(definition.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for VersionDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_stable_and_sensitive_to_inputs() {
        let a = ViewId::derive("schema-a", "/warehouse/a");
        let b = ViewId::derive("schema-a", "/warehouse/a");
        let c = ViewId::derive("schema-a", "/warehouse/b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hex_round_trips() {
        let id = ViewId::derive("schema", "/path");
        let parsed: ViewId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
