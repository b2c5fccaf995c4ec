use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::TransformOutput;

mod disk;
pub use disk::*;
mod memory;
pub use memory::*;

/// Lowercase hex SHA-256 digest.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Hash of a module's raw source plus the identity of every transform
    /// applied to it, in application order.
    pub fn of_module<'a>(raw_source: &str, transform_identities: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, raw_source.as_bytes());
        for identity in transform_identities {
            update_framed(&mut hasher, identity.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

// Length prefixes keep ("ab", "c") and ("a", "bc") apart.
fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short(12))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transform output stored under a module's content hash.
pub type CacheEntry = TransformOutput;

/// Content-addressed store of transform outputs.
///
/// Values for a key are always identical, so concurrent writers may race
/// freely. Failures are reported, and the graph builder treats them as misses.
pub trait Cache: Send + Sync + fmt::Debug {
    fn get(&self, hash: &ContentHash) -> anyhow::Result<Option<CacheEntry>>;

    fn put(&self, hash: &ContentHash, entry: &CacheEntry) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_hash_depends_on_transform_identity() {
        let plain = ContentHash::of_module("export const a = 1", []);
        let scanned = ContentHash::of_module("export const a = 1", ["scan@1"]);
        let scanned_again = ContentHash::of_module("export const a = 1", ["scan@1"]);
        let upgraded = ContentHash::of_module("export const a = 1", ["scan@2"]);

        assert_ne!(plain, scanned);
        assert_eq!(scanned, scanned_again);
        assert_ne!(scanned, upgraded);
    }

    #[test]
    fn module_hash_frames_its_inputs() {
        let left = ContentHash::of_module("ab", ["c"]);
        let right = ContentHash::of_module("a", ["bc"]);
        assert_ne!(left, right);
    }

    #[test]
    fn one_byte_changes_the_hash() {
        let before = ContentHash::of_bytes(b"export const a = 1;\n");
        let after = ContentHash::of_bytes(b"export const a = 2;\n");
        assert_ne!(before, after);
        assert_eq!(before.as_str().len(), 64);
        assert_eq!(before.short(8).len(), 8);
    }
}
