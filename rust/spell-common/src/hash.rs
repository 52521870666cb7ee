use std::fmt::{Display, Formatter};

use base58::ToBase58;
use serde::{Deserialize, Serialize};

/// The size of a BLAKE3 hash in bytes.
pub const BLAKE3_HASH_SIZE: usize = 32;

/// A BLAKE3 cryptographic hash.
///
/// Used as the identity of an urbject's code for introspection. Two urbjects
/// with the same code share a hash; the hash never participates in
/// authorization.
///
/// # Examples
///
/// ```rust
/// use spell_common::Blake3Hash;
///
/// let hash = Blake3Hash::hash(b"power.memory.foo = args.foo;");
/// assert_eq!(hash, Blake3Hash::hash(b"power.memory.foo = args.foo;"));
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Blake3Hash([u8; BLAKE3_HASH_SIZE]);

impl Blake3Hash {
    /// Computes the BLAKE3 hash of the given bytes.
    pub fn hash(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    /// The raw digest bytes.
    pub fn bytes(&self) -> &[u8; BLAKE3_HASH_SIZE] {
        &self.0
    }
}

impl From<[u8; 32]> for Blake3Hash {
    fn from(value: [u8; 32]) -> Self {
        Blake3Hash(value)
    }
}

impl Display for Blake3Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_hashes_identical_code_identically() {
        let one = Blake3Hash::hash(b"log(1);");
        let two = Blake3Hash::hash(b"log(1);");
        let other = Blake3Hash::hash(b"log(2);");

        assert_eq!(one, two);
        assert_ne!(one, other);
        assert_eq!(one.to_string(), two.to_string());
    }
}
