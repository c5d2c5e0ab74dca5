use crate::skipgraph::NameId;
use ethers::utils::keccak256;

/// Hashing capability: digests arbitrary input into a binary name of `bits` bits.
pub trait Hasher: Send + Sync {
    fn hash(&self, input: &[u8], bits: usize) -> NameId;

    fn hash_str(&self, input: &str, bits: usize) -> NameId {
        self.hash(input.as_bytes(), bits)
    }
}

/// Keccak-256 truncated to its leading bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak;

impl Hasher for Keccak {
    fn hash(&self, input: &[u8], bits: usize) -> NameId {
        let digest = keccak256(input);
        let bits = bits.min(digest.len() * 8);
        NameId::from_bits((0..bits).map(|i| (digest[i / 8] >> (7 - i % 8)) & 1 == 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_truncated() {
        let name = Keccak.hash(b"lightchain", 30);
        assert_eq!(name.len(), 30);
        assert!(name.to_num() < 1 << 30);
    }

    #[test]
    fn truncation_keeps_prefix() {
        let long = Keccak.hash_str("block", 64);
        let short = Keccak.hash_str("block", 20);
        assert!(long.as_str().starts_with(short.as_str()));
    }
}
