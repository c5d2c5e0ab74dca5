use crate::hashing::Hasher;
use crate::skipgraph::NameId;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use std::convert::TryFrom;

/// Public half of a node key; signatures are checked by recovering it.
pub type PublicKey = Address;

/// Signing capability of a node.
pub struct Wallet {
    signer: LocalWallet,
}

impl Wallet {
    pub fn random() -> Self {
        Self {
            signer: LocalWallet::new(&mut rand::thread_rng()),
        }
    }

    /// Wallet for a hex encoded secp256k1 secret.
    pub fn from_secret_hex(secret: &str) -> anyhow::Result<Self> {
        let signer = secret
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| anyhow::anyhow!("invalid secret key: {}", e))?;
        Ok(Self { signer })
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer.address()
    }

    /// Detached signature over a hash.
    pub async fn sign(&self, hash: &NameId) -> anyhow::Result<Vec<u8>> {
        let signature = self
            .signer
            .sign_message(hash.as_str().as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("signing failed: {}", e))?;
        Ok(signature.to_vec())
    }
}

/// Checks a detached signature over `hash` against `key`.
pub fn verify(hash: &NameId, signature: &[u8], key: &PublicKey) -> bool {
    match Signature::try_from(signature) {
        Ok(signature) => signature
            .verify(hash.as_str().as_bytes().to_vec(), *key)
            .is_ok(),
        Err(_) => false,
    }
}

/// numID a key owner is addressed by in the overlay.
pub fn key_num_id(hasher: &dyn Hasher, key: &PublicKey, bits: usize) -> u64 {
    hasher.hash(key.as_bytes(), bits).to_num()
}
