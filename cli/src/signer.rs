use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};
use motherlode_api::prelude::Address;
use motherlode_client::{SignerError, TransactionSigner};
use sha3::{Digest, Sha3_256};
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};

// Single-key ed25519 authentication scheme.
const ED25519_SCHEME: u8 = 0x00;

/// Signs with an ed25519 keypair stored as a JSON byte array.
pub struct KeypairSigner {
    keypair: Keypair,
    address: Address,
}

impl KeypairSigner {
    /// Loads the keypair at `KEYPAIR`, or `~/.config/solana/id.json`.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = match std::env::var("KEYPAIR") {
            Ok(path) => PathBuf::from(path),
            Err(_) => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Missing KEYPAIR env var and no home directory"))?
                .join(".config/solana/id.json"),
        };
        let keypair = read_keypair_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read keypair {}: {e}", path.display()))?;
        Ok(Self::new(keypair))
    }

    pub fn new(keypair: Keypair) -> Self {
        let address = account_address(&keypair.pubkey().to_bytes());
        Self { keypair, address }
    }
}

impl TransactionSigner for KeypairSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.pubkey().to_bytes().to_vec()
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, SignerError>> {
        let signature = self.keypair.sign_message(message);
        futures::future::ready(Ok(signature.as_ref().to_vec())).boxed()
    }
}

/// Account address derived from an ed25519 public key.
pub fn account_address(public_key: &[u8; 32]) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(public_key);
    hasher.update([ED25519_SCHEME]);
    let digest: [u8; 32] = hasher.finalize().into();
    Address::from(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_stable_per_key() {
        let keypair = Keypair::new();
        let bytes = keypair.to_bytes();
        let a = KeypairSigner::new(keypair);
        let b = KeypairSigner::new(Keypair::from_bytes(&bytes).unwrap());
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), account_address(&[0; 32]));
        assert_eq!(a.public_key().len(), 32);
    }

    #[tokio::test]
    async fn test_signature_verifies() {
        let signer = KeypairSigner::new(Keypair::new());
        let signature = signer.sign(b"motherlode").await.unwrap();
        let signature = solana_sdk::signature::Signature::try_from(signature.as_slice()).unwrap();
        assert!(signature.verify(&signer.keypair.pubkey().to_bytes(), b"motherlode"));
    }
}
