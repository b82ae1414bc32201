use anyhow::{Context, Result, ensure};
use k256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};
use sha2::{Digest, Sha256};

use super::signer::ArtifactSigner;
use crate::digest::DigestAlgorithm;

/// ECDSA over secp256k1. The private scalar is SHA-256 of the key's seed.
pub struct Secp256k1Signer {
    key: SigningKey,
}

impl Secp256k1Signer {
    pub fn from_seed(seed: &str) -> Result<Self> {
        let scalar = Sha256::digest(seed.as_bytes());
        let key = SigningKey::from_slice(&scalar).context("seed does not yield a valid secp256k1 key")?;
        Ok(Self { key })
    }
}

impl ArtifactSigner for Secp256k1Signer {
    fn sign_digest(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        ensure!(
            digest.len() == algorithm.output_len(),
            "{algorithm} digest must be {} bytes, got {}",
            algorithm.output_len(),
            digest.len()
        );
        let signature: Signature = self
            .key
            .sign_prehash(digest)
            .map_err(|err| anyhow::anyhow!("secp256k1 signing failed: {err}"))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
    }

    fn algorithm(&self) -> &str {
        "secp256k1"
    }
}
