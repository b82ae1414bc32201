use anyhow::{Context, Result, ensure};
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::pkcs8::spki::der::oid::AssociatedOid;
use rsa::signature::SignatureEncoding;
use rsa::signature::hazmat::PrehashSigner;
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::signer::ArtifactSigner;
use crate::digest::DigestAlgorithm;

const RSA_KEY_BITS: usize = 2048;

/// RSA PKCS#1 v1.5 over SHA-256/384/512 digests.
///
/// Key generation draws from a ChaCha20 stream keyed with SHA-256 of the
/// seed, so one seed always yields the same key pair.
pub struct RsaSigner {
    private_key: RsaPrivateKey,
}

impl RsaSigner {
    pub fn from_seed(seed: &str) -> Result<Self> {
        let hash = Sha256::digest(seed.as_bytes());
        let mut rng = ChaCha20Rng::from_seed(hash.into());
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .context("generating RSA key from seed")?;
        Ok(Self { private_key })
    }

    fn sign_with<D>(&self, digest: &[u8]) -> Result<Vec<u8>>
    where
        D: Digest + AssociatedOid,
    {
        let signing_key = SigningKey::<D>::new(self.private_key.clone());
        let signature = signing_key
            .sign_prehash(digest)
            .map_err(|e| anyhow::anyhow!("rsa sign_prehash failed: {e}"))?;
        Ok(signature.to_vec())
    }
}

impl ArtifactSigner for RsaSigner {
    fn sign_digest(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        ensure!(
            digest.len() == algorithm.output_len(),
            "{algorithm} digest must be {} bytes, got {}",
            algorithm.output_len(),
            digest.len()
        );
        match algorithm {
            DigestAlgorithm::Sha256 => self.sign_with::<Sha256>(digest),
            DigestAlgorithm::Sha384 => self.sign_with::<Sha384>(digest),
            DigestAlgorithm::Sha512 => self.sign_with::<Sha512>(digest),
        }
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.private_key
            .to_public_key()
            .to_public_key_der()
            .map(|der| der.into_vec())
            .unwrap_or_default()
    }

    fn algorithm(&self) -> &str {
        "rsa-pkcs1v15"
    }
}
