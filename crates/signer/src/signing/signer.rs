use crate::digest::DigestAlgorithm;

/// Signs artifact digests with a single private key.
///
/// Implementations are sync since signing is CPU-bound. Callers on an async
/// runtime go through `spawn_blocking`.
pub trait ArtifactSigner: Send + Sync {
    /// Sign a digest produced with `algorithm`. Returns raw signature bytes.
    fn sign_digest(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Public key bytes (compressed SEC1 for secp256k1, SPKI DER for RSA).
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Algorithm identifier string (e.g. "secp256k1").
    fn algorithm(&self) -> &str;
}
