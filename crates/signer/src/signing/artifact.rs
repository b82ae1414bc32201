//! Format-agnostic signing routine used by the bundled engine.
//!
//! The artifact is left intact and a signature trailer is appended to it.
//! Real CAB/JAR/PE embedding is left to dedicated engines.

use anyhow::{Context, Result, bail};
use binpatch::Patch;
use serde::{Deserialize, Serialize};

use super::signer::ArtifactSigner;
use crate::digest::{DigestAlgorithm, DigestDescriptor};
use crate::format::ArtifactFormat;

pub const TRAILER_BEGIN: &[u8] = b"\n-----BEGIN ARTIFACT SIGNATURE-----\n";
pub const TRAILER_END: &[u8] = b"\n-----END ARTIFACT SIGNATURE-----\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTrailer {
    pub format: ArtifactFormat,
    pub algorithm: String,
    /// `<algorithm>:<hex>` digest of the unsigned artifact.
    pub digest: String,
    pub public_key: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<String>,
}

impl SignatureTrailer {
    fn encode(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self).context("serializing signature trailer")?;
        let mut out = Vec::with_capacity(TRAILER_BEGIN.len() + json.len() + TRAILER_END.len());
        out.extend_from_slice(TRAILER_BEGIN);
        out.extend_from_slice(&json);
        out.extend_from_slice(TRAILER_END);
        Ok(out)
    }

    /// Find the last trailer in `signed`. Returns the offset the trailer
    /// starts at, which is also the length of the artifact it signs.
    pub fn find(signed: &[u8]) -> Option<(usize, SignatureTrailer)> {
        let body = signed.strip_suffix(TRAILER_END)?;
        let start = body
            .windows(TRAILER_BEGIN.len())
            .rposition(|window| window == TRAILER_BEGIN)?;
        let trailer = serde_json::from_slice(&body[start + TRAILER_BEGIN.len()..]).ok()?;
        Some((start, trailer))
    }
}

#[derive(Debug, Clone)]
pub struct SignOptions {
    pub format: ArtifactFormat,
    /// Used when no expected digest is supplied.
    pub digest_algorithm: DigestAlgorithm,
    /// Digest the caller computed before handing the bytes over. The input
    /// must hash to exactly this value.
    pub expected_digest: Option<DigestDescriptor>,
    pub key_alias: Option<String>,
    /// Emit an encoded [`Patch`] instead of the full signed artifact.
    pub patch: bool,
}

/// Sign `artifact` and return what the engine writes to its output: either
/// the signed artifact or an encoded patch producing it.
pub fn sign_artifact(
    signer: &dyn ArtifactSigner,
    artifact: &[u8],
    options: &SignOptions,
) -> Result<Vec<u8>> {
    let algorithm = options
        .expected_digest
        .as_ref()
        .map_or(options.digest_algorithm, |expected| expected.algorithm);
    let digest = DigestDescriptor::compute(algorithm, artifact);

    if let Some(expected) = &options.expected_digest {
        if *expected != digest {
            bail!("digest mismatch: request carried {expected}, input hashes to {digest}");
        }
    }

    let signature = signer
        .sign_digest(algorithm, &digest.bytes)
        .context("signing artifact digest")?;

    let trailer = SignatureTrailer {
        format: options.format,
        algorithm: signer.algorithm().to_string(),
        digest: digest.to_string(),
        public_key: hex::encode(signer.public_key_bytes()),
        signature: hex::encode(signature),
        key_alias: options.key_alias.clone(),
    }
    .encode()?;

    let mut signed = Vec::with_capacity(artifact.len() + trailer.len());
    signed.extend_from_slice(artifact);
    signed.extend_from_slice(&trailer);

    if options.patch {
        Ok(Patch::between(artifact, &signed).encode())
    } else {
        Ok(signed)
    }
}
