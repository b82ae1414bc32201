mod artifact;
mod rsa;
mod secp256k1;
mod signer;

use serde::{Deserialize, Serialize};

pub use artifact::{SignOptions, SignatureTrailer, TRAILER_BEGIN, TRAILER_END, sign_artifact};
pub use secp256k1::Secp256k1Signer;
pub use self::rsa::RsaSigner;
pub use signer::ArtifactSigner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningAlgorithm {
    Secp256k1,
    Rsa,
}

impl SigningAlgorithm {
    pub fn signer_from_seed(self, seed: &str) -> anyhow::Result<Box<dyn ArtifactSigner>> {
        let signer: Box<dyn ArtifactSigner> = match self {
            SigningAlgorithm::Secp256k1 => Box::new(Secp256k1Signer::from_seed(seed)?),
            SigningAlgorithm::Rsa => Box::new(RsaSigner::from_seed(seed)?),
        };
        Ok(signer)
    }
}
