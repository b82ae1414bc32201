use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(DigestParseError::UnknownAlgorithm(s.to_string())),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha384(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Digest of a submission, handed to engines as `<algorithm>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestDescriptor {
    pub algorithm: DigestAlgorithm,
    pub bytes: Vec<u8>,
}

impl DigestDescriptor {
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        Self {
            algorithm,
            bytes: hasher.finalize(),
        }
    }
}

impl fmt::Display for DigestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, hex::encode(&self.bytes))
    }
}

impl FromStr for DigestDescriptor {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, digest) = s
            .split_once(':')
            .ok_or_else(|| DigestParseError::Malformed(s.to_string()))?;
        let algorithm: DigestAlgorithm = algorithm.parse()?;
        let bytes = hex::decode(digest).map_err(|_| DigestParseError::Malformed(s.to_string()))?;
        if bytes.len() != algorithm.output_len() {
            return Err(DigestParseError::WrongLength {
                algorithm,
                len: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestParseError {
    #[error("unknown digest algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("expected `<algorithm>:<hex>`, got `{0}`")]
    Malformed(String),
    #[error("{algorithm} digest must be {} bytes, got {len}", algorithm.output_len())]
    WrongLength { algorithm: DigestAlgorithm, len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ReadBodyError {
    #[error("body exceeds {0} bytes")]
    TooLarge(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Drain `stream`, hashing it on the way through.
///
/// The bytes are kept so the same submission can still be piped to the
/// engine after its digest is known.
pub async fn precompute<R>(
    stream: &mut R,
    algorithm: DigestAlgorithm,
    limit: u64,
) -> Result<(Bytes, DigestDescriptor), ReadBodyError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = algorithm.hasher();
    let body = drain(stream, limit, |chunk| hasher.update(chunk)).await?;
    let descriptor = DigestDescriptor {
        algorithm,
        bytes: hasher.finalize(),
    };
    Ok((body, descriptor))
}

/// Drain `stream` into memory, failing once it grows past `limit` bytes.
pub async fn read_limited<R>(stream: &mut R, limit: u64) -> Result<Bytes, ReadBodyError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    drain(stream, limit, |_| {}).await
}

async fn drain<R, F>(stream: &mut R, limit: u64, mut observe: F) -> Result<Bytes, ReadBodyError>
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(&[u8]),
{
    let mut body = BytesMut::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if body.len() as u64 + n as u64 > limit {
            return Err(ReadBodyError::TooLarge(limit));
        }
        observe(&chunk[..n]);
        body.extend_from_slice(&chunk[..n]);
    }
    Ok(body.freeze())
}
