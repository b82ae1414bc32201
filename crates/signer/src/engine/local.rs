use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::time::timeout;
use tracing::warn;

use super::{Invocation, SigningEngine, execute};
use crate::config::ServerConfig;
use crate::invoker::SubprocessOutcome;

/// Signs on the blocking thread pool of the server process itself.
///
/// Produces the same outcomes as [`super::ProcessEngine`] without paying for a
/// process per request. A job that overruns its deadline is reported as timed
/// out; the blocking thread is left to finish on its own.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    config: Arc<ServerConfig>,
}

impl LocalEngine {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }
}

impl SigningEngine for LocalEngine {
    fn sign(
        &self,
        invocation: Invocation,
        input: Bytes,
        deadline: Duration,
    ) -> BoxFuture<'_, io::Result<SubprocessOutcome>> {
        let config = Arc::clone(&self.config);
        Box::pin(async move {
            let job = tokio::task::spawn_blocking(move || execute(&config, &invocation, &input));
            match timeout(deadline, job).await {
                Ok(Ok(Ok(stdout))) => Ok(SubprocessOutcome {
                    exit_code: Some(0),
                    stdout,
                    stderr: Vec::new(),
                    timed_out: false,
                }),
                Ok(Ok(Err(err))) => Ok(SubprocessOutcome {
                    exit_code: Some(1),
                    stdout: Vec::new(),
                    stderr: format!("{err:#}").into_bytes(),
                    timed_out: false,
                }),
                Ok(Err(join_err)) => Err(io::Error::other(join_err)),
                Err(_) => {
                    warn!(?deadline, "in-process signing exceeded deadline");
                    Ok(SubprocessOutcome::timed_out())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{DigestAlgorithm, DigestDescriptor};
    use crate::format::ArtifactFormat;
    use crate::signing::SignatureTrailer;
    use std::path::PathBuf;

    const SEED_VAR: &str = "SIGNER_LOCAL_ENGINE_TEST_SEED";

    fn engine() -> LocalEngine {
        // SAFETY: tests in this module only ever set this one variable to
        // the same value.
        unsafe { std::env::set_var(SEED_VAR, "local-engine-seed") };
        let text = format!(
            r#"{{"keys":{{"release":{{"algorithm":"secp256k1","seed_env":"{SEED_VAR}","formats":["blob","cab"]}}}}}}"#
        );
        LocalEngine::new(Arc::new(ServerConfig::from_json("signer.json", &text).unwrap()))
    }

    fn invocation(format: ArtifactFormat) -> Invocation {
        Invocation {
            format,
            config_path: PathBuf::from("signer.json"),
            key: "release".into(),
            patch: false,
            digest: None,
            key_alias: None,
        }
    }

    #[tokio::test]
    async fn signs_in_process() {
        let outcome = engine()
            .sign(invocation(ArtifactFormat::Blob), Bytes::from_static(b"hello"), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(outcome.success(), "{}", outcome.diagnostic());
        let (offset, trailer) = SignatureTrailer::find(&outcome.stdout).unwrap();
        assert_eq!(offset, 5);
        assert_eq!(trailer.format, ArtifactFormat::Blob);
    }

    #[tokio::test]
    async fn digest_mismatch_fails_like_a_process() {
        let mut invocation = invocation(ArtifactFormat::Cab);
        invocation.digest = Some(DigestDescriptor::compute(DigestAlgorithm::Sha256, b"other"));
        let outcome = engine()
            .sign(invocation, Bytes::from_static(b"hello"), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.diagnostic().contains("digest mismatch"));
    }

    #[tokio::test]
    async fn unsupported_format_fails() {
        let outcome = engine()
            .sign(invocation(ArtifactFormat::Jar), Bytes::from_static(b"PK"), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!outcome.success());
        assert!(outcome.diagnostic().contains("not configured for jar"));
    }
}
