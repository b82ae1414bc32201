use std::pin::Pin;
use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use eyre::WrapErr;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::config::{KeyConfig, ServerConfig};
use crate::digest::{self, DigestAlgorithm};
use crate::engine::{Invocation, SigningEngine};
use crate::error::SigningError;
use crate::format::ArtifactFormat;

pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// One signing submission. Consumed by [`Dispatcher::handle`].
pub struct SigningRequest {
    pub filename: String,
    pub format: ArtifactFormat,
    /// Caller can apply a patch instead of receiving the whole artifact.
    pub patch: bool,
    /// Overrides the key's digest algorithm for formats that need one.
    pub digest: Option<DigestAlgorithm>,
    pub key_alias: Option<String>,
    pub body: BodyReader,
}

/// What the engine produced, tagged by how the client must treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningResponse {
    Patch(Bytes),
    FullArtifact { media_type: &'static str, body: Bytes },
}

impl SigningResponse {
    pub fn media_type(&self) -> &'static str {
        match self {
            SigningResponse::Patch(_) => binpatch::MIME_TYPE,
            SigningResponse::FullArtifact { media_type, .. } => *media_type,
        }
    }
}

impl IntoResponse for SigningResponse {
    fn into_response(self) -> Response {
        let media_type = self.media_type();
        let body = match self {
            SigningResponse::Patch(body) | SigningResponse::FullArtifact { body, .. } => body,
        };
        (StatusCode::OK, [(header::CONTENT_TYPE, media_type)], body).into_response()
    }
}

/// Turns signing requests into engine invocations and engine outcomes into
/// responses.
pub struct Dispatcher {
    config: Arc<ServerConfig>,
    engine: Arc<dyn SigningEngine>,
}

impl Dispatcher {
    pub fn new(config: Arc<ServerConfig>, engine: Arc<dyn SigningEngine>) -> Self {
        Self { config, engine }
    }

    pub async fn handle(
        &self,
        request: SigningRequest,
        key: &KeyConfig,
    ) -> Result<SigningResponse, SigningError> {
        let SigningRequest {
            filename,
            format,
            patch,
            digest: requested_digest,
            key_alias,
            mut body,
        } = request;

        if !key.allows(format) {
            return Err(SigningError::BadRequest(format!(
                "key {} does not sign {format} artifacts",
                key.name()
            )));
        }
        let patch = patch && key.patch;
        let limit = self.config.max_body_bytes;

        // The digest rides along as an argument; the engine still gets every
        // byte so it can check the two agree.
        let (input, digest) = if format.needs_digest() {
            let algorithm = requested_digest.unwrap_or(key.digest);
            let (input, descriptor) = digest::precompute(&mut body, algorithm, limit).await?;
            (input, Some(descriptor))
        } else {
            (digest::read_limited(&mut body, limit).await?, None)
        };

        let invocation = Invocation {
            format,
            config_path: self.config.path().to_path_buf(),
            key: key.name().to_string(),
            patch,
            digest,
            key_alias: key_alias.filter(|_| format == ArtifactFormat::Jar),
        };
        debug!(%filename, key = key.name(), %format, patch, bytes = input.len(), "invoking signing engine");

        let deadline = key.timeout();
        let outcome = self
            .engine
            .sign(invocation, input, deadline)
            .await
            .wrap_err("running signing engine")?;

        if outcome.timed_out {
            warn!(%filename, key = key.name(), ?deadline, "signing engine timed out");
            return Err(SigningError::Timeout(deadline));
        }
        if !outcome.success() {
            let diagnostic = outcome.diagnostic();
            warn!(%filename, key = key.name(), exit_code = ?outcome.exit_code, %diagnostic, "signing engine failed");
            return Err(SigningError::Engine(public_diagnostic(&diagnostic)));
        }

        info!(target: "audit", %filename, key = key.name(), "Signed package");

        let body = Bytes::from(outcome.stdout);
        Ok(if patch {
            SigningResponse::Patch(body)
        } else {
            SigningResponse::FullArtifact {
                media_type: format.media_type(),
                body,
            }
        })
    }
}

/// First line of an engine diagnostic with every path-like word replaced by
/// `<path>`. The full text stays in the server log.
fn public_diagnostic(diagnostic: &str) -> String {
    let line = diagnostic.lines().next().unwrap_or_default();
    line.split(' ')
        .map(|word| {
            let bare = word.trim_end_matches([':', ',', ';', '.', ')', '"', '\'']);
            if bare.contains(['/', '\\']) {
                format!("<path>{}", &word[bare.len()..])
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
