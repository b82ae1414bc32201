use std::io;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;
use tracing::info;

use crate::config::ServerConfig;
use crate::digest::DigestAlgorithm;
use crate::dispatch::{Dispatcher, SigningRequest, SigningResponse};
use crate::engine::SigningEngine;
use crate::error::SigningError;
use crate::format::ArtifactFormat;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, engine: Arc<dyn SigningEngine>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&config), engine));
        Self { config, dispatcher }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(|| async move { (StatusCode::OK, "Ok").into_response() }))
        .route("/sign", post(sign_handler))
        .with_state(state)
}

pub async fn run(host: String, port: u16, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!(addr = %listener.local_addr()?, keys = state.config.keys.len(), "signing server listening");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignQuery {
    pub key: String,
    pub filename: String,
    pub format: Option<ArtifactFormat>,
    #[serde(default = "default_patch")]
    pub patch: bool,
    pub digest: Option<DigestAlgorithm>,
    pub key_alias: Option<String>,
}

fn default_patch() -> bool {
    true
}

async fn sign_handler(
    State(state): State<AppState>,
    Query(query): Query<SignQuery>,
    body: Body,
) -> Result<SigningResponse, SigningError> {
    if query.key.is_empty() {
        return Err(SigningError::BadRequest("key must not be empty".into()));
    }
    validate_filename(&query.filename)?;

    let key = state
        .config
        .key(&query.key)
        .ok_or_else(|| SigningError::UnknownKey(query.key.clone()))?;
    let format = query
        .format
        .unwrap_or_else(|| ArtifactFormat::from_filename(&query.filename));

    let stream = body.into_data_stream().map_err(io::Error::other);
    let request = SigningRequest {
        filename: query.filename,
        format,
        patch: query.patch,
        digest: query.digest,
        key_alias: query.key_alias,
        body: Box::pin(StreamReader::new(stream)),
    };

    state.dispatcher.handle(request, key).await
}

/// Filenames are base names only; they end up in audit records.
fn validate_filename(filename: &str) -> Result<(), SigningError> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(SigningError::BadRequest(format!(
            "filename must be a base name, got {filename:?}"
        )));
    }
    Ok(())
}
