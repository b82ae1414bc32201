use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use binpatch::{MIME_TYPE, Patch};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::spawn_blocking;
use tracing::debug;
use url::Url;

use crate::error::ClientError;
use crate::request::{Destination, SignRequest};

/// Body of a successful signing response, classified by its content type.
pub enum SignedPayload {
    Patch(Bytes),
    FullArtifact(Incoming),
}

impl SignedPayload {
    async fn from_response(response: Response<Incoming>) -> Result<Self, ClientError> {
        if is_patch(response.headers()) {
            let bytes = response.into_body().collect().await?.to_bytes();
            Ok(Self::Patch(bytes))
        } else {
            Ok(Self::FullArtifact(response.into_body()))
        }
    }
}

fn is_patch(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(MIME_TYPE))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    /// The server sent a patch that was applied to the local file.
    Patched,
    /// The server sent the whole signed artifact.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed {
    pub source: PathBuf,
    pub destination: Destination,
    pub mode: SignMode,
    pub bytes_written: u64,
}

/// Client for a signing server reachable over plain HTTP.
pub struct RemoteSigner {
    base: Url,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl RemoteSigner {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|err| ClientError::Input(format!("invalid server url {base_url}: {err}")))?;
        if base.scheme() != "http" {
            return Err(ClientError::Input(format!(
                "unsupported url scheme {}, expected http",
                base.scheme()
            )));
        }
        if base.cannot_be_a_base() {
            return Err(ClientError::Input(format!("invalid server url {base_url}")));
        }

        // An upload is never resent; the server may already have signed it.
        let client = Client::builder(TokioExecutor::new())
            .retry_canceled_requests(false)
            .build_http();
        Ok(Self { base, client })
    }

    /// Upload the source file, then apply whatever comes back.
    ///
    /// The destination is either untouched or holds the complete signed
    /// artifact when this returns.
    pub async fn sign(&self, request: &SignRequest) -> Result<Signed, ClientError> {
        let in_place = *request.destination() == Destination::InPlace;
        let source_path = request.source().to_path_buf();
        let (source, content) = spawn_blocking(move || read_source(&source_path, in_place))
            .await
            .map_err(|err| ClientError::io("reading source file", io::Error::other(err)))?
            .map_err(|err| {
                ClientError::io(format!("reading {}", request.source().display()), err)
            })?;

        let uri = self.sign_uri(request)?;
        debug!(%uri, bytes = content.len(), "Uploading artifact");

        let http_request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Full::new(Bytes::from(content)))
            .map_err(|err| ClientError::Input(err.to_string()))?;

        let response = self.client.request(http_request).await?;
        let status = response.status();
        debug!(%status, headers = ?response.headers(), "Signing server responded");

        if !status.is_success() {
            let body = response.into_body().collect().await?.to_bytes();
            return Err(ClientError::Remote {
                status,
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let (mode, bytes_written) = match SignedPayload::from_response(response).await? {
            SignedPayload::Patch(bytes) => {
                let patch = Patch::decode(&bytes)?;
                debug!(ops = patch.ops().len(), "Applying patch");
                let target = request.output_path().map(Path::to_path_buf);
                let written = apply_patch(patch, source, target).await?;
                (SignMode::Patched, written)
            }
            SignedPayload::FullArtifact(body) => {
                drop(source);
                let written = match request.output_path() {
                    Some(path) => replace_file(body, path).await?,
                    None => {
                        let mut stdout = tokio::io::stdout();
                        stream_body(body, &mut stdout).await?
                    }
                };
                (SignMode::Replaced, written)
            }
        };

        Ok(Signed {
            source: request.source().to_path_buf(),
            destination: request.destination().clone(),
            mode,
            bytes_written,
        })
    }

    fn sign_uri(&self, request: &SignRequest) -> Result<Uri, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Input(format!("invalid server url {}", self.base)))?
            .pop_if_empty()
            .push("sign");
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("key", request.key())
                .append_pair("filename", request.filename())
                .append_pair("patch", "true");
            if let Some(alias) = request.key_alias() {
                query.append_pair("key_alias", alias);
            }
        }
        url.as_str()
            .parse()
            .map_err(|err| ClientError::Input(format!("invalid server url {url}: {err}")))
    }
}

fn read_source(path: &Path, writable: bool) -> io::Result<(File, Vec<u8>)> {
    let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    file.seek(SeekFrom::Start(0))?;
    Ok((file, content))
}

async fn apply_patch(
    patch: Patch,
    mut source: File,
    target: Option<PathBuf>,
) -> Result<u64, ClientError> {
    match target {
        // The source handle may point at `path`: the result only replaces it
        // on rename.
        Some(path) => spawn_blocking(move || patch.apply_to_path(&mut source, &path))
            .await
            .map_err(|err| ClientError::io("applying patch", io::Error::other(err)))?
            .map_err(ClientError::from),
        None => {
            let signed = spawn_blocking(move || {
                let mut out = Vec::new();
                patch.apply(&mut source, &mut out).map(|_| out)
            })
            .await
            .map_err(|err| ClientError::io("applying patch", io::Error::other(err)))??;

            let mut stdout = tokio::io::stdout();
            write_stdout(&mut stdout, &signed).await?;
            Ok(signed.len() as u64)
        }
    }
}

async fn write_stdout<W>(out: &mut W, data: &[u8]) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(data)
        .await
        .map_err(|err| ClientError::io("writing to stdout", err))?;
    out.flush()
        .await
        .map_err(|err| ClientError::io("writing to stdout", err))
}

/// Stream `body` into a temp file next to `destination`, then rename it over
/// `destination`. The temp file is removed on any error.
async fn replace_file(body: Incoming, destination: &Path) -> Result<u64, ClientError> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)
        .map_err(|err| ClientError::io(format!("creating temp file in {}", dir.display()), err))?;
    let (file, temp_path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let written = stream_body(body, &mut file).await?;

    let context = || format!("writing {}", destination.display());
    file.sync_all()
        .await
        .map_err(|err| ClientError::io(context(), err))?;
    if let Ok(meta) = tokio::fs::metadata(destination).await {
        file.set_permissions(meta.permissions())
            .await
            .map_err(|err| ClientError::io(context(), err))?;
    }
    drop(file);

    temp_path
        .persist(destination)
        .map_err(|err| ClientError::io(context(), err.error))?;
    Ok(written)
}

async fn stream_body<W>(mut body: Incoming, out: &mut W) -> Result<u64, ClientError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Ok(data) = frame.into_data() {
            out.write_all(&data)
                .await
                .map_err(|err| ClientError::io("writing signed artifact", err))?;
            written += data.len() as u64;
        }
    }
    out.flush()
        .await
        .map_err(|err| ClientError::io("writing signed artifact", err))?;
    Ok(written)
}
