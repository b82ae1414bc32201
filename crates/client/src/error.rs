use std::io;

use binpatch::PatchError;
use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Input(String),
    #[error("remote signing failed ({status}): {message}")]
    Remote { status: StatusCode, message: String },
    #[error("invalid patch from server: {0}")]
    Format(String),
    #[error("failed to apply patch: {0}")]
    Apply(String),
    #[error("request to signing server failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("reading signing server response: {0}")]
    Http(#[from] hyper::Error),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ClientError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<PatchError> for ClientError {
    fn from(error: PatchError) -> Self {
        match error {
            PatchError::Format(message) => Self::Format(message),
            PatchError::Apply(message) => Self::Apply(message),
            PatchError::Io(source) => Self::io("writing patched artifact", source),
        }
    }
}
