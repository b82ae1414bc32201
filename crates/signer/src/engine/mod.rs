//! Signing engines: the component that holds key material and produces
//! signed output for one artifact.

mod local;
mod process;

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::config::ServerConfig;
use crate::digest::DigestDescriptor;
use crate::format::ArtifactFormat;
use crate::invoker::SubprocessOutcome;
use crate::signing::{SignOptions, sign_artifact};

pub use local::LocalEngine;
pub use process::ProcessEngine;

/// Everything an engine needs to know to sign one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub format: ArtifactFormat,
    pub config_path: PathBuf,
    pub key: String,
    pub patch: bool,
    pub digest: Option<DigestDescriptor>,
    /// Manifest alias; only set for JAR submissions.
    pub key_alias: Option<String>,
}

impl Invocation {
    /// Command line for an engine subprocess reading the artifact on stdin.
    pub fn argv(&self, program: impl Into<OsString>) -> Vec<OsString> {
        let mut argv: Vec<OsString> = vec![
            program.into(),
            self.format.operation().into(),
            "--config".into(),
            self.config_path.clone().into(),
            "--key".into(),
            self.key.clone().into(),
            "--file".into(),
            "-".into(),
        ];
        if self.patch {
            argv.push("--patch".into());
        }
        if let Some(digest) = &self.digest {
            argv.push("--digest".into());
            argv.push(digest.to_string().into());
        }
        if let Some(alias) = &self.key_alias {
            argv.push("--key-alias".into());
            argv.push(alias.into());
        }
        argv
    }
}

/// Capability to sign artifacts, one operation per format, selected by
/// [`Invocation::format`].
///
/// The outcome mirrors a process run whether or not a process was involved,
/// so dispatchers handle every engine the same way.
pub trait SigningEngine: Send + Sync {
    fn sign(
        &self,
        invocation: Invocation,
        input: Bytes,
        deadline: Duration,
    ) -> BoxFuture<'_, io::Result<SubprocessOutcome>>;
}

/// Sign `input` as described by `invocation`, loading key material from the
/// environment. Shared by the engine subcommands and [`LocalEngine`].
pub fn execute(config: &ServerConfig, invocation: &Invocation, input: &[u8]) -> Result<Vec<u8>> {
    let key = config
        .key(&invocation.key)
        .with_context(|| format!("key not found: {}", invocation.key))?;
    if !key.allows(invocation.format) {
        anyhow::bail!("key {} is not configured for {} artifacts", key.name(), invocation.format);
    }
    let signer = key.load_signer()?;
    let options = SignOptions {
        format: invocation.format,
        digest_algorithm: key.digest,
        expected_digest: invocation.digest.clone(),
        key_alias: invocation.key_alias.clone(),
        patch: invocation.patch,
    };
    sign_artifact(signer.as_ref(), input, &options)
}
