use std::path::{Path, PathBuf};

use crate::error::ClientError;

/// Where the signed artifact ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Replace the source file.
    InPlace,
    File(PathBuf),
    Stdout,
}

/// Everything one signing call needs, fixed before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    key: String,
    source: PathBuf,
    filename: String,
    destination: Destination,
    key_alias: Option<String>,
}

impl SignRequest {
    /// `output` of `None` or the source path itself signs in place, `-`
    /// writes to stdout.
    pub fn new(
        source: impl Into<PathBuf>,
        key: impl Into<String>,
        output: Option<&str>,
    ) -> Result<Self, ClientError> {
        let source = source.into();
        let key = key.into();

        if source.as_os_str().is_empty() {
            return Err(ClientError::Input("--file and --key are required".into()));
        }
        if key.trim().is_empty() {
            return Err(ClientError::Input("--file and --key are required".into()));
        }
        let filename = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::Input(format!("{} does not name a file", source.display()))
            })?
            .to_string();

        let destination = match output {
            None | Some("") => Destination::InPlace,
            Some("-") => Destination::Stdout,
            Some(path) if Path::new(path) == source => Destination::InPlace,
            Some(path) => Destination::File(PathBuf::from(path)),
        };

        Ok(Self {
            key,
            source,
            filename,
            destination,
            key_alias: None,
        })
    }

    /// Manifest alias for signed JARs. Ignored for every other format.
    pub fn with_key_alias(mut self, alias: impl Into<String>) -> Self {
        if self.is_jar() {
            self.key_alias = Some(alias.into());
        }
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Base name sent to the server; the full path never leaves this host.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn key_alias(&self) -> Option<&str> {
        self.key_alias.as_deref()
    }

    /// Path the signed artifact is written to, if it goes to a file.
    pub fn output_path(&self) -> Option<&Path> {
        match &self.destination {
            Destination::InPlace => Some(&self.source),
            Destination::File(path) => Some(path),
            Destination::Stdout => None,
        }
    }

    fn is_jar(&self) -> bool {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
    }
}
