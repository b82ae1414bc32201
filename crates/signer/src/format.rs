use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Artifact family. Selects the engine operation and the native media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Cab,
    Jar,
    Pe,
    Blob,
}

impl ArtifactFormat {
    pub const ALL: [ArtifactFormat; 4] = [
        ArtifactFormat::Cab,
        ArtifactFormat::Jar,
        ArtifactFormat::Pe,
        ArtifactFormat::Blob,
    ];

    /// Infer the format from a file name's extension. Unknown extensions
    /// are treated as opaque blobs.
    pub fn from_filename(filename: &str) -> Self {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("cab") => ArtifactFormat::Cab,
            Some("jar" | "war" | "ear") => ArtifactFormat::Jar,
            Some("exe" | "dll" | "sys" | "msi") => ArtifactFormat::Pe,
            _ => ArtifactFormat::Blob,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactFormat::Cab => "cab",
            ArtifactFormat::Jar => "jar",
            ArtifactFormat::Pe => "pe",
            ArtifactFormat::Blob => "blob",
        }
    }

    /// Engine subcommand that signs this format.
    pub fn operation(self) -> &'static str {
        match self {
            ArtifactFormat::Cab => "sign-cab",
            ArtifactFormat::Jar => "sign-jar",
            ArtifactFormat::Pe => "sign-pe",
            ArtifactFormat::Blob => "sign-blob",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ArtifactFormat::Cab => "application/vnd.ms-cab-compressed",
            ArtifactFormat::Jar => "application/java-archive",
            ArtifactFormat::Pe => "application/vnd.microsoft.portable-executable",
            ArtifactFormat::Blob => "application/octet-stream",
        }
    }

    /// Authenticode-style formats sign a digest computed up front.
    pub fn needs_digest(self) -> bool {
        matches!(self, ArtifactFormat::Cab | ArtifactFormat::Pe)
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
