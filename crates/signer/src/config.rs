use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::digest::DigestAlgorithm;
use crate::format::ArtifactFormat;
use crate::signing::{ArtifactSigner, SigningAlgorithm};

const DEFAULT_MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Server configuration, loaded from a JSON file.
///
/// Read-only once loaded; request handlers share it through an `Arc`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    pub keys: BTreeMap<String, KeyConfig>,
    #[serde(skip)]
    path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    #[serde(skip)]
    name: String,
    pub algorithm: SigningAlgorithm,
    /// Environment variable holding the key seed. Only engines read it.
    pub seed_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether this key may answer with a patch instead of the full artifact.
    #[serde(default = "default_true")]
    pub patch: bool,
    #[serde(default)]
    pub digest: DigestAlgorithm,
    #[serde(default = "all_formats")]
    pub formats: Vec<ArtifactFormat>,
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn all_formats() -> Vec<ArtifactFormat> {
    ArtifactFormat::ALL.to_vec()
}

impl ServerConfig {
    /// Errors never mention `path`; engine failures are shown to remote
    /// callers.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context("reading signing configuration")?;
        Self::from_json(path, &text)
    }

    /// Parse `text` as if it had been read from `path`.
    pub fn from_json(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let path = path.into();
        let mut config: ServerConfig = serde_json::from_str(text)
            .context("parsing signing configuration")?;
        config.path = path;
        for (name, key) in config.keys.iter_mut() {
            key.name = name.clone();
            key.validate()?;
        }
        Ok(config)
    }

    /// Location engines are pointed at to load the same configuration.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self, name: &str) -> Option<&KeyConfig> {
        self.keys.get(name)
    }
}

impl KeyConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn allows(&self, format: ArtifactFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Build the signer from the seed in `seed_env`.
    pub fn load_signer(&self) -> Result<Box<dyn ArtifactSigner>> {
        let seed = std::env::var(&self.seed_env)
            .with_context(|| format!("key {}: seed variable {} is not set", self.name, self.seed_env))?;
        self.algorithm.signer_from_seed(&seed)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("key names must not be empty");
        }
        if self.seed_env.is_empty() {
            bail!("key {}: seed_env must not be empty", self.name);
        }
        if self.timeout_secs == 0 {
            bail!("key {}: timeout_secs must be greater than zero", self.name);
        }
        if self.formats.is_empty() {
            bail!("key {}: formats must list at least one format", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "max_body_bytes": 1024,
        "keys": {
            "release": {
                "algorithm": "secp256k1",
                "seed_env": "RELEASE_SEED",
                "timeout_secs": 5,
                "formats": ["cab", "pe"]
            },
            "legacy": {
                "algorithm": "rsa",
                "seed_env": "LEGACY_SEED",
                "patch": false,
                "digest": "sha512"
            }
        }
    }"#;

    #[test]
    fn parses_keys_with_defaults() {
        let config = ServerConfig::from_json("/etc/signer.json", CONFIG).unwrap();
        assert_eq!(config.path(), Path::new("/etc/signer.json"));
        assert_eq!(config.max_body_bytes, 1024);

        let release = config.key("release").unwrap();
        assert_eq!(release.name(), "release");
        assert_eq!(release.timeout(), Duration::from_secs(5));
        assert!(release.patch);
        assert_eq!(release.digest, DigestAlgorithm::Sha256);
        assert!(release.allows(ArtifactFormat::Cab));
        assert!(!release.allows(ArtifactFormat::Jar));

        let legacy = config.key("legacy").unwrap();
        assert_eq!(legacy.algorithm, SigningAlgorithm::Rsa);
        assert_eq!(legacy.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(!legacy.patch);
        assert_eq!(legacy.digest, DigestAlgorithm::Sha512);
        assert!(ArtifactFormat::ALL.iter().all(|f| legacy.allows(*f)));
    }

    #[test]
    fn load_errors_do_not_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("internal-signer.json");

        let missing = ServerConfig::load(&path).unwrap_err();
        assert!(!format!("{missing:#}").contains(dir.path().to_str().unwrap()), "{missing:#}");

        std::fs::write(&path, "{ not json").unwrap();
        let invalid = ServerConfig::load(&path).unwrap_err();
        let text = format!("{invalid:#}");
        assert!(text.starts_with("parsing signing configuration"), "{text}");
        assert!(!text.contains("internal-signer.json"), "{text}");
    }

    #[test]
    fn unknown_key_is_none() {
        let config = ServerConfig::from_json("signer.json", CONFIG).unwrap();
        assert!(config.key("missing").is_none());
    }

    #[test]
    fn rejects_zero_timeout() {
        let text = r#"{"keys":{"k":{"algorithm":"rsa","seed_env":"S","timeout_secs":0}}}"#;
        let err = ServerConfig::from_json("c.json", text).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let text = r#"{"keys":{},"listen":"0.0.0.0"}"#;
        assert!(ServerConfig::from_json("c.json", text).is_err());
    }

    #[test]
    fn missing_seed_variable_is_reported() {
        let text = r#"{"keys":{"k":{"algorithm":"secp256k1","seed_env":"SIGNER_TEST_UNSET_SEED_VAR"}}}"#;
        let config = ServerConfig::from_json("c.json", text).unwrap();
        let err = config.key("k").unwrap().load_signer().err().unwrap();
        assert!(err.to_string().contains("SIGNER_TEST_UNSET_SEED_VAR"));
    }
}
