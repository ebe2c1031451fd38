//! TOML configuration for a wiki deployment.
//!
//! ```toml
//! repository = "/var/lib/wiki/repo"
//! email_domain = "example.com"
//!
//! [merge]
//! tool = "/usr/bin/merge"
//! timeout_secs = 10
//! ```
//!
//! Every field beyond the repository path has a default, so a minimal
//! config is a single line.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::merge::{Diff3Driver, ExternalMergeDriver, MergeDriver};
use crate::storage::Author;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WikiConfig {
    /// where the git repository lives
    pub repository: PathBuf,

    /// domain used to synthesize commit author e-mail addresses
    #[serde(default = "default_email_domain")]
    pub email_domain: String,

    #[serde(default)]
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// external merge(1) compatible tool; the in-process driver is used
    /// when unset
    #[serde(default)]
    pub tool: Option<PathBuf>,

    #[serde(default = "default_merge_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            tool: None,
            timeout_secs: default_merge_timeout_secs(),
        }
    }
}

fn default_email_domain() -> String {
    "localhost".to_string()
}

fn default_merge_timeout_secs() -> u64 {
    10
}

impl WikiConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// author identity for a logged-in user id
    pub fn author(&self, user_id: &str) -> Author {
        Author::from_id(user_id, &self.email_domain)
    }

    /// the merge driver this deployment is configured for
    pub fn merge_driver(&self) -> Arc<dyn MergeDriver> {
        match &self.merge.tool {
            Some(tool) => Arc::new(ExternalMergeDriver::new(
                tool.clone(),
                Duration::from_secs(self.merge.timeout_secs),
            )),
            None => Arc::new(Diff3Driver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = WikiConfig::from_toml_str(r#"repository = "/tmp/wiki""#).unwrap();
        assert_eq!(config.repository, PathBuf::from("/tmp/wiki"));
        assert_eq!(config.email_domain, "localhost");
        assert!(config.merge.tool.is_none());
        assert_eq!(config.merge.timeout_secs, 10);
    }

    #[test]
    fn test_full_config() {
        let config = WikiConfig::from_toml_str(
            r#"
            repository = "/var/lib/wiki/repo"
            email_domain = "example.com"

            [merge]
            tool = "/usr/bin/merge"
            timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.email_domain, "example.com");
        assert_eq!(config.merge.tool, Some(PathBuf::from("/usr/bin/merge")));
        assert_eq!(config.merge.timeout_secs, 3);
    }

    #[test]
    fn test_author_synthesis() {
        let config = WikiConfig::from_toml_str(
            r#"
            repository = "/tmp/wiki"
            email_domain = "example.com"
            "#,
        )
        .unwrap();
        let author = config.author("alice");
        assert_eq!(author.name, "alice");
        assert_eq!(author.email, "alice@example.com");
    }

    #[test]
    fn test_missing_repository_is_an_error() {
        assert!(matches!(
            WikiConfig::from_toml_str("email_domain = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = WikiConfig::from_toml_str(
            r#"
            repository = "/tmp/wiki"
            repo_path = "/oops/typo"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
