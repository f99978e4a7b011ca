use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TollgateError;

/// Top-level configuration loaded from `.tollgate.toml`.
///
/// Supports layered resolution: CLI flags > local config > defaults.
///
/// # Examples
///
/// ```
/// use tollgate_core::TollgateConfig;
///
/// let config = TollgateConfig::default();
/// assert_eq!(config.service.branch, "master");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Build service connection and trigger settings.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl TollgateConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Io`] if the file cannot be read, or
    /// [`TollgateError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, TollgateError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Toml`] if parsing fails, or
    /// [`TollgateError::Config`] if a value is unusable.
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate_core::TollgateConfig;
    ///
    /// let toml = r#"
    /// [service]
    /// branch = "main"
    /// "#;
    /// let config = TollgateConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.service.branch, "main");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, TollgateError> {
        let config: Self = toml::from_str(content)?;
        config.service.validate()?;
        Ok(config)
    }
}

/// Build service settings.
///
/// # Examples
///
/// ```
/// use tollgate_core::ServiceConfig;
///
/// let config = ServiceConfig::default();
/// assert_eq!(config.base_url, "https://app.wercker.com");
/// assert_eq!(config.trigger_message, "auto-triggered-002");
/// assert!(config.timeout_secs.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Scheme and host of the build service; `/api/v3` is appended per call.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Branch used when a new run has to be triggered.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Message attached to triggered runs.
    #[serde(default = "default_trigger_message")]
    pub trigger_message: String,
    /// Request timeout. Unset means the HTTP client default.
    pub timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "https://app.wercker.com".into()
}

fn default_branch() -> String {
    "master".into()
}

fn default_trigger_message() -> String {
    "auto-triggered-002".into()
}

impl ServiceConfig {
    /// Check that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<(), TollgateError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(TollgateError::Config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.branch.trim().is_empty() {
            return Err(TollgateError::Config("branch must not be empty".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(TollgateError::Config(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            branch: default_branch(),
            trigger_message: default_trigger_message(),
            timeout_secs: None,
        }
    }
}
