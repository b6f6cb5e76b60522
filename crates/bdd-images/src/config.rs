//! Configuration for image capture and gallery generation.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LOGS` | Run log root; gallery assets are provisioned under it | unset (no assets) |
//! | `BDD_IMAGES_PUBLISH` | `always`, `only_on_failure` or `never` | `only_on_failure` |
//! | `BDD_IMAGES_KEY_MODE` | `index` or `step_line` | `index` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Environment variable naming the run's log root directory
pub const ENV_LOG_ROOT: &str = "LOGS";

/// Environment variable selecting the default publish condition
pub const ENV_PUBLISH_CONDITION: &str = "BDD_IMAGES_PUBLISH";

/// Environment variable selecting the attachment key mode
pub const ENV_KEY_MODE: &str = "BDD_IMAGES_KEY_MODE";

/// Directory (under the log root) holding shared gallery scripts and styles
pub const DEFAULT_ASSETS_DIR: &str = "image_attachments_utils";

/// How long a process waits for the asset lock before giving up
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling interval while waiting for the asset lock
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// When captured images are persisted and rendered at scenario end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishCondition {
    /// Every scenario
    Always,
    /// Only failed or errored scenarios
    #[default]
    OnlyOnFailure,
    /// Never
    Never,
}

impl PublishCondition {
    /// Whether a scenario with the given outcome gets its images published
    #[must_use]
    pub const fn should_publish(self, scenario_failed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::OnlyOnFailure => scenario_failed,
            Self::Never => false,
        }
    }

    /// Canonical lower-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OnlyOnFailure => "only_on_failure",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for PublishCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always" => Ok(Self::Always),
            "only_on_failure" | "on_failure" => Ok(Self::OnlyOnFailure),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown publish condition '{other}'")),
        }
    }
}

/// How attachment keys (and therefore image filenames) are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// `0001`, `0002`, ...
    #[default]
    Index,
    /// `00012_0001`: source line of the current step, then the image index
    StepLine,
}

impl KeyMode {
    /// Build the key for an image
    #[must_use]
    pub fn key(self, step_line: u32, index: u32) -> String {
        match self {
            Self::Index => format!("{index:04}"),
            Self::StepLine => format!("{step_line:05}_{index:04}"),
        }
    }
}

impl FromStr for KeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "index" => Ok(Self::Index),
            "step_line" | "line" => Ok(Self::StepLine),
            other => Err(format!("unknown key mode '{other}'")),
        }
    }
}

/// Plugin configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagesConfig {
    /// Publish condition given to every new scenario
    pub publish_condition: PublishCondition,
    /// Attachment key derivation
    pub key_mode: KeyMode,
    /// Run log root; `None` disables asset provisioning
    pub log_root: Option<PathBuf>,
    /// Name of the shared assets directory under the log root
    pub assets_dir_name: String,
    /// Maximum wait for the cross-process asset lock
    pub lock_timeout: Duration,
    /// Poll interval for the asset lock
    pub lock_retry_interval: Duration,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            publish_condition: PublishCondition::default(),
            key_mode: KeyMode::default(),
            log_root: None,
            assets_dir_name: DEFAULT_ASSETS_DIR.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
        }
    }
}

impl ImagesConfig {
    /// Create a configuration with defaults (environment ignored)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// Unparseable values are logged and replaced by the default.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.log_root = lookup(ENV_LOG_ROOT)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        if let Some(raw) = lookup(ENV_PUBLISH_CONDITION) {
            match raw.parse() {
                Ok(condition) => config.publish_condition = condition,
                Err(e) => warn!("{ENV_PUBLISH_CONDITION}: {e}, using {}", config.publish_condition),
            }
        }

        if let Some(raw) = lookup(ENV_KEY_MODE) {
            match raw.parse() {
                Ok(mode) => config.key_mode = mode,
                Err(e) => warn!("{ENV_KEY_MODE}: {e}, using index keys"),
            }
        }

        config
    }

    /// Set the default publish condition
    #[must_use]
    pub const fn with_publish_condition(mut self, condition: PublishCondition) -> Self {
        self.publish_condition = condition;
        self
    }

    /// Set the key mode
    #[must_use]
    pub const fn with_key_mode(mut self, mode: KeyMode) -> Self {
        self.key_mode = mode;
        self
    }

    /// Set the log root
    #[must_use]
    pub fn with_log_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.log_root = Some(root.into());
        self
    }

    /// Set the lock timeout
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Shared assets directory, when a log root is known
    #[must_use]
    pub fn assets_dir(&self) -> Option<PathBuf> {
        self.log_root
            .as_ref()
            .map(|root| root.join(&self.assets_dir_name))
    }
}
