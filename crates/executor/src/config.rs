//! Executor configuration

use serde::{Deserialize, Serialize};

use cadence_common::error::{CommonError, CommonResult};

use crate::error::{ExecutorError, ExecutorResult};

const DEFAULT_NAME: &str = "cadence";

/// Configuration for an [`Executor`](crate::Executor)
///
/// Every field has a default, so a TOML document only needs to name what it
/// overrides:
///
/// ```
/// use cadence_executor::ExecutorConfig;
///
/// let config = ExecutorConfig::from_toml_str(
///     r#"
///     name = "reports"
///     continue_periodic_after_shutdown = false
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.name, "reports");
/// assert!(!config.continue_periodic_after_shutdown);
/// assert!(config.execute_delayed_after_shutdown);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Name used in logs and rejection errors
    pub name: String,
    /// Keep periodic schedules firing after `shutdown()`
    pub continue_periodic_after_shutdown: bool,
    /// Still run one-shot delayed tasks that are waiting at `shutdown()`
    pub execute_delayed_after_shutdown: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            continue_periodic_after_shutdown: true,
            execute_delayed_after_shutdown: true,
        }
    }
}

impl ExecutorConfig {
    /// Create a new configuration builder
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.name.trim().is_empty() {
            return Err(CommonError::config_field("name", "executor name must not be empty"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> ExecutorResult<Self> {
        let config: Self = toml::from_str(source).map_err(CommonError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> ExecutorResult<String> {
        toml::to_string(self).map_err(|err| ExecutorError::Config { message: err.to_string() })
    }
}

/// Builder for ExecutorConfig
#[derive(Debug, Default)]
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
}

impl ExecutorConfigBuilder {
    pub fn new() -> Self {
        Self { config: ExecutorConfig::default() }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn continue_periodic_after_shutdown(mut self, keep: bool) -> Self {
        self.config.continue_periodic_after_shutdown = keep;
        self
    }

    pub fn execute_delayed_after_shutdown(mut self, keep: bool) -> Self {
        self.config.execute_delayed_after_shutdown = keep;
        self
    }

    pub fn build(self) -> ExecutorResult<ExecutorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
