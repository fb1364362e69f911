use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqlCommandError};
use crate::types::IsolationLevel;

/// Names of the two OUTPUT parameters a procedure uses to report structured errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorParmNames {
    pub return_code: String,
    pub return_message: String,
}

impl Default for ErrorParmNames {
    fn default() -> Self {
        Self {
            return_code: "@ReturnCode".to_string(),
            return_message: "@ReturnMessage".to_string(),
        }
    }
}

/// Engine-wide settings. Connection details live in the connector.
///
/// ```rust
/// use sql_command_middleware::prelude::*;
///
/// let opts = EngineOptions::builder()
///     .default_timeout(Some(30))
///     .error_parm_names("@rc", "@msg")
///     .finish();
/// assert_eq!(opts.error_parms.return_code, "@rc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Seconds applied when a call passes no timeout; `None` means the driver default.
    pub default_timeout: Option<u32>,
    /// Isolation used by `begin_transaction` when the caller passes none.
    pub default_isolation: IsolationLevel,
    pub error_parms: ErrorParmNames,
}

impl EngineOptions {
    #[must_use]
    pub fn builder() -> EngineOptionsBuilder {
        EngineOptionsBuilder::default()
    }

    /// Parse options from a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `SqlCommandError::ConfigError` if the document is not valid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let opts: EngineOptions = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Read options from a JSON file.
    ///
    /// # Errors
    /// Returns `SqlCommandError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlCommandError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// # Errors
    /// Returns `SqlCommandError::ConfigError` for a zero default timeout or blank
    /// error-parameter names.
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout == Some(0) {
            return Err(SqlCommandError::ConfigError(
                "default_timeout must be positive".to_string(),
            ));
        }
        if self.error_parms.return_code.trim().is_empty()
            || self.error_parms.return_message.trim().is_empty()
        {
            return Err(SqlCommandError::ConfigError(
                "error parameter names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for engine options.
#[derive(Debug, Clone, Default)]
pub struct EngineOptionsBuilder {
    opts: EngineOptions,
}

impl EngineOptionsBuilder {
    #[must_use]
    pub fn default_timeout(mut self, seconds: Option<u32>) -> Self {
        self.opts.default_timeout = seconds;
        self
    }

    #[must_use]
    pub fn default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.opts.default_isolation = isolation;
        self
    }

    #[must_use]
    pub fn error_parm_names(
        mut self,
        return_code: impl Into<String>,
        return_message: impl Into<String>,
    ) -> Self {
        self.opts.error_parms = ErrorParmNames {
            return_code: return_code.into(),
            return_message: return_message.into(),
        };
        self
    }

    #[must_use]
    pub fn finish(self) -> EngineOptions {
        self.opts
    }

    /// Finish and validate.
    ///
    /// # Errors
    /// Returns `SqlCommandError::ConfigError` if the options are inconsistent.
    pub fn build(self) -> Result<EngineOptions> {
        self.opts.validate()?;
        Ok(self.opts)
    }
}
