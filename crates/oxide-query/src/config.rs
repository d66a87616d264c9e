//! Session settings.
//!
//! The parameter and row ceilings are driver specific, so they live here
//! rather than in the generators.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Parameter budget per statement: the driver's ceiling of 2100 less one.
pub const MAX_PARAMETERS: usize = 2099;

/// Maximum rows in one multi-row `INSERT ... VALUES` statement.
pub const MAX_INSERT_ROWS: usize = 1000;

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Per-statement ceilings used by batched inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum parameters bound to one statement.
    pub max_parameters: usize,
    /// Maximum rows in one `INSERT ... VALUES` statement.
    pub max_insert_rows: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_parameters: MAX_PARAMETERS,
            max_insert_rows: MAX_INSERT_ROWS,
        }
    }
}

/// Settings shared by every statement a session issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Connection string handed to the connector.
    pub connection_string: String,
    /// Command timeout in seconds, applied to every statement.
    pub command_timeout: u64,
    /// Shadow parameters of SELECT and page statements with local variables.
    pub anti_sniffing: bool,
    /// Batched insert ceilings.
    pub limits: Limits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT_SECS,
            anti_sniffing: true,
            limits: Limits::default(),
        }
    }
}

impl Settings {
    /// Creates settings for a connection string with default values.
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    /// Parses settings from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Settings` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the command timeout in seconds.
    #[must_use]
    pub const fn with_command_timeout(mut self, seconds: u64) -> Self {
        self.command_timeout = seconds;
        self
    }

    /// Enables or disables the parameter-sniffing rewrite.
    #[must_use]
    pub const fn with_anti_sniffing(mut self, enabled: bool) -> Self {
        self.anti_sniffing = enabled;
        self
    }

    /// Sets the batched insert ceilings.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.command_timeout, 30);
        assert!(settings.anti_sniffing);
        assert_eq!(settings.limits.max_parameters, 2099);
        assert_eq!(settings.limits.max_insert_rows, 1000);
    }

    #[test]
    fn test_from_json_partial() {
        let settings = Settings::from_json(
            r#"{"connection_string": "Server=db;Database=app", "limits": {"max_insert_rows": 10}}"#,
        )
        .unwrap();
        assert_eq!(settings.connection_string, "Server=db;Database=app");
        assert_eq!(settings.limits.max_insert_rows, 10);
        assert_eq!(settings.limits.max_parameters, MAX_PARAMETERS);
        assert_eq!(settings.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_json_invalid() {
        let err = Settings::from_json("{not json").unwrap_err();
        assert!(err.to_string().starts_with("invalid settings"));
    }
}
