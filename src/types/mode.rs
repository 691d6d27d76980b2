//! Runtime operating modes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ValidationError;

/// Runtime profile selected at bootstrap.
///
/// The mode decides the event bus backend: `Full` gets the priority heap,
/// `Minimal` gets the bounded FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Minimal,
    Full,
}

impl RuntimeMode {
    /// Parse the external string form ("minimal" | "full").
    pub fn parse(mode: &str) -> Result<Self, ValidationError> {
        match mode {
            "minimal" => Ok(RuntimeMode::Minimal),
            "full" => Ok(RuntimeMode::Full),
            other => Err(ValidationError::UnrecognizedMode(other.to_string())),
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Minimal => write!(f, "minimal"),
            RuntimeMode::Full => write!(f, "full"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!(RuntimeMode::parse("minimal").unwrap(), RuntimeMode::Minimal);
        assert_eq!(RuntimeMode::parse("full").unwrap(), RuntimeMode::Full);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = RuntimeMode::parse("turbo").unwrap_err();
        assert!(matches!(err, ValidationError::UnrecognizedMode(ref m) if m == "turbo"));
    }
}
