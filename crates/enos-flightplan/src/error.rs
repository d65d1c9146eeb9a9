// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flight plan error types.
//!
//! Decoding reports problems as [`Diagnostics`]. Operations that need a hard
//! failure (reading files, writing modules, observing samples) return [`Error`].

use enos_hcl::{Diagnostic, Diagnostics};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur outside of configuration decoding.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading configuration or writing generated modules failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoding produced error diagnostics
    #[error("{}", diagnostics_message(.0))]
    Diagnostics(Diagnostics),

    /// Module generator options are incomplete
    #[error("invalid generator: {0}")]
    InvalidGenerator(String),

    /// A sample could not be framed or observed
    #[error("sampling error: {0}")]
    Sampling(String),

    /// A matrix operation was given invalid input
    #[error("matrix error: {0}")]
    Matrix(String),

    /// A value could not be converted back into a flight plan record
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for flight plan operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Diagnostics> for Error {
    fn from(diags: Diagnostics) -> Self {
        Error::Diagnostics(diags)
    }
}

impl Error {
    /// Returns the diagnostics carried by the error, if any.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Error::Diagnostics(d) => Some(d),
            _ => None,
        }
    }

    /// Converts the error into diagnostics so it can be reported alongside
    /// decode diagnostics.
    pub fn into_diagnostics(self) -> Diagnostics {
        match self {
            Error::Diagnostics(d) => d,
            other => Diagnostic::error(other.to_string(), "").into(),
        }
    }
}

fn diagnostics_message(diags: &Diagnostics) -> String {
    let errs: Vec<String> = diags.errors().map(ToString::to_string).collect();
    if errs.is_empty() {
        return "configuration is invalid".to_string();
    }
    errs.join(": ")
}

/// Turns diagnostics into a result: `Err` when any diagnostic is an error.
pub(crate) fn check(diags: Diagnostics) -> Result<Diagnostics> {
    if diags.has_errors() {
        return Err(Error::Diagnostics(diags));
    }
    Ok(diags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_error_joins_errors_only() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("first", ""));
        diags.push(Diagnostic::warning("ignored", ""));
        diags.push(Diagnostic::error("second", "detail"));

        let err = Error::from(diags);
        assert_eq!(err.to_string(), "first: second; detail");
        assert_eq!(err.diagnostics().map(Diagnostics::len), Some(3));
    }

    #[test]
    fn test_check() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("careful", ""));
        assert!(check(diags.clone()).is_ok());

        diags.push(Diagnostic::error("broken", ""));
        assert!(matches!(check(diags), Err(Error::Diagnostics(_))));
    }

    #[test]
    fn test_into_diagnostics() {
        let diags = Error::Sampling("no subsets".into()).into_diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags.has_errors());
        assert_eq!(diags.iter().next().unwrap().summary, "sampling error: no subsets");
    }
}
