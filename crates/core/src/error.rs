//! Rollcall Error Types
//!
//! This module defines a layered error hierarchy:
//! - `DomainError`: Business logic errors (config, roster, timetable)
//! - `InfraError`: Infrastructure errors (IO, YAML)
//! - `RollcallError`: Top-level error that wraps both categories

use std::fmt;

/// Domain-level errors representing invalid inputs at startup
#[derive(Debug)]
pub enum DomainError {
    /// Configuration file not found at the specified path
    ConfigNotFound { path: String },
    /// Configuration validation failed
    ConfigInvalid { field: String, reason: String },
    /// Configuration parsing failed
    ConfigParse { source: String },
    /// Roster file is unusable
    Roster { reason: String },
    /// Timetable file is unusable
    Timetable { reason: String },
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigNotFound { path } => write!(f, "Config not found: {}", path),
            Self::ConfigInvalid { field, reason } => {
                write!(f, "Config invalid [{}]: {}", field, reason)
            }
            Self::ConfigParse { source } => write!(f, "Config parse error: {}", source),
            Self::Roster { reason } => write!(f, "Roster error: {}", reason),
            Self::Timetable { reason } => write!(f, "Timetable error: {}", reason),
        }
    }
}

impl std::error::Error for DomainError {}

/// Infrastructure-level errors representing external system failures
#[derive(Debug)]
pub enum InfraError {
    /// IO operation failed
    Io(std::io::Error),
    /// YAML serialization/deserialization failed
    Yaml(serde_yml::Error),
}

impl fmt::Display for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Yaml(err) => write!(f, "YAML error: {}", err),
        }
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Yaml(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_yml::Error> for InfraError {
    fn from(err: serde_yml::Error) -> Self {
        Self::Yaml(err)
    }
}

/// Top-level error type for Rollcall
///
/// Wraps both domain and infrastructure errors so startup code can use a
/// single `Result` type while callers can still match on the category.
#[derive(Debug)]
pub enum RollcallError {
    /// Business logic error
    Domain(DomainError),
    /// Infrastructure/external system error
    Infra(InfraError),
}

impl fmt::Display for RollcallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(e) => write!(f, "{}", e),
            Self::Infra(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RollcallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Domain(e) => Some(e),
            Self::Infra(e) => Some(e),
        }
    }
}

impl From<DomainError> for RollcallError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<InfraError> for RollcallError {
    fn from(err: InfraError) -> Self {
        Self::Infra(err)
    }
}

impl From<std::io::Error> for RollcallError {
    fn from(err: std::io::Error) -> Self {
        Self::Infra(InfraError::Io(err))
    }
}

impl From<serde_yml::Error> for RollcallError {
    fn from(err: serde_yml::Error) -> Self {
        Self::Infra(InfraError::Yaml(err))
    }
}

impl RollcallError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::Domain(DomainError::ConfigNotFound { path: path.into() })
    }

    pub fn config_parse_error(source: impl Into<String>) -> Self {
        Self::Domain(DomainError::ConfigParse {
            source: source.into(),
        })
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Domain(DomainError::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        })
    }

    pub fn roster(reason: impl Into<String>) -> Self {
        Self::Domain(DomainError::Roster {
            reason: reason.into(),
        })
    }

    pub fn timetable(reason: impl Into<String>) -> Self {
        Self::Domain(DomainError::Timetable {
            reason: reason.into(),
        })
    }
}
