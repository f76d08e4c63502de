//! Success/error envelope returned across component boundaries.
//!
//! Components report failure as data instead of bailing out, so the
//! synchronizer can decide per error kind whether a run continues.

use serde::Serialize;
use std::fmt;

/// Category of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The API credential could not be resolved.
    SecretRetrieval,
    /// The remote catalog answered with a non-200, an empty body or bad JSON.
    Api,
    /// The remote catalog parsed fine but listed no apps.
    EmptyCatalog,
    /// A per-item detail lookup failed.
    Classification,
    /// An item could not be persisted.
    Persistence,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SecretRetrieval => "secret_retrieval",
            ErrorKind::Api => "api",
            ErrorKind::EmptyCatalog => "empty_catalog",
            ErrorKind::Classification => "classification",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Either data (on success) or an ordered list of errors (on failure).
///
/// Fields are private so the two shapes cannot be mixed: a success always
/// carries data and no errors, a failure carries no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResult<T> {
    success: bool,
    data: Option<T>,
    errors: Vec<ErrorDetail>,
}

impl<T> ServiceResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<ErrorDetail>) -> Self {
        Self {
            success: false,
            data: None,
            errors,
        }
    }

    /// Failure carrying a single error.
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::failure(vec![ErrorDetail::new(kind, message)])
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Data of a successful result; `None` for failures.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceResult<U> {
        ServiceResult {
            success: self.success,
            data: self.data.map(f),
            errors: self.errors,
        }
    }

    pub fn into_result(self) -> Result<T, Vec<ErrorDetail>> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self.errors),
        }
    }

    /// Rewrites every error into `kind`, prefixing the message with `context`.
    pub fn recast(self, kind: ErrorKind, context: &str) -> Self {
        if self.success {
            return self;
        }
        let errors = self
            .errors
            .into_iter()
            .map(|e| ErrorDetail::new(kind, format!("{context}: {}", e.message)))
            .collect();
        Self::failure(errors)
    }
}

impl<T> From<Result<T, ErrorDetail>> for ServiceResult<T> {
    fn from(value: Result<T, ErrorDetail>) -> Self {
        match value {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(vec![e]),
        }
    }
}

/// Joins error messages into one log-friendly line.
pub fn summarize(errors: &[ErrorDetail]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
