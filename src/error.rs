//! Error types for schema conversion, request validation and response serialization.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::parse::{Issue, PathSegment};

/// Errors raised while building documentation from schemas.
///
/// All variants are build-time faults: they abort document generation and are
/// never recovered into a response.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Invalid schema passed: {value}")]
    InvalidSchema { value: String },

    #[error("collision detected for schema \"{name}\": an input schema already uses this name")]
    ComponentCollision { name: String },

    #[error("Unsupported OpenAPI version: {version}")]
    UnsupportedVersion { version: String },

    #[error("OpenAPI 2.0 is not supported")]
    SwaggerUnsupported,
}

impl TransformError {
    /// Stable error code reported to the host framework.
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::InvalidSchema { .. } => "FST_ERR_INVALID_SCHEMA",
            TransformError::ComponentCollision { .. } => "FST_ERR_SCHEMA_COLLISION",
            TransformError::UnsupportedVersion { .. } | TransformError::SwaggerUnsupported => {
                "FST_ERR_UNSUPPORTED_OPENAPI"
            }
        }
    }

    /// HTTP status the host should use if the error ever reaches a client.
    pub fn status_code(&self) -> u16 {
        500
    }
}

/// One failing constraint, in the shape the host framework reports
/// validation failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Issue code (`invalid_type`, `too_small`, ...).
    pub keyword: String,
    /// JSON Pointer to the failing value, e.g. `/user/name`.
    pub instance_path: String,
    /// Pointer-like location of the failing constraint.
    pub schema_path: String,
    pub message: String,
    /// Remaining issue details (`expected`, `minimum`, `keys`, ...).
    pub params: Map<String, Value>,
    #[serde(skip)]
    pub path: Vec<PathSegment>,
}

impl ValidationIssue {
    pub(crate) fn from_issue(issue: Issue) -> Self {
        let joined = issue
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        let keyword = issue.code.as_str().to_string();

        Self {
            schema_path: format!("#/{}/{}", joined, keyword),
            instance_path: format!("/{}", joined),
            keyword,
            message: issue.message,
            params: issue.params,
            path: issue.path,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.instance_path, self.message)
    }
}

/// Request data did not satisfy its schema.
///
/// Returned, never raised: the host turns it into a 400-class response.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed with {} issue(s)", issues.len())]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub(crate) fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            issues: issues.into_iter().map(ValidationIssue::from_issue).collect(),
        }
    }

    pub fn code(&self) -> &'static str {
        "FST_ERR_VALIDATION"
    }

    pub fn status_code(&self) -> u16 {
        400
    }
}

/// A handler produced data that its declared response schema does not allow.
///
/// This is a server fault, distinct from request validation.
#[derive(Debug, Clone, Error)]
#[error("Response doesn't match the schema")]
pub struct ResponseSerializationError {
    pub method: String,
    pub url: String,
    #[source]
    pub cause: ValidationError,
}

impl ResponseSerializationError {
    pub fn code(&self) -> &'static str {
        "FST_ERR_RESPONSE_SERIALIZATION"
    }

    pub fn status_code(&self) -> u16 {
        500
    }
}
