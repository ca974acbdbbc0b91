//! Error taxonomy for manifest application
//!
//! `ApiError` is what a dynamic client call returns. It is classified into an
//! `ApiErrorKind`, which drives the reconciler's fallbacks and the applier's
//! continue-or-abort policy. `ManifestError` is what callers of the applier see.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Message fragment the API server uses when a path does not exist at all
/// (wrong scope, unknown resource type).
const MISSING_RESOURCE_MESSAGE: &str = "could not find the requested resource";

/// Classification of a failed API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The object (or the resource path) does not exist
    NotFound,
    /// Create rejected because the object is already there
    AlreadyExists,
    /// Stale resourceVersion on update
    Conflict,
    /// The server refused the verb or a field cannot change in place
    ImmutableField,
    /// Anything else: transport failures, timeouts, 5xx, authorization
    Transient,
}

/// A failed call against the cluster's generic object API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status code, absent for transport-level failures
    pub code: Option<u16>,
    /// Machine-readable reason (e.g. "AlreadyExists")
    pub reason: String,
    /// Human-readable message from the server
    pub message: String,
}

impl ApiError {
    /// Error carrying an API server status
    pub fn status(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Error that never reached the API server
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: "Transport".to_string(),
            message: message.into(),
        }
    }

    /// Call did not complete within the configured request timeout
    pub fn timeout(after: Duration) -> Self {
        Self {
            code: None,
            reason: "Timeout".to_string(),
            message: format!("request did not complete within {:?}", after),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        let message = self.message.to_lowercase();

        match (self.code, self.reason.as_str()) {
            (_, "AlreadyExists") => ApiErrorKind::AlreadyExists,
            (Some(404), _) | (_, "NotFound") => ApiErrorKind::NotFound,
            (Some(409), _) if message.contains("already exists") => ApiErrorKind::AlreadyExists,
            (Some(409), _) | (_, "Conflict") => ApiErrorKind::Conflict,
            (Some(405), _) | (_, "MethodNotAllowed") => ApiErrorKind::ImmutableField,
            _ if message.contains("immutable") => ApiErrorKind::ImmutableField,
            _ if message.contains(MISSING_RESOURCE_MESSAGE) || message.ends_with("not found") => {
                ApiErrorKind::NotFound
            }
            _ if message.contains("already exists") => ApiErrorKind::AlreadyExists,
            _ => ApiErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ApiErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ApiErrorKind::AlreadyExists
    }
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) => ApiError::status(
                status.code,
                status.reason.clone(),
                status.message.clone(),
            ),
            other => ApiError::transport(other.to_string()),
        }
    }
}

/// Several independent failures reported as one
///
/// Displays as the individual messages joined with newlines.
#[derive(Debug)]
pub struct AggregateError<E> {
    errors: Vec<E>,
}

impl<E> AggregateError<E> {
    /// Returns `None` when there is nothing to aggregate
    pub fn from_errors(errors: Vec<E>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AggregateError<E> {}

/// Errors returned by the manifest applier and reconciler
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to decode manifest: {0}")]
    Decode(String),

    #[error("failed to decode document {index}: {message}")]
    Document { index: usize, message: String },

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("{kind} {name:?}: {source}")]
    Api {
        kind: String,
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("{kind} {name:?}: still rejected after {cycles} delete-and-recreate cycles: {source}")]
    RecreateExhausted {
        kind: String,
        name: String,
        cycles: u32,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError<ManifestError>),
}

impl ManifestError {
    /// Classification of the underlying API failure, if there is one
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            ManifestError::Api { source, .. } => Some(source.kind()),
            ManifestError::RecreateExhausted { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::AlreadyExists)
    }

    /// Malformed YAML or an object that cannot be addressed
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            ManifestError::Decode(_)
                | ManifestError::Document { .. }
                | ManifestError::InvalidObject(_)
        )
    }
}
