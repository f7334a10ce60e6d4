//! Error types for the provisioning lifecycle

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed classification of failures reported by the account-creation API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiErrorKind {
    /// Request rejected before or by the API as malformed
    ValidationError,
    /// Caller lacks permission, or the organization is not usable
    AccessDenied,
    /// An organization limit or constraint was hit
    QuotaExceeded,
    /// Another modification is in flight
    Conflict,
    /// The API is temporarily unable to serve the request
    ServiceUnavailable,
    /// The API throttled the request
    RateLimited,
    /// The request may or may not have taken effect (e.g. timed out)
    Ambiguous,
    /// Anything not covered above
    Unknown,
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiErrorKind::ValidationError => write!(f, "validation-error"),
            ApiErrorKind::AccessDenied => write!(f, "access-denied"),
            ApiErrorKind::QuotaExceeded => write!(f, "quota-exceeded"),
            ApiErrorKind::Conflict => write!(f, "conflict"),
            ApiErrorKind::ServiceUnavailable => write!(f, "service-unavailable"),
            ApiErrorKind::RateLimited => write!(f, "rate-limited"),
            ApiErrorKind::Ambiguous => write!(f, "ambiguous"),
            ApiErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Map an error code of the account-creation API onto [`ApiErrorKind`].
///
/// The codes are the exception names AWS Organizations returns for
/// `CreateAccount` and `DescribeCreateAccountStatus`.
pub fn classify_error_code(code: &str) -> ApiErrorKind {
    match code {
        "AccessDeniedException" => ApiErrorKind::AccessDenied,
        "AWSOrganizationsNotInUseException" => ApiErrorKind::AccessDenied,
        "ConcurrentModificationException" => ApiErrorKind::Conflict,
        "ConstraintViolationException" => ApiErrorKind::QuotaExceeded,
        "InvalidInputException" => ApiErrorKind::ValidationError,
        "FinalizingOrganizationException" => ApiErrorKind::ServiceUnavailable,
        "ServiceException" => ApiErrorKind::ServiceUnavailable,
        "TooManyRequestsException" => ApiErrorKind::RateLimited,
        _ => ApiErrorKind::Unknown,
    }
}

/// Classified failure of a Submit or Poll call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ValidationError, message)
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Ambiguous, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unknown, message)
    }

    /// Whether the external operation may have been created despite the error
    pub fn is_ambiguous(&self) -> bool {
        self.kind == ApiErrorKind::Ambiguous
    }
}

/// Correlation store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Instance already exists: {0}")]
    DuplicateInstance(String),

    #[error("State file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State file is locked by {holder}; remove {path} if no broker is running")]
    Locked { path: String, holder: String },
}

impl StoreError {
    /// Storage could not be read or written
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Json(_) | StoreError::UnsupportedVersion { .. }
        )
    }
}

/// Failure to derive a per-instance contact address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Base address has no '@': {0}")]
    MissingAt(String),

    #[error("Base address has an empty local part: {0}")]
    EmptyLocalPart(String),

    #[error("Base address has an empty domain: {0}")]
    EmptyDomain(String),

    #[error("Instance id cannot be used as a sub-address tag: {0:?}")]
    InvalidInstanceId(String),
}

/// Errors surfaced by the lifecycle controller
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("This service plan requires client support for asynchronous service operations.")]
    SyncNotSupported,

    #[error("Cannot derive contact address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Instance {0} already exists")]
    InstanceExists(String),

    #[error("Account creation failed: {0}")]
    SubmissionFailed(ApiError),

    #[error(
        "Account creation for {instance_id} was submitted as {operation_id} but the correlation could not be recorded"
    )]
    CorrelationLost {
        instance_id: String,
        operation_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Instance does not exist: {0}")]
    UnknownInstance(String),

    #[error("Status query failed: {0}")]
    PollFailed(ApiError),

    #[error("{0} is not supported by this broker")]
    UnsupportedOperation(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
