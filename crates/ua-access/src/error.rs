// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the client access layer.
//!
//! Two tiers of failure exist. Provider-level failures (transport drops,
//! protocol faults) travel upward unchanged inside [`UaError::Provider`].
//! Item-level failures reported through status codes are translated into
//! the typed errors below.
//!
//! # Error Categories
//!
//! ```text
//! UaError
//! ├── Connection      - No live session, bad endpoint
//! ├── Server          - Session creation failed or came back disconnected
//! ├── Read            - Typed read returned a non-good status
//! ├── Write           - Fail-fast batch write hit a non-good status
//! ├── UnsupportedType - Typed read requested for a type outside the table
//! ├── Conversion      - Value could not be coerced (range, format, null)
//! ├── Browse          - Address-space traversal limits
//! ├── Operation       - Request/response correlation faults
//! ├── Subscription    - Monitored item and subscription errors
//! ├── Configuration   - Invalid settings or unreadable config files
//! ├── Provider        - Opaque failure from the session provider
//! ├── Cancelled       - Caller cancelled the wait
//! └── Timeout         - Operation exceeded its deadline
//! ```
//!
//! # Examples
//!
//! ```
//! use ua_access::error::{UaError, ErrorSeverity};
//! use ua_access::StatusCode;
//!
//! let error = UaError::read("Plant.Line1.Speed", StatusCode::BAD_NODE_ID_UNKNOWN);
//! assert_eq!(error.category(), "read");
//! assert_eq!(error.severity(), ErrorSeverity::Warning);
//! assert!(!error.is_retryable());
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::status::StatusCode;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for client operations.
#[derive(Debug, Error)]
pub enum UaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session creation failed or produced an unusable session.
    #[error("{0}")]
    Server(#[from] ServerError),

    /// A typed read returned a non-good status.
    #[error("{0}")]
    Read(#[from] ReadError),

    /// A fail-fast write returned a non-good status.
    #[error("{0}")]
    Write(#[from] WriteError),

    /// A typed read requested a type outside the supported set.
    #[error("{0}")]
    UnsupportedType(#[from] UnsupportedTypeError),

    /// Value coercion failed.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Address-space traversal errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Request/response correlation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitoring errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Opaque failure reported by the session provider.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The caller cancelled the operation.
    #[error("Operation '{operation}' was cancelled")]
    Cancelled {
        /// Name of the cancelled operation.
        operation: &'static str,
    },

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl UaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a read error for a non-good status.
    pub fn read(address: impl Into<String>, status: StatusCode) -> Self {
        Self::Read(ReadError {
            address: address.into(),
            status,
        })
    }

    /// Creates a write error carrying the first failing status.
    pub fn write(status: StatusCode, batch_size: usize) -> Self {
        Self::Write(WriteError { status, batch_size })
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType(UnsupportedTypeError {
            type_name: type_name.into(),
        })
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: &'static str) -> Self {
        Self::Cancelled { operation }
    }

    /// Creates a provider error from a message.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(ProviderError::new(message))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    ///
    /// Retryable errors are transient and a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Server(_) => true,
            Self::Provider(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Subscription(e) => e.is_retryable(),
            Self::Read(_)
            | Self::Write(_)
            | Self::UnsupportedType(_)
            | Self::Conversion(_)
            | Self::Browse(_)
            | Self::Operation(_)
            | Self::Configuration(_)
            | Self::Cancelled { .. } => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Server(_) => ErrorSeverity::Error,
            Self::Read(_) | Self::Write(_) => ErrorSeverity::Warning,
            Self::UnsupportedType(_) | Self::Conversion(_) => ErrorSeverity::Error,
            Self::Browse(_) => ErrorSeverity::Error,
            Self::Operation(_) => ErrorSeverity::Error,
            Self::Subscription(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Provider(_) => ErrorSeverity::Error,
            Self::Cancelled { .. } => ErrorSeverity::Info,
            Self::Timeout(_) => ErrorSeverity::Warning,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Server(_) => "server",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::UnsupportedType(_) => "unsupported_type",
            Self::Conversion(_) => "conversion",
            Self::Browse(_) => "browse",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Configuration(_) => "configuration",
            Self::Provider(_) => "provider",
            Self::Cancelled { .. } => "cancelled",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Server(e) => e.error_code(),
            Self::Read(_) => ErrorCode::new(3, 1),
            Self::Write(_) => ErrorCode::new(4, 1),
            Self::UnsupportedType(_) => ErrorCode::new(5, 1),
            Self::Conversion(e) => e.error_code(),
            Self::Browse(e) => e.error_code(),
            Self::Operation(_) => ErrorCode::new(8, 1),
            Self::Subscription(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Provider(_) => ErrorCode::new(11, 1),
            Self::Cancelled { .. } => ErrorCode::new(12, 1),
            Self::Timeout(_) => ErrorCode::new(13, 1),
        }
    }

    /// Returns the status code carried by this error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Read(e) => Some(e.status),
            Self::Write(e) => Some(e.status),
            Self::Subscription(SubscriptionError::MonitoredItemRejected { status, .. }) => {
                Some(*status)
            }
            Self::Provider(e) => e.status,
            _ => None,
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No live session.
    #[error("Not connected to OPC UA server")]
    NotConnected,

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// Reconnection gave up and the session was released.
    ///
    /// Reported in place of [`NotConnected`](Self::NotConnected) until the
    /// next connect or disconnect.
    #[error("Connection lost to '{endpoint}'")]
    Lost {
        /// Target endpoint.
        endpoint: String,
    },
}

impl ConnectionError {
    /// Creates a connection lost error.
    pub fn lost(endpoint: impl Into<String>) -> Self {
        Self::Lost {
            endpoint: endpoint.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected | Self::Lost { .. } => true,
            Self::InvalidEndpoint { .. } => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected | Self::Lost { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConnected => ErrorCode::new(1, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 2),
            Self::Lost { .. } => ErrorCode::new(1, 3),
        }
    }
}

// =============================================================================
// ServerError
// =============================================================================

/// Session creation failures.
///
/// Fatal to the attempted connect, never to the connection manager itself.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The provider produced no session.
    #[error("Server at '{endpoint}' did not create a session")]
    NoSession {
        /// Target endpoint.
        endpoint: String,
    },

    /// The provider produced a session that is not connected.
    #[error("Session '{session_id}' on '{endpoint}' is not connected")]
    SessionNotConnected {
        /// Target endpoint.
        endpoint: String,
        /// Identifier of the unusable session.
        session_id: String,
    },

    /// The provider failed while creating the session.
    #[error("Failed to create session on '{endpoint}': {source}")]
    CreationFailed {
        /// Target endpoint.
        endpoint: String,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
}

impl ServerError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoSession { .. } => ErrorCode::new(2, 1),
            Self::SessionNotConnected { .. } => ErrorCode::new(2, 2),
            Self::CreationFailed { .. } => ErrorCode::new(2, 3),
        }
    }
}

// =============================================================================
// ReadError / WriteError / UnsupportedTypeError
// =============================================================================

/// A typed read returned a non-good status.
#[derive(Debug, Clone, Error)]
#[error("Read of '{address}' failed with {status}")]
pub struct ReadError {
    /// Address that was read.
    pub address: String,
    /// Status reported by the server.
    pub status: StatusCode,
}

/// A fail-fast batch write encountered a non-good status.
///
/// Only the first failing status is carried. Use the per-item write to see
/// every outcome.
#[derive(Debug, Clone, Error)]
#[error("Write of {batch_size} item(s) failed with {status}")]
pub struct WriteError {
    /// First non-good status in request order.
    pub status: StatusCode,
    /// Number of items in the batch.
    pub batch_size: usize,
}

/// A typed read requested a type outside the coercion table.
#[derive(Debug, Clone, Error)]
#[error("Type '{type_name}' is not supported for typed reads")]
pub struct UnsupportedTypeError {
    /// Name of the requested type.
    pub type_name: String,
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value coercion errors.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// Source value does not fit the target type.
    #[error("Value {value} is out of range for {target}")]
    OutOfRange {
        /// Rendered source value.
        value: String,
        /// Target type name.
        target: &'static str,
    },

    /// Source string could not be parsed as the target type.
    #[error("Cannot parse '{value}' as {target}")]
    InvalidFormat {
        /// Source text.
        value: String,
        /// Target type name.
        target: &'static str,
    },

    /// Source value kind cannot be converted to the target type.
    #[error("Type mismatch: cannot convert {actual} to {expected}")]
    TypeMismatch {
        /// Target type name.
        expected: &'static str,
        /// Source type name.
        actual: &'static str,
    },

    /// Source value is null.
    #[error("Cannot convert a null value to {target}")]
    NullValue {
        /// Target type name.
        target: &'static str,
    },
}

impl ConversionError {
    /// Creates an out of range error.
    pub fn out_of_range(value: impl fmt::Display, target: &'static str) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            target,
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(value: impl Into<String>, target: &'static str) -> Self {
        Self::InvalidFormat {
            value: value.into(),
            target,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::OutOfRange { .. } => ErrorCode::new(6, 1),
            Self::InvalidFormat { .. } => ErrorCode::new(6, 2),
            Self::TypeMismatch { .. } => ErrorCode::new(6, 3),
            Self::NullValue { .. } => ErrorCode::new(6, 4),
        }
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Address-space traversal errors.
#[derive(Debug, Clone, Error)]
pub enum BrowseError {
    /// Recursion went deeper than the configured limit.
    #[error("Browse depth limit {max_depth} exceeded at '{address}'")]
    DepthExceeded {
        /// Address at which the limit was hit.
        address: String,
        /// Configured limit.
        max_depth: usize,
    },

    /// The provider rejected the browse of a node.
    #[error("Browse of '{address}' failed with {status}")]
    BadStatus {
        /// Browsed address.
        address: String,
        /// Status reported by the server.
        status: StatusCode,
    },
}

impl BrowseError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DepthExceeded { .. } => ErrorCode::new(7, 1),
            Self::BadStatus { .. } => ErrorCode::new(7, 2),
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Request/response correlation errors.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// The provider returned a different number of results than requested.
    #[error("{operation} returned {actual} result(s) for {expected} request(s)")]
    ResultCountMismatch {
        /// Operation name.
        operation: &'static str,
        /// Number of items requested.
        expected: usize,
        /// Number of results returned.
        actual: usize,
    },
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitoring errors.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    /// Unknown subscription.
    #[error("Subscription {subscription_id} not found")]
    NotFound {
        /// Subscription id.
        subscription_id: u32,
    },

    /// The server rejected the monitored item.
    #[error("Monitored item for '{address}' rejected with {status}")]
    MonitoredItemRejected {
        /// Monitored address.
        address: String,
        /// Status reported by the server.
        status: StatusCode,
    },

    /// The session was replaced or torn down while the subscription was
    /// being created. The subscription has been deleted.
    #[error("Session changed while creating subscription {subscription_id}")]
    SessionChanged {
        /// Subscription id.
        subscription_id: u32,
    },
}

impl SubscriptionError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SessionChanged { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::new(9, 1),
            Self::MonitoredItemRejected { .. } => ErrorCode::new(9, 2),
            Self::SessionChanged { .. } => ErrorCode::new(9, 3),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A field holds an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Reason.
        reason: String,
    },

    /// A required field is missing.
    #[error("Missing required field '{field}'")]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// The configuration file could not be read.
    #[error("Failed to read configuration file '{path}'")]
    FileRead {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The configuration content could not be parsed.
    #[error("Failed to parse {format} configuration: {message}")]
    Parse {
        /// Format name.
        format: &'static str,
        /// Parser message.
        message: String,
    },

    /// The file extension does not map to a known format.
    #[error("Unsupported configuration format: '{extension}'")]
    UnsupportedFormat {
        /// File extension.
        extension: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(format: &'static str, message: impl fmt::Display) -> Self {
        Self::Parse {
            format,
            message: message.to_string(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidValue { .. } => ErrorCode::new(10, 1),
            Self::MissingField { .. } => ErrorCode::new(10, 2),
            Self::FileRead { .. } => ErrorCode::new(10, 3),
            Self::Parse { .. } => ErrorCode::new(10, 4),
            Self::UnsupportedFormat { .. } => ErrorCode::new(10, 5),
        }
    }
}

// =============================================================================
// ProviderError
// =============================================================================

/// Opaque failure reported by a session provider.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Description of the failure.
    pub message: String,
    /// Service-level status, when the provider reported one.
    pub status: Option<StatusCode>,
    /// Underlying error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a provider error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Creates a provider error from a service-level status.
    pub fn status(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Attaches an underlying error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns `true` if the failure looks transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status,
            Some(
                StatusCode::BAD_TIMEOUT
                    | StatusCode::BAD_COMMUNICATION_ERROR
                    | StatusCode::BAD_CONNECTION_CLOSED
                    | StatusCode::BAD_SECURE_CHANNEL_CLOSED
                    | StatusCode::BAD_SERVER_NOT_CONNECTED
                    | StatusCode::BAD_NO_COMMUNICATION
            )
        )
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// An operation exceeded its deadline.
#[derive(Debug, Clone, Error)]
#[error("{operation} timed out after {duration:?}")]
pub struct TimeoutError {
    /// Operation name.
    pub operation: &'static str,
    /// Deadline that elapsed.
    pub duration: Duration,
}

impl TimeoutError {
    /// Creates a timeout error.
    pub fn new(operation: &'static str, duration: Duration) -> Self {
        Self {
            operation,
            duration,
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Unique error code, rendered as `UA-CCNN`.
///
/// Categories:
/// - 1: Connection
/// - 2: Server
/// - 3: Read
/// - 4: Write
/// - 5: UnsupportedType
/// - 6: Conversion
/// - 7: Browse
/// - 8: Operation
/// - 9: Subscription
/// - 10: Configuration
/// - 11: Provider
/// - 12: Cancelled
/// - 13: Timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with UaError.
pub type UaResult<T> = Result<T, UaError>;

/// A Result type for session provider primitives.
pub type ProviderResult<T> = Result<T, ProviderError>;

// =============================================================================
// Tests
// =============================================================================
