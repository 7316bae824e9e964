//! Errors for the spatial action layer

use chrono::{DateTime, Utc};
use spatial_shared::state_machine::InvalidTransition;
use spatial_shared::{Action, CommandFailure, ParseActionError, TrajectoryError};
use thiserror::Error;
use uuid::Uuid;

use crate::client::{ApiError, RetryError};

/// Why a query was refused before reaching the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnsafeReason {
    #[error("table '{0}' is not whitelisted")]
    TableNotWhitelisted(String),

    #[error("column '{column}' is not whitelisted for table '{table}'")]
    ColumnNotWhitelisted { table: String, column: String },

    #[error("statement contains forbidden pattern: {0}")]
    ForbiddenPattern(String),

    #[error("only SELECT statements are allowed")]
    NotSelect,
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsafe query: {0}")]
    UnsafeQuery(UnsafeReason),

    #[error("Action '{action}' requires explicit confirmation")]
    ConfirmationRequired { action: Action },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Device unreachable after {attempts} attempts: {last_error}")]
    DeviceUnreachable { attempts: u32, last_error: String },

    #[error("Command not found: {0}")]
    CommandNotFound(Uuid),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action '{0}' is not allowed")]
    ActionNotAllowed(Action),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Device rejected request: {0}")]
    DeviceRejected(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Device API error: {0}")]
    Api(#[from] ApiError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActionError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::InvalidRange { .. } => "invalid_range",
            ActionError::InvalidGeometry(_) => "invalid_geometry",
            ActionError::UnsafeQuery(_) => "unsafe_query",
            ActionError::ConfirmationRequired { .. } => "confirmation_required",
            ActionError::InvalidTransition(_) => "invalid_transition",
            ActionError::DeviceUnreachable { .. } => "device_unreachable",
            ActionError::CommandNotFound(_) => "command_not_found",
            ActionError::UnknownAction(_) => "unknown_action",
            ActionError::ActionNotAllowed(_) => "action_not_allowed",
            ActionError::InvalidParameter(_) => "invalid_parameter",
            ActionError::DeviceRejected(_) => "device_rejected",
            ActionError::Cancelled => "cancelled",
            ActionError::Api(_) => "api",
            ActionError::Database(_) => "database",
            ActionError::Config(_) | ActionError::Configuration(_) => "configuration",
            ActionError::Serialization(_) => "serialization",
        }
    }

    /// Whether the same call may succeed later without changes
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::DeviceUnreachable { .. } => true,
            ActionError::Api(e) => e.is_retryable(),
            ActionError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

impl From<ParseActionError> for ActionError {
    fn from(e: ParseActionError) -> Self {
        ActionError::UnknownAction(e.0)
    }
}

impl From<TrajectoryError> for ActionError {
    fn from(e: TrajectoryError) -> Self {
        ActionError::InvalidParameter(e.to_string())
    }
}

impl From<CommandFailure> for ActionError {
    fn from(failure: CommandFailure) -> Self {
        match failure {
            CommandFailure::DeviceUnreachable {
                attempts,
                last_error,
            } => ActionError::DeviceUnreachable {
                attempts,
                last_error,
            },
            CommandFailure::DeviceRejected { message } => ActionError::DeviceRejected(message),
            CommandFailure::DeadlineExceeded { attempts } => ActionError::DeviceUnreachable {
                attempts,
                last_error: "dispatch deadline exceeded".to_string(),
            },
        }
    }
}

impl From<RetryError> for ActionError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => ActionError::DeviceUnreachable {
                attempts,
                last_error,
            },
            RetryError::Terminal { error, .. } => ActionError::DeviceRejected(error),
            RetryError::Cancelled { .. } => ActionError::Cancelled,
            RetryError::DeadlineExceeded { attempts } => ActionError::DeviceUnreachable {
                attempts,
                last_error: "overall deadline exceeded".to_string(),
            },
        }
    }
}
