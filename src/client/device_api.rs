//! Device API collaborator abstraction

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value};
use spatial_shared::codec::CodecError;
use spatial_shared::{Action, Device, DeviceCommand, TelemetryPayload};
use thiserror::Error;
use uuid::Uuid;

/// Live telemetry for one device, ends when the connection does
pub type TelemetryStream = BoxStream<'static, Result<TelemetryPayload, ApiError>>;

/// Errors talking to the device API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("device API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("telemetry stream error: {0}")]
    Stream(#[from] CodecError),
}

impl ApiError {
    /// Transport failures, timeouts, 408, 429 and 5xx are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::Timeout => true,
            ApiError::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            ApiError::Decode(_) | ApiError::Stream(_) => false,
        }
    }
}

/// Body of `POST /commands`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRequest {
    pub command_id: Uuid,
    pub device_id: String,
    pub action: Action,
    pub parameters: Map<String, Value>,
    pub priority: u8,
}

impl From<&DeviceCommand> for CommandRequest {
    fn from(command: &DeviceCommand) -> Self {
        Self {
            command_id: command.id,
            device_id: command.device_id.clone(),
            action: command.action,
            parameters: command.parameters.clone(),
            priority: command.priority,
        }
    }
}

/// Remote device management API
///
/// Implementations make exactly one physical request per call. Retries and
/// timeouts are layered on top by the dispatcher.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn health(&self) -> Result<Value, ApiError>;

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError>;

    async fn get_device(&self, device_id: &str) -> Result<Device, ApiError>;

    /// Deliver a command, returning the device's response body
    async fn submit_command(&self, request: &CommandRequest) -> Result<Value, ApiError>;

    /// Remote view of a previously submitted command
    async fn get_command(&self, command_id: Uuid) -> Result<Value, ApiError>;

    async fn cancel_command(&self, command_id: Uuid) -> Result<(), ApiError>;

    /// Open the device's telemetry event stream
    async fn telemetry_stream(&self, device_id: &str) -> Result<TelemetryStream, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 599] {
            let err = ApiError::Status {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
        for status in [400, 401, 403, 404, 409, 422] {
            let err = ApiError::Status {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{status} should be terminal");
        }
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::Transport("connection refused".into()).is_retryable());
        assert!(!ApiError::Decode("expected object".into()).is_retryable());
    }

    #[test]
    fn test_command_request_body() {
        let mut parameters = Map::new();
        parameters.insert("altitude".into(), Value::from(30));
        let command = DeviceCommand::new("drone-7", Action::SetAltitude, parameters, 4);

        let body = serde_json::to_value(CommandRequest::from(&command)).unwrap();
        assert_eq!(body["command_id"], Value::from(command.id.to_string()));
        assert_eq!(body["device_id"], "drone-7");
        assert_eq!(body["action"], "set_altitude");
        assert_eq!(body["parameters"]["altitude"], 30);
        assert_eq!(body["priority"], 4);
    }
}
