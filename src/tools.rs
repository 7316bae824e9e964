//! Agent-facing tool surface
//!
//! Each tool call is a JSON object `{"tool": <name>, "args": {...}}`; each
//! response is `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": {"kind": ..., "message": ...}}`.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spatial_shared::geofence::fence_events;
use spatial_shared::geometry::summarize;
use spatial_shared::{limits, GeoFence, Trajectory, TrajectoryPoint};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::{CommandSubmission, DeviceDispatcher};
use crate::error::ActionError;
use crate::query::{QueryService, SpatialQueryDescription};

/// Cap on events gathered by one `telemetry_sample` call
const MAX_TELEMETRY_SAMPLES: usize = 1000;

fn default_speed_threshold() -> f64 {
    limits::STOP_SPEED_THRESHOLD
}

fn default_min_stop_duration() -> f64 {
    limits::STOP_MIN_DURATION_S
}

fn default_dwell_threshold() -> f64 {
    60.0
}

fn default_max_events() -> usize {
    10
}

fn default_sample_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpatialQueryArgs {
    pub query: SpatialQueryDescription,
    /// Compile and validate only
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrajectoryArgs {
    pub entity_id: String,
    pub points: Vec<TrajectoryPoint>,
    #[serde(default = "default_speed_threshold")]
    pub speed_threshold: f64,
    #[serde(default = "default_min_stop_duration")]
    pub min_stop_duration_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceArgs {
    pub fence: GeoFence,
    pub entity_id: String,
    pub points: Vec<TrajectoryPoint>,
    #[serde(default = "default_dwell_threshold")]
    pub dwell_threshold_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRef {
    pub command_id: Uuid,
    /// Ask the device API instead of the local table
    #[serde(default)]
    pub remote: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRef {
    pub device_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySampleArgs {
    pub device_id: String,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    #[serde(default = "default_sample_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    SpatialQuery(SpatialQueryArgs),
    TableCounts,
    TrajectoryStats(TrajectoryArgs),
    GeofenceEvents(GeofenceArgs),
    SubmitCommand(CommandSubmission),
    CancelCommand(CommandRef),
    CommandStatus(CommandRef),
    DeviceCommands(DeviceRef),
    ListDevices,
    GetDevice(DeviceRef),
    TelemetrySample(TelemetrySampleArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SpatialQuery(_) => "spatial_query",
            ToolCall::TableCounts => "table_counts",
            ToolCall::TrajectoryStats(_) => "trajectory_stats",
            ToolCall::GeofenceEvents(_) => "geofence_events",
            ToolCall::SubmitCommand(_) => "submit_command",
            ToolCall::CancelCommand(_) => "cancel_command",
            ToolCall::CommandStatus(_) => "command_status",
            ToolCall::DeviceCommands(_) => "device_commands",
            ToolCall::ListDevices => "list_devices",
            ToolCall::GetDevice(_) => "get_device",
            ToolCall::TelemetrySample(_) => "telemetry_sample",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &ActionError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ToolError {
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
        }
    }
}

/// Query, device control and trajectory analysis as callable tools
pub struct SpatialTools {
    queries: QueryService,
    dispatcher: DeviceDispatcher,
}

impl SpatialTools {
    pub fn new(queries: QueryService, dispatcher: DeviceDispatcher) -> Self {
        Self {
            queries,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &DeviceDispatcher {
        &self.dispatcher
    }

    /// Parse and run one JSON tool call
    pub async fn handle_line(&self, line: &str) -> ToolResponse {
        match serde_json::from_str::<ToolCall>(line) {
            Ok(call) => self.call(call).await,
            Err(e) => {
                warn!("Rejected malformed tool call: {}", e);
                ToolResponse::failure(&ActionError::from(e))
            }
        }
    }

    pub async fn call(&self, call: ToolCall) -> ToolResponse {
        let name = call.name();
        debug!("Tool call: {}", name);
        match self.dispatch(call).await {
            Ok(data) => ToolResponse::success(data),
            Err(e) => {
                warn!("Tool {} failed ({}): {}", name, e.kind(), e);
                ToolResponse::failure(&e)
            }
        }
    }

    async fn dispatch(&self, call: ToolCall) -> Result<Value, ActionError> {
        match call {
            ToolCall::SpatialQuery(args) => {
                if args.dry_run {
                    Ok(serde_json::to_value(self.queries.prepare(&args.query)?)?)
                } else {
                    Ok(serde_json::to_value(self.queries.run(&args.query).await?)?)
                }
            }
            ToolCall::TableCounts => Ok(serde_json::to_value(self.queries.table_counts().await?)?),
            ToolCall::TrajectoryStats(args) => {
                let trajectory = Trajectory::new(args.entity_id, args.points)?;
                let stats = summarize(
                    trajectory.points(),
                    args.speed_threshold,
                    args.min_stop_duration_s,
                );
                Ok(json!({
                    "entity_id": trajectory.entity_id(),
                    "start_time": trajectory.start_time(),
                    "end_time": trajectory.end_time(),
                    "stats": stats,
                }))
            }
            ToolCall::GeofenceEvents(args) => {
                let trajectory = Trajectory::new(args.entity_id, args.points)?;
                let events = fence_events(
                    &args.fence,
                    trajectory.entity_id(),
                    trajectory.points(),
                    args.dwell_threshold_s,
                );
                Ok(serde_json::to_value(events)?)
            }
            ToolCall::SubmitCommand(submission) => {
                Ok(serde_json::to_value(self.dispatcher.submit(submission).await?)?)
            }
            ToolCall::CancelCommand(target) => {
                Ok(serde_json::to_value(self.dispatcher.cancel(target.command_id).await?)?)
            }
            ToolCall::CommandStatus(target) => {
                if target.remote {
                    self.dispatcher.remote_status(target.command_id).await
                } else {
                    Ok(serde_json::to_value(self.dispatcher.status(target.command_id).await?)?)
                }
            }
            ToolCall::DeviceCommands(device) => {
                let commands = self
                    .dispatcher
                    .commands_for_device(&device.device_id, device.limit)
                    .await;
                Ok(serde_json::to_value(commands)?)
            }
            ToolCall::ListDevices => Ok(serde_json::to_value(self.dispatcher.list_devices().await?)?),
            ToolCall::GetDevice(device) => {
                Ok(serde_json::to_value(self.dispatcher.get_device(&device.device_id).await?)?)
            }
            ToolCall::TelemetrySample(args) => {
                let max_events = args.max_events.clamp(1, MAX_TELEMETRY_SAMPLES);
                let feed = self.dispatcher.telemetry(&args.device_id).await?;
                let samples: Vec<_> = feed
                    .take(max_events)
                    .take_until(tokio::time::sleep(Duration::from_millis(args.timeout_ms)))
                    .collect()
                    .await;
                Ok(serde_json::to_value(samples)?)
            }
        }
    }
}
