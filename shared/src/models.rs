//! Core data model shared by the query, dispatch and analysis layers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in decimal degrees, [-180, 180]
    pub longitude: f64,
    /// Latitude in decimal degrees, [-90, 90]
    pub latitude: f64,
    /// Altitude in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Check that both coordinates are finite and inside their ranges
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// One location sample of a moving entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    #[serde(flatten)]
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
    /// Recorded ground speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees, [0, 360)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Horizontal accuracy in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl TrajectoryPoint {
    pub fn new(location: GeoPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            location,
            timestamp,
            speed: None,
            heading: None,
            accuracy: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Describe the first field outside its range, if any
    fn range_error(&self) -> Option<String> {
        if !self.location.is_valid() {
            return Some(format!(
                "coordinates ({}, {}) out of range",
                self.location.longitude, self.location.latitude
            ));
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Some(format!("speed {} must be >= 0", speed));
            }
        }
        if let Some(heading) = self.heading {
            if !(0.0..360.0).contains(&heading) {
                return Some(format!("heading {} must be in [0, 360)", heading));
            }
        }
        if let Some(accuracy) = self.accuracy {
            if !accuracy.is_finite() || accuracy < 0.0 {
                return Some(format!("accuracy {} must be >= 0", accuracy));
            }
        }
        None
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    #[error("trajectory must contain at least one point")]
    Empty,

    #[error("timestamps decrease at point {index}")]
    NotMonotonic { index: usize },

    #[error("point {index} is invalid: {reason}")]
    InvalidPoint { index: usize, reason: String },
}

/// Ordered, non-empty sequence of samples for a single entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    entity_id: String,
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn new(
        entity_id: impl Into<String>,
        points: Vec<TrajectoryPoint>,
    ) -> Result<Self, TrajectoryError> {
        if points.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        for (index, point) in points.iter().enumerate() {
            if let Some(reason) = point.range_error() {
                return Err(TrajectoryError::InvalidPoint { index, reason });
            }
        }
        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(TrajectoryError::NotMonotonic { index: index + 1 });
        }
        Ok(Self {
            entity_id: entity_id.into(),
            points,
        })
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.points[0].timestamp
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.points[self.points.len() - 1].timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Drone,
    Robot,
    Sensor,
    Camera,
    Vehicle,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Busy,
    Idle,
    Error,
    Maintenance,
    Charging,
}

/// A remote device as reported by the device API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Battery percentage, [0, 100]
    #[serde(default)]
    pub battery: Option<f64>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

/// The closed set of actions a device command can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Takeoff,
    Land,
    MoveTo,
    ReturnHome,
    Pause,
    Resume,
    Stop,
    CapturePhoto,
    StartVideo,
    StopVideo,
    SetAltitude,
    SetSpeed,
    Custom,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::Takeoff,
        Action::Land,
        Action::MoveTo,
        Action::ReturnHome,
        Action::Pause,
        Action::Resume,
        Action::Stop,
        Action::CapturePhoto,
        Action::StartVideo,
        Action::StopVideo,
        Action::SetAltitude,
        Action::SetSpeed,
        Action::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Takeoff => "takeoff",
            Action::Land => "land",
            Action::MoveTo => "move_to",
            Action::ReturnHome => "return_home",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Stop => "stop",
            Action::CapturePhoto => "capture_photo",
            Action::StartVideo => "start_video",
            Action::StopVideo => "stop_video",
            Action::SetAltitude => "set_altitude",
            Action::SetSpeed => "set_speed",
            Action::Custom => "custom",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ParseActionError(s.to_string()))
    }
}

/// Lifecycle status of a device command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Cancelled
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executing => "executing",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
            CommandStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a dispatched command ended in `failed`
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandFailure {
    #[error("device unreachable after {attempts} attempts: {last_error}")]
    DeviceUnreachable { attempts: u32, last_error: String },

    #[error("device rejected command: {message}")]
    DeviceRejected { message: String },

    #[error("dispatch deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
}

/// A command addressed to one device, tracked through its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub id: Uuid,
    pub device_id: String,
    pub action: Action,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Priority, [1, 10]
    pub priority: u8,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Physical dispatch attempts made so far
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<CommandFailure>,
}

impl DeviceCommand {
    /// Create a new pending command with a fresh id
    pub fn new(
        device_id: impl Into<String>,
        action: Action,
        parameters: serde_json::Map<String, serde_json::Value>,
        priority: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            action,
            parameters,
            priority,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempts: 0,
            result: None,
            error: None,
        }
    }
}

/// Fence shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FenceGeometry {
    /// Outer ring, closed (first position repeated last)
    Polygon { ring: Vec<GeoPoint> },
    Circle { center: GeoPoint, radius_m: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFence {
    pub id: String,
    pub name: String,
    pub geometry: FenceGeometry,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFenceEventKind {
    Enter,
    Exit,
    Dwell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFenceEvent {
    pub fence_id: String,
    pub entity_id: String,
    pub kind: GeoFenceEventKind,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
    /// Seconds spent inside, set on dwell events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_seconds: Option<f64>,
}

/// One telemetry sample pushed by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub device_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    /// Fields not covered above, preserved as sent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
