//! Spatial Action Layer shared types
//!
//! This crate provides the data model, command lifecycle state machine,
//! telemetry event-stream codec and trajectory geometry used by the query
//! compiler, the device dispatcher and agent-facing tools.

pub mod codec;
pub mod geofence;
pub mod geometry;
pub mod models;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use models::*;

/// Fixed parameters of the system
pub mod limits {
    /// Mean Earth radius used for great-circle distance, in meters
    pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

    /// Priority bounds for device commands
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;
    pub const DEFAULT_PRIORITY: u8 = 5;

    /// Row limit applied when no maximum is configured
    pub const DEFAULT_MAX_ROWS: u32 = 1000;

    /// Stop detection defaults: speed in m/s, duration in seconds
    pub const STOP_SPEED_THRESHOLD: f64 = 0.5;
    pub const STOP_MIN_DURATION_S: f64 = 60.0;
}

/// Actions that need explicit caller confirmation unless configured otherwise
pub fn default_confirmation_actions() -> Vec<Action> {
    vec![Action::Takeoff, Action::Land, Action::ReturnHome, Action::Stop]
}
