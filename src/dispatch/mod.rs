//! Device command lifecycle management and telemetry

mod dispatcher;
mod table;
mod telemetry;

pub use dispatcher::{CommandSubmission, DeviceDispatcher};
pub use telemetry::TelemetryFeed;
