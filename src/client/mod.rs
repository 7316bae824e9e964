//! Device API access
//!
//! The `DeviceApi` trait is the seam between dispatch logic and the network.
//! `HttpDeviceApi` is the production implementation; `ResilientClient` wraps
//! any single-shot call with bounded retry, timeouts and cancellation.

mod device_api;
mod http;
mod retry;

pub use device_api::{ApiError, CommandRequest, DeviceApi, TelemetryStream};
pub use http::HttpDeviceApi;
pub use retry::{
    cancel_pair, AttemptError, Attempted, CancelHandle, CancelSignal, ResilientClient, RetryError,
    RetryPolicy,
};
