//! Spatial action layer
//!
//! Lets an agent query geospatial telemetry through a whitelisted,
//! parameterized SQL compiler, drive remote devices through a retrying
//! command dispatcher, and analyse trajectories it already holds.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod query;
pub mod tools;

pub use error::{ActionError, UnsafeReason};
pub use spatial_shared as shared;
