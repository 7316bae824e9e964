//! Command Lifecycle State Machine
//!
//! Defines the valid status transitions of a device command. Transitions are
//! monotonic: once a command reaches a terminal status it never moves again.

use chrono::Utc;
use thiserror::Error;

use crate::{CommandFailure, CommandStatus, DeviceCommand};

/// Events that can move a command through its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// Dispatch to the device has started
    Dispatch,
    /// The device accepted and finished the command
    Complete(serde_json::Value),
    /// Dispatch failed for good
    Fail(CommandFailure),
    /// The caller withdrew the command
    Cancel,
}

impl CommandEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CommandEvent::Dispatch => "dispatch",
            CommandEvent::Complete(_) => "complete",
            CommandEvent::Fail(_) => "fail",
            CommandEvent::Cancel => "cancel",
        }
    }
}

/// A transition that is not allowed from the current status
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot {event} a command that is {from}")]
pub struct InvalidTransition {
    pub from: CommandStatus,
    pub event: &'static str,
}

/// Get the next status for a given event, if the transition is valid
pub fn next_status(from: CommandStatus, event: &CommandEvent) -> Option<CommandStatus> {
    use CommandStatus::*;

    match (from, event) {
        (Pending, CommandEvent::Dispatch) => Some(Executing),
        (Pending, CommandEvent::Cancel) => Some(Cancelled),

        (Executing, CommandEvent::Complete(_)) => Some(Completed),
        (Executing, CommandEvent::Fail(_)) => Some(Failed),
        (Executing, CommandEvent::Cancel) => Some(Cancelled),

        // Terminal states accept nothing
        _ => None,
    }
}

impl DeviceCommand {
    /// Apply a lifecycle event, updating status, timestamps and outcome
    ///
    /// On an invalid transition the command is left untouched.
    pub fn apply(&mut self, event: CommandEvent) -> Result<CommandStatus, InvalidTransition> {
        let next = next_status(self.status, &event).ok_or(InvalidTransition {
            from: self.status,
            event: event.name(),
        })?;

        let now = Utc::now();
        match event {
            CommandEvent::Dispatch => {
                self.started_at = Some(now);
            }
            CommandEvent::Complete(result) => {
                self.result = Some(result);
                self.completed_at = Some(now);
            }
            CommandEvent::Fail(failure) => {
                self.error = Some(failure);
                self.completed_at = Some(now);
            }
            CommandEvent::Cancel => {
                self.completed_at = Some(now);
            }
        }
        self.status = next;

        Ok(next)
    }
}
