//! Device command dispatcher
//!
//! Validates submissions, records them in the command table and delivers
//! them through per-device lanes. Each lane is a task draining an mpsc queue,
//! so commands for one device go out in submission order while different
//! devices proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use spatial_shared::state_machine::CommandEvent;
use spatial_shared::{limits, Action, CommandFailure, CommandStatus, Device, DeviceCommand};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::table::{CommandEntry, CommandTable};
use super::telemetry::TelemetryFeed;
use crate::client::{
    ApiError, AttemptError, CancelSignal, CommandRequest, DeviceApi, ResilientClient, RetryError,
};
use crate::config::DispatcherConfig;
use crate::error::ActionError;

/// A caller's request to run an action on a device
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandSubmission {
    pub device_id: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub priority: Option<u8>,
    /// Caller acknowledges a destructive action
    #[serde(default)]
    pub confirmed: bool,
}

impl CommandSubmission {
    pub fn new(device_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            action: action.into(),
            parameters: Map::new(),
            priority: None,
            confirmed: false,
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

type Lane = mpsc::UnboundedSender<Arc<CommandEntry>>;

/// Submits, tracks and cancels device commands
#[derive(Clone)]
pub struct DeviceDispatcher {
    api: Arc<dyn DeviceApi>,
    client: ResilientClient,
    config: Arc<DispatcherConfig>,
    table: Arc<CommandTable>,
    lanes: Arc<Mutex<HashMap<String, Lane>>>,
}

impl DeviceDispatcher {
    pub fn new(api: Arc<dyn DeviceApi>, client: ResilientClient, config: DispatcherConfig) -> Self {
        Self {
            api,
            client,
            config: Arc::new(config),
            table: Arc::new(CommandTable::new()),
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate and queue a command, returning its pending record
    pub async fn submit(&self, submission: CommandSubmission) -> Result<DeviceCommand, ActionError> {
        let action: Action = submission.action.parse()?;

        if let Some(allowed) = &self.config.allowed_actions {
            if !allowed.contains(&action) {
                return Err(ActionError::ActionNotAllowed(action));
            }
        }

        let priority = submission.priority.unwrap_or(limits::DEFAULT_PRIORITY);
        if !(limits::MIN_PRIORITY..=limits::MAX_PRIORITY).contains(&priority) {
            return Err(ActionError::InvalidParameter(format!(
                "priority must be in [{}, {}], got {}",
                limits::MIN_PRIORITY,
                limits::MAX_PRIORITY,
                priority
            )));
        }

        check_device_id(&submission.device_id)?;

        if self.config.confirmation_required.contains(&action) && !submission.confirmed {
            return Err(ActionError::ConfirmationRequired { action });
        }

        let command = DeviceCommand::new(
            submission.device_id,
            action,
            submission.parameters,
            priority,
        );
        let snapshot = command.clone();
        let entry = self.table.insert(command).await;
        info!(
            "Queued command {} ({}) for {}",
            snapshot.id, snapshot.action, snapshot.device_id
        );

        self.enqueue(&snapshot.device_id, entry).await;
        Ok(snapshot)
    }

    async fn enqueue(&self, device_id: &str, entry: Arc<CommandEntry>) {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes
            .entry(device_id.to_string())
            .or_insert_with(|| self.spawn_lane(device_id));

        if let Err(mpsc::error::SendError(entry)) = lane.send(entry) {
            // Lane task is gone, start a fresh one
            let fresh = self.spawn_lane(device_id);
            if fresh.send(entry).is_err() {
                warn!("Failed to queue command for {}", device_id);
            }
            *lane = fresh;
        }
    }

    fn spawn_lane(&self, device_id: &str) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<CommandEntry>>();
        let api = self.api.clone();
        let client = self.client.clone();
        let device_id = device_id.to_string();

        tokio::spawn(async move {
            debug!("Dispatch lane for {} started", device_id);
            while let Some(entry) = rx.recv().await {
                deliver(api.as_ref(), &client, &entry).await;
            }
            debug!("Dispatch lane for {} stopped", device_id);
        });

        tx
    }

    /// Cancel a pending or executing command
    ///
    /// The remote cancel request is best effort; its failure is only logged.
    pub async fn cancel(&self, command_id: Uuid) -> Result<DeviceCommand, ActionError> {
        let entry = self.entry(command_id).await?;
        entry.apply(CommandEvent::Cancel).await?;
        entry.interrupt();
        info!("Cancelled command {}", command_id);

        let remote = tokio::time::timeout(
            self.client.policy().attempt_timeout,
            self.api.cancel_command(command_id),
        )
        .await;
        match remote {
            Ok(Ok(())) => debug!("Device API acknowledged cancel of {}", command_id),
            Ok(Err(e)) => warn!("Remote cancel of {} failed: {}", command_id, e),
            Err(_) => warn!("Remote cancel of {} timed out", command_id),
        }

        Ok(entry.snapshot().await)
    }

    /// Last known record, no network I/O
    pub async fn status(&self, command_id: Uuid) -> Result<DeviceCommand, ActionError> {
        Ok(self.entry(command_id).await?.snapshot().await)
    }

    /// Commands for one device, most recent first
    pub async fn commands_for_device(&self, device_id: &str, limit: Option<usize>) -> Vec<DeviceCommand> {
        let limit = limit
            .unwrap_or(self.config.history_limit)
            .min(self.config.history_limit);
        let mut commands = Vec::new();
        for entry in self.table.for_device(device_id, limit).await {
            commands.push(entry.snapshot().await);
        }
        commands
    }

    /// Resolve once the command reaches a terminal status
    pub async fn wait(&self, command_id: Uuid) -> Result<DeviceCommand, ActionError> {
        let entry = self.entry(command_id).await?;
        let mut rx = entry.subscribe();
        // The sender lives in the entry, so this only ends on a terminal status
        let _ = rx.wait_for(CommandStatus::is_terminal).await;
        Ok(entry.snapshot().await)
    }

    /// Watch status changes of one command
    pub async fn subscribe(&self, command_id: Uuid) -> Result<watch::Receiver<CommandStatus>, ActionError> {
        Ok(self.entry(command_id).await?.subscribe())
    }

    /// The device API's own view of a command
    pub async fn remote_status(&self, command_id: Uuid) -> Result<Value, ActionError> {
        self.call(move |api| async move { api.get_command(command_id).await })
            .await
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, ActionError> {
        self.call(|api| async move { api.list_devices().await }).await
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Device, ActionError> {
        check_device_id(device_id)?;
        let device_id = device_id.to_string();
        self.call(move |api| {
            let device_id = device_id.clone();
            async move { api.get_device(&device_id).await }
        })
        .await
    }

    pub async fn health(&self) -> Result<Value, ActionError> {
        self.call(|api| async move { api.health().await }).await
    }

    /// Open a live telemetry feed; connecting is retried, the stream is not
    pub async fn telemetry(&self, device_id: &str) -> Result<TelemetryFeed, ActionError> {
        check_device_id(device_id)?;
        let id = device_id.to_string();
        let stream = self
            .call(move |api| {
                let id = id.clone();
                async move { api.telemetry_stream(&id).await }
            })
            .await?;
        info!("Opened telemetry feed for {}", device_id);
        Ok(TelemetryFeed::spawn(device_id, stream))
    }

    /// Number of commands tracked since startup
    pub async fn tracked_commands(&self) -> usize {
        self.table.len().await
    }

    async fn entry(&self, command_id: Uuid) -> Result<Arc<CommandEntry>, ActionError> {
        self.table
            .get(command_id)
            .await
            .ok_or(ActionError::CommandNotFound(command_id))
    }

    /// Run one device API call under the retry policy
    async fn call<T, F, Fut>(&self, f: F) -> Result<T, ActionError>
    where
        F: Fn(Arc<dyn DeviceApi>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.client
            .execute(
                |_| {
                    let request = f(self.api.clone());
                    async move { request.await.map_err(AttemptError::from) }
                },
                &CancelSignal::never(),
            )
            .await
            .map(|done| done.value)
            .map_err(ActionError::from)
    }
}

/// Device ids travel as a single URL path segment
fn check_device_id(device_id: &str) -> Result<(), ActionError> {
    if device_id.trim().is_empty() {
        return Err(ActionError::InvalidParameter(
            "device id cannot be empty".to_string(),
        ));
    }
    if matches!(device_id, "." | "..") || device_id.chars().any(char::is_control) {
        return Err(ActionError::InvalidParameter(format!(
            "invalid device id {:?}",
            device_id
        )));
    }
    Ok(())
}

/// Drive one command from pending to a terminal status
async fn deliver(api: &dyn DeviceApi, client: &ResilientClient, entry: &CommandEntry) {
    if let Err(e) = entry.apply(CommandEvent::Dispatch).await {
        // Cancelled while queued
        debug!("Skipping command: {}", e);
        return;
    }

    let command = entry.snapshot().await;
    let request = CommandRequest::from(&command);
    info!(
        "Dispatching command {} ({}) to {}",
        command.id, command.action, command.device_id
    );

    let result = client
        .execute(
            |attempt| {
                let request = &request;
                async move {
                    entry.record_attempt(attempt).await;
                    api.submit_command(request).await.map_err(AttemptError::from)
                }
            },
            &entry.cancel_signal(),
        )
        .await;

    if let Err(e) = &result {
        warn!(
            "Command {} not delivered after {} attempts: {}",
            command.id,
            e.attempts(),
            e
        );
    }

    let event = match result {
        Ok(done) => CommandEvent::Complete(done.value),
        Err(RetryError::Cancelled { .. }) => return,
        Err(RetryError::Exhausted {
            attempts,
            last_error,
        }) => CommandEvent::Fail(CommandFailure::DeviceUnreachable {
            attempts,
            last_error,
        }),
        Err(RetryError::Terminal { error, .. }) => {
            CommandEvent::Fail(CommandFailure::DeviceRejected { message: error })
        }
        Err(RetryError::DeadlineExceeded { attempts }) => {
            CommandEvent::Fail(CommandFailure::DeadlineExceeded { attempts })
        }
    };

    match entry.apply(event).await {
        Ok(status) => info!("Command {} {}", command.id, status),
        Err(e) => debug!("Discarding late outcome for {}: {}", command.id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RetryPolicy, TelemetryStream};
    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use serde_json::json;
    use spatial_shared::TelemetryPayload;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// How the mock answers one `submit_command`
    enum Reply {
        Respond(Value),
        Status(u16),
        Hang,
        AfterNotify(Arc<Notify>, Value),
    }

    #[derive(Default)]
    struct MockApi {
        replies: StdMutex<VecDeque<Reply>>,
        submitted: StdMutex<Vec<CommandRequest>>,
        cancelled: StdMutex<Vec<Uuid>>,
    }

    impl MockApi {
        fn with_replies(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.into()),
                ..Self::default()
            })
        }

        fn submitted_ids(&self) -> Vec<Uuid> {
            self.submitted.lock().unwrap().iter().map(|r| r.command_id).collect()
        }
    }

    #[async_trait]
    impl DeviceApi for MockApi {
        async fn health(&self) -> Result<Value, ApiError> {
            Ok(json!({ "status": "ok" }))
        }

        async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
            Ok(vec![])
        }

        async fn get_device(&self, device_id: &str) -> Result<Device, ApiError> {
            Err(ApiError::Status {
                status: 404,
                body: format!("no device {}", device_id),
            })
        }

        async fn submit_command(&self, request: &CommandRequest) -> Result<Value, ApiError> {
            self.submitted.lock().unwrap().push(request.clone());
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                None => Ok(json!({ "accepted": true })),
                Some(Reply::Respond(body)) => Ok(body),
                Some(Reply::Status(status)) => Err(ApiError::Status {
                    status,
                    body: "refused".into(),
                }),
                Some(Reply::Hang) => std::future::pending().await,
                Some(Reply::AfterNotify(gate, body)) => {
                    gate.notified().await;
                    Ok(body)
                }
            }
        }

        async fn get_command(&self, command_id: Uuid) -> Result<Value, ApiError> {
            Ok(json!({ "id": command_id, "status": "executing" }))
        }

        async fn cancel_command(&self, command_id: Uuid) -> Result<(), ApiError> {
            self.cancelled.lock().unwrap().push(command_id);
            Ok(())
        }

        async fn telemetry_stream(&self, device_id: &str) -> Result<TelemetryStream, ApiError> {
            let payloads: Vec<Result<TelemetryPayload, ApiError>> = (0..3)
                .map(|i| {
                    Ok(serde_json::from_value(json!({ "device_id": device_id, "battery": 90 - i }))
                        .unwrap())
                })
                .collect();
            Ok(stream::iter(payloads).boxed())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
            overall_timeout: Some(Duration::from_secs(60)),
        }
    }

    fn dispatcher(api: Arc<MockApi>) -> DeviceDispatcher {
        DeviceDispatcher::new(api, ResilientClient::new(policy()), DispatcherConfig::default())
    }

    async fn reach(dispatcher: &DeviceDispatcher, id: Uuid, status: CommandStatus) {
        let mut rx = dispatcher.subscribe(id).await.unwrap();
        rx.wait_for(|s| *s == status).await.unwrap();
    }

    #[tokio::test]
    async fn test_takeoff_requires_confirmation() {
        let api = MockApi::with_replies(vec![]);
        let dispatcher = dispatcher(api.clone());

        let err = dispatcher
            .submit(CommandSubmission::new("drone-1", "takeoff"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ActionError::ConfirmationRequired {
                action: Action::Takeoff
            }
        ));
        assert!(!err.is_retryable());
        assert_eq!(dispatcher.tracked_commands().await, 0);
        assert!(api.submitted_ids().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_takeoff_reaches_executing_then_completes() {
        let gate = Arc::new(Notify::new());
        let api = MockApi::with_replies(vec![Reply::AfterNotify(
            gate.clone(),
            json!({ "accepted": true, "eta_s": 4 }),
        )]);
        let dispatcher = dispatcher(api);

        let command = dispatcher
            .submit(CommandSubmission::new("drone-1", "takeoff").confirmed())
            .await
            .unwrap();
        assert_eq!(command.status, CommandStatus::Pending);

        reach(&dispatcher, command.id, CommandStatus::Executing).await;
        let executing = dispatcher.status(command.id).await.unwrap();
        assert!(executing.started_at.is_some());

        gate.notify_one();
        let done = dispatcher.wait(command.id).await.unwrap();
        assert_eq!(done.status, CommandStatus::Completed);
        assert_eq!(done.attempts, 1);
        assert_eq!(done.result, Some(json!({ "accepted": true, "eta_s": 4 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_timeouts_fail_as_unreachable() {
        let api = MockApi::with_replies(vec![Reply::Hang, Reply::Hang, Reply::Hang]);
        let dispatcher = dispatcher(api.clone());

        let command = dispatcher
            .submit(CommandSubmission::new("drone-1", "capture_photo"))
            .await
            .unwrap();
        let failed = dispatcher.wait(command.id).await.unwrap();

        assert_eq!(failed.status, CommandStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert!(matches!(
            failed.error,
            Some(CommandFailure::DeviceUnreachable { attempts: 3, .. })
        ));
        assert_eq!(api.submitted_ids().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let api = MockApi::with_replies(vec![
            Reply::Status(503),
            Reply::Respond(json!({ "photo": "img-1.jpg" })),
        ]);
        let dispatcher = dispatcher(api);

        let command = dispatcher
            .submit(CommandSubmission::new("drone-1", "capture_photo"))
            .await
            .unwrap();
        let done = dispatcher.wait(command.id).await.unwrap();

        assert_eq!(done.status, CommandStatus::Completed);
        assert_eq!(done.attempts, 2);
    }

    #[tokio::test]
    async fn test_device_rejection_is_not_retried() {
        let api = MockApi::with_replies(vec![Reply::Status(422)]);
        let dispatcher = dispatcher(api.clone());

        let command = dispatcher
            .submit(CommandSubmission::new("robot-3", "move_to"))
            .await
            .unwrap();
        let failed = dispatcher.wait(command.id).await.unwrap();

        assert_eq!(failed.status, CommandStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(matches!(
            failed.error,
            Some(CommandFailure::DeviceRejected { .. })
        ));
        assert_eq!(api.submitted_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_completed_command_is_invalid() {
        let api = MockApi::with_replies(vec![Reply::Respond(json!({ "ok": 1 }))]);
        let dispatcher = dispatcher(api.clone());

        let command = dispatcher
            .submit(CommandSubmission::new("drone-1", "start_video"))
            .await
            .unwrap();
        let done = dispatcher.wait(command.id).await.unwrap();
        assert_eq!(done.status, CommandStatus::Completed);

        let err = dispatcher.cancel(command.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidTransition(_)));

        let after = dispatcher.status(command.id).await.unwrap();
        assert_eq!(after, done);
        assert!(api.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_executing_interrupts_dispatch() {
        let api = MockApi::with_replies(vec![Reply::Hang]);
        let dispatcher = dispatcher(api.clone());

        let command = dispatcher
            .submit(CommandSubmission::new("drone-1", "move_to"))
            .await
            .unwrap();
        reach(&dispatcher, command.id, CommandStatus::Executing).await;
        while api.submitted_ids().is_empty() {
            tokio::task::yield_now().await;
        }

        let cancelled = dispatcher.cancel(command.id).await.unwrap();
        assert_eq!(cancelled.status, CommandStatus::Cancelled);
        assert_eq!(*api.cancelled.lock().unwrap(), vec![command.id]);

        // Well past every attempt timeout; nothing overwrites the cancellation
        tokio::time::sleep(Duration::from_secs(120)).await;
        let after = dispatcher.status(command.id).await.unwrap();
        assert_eq!(after.status, CommandStatus::Cancelled);
        assert_eq!(api.submitted_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_same_device_commands_keep_submission_order() {
        let api = MockApi::with_replies(vec![]);
        let dispatcher = dispatcher(api.clone());

        let mut ids = Vec::new();
        for action in ["move_to", "capture_photo", "set_speed", "pause"] {
            let command = dispatcher
                .submit(CommandSubmission::new("drone-1", action))
                .await
                .unwrap();
            ids.push(command.id);
        }
        for id in &ids {
            dispatcher.wait(*id).await.unwrap();
        }

        assert_eq!(api.submitted_ids(), ids);

        let history = dispatcher.commands_for_device("drone-1", Some(2)).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, ids[3]);
    }

    #[tokio::test]
    async fn test_cancel_pending_command_is_never_sent() {
        let gate = Arc::new(Notify::new());
        let api = MockApi::with_replies(vec![Reply::AfterNotify(gate.clone(), json!({}))]);
        let dispatcher = dispatcher(api.clone());

        let first = dispatcher
            .submit(CommandSubmission::new("drone-1", "move_to"))
            .await
            .unwrap();
        let second = dispatcher
            .submit(CommandSubmission::new("drone-1", "capture_photo"))
            .await
            .unwrap();
        reach(&dispatcher, first.id, CommandStatus::Executing).await;

        let cancelled = dispatcher.cancel(second.id).await.unwrap();
        assert_eq!(cancelled.status, CommandStatus::Cancelled);

        gate.notify_one();
        dispatcher.wait(first.id).await.unwrap();
        let third = dispatcher
            .submit(CommandSubmission::new("drone-1", "pause"))
            .await
            .unwrap();
        dispatcher.wait(third.id).await.unwrap();

        assert_eq!(api.submitted_ids(), vec![first.id, third.id]);
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let api = MockApi::with_replies(vec![]);
        let config = DispatcherConfig {
            allowed_actions: Some(vec![Action::MoveTo, Action::Takeoff]),
            ..DispatcherConfig::default()
        };
        let dispatcher = DeviceDispatcher::new(api, ResilientClient::new(policy()), config);

        let err = dispatcher
            .submit(CommandSubmission::new("drone-1", "barrel_roll"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_action");

        let err = dispatcher
            .submit(CommandSubmission::new("drone-1", "capture_photo"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::ActionNotAllowed(Action::CapturePhoto)));

        let err = dispatcher
            .submit(CommandSubmission::new("drone-1", "move_to").with_priority(11))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameter(_)));

        let err = dispatcher
            .submit(CommandSubmission::new("drone-1", "move_to").with_priority(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameter(_)));

        for device_id in ["", "  ", "..", ".", "drone\n1"] {
            let err = dispatcher
                .submit(CommandSubmission::new(device_id, "move_to"))
                .await
                .unwrap_err();
            assert!(matches!(err, ActionError::InvalidParameter(_)), "{device_id:?}");
        }
        assert_eq!(dispatcher.tracked_commands().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let dispatcher = dispatcher(MockApi::with_replies(vec![]));
        let id = Uuid::new_v4();
        assert!(matches!(
            dispatcher.status(id).await,
            Err(ActionError::CommandNotFound(missing)) if missing == id
        ));
        assert!(matches!(
            dispatcher.cancel(id).await,
            Err(ActionError::CommandNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_device_lookup_errors_surface() {
        let dispatcher = dispatcher(MockApi::with_replies(vec![]));
        let err = dispatcher.get_device("ghost").await.unwrap_err();
        assert!(matches!(err, ActionError::DeviceRejected(_)));
        assert_eq!(dispatcher.health().await.unwrap()["status"], "ok");

        let err = dispatcher.get_device("..").await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameter(_)));
        assert!(matches!(
            dispatcher.telemetry(".").await,
            Err(ActionError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_telemetry_feed() {
        let dispatcher = dispatcher(MockApi::with_replies(vec![]));
        let feed = dispatcher.telemetry("drone-9").await.unwrap();
        let payloads: Vec<_> = feed.collect().await;

        assert_eq!(payloads.len(), 3);
        assert!(payloads.iter().all(|p| p.device_id == "drone-9"));
        assert_eq!(payloads[0].battery, Some(90.0));
    }
}
