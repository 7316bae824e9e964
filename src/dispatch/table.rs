//! In-memory command table

use std::collections::HashMap;
use std::sync::Arc;

use spatial_shared::state_machine::{CommandEvent, InvalidTransition};
use spatial_shared::{CommandStatus, DeviceCommand};
use tokio::sync::{watch, Mutex, RwLock};
use uuid::Uuid;

use crate::client::{cancel_pair, CancelHandle, CancelSignal};

/// One tracked command plus its notification and cancellation plumbing
///
/// The command lock is only held for in-memory updates, never across I/O.
pub struct CommandEntry {
    command: Mutex<DeviceCommand>,
    status_tx: watch::Sender<CommandStatus>,
    cancel: CancelHandle,
    signal: CancelSignal,
}

impl CommandEntry {
    fn new(command: DeviceCommand) -> Self {
        let (status_tx, _) = watch::channel(command.status);
        let (cancel, signal) = cancel_pair();
        Self {
            command: Mutex::new(command),
            status_tx,
            cancel,
            signal,
        }
    }

    /// Copy of the current record
    pub async fn snapshot(&self) -> DeviceCommand {
        self.command.lock().await.clone()
    }

    /// Apply a lifecycle event and publish the new status
    pub async fn apply(&self, event: CommandEvent) -> Result<CommandStatus, InvalidTransition> {
        let mut command = self.command.lock().await;
        let status = command.apply(event)?;
        self.status_tx.send_replace(status);
        Ok(status)
    }

    /// Record the attempt number while the command is still executing
    pub async fn record_attempt(&self, attempt: u32) {
        let mut command = self.command.lock().await;
        if command.status == CommandStatus::Executing {
            command.attempts = attempt;
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CommandStatus> {
        self.status_tx.subscribe()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.signal.clone()
    }

    /// Interrupt any in-flight dispatch of this command
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
pub struct CommandTable {
    commands: RwLock<HashMap<Uuid, Arc<CommandEntry>>>,
    /// Command ids per device in submission order
    by_device: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, command: DeviceCommand) -> Arc<CommandEntry> {
        let id = command.id;
        let device_id = command.device_id.clone();
        let entry = Arc::new(CommandEntry::new(command));

        self.commands.write().await.insert(id, entry.clone());
        self.by_device
            .write()
            .await
            .entry(device_id)
            .or_default()
            .push(id);

        entry
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<CommandEntry>> {
        self.commands.read().await.get(&id).cloned()
    }

    /// Most recent first, at most `limit` entries
    pub async fn for_device(&self, device_id: &str, limit: usize) -> Vec<Arc<CommandEntry>> {
        let ids: Vec<Uuid> = match self.by_device.read().await.get(device_id) {
            Some(ids) => ids.iter().rev().take(limit).copied().collect(),
            None => return Vec::new(),
        };

        let commands = self.commands.read().await;
        ids.iter().filter_map(|id| commands.get(id).cloned()).collect()
    }

    pub async fn len(&self) -> usize {
        self.commands.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.commands.read().await.is_empty()
    }
}
