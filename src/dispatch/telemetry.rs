//! Live telemetry feed for one device

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use spatial_shared::TelemetryPayload;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{ApiError, TelemetryStream};

/// Buffered payloads between the connection task and the consumer
const FEED_BUFFER: usize = 64;

/// Payloads from an open telemetry connection
///
/// Dropping the feed aborts the reader task, which drops the connection.
/// Nothing is replayed.
pub struct TelemetryFeed {
    device_id: String,
    rx: mpsc::Receiver<TelemetryPayload>,
    task: JoinHandle<()>,
}

impl TelemetryFeed {
    pub(crate) fn spawn(device_id: impl Into<String>, mut stream: TelemetryStream) -> Self {
        let device_id = device_id.into();
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let id = device_id.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    item = stream.next() => match item {
                        Some(Ok(payload)) => {
                            if tx.send(payload).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e @ (ApiError::Stream(_) | ApiError::Decode(_)))) => {
                            warn!("Skipping malformed telemetry from {}: {}", id, e);
                        }
                        Some(Err(e)) => {
                            warn!("Telemetry connection for {} failed: {}", id, e);
                            break;
                        }
                        None => break,
                    },
                }
            }
            debug!("Telemetry feed for {} closed", id);
        });

        Self {
            device_id,
            rx,
            task,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

}

impl Stream for TelemetryFeed {
    type Item = TelemetryPayload;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for TelemetryFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}
