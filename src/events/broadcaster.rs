//! Event Broadcaster
//!
//! Bounded multi-producer, single-consumer channel of progress events.
//!
//! The consumer polls without blocking and sleeps `poll_interval` when the
//! channel is empty. If the sink rejects an event, the event is re-sent onto
//! the channel from a spawned task and the stream ends with the sink's error;
//! the next stream picks it up. Delivery is at-least-once and may reorder.

use super::{EventError, EventSink, ProgressEvent};
use crate::config::EventConfig;
use crate::server::metrics::SharedMetrics;
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

/// Producer handle given to operation tasks
#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<ProgressEvent>,
}

impl EventPublisher {
    /// Enqueue an event, waiting while the channel is full
    pub async fn publish(&self, event: ProgressEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| EventError::ChannelClosed)
    }

    /// Enqueue without waiting; fails with `Full` when no consumer keeps up
    pub fn try_publish(&self, event: ProgressEvent) -> Result<(), EventError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => EventError::Full,
            TrySendError::Closed(_) => EventError::ChannelClosed,
        })
    }
}

pub struct EventBroadcaster {
    sender: mpsc::Sender<ProgressEvent>,
    receiver: Mutex<mpsc::Receiver<ProgressEvent>>,
    poll_interval: Duration,
    metrics: Option<SharedMetrics>,
}

impl EventBroadcaster {
    pub fn new(config: &EventConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            poll_interval: config.poll_interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }

    /// Drain events into `sink` until a send fails or the sink closes
    ///
    /// Only one stream drains at a time; a second caller waits for the first
    /// to finish.
    pub async fn stream_events(&self, sink: &mut dyn EventSink) -> Result<(), EventError> {
        let mut receiver = self.receiver.lock().await;
        debug!("Event stream attached");

        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if let Err(e) = sink.send(&event).await {
                        error!(
                            operation_id = %event.operation_id,
                            error = %e,
                            "Failed to forward event, requeued"
                        );
                        self.requeue(event);
                        return Err(e);
                    }
                    debug!(operation_id = %event.operation_id, "Event forwarded");
                }
                Err(TryRecvError::Empty) => {
                    if sink.is_closed() {
                        debug!("Event stream detached");
                        return Err(EventError::Closed);
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(TryRecvError::Disconnected) => return Err(EventError::ChannelClosed),
            }
        }
    }

    fn requeue(&self, event: ProgressEvent) {
        if let Some(metrics) = &self.metrics {
            metrics.events_requeued_total.inc();
        }
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let operation_id = event.operation_id.clone();
            if sender.send(event).await.is_err() {
                warn!(operation_id = %operation_id, "Event channel closed, dropping requeued event");
            }
        });
    }
}

#[cfg(test)]
#[path = "broadcaster_test.rs"]
mod tests;
