use std::sync::Arc;

use common::error::Res;
use db::{Store, models::usage::UsageEvent};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Most events written by one batch insert.
const BATCH_SIZE: usize = 256;

/// Appends usage events.
///
/// `record` writes straight through and is awaited; the gatekeeper uses it
/// for admitted calls. `record_best_effort` hands the event to a background
/// writer and never blocks; when the buffer is full the event is dropped.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn Store>,
    sender: mpsc::Sender<UsageEvent>,
}

/// Drains the best-effort buffer into the store. Exits once every
/// `UsageRecorder` is dropped and the buffer is empty.
pub struct RecorderWorker {
    store: Arc<dyn Store>,
    receiver: mpsc::Receiver<UsageEvent>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn Store>, capacity: usize) -> (Self, RecorderWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                store: store.clone(),
                sender,
            },
            RecorderWorker { store, receiver },
        )
    }

    pub async fn record(&self, event: UsageEvent) -> Res<()> {
        self.store.insert_usage_events(std::slice::from_ref(&event)).await
    }

    pub fn record_best_effort(&self, event: UsageEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!(
                    "Usage buffer full, dropping {} event for {}",
                    event.outcome.as_str(),
                    event.endpoint
                );
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("Usage writer stopped, dropping event");
            }
        }
    }
}

impl RecorderWorker {
    pub async fn run(mut self) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        while self.receiver.recv_many(&mut batch, BATCH_SIZE).await > 0 {
            if let Err(e) = self.store.insert_usage_events(&batch).await {
                log::error!("Failed to write {} usage events: {}", batch.len(), e);
            }
            batch.clear();
        }
        log::debug!("Usage writer finished");
    }
}
