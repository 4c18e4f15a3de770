//! Sheet events
//!
//! Services emit a [`SheetEvent`] after each successful write. The only
//! subscriber is the audit logger spawned by `main`.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::period::Coord;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum SheetEvent {
    SheetOpened {
        owner_id: String,
        sheet_id: String,
        coord: Coord,
    },
    CellUpdated {
        sheet_id: String,
        category_id: String,
        column_key: String,
    },
    GuestReconciled {
        guest_owner_id: String,
        user_id: String,
    },
    ProfileUpdated {
        owner_id: String,
    },
    DocLinkCreated {
        id: String,
        owner_id: String,
    },
}

pub struct EventBus {
    sender: broadcast::Sender<SheetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Dropped silently when nobody listens
    pub fn emit(&self, event: SheetEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SheetEvent> {
        self.sender.subscribe()
    }
}

fn log_event(event: &SheetEvent) {
    match event {
        SheetEvent::GuestReconciled { guest_owner_id, user_id } => {
            debug!(guest = %guest_owner_id, user = %user_id, "Guest records merged into user");
        }
        SheetEvent::CellUpdated { sheet_id, category_id, column_key } => {
            debug!(sheet = %sheet_id, category = %category_id, column = %column_key, "Cell updated");
        }
        other => trace!(event = ?other, "Sheet event"),
    }
}

/// Log every event until the bus is dropped
pub fn spawn_logging_listener(events: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = events.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event logger fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
