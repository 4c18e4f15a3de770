//! Service layer for lifesheet
//!
//! Services sit between the HTTP handlers and the repositories:
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (identity checks, validation, events)
//!     ↓
//! Core (hierarchy, reconcile) over SheetStore
//!     ↓
//! Repository Layer (db/*.rs)
//! ```

pub mod response;
pub mod events;
pub mod sheet_service;

pub use response::*;
pub use events::{spawn_logging_listener, EventBus, SheetEvent};
pub use sheet_service::{SheetQuery, SheetService, SheetView, SyncOutcome, UpdateCellInput};

use crate::store::SheetStore;
use std::sync::Arc;

/// Service container handed to the HTTP server
pub struct Services {
    pub sheets: Arc<SheetService>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn new(store: Arc<dyn SheetStore>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            sheets: Arc::new(SheetService::new(store, events.clone())),
            events,
        }
    }
}
