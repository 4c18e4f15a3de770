//! Lifesheet - PDCA planning sheets over a life hierarchy
//!
//! Every sheet sits at a coordinate `(level, year, period)`:
//!
//! ```text
//! life ─▶ phase (3 years) ─▶ year ─▶ quarter (4 months) ─▶ month ─▶ week (5 per month)
//! ```
//!
//! and holds one grid: categories down the side, Plan / KPI / Do / Check /
//! Action across the top. Anonymous visitors work under a guest token; when
//! they sign in, their sheets are reconciled into the account.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/lifesheet/
//! ├── lifesheet.db     # SQLite (WAL)
//! └── config.toml      # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod http;
pub mod identity;
pub mod period;
pub mod reconcile;
pub mod services;
pub mod store;

// Re-exports
pub use config::Config;
pub use db::SheetDb;
pub use error::SheetError;
pub use hierarchy::{resolve_sheet, ParentPlan, ResolvedSheet};
pub use http::HttpServer;
pub use identity::{GuestToken, RequestIdentity};
pub use period::{Coord, DomainViolation, Level};
pub use reconcile::{reconcile_guest, ReconcileReport, ReconcileState, Reconciliation};
pub use services::{Services, SheetService};
pub use store::SheetStore;
