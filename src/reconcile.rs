//! Guest-to-account reconciliation
//!
//! When a browser that worked as a guest signs in, everything the guest token
//! owns is merged into the authenticated identity:
//!
//! - a guest sheet at a coordinate the user has no sheet for is handed over
//!   as-is (same id, same cells);
//! - a guest sheet colliding with an existing user sheet donates only the
//!   cells the user sheet lacks, then is deleted;
//! - non-grid records (doc links) move in bulk.
//!
//! Nothing is rolled back on failure. Every step is idempotent, so running
//! the merge again after a partial failure converges on the same state as a
//! single clean run. The caller keeps the guest token until a run completes.
//!
//! ```text
//! Idle ──detect──▶ Detected ──run──▶ Merging ──▶ Completed
//!                                       │
//!                                       └──▶ Failed ──run──▶ Merging …
//! ```

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::{CellKey, SheetRow};
use crate::error::SheetError;
use crate::store::SheetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileState {
    /// Nothing to reconcile
    Idle,
    /// Guest token and authenticated identity both present
    Detected,
    Merging,
    Completed,
    /// Aborted; may be run again
    Failed,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Guest sheets handed to the user unchanged
    pub sheets_reassigned: u64,
    /// Guest sheets folded into an existing user sheet and deleted
    pub sheets_merged: u64,
    /// Guest cells copied into user sheets
    pub cells_copied: u64,
    /// Guest cells dropped because the user already had that cell
    pub cells_discarded: u64,
    pub auxiliary_records_moved: u64,
}

/// One guest → user merge
pub struct Reconciliation<'a, S: SheetStore + ?Sized> {
    store: &'a S,
    guest_id: &'a str,
    user_id: &'a str,
    state: ReconcileState,
}

impl<'a, S: SheetStore + ?Sized> Reconciliation<'a, S> {
    /// Start from whatever identities the request carries.
    ///
    /// Stays [`ReconcileState::Idle`] unless both are present and distinct.
    pub fn detect(store: &'a S, user_id: Option<&'a str>, guest_id: Option<&'a str>) -> Self {
        let (user_id, guest_id, state) = match (user_id, guest_id) {
            (Some(user), Some(guest)) if user != guest => (user, guest, ReconcileState::Detected),
            (Some(user), Some(guest)) => {
                warn!(owner = %user, "Guest token equals user identity, nothing to reconcile");
                (user, guest, ReconcileState::Idle)
            }
            (user, guest) => (user.unwrap_or(""), guest.unwrap_or(""), ReconcileState::Idle),
        };

        Self {
            store,
            guest_id,
            user_id,
            state,
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Merge all guest data into the user.
    ///
    /// Allowed from `Detected` or `Failed`. Any store error aborts the run
    /// and is returned as [`SheetError::Reconciliation`].
    pub fn run(&mut self) -> Result<ReconcileReport, SheetError> {
        match self.state {
            ReconcileState::Detected | ReconcileState::Failed => {}
            other => {
                return Err(SheetError::Internal(format!(
                    "Reconciliation cannot run from state {:?}",
                    other
                )))
            }
        }

        self.state = ReconcileState::Merging;
        info!(guest = %self.guest_id, user = %self.user_id, "Reconciling guest data");

        match self.merge_all() {
            Ok(report) => {
                self.state = ReconcileState::Completed;
                info!(
                    guest = %self.guest_id,
                    user = %self.user_id,
                    reassigned = report.sheets_reassigned,
                    merged = report.sheets_merged,
                    cells_copied = report.cells_copied,
                    cells_discarded = report.cells_discarded,
                    aux_moved = report.auxiliary_records_moved,
                    "Guest reconciliation completed"
                );
                Ok(report)
            }
            Err(e) => {
                self.state = ReconcileState::Failed;
                error!(guest = %self.guest_id, user = %self.user_id, error = %e, "Guest reconciliation failed");
                Err(SheetError::Reconciliation {
                    guest: self.guest_id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn merge_all(&self) -> Result<ReconcileReport, SheetError> {
        let mut report = ReconcileReport::default();

        for guest_sheet in self.store.list_sheets(self.guest_id)? {
            self.merge_sheet(&guest_sheet, &mut report)?;
        }

        report.auxiliary_records_moved = self
            .store
            .reassign_auxiliary_records(self.guest_id, self.user_id)?;

        Ok(report)
    }

    fn merge_sheet(&self, guest_sheet: &SheetRow, report: &mut ReconcileReport) -> Result<(), SheetError> {
        let coord = guest_sheet.coord();

        let Some(user_sheet) = self.store.find_sheet(self.user_id, &coord)? else {
            self.store.update_sheet_owner(&guest_sheet.id, self.user_id)?;
            debug!(sheet_id = %guest_sheet.id, coord = %coord, "Reassigned guest sheet");
            report.sheets_reassigned += 1;
            return Ok(());
        };

        // Cells first; the delete must come last so a failure leaves the guest sheet intact
        for cell in &guest_sheet.cells {
            let key = CellKey {
                sheet_id: &user_sheet.id,
                category_id: &cell.category_id,
                column_key: &cell.column_key,
            };
            if self.store.insert_cell_if_absent(&key, cell.content.as_deref(), cell.checked)? {
                report.cells_copied += 1;
            } else {
                report.cells_discarded += 1;
            }
        }

        self.store.delete_sheet(&guest_sheet.id)?;
        debug!(
            guest_sheet = %guest_sheet.id,
            user_sheet = %user_sheet.id,
            coord = %coord,
            "Merged guest sheet into existing user sheet"
        );
        report.sheets_merged += 1;

        Ok(())
    }
}

/// Detect and run in one step. `None` when there was nothing to reconcile.
pub fn reconcile_guest<S: SheetStore + ?Sized>(
    store: &S,
    user_id: &str,
    guest_id: Option<&str>,
) -> Result<Option<ReconcileReport>, SheetError> {
    let mut reconciliation = Reconciliation::detect(store, Some(user_id), guest_id);
    if reconciliation.state() == ReconcileState::Idle {
        return Ok(None);
    }
    reconciliation.run().map(Some)
}
