//! Storage collaborator used by the hierarchy resolver, the reconciler and
//! the sheet service
//!
//! Every query is keyed either by owner identity or by hierarchy coordinate.
//! [`crate::db::SheetDb`] is the SQLite implementation; tests wrap it to
//! inject faults.

use crate::db::{
    CategoryRow, CellKey, CellPatch, CellRow, CreateDocLinkInput, DbStats, DocLinkRow, ProfileRow,
    SheetRow, UpdateProfileInput,
};
use crate::error::SheetError;
use crate::period::Coord;

pub trait SheetStore: Send + Sync {
    /// Sheet (with cells) an owner has at a coordinate
    fn find_sheet(&self, owner_id: &str, coord: &Coord) -> Result<Option<SheetRow>, SheetError>;

    /// Sheet (with cells) by id
    fn get_sheet(&self, sheet_id: &str) -> Result<Option<SheetRow>, SheetError>;

    /// Create a sheet. A duplicate `(owner, coord)` returns the existing row.
    fn create_sheet(
        &self,
        owner_id: &str,
        coord: &Coord,
        parent_id: Option<&str>,
    ) -> Result<SheetRow, SheetError>;

    fn update_sheet_owner(&self, sheet_id: &str, new_owner_id: &str) -> Result<(), SheetError>;

    /// Delete a sheet and its cells
    fn delete_sheet(&self, sheet_id: &str) -> Result<(), SheetError>;

    /// Every sheet of an owner, cells embedded
    fn list_sheets(&self, owner_id: &str) -> Result<Vec<SheetRow>, SheetError>;

    /// Create the cell or update only the fields present in `patch`
    fn upsert_cell(&self, key: &CellKey<'_>, patch: &CellPatch) -> Result<CellRow, SheetError>;

    /// Create the cell with these values only if the key is free.
    /// Returns whether a cell was created.
    fn insert_cell_if_absent(
        &self,
        key: &CellKey<'_>,
        content: Option<&str>,
        checked: bool,
    ) -> Result<bool, SheetError>;

    /// Move every non-grid record owned by `from_owner`. Returns rows moved.
    fn reassign_auxiliary_records(&self, from_owner: &str, to_owner: &str) -> Result<u64, SheetError>;

    fn list_categories(&self) -> Result<Vec<CategoryRow>, SheetError>;

    /// Phase anchor of an owner, if they set one
    fn birth_year(&self, owner_id: &str) -> Result<Option<i32>, SheetError>;

    fn get_or_create_profile(&self, owner_id: &str) -> Result<ProfileRow, SheetError>;

    fn upsert_profile(&self, owner_id: &str, input: &UpdateProfileInput) -> Result<ProfileRow, SheetError>;

    fn list_doc_links(&self, owner_id: &str) -> Result<Vec<DocLinkRow>, SheetError>;

    fn create_doc_link(&self, owner_id: &str, input: &CreateDocLinkInput) -> Result<DocLinkRow, SheetError>;

    fn stats(&self) -> Result<DbStats, SheetError>;
}
