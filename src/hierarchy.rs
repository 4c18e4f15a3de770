//! Resolve-or-create a sheet together with its ancestor chain
//!
//! A leaf sheet is only meaningful once every ancestor up to `life` exists,
//! since the "parent plan" shown beside a grid is read from the parent sheet.
//! [`resolve_sheet`] walks the chain top-down, creating what is missing and
//! wiring each new sheet's `parent_id` to the sheet resolved just above it.

use serde::Serialize;
use tracing::{debug, info};

use crate::db::cells::INDICATOR_COLUMN;
use crate::db::SheetRow;
use crate::error::SheetError;
use crate::period::{Coord, Level};
use crate::store::SheetStore;

/// A sheet and the sheets above it
#[derive(Debug, Clone)]
pub struct ResolvedSheet {
    pub sheet: SheetRow,
    /// From `life` down to the sheet's parent
    pub ancestors: Vec<SheetRow>,
}

impl ResolvedSheet {
    pub fn parent(&self) -> Option<&SheetRow> {
        self.ancestors.last()
    }
}

/// Resolve `coord` for `owner_id`, creating it and any missing ancestors.
///
/// Safe under concurrent callers for the same owner: creation of an existing
/// coordinate returns the row that won.
pub fn resolve_sheet<S: SheetStore + ?Sized>(
    store: &S,
    owner_id: &str,
    coord: &Coord,
    birth_year: Option<i32>,
) -> Result<ResolvedSheet, SheetError> {
    let chain = coord.ancestry(birth_year)?;

    let mut resolved: Vec<SheetRow> = Vec::with_capacity(chain.len());
    for link in &chain {
        let sheet = match store.find_sheet(owner_id, link)? {
            Some(sheet) => sheet,
            None => {
                let parent_id = resolved.last().map(|p| p.id.as_str());
                let sheet = store.create_sheet(owner_id, link, parent_id)?;
                info!(owner = %owner_id, coord = %link, sheet_id = %sheet.id, "Created sheet");
                sheet
            }
        };
        resolved.push(sheet);
    }

    let sheet = resolved
        .pop()
        .ok_or_else(|| SheetError::Internal(format!("Empty ancestry for {}", coord)))?;
    debug!(coord = %coord, depth = resolved.len(), "Resolved sheet chain");

    Ok(ResolvedSheet {
        sheet,
        ancestors: resolved,
    })
}

/// The parent's indicator column, shown beside a child grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentPlan {
    pub level: Level,
    pub label: String,
    pub plans: Vec<PlanEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub category_id: String,
    pub content: Option<String>,
}

impl ParentPlan {
    pub fn from_parent(parent: &SheetRow) -> Self {
        Self {
            level: parent.level,
            label: parent.coord().label(),
            plans: parent
                .cells
                .iter()
                .filter(|c| c.column_key == INDICATOR_COLUMN)
                .map(|c| PlanEntry {
                    category_id: c.category_id.clone(),
                    content: c.content.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CellKey, CellPatch, SheetDb};

    #[test]
    fn test_resolve_creates_full_chain() {
        let db = SheetDb::open_in_memory().unwrap();
        let week = Coord::new(Level::Week, 2026, 13).unwrap();

        let resolved = resolve_sheet(&db, "owner", &week, Some(1998)).unwrap();

        assert_eq!(resolved.sheet.coord(), week);
        let levels: Vec<Level> = resolved.ancestors.iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![Level::Life, Level::Phase, Level::Year, Level::Quarter, Level::Month]);
        assert_eq!(resolved.ancestors[1].year, 2025);

        // Each sheet points at the one above it
        assert_eq!(resolved.ancestors[0].parent_id, None);
        for pair in resolved.ancestors.windows(2) {
            assert_eq!(pair[1].parent_id.as_deref(), Some(pair[0].id.as_str()));
        }
        assert_eq!(resolved.sheet.parent_id.as_deref(), Some(resolved.ancestors[4].id.as_str()));
        assert_eq!(db.stats().unwrap().sheet_count, 6);
    }

    #[test]
    fn test_resolve_reuses_existing_sheets() {
        let db = SheetDb::open_in_memory().unwrap();
        let week = Coord::new(Level::Week, 2026, 13).unwrap();
        let first = resolve_sheet(&db, "owner", &week, None).unwrap();

        let sibling = Coord::new(Level::Week, 2026, 14).unwrap();
        let second = resolve_sheet(&db, "owner", &sibling, None).unwrap();

        assert_eq!(first.parent().unwrap().id, second.parent().unwrap().id);
        assert_eq!(db.stats().unwrap().sheet_count, 7);

        let again = resolve_sheet(&db, "owner", &week, None).unwrap();
        assert_eq!(again.sheet.id, first.sheet.id);
        assert_eq!(db.stats().unwrap().sheet_count, 7);
    }

    #[test]
    fn test_resolve_life_has_no_ancestors() {
        let db = SheetDb::open_in_memory().unwrap();
        let resolved = resolve_sheet(&db, "owner", &Coord::life(), None).unwrap();
        assert!(resolved.ancestors.is_empty());
        assert!(resolved.parent().is_none());
    }

    #[test]
    fn test_resolve_rejects_invalid_coord() {
        let db = SheetDb::open_in_memory().unwrap();
        let bad = Coord { level: Level::Quarter, year: 2026, period: 4 };
        assert!(matches!(
            resolve_sheet(&db, "owner", &bad, None),
            Err(SheetError::Domain(_))
        ));
        assert_eq!(db.stats().unwrap().sheet_count, 0);
    }

    #[test]
    fn test_parent_plan_reads_indicator_column() {
        let db = SheetDb::open_in_memory().unwrap();
        let month = Coord::new(Level::Month, 2026, 3).unwrap();
        let resolved = resolve_sheet(&db, "owner", &month, None).unwrap();
        let quarter_id = resolved.parent().unwrap().id.clone();

        let indicator = CellKey { sheet_id: &quarter_id, category_id: "career", column_key: "indicator" };
        db.upsert_cell(&indicator, &CellPatch::content("3 talks")).unwrap();
        let plan = CellKey { sheet_id: &quarter_id, category_id: "career", column_key: "plan" };
        db.upsert_cell(&plan, &CellPatch::content("not shown")).unwrap();

        let resolved = resolve_sheet(&db, "owner", &month, None).unwrap();
        let parent_plan = ParentPlan::from_parent(resolved.parent().unwrap());

        assert_eq!(parent_plan.level, Level::Quarter);
        assert_eq!(parent_plan.label, "2026 1-4");
        assert_eq!(
            parent_plan.plans,
            vec![PlanEntry { category_id: "career".into(), content: Some("3 talks".into()) }]
        );
    }
}
