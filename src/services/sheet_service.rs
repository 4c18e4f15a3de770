//! Sheet service - business logic behind every sheet route
//!
//! Each operation takes the caller's [`RequestIdentity`] explicitly and works
//! against the [`SheetStore`] seam, so the same code runs on SQLite in
//! production and on wrapped stores in tests.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{
    CategoryRow, CellKey, CellPatch, CellRow, ColumnDef, CreateDocLinkInput, DbStats, DocLinkRow,
    ProfileRow, SheetRow, UpdateProfileInput, PDCA_COLUMNS,
};
use crate::db::cells::is_known_column;
use crate::error::SheetError;
use crate::hierarchy::{resolve_sheet, ParentPlan};
use crate::identity::RequestIdentity;
use crate::period::{phase_start_year, Coord, DomainViolation, HierarchyContext, Level, MAX_YEAR};
use crate::reconcile::{reconcile_guest, ReconcileReport};
use crate::store::SheetStore;

use super::events::{EventBus, SheetEvent};

/// `?level&year&period` as sent by the navigation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetQuery {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub period: Option<i32>,
}

impl SheetQuery {
    /// Fill in missing parts and validate.
    ///
    /// Level defaults to week. With neither year nor period given, the
    /// coordinate containing `today` is used. A missing year means this year;
    /// a missing period means the first period of the level. A phase year is
    /// moved to the start of the anchored phase containing it.
    pub fn to_coord(&self, today: NaiveDate, birth_year: Option<i32>) -> Result<Coord, SheetError> {
        let level = match self.level.as_deref() {
            Some(raw) => raw.parse::<Level>()?,
            None => Level::Week,
        };

        if self.year.is_none() && self.period.is_none() {
            return Ok(Coord::current(level, today, birth_year));
        }

        let year = match (level, self.year) {
            (Level::Life, _) => 0,
            (Level::Phase, year) => {
                let year = year.unwrap_or_else(|| today.year());
                if !(1..=MAX_YEAR).contains(&year) {
                    return Err(DomainViolation::Year { level, year }.into());
                }
                phase_start_year(year, birth_year)
            }
            (_, Some(year)) => year,
            (_, None) => today.year(),
        };
        let period = self.period.unwrap_or_else(|| level.period_domain().0);

        Ok(Coord::new(level, year, period)?)
    }
}

/// A drill-down or breadcrumb target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavEntry {
    pub level: Level,
    pub year: i32,
    pub period: i32,
    pub label: String,
    /// Set when the sheet already exists
    pub sheet_id: Option<String>,
}

impl NavEntry {
    fn new(coord: Coord, sheet_id: Option<String>) -> Self {
        Self {
            level: coord.level,
            year: coord.year,
            period: coord.period,
            label: coord.label(),
            sheet_id,
        }
    }
}

/// Everything the grid page needs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetView {
    pub sheet: SheetRow,
    pub label: String,
    pub categories: Vec<CategoryRow>,
    pub columns: &'static [ColumnDef],
    pub parent_plan: Option<ParentPlan>,
    /// Life first
    pub ancestors: Vec<NavEntry>,
    pub children: Vec<NavEntry>,
    pub birth_year: Option<i32>,
}

/// Body of `POST /api/cell`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCellInput {
    pub sheet_id: String,
    pub category_id: String,
    pub column_key: String,
    #[serde(flatten)]
    pub patch: CellPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// False when the request carried no guest token
    pub synced: bool,
    pub report: Option<ReconcileReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPeriod {
    #[serde(flatten)]
    pub coord: Coord,
    pub label: String,
}

/// Sheet service for business logic
pub struct SheetService {
    store: Arc<dyn SheetStore>,
    events: Arc<EventBus>,
}

impl SheetService {
    pub fn new(store: Arc<dyn SheetStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    // =========================================================================
    // Sheets
    // =========================================================================

    /// Resolve (creating if needed) the caller's sheet for a query
    pub fn open_sheet(
        &self,
        identity: &RequestIdentity,
        query: &SheetQuery,
        today: NaiveDate,
    ) -> Result<SheetView, SheetError> {
        let owner_id = identity.require_owner()?;
        let birth_year = self.store.birth_year(&owner_id)?;
        let coord = query.to_coord(today, birth_year)?;

        let resolved = resolve_sheet(&*self.store, &owner_id, &coord, birth_year)?;
        let categories = self.store.list_categories()?;

        let ctx = HierarchyContext { birth_year, today };
        let mut children = Vec::new();
        for child in coord.children(&ctx)? {
            let existing = self.store.find_sheet(&owner_id, &child)?.map(|s| s.id);
            children.push(NavEntry::new(child, existing));
        }

        let ancestors = resolved
            .ancestors
            .iter()
            .map(|s| NavEntry::new(s.coord(), Some(s.id.clone())))
            .collect();
        let parent_plan = resolved.parent().map(ParentPlan::from_parent);

        debug!(owner = %owner_id, coord = %coord, sheet_id = %resolved.sheet.id, "Opened sheet");
        self.events.emit(SheetEvent::SheetOpened {
            owner_id,
            sheet_id: resolved.sheet.id.clone(),
            coord,
        });

        Ok(SheetView {
            label: coord.label(),
            sheet: resolved.sheet,
            categories,
            columns: &PDCA_COLUMNS,
            parent_plan,
            ancestors,
            children,
            birth_year,
        })
    }

    /// Write one cell of a sheet the caller owns
    pub fn update_cell(
        &self,
        identity: &RequestIdentity,
        input: &UpdateCellInput,
    ) -> Result<CellRow, SheetError> {
        let owner_id = identity.require_owner()?;

        if !is_known_column(&input.column_key) {
            return Err(SheetError::InvalidInput(format!(
                "Unknown column '{}'",
                input.column_key
            )));
        }
        if input.patch.is_empty() {
            return Err(SheetError::InvalidInput("Nothing to update".to_string()));
        }
        if !self
            .store
            .list_categories()?
            .iter()
            .any(|c| c.id == input.category_id)
        {
            return Err(SheetError::InvalidInput(format!(
                "Unknown category '{}'",
                input.category_id
            )));
        }

        let sheet = self
            .store
            .get_sheet(&input.sheet_id)?
            .ok_or_else(|| SheetError::NotFound(format!("Sheet {}", input.sheet_id)))?;
        if sheet.owner_id != owner_id {
            return Err(SheetError::Forbidden(format!(
                "Sheet {} belongs to another owner",
                sheet.id
            )));
        }

        let key = CellKey {
            sheet_id: &sheet.id,
            category_id: &input.category_id,
            column_key: &input.column_key,
        };
        let cell = self.store.upsert_cell(&key, &input.patch)?;

        self.events.emit(SheetEvent::CellUpdated {
            sheet_id: cell.sheet_id.clone(),
            category_id: cell.category_id.clone(),
            column_key: cell.column_key.clone(),
        });

        Ok(cell)
    }

    /// Coordinate containing `today` at `level`, anchored on the caller's birth year
    pub fn current(
        &self,
        identity: &RequestIdentity,
        level: Level,
        today: NaiveDate,
    ) -> Result<CurrentPeriod, SheetError> {
        let birth_year = match identity.owner_id() {
            Some(owner_id) => self.store.birth_year(&owner_id)?,
            None => None,
        };
        let coord = Coord::current(level, today, birth_year);
        Ok(CurrentPeriod {
            label: coord.label(),
            coord,
        })
    }

    // =========================================================================
    // Guest reconciliation
    // =========================================================================

    /// Merge the caller's guest data into their account
    pub fn sync_guest(&self, identity: &RequestIdentity) -> Result<SyncOutcome, SheetError> {
        let user_id = identity.require_user()?;
        let guest_owner_id = identity.guest_owner_id();

        let report = reconcile_guest(&*self.store, user_id, guest_owner_id.as_deref())?;

        if let (Some(_), Some(guest_owner_id)) = (&report, guest_owner_id) {
            self.events.emit(SheetEvent::GuestReconciled {
                guest_owner_id,
                user_id: user_id.to_string(),
            });
        }

        Ok(SyncOutcome {
            synced: report.is_some(),
            report,
        })
    }

    // =========================================================================
    // Profile
    // =========================================================================

    pub fn get_profile(&self, identity: &RequestIdentity) -> Result<ProfileRow, SheetError> {
        let user_id = identity.require_user()?;
        self.store.get_or_create_profile(user_id)
    }

    pub fn update_profile(
        &self,
        identity: &RequestIdentity,
        input: &UpdateProfileInput,
    ) -> Result<ProfileRow, SheetError> {
        let user_id = identity.require_user()?;
        if let Some(year) = input.birth_year {
            if !(1..=MAX_YEAR).contains(&year) {
                return Err(SheetError::InvalidInput(format!("Birth year {} out of range", year)));
            }
        }

        let profile = self.store.upsert_profile(user_id, input)?;
        info!(owner = %user_id, birth_year = ?profile.birth_year, "Profile updated");
        self.events.emit(SheetEvent::ProfileUpdated {
            owner_id: user_id.to_string(),
        });

        Ok(profile)
    }

    // =========================================================================
    // Doc links
    // =========================================================================

    pub fn list_doc_links(&self, identity: &RequestIdentity) -> Result<Vec<DocLinkRow>, SheetError> {
        let owner_id = identity.require_owner()?;
        self.store.list_doc_links(&owner_id)
    }

    pub fn create_doc_link(
        &self,
        identity: &RequestIdentity,
        input: &CreateDocLinkInput,
    ) -> Result<DocLinkRow, SheetError> {
        let owner_id = identity.require_owner()?;

        if input.title.trim().is_empty() {
            return Err(SheetError::InvalidInput("title is required".to_string()));
        }
        let url = input.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SheetError::InvalidInput(format!("Invalid url '{}'", input.url)));
        }

        let link = self.store.create_doc_link(&owner_id, input)?;
        self.events.emit(SheetEvent::DocLinkCreated {
            id: link.id.clone(),
            owner_id,
        });

        Ok(link)
    }

    pub fn stats(&self) -> Result<DbStats, SheetError> {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SheetDb;
    use crate::identity::GuestToken;

    fn service() -> SheetService {
        let db = Arc::new(SheetDb::open_in_memory().unwrap());
        SheetService::new(db, Arc::new(EventBus::new()))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 17).unwrap()
    }

    fn query(level: &str, year: i32, period: i32) -> SheetQuery {
        SheetQuery {
            level: Some(level.to_string()),
            year: Some(year),
            period: Some(period),
        }
    }

    #[test]
    fn test_query_defaults_to_current_week() {
        let coord = SheetQuery::default().to_coord(today(), None).unwrap();
        assert_eq!(coord, Coord::new(Level::Week, 2026, 13).unwrap());

        let year_only = SheetQuery { level: Some("month".into()), year: Some(2027), period: None };
        assert_eq!(year_only.to_coord(today(), None).unwrap(), Coord::new(Level::Month, 2027, 1).unwrap());

        let phase = SheetQuery { level: Some("phase".into()), year: None, period: Some(0) };
        assert_eq!(phase.to_coord(today(), Some(1998)).unwrap().year, 2025);
    }

    #[test]
    fn test_query_moves_phase_year_to_phase_start() {
        assert_eq!(query("phase", 2026, 0).to_coord(today(), Some(1998)).unwrap().year, 2025);
        assert_eq!(query("phase", 2027, 0).to_coord(today(), Some(1998)).unwrap().year, 2025);
        assert_eq!(query("phase", 2028, 0).to_coord(today(), Some(1998)).unwrap().year, 2028);
        assert_eq!(query("phase", 1, 0).to_coord(today(), None).unwrap().year, 0);
        assert!(query("phase", 0, 0).to_coord(today(), None).is_err());
    }

    #[test]
    fn test_open_phase_links_to_existing_years() {
        let svc = service();
        let user = RequestIdentity::authenticated("user-1");
        svc.update_profile(&user, &UpdateProfileInput { birth_year: Some(1998) }).unwrap();

        let year = svc.open_sheet(&user, &query("year", 2026, 0), today()).unwrap();
        let phase = svc.open_sheet(&user, &query("phase", 2026, 0), today()).unwrap();

        assert_eq!(phase.label, "2025-2027");
        assert_eq!(phase.sheet.id, year.ancestors[1].sheet_id.clone().unwrap());
        let child = phase.children.iter().find(|c| c.year == 2026).unwrap();
        assert_eq!(child.sheet_id.as_deref(), Some(year.sheet.id.as_str()));
    }

    #[test]
    fn test_query_rejects_bad_input() {
        assert!(matches!(query("decade", 2026, 0).to_coord(today(), None), Err(SheetError::Domain(_))));
        assert!(matches!(query("quarter", 2026, 4).to_coord(today(), None), Err(SheetError::Domain(_))));
    }

    #[test]
    fn test_open_sheet_builds_view() {
        let svc = service();
        let identity = RequestIdentity::authenticated("user-1");

        let view = svc.open_sheet(&identity, &query("month", 2026, 3), today()).unwrap();

        assert_eq!(view.label, "2026/3");
        assert_eq!(view.categories.len(), 4);
        assert_eq!(view.columns.len(), 5);
        assert_eq!(view.ancestors.len(), 4);
        assert_eq!(view.ancestors[0].level, Level::Life);
        assert_eq!(view.children.len(), 5);
        assert!(view.children.iter().all(|c| c.sheet_id.is_none()));
        assert_eq!(view.parent_plan.as_ref().unwrap().label, "2026 1-4");
    }

    #[test]
    fn test_open_sheet_requires_identity() {
        let svc = service();
        assert!(matches!(
            svc.open_sheet(&RequestIdentity::default(), &SheetQuery::default(), today()),
            Err(SheetError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_update_cell_checks_ownership() {
        let svc = service();
        let owner = RequestIdentity::authenticated("user-1");
        let view = svc.open_sheet(&owner, &query("year", 2026, 0), today()).unwrap();

        let input = UpdateCellInput {
            sheet_id: view.sheet.id.clone(),
            category_id: "career".into(),
            column_key: "indicator".into(),
            patch: CellPatch::content("ship v1"),
        };
        let cell = svc.update_cell(&owner, &input).unwrap();
        assert_eq!(cell.content.as_deref(), Some("ship v1"));

        let stranger = RequestIdentity::anonymous(GuestToken::generate());
        assert!(matches!(svc.update_cell(&stranger, &input), Err(SheetError::Forbidden(_))));

        let bad_column = UpdateCellInput { column_key: "notes".into(), ..input.clone() };
        assert!(matches!(svc.update_cell(&owner, &bad_column), Err(SheetError::InvalidInput(_))));

        let missing = UpdateCellInput { sheet_id: "nope".into(), ..input };
        assert!(matches!(svc.update_cell(&owner, &missing), Err(SheetError::NotFound(_))));
    }

    #[test]
    fn test_update_cell_input_from_json() {
        let input: UpdateCellInput = serde_json::from_str(
            r#"{"sheetId":"s","categoryId":"free","columnKey":"do","checked":true}"#,
        )
        .unwrap();
        assert_eq!(input.patch, CellPatch::checked(true));
    }

    #[test]
    fn test_sync_guest_moves_sheets() {
        let svc = service();
        let token = GuestToken::generate();
        let guest = RequestIdentity::anonymous(token);
        svc.open_sheet(&guest, &query("year", 2026, 0), today()).unwrap();

        let signed_in = RequestIdentity { user: Some("user-1".into()), guest: Some(token) };
        let outcome = svc.sync_guest(&signed_in).unwrap();
        assert!(outcome.synced);
        // life, phase, year
        assert_eq!(outcome.report.unwrap().sheets_reassigned, 3);

        let no_guest = svc.sync_guest(&RequestIdentity::authenticated("user-1")).unwrap();
        assert_eq!(no_guest, SyncOutcome { synced: false, report: None });

        assert!(matches!(svc.sync_guest(&guest), Err(SheetError::Unauthorized(_))));
    }

    #[test]
    fn test_birth_year_moves_phase_parent() {
        let svc = service();
        let user = RequestIdentity::authenticated("user-1");
        svc.update_profile(&user, &UpdateProfileInput { birth_year: Some(1998) }).unwrap();

        let view = svc.open_sheet(&user, &query("year", 2026, 0), today()).unwrap();
        assert_eq!(view.birth_year, Some(1998));
        assert_eq!(view.ancestors[1].year, 2025);

        let current = svc.current(&user, Level::Phase, today()).unwrap();
        assert_eq!(current.label, "2025-2027");

        assert!(svc.update_profile(&user, &UpdateProfileInput { birth_year: Some(0) }).is_err());
    }

    #[test]
    fn test_doc_link_validation() {
        let svc = service();
        let user = RequestIdentity::authenticated("user-1");
        let input = CreateDocLinkInput {
            title: "Retro notes".into(),
            url: "https://example.com/retro".into(),
            description: None,
        };
        svc.create_doc_link(&user, &input).unwrap();
        assert_eq!(svc.list_doc_links(&user).unwrap().len(), 1);

        let bad = CreateDocLinkInput { url: "javascript:alert(1)".into(), ..input };
        assert!(matches!(svc.create_doc_link(&user, &bad), Err(SheetError::InvalidInput(_))));
    }
}
