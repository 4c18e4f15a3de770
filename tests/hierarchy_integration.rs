//! Integration tests for sheet resolution against a file-backed database
//!
//! Separate connections to one SQLite file stand in for concurrent requests.

use std::sync::{Arc, Barrier};
use std::thread;

use lifesheet::{resolve_sheet, Coord, Level, SheetDb, SheetStore};
use tempfile::TempDir;

const OWNER: &str = "user-1";

fn count_rows(db: &SheetDb, coord: &Coord) -> i64 {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM sheets WHERE owner_id = ? AND level = ? AND year = ? AND period = ?",
            rusqlite::params![OWNER, coord.level.as_str(), coord.year, coord.period],
            |row| row.get(0),
        )?)
    })
    .unwrap()
}

#[test]
fn test_concurrent_resolve_creates_one_row_per_coordinate() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("lifesheet.db");
    let primary = SheetDb::open_file(&db_path).unwrap();

    const WORKERS: usize = 6;
    let handles: Vec<SheetDb> = (0..WORKERS)
        .map(|_| SheetDb::open_file(&db_path).unwrap())
        .collect();

    let week = Coord::new(Level::Week, 2026, 13).unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let threads: Vec<_> = handles
        .into_iter()
        .map(|db| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                resolve_sheet(&db, OWNER, &week, None).unwrap().sheet.id
            })
        })
        .collect();

    let ids: Vec<String> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    for coord in week.ancestry(None).unwrap() {
        assert_eq!(count_rows(&primary, &coord), 1, "duplicate rows at {}", coord);
    }
    assert_eq!(primary.stats().unwrap().sheet_count, 6);
}

#[test]
fn test_resolve_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let month = Coord::new(Level::Month, 2026, 7).unwrap();

    let first_id = {
        let db = SheetDb::open(temp_dir.path()).unwrap();
        resolve_sheet(&db, OWNER, &month, Some(1990)).unwrap().sheet.id
    };

    let db = SheetDb::open(temp_dir.path()).unwrap();
    let resolved = resolve_sheet(&db, OWNER, &month, Some(1990)).unwrap();
    assert_eq!(resolved.sheet.id, first_id);

    let phase = &resolved.ancestors[1];
    assert_eq!(phase.level, Level::Phase);
    assert_eq!(phase.year, 2026);
    assert!(db.find_sheet(OWNER, &Coord::life()).unwrap().is_some());
}

#[test]
fn test_resolve_first_year_for_any_anchor() {
    let db = SheetDb::open_in_memory().unwrap();
    let first = Coord::new(Level::Year, 1, 0).unwrap();

    for birth_year in [None, Some(2), Some(1998)] {
        let owner = format!("owner-{:?}", birth_year);
        let resolved = resolve_sheet(&db, &owner, &first, birth_year).unwrap();
        assert_eq!(resolved.sheet.coord(), first);
        assert_eq!(resolved.ancestors.len(), 2);
        assert!(resolved.ancestors[1].year <= 1);
    }
}
