//! Per-owner profile settings

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::SheetError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub owner_id: String,
    /// Anchor for 3-year phase boundaries
    pub birth_year: Option<i32>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[serde(default)]
    pub birth_year: Option<i32>,
}

pub fn get_profile(conn: &Connection, owner_id: &str) -> Result<Option<ProfileRow>, SheetError> {
    let profile = conn
        .query_row(
            "SELECT owner_id, birth_year, updated_at FROM user_profiles WHERE owner_id = ?",
            params![owner_id],
            |row| {
                Ok(ProfileRow {
                    owner_id: row.get(0)?,
                    birth_year: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(profile)
}

/// Get the profile, creating an empty one on first access
pub fn get_or_create_profile(conn: &Connection, owner_id: &str) -> Result<ProfileRow, SheetError> {
    conn.execute(
        "INSERT OR IGNORE INTO user_profiles (owner_id) VALUES (?)",
        params![owner_id],
    )?;
    get_profile(conn, owner_id)?
        .ok_or_else(|| SheetError::Internal("Profile not found after insert".to_string()))
}

pub fn upsert_profile(
    conn: &Connection,
    owner_id: &str,
    input: &UpdateProfileInput,
) -> Result<ProfileRow, SheetError> {
    conn.execute(
        "INSERT INTO user_profiles (owner_id, birth_year) VALUES (?1, ?2)
         ON CONFLICT(owner_id) DO UPDATE SET
             birth_year = excluded.birth_year,
             updated_at = datetime('now')",
        params![owner_id, input.birth_year],
    )?;
    get_profile(conn, owner_id)?
        .ok_or_else(|| SheetError::Internal("Profile not found after upsert".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    #[test]
    fn test_profile_lifecycle() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();

        assert!(get_profile(&conn, "user").unwrap().is_none());
        let created = get_or_create_profile(&conn, "user").unwrap();
        assert_eq!(created.birth_year, None);

        let updated = upsert_profile(&conn, "user", &UpdateProfileInput { birth_year: Some(1998) }).unwrap();
        assert_eq!(updated.birth_year, Some(1998));

        let cleared = upsert_profile(&conn, "user", &UpdateProfileInput { birth_year: None }).unwrap();
        assert_eq!(cleared.birth_year, None);
    }
}
