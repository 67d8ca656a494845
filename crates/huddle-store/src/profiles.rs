//! CRUD operations for user [`Profile`] records.

use rusqlite::{params, OptionalExtension};

use huddle_shared::{Profile, Role, UserId};

use crate::database::{conversion_err, parse_uuid, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Insert or replace a profile.
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (id, full_name, avatar_url, role)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                full_name  = excluded.full_name,
                avatar_url = excluded.avatar_url,
                role       = excluded.role",
            params![
                profile.id.to_string(),
                profile.full_name,
                profile.avatar_url,
                profile.role.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, id: &UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT id, full_name, avatar_url, role FROM profiles WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(3)?;

    Ok(Profile {
        id: UserId(parse_uuid(0, &id_str)?),
        full_name: row.get(1)?,
        avatar_url: row.get(2)?,
        role: role_str.parse::<Role>().map_err(|e| conversion_err(3, e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let id = UserId::new();
        let mut profile = Profile {
            id,
            full_name: Some("Grace".into()),
            avatar_url: None,
            role: Role::User,
        };
        db.upsert_profile(&profile).unwrap();

        profile.role = Role::Admin;
        profile.avatar_url = Some("https://cdn.example/g.png".into());
        db.upsert_profile(&profile).unwrap();

        assert_eq!(db.get_profile(&id).unwrap(), profile);
    }

    #[test]
    fn test_missing_profile() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_profile(&UserId::new()), Err(StoreError::NotFound)));
    }
}
