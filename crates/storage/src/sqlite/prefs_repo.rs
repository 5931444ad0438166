use async_trait::async_trait;

use study_core::model::Prefs;

use super::{
    SqliteRepository,
    mapping::{conn, map_prefs_row},
};
use crate::repository::{PrefsRepository, StorageError};

#[async_trait]
impl PrefsRepository for SqliteRepository {
    async fn get_prefs(&self) -> Result<Option<Prefs>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT day_start_ms, utc_offset_secs, collapse_time
            FROM prefs
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_prefs_row).transpose()
    }

    async fn save_prefs(&self, prefs: &Prefs) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO prefs (id, day_start_ms, utc_offset_secs, collapse_time)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                day_start_ms = excluded.day_start_ms,
                utc_offset_secs = excluded.utc_offset_secs,
                collapse_time = excluded.collapse_time
            ",
        )
        .bind(1_i64)
        .bind(i64::from(prefs.day_start_ms()))
        .bind(i64::from(prefs.utc_offset_secs()))
        .bind(i64::from(prefs.collapse_time()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
