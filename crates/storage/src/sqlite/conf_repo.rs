use study_core::model::{ConfId, StudyConf};

use super::{
    SqliteRepository,
    mapping::{conn, map_conf_row, u64_to_i64},
};
use crate::repository::{ConfRepository, StorageError};

#[async_trait::async_trait]
impl ConfRepository for SqliteRepository {
    async fn upsert_conf(&self, conf: &StudyConf) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO confs (id, new_per_day, new_pick_at_random, review_per_day, collapse_time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                new_per_day = excluded.new_per_day,
                new_pick_at_random = excluded.new_pick_at_random,
                review_per_day = excluded.review_per_day,
                collapse_time = excluded.collapse_time
            ",
        )
        .bind(u64_to_i64("conf_id", conf.id().value())?)
        .bind(i64::from(conf.new_per_day()))
        .bind(conf.new_pick_at_random())
        .bind(i64::from(conf.review_per_day()))
        .bind(conf.collapse_time().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_conf(&self, id: ConfId) -> Result<Option<StudyConf>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, new_per_day, new_pick_at_random, review_per_day, collapse_time
            FROM confs
            WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("conf_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_conf_row).transpose()
    }
}
