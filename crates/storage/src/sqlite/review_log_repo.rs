use study_core::model::{Card, CardId, Deck, ReviewLog};

use super::{
    SqliteRepository,
    card_repo::write_card,
    deck_repo::write_deck,
    mapping::{conn, grade_to_i64, map_review_log_row, u64_to_i64},
};
use crate::repository::{
    ReviewLogRepository, ReviewPersistence, StorageError, check_review_matches,
};

#[async_trait::async_trait]
impl ReviewLogRepository for SqliteRepository {
    async fn logs_for_card(&self, card_id: CardId) -> Result<Vec<ReviewLog>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, card_id, deck_id, grade, state, reviewed_at,
                    elapsed_days, scheduled_days, stability, difficulty, due
                FROM review_logs
                WHERE card_id = ?1
                ORDER BY reviewed_at ASC, id ASC
            ",
        )
        .bind(u64_to_i64("card_id", card_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_review_log_row).collect()
    }
}

#[async_trait::async_trait]
impl ReviewPersistence for SqliteRepository {
    async fn commit_review(
        &self,
        card: &Card,
        deck: &Deck,
        log: &ReviewLog,
    ) -> Result<(), StorageError> {
        check_review_matches(card, deck, log)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        write_deck(&mut *tx, deck).await?;
        write_card(&mut *tx, card).await?;

        let inserted = sqlx::query(
            r"
                INSERT INTO review_logs (
                    id, card_id, deck_id, grade, state, reviewed_at,
                    elapsed_days, scheduled_days, stability, difficulty, due
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(log.id)
        .bind(u64_to_i64("card_id", log.card_id.value())?)
        .bind(u64_to_i64("deck_id", log.deck_id.value())?)
        .bind(grade_to_i64(log.grade))
        .bind(log.state.as_str())
        .bind(log.reviewed_at)
        .bind(log.elapsed_days)
        .bind(i64::from(log.scheduled_days))
        .bind(log.stability)
        .bind(log.difficulty)
        .bind(log.due)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Dropping the transaction rolls back the card and deck writes.
        if inserted.rows_affected() == 0 {
            tracing::warn!(log_id = log.id, card_id = %log.card_id, "duplicate review log id");
            return Err(StorageError::Conflict);
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(log_id = log.id, card_id = %log.card_id, "review committed");
        Ok(())
    }
}
