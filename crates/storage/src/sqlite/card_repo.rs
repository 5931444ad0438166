use sqlx::sqlite::SqliteExecutor;

use study_core::model::{Card, CardId, DeckId};

use super::{
    SqliteRepository,
    mapping::{conn, map_card_row, u64_to_i64},
};
use crate::repository::{CardRepository, StorageError};

const CARD_COLUMNS: &str = r"
    id, deck_id, queue, state, due, scheduled_days, reps, lapses,
    last_review, stability, difficulty
";

/// Writes one card row. Shared by the plain upsert and the review commit
/// transaction.
pub(crate) async fn write_card<'e, E>(exec: E, card: &Card) -> Result<(), StorageError>
where
    E: SqliteExecutor<'e>,
{
    let memory = card.memory_state();

    sqlx::query(
        r"
        INSERT INTO cards (
            id, deck_id, queue, state, due, scheduled_days, reps, lapses,
            last_review, stability, difficulty
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            deck_id = excluded.deck_id,
            queue = excluded.queue,
            state = excluded.state,
            due = excluded.due,
            scheduled_days = excluded.scheduled_days,
            reps = excluded.reps,
            lapses = excluded.lapses,
            last_review = excluded.last_review,
            stability = excluded.stability,
            difficulty = excluded.difficulty
        ",
    )
    .bind(u64_to_i64("card_id", card.id().value())?)
    .bind(u64_to_i64("deck_id", card.deck_id().value())?)
    .bind(card.queue().as_i64())
    .bind(card.state().as_str())
    .bind(card.due())
    .bind(i64::from(card.scheduled_days()))
    .bind(i64::from(card.reps()))
    .bind(i64::from(card.lapses()))
    .bind(card.last_review())
    .bind(memory.as_ref().map(|m| m.stability))
    .bind(memory.as_ref().map(|m| m.difficulty))
    .execute(exec)
    .await
    .map_err(conn)?;

    Ok(())
}

/// `?1, ?2, ...` for an `IN (...)` list.
pub(crate) fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait::async_trait]
impl CardRepository for SqliteRepository {
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError> {
        write_card(&self.pool, card).await
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(u64_to_i64("card_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_card_row).transpose()
    }

    async fn cards_in_decks(&self, deck_ids: &[DeckId]) -> Result<Vec<Card>, StorageError> {
        if deck_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE deck_id IN ({}) ORDER BY id ASC",
            placeholders(deck_ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in deck_ids {
            q = q.bind(u64_to_i64("deck_id", id.value())?);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter().map(map_card_row).collect()
    }
}
