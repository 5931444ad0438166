use std::collections::HashMap;

use sqlx::sqlite::SqliteExecutor;

use study_core::model::{Deck, DeckId};

use super::{
    SqliteRepository,
    card_repo::placeholders,
    mapping::{conn, map_deck_row, to_json, u64_to_i64},
};
use crate::repository::{DeckRepository, StorageError};

const DECK_COLUMNS: &str = r"
    id, name, parent_id, conf_id, today, new_today, revcards_today,
    revlogs_today, custom_newcard_limit
";

/// Writes one deck row, counters included.
pub(crate) async fn write_deck<'e, E>(exec: E, deck: &Deck) -> Result<(), StorageError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r"
        INSERT INTO decks (
            id, name, parent_id, conf_id, today, new_today, revcards_today,
            revlogs_today, custom_newcard_limit
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            parent_id = excluded.parent_id,
            conf_id = excluded.conf_id,
            today = excluded.today,
            new_today = excluded.new_today,
            revcards_today = excluded.revcards_today,
            revlogs_today = excluded.revlogs_today,
            custom_newcard_limit = excluded.custom_newcard_limit
        ",
    )
    .bind(u64_to_i64("deck_id", deck.id().value())?)
    .bind(deck.name())
    .bind(
        deck.parent_id()
            .map(|p| u64_to_i64("parent_id", p.value()))
            .transpose()?,
    )
    .bind(u64_to_i64("conf_id", deck.conf_id().value())?)
    .bind(deck.today())
    .bind(to_json(deck.new_today())?)
    .bind(to_json(deck.revcards_today())?)
    .bind(to_json(deck.revlogs_today())?)
    .bind(deck.custom_newcard_limit().map(i64::from))
    .execute(exec)
    .await
    .map_err(conn)?;

    Ok(())
}

#[async_trait::async_trait]
impl DeckRepository for SqliteRepository {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        write_deck(&self.pool, deck).await
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError> {
        let sql = format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(u64_to_i64("deck_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_deck_row).transpose()
    }

    async fn get_decks(&self, ids: &[DeckId]) -> Result<Vec<Deck>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {DECK_COLUMNS} FROM decks WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(u64_to_i64("deck_id", id.value())?);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut by_id: HashMap<DeckId, Deck> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let deck = map_deck_row(row)?;
            by_id.insert(deck.id(), deck);
        }

        ids.iter()
            .map(|id| by_id.get(id).cloned().ok_or(StorageError::NotFound))
            .collect()
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, StorageError> {
        let sql = format!("SELECT {DECK_COLUMNS} FROM decks ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_deck_row).collect()
    }
}
