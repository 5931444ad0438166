use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates decks (with their per-day counters), confs, the prefs
/// row, cards, review logs and the indexes used by gathering.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS confs (
                id INTEGER PRIMARY KEY,
                new_per_day INTEGER NOT NULL CHECK (new_per_day >= 0),
                new_pick_at_random INTEGER NOT NULL CHECK (new_pick_at_random IN (0, 1)),
                review_per_day INTEGER NOT NULL CHECK (review_per_day >= 0),
                collapse_time INTEGER CHECK (collapse_time >= 0)
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS prefs (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                day_start_ms INTEGER NOT NULL CHECK (day_start_ms >= 0),
                utc_offset_secs INTEGER NOT NULL,
                collapse_time INTEGER NOT NULL CHECK (collapse_time >= 0)
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS decks (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id INTEGER,
                conf_id INTEGER NOT NULL,
                today TEXT,
                new_today TEXT NOT NULL DEFAULT '[]',
                revcards_today TEXT NOT NULL DEFAULT '[]',
                revlogs_today TEXT NOT NULL DEFAULT '[]',
                custom_newcard_limit INTEGER CHECK (custom_newcard_limit >= 0)
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS cards (
                id INTEGER PRIMARY KEY,
                deck_id INTEGER NOT NULL,
                queue INTEGER NOT NULL CHECK (queue BETWEEN 0 AND 2),
                state TEXT NOT NULL,
                due TEXT NOT NULL,
                scheduled_days INTEGER NOT NULL CHECK (scheduled_days >= 0),
                reps INTEGER NOT NULL CHECK (reps >= 0),
                lapses INTEGER NOT NULL CHECK (lapses >= 0),
                last_review TEXT,
                stability REAL,
                difficulty REAL,
                FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS review_logs (
                id INTEGER PRIMARY KEY,
                card_id INTEGER NOT NULL,
                deck_id INTEGER NOT NULL,
                grade INTEGER NOT NULL CHECK (grade BETWEEN 0 AND 3),
                state TEXT NOT NULL,
                reviewed_at TEXT NOT NULL,
                elapsed_days REAL NOT NULL,
                scheduled_days INTEGER NOT NULL CHECK (scheduled_days >= 0),
                stability REAL NOT NULL,
                difficulty REAL NOT NULL,
                due TEXT NOT NULL,
                FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_cards_deck_queue_due
                ON cards(deck_id, queue, due);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_decks_parent
                ON decks(parent_id);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_review_logs_card_reviewed_at
                ON review_logs (card_id, reviewed_at);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(version = 1, "applied study store migration");

    Ok(())
}
