use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use study_core::model::{
    Card, CardId, CardQueue, CardState, ConfId, Deck, DeckId, Prefs, ReviewGrade, ReviewLog,
    StudyConf,
};
use study_core::spacing::MemoryState;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

//
// ─── NUMERIC CONVERSIONS ───────────────────────────────────────────────────────
//

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn deck_id_from_i64(v: i64) -> Result<DeckId, StorageError> {
    Ok(DeckId::new(i64_to_u64("deck_id", v)?))
}

pub(crate) fn card_id_from_i64(v: i64) -> Result<CardId, StorageError> {
    Ok(CardId::new(i64_to_u64("card_id", v)?))
}

pub(crate) fn conf_id_from_i64(v: i64) -> Result<ConfId, StorageError> {
    Ok(ConfId::new(i64_to_u64("conf_id", v)?))
}

//
// ─── JSON COUNTERS ─────────────────────────────────────────────────────────────
//

/// Per-day counter arrays are stored as JSON text.
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field}: {e}")))
}

//
// ─── GRADES ────────────────────────────────────────────────────────────────────
//

/// Storage encoding is 0..=3: Again=0, Hard=1, Good=2, Easy=3.
pub(crate) fn grade_to_i64(grade: ReviewGrade) -> i64 {
    i64::from(grade.as_u8())
}

pub(crate) fn grade_from_i64(v: i64) -> Result<ReviewGrade, StorageError> {
    let raw = u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid grade: {v}")))?;
    ReviewGrade::from_u8(raw).map_err(ser)
}

//
// ─── ROW MAPPERS ───────────────────────────────────────────────────────────────
//

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    let state_str: String = row.try_get("state").map_err(ser)?;
    let state = CardState::parse(&state_str).map_err(ser)?;
    let queue = CardQueue::from_i64(row.try_get::<i64, _>("queue").map_err(ser)?).map_err(ser)?;

    let stability: Option<f64> = row.try_get("stability").map_err(ser)?;
    let difficulty: Option<f64> = row.try_get("difficulty").map_err(ser)?;
    let memory = match (stability, difficulty) {
        (Some(s), Some(d)) => Some(MemoryState::new(s, d)),
        (None, None) => None,
        _ => {
            return Err(StorageError::Serialization(
                "partial memory state".into(),
            ));
        }
    };

    Card::from_persisted(
        card_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        deck_id_from_i64(row.try_get::<i64, _>("deck_id").map_err(ser)?)?,
        queue,
        state,
        row.try_get("due").map_err(ser)?,
        i64_to_u32("scheduled_days", row.try_get("scheduled_days").map_err(ser)?)?,
        i64_to_u32("reps", row.try_get("reps").map_err(ser)?)?,
        i64_to_u32("lapses", row.try_get("lapses").map_err(ser)?)?,
        row.try_get("last_review").map_err(ser)?,
        memory,
    )
    .map_err(ser)
}

pub(crate) fn map_deck_row(row: &SqliteRow) -> Result<Deck, StorageError> {
    let parent_id = row
        .try_get::<Option<i64>, _>("parent_id")
        .map_err(ser)?
        .map(deck_id_from_i64)
        .transpose()?;
    let today: Option<DateTime<Utc>> = row.try_get("today").map_err(ser)?;

    let new_today: Vec<CardId> =
        from_json("new_today", &row.try_get::<String, _>("new_today").map_err(ser)?)?;
    let revcards_today: Vec<CardId> = from_json(
        "revcards_today",
        &row.try_get::<String, _>("revcards_today").map_err(ser)?,
    )?;
    let revlogs_today: Vec<i64> = from_json(
        "revlogs_today",
        &row.try_get::<String, _>("revlogs_today").map_err(ser)?,
    )?;

    let custom_newcard_limit = row
        .try_get::<Option<i64>, _>("custom_newcard_limit")
        .map_err(ser)?
        .map(|v| i64_to_u32("custom_newcard_limit", v))
        .transpose()?;

    Deck::from_persisted(
        deck_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        parent_id,
        conf_id_from_i64(row.try_get::<i64, _>("conf_id").map_err(ser)?)?,
        today,
        new_today,
        revcards_today,
        revlogs_today,
        custom_newcard_limit,
    )
    .map_err(ser)
}

pub(crate) fn map_conf_row(row: &SqliteRow) -> Result<StudyConf, StorageError> {
    let collapse_time = row
        .try_get::<Option<i64>, _>("collapse_time")
        .map_err(ser)?
        .map(|v| i64_to_u32("collapse_time", v))
        .transpose()?;

    StudyConf::new(
        conf_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        i64_to_u32("new_per_day", row.try_get("new_per_day").map_err(ser)?)?,
        row.try_get::<bool, _>("new_pick_at_random").map_err(ser)?,
        i64_to_u32("review_per_day", row.try_get("review_per_day").map_err(ser)?)?,
        collapse_time,
    )
    .map_err(ser)
}

pub(crate) fn map_prefs_row(row: &SqliteRow) -> Result<Prefs, StorageError> {
    let utc_offset_secs = i32::try_from(row.try_get::<i64, _>("utc_offset_secs").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("utc_offset_secs overflow".into()))?;

    Prefs::new(
        i64_to_u32("day_start_ms", row.try_get("day_start_ms").map_err(ser)?)?,
        utc_offset_secs,
        i64_to_u32("collapse_time", row.try_get("collapse_time").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_review_log_row(row: &SqliteRow) -> Result<ReviewLog, StorageError> {
    let state_str: String = row.try_get("state").map_err(ser)?;

    Ok(ReviewLog {
        id: row.try_get("id").map_err(ser)?,
        card_id: card_id_from_i64(row.try_get::<i64, _>("card_id").map_err(ser)?)?,
        deck_id: deck_id_from_i64(row.try_get::<i64, _>("deck_id").map_err(ser)?)?,
        grade: grade_from_i64(row.try_get::<i64, _>("grade").map_err(ser)?)?,
        state: CardState::parse(&state_str).map_err(ser)?,
        reviewed_at: row.try_get("reviewed_at").map_err(ser)?,
        elapsed_days: row.try_get("elapsed_days").map_err(ser)?,
        scheduled_days: i64_to_u32("scheduled_days", row.try_get("scheduled_days").map_err(ser)?)?,
        stability: row.try_get("stability").map_err(ser)?,
        difficulty: row.try_get("difficulty").map_err(ser)?,
        due: row.try_get("due").map_err(ser)?,
    })
}
