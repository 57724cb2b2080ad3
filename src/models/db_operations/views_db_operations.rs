use crate::models::db_operations::DbError;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};

/// (post id, day number since the Unix epoch) -> views on that day.
pub const DAILY_VIEWS: TableDefinition<(&str, i64), u64> = TableDefinition::new("daily_views");

const SECONDS_PER_DAY: i64 = 86_400;

pub fn day_number(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(SECONDS_PER_DAY)
}

/// Increments the aggregate for `post_id` on `day`. Redb allows one write
/// transaction at a time, so concurrent pings never lose an increment.
pub fn record_daily_view(db: &Database, post_id: &str, day: i64) -> Result<u64, DbError> {
    let write_txn = db.begin_write()?;
    let count = {
        let mut table = write_txn.open_table(DAILY_VIEWS)?;
        let current = table.get((post_id, day))?.map(|guard| guard.value()).unwrap_or(0);
        let next = current + 1;
        table.insert((post_id, day), next)?;
        next
    };
    write_txn.commit()?;
    Ok(count)
}

/// Per-day counts for `post_id` between `from_day` and `to_day` inclusive.
/// Days without views are omitted.
pub fn read_daily_views(db: &Database, post_id: &str, from_day: i64, to_day: i64) -> Result<Vec<(i64, u64)>, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(DAILY_VIEWS)?;
    let mut days = Vec::new();
    for item in table.range((post_id, from_day)..=(post_id, to_day))? {
        let (key, value) = item?;
        days.push((key.value().1, value.value()));
    }
    Ok(days)
}

/// Drops every aggregate for a post that was hard-deleted.
pub fn delete_post_views(db: &Database, post_id: &str) -> Result<(), DbError> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(DAILY_VIEWS)?;
        let mut days: Vec<i64> = Vec::new();
        for item in table.range((post_id, i64::MIN)..=(post_id, i64::MAX))? {
            let (key, _) = item?;
            days.push(key.value().1);
        }
        for day in days {
            table.remove((post_id, day))?;
        }
    }
    write_txn.commit()?;
    Ok(())
}
