use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks belong to one Postgres session, so callers hold a single
// connection from acquire through release.
const LOCK_NAMESPACE: i64 = 0x4B53_5749_4E47; // "KSWING"

fn lock_key_for_date(as_of_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (as_of_date.num_days_from_ce() as i64)
}

pub async fn try_acquire_as_of_date_lock(
    conn: &mut sqlx::PgConnection,
    as_of_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key_for_date(as_of_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_as_of_date_lock(
    conn: &mut sqlx::PgConnection,
    as_of_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key_for_date(as_of_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::date;

    #[test]
    fn lock_keys_differ_per_date() {
        assert_ne!(
            lock_key_for_date(date(2026, 2, 13)),
            lock_key_for_date(date(2026, 2, 12))
        );
    }
}
