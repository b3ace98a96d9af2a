use crate::storage::{ResultEntry, ResultStore, ResultType, StoredResult};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    rows: RwLock<HashMap<(NaiveDate, ResultType), StoredResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    fn store_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, entry: &ResultEntry) -> anyhow::Result<()> {
        let mut rows = self.rows.write().await;
        let key = (entry.target_date, entry.result_type);
        let (id, created_at) = match rows.get(&key) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Some(uuid::Uuid::new_v4()), Utc::now()),
        };
        rows.insert(
            key,
            StoredResult {
                id,
                target_date: entry.target_date,
                result_type: entry.result_type,
                results_json: entry.results_json.clone(),
                top_picks_json: entry.top_picks_json.clone(),
                stock_count: entry.stock_count,
                created_at,
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        result_type: ResultType,
        target_date: Option<NaiveDate>,
    ) -> anyhow::Result<Option<StoredResult>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.result_type == result_type)
            .filter(|r| target_date.map_or(true, |d| r.target_date == d))
            .max_by_key(|r| r.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::report;
    use crate::test_support::date;

    #[tokio::test]
    async fn upsert_replaces_but_keeps_created_at() {
        let store = MemoryResultStore::new();
        let d = date(2026, 2, 13);

        store
            .upsert(&ResultEntry::from_report(&report(d, &[("000001", 40.0)])).unwrap())
            .await
            .unwrap();
        let first = store.query(ResultType::Swing, Some(d)).await.unwrap().unwrap();

        store
            .upsert(
                &ResultEntry::from_report(&report(d, &[("000001", 40.0), ("000002", 30.0)]))
                    .unwrap(),
            )
            .await
            .unwrap();
        let second = store.query(ResultType::Swing, Some(d)).await.unwrap().unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(second.stock_count, 2);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn latest_follows_insertion_time_not_target_date() {
        let store = MemoryResultStore::new();
        let newer_day = date(2026, 2, 13);
        let backfill = date(2026, 2, 10);

        store
            .upsert(&ResultEntry::from_report(&report(newer_day, &[("000001", 40.0)])).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .upsert(&ResultEntry::from_report(&report(backfill, &[("000002", 35.0)])).unwrap())
            .await
            .unwrap();

        let latest = store.query(ResultType::Swing, None).await.unwrap().unwrap();
        assert_eq!(latest.target_date, backfill);

        let pinned = store
            .query(ResultType::Swing, Some(newer_day))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pinned.target_date, newer_day);
        assert!(store
            .query(ResultType::Swing, Some(date(2026, 1, 2)))
            .await
            .unwrap()
            .is_none());
    }
}
