//! 内存检测日志存储

use crate::error::PersistenceError;
use crate::health::result::HealthCheckLogEntry;
use crate::storage::{latest_by_site, recent_for_site, HealthLogStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// 进程内的检测日志存储，未配置日志文件时使用
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<HealthCheckLogEntry>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前日志条数
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 全部日志副本
    pub async fn entries(&self) -> Vec<HealthCheckLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl HealthLogStore for MemoryLogStore {
    async fn append(&self, entry: HealthCheckLogEntry) -> Result<(), PersistenceError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        Ok(before - entries.len())
    }

    async fn latest_per_site(&self) -> Result<Vec<HealthCheckLogEntry>, PersistenceError> {
        Ok(latest_by_site(self.entries.read().await.iter()))
    }

    async fn recent(
        &self,
        site_name: &str,
        limit: usize,
    ) -> Result<Vec<HealthCheckLogEntry>, PersistenceError> {
        Ok(recent_for_site(self.entries.read().await.iter(), site_name, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::{CheckResult, CheckStatus};
    use chrono::Duration;

    fn entry(site: &str, at: DateTime<Utc>, result: CheckResult) -> HealthCheckLogEntry {
        HealthCheckLogEntry::from_result(site, &result, at)
    }

    #[tokio::test]
    async fn test_append_and_latest() {
        let store = MemoryLogStore::new();
        let now = Utc::now();
        store
            .append(entry("Shop", now - Duration::minutes(1), CheckResult::success(0.2, 200, 3.0)))
            .await
            .unwrap();
        store
            .append(entry("Shop", now, CheckResult::success(3.5, 200, 3.0)))
            .await
            .unwrap();
        store
            .append(entry("Blog", now, CheckResult::success(0.1, 200, 3.0)))
            .await
            .unwrap();

        let latest = store.latest_per_site().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].site_name, "Blog");
        assert_eq!(latest[1].status, CheckStatus::Slow);

        let recent = store.recent("Shop", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, now);
    }

    #[tokio::test]
    async fn test_delete_older_than_is_idempotent() {
        let store = MemoryLogStore::new();
        let now = Utc::now();
        for days in [40, 31, 5, 0] {
            store
                .append(entry(
                    "Shop",
                    now - Duration::days(days),
                    CheckResult::success(0.2, 200, 3.0),
                ))
                .await
                .unwrap();
        }

        let cutoff = now - Duration::days(30);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 2);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0);
        assert_eq!(store.len().await, 2);
    }
}
