//! JSON Lines 文件检测日志存储
//!
//! 每行一条 JSON 记录。追加与清理通过同一把异步锁串行执行，
//! 清理时先写入临时文件再原子替换。

use crate::error::PersistenceError;
use crate::health::result::HealthCheckLogEntry;
use crate::storage::{latest_by_site, recent_for_site, HealthLogStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// JSON Lines 文件存储
#[derive(Debug)]
pub struct JsonLinesLogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesLogStore {
    /// 创建存储，父目录不存在时自动创建
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部原始行，文件不存在时为空
    async fn read_lines(&self) -> Result<Vec<String>, PersistenceError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取并解析全部记录，无法解析的行跳过
    async fn read_entries(&self) -> Result<Vec<HealthCheckLogEntry>, PersistenceError> {
        let lines = self.read_lines().await?;
        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<HealthCheckLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("跳过无法解析的日志行 {}: {}", index + 1, e),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl HealthLogStore for JsonLinesLogStore {
    async fn append(&self, entry: HealthCheckLogEntry) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let _guard = self.lock.lock().await;
        let lines = self.read_lines().await?;

        let mut kept = String::new();
        let mut deleted = 0;
        for line in &lines {
            let expired = serde_json::from_str::<HealthCheckLogEntry>(line)
                .map(|entry| entry.timestamp < cutoff)
                .unwrap_or(false);
            if expired {
                deleted += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if deleted > 0 {
            let tmp_path = self.path.with_extension("jsonl.tmp");
            fs::write(&tmp_path, kept).await?;
            fs::rename(&tmp_path, &self.path).await?;
            debug!("日志文件 {} 已清理 {} 条记录", self.path.display(), deleted);
        }
        Ok(deleted)
    }

    async fn latest_per_site(&self) -> Result<Vec<HealthCheckLogEntry>, PersistenceError> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(latest_by_site(entries.iter()))
    }

    async fn recent(
        &self,
        site_name: &str,
        limit: usize,
    ) -> Result<Vec<HealthCheckLogEntry>, PersistenceError> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(recent_for_site(entries.iter(), site_name, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::health::result::{CheckResult, CheckStatus};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> JsonLinesLogStore {
        JsonLinesLogStore::open(dir.path().join("logs").join("checks.jsonl"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let down = CheckResult::down(ProbeError::Timeout, None);
        store
            .append(HealthCheckLogEntry::from_result("Shop", &down, now))
            .await
            .unwrap();
        store
            .append(HealthCheckLogEntry::from_result(
                "Shop",
                &CheckResult::success(0.42, 200, 3.0),
                now + Duration::seconds(20),
            ))
            .await
            .unwrap();

        let latest = store.latest_per_site().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].status, CheckStatus::Up);
        assert_eq!(latest[0].response_time_seconds, Some(0.42));

        let recent = store.recent("Shop", 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, CheckStatus::Up);

        let all = store.recent("Shop", 10).await.unwrap();
        assert_eq!(all[1].error_detail.as_deref(), Some("请求超时"));
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        assert!(store.latest_per_site().await.unwrap().is_empty());
        assert_eq!(store.delete_older_than(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retention_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();
        for days in [45, 31, 2] {
            store
                .append(HealthCheckLogEntry::from_result(
                    "Shop",
                    &CheckResult::success(0.2, 200, 3.0),
                    now - Duration::days(days),
                ))
                .await
                .unwrap();
        }

        let cutoff = now - Duration::days(30);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 2);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0);

        let content = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .append(HealthCheckLogEntry::from_result(
                "Shop",
                &CheckResult::success(0.2, 200, 3.0),
                Utc::now(),
            ))
            .await
            .unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(store.path())
            .await
            .unwrap();
        file.write_all(b"{not json}\n").await.unwrap();

        assert_eq!(store.latest_per_site().await.unwrap().len(), 1);
        // 无法解析的行在清理时保留
        assert_eq!(store.delete_older_than(Utc::now() - Duration::days(1)).await.unwrap(), 0);
    }
}
