//! 检测日志存储模块
//!
//! 检测日志只追加不修改，仅由数据清理任务按保留期删除

pub mod jsonl;
pub mod memory;

use crate::error::PersistenceError;
use crate::health::result::HealthCheckLogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use jsonl::JsonLinesLogStore;
pub use memory::MemoryLogStore;

/// 检测日志存储trait
#[async_trait]
pub trait HealthLogStore: Send + Sync {
    /// 追加一条日志
    async fn append(&self, entry: HealthCheckLogEntry) -> Result<(), PersistenceError>;

    /// 删除早于截止时间的日志
    ///
    /// # 返回
    /// * `Result<usize, PersistenceError>` - 删除的条数
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, PersistenceError>;

    /// 每个站点最新的一条日志
    async fn latest_per_site(&self) -> Result<Vec<HealthCheckLogEntry>, PersistenceError>;

    /// 指定站点最近的日志，按时间倒序
    async fn recent(
        &self,
        site_name: &str,
        limit: usize,
    ) -> Result<Vec<HealthCheckLogEntry>, PersistenceError>;
}

/// 从日志集合中选出每个站点时间最新的一条，按站点名排序
pub(crate) fn latest_by_site<'a, I>(entries: I) -> Vec<HealthCheckLogEntry>
where
    I: IntoIterator<Item = &'a HealthCheckLogEntry>,
{
    let mut latest: std::collections::BTreeMap<&str, &HealthCheckLogEntry> =
        std::collections::BTreeMap::new();
    for entry in entries {
        match latest.get(entry.site_name.as_str()) {
            Some(current) if current.timestamp >= entry.timestamp => {}
            _ => {
                latest.insert(entry.site_name.as_str(), entry);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// 指定站点最近的日志，按时间倒序
pub(crate) fn recent_for_site<'a, I>(
    entries: I,
    site_name: &str,
    limit: usize,
) -> Vec<HealthCheckLogEntry>
where
    I: IntoIterator<Item = &'a HealthCheckLogEntry>,
{
    let mut matched: Vec<&HealthCheckLogEntry> = entries
        .into_iter()
        .filter(|e| e.site_name == site_name)
        .collect();
    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matched.into_iter().take(limit).cloned().collect()
}
