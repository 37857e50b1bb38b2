//! 检测周期调度模块
//!
//! 一个检测周期内按顺序探测每个启用的站点：探测、驱动状态机、写入检测日志、分发触发的事件。
//! 单个站点的探测或日志写入失败不会中断周期。

use crate::config::{MonitoredSite, MonitoringConfig, NotificationChannel};
use crate::error::PersistenceError;
use crate::health::checker::HealthChecker;
use crate::health::result::{CheckResult, HealthCheckLogEntry};
use crate::health::tracker::StatusTracker;
use crate::notification::dispatcher::{DispatchSummary, NotificationDispatcher};
use crate::notification::event::{EventKind, NotificationContext};
use crate::storage::HealthLogStore;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 单个站点的检测结果
#[derive(Debug, Clone, Serialize)]
pub struct SiteCheckOutcome {
    pub site_name: String,
    pub url: String,
    pub result: CheckResult,
    /// 本次触发的事件
    pub events: Vec<EventKind>,
}

/// 一个检测周期的汇总
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<SiteCheckOutcome>,
    /// 日志写入失败次数
    pub log_failures: usize,
    /// 通知发送汇总
    pub dispatch: DispatchSummary,
}

impl CycleReport {
    pub fn checked(&self) -> usize {
        self.outcomes.len()
    }

    pub fn events_fired(&self) -> usize {
        self.outcomes.iter().map(|o| o.events.len()).sum()
    }
}

/// 检测周期执行器
pub struct CheckCycle {
    /// 健康检测器
    checker: Arc<dyn HealthChecker>,
    /// 站点状态
    tracker: Arc<StatusTracker>,
    /// 检测日志存储
    store: Arc<dyn HealthLogStore>,
    /// 通知分发器，为空时只判定不发送
    dispatcher: Option<Arc<NotificationDispatcher>>,
}

impl CheckCycle {
    /// 创建检测周期执行器
    ///
    /// # 参数
    /// * `checker` - 健康检测器
    /// * `tracker` - 站点状态
    /// * `store` - 检测日志存储
    /// * `dispatcher` - 通知分发器（可选）
    pub fn new(
        checker: Arc<dyn HealthChecker>,
        tracker: Arc<StatusTracker>,
        store: Arc<dyn HealthLogStore>,
        dispatcher: Option<Arc<NotificationDispatcher>>,
    ) -> Self {
        Self {
            checker,
            tracker,
            store,
            dispatcher,
        }
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<dyn HealthLogStore> {
        &self.store
    }

    /// 执行一个检测周期
    ///
    /// # 参数
    /// * `config` - 本周期的告警参数快照
    /// * `sites` - 站点列表，停用的站点会被跳过并清除状态
    /// * `channels` - 渠道快照
    ///
    /// # 返回
    /// * `CycleReport` - 周期汇总，所有通知发送完成后返回
    pub async fn run_check_cycle(
        &self,
        config: &MonitoringConfig,
        sites: &[MonitoredSite],
        channels: &[NotificationChannel],
    ) -> CycleReport {
        let active: Vec<MonitoredSite> = sites.iter().filter(|s| s.active).cloned().collect();
        self.tracker.retain_sites(&active).await;

        let mut report = CycleReport::default();
        if active.is_empty() {
            info!("健康检查：没有启用的监控站点");
            return report;
        }

        info!("开始执行健康检查，共 {} 个网站", active.len());
        let settings = config.probe_settings();
        let channels = Arc::new(channels.to_vec());
        let mut dispatches = JoinSet::new();

        for site in &active {
            let result = self.checker.check(&site.url, &settings).await;
            let now = Utc::now();

            let events = self.tracker.process(site, &result, config, now).await;

            if let Err(e) = self
                .store
                .append(HealthCheckLogEntry::from_result(&site.name, &result, now))
                .await
            {
                report.log_failures += 1;
                error!(site = %site.name, "写入检测日志失败: {}", e);
            }

            debug!(
                site = %site.name,
                status = %result.status,
                http = ?result.http_status_code,
                response_time = ?result.rounded_response_time(),
                error = ?result.error_detail,
                "站点检测完成"
            );

            let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
            match &self.dispatcher {
                Some(dispatcher) => {
                    for event in events {
                        let dispatcher = Arc::clone(dispatcher);
                        let channels = Arc::clone(&channels);
                        let context = NotificationContext::from_alert(&event);
                        dispatches.spawn(async move {
                            dispatcher.dispatch(event.kind, &context, &channels).await
                        });
                    }
                }
                None if !events.is_empty() => {
                    debug!(site = %site.name, "未配置通知分发器，跳过 {} 个事件", events.len());
                }
                None => {}
            }

            report.outcomes.push(SiteCheckOutcome {
                site_name: site.name.clone(),
                url: site.url.clone(),
                result,
                events: kinds,
            });
        }

        while let Some(joined) = dispatches.join_next().await {
            match joined {
                Ok(summary) => {
                    report.dispatch.attempted += summary.attempted;
                    report.dispatch.succeeded += summary.succeeded;
                    report.dispatch.failed += summary.failed;
                }
                Err(e) => warn!("通知分发任务异常: {}", e),
            }
        }

        info!(
            checked = report.checked(),
            events = report.events_fired(),
            "健康检查完成"
        );
        report
    }

    /// 清理超过保留期的检测日志
    ///
    /// # 参数
    /// * `retention_days` - 保留天数
    ///
    /// # 返回
    /// * `Result<usize, PersistenceError>` - 删除的条数
    pub async fn run_retention_sweep(&self, retention_days: u32) -> Result<usize, PersistenceError> {
        let cutoff = match ChronoDuration::try_days(i64::from(retention_days))
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        {
            Some(cutoff) => cutoff,
            None => {
                warn!("数据清理任务：保留天数 {} 超出可表示的时间范围，跳过本次清理", retention_days);
                return Ok(0);
            }
        };
        let deleted = self.store.delete_older_than(cutoff).await?;
        if deleted > 0 {
            info!("数据清理任务：已清理 {} 条 {} 天前的旧数据", deleted, retention_days);
        } else {
            debug!("数据清理任务：没有需要清理的旧数据");
        }
        Ok(deleted)
    }
}
