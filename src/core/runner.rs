//! 监控运行器
//!
//! 按固定间隔执行检测周期，周期之间不重叠。每个周期开始前处理待重载的配置，
//! 并向关注管理事件的渠道发送配置变更通知。数据清理任务按独立间隔运行。

use crate::config::types::MAX_RETENTION_SWEEP_INTERVAL_HOURS;
use crate::config::{Config, ConfigDiff, ConfigManager, ConfigWatcher, NotificationChannel};
use crate::health::{CheckCycle, CycleReport, HealthChecker, HttpHealthChecker, StatusTracker};
use crate::notification::{DispatchSummary, EventKind, NotificationContext, NotificationDispatcher};
use crate::storage::{HealthLogStore, JsonLinesLogStore, MemoryLogStore};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 配置文件变更的防抖时间
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// 监控运行器
pub struct MonitorRunner {
    manager: Arc<ConfigManager>,
    cycle: CheckCycle,
    dispatcher: Arc<NotificationDispatcher>,
    watcher: Option<ConfigWatcher>,
    /// 命令行指定的检测间隔
    interval_override: Option<u64>,
}

impl MonitorRunner {
    /// 按配置创建运行器
    ///
    /// # 参数
    /// * `config` - 已验证的配置
    /// * `config_path` - 配置文件路径，提供时支持热重载
    /// * `interval_override` - 命令行指定的检测间隔（秒）
    pub async fn build(
        config: Config,
        config_path: Option<PathBuf>,
        interval_override: Option<u64>,
    ) -> Result<Self> {
        let store: Arc<dyn HealthLogStore> = match &config.global.log_store_path {
            Some(path) => Arc::new(
                JsonLinesLogStore::open(path)
                    .await
                    .with_context(|| format!("打开检测日志文件失败: {}", path.display()))?,
            ),
            None => {
                info!("未配置检测日志文件，使用内存存储");
                Arc::new(MemoryLogStore::new())
            }
        };
        let checker: Arc<dyn HealthChecker> =
            Arc::new(HttpHealthChecker::new().context("创建健康检测器失败")?);
        let dispatcher = Arc::new(
            NotificationDispatcher::new(&config.notification).context("创建通知分发器失败")?,
        );

        let manager = Arc::new(match &config_path {
            Some(path) => ConfigManager::with_path(config, path),
            None => ConfigManager::new(config),
        });

        Ok(Self::with_parts(
            manager,
            checker,
            store,
            dispatcher,
            interval_override,
        ))
    }

    /// 由已有组件创建运行器
    pub fn with_parts(
        manager: Arc<ConfigManager>,
        checker: Arc<dyn HealthChecker>,
        store: Arc<dyn HealthLogStore>,
        dispatcher: Arc<NotificationDispatcher>,
        interval_override: Option<u64>,
    ) -> Self {
        let cycle = CheckCycle::new(
            checker,
            Arc::new(StatusTracker::new()),
            store,
            Some(Arc::clone(&dispatcher)),
        );
        Self {
            manager,
            cycle,
            dispatcher,
            watcher: None,
            interval_override,
        }
    }

    /// 站点状态，供状态接口读取
    pub fn tracker(&self) -> Arc<StatusTracker> {
        Arc::clone(self.cycle.tracker())
    }

    pub fn store(&self) -> Arc<dyn HealthLogStore> {
        Arc::clone(self.cycle.store())
    }

    pub fn manager(&self) -> &Arc<ConfigManager> {
        &self.manager
    }

    /// 启动配置文件监控
    pub fn watch_config(&mut self) -> Result<()> {
        let Some(path) = self.manager.config_path() else {
            return Ok(());
        };
        let mut watcher = ConfigWatcher::new(path, RELOAD_DEBOUNCE)?;
        watcher.start()?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// 由检测日志恢复站点状态
    ///
    /// # 返回
    /// * `usize` - 恢复了状态的站点数，读取失败时为 0
    pub async fn warm_start(&self) -> usize {
        let config = self.manager.snapshot().await;
        match self.cycle.store().latest_per_site().await {
            Ok(latest) => {
                self.cycle
                    .tracker()
                    .restore(&config.active_sites(), &latest)
                    .await
            }
            Err(e) => {
                warn!("读取历史检测日志失败，站点状态将从未知开始: {}", e);
                0
            }
        }
    }

    /// 执行一个检测周期
    pub async fn run_cycle(&self) -> CycleReport {
        let config = self.manager.snapshot().await;
        self.cycle
            .run_check_cycle(&config.monitoring, &config.sites, &config.channels)
            .await
    }

    /// 处理待重载的配置文件
    ///
    /// # 返回
    /// * `Vec<ConfigDiff>` - 生效的配置差异，未重载或重载失败时为空
    pub async fn apply_pending_reload(&self) -> Vec<ConfigDiff> {
        let pending = self
            .watcher
            .as_ref()
            .map(|w| w.take_pending_reload())
            .unwrap_or(false);
        if !pending {
            return Vec::new();
        }

        info!("检测到配置文件变更，重新加载配置");
        match self.manager.reload().await {
            Ok(diffs) => {
                if !diffs.is_empty() {
                    let config = self.manager.snapshot().await;
                    self.notify_config_changes(&diffs, &config.channels).await;
                }
                diffs
            }
            Err(e) => {
                error!("配置重新加载失败，继续使用当前配置: {:#}", e);
                Vec::new()
            }
        }
    }

    /// 发送配置变更的管理通知
    pub async fn notify_config_changes(
        &self,
        diffs: &[ConfigDiff],
        channels: &[NotificationChannel],
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for diff in diffs.iter().filter(|d| d.is_notable()) {
            info!(event = %EventKind::Management, "配置变更: {}", diff.title());
            let context =
                NotificationContext::management(diff.title(), None, diff.details(), Utc::now());
            let result = self
                .dispatcher
                .dispatch(EventKind::Management, &context, channels)
                .await;
            summary.attempted += result.attempted;
            summary.succeeded += result.succeeded;
            summary.failed += result.failed;
        }
        summary
    }

    async fn cycle_interval(&self) -> Duration {
        let seconds = match self.interval_override {
            Some(seconds) => seconds,
            None => self.manager.snapshot().await.monitoring.monitor_interval_seconds,
        };
        Duration::from_secs(seconds.max(1))
    }

    async fn retention_interval(&self) -> Duration {
        let hours = self
            .manager
            .snapshot()
            .await
            .global
            .retention_sweep_interval_hours;
        sweep_period(hours)
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut period = self.cycle_interval().await;
        let mut cycle_timer = new_interval(period);
        let mut sweep_timer = new_interval(self.retention_interval().await);

        info!("监控运行器已启动，检测间隔 {} 秒", period.as_secs());

        loop {
            tokio::select! {
                _ = cycle_timer.tick() => {
                    let diffs = self.apply_pending_reload().await;
                    if !diffs.is_empty() {
                        let next = self.cycle_interval().await;
                        if next != period {
                            info!("检测间隔调整为 {} 秒", next.as_secs());
                            period = next;
                            cycle_timer = new_interval(period);
                            cycle_timer.tick().await;
                        }
                    }
                    let report = self.run_cycle().await;
                    debug!(
                        checked = report.checked(),
                        events = report.events_fired(),
                        dispatched = report.dispatch.attempted,
                        "检测周期结束"
                    );
                }
                _ = sweep_timer.tick() => {
                    let retention_days = self.manager.snapshot().await.monitoring.data_retention_days;
                    if let Err(e) = self.cycle.run_retention_sweep(retention_days).await {
                        error!("数据清理任务失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，监控运行器停止");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// 数据清理间隔，超出上限时按上限处理
fn sweep_period(hours: u64) -> Duration {
    let hours = match hours {
        0 => 1,
        h if h > MAX_RETENTION_SWEEP_INTERVAL_HOURS => {
            warn!(
                "数据清理间隔 {} 小时超过上限，按 {} 小时执行",
                h, MAX_RETENTION_SWEEP_INTERVAL_HOURS
            );
            MAX_RETENTION_SWEEP_INTERVAL_HOURS
        }
        h => h,
    };
    Duration::from_secs(hours.saturating_mul(3600))
}

fn new_interval(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}
