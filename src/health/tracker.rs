//! 站点状态跟踪
//!
//! 每个站点维护一份 `SiteState`，每个检测周期由一次 `CheckResult` 驱动状态转换，
//! 并按连续次数与滑动窗口两种规则判定是否触发告警或恢复通知。
//! 所有状态由 `StatusTracker` 持有，通过一把读写锁串行化变更与查询。

use crate::config::{MonitoredSite, MonitoringConfig};
use crate::error::ProbeError;
use crate::health::result::{CheckResult, CheckStatus, HealthCheckLogEntry, SiteStatus};
use crate::health::suppressor::{AlertSuppressor, SuppressionLedger};
use crate::notification::event::{
    format_duration, format_ratio, format_timestamp, AlertEvent, DetailItem, EventKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 单个站点的告警状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteState {
    /// 检测地址，仅用于展示
    pub url: String,
    pub status: SiteStatus,
    pub consecutive_down: u32,
    pub consecutive_success: u32,
    pub consecutive_slow: u32,
    /// 最近若干次是否失败，最新的在末尾
    pub down_window: VecDeque<bool>,
    /// 最近若干次是否慢响应，最新的在末尾
    pub slow_window: VecDeque<bool>,
    pub down_alert_active: bool,
    pub slow_alert_active: bool,
    /// 当前连续失败开始时间
    pub down_since: Option<DateTime<Utc>>,
    /// 当前连续慢响应开始时间
    pub slow_since: Option<DateTime<Utc>>,
    /// 已告警故障的开始时间，恢复通知以此计算持续时长
    pub down_incident_since: Option<DateTime<Utc>>,
    pub slow_incident_since: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub suppression: SuppressionLedger,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_response_time: Option<f64>,
    pub last_http_code: Option<u16>,
    pub last_error: Option<ProbeError>,
}

/// 追加到有界窗口，容量为 0 时窗口保持为空
fn push_window(window: &mut VecDeque<bool>, value: bool, capacity: usize) {
    if capacity == 0 {
        window.clear();
        return;
    }
    window.push_back(value);
    while window.len() > capacity {
        window.pop_front();
    }
}

fn window_hits(window: &VecDeque<bool>) -> usize {
    window.iter().filter(|hit| **hit).count()
}

/// 窗口规则是否满足，窗口大小或阈值为 0 时视为关闭
fn window_rule_met(window: &VecDeque<bool>, size: usize, threshold: u32) -> bool {
    size > 0 && threshold > 0 && window_hits(window) >= threshold as usize
}

fn response_time_display(seconds: Option<f64>) -> Option<String> {
    seconds.map(|secs| format!("{:.2}秒", secs))
}

impl SiteState {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 应用一次检测结果
    ///
    /// # 参数
    /// * `site` - 站点
    /// * `result` - 检测结果
    /// * `config` - 本周期的告警参数
    /// * `now` - 检测时间
    ///
    /// # 返回
    /// * `Vec<AlertEvent>` - 本次触发的事件，按 宕机、恢复、慢响应、慢响应恢复 的顺序
    pub fn apply(
        &mut self,
        site: &MonitoredSite,
        result: &CheckResult,
        config: &MonitoringConfig,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let previous = self.status;
        self.url = site.url.clone();
        self.update_counters(result, config, now);

        let mut events = Vec::new();
        let suppressor = AlertSuppressor::new(config.alert_suppression_seconds);
        let epoch = now.timestamp();

        if let Some(event) = self.evaluate_down_alert(site, result, config, &suppressor, previous, now, epoch) {
            events.push(event);
        }
        if let Some(event) = self.evaluate_down_recovery(site, result, config, now) {
            events.push(event);
        }
        if let Some(event) = self.evaluate_slow_alert(site, result, config, &suppressor, previous, now, epoch) {
            events.push(event);
        }
        if let Some(event) = self.evaluate_slow_recovery(site, result, config, now) {
            events.push(event);
        }

        events
    }

    fn update_counters(&mut self, result: &CheckResult, config: &MonitoringConfig, now: DateTime<Utc>) {
        let previous = self.status;
        self.total_checks += 1;

        match result.status {
            CheckStatus::Down => {
                self.consecutive_down = if previous == SiteStatus::Down {
                    self.consecutive_down + 1
                } else {
                    1
                };
                self.consecutive_success = 0;
                self.consecutive_slow = 0;
                push_window(&mut self.down_window, true, config.down_window_size);
                push_window(&mut self.slow_window, false, config.slow_window_size);
                if previous != SiteStatus::Down {
                    self.down_since = Some(now);
                    self.slow_alert_active = false;
                    self.slow_since = None;
                    self.slow_incident_since = None;
                }
            }
            CheckStatus::Slow => {
                self.consecutive_down = 0;
                push_window(&mut self.down_window, false, config.down_window_size);
                self.consecutive_slow = if previous == SiteStatus::Slow {
                    self.consecutive_slow + 1
                } else {
                    1
                };
                push_window(&mut self.slow_window, true, config.slow_window_size);
                if previous != SiteStatus::Slow {
                    self.slow_since = Some(now);
                }
                self.consecutive_success = 0;
                self.down_since = None;
            }
            CheckStatus::Up => {
                self.consecutive_down = 0;
                push_window(&mut self.down_window, false, config.down_window_size);
                push_window(&mut self.slow_window, false, config.slow_window_size);
                self.consecutive_slow = 0;
                self.consecutive_success = if previous == SiteStatus::Up {
                    self.consecutive_success + 1
                } else {
                    1
                };
                self.down_since = None;
                self.slow_since = None;
            }
        }

        self.status = result.status.into();
        self.last_checked_at = Some(now);
        self.last_response_time = result.rounded_response_time();
        self.last_http_code = result.http_status_code;
        self.last_error = result.error_detail;
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_down_alert(
        &mut self,
        site: &MonitoredSite,
        result: &CheckResult,
        config: &MonitoringConfig,
        suppressor: &AlertSuppressor,
        previous: SiteStatus,
        now: DateTime<Utc>,
        epoch: i64,
    ) -> Option<AlertEvent> {
        if self.status != SiteStatus::Down || self.down_alert_active {
            return None;
        }
        let triggered = self.consecutive_down >= config.down_consecutive_threshold
            || window_rule_met(&self.down_window, config.down_window_size, config.down_window_threshold);
        if !triggered {
            return None;
        }
        if !suppressor.should_send(&self.suppression, EventKind::Down, epoch) {
            suppressor.log_suppressed(&mut self.suppression, &site.name, EventKind::Down, epoch);
            return None;
        }

        let since = self.down_since.unwrap_or(now);
        let window = format_ratio(
            window_hits(&self.down_window),
            if self.down_window.is_empty() { config.down_window_size } else { self.down_window.len() },
        );
        info!(
            site = %site.name,
            event = "down",
            "[告警触发] 宕机: {} 上次状态={}, 连续失败={}, 窗口失败={}, HTTP={}, 错误={}",
            site.name,
            previous,
            self.consecutive_down,
            window,
            result.http_status_code.map(|c| c.to_string()).unwrap_or_else(|| "N/A".to_string()),
            result.error_detail.map(|e| e.to_string()).unwrap_or_else(|| "N/A".to_string()),
        );

        suppressor.mark_sent(&mut self.suppression, EventKind::Down, epoch);
        self.down_alert_active = true;
        self.down_incident_since = Some(since);

        Some(AlertEvent {
            kind: EventKind::Down,
            site_name: site.name.clone(),
            site_url: site.url.clone(),
            previous_status: previous,
            occurred_at: now,
            http_status_code: result.http_status_code,
            error_detail: result.error_detail,
            details: vec![
                DetailItem::new("检测时间", format_timestamp(now)),
                DetailItem::new("故障开始时间", format_timestamp(since)),
                DetailItem::new("已持续", format_duration((now - since).num_seconds())),
                DetailItem::new("连续失败次数", self.consecutive_down),
                DetailItem::new("窗口失败次数", window),
                DetailItem::new("累计检查次数", self.total_checks),
            ],
        })
    }

    fn evaluate_down_recovery(
        &mut self,
        site: &MonitoredSite,
        result: &CheckResult,
        config: &MonitoringConfig,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        if !self.down_alert_active
            || self.status != SiteStatus::Up
            || self.consecutive_success < config.recovery_consecutive_threshold
        {
            return None;
        }

        let duration = self
            .down_incident_since
            .map(|since| format_duration((now - since).num_seconds()));
        info!(
            site = %site.name,
            event = "recovered",
            "[告警触发] 恢复: {} 连续正常={}, 持续时长={}",
            site.name,
            self.consecutive_success,
            duration.as_deref().unwrap_or("未知"),
        );

        self.down_alert_active = false;
        self.down_incident_since = None;

        Some(AlertEvent {
            kind: EventKind::Recovered,
            site_name: site.name.clone(),
            site_url: site.url.clone(),
            previous_status: SiteStatus::Down,
            occurred_at: now,
            http_status_code: None,
            error_detail: None,
            details: vec![
                DetailItem::new("恢复检测时间", format_timestamp(now)),
                DetailItem::new("故障持续时长", duration),
                DetailItem::new("累计检查次数", self.total_checks),
                DetailItem::new("最近一次响应时间", response_time_display(result.rounded_response_time())),
            ],
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_slow_alert(
        &mut self,
        site: &MonitoredSite,
        result: &CheckResult,
        config: &MonitoringConfig,
        suppressor: &AlertSuppressor,
        previous: SiteStatus,
        now: DateTime<Utc>,
        epoch: i64,
    ) -> Option<AlertEvent> {
        if self.status != SiteStatus::Slow || self.slow_alert_active {
            return None;
        }
        let triggered = self.consecutive_slow >= config.slow_consecutive_threshold
            || window_rule_met(&self.slow_window, config.slow_window_size, config.slow_window_threshold);
        if !triggered {
            return None;
        }
        if !suppressor.should_send(&self.suppression, EventKind::Slow, epoch) {
            suppressor.log_suppressed(&mut self.suppression, &site.name, EventKind::Slow, epoch);
            return None;
        }

        let since = self.slow_since.unwrap_or(now);
        let window = format_ratio(
            window_hits(&self.slow_window),
            if self.slow_window.is_empty() { config.slow_window_size } else { self.slow_window.len() },
        );
        let response_time = response_time_display(result.rounded_response_time());
        info!(
            site = %site.name,
            event = "slow",
            "[告警触发] 慢响应: {} 响应时间={}, 连续慢响应={}, 窗口慢响应={}",
            site.name,
            response_time.as_deref().unwrap_or("N/A"),
            self.consecutive_slow,
            window,
        );

        suppressor.mark_sent(&mut self.suppression, EventKind::Slow, epoch);
        self.slow_alert_active = true;
        self.slow_incident_since = Some(since);

        Some(AlertEvent {
            kind: EventKind::Slow,
            site_name: site.name.clone(),
            site_url: site.url.clone(),
            previous_status: previous,
            occurred_at: now,
            http_status_code: result.http_status_code,
            error_detail: result.error_detail,
            details: vec![
                DetailItem::new("检测时间", format_timestamp(now)),
                DetailItem::new("访问减速开始时间", format_timestamp(since)),
                DetailItem::new("已持续", format_duration((now - since).num_seconds())),
                DetailItem::new("连续慢响应次数", self.consecutive_slow),
                DetailItem::new("窗口慢响应次数", window),
                DetailItem::new("最近一次响应时间", response_time),
                DetailItem::new("累计检查次数", self.total_checks),
            ],
        })
    }

    fn evaluate_slow_recovery(
        &mut self,
        site: &MonitoredSite,
        result: &CheckResult,
        config: &MonitoringConfig,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        if !self.slow_alert_active
            || self.status != SiteStatus::Up
            || self.consecutive_success < config.slow_recovery_consecutive_threshold
        {
            return None;
        }

        let duration = self
            .slow_incident_since
            .map(|since| format_duration((now - since).num_seconds()));
        info!(
            site = %site.name,
            event = "slow_recovered",
            "[告警触发] 慢响应恢复: {} 连续正常={}, 慢响应持续时长={}",
            site.name,
            self.consecutive_success,
            duration.as_deref().unwrap_or("未知"),
        );

        self.slow_alert_active = false;
        self.slow_incident_since = None;

        Some(AlertEvent {
            kind: EventKind::SlowRecovered,
            site_name: site.name.clone(),
            site_url: site.url.clone(),
            previous_status: SiteStatus::Slow,
            occurred_at: now,
            http_status_code: None,
            error_detail: None,
            details: vec![
                DetailItem::new("恢复检测时间", format_timestamp(now)),
                DetailItem::new("慢响应持续时长", duration),
                DetailItem::new("累计检查次数", self.total_checks),
                DetailItem::new("最近一次响应时间", response_time_display(result.rounded_response_time())),
            ],
        })
    }
}

/// 对外展示的站点状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStatusView {
    pub name: String,
    pub url: String,
    pub status: SiteStatus,
    pub status_label: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub response_time_seconds: Option<f64>,
    pub http_status_code: Option<u16>,
    pub error_detail: Option<String>,
    pub consecutive_down: u32,
    pub consecutive_success: u32,
    pub consecutive_slow: u32,
    pub failures_in_window: usize,
    pub slow_in_window: usize,
    pub down_alert_active: bool,
    pub slow_alert_active: bool,
    pub down_since: Option<DateTime<Utc>>,
    pub slow_since: Option<DateTime<Utc>>,
    pub total_checks: u64,
}

impl SiteStatusView {
    fn from_state(name: &str, state: &SiteState) -> Self {
        Self {
            name: name.to_string(),
            url: state.url.clone(),
            status: state.status,
            status_label: state.status.to_string(),
            last_checked_at: state.last_checked_at,
            response_time_seconds: state.last_response_time,
            http_status_code: state.last_http_code,
            error_detail: state.last_error.map(|e| e.to_string()),
            consecutive_down: state.consecutive_down,
            consecutive_success: state.consecutive_success,
            consecutive_slow: state.consecutive_slow,
            failures_in_window: window_hits(&state.down_window),
            slow_in_window: window_hits(&state.slow_window),
            down_alert_active: state.down_alert_active,
            slow_alert_active: state.slow_alert_active,
            down_since: state.down_since,
            slow_since: state.slow_since,
            total_checks: state.total_checks,
        }
    }
}

/// 站点状态存储
///
/// 状态转换与告警判定在同一次加锁内完成，锁只覆盖内存操作，不跨越网络请求。
#[derive(Debug, Default)]
pub struct StatusTracker {
    states: RwLock<HashMap<String, SiteState>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一次检测结果，返回需要发送的事件副本
    pub async fn process(
        &self,
        site: &MonitoredSite,
        result: &CheckResult,
        config: &MonitoringConfig,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let mut states = self.states.write().await;
        let state = states
            .entry(site.name.clone())
            .or_insert_with(|| SiteState::new(site.url.clone()));
        state.apply(site, result, config, now)
    }

    /// 全部站点状态快照，按名称排序
    pub async fn current_statuses(&self) -> Vec<SiteStatusView> {
        let states = self.states.read().await;
        let mut views: Vec<SiteStatusView> = states
            .iter()
            .map(|(name, state)| SiteStatusView::from_state(name, state))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    /// 单个站点状态快照
    pub async fn site_status(&self, name: &str) -> Option<SiteStatusView> {
        let states = self.states.read().await;
        states
            .get(name)
            .map(|state| SiteStatusView::from_state(name, state))
    }

    /// 移除已停用或已删除站点的状态
    ///
    /// # 返回
    /// * `usize` - 移除的站点数
    pub async fn retain_sites(&self, active_sites: &[MonitoredSite]) -> usize {
        let active: HashSet<&str> = active_sites.iter().map(|s| s.name.as_str()).collect();
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|name, _| active.contains(name.as_str()));
        let removed = before - states.len();
        if removed > 0 {
            debug!("已移除 {} 个非活动站点的状态", removed);
        }
        removed
    }

    /// 启动时由每个站点最新的检测日志恢复展示状态
    ///
    /// 计数器与窗口不恢复，告警判定从零开始累计。
    ///
    /// # 返回
    /// * `usize` - 恢复了日志状态的站点数
    pub async fn restore(&self, active_sites: &[MonitoredSite], latest: &[HealthCheckLogEntry]) -> usize {
        let by_site: HashMap<&str, &HealthCheckLogEntry> =
            latest.iter().map(|e| (e.site_name.as_str(), e)).collect();
        let mut states = self.states.write().await;
        let mut restored = 0;

        for site in active_sites {
            let mut state = SiteState::new(site.url.clone());
            if let Some(entry) = by_site.get(site.name.as_str()) {
                state.status = entry.status.into();
                state.last_checked_at = Some(entry.timestamp);
                state.last_response_time = entry.response_time_seconds;
                state.last_http_code = entry.http_status_code;
                restored += 1;
            }
            states.insert(site.name.clone(), state);
        }

        info!("成功初始化 {} 个站点的状态", restored);
        restored
    }

    /// 当前跟踪的站点数
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}
