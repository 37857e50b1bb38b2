//! 告警事件与通知上下文
//!
//! 状态机产出的 `AlertEvent` 在锁外被转换为 `NotificationContext`，
//! 作为各渠道渲染消息的唯一数据来源。

use crate::error::ProbeError;
use crate::health::result::SiteStatus;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 通知事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 站点宕机
    Down,
    /// 站点恢复
    Recovered,
    /// 访问过慢
    Slow,
    /// 访问速度恢复
    SlowRecovered,
    /// 配置变更等管理事件
    Management,
}

impl EventKind {
    /// 全部事件类型
    pub const ALL: [EventKind; 5] = [
        EventKind::Down,
        EventKind::Recovered,
        EventKind::Slow,
        EventKind::SlowRecovered,
        EventKind::Management,
    ];

    /// 事件键
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Down => "down",
            EventKind::Recovered => "recovered",
            EventKind::Slow => "slow",
            EventKind::SlowRecovered => "slow_recovered",
            EventKind::Management => "management",
        }
    }

    /// 消息标题
    pub fn title(&self) -> &'static str {
        match self {
            EventKind::Down => "网站宕机告警通知",
            EventKind::Recovered => "网站恢复通知",
            EventKind::Slow => "网站性能告警通知",
            EventKind::SlowRecovered => "网站性能恢复通知",
            EventKind::Management => "配置变更通知",
        }
    }

    /// 状态描述
    pub fn status_label(&self) -> &'static str {
        match self {
            EventKind::Down => "无法访问",
            EventKind::Recovered => "已恢复正常",
            EventKind::Slow => "访问过慢",
            EventKind::SlowRecovered => "访问速度恢复正常",
            EventKind::Management => "配置变更",
        }
    }

    /// markdown 字体颜色
    pub fn status_color(&self) -> &'static str {
        match self {
            EventKind::Down => "warning",
            EventKind::Slow => "comment",
            _ => "info",
        }
    }

    /// 严重程度
    pub fn severity(&self) -> &'static str {
        match self {
            EventKind::Down | EventKind::Slow => "warning",
            _ => "info",
        }
    }

    /// 恢复类事件不受告警抑制
    pub fn is_recovery(&self) -> bool {
        matches!(self, EventKind::Recovered | EventKind::SlowRecovered)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "未知的事件类型: {}，支持: down, recovered, slow, slow_recovered, management",
                    s
                )
            })
    }
}

/// 标签/值形式的详情项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailItem {
    pub label: String,
    pub value: serde_json::Value,
}

impl DetailItem {
    pub fn new(label: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// 值为空时渲染器跳过该项
    pub fn is_empty(&self) -> bool {
        match &self.value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    /// 渲染用的文本值
    pub fn display_value(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 状态机触发的站点告警事件
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: EventKind,
    pub site_name: String,
    pub site_url: String,
    /// 本次检测前的状态
    pub previous_status: SiteStatus,
    pub occurred_at: DateTime<Utc>,
    pub http_status_code: Option<u16>,
    pub error_detail: Option<ProbeError>,
    pub details: Vec<DetailItem>,
}

/// 站点信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub name: String,
    pub url: String,
}

/// 状态信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub key: String,
    pub label: String,
    pub previous: String,
}

/// 通知上下文，既用于固定格式渲染，也作为自定义模板的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub event: EventKind,
    /// site 或 management
    pub event_category: String,
    pub event_title: String,
    pub site_name: Option<String>,
    pub site_url: Option<String>,
    pub status_key: Option<String>,
    pub status_label: Option<String>,
    pub status_color: Option<String>,
    pub previous_status: Option<String>,
    pub severity: String,
    pub operator: Option<String>,
    pub timestamp: String,
    pub http_code: Option<u16>,
    pub error_detail: Option<String>,
    pub details: Vec<DetailItem>,
    pub extra: Vec<DetailItem>,
    pub site: Option<SiteInfo>,
    pub status: Option<StatusInfo>,
}

impl NotificationContext {
    /// 由站点告警事件构建
    pub fn from_alert(event: &AlertEvent) -> Self {
        let kind = event.kind;
        let previous = event.previous_status.to_string();
        Self {
            event: kind,
            event_category: "site".to_string(),
            event_title: kind.title().to_string(),
            site_name: Some(event.site_name.clone()),
            site_url: Some(event.site_url.clone()),
            status_key: Some(kind.as_str().to_string()),
            status_label: Some(kind.status_label().to_string()),
            status_color: Some(kind.status_color().to_string()),
            previous_status: Some(previous.clone()),
            severity: kind.severity().to_string(),
            operator: None,
            timestamp: format_timestamp(event.occurred_at),
            http_code: event.http_status_code,
            error_detail: event.error_detail.map(|e| e.to_string()),
            details: event.details.clone(),
            extra: event.details.clone(),
            site: Some(SiteInfo {
                name: event.site_name.clone(),
                url: event.site_url.clone(),
            }),
            status: Some(StatusInfo {
                key: kind.as_str().to_string(),
                label: kind.status_label().to_string(),
                previous,
            }),
        }
    }

    /// 构建管理事件上下文，操作人缺省为“系统”
    pub fn management(
        title: impl Into<String>,
        operator: Option<String>,
        details: Vec<DetailItem>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let kind = EventKind::Management;
        Self {
            event: kind,
            event_category: "management".to_string(),
            event_title: title.into(),
            site_name: None,
            site_url: None,
            status_key: None,
            status_label: None,
            status_color: None,
            previous_status: None,
            severity: kind.severity().to_string(),
            operator: Some(operator.unwrap_or_else(|| "系统".to_string())),
            timestamp: format_timestamp(occurred_at),
            http_code: None,
            error_detail: None,
            details: details.clone(),
            extra: details,
            site: None,
            status: None,
        }
    }

    pub fn is_site_event(&self) -> bool {
        self.event_category == "site"
    }

    /// 非空详情项
    pub fn visible_details(&self) -> impl Iterator<Item = &DetailItem> {
        self.details.iter().filter(|item| !item.is_empty())
    }
}

/// 展示用时间格式（本地时间）
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// 将时长格式化为“X天Y小时Z分钟W秒”，全零时为“0秒”
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    let mut parts = String::new();
    if days > 0 {
        parts.push_str(&format!("{}天", days));
    }
    if hours > 0 {
        parts.push_str(&format!("{}小时", hours));
    }
    if minutes > 0 {
        parts.push_str(&format!("{}分钟", minutes));
    }
    if secs > 0 || parts.is_empty() {
        parts.push_str(&format!("{}秒", secs));
    }
    parts
}

/// 窗口计数展示，如 “3/5”；窗口为空时分母取配置的窗口大小
pub fn format_ratio(count: usize, total: usize) -> String {
    if total == 0 {
        format!("{}/-", count)
    } else {
        format!("{}/{}", count, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> AlertEvent {
        AlertEvent {
            kind: EventKind::Down,
            site_name: "Shop".to_string(),
            site_url: "https://shop.example.com".to_string(),
            previous_status: SiteStatus::Up,
            occurred_at: Utc::now(),
            http_status_code: Some(502),
            error_detail: Some(ProbeError::HttpError(502)),
            details: vec![
                DetailItem::new("连续失败次数", 3),
                DetailItem::new("最近一次响应时间", serde_json::Value::Null),
            ],
        }
    }

    #[test]
    fn test_event_kind_metadata() {
        assert_eq!(EventKind::Down.title(), "网站宕机告警通知");
        assert_eq!(EventKind::Recovered.status_label(), "已恢复正常");
        assert_eq!(EventKind::Slow.status_color(), "comment");
        assert_eq!(EventKind::SlowRecovered.severity(), "info");
        assert!(EventKind::Recovered.is_recovery());
        assert!(!EventKind::Slow.is_recovery());
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("slow_recovered".parse::<EventKind>(), Ok(EventKind::SlowRecovered));
        assert!("outage".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_context_from_alert() {
        let context = NotificationContext::from_alert(&sample_event());

        assert!(context.is_site_event());
        assert_eq!(context.event_title, "网站宕机告警通知");
        assert_eq!(context.previous_status.as_deref(), Some("正常"));
        assert_eq!(context.error_detail.as_deref(), Some("HTTP错误 502"));
        assert_eq!(context.status.as_ref().unwrap().key, "down");
        assert_eq!(context.visible_details().count(), 1);

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["event"], "down");
        assert_eq!(json["site"]["name"], "Shop");
    }

    #[test]
    fn test_management_context_defaults_operator() {
        let context = NotificationContext::management("新增站点", None, vec![], Utc::now());
        assert!(!context.is_site_event());
        assert_eq!(context.operator.as_deref(), Some("系统"));
        assert!(context.site.is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0秒");
        assert_eq!(format_duration(59), "59秒");
        assert_eq!(format_duration(3_600), "1小时");
        assert_eq!(format_duration(90_061), "1天1小时1分钟1秒");
        assert_eq!(format_duration(-5), "0秒");
    }

    #[test]
    fn test_format_ratio() {
        assert_eq!(format_ratio(3, 5), "3/5");
        assert_eq!(format_ratio(0, 0), "0/-");
    }
}
