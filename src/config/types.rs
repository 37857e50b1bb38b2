//! 配置数据结构定义
//!
//! 定义站点、通知渠道、监控参数等配置结构体和验证逻辑

use crate::health::checker::ProbeSettings;
use crate::notification::event::EventKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构
///
/// 每个检测周期开始时取一次快照，周期内不会变化。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 告警判定参数
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// 通知发送参数
    #[serde(default)]
    pub notification: NotificationSettings,
    /// Web 状态接口配置
    pub web: Option<WebConfig>,
    /// 监控站点列表
    #[serde(default)]
    pub sites: Vec<MonitoredSite>,
    /// 通知渠道列表
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
}

impl Config {
    /// 当前启用的站点
    pub fn active_sites(&self) -> Vec<MonitoredSite> {
        self.sites.iter().filter(|s| s.active).cloned().collect()
    }
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出JSON格式日志
    #[serde(default)]
    pub log_json: bool,
    /// 日志文件路径（不设置则输出到控制台）
    pub log_file: Option<PathBuf>,
    /// 检测日志存储文件（JSON Lines），不设置则仅保存在内存中
    pub log_store_path: Option<PathBuf>,
    /// 数据清理任务间隔（小时）
    #[serde(default = "default_retention_sweep_interval")]
    pub retention_sweep_interval_hours: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            log_file: None,
            log_store_path: None,
            retention_sweep_interval_hours: default_retention_sweep_interval(),
        }
    }
}

/// 告警判定参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// 检测周期（秒）
    pub monitor_interval_seconds: u64,
    /// 请求超时时间（秒）
    pub request_timeout_seconds: u64,
    /// 响应超过该阈值判定为“访问过慢”（秒）
    pub slow_response_threshold_seconds: f64,
    /// 连续失败 N 次后告警
    pub down_consecutive_threshold: u32,
    /// 失败滑动窗口大小，0 表示关闭窗口判定
    pub down_window_size: usize,
    /// 窗口内失败次数达到该值也告警
    pub down_window_threshold: u32,
    /// 连续正常 N 次后发送恢复通知
    pub recovery_consecutive_threshold: u32,
    /// 连续慢响应 N 次后告警
    pub slow_consecutive_threshold: u32,
    /// 慢响应滑动窗口大小，0 表示关闭窗口判定
    pub slow_window_size: usize,
    /// 窗口内慢响应次数达到该值也告警
    pub slow_window_threshold: u32,
    /// 连续正常 N 次后发送慢响应恢复通知
    pub slow_recovery_consecutive_threshold: u32,
    /// 单次检查失败后的快速重试次数
    pub quick_retry_count: u32,
    /// 快速重试间隔（秒）
    pub quick_retry_delay_seconds: u64,
    /// 同一站点同类告警的最小发送间隔（秒），0 表示不抑制
    pub alert_suppression_seconds: i64,
    /// 检测日志保留天数
    pub data_retention_days: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: 20,
            request_timeout_seconds: 10,
            slow_response_threshold_seconds: 3.0,
            down_consecutive_threshold: 3,
            down_window_size: 5,
            down_window_threshold: 3,
            recovery_consecutive_threshold: 2,
            slow_consecutive_threshold: 3,
            slow_window_size: 5,
            slow_window_threshold: 3,
            slow_recovery_consecutive_threshold: 2,
            quick_retry_count: 1,
            quick_retry_delay_seconds: 2,
            alert_suppression_seconds: 600,
            data_retention_days: 30,
        }
    }
}

impl MonitoringConfig {
    /// 探测器参数
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout: Duration::from_secs(self.request_timeout_seconds),
            slow_threshold_seconds: self.slow_response_threshold_seconds,
            quick_retry_count: self.quick_retry_count,
            quick_retry_delay: Duration::from_secs(self.quick_retry_delay_seconds),
        }
    }
}

/// 通知发送参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    /// 并发发送的最大渠道数，设置为 1 等同于串行发送
    pub workers: usize,
    /// 单个渠道请求超时（秒）
    pub request_timeout_seconds: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            request_timeout_seconds: 10,
        }
    }
}

/// 监控站点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoredSite {
    /// 站点名称，唯一
    pub name: String,
    /// 检测地址
    pub url: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub active: bool,
}

impl MonitoredSite {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            active: true,
        }
    }
}

/// 通知渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// 企业微信群机器人
    #[serde(rename = "wecom")]
    WeCom,
    /// 钉钉群机器人
    #[serde(rename = "dingtalk")]
    DingTalk,
    /// 飞书群机器人
    Feishu,
    /// 自定义 Webhook
    CustomWebhook,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::WeCom => write!(f, "wecom"),
            ChannelType::DingTalk => write!(f, "dingtalk"),
            ChannelType::Feishu => write!(f, "feishu"),
            ChannelType::CustomWebhook => write!(f, "custom_webhook"),
        }
    }
}

/// 渠道关注的事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventInterests {
    pub down: bool,
    pub recovered: bool,
    pub slow: bool,
    pub slow_recovered: bool,
    pub management: bool,
}

impl Default for EventInterests {
    fn default() -> Self {
        Self {
            down: true,
            recovered: true,
            slow: true,
            slow_recovered: true,
            management: true,
        }
    }
}

/// 通知渠道
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationChannel {
    /// 渠道ID
    #[serde(default)]
    pub id: u32,
    /// 渠道名称
    pub name: String,
    /// 渠道类型
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Webhook 地址
    pub webhook_url: Option<String>,
    /// 关注的事件
    #[serde(default)]
    pub events: EventInterests,
    /// 自定义请求头，覆盖默认的 Content-Type
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 自定义消息模板（仅自定义 Webhook 使用）
    pub template: Option<String>,
    /// 加签密钥（钉钉、飞书）
    pub secret: Option<String>,
}

impl NotificationChannel {
    /// 渠道是否关注该事件
    pub fn should_notify(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Down => self.events.down,
            EventKind::Recovered => self.events.recovered,
            EventKind::Slow => self.events.slow,
            EventKind::SlowRecovered => self.events.slow_recovered,
            EventKind::Management => self.events.management,
        }
    }

    /// 日志中使用的显示名称
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Channel#{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Web 状态接口配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用
    #[serde(default)]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_web_bind_address(),
            port: default_web_port(),
        }
    }
}

impl WebConfig {
    /// 解析监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| format!("无效的Web监听地址 {}:{}: {}", self.bind_address, self.port, e))
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_retention_sweep_interval() -> u64 {
    24
}
fn default_enabled() -> bool {
    true
}
fn default_web_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    8080
}

/// 检测日志最长保留天数
pub const MAX_DATA_RETENTION_DAYS: u32 = 36_500;

/// 数据清理任务最长间隔（小时）
pub const MAX_RETENTION_SWEEP_INTERVAL_HOURS: u64 = 24 * 365;

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if config.global.retention_sweep_interval_hours == 0 {
        return Err("数据清理间隔不能为0".to_string());
    }
    if config.global.retention_sweep_interval_hours > MAX_RETENTION_SWEEP_INTERVAL_HOURS {
        return Err(format!(
            "数据清理间隔不能超过{}小时",
            MAX_RETENTION_SWEEP_INTERVAL_HOURS
        ));
    }

    let monitoring = &config.monitoring;
    if monitoring.monitor_interval_seconds == 0 {
        return Err("检测周期不能为0".to_string());
    }
    if monitoring.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }
    if !(monitoring.slow_response_threshold_seconds > 0.0) {
        return Err("慢响应阈值必须大于0".to_string());
    }
    if monitoring.down_consecutive_threshold == 0 || monitoring.slow_consecutive_threshold == 0 {
        return Err("连续告警阈值不能为0".to_string());
    }
    if monitoring.recovery_consecutive_threshold == 0
        || monitoring.slow_recovery_consecutive_threshold == 0
    {
        return Err("恢复确认阈值不能为0".to_string());
    }
    if monitoring.down_window_size > 0
        && monitoring.down_window_threshold as usize > monitoring.down_window_size
    {
        return Err("失败窗口阈值不能大于窗口大小".to_string());
    }
    if monitoring.slow_window_size > 0
        && monitoring.slow_window_threshold as usize > monitoring.slow_window_size
    {
        return Err("慢响应窗口阈值不能大于窗口大小".to_string());
    }
    if monitoring.data_retention_days == 0 {
        return Err("数据保留天数不能为0".to_string());
    }
    if monitoring.data_retention_days > MAX_DATA_RETENTION_DAYS {
        return Err(format!("数据保留天数不能超过{}天", MAX_DATA_RETENTION_DAYS));
    }

    if config.notification.workers == 0 {
        return Err("通知并发数不能为0".to_string());
    }
    if config.notification.request_timeout_seconds == 0 {
        return Err("通知请求超时时间不能为0".to_string());
    }

    if let Some(ref web) = config.web {
        if web.enabled {
            if web.port == 0 {
                return Err("Web服务器端口不能为0".to_string());
            }
            web.socket_addr()?;
        }
    }

    let mut names = HashSet::new();
    for site in &config.sites {
        if site.name.trim().is_empty() {
            return Err("站点名称不能为空".to_string());
        }
        if !names.insert(site.name.as_str()) {
            return Err(format!("站点名称重复: {}", site.name));
        }
        if !site.url.starts_with("http://") && !site.url.starts_with("https://") {
            return Err(format!("站点 {} 的URL格式无效", site.name));
        }
    }

    for channel in &config.channels {
        let name = channel.display_name();
        match channel.webhook_url.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
            Some(_) => return Err(format!("通知渠道 {} 的Webhook地址格式无效", name)),
            None if channel.enabled => {
                return Err(format!("通知渠道 {} 未配置Webhook地址", name));
            }
            None => {}
        }

        if channel.channel_type == ChannelType::CustomWebhook {
            let template = channel
                .template
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| format!("自定义渠道 {} 缺少消息模板", name))?;
            handlebars::Template::compile(template)
                .map_err(|e| format!("自定义渠道 {} 的模板语法错误: {}", name, e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            monitoring: MonitoringConfig::default(),
            notification: NotificationSettings::default(),
            web: None,
            sites: vec![MonitoredSite::new("Shop", "https://shop.example.com")],
            channels: vec![NotificationChannel {
                id: 1,
                name: "ops".to_string(),
                channel_type: ChannelType::WeCom,
                enabled: true,
                webhook_url: Some("https://qyapi.example.com/send?key=abc".to_string()),
                events: EventInterests::default(),
                headers: HashMap::new(),
                template: None,
                secret: None,
            }],
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(validate_config(&create_test_config()).is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();
        let serialized = toml::to_string(&config).expect("序列化失败");
        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_default_values() {
        let config: Config = toml::from_str(
            r#"
[[sites]]
name = "Shop"
url = "https://shop.example.com"
"#,
        )
        .unwrap();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.monitoring.monitor_interval_seconds, 20);
        assert_eq!(config.monitoring.down_consecutive_threshold, 3);
        assert_eq!(config.monitoring.down_window_size, 5);
        assert_eq!(config.monitoring.recovery_consecutive_threshold, 2);
        assert_eq!(config.monitoring.alert_suppression_seconds, 600);
        assert_eq!(config.monitoring.data_retention_days, 30);
        assert_eq!(config.notification.workers, 4);
        assert!(config.sites[0].active);
    }

    #[test]
    fn test_duplicate_site_names() {
        let mut config = create_test_config();
        config
            .sites
            .push(MonitoredSite::new("Shop", "https://other.example.com"));

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("站点名称重复"));
    }

    #[test]
    fn test_invalid_site_url() {
        let mut config = create_test_config();
        config.sites[0].url = "shop.example.com".to_string();
        assert!(validate_config(&config).unwrap_err().contains("URL格式无效"));
    }

    #[test]
    fn test_window_threshold_larger_than_window() {
        let mut config = create_test_config();
        config.monitoring.down_window_threshold = 6;
        assert!(validate_config(&config).unwrap_err().contains("失败窗口阈值"));

        // 窗口关闭时不校验阈值
        config.monitoring.down_window_size = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_retention_bounds() {
        let mut config = create_test_config();
        config.monitoring.data_retention_days = 200_000_000;
        assert!(validate_config(&config).unwrap_err().contains("数据保留天数不能超过"));

        config.monitoring.data_retention_days = MAX_DATA_RETENTION_DAYS;
        assert!(validate_config(&config).is_ok());

        config.global.retention_sweep_interval_hours = u64::MAX;
        assert!(validate_config(&config).unwrap_err().contains("数据清理间隔不能超过"));
    }

    #[test]
    fn test_custom_webhook_requires_template() {
        let mut config = create_test_config();
        config.channels[0].channel_type = ChannelType::CustomWebhook;
        assert!(validate_config(&config).unwrap_err().contains("缺少消息模板"));

        config.channels[0].template = Some("{{#if site_name}}unclosed".to_string());
        assert!(validate_config(&config).unwrap_err().contains("模板语法错误"));

        config.channels[0].template = Some(r#"{"site":"{{site_name}}"}"#.to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_enabled_channel_requires_webhook() {
        let mut config = create_test_config();
        config.channels[0].webhook_url = None;
        assert!(validate_config(&config).unwrap_err().contains("未配置Webhook地址"));

        config.channels[0].enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_channel_type_parsing() {
        let channel: NotificationChannel = toml::from_str(
            r#"
name = "hook"
type = "custom_webhook"
webhook_url = "https://hooks.example.com/x"
template = "{}"

[events]
slow = false
"#,
        )
        .unwrap();

        assert_eq!(channel.channel_type, ChannelType::CustomWebhook);
        assert!(channel.should_notify(EventKind::Down));
        assert!(!channel.should_notify(EventKind::Slow));
        assert!(channel.should_notify(EventKind::Management));
    }

    #[test]
    fn test_web_config_default() {
        let web = WebConfig::default();
        assert!(!web.enabled);
        assert_eq!(web.port, 8080);
        assert_eq!(web.socket_addr().unwrap().port(), 8080);
    }
}
