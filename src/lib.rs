//! Site Vitals - 网站健康监控与告警工具
//!
//! - HTTP/HTTPS 站点探测，支持快速重试与慢响应判定
//! - 连续次数与滑动窗口双重判定的防抖告警状态机
//! - 企业微信、钉钉、飞书与自定义 Webhook 多渠道通知
//! - 配置热重载与变更通知
//! - 检测日志持久化与按保留期清理
//! - 只读的站点状态 HTTP 接口

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod health;
pub mod logging;
pub mod notification;
pub mod storage;
pub mod web;

// 重新导出主要类型
pub use config::{Config, MonitoredSite, MonitoringConfig, NotificationChannel};
pub use error::SiteVitalsError;
pub use health::{CheckResult, HealthChecker, SiteStatus, StatusTracker};
pub use notification::{EventKind, NotificationDispatcher};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
