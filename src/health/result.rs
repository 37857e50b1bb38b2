//! 健康检测结果数据结构
//!
//! 定义单次探测结果、站点状态枚举以及持久化的检测日志记录

use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 单次探测的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// 正常
    Up,
    /// 访问过慢
    Slow,
    /// 无法访问
    Down,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SiteStatus::from(*self).fmt(f)
    }
}

/// 站点当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    /// 尚未探测
    #[default]
    Unknown,
    /// 正常
    Up,
    /// 访问过慢
    Slow,
    /// 无法访问
    Down,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteStatus::Unknown => write!(f, "未知"),
            SiteStatus::Up => write!(f, "正常"),
            SiteStatus::Slow => write!(f, "访问过慢"),
            SiteStatus::Down => write!(f, "无法访问"),
        }
    }
}

impl From<CheckStatus> for SiteStatus {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Up => SiteStatus::Up,
            CheckStatus::Slow => SiteStatus::Slow,
            CheckStatus::Down => SiteStatus::Down,
        }
    }
}

/// 单次探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// 分类结果
    pub status: CheckStatus,
    /// 响应时间（秒）
    pub response_time_seconds: Option<f64>,
    /// HTTP状态码
    pub http_status_code: Option<u16>,
    /// 失败分类
    pub error_detail: Option<ProbeError>,
}

impl CheckResult {
    /// 成功响应，按耗时划分为正常或过慢
    pub fn success(response_time_seconds: f64, http_status_code: u16, slow_threshold: f64) -> Self {
        let status = if response_time_seconds > slow_threshold {
            CheckStatus::Slow
        } else {
            CheckStatus::Up
        };
        Self {
            status,
            response_time_seconds: Some(response_time_seconds),
            http_status_code: Some(http_status_code),
            error_detail: None,
        }
    }

    /// 失败结果
    pub fn down(error: ProbeError, http_status_code: Option<u16>) -> Self {
        Self {
            status: CheckStatus::Down,
            response_time_seconds: None,
            http_status_code,
            error_detail: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != CheckStatus::Down
    }

    /// 保留两位小数的响应时间，用于展示与持久化
    pub fn rounded_response_time(&self) -> Option<f64> {
        self.response_time_seconds
            .map(|secs| (secs * 100.0).round() / 100.0)
    }
}

/// 持久化的检测日志记录，只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckLogEntry {
    /// 记录ID
    pub id: Uuid,
    /// 站点名称
    pub site_name: String,
    /// 检测时间
    pub timestamp: DateTime<Utc>,
    /// 检测结果
    pub status: CheckStatus,
    /// 响应时间（秒）
    pub response_time_seconds: Option<f64>,
    /// HTTP状态码
    pub http_status_code: Option<u16>,
    /// 错误详情
    pub error_detail: Option<String>,
}

impl HealthCheckLogEntry {
    /// 由探测结果生成日志记录
    pub fn from_result(site_name: &str, result: &CheckResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_name: site_name.to_string(),
            timestamp,
            status: result.status,
            response_time_seconds: result.rounded_response_time(),
            http_status_code: result.http_status_code,
            error_detail: result.error_detail.map(|e| e.to_string()),
        }
    }
}
