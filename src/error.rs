//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Site Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum SiteVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// 检测日志持久化错误
    #[error("持久化错误: {0}")]
    Persistence(#[from] PersistenceError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 单次探测的失败分类
///
/// 只作为 `CheckResult` 上的数据存在，探测器从不把它作为错误返回给调用方。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ProbeError {
    /// 请求超时
    #[error("请求超时")]
    Timeout,

    /// 连接失败（DNS、拒绝连接、TLS 握手等）
    #[error("连接错误")]
    ConnectionError,

    /// 非 2xx 响应
    #[error("HTTP错误 {0}")]
    HttpError(u16),

    /// 其他无法归类的请求异常
    #[error("未知请求异常")]
    Unknown,
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 渠道未配置 Webhook 地址
    #[error("渠道未配置Webhook地址")]
    MissingWebhookUrl,

    /// 模板缺失或渲染失败
    #[error("模板渲染失败: {0}")]
    TemplateRender(String),

    /// 固定格式消息体编码失败
    #[error("消息体编码失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 网络层发送失败
    #[error("通知发送失败: {0}")]
    Transport(String),

    /// 对端返回了非成功的响应
    #[error("通知响应异常: 状态码={status}, 响应={body}")]
    UnexpectedResponse { status: u16, body: String },

    /// 渠道类型没有对应的发送器
    #[error("不支持的渠道类型: {0}")]
    UnsupportedChannel(String),
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::Transport(err.to_string())
    }
}

/// 检测日志存储错误
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// 存储文件读写失败
    #[error("日志存储IO失败: {0}")]
    Io(#[from] std::io::Error),

    /// 日志行编码/解码失败
    #[error("日志记录编码失败: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, SiteVitalsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        assert_eq!(ProbeError::Timeout.to_string(), "请求超时");
        assert_eq!(ProbeError::ConnectionError.to_string(), "连接错误");
        assert_eq!(ProbeError::HttpError(503).to_string(), "HTTP错误 503");
        assert_eq!(ProbeError::Unknown.to_string(), "未知请求异常");
    }

    #[test]
    fn test_probe_error_serialization() {
        let json = serde_json::to_string(&ProbeError::HttpError(502)).unwrap();
        assert_eq!(json, r#"{"kind":"http_error","code":502}"#);

        let parsed: ProbeError = serde_json::from_str(r#"{"kind":"timeout"}"#).unwrap();
        assert_eq!(parsed, ProbeError::Timeout);
    }

    #[test]
    fn test_notification_encoding_error() {
        let err: NotificationError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, NotificationError::Serialization(_)));
        assert!(err.to_string().starts_with("消息体编码失败"));
    }

    #[test]
    fn test_error_conversion() {
        let err: SiteVitalsError = ConfigError::ValidationError("bad".to_string()).into();
        assert!(err.to_string().contains("配置验证失败"));
    }
}
