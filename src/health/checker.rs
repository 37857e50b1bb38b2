//! HTTP健康检测器实现
//!
//! 对站点发起一次 GET 请求并分类结果，失败时按配置快速重试。
//! 探测器不持有任何共享状态，也从不向调用方返回错误。

use crate::error::ProbeError;
use crate::health::result::CheckResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// 单次探测参数，由每个周期的配置快照生成
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    /// 请求超时时间
    pub timeout: Duration,
    /// 慢响应阈值（秒）
    pub slow_threshold_seconds: f64,
    /// 快速重试次数
    pub quick_retry_count: u32,
    /// 快速重试间隔
    pub quick_retry_delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            slow_threshold_seconds: 3.0,
            quick_retry_count: 1,
            quick_retry_delay: Duration::from_secs(2),
        }
    }
}

/// 健康检测器trait，定义检测接口
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// 执行健康检测
    ///
    /// # 参数
    /// * `url` - 检测地址
    /// * `settings` - 探测参数
    ///
    /// # 返回
    /// * `CheckResult` - 检测结果，失败信息记录在结果中
    async fn check(&self, url: &str, settings: &ProbeSettings) -> CheckResult;
}

/// HTTP健康检测器实现
#[derive(Clone)]
pub struct HttpHealthChecker {
    /// HTTP客户端
    client: Client,
}

impl HttpHealthChecker {
    /// 创建新的HTTP健康检测器
    ///
    /// 超时按每次请求单独设置，客户端本身不带超时。
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self { client })
    }

    /// 执行单次HTTP请求
    async fn perform_request(&self, url: &str, settings: &ProbeSettings) -> CheckResult {
        let start_time = Instant::now();
        let response_result = timeout(settings.timeout, self.client.get(url).send()).await;
        let elapsed = start_time.elapsed().as_secs_f64();

        match response_result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    CheckResult::success(elapsed, status.as_u16(), settings.slow_threshold_seconds)
                } else {
                    CheckResult::down(
                        ProbeError::HttpError(status.as_u16()),
                        Some(status.as_u16()),
                    )
                }
            }
            Ok(Err(e)) => CheckResult::down(classify_request_error(&e), None),
            Err(_) => CheckResult::down(ProbeError::Timeout, None),
        }
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    async fn check(&self, url: &str, settings: &ProbeSettings) -> CheckResult {
        let result =
            probe_with_quick_retry(settings, move || self.perform_request(url, settings)).await;
        debug!(
            url = url,
            status = ?result.status,
            response_time = ?result.response_time_seconds,
            "探测完成"
        );
        result
    }
}

/// 将请求错误映射为失败分类
fn classify_request_error(error: &reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout
    } else if error.is_connect() {
        ProbeError::ConnectionError
    } else if let Some(status) = error.status() {
        ProbeError::HttpError(status.as_u16())
    } else {
        ProbeError::Unknown
    }
}

/// 带快速重试的探测
///
/// 首次结果为 Down 时，间隔 `quick_retry_delay` 最多重试 `quick_retry_count` 次。
/// 任一重试成功即返回该结果；全部失败时返回首次的失败分类与状态码。
pub async fn probe_with_quick_retry<F, Fut>(settings: &ProbeSettings, mut attempt: F) -> CheckResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CheckResult>,
{
    let first = attempt().await;
    if first.is_success() {
        return first;
    }

    for retry in 1..=settings.quick_retry_count {
        if !settings.quick_retry_delay.is_zero() {
            tokio::time::sleep(settings.quick_retry_delay).await;
        }

        let outcome = attempt().await;
        if outcome.is_success() {
            debug!(retry = retry, "快速重试成功");
            return outcome;
        }
    }

    first
}
