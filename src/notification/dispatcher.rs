//! 通知分发器
//!
//! 按事件类型筛选关注该事件的已启用渠道，并发发送。
//! 单个渠道的失败、超时或 panic 只影响该渠道，不会取消或拖延其他渠道。

use crate::config::{ChannelType, NotificationChannel, NotificationSettings};
use crate::error::NotificationError;
use crate::notification::channel::{default_senders, ChannelSender};
use crate::notification::event::{EventKind, NotificationContext};
use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// 外层超时在请求超时之上留出的余量
const DISPATCH_GRACE: Duration = Duration::from_secs(2);

/// 一次分发的汇总结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// 尝试发送的渠道数
    pub attempted: usize,
    /// 成功数
    pub succeeded: usize,
    /// 失败数
    pub failed: usize,
}

/// 通知分发器
pub struct NotificationDispatcher {
    senders: HashMap<ChannelType, Arc<dyn ChannelSender>>,
    workers: usize,
    request_timeout: Duration,
}

impl NotificationDispatcher {
    /// 使用内置发送器创建分发器
    ///
    /// # 参数
    /// * `settings` - 通知发送参数
    ///
    /// # 返回
    /// * `Result<Self>` - 分发器实例
    pub fn new(settings: &NotificationSettings) -> Result<Self> {
        let request_timeout = Duration::from_secs(settings.request_timeout_seconds);
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self {
            senders: default_senders(client),
            workers: settings.workers,
            request_timeout,
        })
    }

    /// 使用指定的发送器表创建分发器
    pub fn with_senders(
        senders: HashMap<ChannelType, Arc<dyn ChannelSender>>,
        workers: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            senders,
            workers,
            request_timeout,
        }
    }

    /// 分发一条通知
    ///
    /// # 参数
    /// * `kind` - 事件类型
    /// * `context` - 通知上下文
    /// * `channels` - 渠道快照
    ///
    /// # 返回
    /// * `DispatchSummary` - 发送汇总
    pub async fn dispatch(
        &self,
        kind: EventKind,
        context: &NotificationContext,
        channels: &[NotificationChannel],
    ) -> DispatchSummary {
        let targets: Vec<NotificationChannel> = channels
            .iter()
            .filter(|c| c.enabled && c.should_notify(kind))
            .cloned()
            .collect();

        if targets.is_empty() {
            debug!(event = %kind, "没有启用的渠道匹配事件 {}", kind);
            return DispatchSummary::default();
        }

        let workers = self.workers.clamp(1, targets.len());
        let semaphore = Arc::new(Semaphore::new(workers));
        let context = Arc::new(context.clone());
        let deadline = self.request_timeout + DISPATCH_GRACE;
        let mut tasks = JoinSet::new();

        for channel in targets {
            let semaphore = semaphore.clone();
            let context = context.clone();
            let sender = self.senders.get(&channel.channel_type).cloned();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = match sender {
                    Some(sender) => match timeout(deadline, sender.send(&channel, &context)).await {
                        Ok(result) => result,
                        Err(_) => Err(NotificationError::Transport("发送超时".to_string())),
                    },
                    None => Err(NotificationError::UnsupportedChannel(
                        channel.channel_type.to_string(),
                    )),
                };
                log_outcome(&channel, kind, &outcome);
                outcome.is_ok()
            });
        }

        let mut summary = DispatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            summary.attempted += 1;
            match joined {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(event = %kind, "[通知] 渠道发送任务执行异常: {}", e);
                }
            }
        }

        debug!(
            event = %kind,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "通知分发完成"
        );
        summary
    }
}

fn log_outcome(
    channel: &NotificationChannel,
    kind: EventKind,
    outcome: &std::result::Result<(), NotificationError>,
) {
    let name = channel.display_name();
    match outcome {
        Ok(()) => info!(
            channel = %name,
            channel_type = %channel.channel_type,
            event = %kind,
            "[通知] 渠道 {} ({}) 发送成功",
            name,
            channel.channel_type
        ),
        Err(NotificationError::MissingWebhookUrl) => warn!(
            channel = %name,
            channel_type = %channel.channel_type,
            event = %kind,
            "[通知] 渠道 {} ({}) 未配置 Webhook 地址，跳过",
            name,
            channel.channel_type
        ),
        Err(e) => warn!(
            channel = %name,
            channel_type = %channel.channel_type,
            event = %kind,
            "[通知] 渠道 {} ({}) 发送失败: {}",
            name,
            channel.channel_type,
            e
        ),
    }
}
