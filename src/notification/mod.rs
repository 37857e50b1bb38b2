//! 通知模块
//!
//! 提供告警事件模型、消息渲染、各渠道发送器和并发分发功能

pub mod channel;
pub mod dispatcher;
pub mod event;
pub mod template;

// 重新导出主要类型
pub use channel::{ChannelSender, CustomWebhookSender, DingTalkSender, FeishuSender, WeComSender};
pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use event::{AlertEvent, DetailItem, EventKind, NotificationContext};
pub use template::{TemplateRenderer, DEFAULT_CUSTOM_TEMPLATE};
