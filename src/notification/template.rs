//! 消息模板模块
//!
//! 固定格式渠道使用内置的 markdown / 纯文本渲染，
//! 自定义 Webhook 使用 Handlebars 模板，以通知上下文作为数据。

use crate::error::NotificationError;
use crate::notification::event::NotificationContext;
use handlebars::{handlebars_helper, Handlebars};

/// 自定义 Webhook 的默认模板
pub const DEFAULT_CUSTOM_TEMPLATE: &str = r#"{
  "event": {{json event}},
  "title": {{json event_title}},
  "site": {
    "name": {{json site_name}},
    "url": {{json site_url}}
  },
  "status": {
    "key": {{json status_key}},
    "label": {{json status_label}},
    "previous": {{json previous_status}}
  },
  "severity": {{json severity}},
  "operator": {{json operator}},
  "timestamp": {{json timestamp}},
  "http_code": {{json http_code}},
  "error_detail": {{json error_detail}},
  "extra": {{json details}}
}"#;

handlebars_helper!(json: |value: Json| serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()));

/// Handlebars 模板渲染器
///
/// 输出不做 HTML 转义，JSON 值通过 `{{json field}}` 输出。
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("json", Box::new(json));
        Self { registry }
    }

    /// 渲染模板
    ///
    /// # 参数
    /// * `template` - 模板内容
    /// * `context` - 通知上下文
    ///
    /// # 返回
    /// * `Result<String, NotificationError>` - 渲染结果
    pub fn render(
        &self,
        template: &str,
        context: &NotificationContext,
    ) -> Result<String, NotificationError> {
        if template.trim().is_empty() {
            return Err(NotificationError::TemplateRender("模板内容为空".to_string()));
        }
        self.registry
            .render_template(template, context)
            .map_err(|e| NotificationError::TemplateRender(e.to_string()))
    }

    /// 验证模板语法
    pub fn validate(template: &str) -> Result<(), NotificationError> {
        handlebars::Template::compile(template)
            .map(|_| ())
            .map_err(|e| NotificationError::TemplateRender(e.to_string()))
    }
}

/// 错误详情行中的原因文本，HTTP 4xx/5xx 时直接显示状态码
fn error_reason(context: &NotificationContext) -> Option<String> {
    let http_error = context.http_code.filter(|code| *code >= 400);
    match (&context.error_detail, http_error) {
        (Some(_), Some(code)) | (None, Some(code)) => Some(format!("HTTP {}", code)),
        (Some(detail), None) => Some(detail.replace(['"', '\''], "`")),
        (None, None) => None,
    }
}

/// 企业微信、钉钉使用的 markdown 消息
pub fn render_markdown(context: &NotificationContext) -> String {
    if context.is_site_event() {
        render_site_markdown(context)
    } else {
        render_management_markdown(context)
    }
}

fn render_site_markdown(context: &NotificationContext) -> String {
    let mut lines = vec![
        format!("## {}", context.event_title),
        format!(
            "> **网站名称**: {}",
            context.site_name.as_deref().unwrap_or("未知")
        ),
        format!(
            "> **监控地址**: {}",
            context.site_url.as_deref().unwrap_or("未知")
        ),
        format!(
            "> **当前状态**: <font color=\"{}\">{}</font>",
            context.status_color.as_deref().unwrap_or("comment"),
            context.status_label.as_deref().unwrap_or("-")
        ),
        format!(
            "> **上次状态**: {}",
            context.previous_status.as_deref().unwrap_or("未知")
        ),
    ];
    for item in context.visible_details() {
        lines.push(format!("> **{}**: {}", item.label, item.display_value()));
    }
    if let Some(reason) = error_reason(context) {
        lines.push(format!("> **错误详情**: `{}`", reason));
    }
    lines.join("\n")
}

fn render_management_markdown(context: &NotificationContext) -> String {
    let mut lines = vec![
        "## 配置变更通知".to_string(),
        format!("> **事件**: {}", context.event_title),
        format!("> **发生时间**: {}", context.timestamp),
    ];
    if let Some(operator) = context.operator.as_deref().filter(|o| !o.is_empty()) {
        lines.push(format!("> **操作人**: {}", operator));
    }
    for item in context.visible_details() {
        lines.push(format!("> **{}**: {}", item.label, item.display_value()));
    }
    lines.join("\n")
}

/// 飞书使用的纯文本消息
pub fn render_plain_text(context: &NotificationContext) -> String {
    let mut lines = vec![context.event_title.clone()];
    if context.is_site_event() {
        lines.push(format!(
            "网站名称: {}",
            context.site_name.as_deref().unwrap_or("未知")
        ));
        lines.push(format!(
            "监控地址: {}",
            context.site_url.as_deref().unwrap_or("未知")
        ));
        lines.push(format!(
            "当前状态: {}",
            context.status_label.as_deref().unwrap_or("-")
        ));
        lines.push(format!(
            "上次状态: {}",
            context.previous_status.as_deref().unwrap_or("-")
        ));
    }
    if !context.timestamp.is_empty() {
        lines.push(format!("发生时间: {}", context.timestamp));
    }
    if let Some(operator) = context.operator.as_deref().filter(|o| !o.is_empty()) {
        lines.push(format!("操作人: {}", operator));
    }
    for item in context.visible_details() {
        lines.push(format!("{}: {}", item.label, item.display_value()));
    }
    if let Some(detail) = &context.error_detail {
        lines.push(format!("错误详情: {}", detail));
    } else if let Some(code) = context.http_code.filter(|code| *code >= 400) {
        lines.push(format!("HTTP 状态码: {}", code));
    }

    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
