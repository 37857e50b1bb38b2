//! 通知渠道发送器
//!
//! 每种渠道类型对应一个发送策略，负责组装消息体、发送请求并按渠道规则判断是否成功：
//! - 企业微信 / 钉钉：HTTP 200 且 `errcode == 0`
//! - 飞书：HTTP 200 且 `code == 0`
//! - 自定义 Webhook：任意 2xx

use crate::config::{ChannelType, NotificationChannel};
use crate::error::NotificationError;
use crate::notification::event::NotificationContext;
use crate::notification::template::{render_markdown, render_plain_text, TemplateRenderer};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// 失败时记录的响应体最大长度
const MAX_RESPONSE_PREVIEW: usize = 200;

/// 渠道发送器trait
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// 发送一条通知
    ///
    /// # 参数
    /// * `channel` - 渠道配置
    /// * `context` - 通知上下文
    ///
    /// # 返回
    /// * `Result<(), NotificationError>` - 发送结果
    async fn send(
        &self,
        channel: &NotificationChannel,
        context: &NotificationContext,
    ) -> Result<(), NotificationError>;
}

/// 合并自定义请求头，未显式设置 Content-Type 时补充默认值
pub fn prepare_headers(
    custom: &HashMap<String, String>,
    default_content_type: &str,
) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = custom
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
        headers.insert("Content-Type".to_string(), default_content_type.to_string());
    }
    headers
}

fn webhook_url(channel: &NotificationChannel) -> Result<&str, NotificationError> {
    channel
        .webhook_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or(NotificationError::MissingWebhookUrl)
}

fn with_headers(mut request: RequestBuilder, channel: &NotificationChannel) -> RequestBuilder {
    for (key, value) in prepare_headers(&channel.headers, "application/json") {
        request = request.header(key, value);
    }
    request
}

fn preview(body: &str) -> String {
    body.chars().take(MAX_RESPONSE_PREVIEW).collect()
}

/// 读取响应体，读取失败时记录原因并返回空串
async fn read_body(response: reqwest::Response, channel: &NotificationChannel) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(e) => {
            debug!("渠道 {} 响应体读取失败: {}", channel.display_name(), e);
            String::new()
        }
    }
}

/// 发送 JSON 消息体并按 `code_field == 0` 判断结果
async fn post_with_code_check(
    client: &Client,
    url: &str,
    channel: &NotificationChannel,
    body: &Value,
    code_field: &str,
) -> Result<(), NotificationError> {
    let payload = serde_json::to_vec(body)?;
    let response = with_headers(client.post(url), channel)
        .body(payload)
        .send()
        .await?;

    let status = response.status();
    let text = read_body(response, channel).await;
    debug!("渠道 {} 响应: {} {}", channel.display_name(), status, preview(&text));

    let accepted = status == StatusCode::OK
        && serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get(code_field).and_then(Value::as_i64))
            == Some(0);

    if accepted {
        Ok(())
    } else {
        Err(NotificationError::UnexpectedResponse {
            status: status.as_u16(),
            body: preview(&text),
        })
    }
}

/// 计算 HMAC-SHA256 并做 base64 编码
fn hmac_base64(key: &[u8], message: &[u8]) -> Result<String, NotificationError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| NotificationError::Transport(format!("签名密钥无效: {}", e)))?;
    mac.update(message);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// 钉钉加签：以密钥对 “毫秒时间戳\n密钥” 做 HMAC-SHA256
pub fn dingtalk_sign(secret: &str, timestamp_millis: i64) -> Result<String, NotificationError> {
    let string_to_sign = format!("{}\n{}", timestamp_millis, secret);
    hmac_base64(secret.as_bytes(), string_to_sign.as_bytes())
}

/// 钉钉加签后的请求地址
pub fn dingtalk_signed_url(
    webhook_url: &str,
    secret: &str,
    timestamp_millis: i64,
) -> Result<String, NotificationError> {
    let sign = dingtalk_sign(secret, timestamp_millis)?;
    let mut url = Url::parse(webhook_url)
        .map_err(|e| NotificationError::Transport(format!("Webhook地址无效: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("timestamp", &timestamp_millis.to_string())
        .append_pair("sign", &sign);
    Ok(url.to_string())
}

/// 飞书加签：以 “秒级时间戳\n密钥” 为密钥对空消息做 HMAC-SHA256
pub fn feishu_sign(secret: &str, timestamp_secs: i64) -> Result<String, NotificationError> {
    let key = format!("{}\n{}", timestamp_secs, secret);
    hmac_base64(key.as_bytes(), b"")
}

fn configured_secret(channel: &NotificationChannel) -> Option<&str> {
    channel.secret.as_deref().filter(|s| !s.trim().is_empty())
}

/// 企业微信群机器人
pub struct WeComSender {
    client: Client,
}

impl WeComSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn build_body(context: &NotificationContext) -> Value {
        json!({
            "msgtype": "markdown",
            "markdown": { "content": render_markdown(context) }
        })
    }
}

#[async_trait]
impl ChannelSender for WeComSender {
    async fn send(
        &self,
        channel: &NotificationChannel,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        let url = webhook_url(channel)?;
        let body = Self::build_body(context);
        post_with_code_check(&self.client, url, channel, &body, "errcode").await
    }
}

/// 钉钉群机器人
pub struct DingTalkSender {
    client: Client,
}

impl DingTalkSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn build_body(context: &NotificationContext) -> Value {
        json!({
            "msgtype": "markdown",
            "markdown": {
                "title": context.event_title,
                "text": render_markdown(context)
            }
        })
    }
}

#[async_trait]
impl ChannelSender for DingTalkSender {
    async fn send(
        &self,
        channel: &NotificationChannel,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        let url = webhook_url(channel)?;
        let url = match configured_secret(channel) {
            Some(secret) => {
                dingtalk_signed_url(url, secret, chrono::Utc::now().timestamp_millis())?
            }
            None => url.to_string(),
        };
        let body = Self::build_body(context);
        post_with_code_check(&self.client, &url, channel, &body, "errcode").await
    }
}

/// 飞书群机器人
pub struct FeishuSender {
    client: Client,
}

impl FeishuSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 构建飞书消息体，配置了密钥时附带签名
    pub fn build_body(
        context: &NotificationContext,
        secret: Option<&str>,
        timestamp_secs: i64,
    ) -> Result<Value, NotificationError> {
        let mut body = json!({
            "msg_type": "text",
            "content": { "text": render_plain_text(context) }
        });
        if let Some(secret) = secret {
            body["timestamp"] = Value::String(timestamp_secs.to_string());
            body["sign"] = Value::String(feishu_sign(secret, timestamp_secs)?);
        }
        Ok(body)
    }
}

#[async_trait]
impl ChannelSender for FeishuSender {
    async fn send(
        &self,
        channel: &NotificationChannel,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        let url = webhook_url(channel)?;
        let body = Self::build_body(
            context,
            configured_secret(channel),
            chrono::Utc::now().timestamp(),
        )?;
        post_with_code_check(&self.client, url, channel, &body, "code").await
    }
}

/// 自定义 Webhook，按渠道模板渲染请求体
pub struct CustomWebhookSender {
    client: Client,
    renderer: Arc<TemplateRenderer>,
}

impl CustomWebhookSender {
    pub fn new(client: Client, renderer: Arc<TemplateRenderer>) -> Self {
        Self { client, renderer }
    }
}

#[async_trait]
impl ChannelSender for CustomWebhookSender {
    async fn send(
        &self,
        channel: &NotificationChannel,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        let url = webhook_url(channel)?;
        let template = channel.template.as_deref().unwrap_or_default();
        let rendered = self.renderer.render(template, context)?;

        let response = with_headers(self.client.post(url), channel)
            .body(rendered.into_bytes())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = read_body(response, channel).await;
            Err(NotificationError::UnexpectedResponse {
                status: status.as_u16(),
                body: preview(&text),
            })
        }
    }
}

/// 按渠道类型建立发送器查找表
pub fn default_senders(client: Client) -> HashMap<ChannelType, Arc<dyn ChannelSender>> {
    let renderer = Arc::new(TemplateRenderer::new());
    let mut senders: HashMap<ChannelType, Arc<dyn ChannelSender>> = HashMap::new();
    senders.insert(ChannelType::WeCom, Arc::new(WeComSender::new(client.clone())));
    senders.insert(
        ChannelType::DingTalk,
        Arc::new(DingTalkSender::new(client.clone())),
    );
    senders.insert(ChannelType::Feishu, Arc::new(FeishuSender::new(client.clone())));
    senders.insert(
        ChannelType::CustomWebhook,
        Arc::new(CustomWebhookSender::new(client, renderer)),
    );
    senders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventInterests;
    use crate::notification::event::DetailItem;
    use chrono::Utc;
    use mockito::Matcher;

    fn channel(channel_type: ChannelType, url: String) -> NotificationChannel {
        NotificationChannel {
            id: 1,
            name: "ops".to_string(),
            channel_type,
            enabled: true,
            webhook_url: Some(url),
            events: EventInterests::default(),
            headers: HashMap::new(),
            template: None,
            secret: None,
        }
    }

    fn context() -> NotificationContext {
        NotificationContext::management(
            "新增监控站点",
            None,
            vec![DetailItem::new("站点", "Shop")],
            Utc::now(),
        )
    }

    #[test]
    fn test_prepare_headers() {
        let headers = prepare_headers(&HashMap::new(), "application/json");
        assert_eq!(headers.get("Content-Type").unwrap(), "application/json");

        let mut custom = HashMap::new();
        custom.insert("content-type".to_string(), "text/plain".to_string());
        custom.insert("X-Token".to_string(), "abc".to_string());
        let headers = prepare_headers(&custom, "application/json");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        assert!(!headers.contains_key("Content-Type"));
    }

    #[test]
    fn test_dingtalk_signature() {
        let sign = dingtalk_sign("SEC000test", 1_700_000_000_000).unwrap();
        assert_eq!(sign, "1hLl2KkRX3rps9FaitIUwaac+CtAFEaP345jvdrTL7c=");

        let url = dingtalk_signed_url(
            "https://oapi.example.com/robot/send?access_token=t",
            "SEC000test",
            1_700_000_000_000,
        )
        .unwrap();
        assert_eq!(
            url,
            "https://oapi.example.com/robot/send?access_token=t&timestamp=1700000000000&sign=1hLl2KkRX3rps9FaitIUwaac%2BCtAFEaP345jvdrTL7c%3D"
        );
    }

    #[test]
    fn test_feishu_signature() {
        let sign = feishu_sign("SEC000test", 1_700_000_000).unwrap();
        assert_eq!(sign, "VJoDIs2fdNFeN6NS/KG4L8NIxm+bN/FYQRhY2lP3Mf8=");

        let body = FeishuSender::build_body(&context(), Some("SEC000test"), 1_700_000_000).unwrap();
        assert_eq!(body["timestamp"], "1700000000");
        assert_eq!(body["sign"], sign);
        assert_eq!(body["msg_type"], "text");
    }

    #[tokio::test]
    async fn test_wecom_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/wecom")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({"msgtype": "markdown"})))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .create_async()
            .await;

        let sender = WeComSender::new(Client::new());
        let result = sender
            .send(
                &channel(ChannelType::WeCom, format!("{}/wecom", server.url())),
                &context(),
            )
            .await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wecom_rejects_nonzero_errcode() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/wecom")
            .with_status(200)
            .with_body(r#"{"errcode":93000,"errmsg":"invalid webhook url"}"#)
            .create_async()
            .await;

        let sender = WeComSender::new(Client::new());
        let result = sender
            .send(
                &channel(ChannelType::WeCom, format!("{}/wecom", server.url())),
                &context(),
            )
            .await;

        match result {
            Err(NotificationError::UnexpectedResponse { status, body }) => {
                assert_eq!(status, 200);
                assert!(body.contains("93000"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dingtalk_signed_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/robot")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("access_token".into(), "t".into()),
                Matcher::Regex("timestamp=\\d+".into()),
                Matcher::Regex("sign=".into()),
            ]))
            .match_body(Matcher::PartialJson(
                json!({"markdown": {"title": "新增监控站点"}}),
            ))
            .with_status(200)
            .with_body(r#"{"errcode":0}"#)
            .create_async()
            .await;

        let mut ding = channel(
            ChannelType::DingTalk,
            format!("{}/robot?access_token=t", server.url()),
        );
        ding.secret = Some("SEC000test".to_string());

        let result = DingTalkSender::new(Client::new()).send(&ding, &context()).await;
        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_feishu_code_check() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/feishu")
            .with_status(200)
            .with_body(r#"{"code":19021,"msg":"sign match fail"}"#)
            .create_async()
            .await;

        let result = FeishuSender::new(Client::new())
            .send(
                &channel(ChannelType::Feishu, format!("{}/feishu", server.url())),
                &context(),
            )
            .await;
        assert!(matches!(
            result,
            Err(NotificationError::UnexpectedResponse { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_webhook_renders_template() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("x-token", "abc")
            .match_header("content-type", "application/json")
            .match_body(r#"{"title":"新增监控站点","operator":"系统"}"#)
            .with_status(204)
            .create_async()
            .await;

        let mut hook = channel(ChannelType::CustomWebhook, format!("{}/hook", server.url()));
        hook.headers.insert("X-Token".to_string(), "abc".to_string());
        hook.template =
            Some(r#"{"title":{{json event_title}},"operator":"{{operator}}"}"#.to_string());

        let sender = CustomWebhookSender::new(Client::new(), Arc::new(TemplateRenderer::new()));
        let result = sender.send(&hook, &context()).await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_custom_webhook_error_keeps_response_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let mut hook = channel(ChannelType::CustomWebhook, format!("{}/hook", server.url()));
        hook.template = Some(r#"{"title":{{json event_title}}}"#.to_string());

        let sender = CustomWebhookSender::new(Client::new(), Arc::new(TemplateRenderer::new()));
        let result = sender.send(&hook, &context()).await;

        mock.assert_async().await;
        match result {
            Err(NotificationError::UnexpectedResponse { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream unavailable");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_custom_webhook_missing_template() {
        let hook = channel(
            ChannelType::CustomWebhook,
            "http://127.0.0.1:9/hook".to_string(),
        );
        let sender = CustomWebhookSender::new(Client::new(), Arc::new(TemplateRenderer::new()));
        let result = sender.send(&hook, &context()).await;
        assert!(matches!(result, Err(NotificationError::TemplateRender(_))));
    }

    #[tokio::test]
    async fn test_missing_webhook_url() {
        let mut wecom = channel(ChannelType::WeCom, String::new());
        wecom.webhook_url = None;
        let result = WeComSender::new(Client::new()).send(&wecom, &context()).await;
        assert!(matches!(result, Err(NotificationError::MissingWebhookUrl)));
    }

    #[test]
    fn test_default_senders_cover_all_types() {
        let senders = default_senders(Client::new());
        for channel_type in [
            ChannelType::WeCom,
            ChannelType::DingTalk,
            ChannelType::Feishu,
            ChannelType::CustomWebhook,
        ] {
            assert!(senders.contains_key(&channel_type));
        }
    }
}
