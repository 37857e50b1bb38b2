//! 通知处理基准测试
//!
//! 测试通知上下文构建、模板渲染和消息体生成的性能

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use site_vitals::error::ProbeError;
use site_vitals::health::SiteStatus;
use site_vitals::notification::template::{render_markdown, render_plain_text};
use site_vitals::notification::{
    AlertEvent, DetailItem, EventKind, FeishuSender, NotificationContext, TemplateRenderer,
    DEFAULT_CUSTOM_TEMPLATE,
};
use std::hint::black_box;

fn down_event() -> AlertEvent {
    AlertEvent {
        kind: EventKind::Down,
        site_name: "production-api".to_string(),
        site_url: "https://api.example.com/health".to_string(),
        previous_status: SiteStatus::Up,
        occurred_at: Utc::now(),
        http_status_code: Some(503),
        error_detail: Some(ProbeError::HttpError(503)),
        details: vec![
            DetailItem::new("连续失败次数", 3),
            DetailItem::new("最近5次失败次数", "3/5"),
        ],
    }
}

fn notification_benchmark(c: &mut Criterion) {
    let event = down_event();

    c.bench_function("context_from_alert", |b| {
        b.iter(|| black_box(NotificationContext::from_alert(&event)));
    });

    let context = NotificationContext::from_alert(&event);
    let renderer = TemplateRenderer::new();

    c.bench_function("custom_template_rendering", |b| {
        b.iter(|| black_box(renderer.render(DEFAULT_CUSTOM_TEMPLATE, &context).unwrap()));
    });

    c.bench_function("markdown_rendering", |b| {
        b.iter(|| black_box(render_markdown(&context)));
    });

    c.bench_function("feishu_signed_body", |b| {
        b.iter(|| {
            let text = render_plain_text(&context);
            let body =
                FeishuSender::build_body(&context, Some("SEC000test"), 1_700_000_000).unwrap();
            black_box((text, body))
        });
    });
}

criterion_group!(benches, notification_benchmark);
criterion_main!(benches);
