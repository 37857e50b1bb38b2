//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader, WebConfig};
use crate::core::MonitorRunner;
use crate::error::{ProbeError, Result};
use crate::health::{
    CheckCycle, HealthChecker, HttpHealthChecker, SiteCheckOutcome, SiteStatus, StatusTracker,
};
use crate::notification::{
    AlertEvent, DetailItem, EventKind, NotificationContext, NotificationDispatcher,
};
use crate::storage::MemoryLogStore;
use crate::web::WebServer;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::OptionFuture;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// `init` 命令写入的示例配置
pub const SAMPLE_CONFIG: &str = include_str!("../../demos/config.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置文件
async fn load_config(path: &Path) -> Result<Config> {
    TomlConfigLoader::new(true).load_from_file(path).await
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    ///
    /// # 返回
    /// * `Result<()>` - 文件已存在且未指定 `--force` 时不写入
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(config_path, SAMPLE_CONFIG).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加监控站点和通知渠道");
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());
            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());
        let config = load_config(config_path).await?;

        if verbose {
            let m = &config.monitoring;
            println!("配置验证通过！");
            println!("告警参数:");
            println!("  检测间隔: {}秒", m.monitor_interval_seconds);
            println!("  请求超时: {}秒", m.request_timeout_seconds);
            println!("  慢响应阈值: {}秒", m.slow_response_threshold_seconds);
            println!(
                "  宕机判定: 连续{}次，或最近{}次中{}次",
                m.down_consecutive_threshold, m.down_window_size, m.down_window_threshold
            );
            println!(
                "  慢响应判定: 连续{}次，或最近{}次中{}次",
                m.slow_consecutive_threshold, m.slow_window_size, m.slow_window_threshold
            );
            println!("  告警抑制: {}秒", m.alert_suppression_seconds);
            println!("  数据保留: {}天", m.data_retention_days);

            println!("站点配置:");
            for (i, site) in config.sites.iter().enumerate() {
                println!(
                    "  {}. {} ({}) {}",
                    i + 1,
                    site.name,
                    site.url,
                    if site.active { "启用" } else { "停用" }
                );
            }

            println!("通知渠道:");
            for channel in &config.channels {
                let events: Vec<&str> = EventKind::ALL
                    .iter()
                    .filter(|kind| channel.should_notify(**kind))
                    .map(|kind| kind.as_str())
                    .collect();
                println!(
                    "  - {} [{}] {} 事件: {}",
                    channel.display_name(),
                    channel.channel_type,
                    if channel.enabled { "启用" } else { "停用" },
                    events.join(", ")
                );
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!(
                "✓ 找到 {} 个站点（{} 个启用），{} 个通知渠道",
                config.sites.len(),
                config.active_sites().len(),
                config.channels.len()
            );
        }

        Ok(())
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { site, format } = &args.command {
            let config = load_config(&args.get_config_path()).await?;
            let outcomes = self.perform_health_check(&config, site.as_deref()).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcomes)?),
                OutputFormat::Text => print_text_results(&outcomes),
            }
        }
        Ok(())
    }
}

impl CheckCommand {
    /// 对启用的站点执行一次检测周期，不发送通知
    ///
    /// # 参数
    /// * `config` - 配置
    /// * `site_name` - 只检测指定站点
    pub async fn perform_health_check(
        &self,
        config: &Config,
        site_name: Option<&str>,
    ) -> Result<Vec<SiteCheckOutcome>> {
        let sites: Vec<_> = config
            .active_sites()
            .into_iter()
            .filter(|s| site_name.map_or(true, |name| s.name == name))
            .collect();

        if sites.is_empty() {
            match site_name {
                Some(name) => eprintln!("未找到名为 '{name}' 的启用站点"),
                None => eprintln!("未找到任何启用的站点"),
            }
            return Ok(Vec::new());
        }

        let checker: Arc<dyn HealthChecker> = Arc::new(HttpHealthChecker::new()?);
        let cycle = CheckCycle::new(
            checker,
            Arc::new(StatusTracker::new()),
            Arc::new(MemoryLogStore::new()),
            None,
        );
        let report = cycle
            .run_check_cycle(&config.monitoring, &sites, &config.channels)
            .await;
        Ok(report.outcomes)
    }
}

/// 打印文本格式结果
fn print_text_results(outcomes: &[SiteCheckOutcome]) {
    for outcome in outcomes {
        let result = &outcome.result;
        let icon = if result.is_success() { "✓" } else { "✗" };
        let response_time = result
            .rounded_response_time()
            .map(|t| format!("{t:.3}s"))
            .unwrap_or_else(|| "N/A".to_string());
        let code = result
            .http_status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{} {} ({}) - {} - {} - HTTP {}",
            icon, outcome.site_name, outcome.url, result.status, response_time, code
        );
        if let Some(error) = &result.error_detail {
            println!("  错误: {error}");
        }
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start { interval } = &args.command {
            let config_path = args.get_config_path();
            if !config_path.exists() {
                return Err(anyhow::anyhow!(
                    "配置文件不存在: {}\n提示：请运行 'site-vitals init' 创建默认配置文件",
                    config_path.display()
                )
                .into());
            }
            let config = load_config(&config_path).await?;
            info!(
                "配置加载完成，站点数量: {}，通知渠道: {}",
                config.sites.len(),
                config.channels.len()
            );

            let web_config = config.web.clone().filter(|w| w.enabled);
            let mut runner = MonitorRunner::build(config, Some(config_path), *interval).await?;
            runner.warm_start().await;
            if let Err(e) = runner.watch_config() {
                warn!("配置文件监控启动失败，热重载不可用: {:#}", e);
            }

            let (shutdown_tx, _) = broadcast::channel(4);
            let web_task: OptionFuture<_> = web_config
                .map(|web: WebConfig| {
                    let server = WebServer::new(web, runner.tracker(), runner.store());
                    tokio::spawn(server.run(shutdown_tx.subscribe()))
                })
                .into();

            let signal_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("收到中断信号，正在停止服务...");
                        let _ = signal_tx.send(());
                    }
                    Err(err) => error!("监听中断信号失败: {}", err),
                }
            });

            runner.run(shutdown_tx.subscribe()).await?;
            let _ = shutdown_tx.send(());

            match web_task.await {
                Some(Ok(Err(e))) => error!("Web服务器异常退出: {:#}", e),
                Some(Err(e)) => error!("Web服务器任务异常: {}", e),
                _ => {}
            }
            info!("监控服务已停止");
        }
        Ok(())
    }
}

/// 测试通知命令
pub struct TestNotificationCommand;

#[async_trait]
impl Command for TestNotificationCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::TestNotification { channel, event } = &args.command {
            let config = load_config(&args.get_config_path()).await?;
            self.send_test_notification(&config, channel.as_deref(), *event)
                .await?;
        }
        Ok(())
    }
}

impl TestNotificationCommand {
    /// 向匹配的渠道发送示例事件
    ///
    /// # 返回
    /// * `Result<usize>` - 发送成功的渠道数
    pub async fn send_test_notification(
        &self,
        config: &Config,
        channel_name: Option<&str>,
        kind: EventKind,
    ) -> Result<usize> {
        let channels: Vec<_> = config
            .channels
            .iter()
            .filter(|c| channel_name.map_or(true, |name| c.name == name))
            .cloned()
            .collect();
        if channels.is_empty() {
            println!("❌ 没有匹配的通知渠道");
            return Ok(0);
        }

        let dispatcher = NotificationDispatcher::new(&config.notification)?;
        let context = sample_context(kind);

        println!("📤 发送测试通知（{}）到 {} 个渠道...", kind.title(), channels.len());
        let summary = dispatcher.dispatch(kind, &context, &channels).await;
        println!(
            "发送完成：尝试 {}，成功 {}，失败 {}",
            summary.attempted, summary.succeeded, summary.failed
        );
        if summary.attempted < channels.len() {
            println!("部分渠道已停用或未订阅该事件，已跳过");
        }
        Ok(summary.succeeded)
    }
}

/// 构造示例事件的通知上下文
pub fn sample_context(kind: EventKind) -> NotificationContext {
    let now = Utc::now();
    if kind == EventKind::Management {
        return NotificationContext::management(
            "通知测试",
            Some(crate::APP_NAME.to_string()),
            vec![DetailItem::new("说明", "这是一条测试通知，用于验证渠道配置")],
            now,
        );
    }

    let (previous_status, http_status_code, error_detail, details) = match kind {
        EventKind::Down => (
            SiteStatus::Up,
            None,
            Some(ProbeError::Timeout),
            vec![
                DetailItem::new("连续失败次数", 3),
                DetailItem::new("最近5次失败次数", "3/5"),
            ],
        ),
        EventKind::Recovered => (
            SiteStatus::Down,
            Some(200),
            None,
            vec![DetailItem::new("故障持续时间", "0天0小时5分钟0秒")],
        ),
        EventKind::Slow => (
            SiteStatus::Up,
            Some(200),
            None,
            vec![
                DetailItem::new("响应时间", "4.2秒"),
                DetailItem::new("连续慢响应次数", 3),
            ],
        ),
        _ => (
            SiteStatus::Slow,
            Some(200),
            None,
            vec![DetailItem::new("慢响应持续时间", "0天0小时3分钟0秒")],
        ),
    };

    NotificationContext::from_alert(&AlertEvent {
        kind,
        site_name: "示例站点".to_string(),
        site_url: "https://example.com".to_string(),
        previous_status,
        occurred_at: now,
        http_status_code,
        error_detail,
        details,
    })
}
