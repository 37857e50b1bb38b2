//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::notification::EventKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Site Vitals - 网站健康监控与告警工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "site-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SITE_VITALS_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，不指定时使用配置文件中的设置
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "SITE_VITALS_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动监控服务
    Start {
        /// 检测间隔（秒），覆盖配置文件
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "检测间隔（秒）",
            env = "SITE_VITALS_INTERVAL"
        )]
        interval: Option<u64>,
    },

    /// 执行一次检测，不发送通知
    Check {
        /// 站点名称（可选，不指定则检测所有启用的站点）
        #[arg(value_name = "SITE", help = "站点名称")]
        site: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 发送测试通知
    TestNotification {
        /// 只发送到指定名称的渠道
        #[arg(long, value_name = "NAME", help = "渠道名称")]
        channel: Option<String>,

        /// 事件类型：down, recovered, slow, slow_recovered, management
        #[arg(short, long, default_value = "down", help = "事件类型")]
        event: EventKind,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "config.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::loader::get_default_config_path)
    }
}
