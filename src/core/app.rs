//! 应用程序核心逻辑
//!
//! 包含主函数、命令执行和应用程序生命周期管理

use crate::cli::args::{Args, Commands};
use crate::cli::commands::{
    CheckCommand, Command, InitCommand, StartCommand, TestNotificationCommand, ValidateCommand,
    VersionCommand,
};
use crate::config::{ConfigLoader, GlobalConfig, TomlConfigLoader};
use crate::logging::{LogConfig, LoggingSystem};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

/// 应用程序主函数
pub async fn main() -> Result<()> {
    let args = Args::parse();

    // 配置文件可读时使用其中的日志设置
    let global = match &args.command {
        Commands::Init { .. } | Commands::Version { .. } => GlobalConfig::default(),
        _ => TomlConfigLoader::new(true)
            .load_from_file(args.get_config_path())
            .await
            .map(|config| config.global)
            .unwrap_or_default(),
    };
    let log_config = LogConfig::from_global(&global, args.log_level.map(Into::into));
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Site Vitals v{} 启动", crate::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
pub async fn execute_command(args: &Args) -> Result<()> {
    let command: &dyn Command = match &args.command {
        Commands::Start { .. } => &StartCommand,
        Commands::Check { .. } => &CheckCommand,
        Commands::Validate { .. } => &ValidateCommand,
        Commands::TestNotification { .. } => &TestNotificationCommand,
        Commands::Init { .. } => &InitCommand,
        Commands::Version { .. } => &VersionCommand,
    };
    command.execute(args).await.map_err(anyhow::Error::from)
}
