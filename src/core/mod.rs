//! 核心模块
//!
//! 包含命令分发和监控运行器

pub mod app;
pub mod runner;

// 重新导出主要类型
pub use app::{execute_command, main};
pub use runner::MonitorRunner;
