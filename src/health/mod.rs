//! 健康检测模块
//!
//! 提供HTTP探测、站点状态机、告警抑制和检测周期调度功能

pub mod checker;
pub mod result;
pub mod scheduler;
pub mod suppressor;
pub mod tracker;

// 重新导出主要类型
pub use checker::{HealthChecker, HttpHealthChecker, ProbeSettings};
pub use result::{CheckResult, CheckStatus, HealthCheckLogEntry, SiteStatus};
pub use scheduler::{CheckCycle, CycleReport, SiteCheckOutcome};
pub use suppressor::AlertSuppressor;
pub use tracker::{SiteState, SiteStatusView, StatusTracker};
