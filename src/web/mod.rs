//! 状态查询 Web 接口
//!
//! 只读地暴露站点当前状态，读取与状态机更新在同一把锁下进行

pub mod handlers;

use crate::config::WebConfig;
use crate::health::StatusTracker;
use crate::storage::HealthLogStore;
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Web 应用共享状态
#[derive(Clone)]
pub struct WebAppState {
    /// 站点状态
    pub tracker: Arc<StatusTracker>,
    /// 检测日志
    pub store: Arc<dyn HealthLogStore>,
    /// 启动时间
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl WebAppState {
    pub fn new(tracker: Arc<StatusTracker>, store: Arc<dyn HealthLogStore>) -> Self {
        Self {
            tracker,
            store,
            started_at: chrono::Utc::now(),
        }
    }
}

/// 构建路由
pub fn create_router(state: WebAppState) -> Router {
    Router::new()
        .route("/api/status", get(handlers::api_status))
        .route("/api/status/{name}", get(handlers::site_status))
        .route("/api/status/{name}/history", get(handlers::site_history))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 状态接口服务器
pub struct WebServer {
    config: WebConfig,
    state: WebAppState,
}

impl WebServer {
    pub fn new(
        config: WebConfig,
        tracker: Arc<StatusTracker>,
        store: Arc<dyn HealthLogStore>,
    ) -> Self {
        Self {
            config,
            state: WebAppState::new(tracker, store),
        }
    }

    /// 启动服务器，收到关闭信号后优雅退出
    ///
    /// # 参数
    /// * `shutdown_rx` - 关闭信号接收器
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| anyhow::anyhow!(e))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("绑定Web服务地址失败: {}", addr))?;

        info!("Web服务器已启动: http://{}", addr);
        info!("状态接口: http://{}/api/status", addr);

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("接收到关闭信号，正在关闭Web服务器...");
            })
            .await
            .context("Web服务器运行失败")?;

        info!("Web服务器已关闭");
        Ok(())
    }
}
