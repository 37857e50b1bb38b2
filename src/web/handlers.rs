//! Web 路由处理函数

use super::WebAppState;
use crate::health::{SiteStatus, SiteStatusView};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 500;

/// 状态汇总响应
#[derive(Debug, Serialize)]
pub struct ApiStatusResponse {
    pub sites: Vec<SiteStatusView>,
    pub last_updated: String,
    pub total_sites: usize,
    pub up_sites: usize,
    pub slow_sites: usize,
    pub down_sites: usize,
    pub unknown_sites: usize,
}

impl ApiStatusResponse {
    fn from_views(sites: Vec<SiteStatusView>) -> Self {
        let count = |status: SiteStatus| sites.iter().filter(|s| s.status == status).count();
        Self {
            total_sites: sites.len(),
            up_sites: count(SiteStatus::Up),
            slow_sites: count(SiteStatus::Slow),
            down_sites: count(SiteStatus::Down),
            unknown_sites: count(SiteStatus::Unknown),
            last_updated: chrono::Utc::now().to_rfc3339(),
            sites,
        }
    }
}

/// 全部站点状态
pub async fn api_status(State(app_state): State<WebAppState>) -> impl IntoResponse {
    let views = app_state.tracker.current_statuses().await;
    Json(ApiStatusResponse::from_views(views))
}

/// 单个站点状态，站点不存在时返回 404
pub async fn site_status(
    State(app_state): State<WebAppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match app_state.tracker.site_status(&name).await {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("站点不存在: {}", name) })),
        )
            .into_response(),
    }
}

/// 检测历史查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// 单个站点最近的检测日志，按时间倒序
pub async fn site_history(
    State(app_state): State<WebAppState>,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if app_state.tracker.site_status(&name).await.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("站点不存在: {}", name) })),
        )
            .into_response();
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    match app_state.store.recent(&name, limit).await {
        Ok(entries) => Json(json!({ "site": name, "entries": entries })).into_response(),
        Err(e) => {
            warn!(site = %name, "读取检测历史失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "读取检测历史失败" })),
            )
                .into_response()
        }
    }
}

/// 存活检查
pub async fn healthz(State(app_state): State<WebAppState>) -> impl IntoResponse {
    let uptime = (chrono::Utc::now() - app_state.started_at).num_seconds();
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "uptime_seconds": uptime,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitoredSite, MonitoringConfig};
    use crate::error::ProbeError;
    use crate::health::{CheckResult, HealthCheckLogEntry, StatusTracker};
    use crate::storage::{HealthLogStore, MemoryLogStore};
    use axum::body::to_bytes;
    use axum::response::Response;
    use chrono::Utc;
    use std::sync::Arc;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn app_state() -> WebAppState {
        let tracker = Arc::new(StatusTracker::new());
        let config = MonitoringConfig::default();
        let now = Utc::now();
        tracker
            .process(
                &MonitoredSite::new("Shop", "https://shop.example.com"),
                &CheckResult::success(0.2, 200, 3.0),
                &config,
                now,
            )
            .await;
        tracker
            .process(
                &MonitoredSite::new("Blog", "https://blog.example.com"),
                &CheckResult::down(ProbeError::Timeout, None),
                &config,
                now,
            )
            .await;
        let store = Arc::new(MemoryLogStore::new());
        for offset in 0..3 {
            store
                .append(HealthCheckLogEntry::from_result(
                    "Shop",
                    &CheckResult::success(0.2, 200, 3.0),
                    now - chrono::Duration::seconds(20 * offset),
                ))
                .await
                .unwrap();
        }
        WebAppState::new(tracker, store)
    }

    #[tokio::test]
    async fn test_api_status_totals() {
        let response = api_status(State(app_state().await)).await.into_response();
        assert!(response.status().is_success());

        let body = body_json(response).await;
        assert_eq!(body["total_sites"], 2);
        assert_eq!(body["up_sites"], 1);
        assert_eq!(body["down_sites"], 1);
        assert_eq!(body["sites"][0]["name"], "Blog");
        assert_eq!(body["sites"][0]["status"], "down");
        assert_eq!(body["sites"][0]["consecutive_down"], 1);
    }

    #[tokio::test]
    async fn test_site_status_found_and_missing() {
        let state = app_state().await;

        let response = site_status(State(state.clone()), Path("Shop".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["url"], "https://shop.example.com");
        assert_eq!(body["http_status_code"], 200);

        let response = site_status(State(state), Path("Nope".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_site_history() {
        let state = app_state().await;

        let response = site_history(
            State(state.clone()),
            Path("Shop".to_string()),
            Query(HistoryQuery { limit: Some(2) }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["site"], "Shop");
        assert_eq!(body["entries"].as_array().unwrap().len(), 2);

        // 已知站点但没有日志
        let response = site_history(
            State(state.clone()),
            Path("Blog".to_string()),
            Query(HistoryQuery { limit: None }),
        )
        .await
        .into_response();
        let body = body_json(response).await;
        assert!(body["entries"].as_array().unwrap().is_empty());

        let response = site_history(
            State(state),
            Path("Nope".to_string()),
            Query(HistoryQuery { limit: None }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = healthz(State(app_state().await)).await.into_response();
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], crate::VERSION);
    }
}
