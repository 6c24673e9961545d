//! HTTP 入口
//!
//! `GET /stream-logs?url=<页面地址>` 以 `text/event-stream` 返回提取进度。

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::browser::ChromiumConnector;
use crate::config::Config;
use crate::infrastructure::BrowserConnector;
use crate::orchestrator::stream_adapter::start_extraction;
use crate::workflow::ExtractionFlow;

/// 停机时等待在跑提取收尾的上限
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    url: Option<String>,
}

/// 路由共享状态
pub struct AppState<C: BrowserConnector> {
    flow: Arc<ExtractionFlow<C>>,
}

impl<C: BrowserConnector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            flow: self.flow.clone(),
        }
    }
}

/// 构建路由
pub fn router<C: BrowserConnector>(flow: Arc<ExtractionFlow<C>>) -> Router {
    Router::new()
        .route("/stream-logs", get(stream_logs::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { flow })
}

async fn stream_logs<C: BrowserConnector>(
    State(state): State<AppState<C>>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = start_extraction(state.flow.clone(), query.url)
        .map(|event| Ok(Event::default().data(event.payload())));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// 监听配置里的地址，直到收到 Ctrl-C
pub async fn serve(config: Config) -> Result<()> {
    let bind_addr = config.bind_addr.clone();
    let flow = Arc::new(ExtractionFlow::new(
        ChromiumConnector::new(),
        Arc::new(config),
    ));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("无法监听地址: {}", bind_addr))?;
    info!("🎧 服务已启动: http://{}/stream-logs?url=...", bind_addr);

    axum::serve(listener, router(flow.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    // 调用方已断开的提取仍在后台跑，等它们关掉各自的会话
    let in_flight = flow.in_flight();
    if in_flight > 0 {
        info!("⏳ 等待 {} 个进行中的提取收尾...", in_flight);
    }
    if !flow.drain(SHUTDOWN_GRACE).await {
        warn!(
            "{:?} 内仍有 {} 个提取未结束，它们持有的会话可能未关闭",
            SHUTDOWN_GRACE,
            flow.in_flight()
        );
    }

    info!("👋 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
