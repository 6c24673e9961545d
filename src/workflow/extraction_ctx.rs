//! 单次提取的上下文
//!
//! - `ExtractionRequest`：这次要处理哪个页面
//! - `EventSink`：把事件按顺序送给调用方，并负责计时

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::StageEvent;
use crate::workflow::stage::Stage;

/// 提取请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    target_url: String,
}

/// 请求被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRejection {
    /// 没有传 url 或为空
    Missing,
    /// 不是绝对的 http(s) 地址
    NotAbsolute,
}

impl RequestRejection {
    pub fn message(self) -> &'static str {
        match self {
            RequestRejection::Missing => "❌ ERROR: URL parameter is missing.",
            RequestRejection::NotAbsolute => {
                "❌ ERROR: URL parameter is not an absolute http(s) URL."
            }
        }
    }
}

impl ExtractionRequest {
    /// 校验调用方传入的地址
    pub fn parse(raw: Option<&str>) -> Result<Self, RequestRejection> {
        let target_url = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RequestRejection::Missing)?;

        match url::Url::parse(target_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Self {
                target_url: target_url.to_string(),
            }),
            _ => Err(RequestRejection::NotAbsolute),
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }
}

/// 事件出口
///
/// 结束标记发出之后不再接受任何事件；调用方断开后发送静默失败。
pub struct EventSink {
    tx: mpsc::Sender<StageEvent>,
    started: Instant,
    ended: bool,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StageEvent>) -> Self {
        Self {
            tx,
            started: Instant::now(),
            ended: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 调用方是否还在接收
    pub fn is_listening(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub async fn progress(&mut self, message: impl AsRef<str>) {
        let event = StageEvent::progress(self.elapsed(), message);
        self.send(event).await;
    }

    /// 一个阶段失败时的错误事件，包含阶段名和原因
    pub async fn error(&mut self, stage: Stage, error: &ExtractionError) {
        let event = StageEvent::error(
            self.elapsed(),
            format!("❌ ERROR [{}]: {}", stage, error),
        );
        self.send(event).await;
    }

    pub async fn link(&mut self, url: &str) {
        let event = StageEvent::link(self.elapsed(), url);
        self.send(event).await;
    }

    /// 发出结束标记，只生效一次
    pub async fn end(&mut self) {
        if self.ended {
            return;
        }
        let event = StageEvent::end_of_stream(self.elapsed());
        self.send(event).await;
        self.ended = true;
    }

    async fn send(&mut self, event: StageEvent) {
        if self.ended {
            debug!("结束标记之后的事件被丢弃: {:?}", event);
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("调用方已断开，事件未送达");
        }
    }
}
