//! 事件流适配器 - 编排层
//!
//! ## 职责
//!
//! 1. **参数校验**：没有 url 时直接给出"错误 + 结束标记"两条事件，不启动流程
//! 2. **按需产出**：每个请求起一个后台任务跑流程，事件经有界通道逐条交给调用方
//! 3. **断开安全**：调用方断开后任务继续跑到清理阶段，会话照常关闭
//! 4. **可等待**：后台任务登记在流程的任务表里，停机时由 `serve` 等它们收尾

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::infrastructure::BrowserConnector;
use crate::models::StageEvent;
use crate::utils::logging::log_run_summary;
use crate::workflow::{EventSink, ExtractionFlow, ExtractionRequest};

/// 为一个目标地址启动提取，返回按产出顺序排列的事件流
pub fn start_extraction<C: BrowserConnector>(
    flow: Arc<ExtractionFlow<C>>,
    target_url: Option<String>,
) -> BoxStream<'static, StageEvent> {
    let request = match ExtractionRequest::parse(target_url.as_deref()) {
        Ok(request) => request,
        Err(rejection) => {
            warn!("拒绝提取请求 ({:?}): {:?}", rejection, target_url);
            return stream::iter([
                StageEvent::error(Duration::ZERO, rejection.message()),
                StageEvent::end_of_stream(Duration::ZERO),
            ])
            .boxed();
        }
    };

    info!("开始提取: {}", request.target_url());
    let (tx, rx) = mpsc::channel(flow.config().event_buffer.max(1));

    let workers = flow.workers().clone();
    workers.spawn(async move {
        let mut sink = EventSink::new(tx);
        let outcome = flow.run(&request, &mut sink).await;
        log_run_summary(request.target_url(), &outcome);
    });

    ReceiverStream::new(rx).boxed()
}
