//! 直链提取流程 - 流程层
//!
//! 核心职责：定义"一次提取"的完整流程
//!
//! 流程顺序：
//! 1. 配置 → 连接 → 导航
//! 2. 找 iframe → 切进 iframe → 找 video
//! 3. 读 src
//! 4. 清理（任何出口都会走到）→ 结束标记
//!
//! 任何阶段失败都只发一条错误事件，然后直接跳到清理，不重试。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{ErrorKind, ExtractionError, ExtractionResult};
use crate::infrastructure::{BrowserConnector, BrowserSession, Locator, SessionGuard};
use crate::workflow::extraction_ctx::{EventSink, ExtractionRequest};
use crate::workflow::stage::Stage;

/// 一次提取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// 找到直链
    LinkFound(String),
    /// 找到视频元素但没有可用地址（不算错误）
    NoLink,
    /// 在某阶段失败
    Failed { stage: Stage, kind: ErrorKind },
    /// 调用方中途断开，后续阶段未执行
    Abandoned { stage: Stage },
}

/// 流程被打断的原因
#[derive(Debug)]
enum Interrupt {
    Failed { stage: Stage, error: ExtractionError },
    Abandoned { stage: Stage },
}

/// 给阶段结果打上阶段标签
trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, Interrupt>;
}

impl<T> AtStage<T> for ExtractionResult<T> {
    fn at(self, stage: Stage) -> Result<T, Interrupt> {
        self.map_err(|error| Interrupt::Failed { stage, error })
    }
}

/// 直链提取流程
///
/// - 持有连接能力和只读配置，可被多个请求共享
/// - 每次 `run` 独占一个会话，并保证会话被关闭
/// - 后台提取任务登记在 `workers` 里，停机时可以等它们收尾
pub struct ExtractionFlow<C: BrowserConnector> {
    connector: C,
    config: Arc<Config>,
    workers: TaskTracker,
}

impl<C: BrowserConnector> ExtractionFlow<C> {
    pub fn new(connector: C, config: Arc<Config>) -> Self {
        Self {
            connector,
            config,
            workers: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn workers(&self) -> &TaskTracker {
        &self.workers
    }

    /// 正在后台运行的提取数
    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    /// 等在跑的提取走完清理阶段
    ///
    /// 超过 `grace` 仍未结束时返回 false，此时仍持有的会话可能没被关闭。
    pub async fn drain(&self, grace: Duration) -> bool {
        self.workers.close();
        let drained = timeout(grace, self.workers.wait()).await.is_ok();
        self.workers.reopen();
        drained
    }

    /// 跑完整个流程
    ///
    /// 无论从哪里退出，都会依次执行清理阶段和结束标记。
    pub async fn run(&self, request: &ExtractionRequest, sink: &mut EventSink) -> PipelineOutcome {
        let mut guard = SessionGuard::empty();
        let mut stage = Stage::Start;

        let driven = AssertUnwindSafe(self.drive(request, sink, &mut guard, &mut stage))
            .catch_unwind()
            .await;

        let outcome = match driven {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(Interrupt::Failed { stage, error })) => {
                error!("[{}] 阶段 {} 失败: {}", request.target_url(), stage, error);
                sink.error(stage, &error).await;
                PipelineOutcome::Failed {
                    stage,
                    kind: error.kind(),
                }
            }
            Ok(Err(Interrupt::Abandoned { stage })) => PipelineOutcome::Abandoned { stage },
            Err(panic) => {
                let error = ExtractionError::Unknown(panic_message(panic));
                error!("[{}] 阶段 {} 崩溃: {}", request.target_url(), stage, error);
                sink.error(stage, &error).await;
                PipelineOutcome::Failed {
                    stage,
                    kind: ErrorKind::Unknown,
                }
            }
        };

        self.clean_up(&mut guard, sink).await;
        debug!("→ {}", Stage::Terminated);
        sink.end().await;

        outcome
    }

    /// 从配置到读属性的前进阶段
    async fn drive(
        &self,
        request: &ExtractionRequest,
        sink: &mut EventSink,
        guard: &mut SessionGuard<C::Session>,
        stage: &mut Stage,
    ) -> Result<PipelineOutcome, Interrupt> {
        let config = &*self.config;
        sink.progress("▶️ Process started...").await;

        // ========== 配置 ==========
        enter(Stage::Configuring, stage, sink)?;
        sink.progress("⚙️ Preparing remote browser options...").await;
        let options = config.session_options().at(Stage::Configuring)?;
        sink.progress(format!(
            "✅ Options ready (stealth: {}, connect timeout: {:?}, window: {}x{}).",
            options.stealth, options.connect_timeout, options.window_width, options.window_height
        ))
        .await;

        // ========== 连接 ==========
        enter(Stage::Connecting, stage, sink)?;
        sink.progress(format!(
            "🔄 Connecting to headless browser via {}...",
            options.endpoint_host()
        ))
        .await;
        let opened = self.connector.open(&options).await.at(Stage::Connecting)?;
        let session = guard.hold(opened);
        sink.progress(format!("✅ Connection successful! (session {})", session.id()))
            .await;

        // ========== 导航 ==========
        enter(Stage::Navigating, stage, sink)?;
        sink.progress(format!("🌐 Navigating to URL: {}", request.target_url()))
            .await;
        session
            .navigate(request.target_url())
            .await
            .at(Stage::Navigating)?;
        match session.title().await.filter(|t| !t.trim().is_empty()) {
            Some(title) => {
                sink.progress(format!("✅ Page navigation complete. Title: {}", title))
                    .await
            }
            None => sink.progress("✅ Page navigation complete.").await,
        }

        // ========== 找 iframe ==========
        enter(Stage::LocatingIframe, stage, sink)?;
        sink.progress("⏳ Waiting for the player iframe to become available...")
            .await;
        let iframe = session
            .wait_for_element(
                &Locator::Css(config.iframe_selector.clone()),
                "iframe",
                config.element_timeout(),
                config.poll_interval(),
            )
            .await
            .at(Stage::LocatingIframe)?;
        sink.progress("✅ Player iframe located.").await;

        // ========== 切进 iframe ==========
        enter(Stage::SwitchingContext, stage, sink)?;
        session
            .switch_context(&iframe)
            .await
            .map_err(as_context_error)
            .at(Stage::SwitchingContext)?;
        sink.progress("✅ Switched to player iframe successfully.").await;

        // ========== 找 video ==========
        enter(Stage::LocatingVideo, stage, sink)?;
        sink.progress("🎬 Searching for the main video element inside the iframe...")
            .await;
        let video = session
            .wait_for_element(
                &Locator::TagName(config.video_tag.clone()),
                "video",
                config.element_timeout(),
                config.poll_interval(),
            )
            .await
            .at(Stage::LocatingVideo)?;
        sink.progress("✅ Video element located.").await;

        // ========== 读地址 ==========
        enter(Stage::ExtractingAttribute, stage, sink)?;
        let source = session
            .read_attribute(&video, &config.source_attribute)
            .await
            .at(Stage::ExtractingAttribute)?;

        match source.filter(|s| !s.trim().is_empty()) {
            Some(link) => {
                sink.progress("✨ BINGO! Direct video link found!").await;
                sink.link(&link).await;
                Ok(PipelineOutcome::LinkFound(link))
            }
            None => {
                sink.progress(format!(
                    "⚠️ Video element found, but it has no '{}' link.",
                    config.source_attribute
                ))
                .await;
                Ok(PipelineOutcome::NoLink)
            }
        }
    }

    /// 清理阶段：有会话就关，没有就说明一下
    async fn clean_up(&self, guard: &mut SessionGuard<C::Session>, sink: &mut EventSink) {
        debug!("→ {}", Stage::CleaningUp);

        match guard.release() {
            Some(session) => {
                let id = session.id().to_string();
                sink.progress("🚪 Closing browser session...").await;
                // 关闭失败只记日志，不影响结束标记
                if let Err(e) = session.close().await {
                    warn!("会话 {} 关闭失败（已忽略）: {}", id, e);
                }
                sink.progress("✅ Session closed.").await;
            }
            None => {
                sink.progress("ℹ️ No browser session was opened, nothing to close.")
                    .await
            }
        }
    }
}

/// 进入下一阶段；调用方已断开时停止前进
fn enter(next: Stage, stage: &mut Stage, sink: &EventSink) -> Result<(), Interrupt> {
    *stage = next;
    debug!("→ {}", next);
    if sink.is_listening() {
        Ok(())
    } else {
        warn!("调用方已断开，停在 {} 之前", next);
        Err(Interrupt::Abandoned { stage: next })
    }
}

/// 切换 iframe 时的任何错误都归为 Context
fn as_context_error(error: ExtractionError) -> ExtractionError {
    match error {
        ExtractionError::Context(_) => error,
        other => ExtractionError::Context(other.to_string()),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline task panicked".to_string()
    }
}
