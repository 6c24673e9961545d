//! 远程浏览器会话 - 基础设施层
//!
//! 持有稀缺资源（远程会话），只暴露"打开/导航/找元素/切 iframe/读属性/关闭"这几种能力。
//! 流水线只依赖这里的 trait，测试时可以换成脚本化的假实现。

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::SessionOptions;
use crate::error::{ExtractionError, ExtractionResult};

/// 元素定位方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS 选择器
    Css(String),
    /// 标签名
    TagName(String),
}

impl Locator {
    /// 转成 CSS 选择器（标签名本身就是合法的选择器）
    pub fn as_css(&self) -> &str {
        match self {
            Locator::Css(selector) => selector,
            Locator::TagName(tag) => tag,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css `{}`", selector),
            Locator::TagName(tag) => write!(f, "<{}>", tag),
        }
    }
}

/// 建立远程会话的能力
#[async_trait]
pub trait BrowserConnector: Send + Sync + 'static {
    type Session: BrowserSession;

    /// 按参数包打开一个会话
    ///
    /// 远端拒绝时返回 `CredentialOrQuota`，其他失败（含超时）返回 `Connection`。
    async fn open(&self, options: &SessionOptions) -> ExtractionResult<Self::Session>;
}

/// 单个远程会话能做的事
#[async_trait]
pub trait BrowserSession: Send + Sync + 'static {
    /// 元素引用
    type Element: Send + Sync;

    /// 会话标识（用于日志追踪）
    fn id(&self) -> &str;

    async fn navigate(&mut self, url: &str) -> ExtractionResult<()>;

    /// 当前页面标题，取不到时返回 None
    async fn title(&self) -> Option<String>;

    /// 在当前作用域里查找一次，不等待
    async fn find_element(&self, locator: &Locator) -> ExtractionResult<Option<Self::Element>>;

    /// 把后续查询限定到 iframe 内部
    async fn switch_context(&mut self, frame: &Self::Element) -> ExtractionResult<()>;

    /// 读属性，未设置时返回 None
    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> ExtractionResult<Option<String>>;

    /// 尽力关闭，会话已失效时也可以调用
    async fn close(self) -> ExtractionResult<()>;

    /// 轮询直到元素出现或超时
    ///
    /// 轮询期间的查询错误视为"暂时没找到"（页面可能还在加载）。
    async fn wait_for_element(
        &self,
        locator: &Locator,
        target: &'static str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ExtractionResult<Self::Element> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.find_element(locator).await {
                Ok(Some(element)) => return Ok(element),
                Ok(None) => {}
                Err(e) => debug!("查找 {} 暂时失败: {}", locator, e),
            }

            if Instant::now() >= deadline {
                return Err(ExtractionError::Timeout {
                    target,
                    waited: timeout,
                });
            }
            sleep(poll_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}

/// 会话守卫
///
/// 每次运行至多持有一个会话。正常路径由清理阶段调用 [`SessionGuard::release`] 取走并关闭；
/// 若守卫在仍持有会话时被丢弃（任务被中止或 panic），就在当前 runtime 上补一次关闭。
pub struct SessionGuard<S: BrowserSession> {
    session: Option<S>,
}

impl<S: BrowserSession> SessionGuard<S> {
    pub fn empty() -> Self {
        Self { session: None }
    }

    pub fn hold(&mut self, session: S) -> &mut S {
        self.session.insert(session)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// 取走会话，之后守卫不再负责关闭
    pub fn release(&mut self) -> Option<S> {
        self.session.take()
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let id = session.id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("会话 {} 未经清理阶段释放，后台关闭", id);
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!("后台关闭会话 {} 失败: {}", id, e);
                    }
                });
            }
            Err(_) => warn!("会话 {} 被丢弃时没有可用的 runtime，无法关闭", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 第 n 次查找才出现元素的假会话
    struct Countdown {
        appear_after: usize,
        probes: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSession for Countdown {
        type Element = usize;

        fn id(&self) -> &str {
            "countdown"
        }

        async fn navigate(&mut self, _url: &str) -> ExtractionResult<()> {
            Ok(())
        }

        async fn title(&self) -> Option<String> {
            None
        }

        async fn find_element(&self, _locator: &Locator) -> ExtractionResult<Option<usize>> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                return Err(ExtractionError::Unknown("document not ready".into()));
            }
            Ok((n >= self.appear_after).then_some(n))
        }

        async fn switch_context(&mut self, _frame: &usize) -> ExtractionResult<()> {
            Ok(())
        }

        async fn read_attribute(&self, _e: &usize, _name: &str) -> ExtractionResult<Option<String>> {
            Ok(None)
        }

        async fn close(self) -> ExtractionResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn countdown(appear_after: usize) -> (Countdown, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        (
            Countdown {
                appear_after,
                probes: AtomicUsize::new(0),
                closed: closed.clone(),
            },
            closed,
        )
    }

    #[test]
    fn test_locator_as_css() {
        assert_eq!(Locator::Css("#IndStreamPlayer iframe".into()).as_css(), "#IndStreamPlayer iframe");
        assert_eq!(Locator::TagName("video".into()).as_css(), "video");
        assert_eq!(Locator::TagName("video".into()).to_string(), "<video>");
    }

    #[tokio::test]
    async fn test_wait_tolerates_transient_errors() {
        let (session, _) = countdown(3);
        let found = session
            .wait_for_element(
                &Locator::TagName("video".into()),
                "video",
                Duration::from_secs(1),
                Duration::from_millis(1),
            )
            .await;
        assert_eq!(tokio_test::assert_ok!(found), 3);
    }

    #[tokio::test]
    async fn test_wait_times_out_with_target_tag() {
        let (session, _) = countdown(usize::MAX);
        let err = session
            .wait_for_element(
                &Locator::Css("#IndStreamPlayer iframe".into()),
                "iframe",
                Duration::from_millis(30),
                Duration::from_millis(5),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExtractionError::Timeout {
                target: "iframe",
                waited: Duration::from_millis(30)
            }
        );
    }

    #[tokio::test]
    async fn test_guard_closes_on_drop() {
        let (session, closed) = countdown(1);
        {
            let mut guard = SessionGuard::empty();
            guard.hold(session);
            assert!(guard.is_open());
        }
        // 让后台关闭任务跑完
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_released_session_is_not_closed_twice() {
        let (session, closed) = countdown(1);
        let mut guard = SessionGuard::empty();
        guard.hold(session);
        let session = guard.release().unwrap();
        drop(guard);
        session.close().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
