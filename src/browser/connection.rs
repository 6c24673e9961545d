use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::{
    DescribeNodeParams, GetAttributesParams, GetDocumentParams, NodeId,
    PushNodesByBackendIdsToFrontendParams, QuerySelectorParams, ResolveNodeParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::js_protocol::runtime::CallFunctionOnParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::SessionOptions;
use crate::error::{classify_open_failure, ExtractionError, ExtractionResult};
use crate::infrastructure::{BrowserConnector, BrowserSession, Locator};

/// 关闭会话最多等待的时间
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// 值是地址的属性，原始写法可能是相对路径
const URL_ATTRIBUTES: &[&str] = &["src", "href", "poster"];

/// 拼出带凭据和启动参数的 websocket 地址
pub fn endpoint_url(options: &SessionOptions) -> ExtractionResult<String> {
    let mut url = Url::parse(&options.endpoint).map_err(|e| {
        ExtractionError::Configuration(format!("invalid browser endpoint: {}", e))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("token", options.api_key.expose());
        for (name, value) in options.query_pairs() {
            if value.is_empty() {
                query.append_key_only(&name);
            } else {
                query.append_pair(&name, &value);
            }
        }
    }

    Ok(url.to_string())
}

/// 通过 CDP websocket 连接远程 Chrome
#[derive(Debug, Clone, Default)]
pub struct ChromiumConnector;

impl ChromiumConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserConnector for ChromiumConnector {
    type Session = ChromiumSession;

    async fn open(&self, options: &SessionOptions) -> ExtractionResult<ChromiumSession> {
        let url = endpoint_url(options)?;
        let host = options.endpoint_host();
        info!("正在连接到远程浏览器: {}", host);

        match timeout(options.connect_timeout, connect_to_browser_and_page(&url)).await {
            Ok(Ok(session)) => {
                debug!("远程会话已建立: {}", session.id);
                Ok(session)
            }
            Ok(Err(e)) => {
                error!("连接远程浏览器失败: {}", e);
                Err(classify_open_failure(e))
            }
            Err(_) => {
                error!("连接远程浏览器超时 ({:?})", options.connect_timeout);
                Err(ExtractionError::Connection(format!(
                    "no session from {} within {:?}",
                    host, options.connect_timeout
                )))
            }
        }
    }
}

/// 连接到浏览器并打开一个空白页面
async fn connect_to_browser_and_page(url: &str) -> Result<ChromiumSession, CdpError> {
    let (browser, mut handler) = Browser::connect(url).await?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件；连接超时导致本 future 被丢弃时，随之中止
    let handler_task = HandlerTask(tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    }));

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = match browser.new_page("about:blank").await {
        Ok(page) => page,
        Err(e) => {
            error!("创建页面失败: {}", e);
            return Err(e);
        }
    };

    Ok(ChromiumSession {
        id: page.target_id().inner().clone(),
        browser,
        page,
        handler_task,
        frame_root: None,
    })
}

/// CDP 事件循环任务，被丢弃时中止，websocket 随之断开
struct HandlerTask(JoinHandle<()>);

impl HandlerTask {
    fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 一个远程 Chrome 会话
///
/// 元素用 DOM 节点 id 表示；`frame_root` 为 Some 时，查询限定在该 iframe 文档内。
pub struct ChromiumSession {
    id: String,
    browser: Browser,
    page: Page,
    handler_task: HandlerTask,
    frame_root: Option<NodeId>,
}

impl ChromiumSession {
    /// 当前查询作用域的根节点
    async fn scope_root(&self) -> Result<NodeId, CdpError> {
        if let Some(root) = &self.frame_root {
            return Ok(root.clone());
        }
        let document = self.page.execute(GetDocumentParams::default()).await?;
        Ok(document.result.root.node_id)
    }

    /// 同源 iframe：取其文档节点
    async fn content_document(&self, frame: &NodeId) -> Result<Option<NodeId>, CdpError> {
        let described = self
            .page
            .execute(DescribeNodeParams {
                node_id: Some(frame.clone()),
                depth: Some(1),
                pierce: Some(true),
                ..Default::default()
            })
            .await?;

        let Some(document) = described.result.node.content_document else {
            return Ok(None);
        };

        let pushed = self
            .page
            .execute(PushNodesByBackendIdsToFrontendParams::new(vec![
                document.backend_node_id,
            ]))
            .await?;

        Ok(pushed
            .result
            .node_ids
            .into_iter()
            .find(|id| *id.inner() > 0))
    }

    /// iframe 的绝对地址（读 DOM 属性 `src`，已按页面地址解析）
    async fn frame_src(&self, frame: &NodeId) -> ExtractionResult<String> {
        self.string_property(frame, "src")
            .await
            .map_err(ExtractionError::Context)?
            .ok_or_else(|| ExtractionError::Context("iframe has no src to follow".into()))
    }

    /// 读节点上的 JS 属性，只接受非空字符串
    async fn string_property(&self, node: &NodeId, name: &str) -> Result<Option<String>, String> {
        let resolved = self
            .page
            .execute(ResolveNodeParams {
                node_id: Some(node.clone()),
                ..Default::default()
            })
            .await
            .map_err(|e| e.to_string())?;

        let Some(object_id) = resolved.result.object.object_id else {
            return Err(format!("node {:?} has no remote object", node));
        };

        let call = CallFunctionOnParams::builder()
            .object_id(object_id)
            .function_declaration(property_getter(name))
            .return_by_value(true)
            .build()?;

        let returned = self.page.execute(call).await.map_err(|e| e.to_string())?;

        Ok(returned
            .result
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|value| !value.is_empty()))
    }

    /// 标记里的原始属性值
    async fn markup_attribute(&self, node: &NodeId, name: &str) -> ExtractionResult<Option<String>> {
        let attributes = self
            .page
            .execute(GetAttributesParams::new(node.clone()))
            .await
            .map_err(unknown_error)?
            .result
            .attributes;

        // 返回值是 [name, value, name, value, ...]
        Ok(attributes
            .chunks(2)
            .find(|pair| pair[0] == name)
            .and_then(|pair| pair.get(1).cloned()))
    }
}

/// 属性名只含字母、数字、`-`、`_` 时才拼进脚本
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn property_getter(name: &str) -> String {
    format!(
        "function() {{ const v = this[\"{}\"]; return typeof v === 'string' ? v : null; }}",
        name
    )
}

/// 相对地址按页面地址补成绝对地址，补不了就原样返回
fn resolve_link(base: Option<&str>, raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }
    base.and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(raw.trim()).ok())
        .map(String::from)
        .unwrap_or_else(|| raw.to_string())
}

fn context_error(e: CdpError) -> ExtractionError {
    ExtractionError::Context(e.to_string())
}

fn unknown_error(e: CdpError) -> ExtractionError {
    ExtractionError::Unknown(e.to_string())
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = NodeId;

    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &str) -> ExtractionResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url).await.map_err(|e| {
            error!("导航到 {} 失败: {}", url, e);
            ExtractionError::navigation(url, e)
        })?;
        self.frame_root = None;
        Ok(())
    }

    async fn title(&self) -> Option<String> {
        self.page.get_title().await.ok().flatten()
    }

    async fn find_element(&self, locator: &Locator) -> ExtractionResult<Option<NodeId>> {
        let root = self.scope_root().await.map_err(unknown_error)?;
        let found = self
            .page
            .execute(QuerySelectorParams::new(root, locator.as_css()))
            .await
            .map_err(unknown_error)?;

        let node_id = found.result.node_id;
        Ok((*node_id.inner() > 0).then_some(node_id))
    }

    async fn switch_context(&mut self, frame: &NodeId) -> ExtractionResult<()> {
        if let Some(root) = self.content_document(frame).await.map_err(context_error)? {
            debug!("同源 iframe，查询范围切换到节点 {:?}", root);
            self.frame_root = Some(root);
            return Ok(());
        }

        // 跨进程 iframe 的文档不在当前 target 里，改为直接打开它的地址
        let src = self.frame_src(frame).await?;
        let referrer = self.page.url().await.ok().flatten();
        debug!("跨域 iframe，直接加载: {} (referrer: {:?})", src, referrer);

        let mut params = NavigateParams::builder().url(src);
        if let Some(referrer) = referrer {
            params = params.referrer(referrer);
        }
        let params = params.build().map_err(ExtractionError::Context)?;

        self.page.goto(params).await.map_err(context_error)?;
        self.frame_root = None;
        Ok(())
    }

    async fn read_attribute(&self, element: &NodeId, name: &str) -> ExtractionResult<Option<String>> {
        // 优先读 JS 属性：浏览器已按文档地址解析好
        if is_plain_name(name) {
            if let Some(value) = self
                .string_property(element, name)
                .await
                .map_err(ExtractionError::Unknown)?
            {
                return Ok(Some(value));
            }
        }

        let Some(raw) = self.markup_attribute(element, name).await? else {
            return Ok(None);
        };
        if !URL_ATTRIBUTES.contains(&name) {
            return Ok(Some(raw));
        }

        let base = self.page.url().await.ok().flatten();
        Ok(Some(resolve_link(base.as_deref(), &raw)))
    }

    async fn close(mut self) -> ExtractionResult<()> {
        let result = timeout(CLOSE_TIMEOUT, self.browser.close()).await;
        self.handler_task.abort();

        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                warn!("关闭会话 {} 失败: {}", self.id, e);
                Err(ExtractionError::Connection(e.to_string()))
            }
            Err(_) => {
                warn!("关闭会话 {} 超时", self.id);
                Err(ExtractionError::Connection(format!(
                    "close did not finish within {:?}",
                    CLOSE_TIMEOUT
                )))
            }
        }
    }
}
