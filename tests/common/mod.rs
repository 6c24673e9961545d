//! 测试用的脚本化远程浏览器
//!
//! 不访问网络，每个阶段成功还是失败都由 `Script` 决定。

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use video_link_extractor::config::{Config, Credential, SessionOptions};
use video_link_extractor::{
    start_extraction, BrowserConnector, BrowserSession, ExtractionError, ExtractionFlow,
    ExtractionResult, Locator, StageEvent,
};

pub const PAGE_URL: &str = "https://movies.example/watch/42";
pub const VIDEO_URL: &str = "https://cdn.example/video.mp4";
pub const SESSION_ID: &str = "fake-session-1";

/// 每个阶段的剧本
#[derive(Clone, Debug)]
pub struct Script {
    pub open_failure: Option<ExtractionError>,
    pub navigate_failure: Option<String>,
    pub navigate_delay: Option<Duration>,
    pub title: Option<String>,
    pub iframe_present: bool,
    pub switch_failure: Option<ExtractionError>,
    pub video_present: bool,
    pub video_src: Option<String>,
    pub attribute_failure: Option<ExtractionError>,
    pub close_failure: bool,
    /// 在哪个调用里 panic：`"find"` 或 `"read"`
    pub panic_in: Option<&'static str>,
}

impl Script {
    /// 页面里有 `#IndStreamPlayer iframe`，里面的 `<video>` 带 src
    pub fn happy() -> Self {
        Self {
            open_failure: None,
            navigate_failure: None,
            navigate_delay: None,
            title: Some("Episode 42".to_string()),
            iframe_present: true,
            switch_failure: None,
            video_present: true,
            video_src: Some(VIDEO_URL.to_string()),
            attribute_failure: None,
            close_failure: false,
            panic_in: None,
        }
    }
}

/// 记录下来的调用
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: usize,
    pub closed: usize,
    pub log: Vec<String>,
}

pub type SharedCalls = Arc<Mutex<Calls>>;

fn record(calls: &SharedCalls, entry: impl Into<String>) {
    calls.lock().unwrap().log.push(entry.into());
}

pub struct ScriptedConnector {
    script: Script,
    calls: SharedCalls,
}

#[async_trait]
impl BrowserConnector for ScriptedConnector {
    type Session = FakeSession;

    async fn open(&self, options: &SessionOptions) -> ExtractionResult<FakeSession> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.opened += 1;
            calls.log.push(format!("open stealth={}", options.stealth));
        }
        if let Some(error) = &self.script.open_failure {
            return Err(error.clone());
        }
        Ok(FakeSession {
            script: self.script.clone(),
            calls: self.calls.clone(),
            in_frame: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeElement {
    Iframe,
    Video,
}

pub struct FakeSession {
    script: Script,
    calls: SharedCalls,
    in_frame: bool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = FakeElement;

    fn id(&self) -> &str {
        SESSION_ID
    }

    async fn navigate(&mut self, url: &str) -> ExtractionResult<()> {
        record(&self.calls, format!("navigate {}", url));
        if let Some(delay) = self.script.navigate_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.navigate_failure {
            Some(detail) => Err(ExtractionError::navigation(url, detail)),
            None => Ok(()),
        }
    }

    async fn title(&self) -> Option<String> {
        self.script.title.clone()
    }

    async fn find_element(&self, locator: &Locator) -> ExtractionResult<Option<FakeElement>> {
        record(&self.calls, format!("find {}", locator));
        if self.script.panic_in == Some("find") {
            panic!("boom in find");
        }
        let found = match locator {
            Locator::Css(selector) if selector == "#IndStreamPlayer iframe" => {
                (!self.in_frame && self.script.iframe_present).then_some(FakeElement::Iframe)
            }
            Locator::TagName(tag) if tag == "video" => {
                (self.in_frame && self.script.video_present).then_some(FakeElement::Video)
            }
            _ => None,
        };
        Ok(found)
    }

    async fn switch_context(&mut self, frame: &FakeElement) -> ExtractionResult<()> {
        record(&self.calls, format!("switch {:?}", frame));
        if let Some(error) = &self.script.switch_failure {
            return Err(error.clone());
        }
        self.in_frame = true;
        Ok(())
    }

    async fn read_attribute(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> ExtractionResult<Option<String>> {
        record(&self.calls, format!("read {:?}.{}", element, name));
        if self.script.panic_in == Some("read") {
            panic!("boom in read");
        }
        if let Some(error) = &self.script.attribute_failure {
            return Err(error.clone());
        }
        Ok(self.script.video_src.clone())
    }

    async fn close(self) -> ExtractionResult<()> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.closed += 1;
            calls.log.push("close".to_string());
        }
        if self.script.close_failure {
            return Err(ExtractionError::Connection("socket already gone".into()));
        }
        Ok(())
    }
}

/// 超时都缩到毫秒级的配置
pub fn test_config() -> Config {
    Config {
        api_key: Some(Credential::new("test-key")),
        connect_timeout_ms: 1_000,
        element_timeout_ms: 50,
        poll_interval_ms: 5,
        ..Config::default()
    }
}

pub fn flow_with(
    script: Script,
    config: Config,
) -> (Arc<ExtractionFlow<ScriptedConnector>>, SharedCalls) {
    let calls = SharedCalls::default();
    let connector = ScriptedConnector {
        script,
        calls: calls.clone(),
    };
    (
        Arc::new(ExtractionFlow::new(connector, Arc::new(config))),
        calls,
    )
}

pub fn flow(script: Script) -> (Arc<ExtractionFlow<ScriptedConnector>>, SharedCalls) {
    flow_with(script, test_config())
}

/// 跑完整个流并收集所有事件
pub async fn run_to_end(
    flow: Arc<ExtractionFlow<ScriptedConnector>>,
    url: Option<&str>,
) -> Vec<StageEvent> {
    start_extraction(flow, url.map(str::to_string))
        .collect()
        .await
}

pub fn messages(events: &[StageEvent]) -> Vec<String> {
    events.iter().map(|e| e.message.clone()).collect()
}
