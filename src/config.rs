use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{ExtractionError, ExtractionResult};

/// 远程浏览器服务凭据
///
/// 只能从外部注入（环境变量或配置文件），调试输出时不显示原文。
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 远程浏览器 websocket 地址
    pub browser_endpoint: String,
    /// 远程浏览器服务的 API Key
    pub api_key: Option<Credential>,
    /// 是否开启反检测
    pub stealth: bool,
    /// 建立会话的超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 等待单个元素的超时（毫秒）
    pub element_timeout_ms: u64,
    /// 轮询元素的间隔（毫秒）
    pub poll_interval_ms: u64,
    pub window_width: u32,
    pub window_height: u32,
    /// 关闭浏览器沙盒
    pub disable_sandbox: bool,
    /// 播放器 iframe 的 CSS 选择器
    pub iframe_selector: String,
    /// iframe 内视频元素的标签名
    pub video_tag: String,
    /// 视频地址所在的属性
    pub source_attribute: String,
    /// 每个请求的事件通道容量
    pub event_buffer: usize,
    /// HTTP 监听地址
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_endpoint: "wss://chrome.browserless.io".to_string(),
            api_key: None,
            stealth: true,
            connect_timeout_ms: 90_000,
            element_timeout_ms: 60_000,
            poll_interval_ms: 500,
            window_width: 1920,
            window_height: 1080,
            disable_sandbox: true,
            iframe_selector: "#IndStreamPlayer iframe".to_string(),
            video_tag: "video".to_string(),
            source_attribute: "src".to_string(),
            event_buffer: 8,
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 配置文件（`EXTRACTOR_CONFIG` 指定时）+ 环境变量
    pub fn load() -> Result<Self> {
        let base = match std::env::var("EXTRACTOR_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件读取，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))
    }

    fn with_env_overrides(self) -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let parsed = |name: &str| env(name).and_then(|v| v.parse::<u64>().ok());

        Self {
            browser_endpoint: env("BROWSER_ENDPOINT").unwrap_or(self.browser_endpoint),
            api_key: env("BROWSERLESS_API_KEY").map(Credential::new).or(self.api_key),
            connect_timeout_ms: parsed("CONNECT_TIMEOUT_MS").unwrap_or(self.connect_timeout_ms),
            element_timeout_ms: parsed("ELEMENT_TIMEOUT_MS").unwrap_or(self.element_timeout_ms),
            bind_addr: env("BIND_ADDR").unwrap_or(self.bind_addr),
            ..self
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 组装建会话用的参数包
    ///
    /// 凭据缺失或为空时返回 `Configuration` 错误。
    pub fn session_options(&self) -> ExtractionResult<SessionOptions> {
        let api_key = match &self.api_key {
            Some(key) if !key.is_blank() => key.clone(),
            _ => {
                return Err(ExtractionError::Configuration(
                    "BROWSERLESS_API_KEY is not set".to_string(),
                ))
            }
        };

        url::Url::parse(&self.browser_endpoint).map_err(|e| {
            ExtractionError::Configuration(format!(
                "browser endpoint `{}` is not a valid URL: {}",
                self.browser_endpoint, e
            ))
        })?;

        Ok(SessionOptions {
            endpoint: self.browser_endpoint.clone(),
            api_key,
            stealth: self.stealth,
            connect_timeout: self.connect_timeout(),
            window_width: self.window_width,
            window_height: self.window_height,
            disable_sandbox: self.disable_sandbox,
        })
    }
}

/// 建立远程会话所需的全部参数
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub endpoint: String,
    pub api_key: Credential,
    pub stealth: bool,
    pub connect_timeout: Duration,
    pub window_width: u32,
    pub window_height: u32,
    pub disable_sandbox: bool,
}

impl SessionOptions {
    /// 浏览器启动参数
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![format!(
            "--window-size={},{}",
            self.window_width, self.window_height
        )];
        if self.disable_sandbox {
            args.push("--no-sandbox".to_string());
            args.push("--disable-dev-shm-usage".to_string());
        }
        args
    }

    /// 以命名参数形式列出（不含凭据）
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("stealth".to_string(), self.stealth.to_string()),
            (
                "timeout".to_string(),
                self.connect_timeout.as_millis().to_string(),
            ),
        ];
        for arg in self.launch_args() {
            match arg.split_once('=') {
                Some((flag, value)) => pairs.push((flag.to_string(), value.to_string())),
                None => pairs.push((arg, String::new())),
            }
        }
        pairs
    }

    /// 日志和事件里显示的主机名
    pub fn endpoint_host(&self) -> String {
        url::Url::parse(&self.endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.endpoint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: &str) -> Config {
        Config {
            api_key: Some(Credential::new(key)),
            ..Config::default()
        }
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let err = Config::default().session_options().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);

        let err = config_with_key("   ").session_options().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_invalid_endpoint_is_configuration_error() {
        let config = Config {
            browser_endpoint: "not a url".to_string(),
            ..config_with_key("k")
        };
        let err = config.session_options().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_session_options_defaults() {
        let options = config_with_key("k").session_options().unwrap();
        assert!(options.stealth);
        assert_eq!(options.connect_timeout, Duration::from_secs(90));
        assert_eq!(
            options.launch_args(),
            vec!["--window-size=1920,1080", "--no-sandbox", "--disable-dev-shm-usage"]
        );
        assert_eq!(options.endpoint_host(), "chrome.browserless.io");
    }

    #[test]
    fn test_query_pairs_do_not_leak_credential() {
        let options = config_with_key("secret-key").session_options().unwrap();
        let pairs = options.query_pairs();
        assert!(pairs.iter().all(|(k, v)| k != "token" && v != "secret-key"));
        assert!(pairs.contains(&("timeout".to_string(), "90000".to_string())));
        assert!(pairs.contains(&("--no-sandbox".to_string(), String::new())));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let config = config_with_key("secret-key");
        assert!(!format!("{:?}", config).contains("secret-key"));
    }

    #[test]
    fn test_toml_partial_override() {
        let config: Config = toml::from_str(
            r##"
            api_key = "abc"
            element_timeout_ms = 45000
            iframe_selector = "#Player iframe"
            "##,
        )
        .unwrap();
        assert_eq!(config.element_timeout(), Duration::from_secs(45));
        assert_eq!(config.iframe_selector, "#Player iframe");
        assert_eq!(config.video_tag, "video");
        assert_eq!(config.api_key.unwrap().expose(), "abc");
    }
}
