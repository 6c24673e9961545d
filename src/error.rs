//! 提取流程错误类型
//!
//! 每个阶段的失败都归入下面的某一类，流水线据此生成一条错误事件，
//! 然后无条件进入清理阶段。

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// 提取流程错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// 凭据或会话参数缺失/无效，连接前即中止
    #[error("Configuration problem: {0}")]
    Configuration(String),

    /// 远端拒绝创建会话（凭据错误或额度耗尽）
    #[error("Remote browser refused the session (bad API key or exhausted quota). Details: {0}")]
    CredentialOrQuota(String),

    /// 无法建立或维持远程会话
    #[error("WebDriver issue. Could be a problem with the remote browser connection. Details: {0}")]
    Connection(String),

    /// 页面加载失败
    #[error("Page failed to load: {url}. Details: {detail}")]
    Navigation { url: String, detail: String },

    /// 等待元素超时
    #[error("Timeout! The {target} element did not appear within {waited:?}.")]
    Timeout {
        target: &'static str,
        waited: Duration,
    },

    /// 切换到 iframe 作用域失败
    #[error("Could not switch into the player iframe. Details: {0}")]
    Context(String),

    /// 兜底
    #[error("An unexpected error occurred: {0}")]
    Unknown(String),
}

/// 错误类别（不带数据，便于匹配和统计）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    CredentialOrQuota,
    Connection,
    Navigation,
    Timeout,
    Context,
    Unknown,
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::Configuration(_) => ErrorKind::Configuration,
            ExtractionError::CredentialOrQuota(_) => ErrorKind::CredentialOrQuota,
            ExtractionError::Connection(_) => ErrorKind::Connection,
            ExtractionError::Navigation { .. } => ErrorKind::Navigation,
            ExtractionError::Timeout { .. } => ErrorKind::Timeout,
            ExtractionError::Context(_) => ErrorKind::Context,
            ExtractionError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// 创建导航错误
    pub fn navigation(url: impl Into<String>, detail: impl ToString) -> Self {
        ExtractionError::Navigation {
            url: url.into(),
            detail: detail.to_string(),
        }
    }
}

/// 远端拒绝建会话时的特征串
fn rejection_signature() -> &'static Regex {
    static SIGNATURE: OnceLock<Regex> = OnceLock::new();
    SIGNATURE.get_or_init(|| {
        Regex::new(
            r"(?i)session not created|unauthori[sz]ed|forbidden|too many requests|quota|\b(401|403|429)\b",
        )
        .expect("rejection signature is a valid regex")
    })
}

/// 对建会话失败进行分类
///
/// 命中拒绝特征的归为 `CredentialOrQuota`，其余一律是 `Connection`。
pub fn classify_open_failure(detail: impl ToString) -> ExtractionError {
    let detail = detail.to_string();
    if rejection_signature().is_match(&detail) {
        ExtractionError::CredentialOrQuota(detail)
    } else {
        ExtractionError::Connection(detail)
    }
}

/// 提取流程结果类型
pub type ExtractionResult<T> = Result<T, ExtractionError>;
