//! 进度事件与线上格式
//!
//! 每个事件在线上是一行 `data: <payload>` 加一个空行：
//! - 普通进度/错误：`data: 1.25s <message>`
//! - 找到直链：`data: --LINK--<url>`
//! - 流结束：`data: --END-OF-STREAM--`

use std::time::Duration;

use crate::utils::single_line;

/// 直链事件前缀
pub const LINK_PREFIX: &str = "--LINK--";

/// 流结束标记
pub const END_OF_STREAM: &str = "--END-OF-STREAM--";

/// 事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// 普通进度
    Progress,
    /// 找到直链（message 即链接本身）
    Success,
    /// 某个阶段失败
    Error,
    /// 流结束
    Terminal,
}

/// 流水线产出的单个事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    /// 距本次运行开始的时间
    pub elapsed: Duration,
    pub kind: EventKind,
    pub message: String,
}

impl StageEvent {
    /// 普通进度事件，多行文本会被压成一行
    pub fn progress(elapsed: Duration, message: impl AsRef<str>) -> Self {
        Self {
            elapsed,
            kind: EventKind::Progress,
            message: single_line(message.as_ref()),
        }
    }

    /// 错误事件，多行诊断信息会被压成一行
    pub fn error(elapsed: Duration, message: impl AsRef<str>) -> Self {
        Self {
            elapsed,
            kind: EventKind::Error,
            message: single_line(message.as_ref()),
        }
    }

    /// 直链事件，链接原样保留（合法 URL 里不会有的 CR/LF 除外）
    pub fn link(elapsed: Duration, url: impl Into<String>) -> Self {
        Self {
            elapsed,
            kind: EventKind::Success,
            message: url.into().replace(['\r', '\n'], ""),
        }
    }

    /// 流结束事件
    pub fn end_of_stream(elapsed: Duration) -> Self {
        Self {
            elapsed,
            kind: EventKind::Terminal,
            message: String::new(),
        }
    }

    /// `data: ` 之后的内容
    pub fn payload(&self) -> String {
        match self.kind {
            EventKind::Progress | EventKind::Error => {
                format!("{:.2}s {}", self.elapsed.as_secs_f64(), self.message)
            }
            EventKind::Success => format!("{}{}", LINK_PREFIX, self.message),
            EventKind::Terminal => END_OF_STREAM.to_string(),
        }
    }

    /// 完整的线上格式（含结尾空行）
    pub fn to_wire(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::Terminal
    }
}
