//! # Video Link Extractor
//!
//! 通过远程无头浏览器，从播放器 iframe 里取出视频直链，并把每一步进度实时推给调用方
//!
//! ## 架构设计
//!
//! 本系统沿用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（远程会话），只暴露能力
//! - `BrowserConnector` / `BrowserSession` - 打开、导航、找元素、切 iframe、读属性、关闭
//! - `SessionGuard` - 会话的唯一持有者，保证任何出口都会关闭
//! - `browser/` - 基于 chromiumoxide 的远程 CDP 实现
//!
//! ### ② 数据层（Models）
//! - `models/` - `StageEvent` 与线上格式（`data: ...` + 空行）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次提取"的完整阶段
//! - `ExtractionRequest` / `EventSink` - 上下文与事件出口
//! - `ExtractionFlow` - 配置 → 连接 → 导航 → iframe → video → src → 清理 → 结束
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/stream_adapter` - 每个请求一个事件流，边产出边转发
//! - `orchestrator/server` - `GET /stream-logs?url=...`
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::ChromiumConnector;
pub use config::Config;
pub use error::{ErrorKind, ExtractionError, ExtractionResult};
pub use infrastructure::{BrowserConnector, BrowserSession, Locator, SessionGuard};
pub use models::{EventKind, StageEvent};
pub use orchestrator::{router, serve, start_extraction};
pub use workflow::{ExtractionFlow, ExtractionRequest, PipelineOutcome, Stage};
