//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 把"一次提取"接到调用方手里：校验参数、为每个请求启动流程、
//! 把事件逐条转发出去。
//!
//! ## 模块划分
//!
//! ### `stream_adapter` - 事件流适配器
//! - 缺少 url 时给出两条事件（错误 + 结束标记）
//! - 每个请求一个后台任务 + 有界通道，边产出边转发
//!
//! ### `server` - HTTP 入口
//! - `GET /stream-logs?url=...`，以 SSE 返回
//!
//! ## 层次关系
//!
//! ```text
//! server (HTTP / SSE)
//!     ↓
//! stream_adapter (每个请求一个事件流)
//!     ↓
//! workflow::ExtractionFlow (一次提取的阶段流程)
//!     ↓
//! infrastructure (能力：BrowserConnector / BrowserSession)
//!     ↓
//! browser (chromiumoxide 远程会话)
//! ```

pub mod server;
pub mod stream_adapter;

// 重新导出主要类型
pub use server::{router, serve};
pub use stream_adapter::start_extraction;
