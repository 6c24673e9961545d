/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::{info, warn};

use crate::config::Config;
use crate::workflow::PipelineOutcome;

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前配置（凭据不会被打印）
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 视频直链提取服务启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🌐 远程浏览器: {}", config.browser_endpoint);
    info!(
        "⏱️ 连接超时: {}ms, 元素等待: {}ms",
        config.connect_timeout_ms, config.element_timeout_ms
    );
    if config.api_key.as_ref().map_or(true, |k| k.is_blank()) {
        warn!("⚠️ 未设置 BROWSERLESS_API_KEY，所有提取请求都会在配置阶段失败");
    }
    info!("{}", "=".repeat(60));
}

/// 记录单次提取的结果
///
/// # 参数
/// - `target_url`: 目标页面
/// - `outcome`: 流水线结果
pub fn log_run_summary(target_url: &str, outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::LinkFound(link) => {
            info!("✅ [{}] 找到直链: {}", truncate_text(target_url, 80), link)
        }
        PipelineOutcome::NoLink => {
            info!("ℹ️ [{}] 找到视频元素但没有地址", truncate_text(target_url, 80))
        }
        PipelineOutcome::Failed { stage, kind } => {
            warn!(
                "❌ [{}] 在 {} 阶段失败: {:?}",
                truncate_text(target_url, 80),
                stage,
                kind
            )
        }
        PipelineOutcome::Abandoned { stage } => {
            warn!(
                "🔌 [{}] 客户端在 {} 阶段前断开，已提前清理",
                truncate_text(target_url, 80),
                stage
            )
        }
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 把多行文本压成一行
///
/// 连续的换行（含空行、单独的 `\r`）合并成一个 ` | `，首尾空白去掉。
pub fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}
