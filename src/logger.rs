use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志
///
/// 默认级别 info，可用 `RUST_LOG` 覆盖。重复调用不会报错（测试里会多次调用）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
