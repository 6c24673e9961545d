use anyhow::Result;
use video_link_extractor::config::Config;
use video_link_extractor::utils::logging;
use video_link_extractor::{logger, orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::load()?;
    logging::log_startup(&config);

    // 启动服务
    orchestrator::serve(config).await
}
