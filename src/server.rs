use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use matrix_panel::config::PanelConfig;
use matrix_panel::cron::Scheduler;
use matrix_panel::logging::init;
use matrix_panel::panel::{
    self, BasicRenderer, CalendarSource, JsonFileCalendar, JsonFileMarket, MarketSource,
    Unconfigured,
};
use matrix_panel::runner::TickLoop;

fn calendar_source(config: &PanelConfig) -> Box<dyn CalendarSource> {
    match &config.calendar_file {
        Some(path) => Box::new(JsonFileCalendar::new(path)),
        None => {
            warn!("未配置日程文件, 面板将显示兜底内容");
            Box::new(Unconfigured("PANEL_CALENDAR_FILE"))
        }
    }
}

fn market_source(config: &PanelConfig) -> Box<dyn MarketSource> {
    match &config.market_file {
        Some(path) => Box::new(JsonFileMarket::new(path)),
        None => {
            warn!("未配置行情文件, 行情画面将保持空白");
            Box::new(Unconfigured("PANEL_MARKET_FILE"))
        }
    }
}

fn main() -> ExitCode {
    let config = PanelConfig::parse();

    // 日志系统初始化
    init(config.debug);

    if let Err(e) = config.validate() {
        error!("配置无效: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        "matrix-panel {} 启动: 面板 {}x{} @ {} ({:?})",
        matrix_panel::VERSION,
        config.cols,
        config.rows,
        config.address,
        config.network
    );

    let scheduler = Scheduler::new();
    let renderer = Box::new(BasicRenderer::new(config.rows, config.cols));
    if let Err(e) = panel::install(
        &scheduler,
        &config,
        calendar_source(&config),
        market_source(&config),
        renderer,
    ) {
        error!("注册任务失败: {}", e);
        return ExitCode::FAILURE;
    }

    let mut ticker = match TickLoop::new(config.tick_period()) {
        Ok(ticker) => ticker,
        Err(e) => {
            error!("创建驱动循环失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ticker.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("收到停止信号");
        shutdown.shutdown();
    }) {
        error!("注册信号处理失败: {}", e);
        return ExitCode::FAILURE;
    }

    match ticker.run(&scheduler) {
        Ok(_) => {
            info!("正常退出");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("驱动循环异常: {}", e);
            ExitCode::FAILURE
        }
    }
}
