use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use mio::{Events, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use matrix_panel::logging::init;
use matrix_panel::pusher::client::MAX_DIMENSION;
use matrix_panel::pusher::{MonitorError, PanelMonitor};

const SOCKET: Token = Token(0);
const WAKER: Token = Token(1);

/// 模拟LED面板：接收像素帧并统计丢包
#[derive(Debug, Parser)]
#[command(name = "panel-monitor", version)]
struct Args {
    /// 监听地址
    #[arg(long, env = "PANEL_MONITOR_BIND", default_value = "0.0.0.0:5078")]
    bind: SocketAddr,

    /// 面板行数
    #[arg(long, env = "PANEL_ROWS")]
    rows: usize,

    /// 面板列数
    #[arg(long, env = "PANEL_COLS")]
    cols: usize,

    /// 统计输出间隔（秒）
    #[arg(long, default_value_t = 30)]
    report_secs: u64,

    /// 输出调试日志
    #[arg(long, env = "PANEL_DEBUG")]
    debug: bool,
}

fn run(args: &Args) -> std::io::Result<()> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(64);

    let mut monitor = PanelMonitor::bind(args.bind, args.rows, args.cols)?;
    monitor.register(poll.registry(), SOCKET)?;

    let waker = Waker::new(poll.registry(), WAKER)?;
    if let Err(e) = ctrlc::set_handler(move || {
        if let Err(e) = waker.wake() {
            warn!("唤醒事件循环失败: {}", e);
        }
    }) {
        return Err(std::io::Error::other(e));
    }

    info!(
        "监听 {} 等待 {}x{} 的帧",
        monitor.local_addr()?,
        args.cols,
        args.rows
    );

    let report = Duration::from_secs(args.report_secs.max(1));
    let mut next_report = Instant::now() + report;

    'outer: loop {
        let timeout = next_report.saturating_duration_since(Instant::now());
        if let Err(e) = poll.poll(&mut events, Some(timeout)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            match event.token() {
                WAKER => {
                    info!("收到停止信号");
                    break 'outer;
                }
                SOCKET => loop {
                    match monitor.try_recv() {
                        Ok(Some((frame, event))) => {
                            debug!("帧 {} {:?}", frame.sequence, event);
                        }
                        Ok(None) => break,
                        Err(MonitorError::Frame { from, source }) => {
                            warn!("丢弃来自 {} 的无效帧: {}", from, source);
                        }
                        Err(MonitorError::Io(e)) => return Err(e),
                    }
                },
                _ => {}
            }
        }

        if Instant::now() >= next_report {
            let stats = monitor.stats();
            info!(
                "已接收 {} 帧, 丢失 {}, 过期 {}, 发送端重启 {}",
                stats.received, stats.lost, stats.stale, stats.restarts
            );
            next_report += report;
        }
    }

    let stats = monitor.stats();
    info!(
        "正常退出: 共接收 {} 帧, 丢失 {}",
        stats.received, stats.lost
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // 日志系统初始化
    init(args.debug);

    for (name, value) in [("rows", args.rows), ("cols", args.cols)] {
        if !(1..=MAX_DIMENSION).contains(&value) {
            error!("配置无效: {} 必须在 1..={} 之间, 实际为 {}", name, MAX_DIMENSION, value);
            return ExitCode::FAILURE;
        }
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("监听失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
