use std::io;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// 初始化 tracing 日志系统（控制台输出）
///
/// 设置了 `RUST_LOG` 时以它为准，否则调试模式为 debug、平时为 info。
/// 调试模式输出到 stdout，平时输出到 stderr。重复调用不会 panic。
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = if debug {
        BoxMakeWriter::new(io::stdout)
    } else {
        BoxMakeWriter::new(io::stderr)
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!("日志系统初始化完成");
    }
}
