//! 运行配置 - 命令行参数与环境变量

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::pusher::Network;
use crate::pusher::client::MAX_DIMENSION;

/// 配置错误类型
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} 必须在 1..={max} 之间, 实际为 {value}")]
    Dimension {
        name: &'static str,
        value: usize,
        max: usize,
    },

    #[error("{0} 不能为0")]
    ZeroInterval(&'static str),

    #[error("面板地址不能为空")]
    EmptyAddress,
}

/// 面板推送程序配置
///
/// 每个参数都可以用同名环境变量提供，命令行优先。
#[derive(Debug, Clone, Parser)]
#[command(name = "panel-server", version, about = "向LED矩阵面板推送时钟、日程和行情")]
pub struct PanelConfig {
    /// 输出调试日志
    #[arg(long, env = "PANEL_DEBUG")]
    pub debug: bool,

    /// 面板行数
    #[arg(long, env = "PANEL_ROWS")]
    pub rows: usize,

    /// 面板列数
    #[arg(long, env = "PANEL_COLS")]
    pub cols: usize,

    /// 面板地址，省略端口时使用5078
    #[arg(long, env = "PANEL_ADDRESS")]
    pub address: String,

    /// 地址族
    #[arg(long, env = "PANEL_NETWORK", value_enum, default_value_t = Network::Udp)]
    pub network: Network,

    /// 调度器服务周期（毫秒）
    #[arg(long, env = "PANEL_TICK_MS", default_value_t = 1000)]
    pub tick_ms: u64,

    /// 画面刷新间隔（秒）
    #[arg(long, env = "PANEL_DISPLAY_SECS", default_value_t = 5)]
    pub display_secs: u64,

    /// 日程和行情的拉取间隔（秒）
    #[arg(long, env = "PANEL_REFRESH_SECS", default_value_t = 300)]
    pub refresh_secs: u64,

    /// 日程JSON文件
    #[arg(long, env = "PANEL_CALENDAR_FILE")]
    pub calendar_file: Option<PathBuf>,

    /// 行情JSON文件
    #[arg(long, env = "PANEL_MARKET_FILE")]
    pub market_file: Option<PathBuf>,
}

impl PanelConfig {
    /// 在注册任何任务之前检查配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("rows", self.rows), ("cols", self.cols)] {
            if !(1..=MAX_DIMENSION).contains(&value) {
                return Err(ConfigError::Dimension {
                    name,
                    value,
                    max: MAX_DIMENSION,
                });
            }
        }
        for (name, value) in [
            ("tick-ms", self.tick_ms),
            ("display-secs", self.display_secs),
            ("refresh-secs", self.refresh_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_secs(self.display_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}
