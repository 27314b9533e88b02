//! Matrix Panel - LED矩阵面板像素推送核心库

/// 字节缓冲区
pub mod buffer;

/// 周期任务调度
pub mod cron;

/// 像素帧推送
pub mod pusher;

/// 面板应用（日程、行情、渲染）
pub mod panel;

/// 驱动循环
pub mod runner;

/// 运行配置
pub mod config;

/// 重新导出常用类型
pub use buffer::{BufferError, ByteOrder, FrameBuffer};
pub use config::{ConfigError, PanelConfig};
pub use cron::{Handle, ScheduleError, Scheduler};
pub use pusher::{ClientError, Network, PanelClient, PixelImage, Rgba};
pub use runner::{LoopStats, ShutdownHandle, TickLoop};

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 日志系统
pub mod logging;
