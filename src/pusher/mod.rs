//! 像素推送模块 - 通过UDP向LED矩阵面板发送原始像素帧

/// 像素图像
pub mod image;

/// 帧编解码
pub mod frame;

/// 面板客户端（发送端）
pub mod client;

/// 模拟面板（接收端）
pub mod monitor;

// 重新导出公共类型
pub use client::{ClientError, DEFAULT_PORT, Network, PanelClient};
pub use frame::{DecodedFrame, FrameError, decode_frame, encode_frame, frame_len};
pub use image::{PixelImage, Rgba};
pub use monitor::{MonitorError, PanelMonitor, SequenceEvent, SequenceTracker, TrackerStats};
