//! 面板接收端 - 解析收到的帧并统计丢失/乱序
//!
//! 协议本身没有确认，接收端只能通过序号间隔推断丢包。

use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use mio::net::UdpSocket;
use mio::{Interest, Registry, Token};
use thiserror::Error;
use tracing::{debug, warn};

use crate::pusher::client::MAX_DIMENSION;
use crate::pusher::frame::{DecodedFrame, FrameError, decode_frame, frame_len};

/// 接收端错误类型
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("来自 {from} 的帧无效: {source}")]
    Frame {
        from: SocketAddr,
        #[source]
        source: FrameError,
    },
}

/// 单个序号相对于上一帧的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    First,
    InOrder,
    /// 中间丢失了 `lost` 帧
    Gap { lost: u32 },
    /// 重复或迟到的旧帧
    Stale,
    /// 发送端换了新客户端，序号重新从1开始
    Restart,
}

/// 序号跟踪器（按 2^32 取模比较）
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
    received: u64,
    lost: u64,
    stale: u64,
    restarts: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sequence: u32) -> SequenceEvent {
        self.received += 1;
        let Some(prev) = self.last else {
            self.last = Some(sequence);
            return SequenceEvent::First;
        };

        let delta = sequence.wrapping_sub(prev);
        let event = match delta {
            1 => SequenceEvent::InOrder,
            _ if sequence == 1 => SequenceEvent::Restart,
            d if d == 0 || d > u32::MAX / 2 => SequenceEvent::Stale,
            d => SequenceEvent::Gap { lost: d - 1 },
        };

        match event {
            SequenceEvent::Stale => self.stale += 1,
            SequenceEvent::Restart => {
                self.restarts += 1;
                self.last = Some(sequence);
            }
            SequenceEvent::Gap { lost } => {
                self.lost += u64::from(lost);
                self.last = Some(sequence);
            }
            _ => self.last = Some(sequence),
        }
        event
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            last_sequence: self.last,
            received: self.received,
            lost: self.lost,
            stale: self.stale,
            restarts: self.restarts,
        }
    }
}

/// 跟踪器统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    pub last_sequence: Option<u32>,
    pub received: u64,
    pub lost: u64,
    pub stale: u64,
    pub restarts: u64,
}

/// 接收帧的模拟面板
pub struct PanelMonitor {
    socket: UdpSocket,
    rows: usize,
    cols: usize,
    tracker: SequenceTracker,
    buf: Vec<u8>,
}

impl PanelMonitor {
    /// 绑定监听地址
    ///
    /// 行列数与发送端相同，必须在 [1, 1024] 之间。
    pub fn bind(addr: SocketAddr, rows: usize, cols: usize) -> io::Result<Self> {
        if !(1..=MAX_DIMENSION).contains(&rows) || !(1..=MAX_DIMENSION).contains(&cols) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("面板尺寸 {}x{} 超出范围 1..={}", cols, rows, MAX_DIMENSION),
            ));
        }
        let socket = UdpSocket::bind(addr)?;
        // 多留一个字节，用来识别超长数据报
        let buf = vec![0u8; frame_len(rows, cols) + 1];
        Ok(Self {
            socket,
            rows,
            cols,
            tracker: SequenceTracker::new(),
            buf,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.socket, token, Interest::READABLE)
    }

    /// 读取一个数据报；没有数据时返回 `Ok(None)`
    pub fn try_recv(&mut self) -> Result<Option<(DecodedFrame, SequenceEvent)>, MonitorError> {
        let (len, from) = match self.socket.recv_from(&mut self.buf) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let frame = decode_frame(&self.buf[..len], self.rows, self.cols)
            .map_err(|source| MonitorError::Frame { from, source })?;
        let event = self.tracker.observe(frame.sequence);
        match event {
            SequenceEvent::Gap { lost } => warn!("帧 {} 之前丢失 {} 帧", frame.sequence, lost),
            SequenceEvent::Stale => warn!("收到过期帧 {}", frame.sequence),
            SequenceEvent::Restart => debug!("发送端 {} 重新开始编号", from),
            _ => debug!("收到帧 {} 来自 {}", frame.sequence, from),
        }
        Ok(Some((frame, event)))
    }

    pub fn stats(&self) -> TrackerStats {
        self.tracker.stats()
    }
}
