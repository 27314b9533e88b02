use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::pusher::frame::{encode_frame, frame_len};
use crate::pusher::image::PixelImage;

/// 未指定端口时使用的面板端口
pub const DEFAULT_PORT: u16 = 5078;

/// 行列数上限
pub const MAX_DIMENSION: usize = 1024;

/// 单个UDP数据报的最大负载
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// 面板客户端错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("行数超出范围: {0} (必须在1...1024之间)")]
    RowsOutOfRange(usize),

    #[error("列数超出范围: {0} (必须在1...1024之间)")]
    ColsOutOfRange(usize),

    #[error("图像尺寸 {rows}x{cols} 与面板尺寸 {panel_rows}x{panel_cols} 不一致")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        panel_rows: usize,
        panel_cols: usize,
    },

    #[error("帧长度{0}字节超出单个数据报上限")]
    FrameTooLarge(usize),

    #[error("地址解析失败 {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("地址 {0} 没有可用的{1:?}地址")]
    NoAddress(String, Network),

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("数据报只写入{written}/{expected}字节")]
    ShortWrite { written: usize, expected: usize },
}

/// 对端地址族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Network {
    /// 任意地址族
    #[default]
    Udp,
    Udp4,
    Udp6,
}

impl Network {
    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Network::Udp => true,
            Network::Udp4 => addr.is_ipv4(),
            Network::Udp6 => addr.is_ipv6(),
        }
    }
}

/// LED矩阵面板客户端
///
/// 持有一个连接到面板的阻塞UDP套接字（首次发送时懒打开），每次发送一帧完整图像。
/// 不做确认、重传或分片；失败直接返回给调用方，由下一次周期发送自然重试。
pub struct PanelClient {
    network: Network,
    address: String,
    rows: usize,
    cols: usize,
    socket: Option<UdpSocket>,
    sequence: u32,
}

impl PanelClient {
    /// 创建新的面板客户端
    ///
    /// 行数、列数都必须在 [1, 1024] 之间。行号只有一个字节，
    /// 超过256行的面板行号会按 256 取模。
    pub fn new(
        network: Network,
        address: impl Into<String>,
        rows: usize,
        cols: usize,
    ) -> Result<Self, ClientError> {
        if !(1..=MAX_DIMENSION).contains(&rows) {
            return Err(ClientError::RowsOutOfRange(rows));
        }
        if !(1..=MAX_DIMENSION).contains(&cols) {
            return Err(ClientError::ColsOutOfRange(cols));
        }
        if rows > 256 {
            warn!("面板行数 {} 超过256，行号将按256取模编码", rows);
        }

        Ok(Self {
            network,
            address: address.into(),
            rows,
            cols,
            socket: None,
            sequence: 1,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// 下一帧将使用的序号
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// 建立连接（已连接时直接复用）
    pub fn connect(&mut self) -> Result<&UdpSocket, ClientError> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => self.open()?,
        };
        Ok(self.socket.insert(socket))
    }

    fn open(&mut self) -> Result<UdpSocket, ClientError> {
        self.address = with_default_port(&self.address);
        let peer = self.resolve()?;

        // 按对端地址族绑定本地任意地址
        let bind_addr = match peer {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(peer)?;

        info!("连接到面板 {} 从 {}", peer, socket.local_addr()?);
        Ok(socket)
    }

    fn resolve(&self) -> Result<SocketAddr, ClientError> {
        let addrs = self
            .address
            .to_socket_addrs()
            .map_err(|source| ClientError::Resolve {
                address: self.address.clone(),
                source,
            })?;

        let network = self.network;
        addrs
            .into_iter()
            .find(|a| network.accepts(a))
            .ok_or_else(|| ClientError::NoAddress(self.address.clone(), network))
    }

    /// 发送一帧图像
    ///
    /// # 返回
    /// * `Ok(usize)` - 写入的字节数，等于 `4 + rows·(1 + 3·cols)`
    /// * `Err(ClientError)` - 尺寸、解析、连接或写入失败；不会内部重试
    pub fn send_image(&mut self, image: &PixelImage) -> Result<usize, ClientError> {
        if image.rows() != self.rows || image.cols() != self.cols {
            return Err(ClientError::DimensionMismatch {
                rows: image.rows(),
                cols: image.cols(),
                panel_rows: self.rows,
                panel_cols: self.cols,
            });
        }
        let expected = frame_len(self.rows, self.cols);
        if expected > MAX_DATAGRAM_SIZE {
            return Err(ClientError::FrameTooLarge(expected));
        }

        self.connect()?;

        let sequence = self.sequence;
        self.sequence = sequence.wrapping_add(1);
        let frame = encode_frame(sequence, image);
        trace!("帧头 {}", hex::encode(&frame.as_bytes()[..5]));

        let socket = self.connect()?;
        if let Err(e) = set_send_buffer_size(socket, frame.len()) {
            warn!("设置发送缓冲区失败: {}", e);
        }

        let written = socket.send(frame.as_bytes())?;
        if written != frame.len() {
            return Err(ClientError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }

        debug!("已发送帧 {} ({} 字节)", sequence, written);
        Ok(written)
    }

    /// 关闭套接字；下一次发送会重新连接
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("已关闭面板连接 {}", self.address);
        }
    }
}

/// 地址中没有端口时补上默认端口
fn with_default_port(address: &str) -> String {
    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    if address.starts_with('[') && address.ends_with(']') {
        return format!("{address}:{DEFAULT_PORT}");
    }
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    }
}

// 发送缓冲区只容纳一帧，阻塞套接字在上一帧排出前等待
fn set_send_buffer_size(socket: &UdpSocket, size: usize) -> io::Result<()> {
    rustix::net::sockopt::set_socket_send_buffer_size(socket, size)?;
    Ok(())
}
