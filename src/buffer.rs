//! 帧缓冲区模块 - 按字节序读写的可增长字节序列
//!
//! 尾部追加写入、头部消费读取，用于在不重复分配内存的前提下组装线上帧。
//! 底层使用 `bytes::BytesMut`，头部消费通过 `split_to` 完成，为 O(1) 操作。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// 缓冲区错误类型
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("缓冲区数据不足: 需要{needed}字节，当前{available}字节")]
    Underrun { needed: usize, available: usize },

    #[error("切片范围无效: [{start}, {end}) 超出长度{len}")]
    OutOfRange { start: usize, end: usize, len: usize },

    #[error("UTF-8解码失败: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// 字节序，在构造时固定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// 帧缓冲区
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
    order: ByteOrder,
}

impl FrameBuffer {
    /// 创建指定字节序的空缓冲区
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            order,
        }
    }

    /// 创建并预留容量
    pub fn with_capacity(order: ByteOrder, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            order,
        }
    }

    /// 以已有数据为初始内容创建缓冲区，用于解析收到的帧
    pub fn wrap(order: ByteOrder, data: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(data),
            order,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// 预留至少 `n` 字节的额外容量
    ///
    /// 在构建已知长度的帧之前调用，保证热路径上只分配一次。
    pub fn grow(&mut self, n: usize) {
        self.buf.reserve(n);
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 当前内容（不消费）
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// 转换为不可变的 `Bytes`，用于发送
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    // === 写入 ===

    pub fn put(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn put_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_u16(value),
            ByteOrder::LittleEndian => self.buf.put_u16_le(value),
        }
    }

    pub fn put_u32(&mut self, value: u32) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_u32(value),
            ByteOrder::LittleEndian => self.buf.put_u32_le(value),
        }
    }

    pub fn put_u64(&mut self, value: u64) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_u64(value),
            ByteOrder::LittleEndian => self.buf.put_u64_le(value),
        }
    }

    /// 以IEEE-754位模式写入
    pub fn put_f32(&mut self, value: f32) {
        self.put_u32(value.to_bits());
    }

    /// 以IEEE-754位模式写入
    pub fn put_f64(&mut self, value: f64) {
        self.put_u64(value.to_bits());
    }

    // === 读取（消费头部） ===

    fn ensure(&self, needed: usize) -> Result<(), BufferError> {
        if self.buf.len() < needed {
            return Err(BufferError::Underrun {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    /// 移除并返回头部 `n` 字节；数据不足时返回错误，缓冲区保持不变
    pub fn get(&mut self, n: usize) -> Result<Bytes, BufferError> {
        self.ensure(n)?;
        Ok(self.buf.split_to(n).freeze())
    }

    pub fn get_byte(&mut self) -> Result<Bytes, BufferError> {
        self.get(1)
    }

    pub fn get_short(&mut self) -> Result<Bytes, BufferError> {
        self.get(2)
    }

    pub fn get_float(&mut self) -> Result<Bytes, BufferError> {
        self.get(4)
    }

    pub fn get_double(&mut self) -> Result<Bytes, BufferError> {
        self.get(8)
    }

    pub fn get_u8(&mut self) -> Result<u8, BufferError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16, BufferError> {
        self.ensure(2)?;
        Ok(match self.order {
            ByteOrder::BigEndian => self.buf.get_u16(),
            ByteOrder::LittleEndian => self.buf.get_u16_le(),
        })
    }

    pub fn get_u32(&mut self) -> Result<u32, BufferError> {
        self.ensure(4)?;
        Ok(match self.order {
            ByteOrder::BigEndian => self.buf.get_u32(),
            ByteOrder::LittleEndian => self.buf.get_u32_le(),
        })
    }

    pub fn get_u64(&mut self) -> Result<u64, BufferError> {
        self.ensure(8)?;
        Ok(match self.order {
            ByteOrder::BigEndian => self.buf.get_u64(),
            ByteOrder::LittleEndian => self.buf.get_u64_le(),
        })
    }

    pub fn get_f32(&mut self) -> Result<f32, BufferError> {
        self.get_u32().map(f32::from_bits)
    }

    pub fn get_f64(&mut self) -> Result<f64, BufferError> {
        self.get_u64().map(f64::from_bits)
    }

    // === 转换辅助（不修改缓冲区） ===

    pub fn bytes_to_u16(&self, data: &[u8]) -> Result<u16, BufferError> {
        let raw = head::<2>(data)?;
        Ok(match self.order {
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
        })
    }

    pub fn bytes_to_u32(&self, data: &[u8]) -> Result<u32, BufferError> {
        let raw = head::<4>(data)?;
        Ok(match self.order {
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
        })
    }

    pub fn bytes_to_u64(&self, data: &[u8]) -> Result<u64, BufferError> {
        let raw = head::<8>(data)?;
        Ok(match self.order {
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
        })
    }

    pub fn str_to_bytes<'a>(&self, data: &'a str) -> &'a [u8] {
        data.as_bytes()
    }

    pub fn bytes_to_str<'a>(&self, data: &'a [u8]) -> Result<&'a str, BufferError> {
        Ok(std::str::from_utf8(data)?)
    }

    // === 整体操作 ===

    /// 原地反转全部字节
    pub fn flip(&mut self) {
        self.buf.reverse();
    }

    /// 截取半开区间 `[start, end)`，其余内容丢弃
    ///
    /// `start > end` 或 `end` 超出当前长度时返回错误，缓冲区保持不变。
    pub fn slice(&mut self, start: usize, end: usize) -> Result<(), BufferError> {
        let len = self.buf.len();
        if start > end || end > len {
            return Err(BufferError::OutOfRange { start, end, len });
        }
        self.buf.truncate(end);
        self.buf.advance(start);
        Ok(())
    }

    /// 清空内容，保留字节序
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

fn head<const N: usize>(data: &[u8]) -> Result<[u8; N], BufferError> {
    data.get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or(BufferError::Underrun {
            needed: N,
            available: data.len(),
        })
}
