//! 像素帧编解码模块
//!
//! 一帧对应一个UDP数据报，没有校验和、没有长度字段，总长度由双方约定的行列数推出。
//!
//! 格式: [4字节序号][行号(1字节)][RGB × cols] ... 逐行重复
//! 序号: 小端序32位无符号整数，按 2^32 取模回绕
//! 行号: 单字节，行数超过256时按 row mod 256 编码

use thiserror::Error;

use crate::buffer::{BufferError, ByteOrder, FrameBuffer};
use crate::pusher::image::{PixelImage, Rgba};

/// 序号字段长度
pub const SEQUENCE_LEN: usize = 4;

/// 帧解析错误类型
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("帧长度不符: 期望{expected}字节，实际{actual}字节")]
    Length { expected: usize, actual: usize },

    #[error("行号不符: 期望{expected}，实际{actual}")]
    RowIndex { expected: u8, actual: u8 },

    #[error("缓冲区错误: {0}")]
    Buffer(#[from] BufferError),
}

/// 计算帧长度: `4 + rows·(1 + 3·cols)`
pub fn frame_len(rows: usize, cols: usize) -> usize {
    SEQUENCE_LEN + rows * (1 + 3 * cols)
}

/// 将图像编码为一帧
///
/// # 参数
/// * `sequence` - 本帧序号
/// * `image` - 要发送的图像
///
/// # 返回
/// * `FrameBuffer` - 一次性预留好容量的帧数据
pub fn encode_frame(sequence: u32, image: &PixelImage) -> FrameBuffer {
    let mut buf = FrameBuffer::new(ByteOrder::LittleEndian);
    // 一次性分配，避免逐行扩容
    buf.grow(frame_len(image.rows(), image.cols()));

    buf.put_u32(sequence);
    for y in 0..image.rows() {
        buf.put_byte(y as u8);
        for p in image.row(y) {
            buf.put(&[p.r, p.g, p.b]);
        }
    }
    buf
}

/// 解析出的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub sequence: u32,
    pub image: PixelImage,
}

/// 按约定的行列数解析一帧
///
/// 长度必须精确等于 [`frame_len`]，每行的行号必须与位置一致（按 256 取模）。
pub fn decode_frame(data: &[u8], rows: usize, cols: usize) -> Result<DecodedFrame, FrameError> {
    let expected = frame_len(rows, cols);
    if data.len() != expected {
        return Err(FrameError::Length {
            expected,
            actual: data.len(),
        });
    }

    let mut buf = FrameBuffer::wrap(ByteOrder::LittleEndian, data);

    let sequence = buf.get_u32()?;
    let mut image = PixelImage::new(rows, cols);
    for y in 0..rows {
        let index = buf.get_u8()?;
        if index != y as u8 {
            return Err(FrameError::RowIndex {
                expected: y as u8,
                actual: index,
            });
        }
        let row = buf.get(3 * cols)?;
        for (x, rgb) in row.chunks_exact(3).enumerate() {
            image.set(x as i64, y as i64, Rgba::rgb(rgb[0], rgb[1], rgb[2]));
        }
    }

    Ok(DecodedFrame { sequence, image })
}
