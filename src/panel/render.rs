//! 画面渲染 - 时钟与文字
//!
//! 只实现面板需要的最小绘图能力：实心圆、1像素直线、5x7点阵文字。

use chrono::{NaiveTime, Timelike};

use crate::panel::font::{ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH, glyph};
use crate::pusher::image::{PixelImage, Rgba};

/// 时钟表盘边长（像素），贴在面板右侧
pub const CLOCK_SIZE: usize = 32;

/// 两行文字的行距
pub const LINE_SPACING: usize = 16;

const CLOCK_LINE_CHARS: usize = 12;
const MARKET_LINE_CHARS: usize = 16;

const MINUTE_HAND: Rgba = Rgba::rgb(0, 0, 127);
const HOUR_HAND: Rgba = Rgba::rgb(0, 90, 127);

/// 一次渲染所需的全部内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scene {
    Clock { lines: [String; 2], time: NaiveTime },
    Market { lines: [String; 2] },
}

/// 渲染器：把画面内容变成固定尺寸的像素图
pub trait Renderer: Send {
    fn render(&self, scene: &Scene) -> PixelImage;
}

/// 内置渲染器
pub struct BasicRenderer {
    rows: usize,
    cols: usize,
}

impl BasicRenderer {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }
}

impl Renderer for BasicRenderer {
    fn render(&self, scene: &Scene) -> PixelImage {
        let mut img = PixelImage::new(self.rows, self.cols);
        match scene {
            Scene::Clock { lines, time } => {
                let size = CLOCK_SIZE as f64;
                draw_clock(&mut img, self.cols as f64 - size, 0.0, size, *time);
                draw_lines(&mut img, lines, CLOCK_LINE_CHARS);
            }
            Scene::Market { lines } => draw_lines(&mut img, lines, MARKET_LINE_CHARS),
        }
        img
    }
}

fn draw_lines(img: &mut PixelImage, lines: &[String; 2], max_chars: usize) {
    // 在16像素行内垂直居中
    let inset = (LINE_SPACING - GLYPH_HEIGHT) / 2;
    for (i, line) in lines.iter().enumerate() {
        let y = (i * LINE_SPACING + inset) as i64;
        draw_text(img, 0, y, line, max_chars, Rgba::WHITE);
    }
}

/// 绘制文字，最多 `max_chars` 个字符
pub fn draw_text(img: &mut PixelImage, x: i64, y: i64, text: &str, max_chars: usize, color: Rgba) {
    for (i, c) in text.chars().take(max_chars).enumerate() {
        let ox = x + (i * ADVANCE) as i64;
        for (dy, bits) in glyph(c).iter().enumerate() {
            for dx in 0..GLYPH_WIDTH {
                if bits & (0x10 >> dx) != 0 {
                    img.set(ox + dx as i64, y + dy as i64, color);
                }
            }
        }
    }
}

/// 在左上角 (x, y)、边长 `size` 的正方形内绘制指针式时钟
pub fn draw_clock(img: &mut PixelImage, x: f64, y: f64, size: f64, time: NaiveTime) {
    let r = size / 2.0;
    let (cx, cy) = (x + r, y + r);

    fill_circle(img, cx, cy, r, Rgba::WHITE);
    fill_circle(img, cx, cy, r * 0.95, Rgba::BLACK);

    let minute = hand_end(minute_angle(time.minute()), cx, cy, r * 0.90);
    draw_line(img, (cx, cy), minute, MINUTE_HAND);

    let hour = hand_end(hour_angle(time.hour(), time.minute()), cx, cy, r * 0.55);
    draw_line(img, (cx, cy), hour, HOUR_HAND);
}

fn minute_angle(minute: u32) -> f64 {
    (minute as f64 * 6.0 - 90.0).to_radians()
}

fn hour_angle(hour: u32, minute: u32) -> f64 {
    (((hour % 12) as f64 + minute as f64 / 60.0) * 30.0 - 90.0).to_radians()
}

fn hand_end(theta: f64, cx: f64, cy: f64, radius: f64) -> (f64, f64) {
    (cx + radius * theta.cos(), cy + radius * theta.sin())
}

fn fill_circle(img: &mut PixelImage, cx: f64, cy: f64, r: f64, color: Rgba) {
    let (x0, x1) = ((cx - r).floor() as i64, (cx + r).ceil() as i64);
    let (y0, y1) = ((cy - r).floor() as i64, (cy + r).ceil() as i64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= r * r {
                img.set(x, y, color);
            }
        }
    }
}

// Bresenham
fn draw_line(img: &mut PixelImage, from: (f64, f64), to: (f64, f64), color: Rgba) {
    let (mut x, mut y) = (from.0.round() as i64, from.1.round() as i64);
    let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        img.set(x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
