/// 8位RGBA像素，编码时丢弃alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// 行优先的固定尺寸像素图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    rows: usize,
    cols: usize,
    pixels: Vec<Rgba>,
}

impl PixelImage {
    /// 全黑图像
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, Rgba::BLACK)
    }

    pub fn filled(rows: usize, cols: usize, color: Rgba) -> Self {
        Self {
            rows,
            cols,
            pixels: vec![color; rows * cols],
        }
    }

    /// 按 (x, y) 逐点生成
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> Rgba) -> Self {
        let mut pixels = Vec::with_capacity(rows * cols);
        for y in 0..rows {
            for x in 0..cols {
                pixels.push(f(x, y));
            }
        }
        Self { rows, cols, pixels }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Rgba> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        Some(self.pixels[y * self.cols + x])
    }

    /// 越界写入被忽略（绘图裁剪）
    pub fn set(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x as usize >= self.cols || y as usize >= self.rows {
            return;
        }
        self.pixels[y as usize * self.cols + x as usize] = color;
    }

    pub fn row(&self, y: usize) -> &[Rgba] {
        &self.pixels[y * self.cols..(y + 1) * self.cols]
    }

    pub fn fill(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }
}
