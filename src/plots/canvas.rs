//! RGBA raster canvas with simple drawing primitives and PNG output

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::font::{glyph, ADVANCE, GLYPH_WIDTH};
use crate::errors::Result;

pub type Color = [u8; 4];

pub const WHITE: Color = [255, 255, 255, 255];
pub const BLACK: Color = [0, 0, 0, 255];
/// Land and missing-data fill.
pub const LAND: Color = [204, 204, 204, 255];
pub const GRID: Color = [128, 128, 128, 255];

/// Axis-aligned pixel rectangle, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    clip: Option<Rect>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, background: Color) -> Self {
        let pixels = background
            .iter()
            .copied()
            .cycle()
            .take(width * height * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
            clip: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Restrict drawing to `rect`; `None` lifts the restriction.
    pub fn set_clip(&mut self, rect: Option<Rect>) {
        self.clip = rect;
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn put(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        if let Some(clip) = &self.clip {
            if !clip.contains(x as f64, y as f64) {
                return;
            }
        }
        let i = (y as usize * self.width + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&color);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        for y in rect.y0.round() as i64..rect.y1.round() as i64 {
            for x in rect.x0.round() as i64..rect.x1.round() as i64 {
                self.put(x, y, color);
            }
        }
    }

    pub fn stroke_rect(&mut self, rect: Rect, color: Color) {
        let (x0, y0, x1, y1) = (rect.x0, rect.y0, rect.x1 - 1.0, rect.y1 - 1.0);
        self.line(x0, y0, x1, y0, color);
        self.line(x1, y0, x1, y1, color);
        self.line(x1, y1, x0, y1, color);
        self.line(x0, y1, x0, y0, color);
    }

    /// Bresenham line between two points.
    pub fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color) {
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return;
        }
        let (mut x, mut y) = (x0.round() as i64, y0.round() as i64);
        let (xe, ye) = (x1.round() as i64, y1.round() as i64);
        let dx = (xe - x).abs();
        let dy = -(ye - y).abs();
        let sx = if x < xe { 1 } else { -1 };
        let sy = if y < ye { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x, y, color);
            if x == xe && y == ye {
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

    pub fn polyline(&mut self, points: &[(f64, f64)], color: Color) {
        for pair in points.windows(2) {
            self.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, color);
        }
    }

    /// Even-odd scanline fill, sampling pixel centres.
    pub fn fill_polygon(&mut self, points: &[(f64, f64)], color: Color) {
        if points.len() < 3 || points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return;
        }
        let y_min = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor() as i64;
        let y_max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil() as i64;

        let mut crossings = Vec::with_capacity(4);
        for y in y_min..=y_max {
            let sy = y as f64 + 0.5;
            crossings.clear();
            for i in 0..points.len() {
                let (ax, ay) = points[i];
                let (bx, by) = points[(i + 1) % points.len()];
                if (ay <= sy && by > sy) || (by <= sy && ay > sy) {
                    crossings.push(ax + (sy - ay) / (by - ay) * (bx - ax));
                }
            }
            crossings.sort_by(f64::total_cmp);
            for span in crossings.chunks_exact(2) {
                let start = (span[0] - 0.5).ceil() as i64;
                let end = (span[1] - 0.5).floor() as i64;
                for x in start..=end {
                    self.put(x, y, color);
                }
            }
        }
    }

    /// Draw `text` with its top-left corner at `(x, y)`.
    pub fn text(&mut self, x: f64, y: f64, text: &str, scale: usize, color: Color) {
        let (x0, y0) = (x.round() as i64, y.round() as i64);
        let s = scale as i64;
        for (n, c) in text.chars().enumerate() {
            let gx = x0 + (n * ADVANCE * scale) as i64;
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..s {
                        for dx in 0..s {
                            self.put(gx + col as i64 * s + dx, y0 + row as i64 * s + dy, color);
                        }
                    }
                }
            }
        }
    }

    /// Encode the canvas as an 8-bit RGBA PNG at `path`.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        let mut encoder = png::Encoder::new(writer, self.width as u32, self.height as u32);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_fill_covers_interior_only() {
        let mut canvas = Canvas::new(10, 10, WHITE);
        canvas.fill_polygon(&[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)], BLACK);
        assert_eq!(canvas.pixel(5, 5), Some(BLACK));
        assert_eq!(canvas.pixel(1, 1), Some(WHITE));
        assert_eq!(canvas.pixel(9, 9), Some(WHITE));
    }

    #[test]
    fn clip_blocks_drawing_outside() {
        let mut canvas = Canvas::new(10, 10, WHITE);
        canvas.set_clip(Some(Rect {
            x0: 0.0,
            y0: 0.0,
            x1: 5.0,
            y1: 10.0,
        }));
        canvas.line(0.0, 5.0, 9.0, 5.0, BLACK);
        assert_eq!(canvas.pixel(4, 5), Some(BLACK));
        assert_eq!(canvas.pixel(6, 5), Some(WHITE));
    }
}
