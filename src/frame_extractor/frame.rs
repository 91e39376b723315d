use crate::core::ExtractError;
use image::{DynamicImage, GrayImage, RgbaImage};
use rayon::prelude::*;
use std::time::Duration;

/// 帧数据结构
///
/// One decoded RGBA raster sampled from the video. Frames are never mutated
/// after construction; the engine keeps at most one of them (the last slide).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    /// Builds a frame from packed RGBA bytes, checking the buffer length.
    pub fn from_rgba(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Duration,
        frame_number: u64,
    ) -> Result<Self, ExtractError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(ExtractError::Decode {
                timestamp: timestamp.as_secs_f64(),
                reason: format!(
                    "expected {} RGBA bytes for {}x{}, got {}",
                    expected,
                    width,
                    height,
                    data.len()
                ),
            });
        }

        Ok(Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        })
    }

    /// A frame filled with a single colour, mostly useful for scripted sources.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], timestamp: Duration) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data,
            timestamp,
            frame_number: 0,
        }
    }

    pub fn from_image(image: &DynamicImage, timestamp: Duration) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
            timestamp,
            frame_number: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }

    /// BT.601 luma, one byte per pixel.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .par_chunks_exact(4)
            .map(|rgba| {
                let r = rgba[0] as u32;
                let g = rgba[1] as u32;
                let b = rgba[2] as u32;
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            })
            .collect()
    }

    pub fn to_luma_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.luma())
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Block-average luminance grid (下采样亮度网格).
///
/// The frame is split into `cols x rows` near-equal blocks and every block is
/// reduced to its mean luma. Frames smaller than the grid reuse pixels so every
/// cell always covers at least one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaGrid {
    pub cols: usize,
    pub rows: usize,
    pub cells: Vec<f32>,
}

impl LumaGrid {
    pub fn from_frame(frame: &Frame, cols: usize, rows: usize) -> Self {
        Self::from_luma(&frame.luma(), frame.width as usize, frame.height as usize, cols, rows)
    }

    pub fn from_luma(luma: &[u8], width: usize, height: usize, cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut cells = Vec::with_capacity(cols * rows);

        for by in 0..rows {
            let (y_start, y_end) = Self::span(by, rows, height);
            for bx in 0..cols {
                let (x_start, x_end) = Self::span(bx, cols, width);

                let mut block_sum = 0u64;
                let mut count = 0u64;
                for py in y_start..y_end {
                    let row_start = py * width;
                    for px in x_start..x_end {
                        if let Some(&v) = luma.get(row_start + px) {
                            block_sum += v as u64;
                            count += 1;
                        }
                    }
                }

                let avg = if count > 0 {
                    block_sum as f32 / count as f32
                } else {
                    0.0
                };
                cells.push(avg);
            }
        }

        Self { cols, rows, cells }
    }

    /// Pixel range covered by block `index` of `parts` over `len` pixels.
    fn span(index: usize, parts: usize, len: usize) -> (usize, usize) {
        if len == 0 {
            return (0, 0);
        }
        let start = (index * len / parts).min(len - 1);
        let end = ((index + 1) * len / parts).max(start + 1).min(len);
        (start, end)
    }

    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.cells[row * self.cols + col]
    }
}
