//! Frame similarity scoring.
//!
//! Every comparator maps two same-sized frames to a score in `[0, 1]`, where
//! `1.0` means identical. Scores are symmetric and an identical pair always
//! scores exactly `1.0`.

use super::frame::{Frame, LumaGrid};
use crate::core::ExtractError;
use image::imageops::{self, FilterType};
use rustdct::{Dct2, DctPlanner, TransformType2And3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub trait FrameComparator: Send + Sync {
    fn similarity(&self, a: &Frame, b: &Frame) -> Result<f64, ExtractError>;

    fn name(&self) -> &'static str;
}

fn ensure_same_dimensions(a: &Frame, b: &Frame) -> Result<(), ExtractError> {
    if a.dimensions() != b.dimensions() {
        return Err(ExtractError::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(())
}

/// Comparator selection, shared by the config file and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorKind {
    #[default]
    Structural,
    #[value(name = "phash")]
    #[serde(rename = "phash")]
    PerceptualHash,
}

impl ComparatorKind {
    pub fn build(self) -> Box<dyn FrameComparator> {
        match self {
            ComparatorKind::Structural => Box::new(StructuralComparator::new()),
            ComparatorKind::PerceptualHash => Box::new(PerceptualHashComparator::new()),
        }
    }
}

impl fmt::Display for ComparatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparatorKind::Structural => write!(f, "structural"),
            ComparatorKind::PerceptualHash => write!(f, "phash"),
        }
    }
}

/// SSIM 结构相似度 over a block-averaged luminance grid.
///
/// Downsampling first makes the score insensitive to compression noise while
/// text and layout changes still move the local means and variances.
pub struct StructuralComparator {
    grid_cols: usize,
    grid_rows: usize,
    window: usize,
}

impl StructuralComparator {
    const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
    const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

    pub fn new() -> Self {
        Self {
            grid_cols: 64,
            grid_rows: 64,
            window: 8,
        }
    }

    pub fn with_grid(grid_cols: usize, grid_rows: usize, window: usize) -> Self {
        let window = window.max(1);
        Self {
            grid_cols: grid_cols.max(window),
            grid_rows: grid_rows.max(window),
            window,
        }
    }

    pub fn grid_score(&self, a: &LumaGrid, b: &LumaGrid) -> f64 {
        if a.cells == b.cells {
            return 1.0;
        }

        let win = self.window;
        let mut total = 0.0f64;
        let mut windows = 0usize;

        for wy in (0..a.rows).step_by(win) {
            for wx in (0..a.cols).step_by(win) {
                let y_end = (wy + win).min(a.rows);
                let x_end = (wx + win).min(a.cols);
                total += Self::window_ssim(a, b, wx..x_end, wy..y_end);
                windows += 1;
            }
        }

        if windows == 0 {
            return 1.0;
        }
        (total / windows as f64).clamp(0.0, 1.0)
    }

    fn window_ssim(
        a: &LumaGrid,
        b: &LumaGrid,
        xs: std::ops::Range<usize>,
        ys: std::ops::Range<usize>,
    ) -> f64 {
        let n = (xs.len() * ys.len()) as f64;
        let (mut sum_a, mut sum_b) = (0.0f64, 0.0f64);
        for y in ys.clone() {
            for x in xs.clone() {
                sum_a += a.get(x, y) as f64;
                sum_b += b.get(x, y) as f64;
            }
        }
        let mean_a = sum_a / n;
        let mean_b = sum_b / n;

        let (mut var_a, mut var_b, mut cov) = (0.0f64, 0.0f64, 0.0f64);
        for y in ys {
            for x in xs.clone() {
                let da = a.get(x, y) as f64 - mean_a;
                let db = b.get(x, y) as f64 - mean_b;
                var_a += da * da;
                var_b += db * db;
                cov += da * db;
            }
        }
        var_a /= n;
        var_b /= n;
        cov /= n;

        let numerator = (2.0 * mean_a * mean_b + Self::C1) * (2.0 * cov + Self::C2);
        let denominator =
            (mean_a * mean_a + mean_b * mean_b + Self::C1) * (var_a + var_b + Self::C2);
        numerator / denominator
    }
}

impl Default for StructuralComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameComparator for StructuralComparator {
    fn similarity(&self, a: &Frame, b: &Frame) -> Result<f64, ExtractError> {
        ensure_same_dimensions(a, b)?;
        if a.data == b.data {
            return Ok(1.0);
        }

        let grid_a = LumaGrid::from_frame(a, self.grid_cols, self.grid_rows);
        let grid_b = LumaGrid::from_frame(b, self.grid_cols, self.grid_rows);
        Ok(self.grid_score(&grid_a, &grid_b))
    }

    fn name(&self) -> &'static str {
        "structural"
    }
}

/// DCT 感知哈希 (pHash): 32x32 luminance thumbnail, 2-D DCT-II, low
/// frequency 8x8 block thresholded at its median.
///
/// Flat frames have no AC energy, so two flat frames of different brightness
/// hash identically; the structural comparator is the better default.
pub struct PerceptualHashComparator {
    sample_size: usize,
    dct: Arc<dyn TransformType2And3<f32>>,
}

impl PerceptualHashComparator {
    const HASH_SIDE: usize = 8;

    pub fn new() -> Self {
        let sample_size = 32;
        let mut planner = DctPlanner::new();
        Self {
            sample_size,
            dct: planner.plan_dct2(sample_size),
        }
    }

    pub fn hash(&self, frame: &Frame) -> Result<u64, ExtractError> {
        let gray = frame.to_luma_image().ok_or_else(|| ExtractError::Decode {
            timestamp: frame.timestamp_secs(),
            reason: "frame buffer does not match its dimensions".into(),
        })?;
        let n = self.sample_size;
        let small = imageops::resize(&gray, n as u32, n as u32, FilterType::Triangle);

        let mut coeffs: Vec<f32> = small.as_raw().iter().map(|&v| v as f32).collect();

        // 行变换
        for row in coeffs.chunks_exact_mut(n) {
            Dct2::process_dct2(self.dct.as_ref(), row);
        }
        // 列变换
        let mut column = vec![0.0f32; n];
        for x in 0..n {
            for y in 0..n {
                column[y] = coeffs[y * n + x];
            }
            Dct2::process_dct2(self.dct.as_ref(), &mut column);
            for y in 0..n {
                coeffs[y * n + x] = column[y];
            }
        }

        let side = Self::HASH_SIDE;
        let mut low: Vec<f32> = Vec::with_capacity(side * side);
        for y in 0..side {
            low.extend_from_slice(&coeffs[y * n..y * n + side]);
        }

        // DC 分量不参与中位数
        let mut sorted: Vec<f32> = low[1..].to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = sorted[sorted.len() / 2];

        let mut hash = 0u64;
        for (i, &c) in low.iter().enumerate() {
            if c > median {
                hash |= 1 << i;
            }
        }
        Ok(hash)
    }

    pub fn hamming_distance(a: u64, b: u64) -> u32 {
        (a ^ b).count_ones()
    }
}

impl Default for PerceptualHashComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameComparator for PerceptualHashComparator {
    fn similarity(&self, a: &Frame, b: &Frame) -> Result<f64, ExtractError> {
        ensure_same_dimensions(a, b)?;
        if a.data == b.data {
            return Ok(1.0);
        }

        let dist = Self::hamming_distance(self.hash(a)?, self.hash(b)?);
        Ok(1.0 - dist as f64 / 64.0)
    }

    fn name(&self) -> &'static str {
        "phash"
    }
}
