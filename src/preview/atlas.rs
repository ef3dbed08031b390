use serde::{Deserialize, Serialize};

use super::indexer::{UV_RANGE, frames_per_row, tile_coordinates};

/// How a captured tile is combined with what is already on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Later writes overwrite earlier ones.
    #[default]
    Replace,
    /// Straight-alpha "over" compositing.
    AlphaOver,
}

#[inline]
pub(crate) fn blend_pixel(dst: &mut [f32], src: &[f32], mode: CompositeMode) {
    match mode {
        CompositeMode::Replace => dst[..4].copy_from_slice(&src[..4]),
        CompositeMode::AlphaOver => {
            let a = src[3].clamp(0.0, 1.0);
            let inv = 1.0 - a;
            for c in 0..3 {
                dst[c] = src[c] * a + dst[c] * inv;
            }
            dst[3] = a + dst[3] * inv;
        }
    }
}

/// Square float RGBA canvas holding one tile per animation frame.
///
/// Rows are stored bottom-up, so texel `(x, y)` samples at
/// `(x / canvas, y / canvas)` in texture space. Frame `n` lives at tile
/// `(row, col) = tile_coordinates(n)`, with `row` along x and `col` along y.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    pub asset_name: String,
    pub tile_size: u32,
    pub frames_total: u32,
    pub frames_per_row: u32,
    pub pixel_buffer: Vec<f32>,
}

impl Atlas {
    /// Creates a transparent atlas large enough for `frames_total` tiles.
    pub fn new(asset_name: impl Into<String>, frames_total: u32, tile_size: u32) -> Self {
        let frames_per_row = frames_per_row(frames_total);
        Self {
            asset_name: asset_name.into(),
            tile_size,
            frames_total,
            frames_per_row,
            pixel_buffer: vec![0.0; Self::buffer_len(tile_size, frames_per_row)],
        }
    }

    /// Float count of an atlas with the given geometry.
    pub fn buffer_len(tile_size: u32, frames_per_row: u32) -> usize {
        let canvas = tile_size as usize * frames_per_row as usize;
        canvas * canvas * 4
    }

    /// Like [`Atlas::buffer_len`], but `None` when the canvas side does not
    /// fit a `u32` or the float count does not fit a `usize`.
    pub fn checked_buffer_len(tile_size: u32, frames_per_row: u32) -> Option<usize> {
        let canvas = usize::try_from(tile_size.checked_mul(frames_per_row)?).ok()?;
        canvas.checked_mul(canvas)?.checked_mul(4)
    }

    pub fn canvas_size(&self) -> u32 {
        self.tile_size * self.frames_per_row
    }

    pub fn tile_len(&self) -> usize {
        self.tile_size as usize * self.tile_size as usize * 4
    }

    /// Pixel origin of the tile holding `frame`.
    pub fn tile_origin(&self, frame: i64) -> (u32, u32) {
        let (u, v) = tile_coordinates(frame, self.frames_per_row, Some(UV_RANGE));
        let canvas = self.canvas_size() as f32;
        ((u * canvas).round() as u32, (v * canvas).round() as u32)
    }

    /// Writes a `tile_size²` RGBA tile with its lower-left corner at `(x0, y0)`.
    /// Parts falling outside the canvas are dropped.
    pub fn write_tile(&mut self, x0: u32, y0: u32, tile: &[f32], mode: CompositeMode) {
        let canvas = self.canvas_size() as usize;
        let size = self.tile_size as usize;
        let (x0, y0) = (x0 as usize, y0 as usize);
        if x0 >= canvas || y0 >= canvas {
            return;
        }
        let width = size.min(canvas - x0);

        for ty in 0..size.min(canvas - y0) {
            let src = &tile[ty * size * 4..(ty * size + width) * 4];
            let start = ((y0 + ty) * canvas + x0) * 4;
            let dst = &mut self.pixel_buffer[start..start + width * 4];
            match mode {
                CompositeMode::Replace => dst.copy_from_slice(src),
                CompositeMode::AlphaOver => {
                    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                        blend_pixel(d, s, mode);
                    }
                }
            }
        }
    }

    /// Copies out the tile holding `frame`.
    pub fn tile(&self, frame: i64) -> Vec<f32> {
        let canvas = self.canvas_size() as usize;
        let size = self.tile_size as usize;
        let (x0, y0) = self.tile_origin(frame);
        let (x0, y0) = (x0 as usize, y0 as usize);

        let mut out = vec![0.0; self.tile_len()];
        if x0 + size > canvas || y0 + size > canvas {
            return out;
        }
        for ty in 0..size {
            let start = ((y0 + ty) * canvas + x0) * 4;
            out[ty * size * 4..(ty + 1) * size * 4]
                .copy_from_slice(&self.pixel_buffer[start..start + size * 4]);
        }
        out
    }
}

/// A single-frame float RGBA preview, stored bottom-up like [`Atlas`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StillPreview {
    pub size: u32,
    pub pixels: Vec<f32>,
}
