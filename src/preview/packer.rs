use std::time::Instant;

use tracing::{debug, info};

use super::{
    atlas::{Atlas, CompositeMode, StillPreview},
    indexer::{NDC_RANGE, tile_coordinates},
};
use crate::{config::PreviewConfig, error::KomaError};

/// Capability that renders the host scene at a given frame.
///
/// Implementations own the scene cursor: `capture` moves it to `frame` and
/// returns a bottom-up float RGBA image of `tile_size × tile_size` pixels.
pub trait FrameRenderer {
    fn capture(&mut self, frame: i64, tile_size: u32) -> Result<Vec<f32>, KomaError>;
}

impl<R: FrameRenderer + ?Sized> FrameRenderer for &mut R {
    fn capture(&mut self, frame: i64, tile_size: u32) -> Result<Vec<f32>, KomaError> {
        (**self).capture(frame, tile_size)
    }
}

/// Renders animation frames one at a time and packs them into an [`Atlas`].
///
/// Packing drives the renderer's scene state, so a packer borrows its
/// renderer mutably for the whole build.
pub struct AtlasPacker<R: FrameRenderer> {
    renderer: R,
    tile_size: u32,
    mode: CompositeMode,
}

impl<R: FrameRenderer> AtlasPacker<R> {
    pub fn new(renderer: R, config: &PreviewConfig) -> Self {
        Self {
            renderer,
            tile_size: config.tile_size,
            mode: config.composite_mode,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    fn capture_tile(&mut self, frame: i64) -> Result<Vec<f32>, KomaError> {
        let tile = self.renderer.capture(frame, self.tile_size)?;
        let expected = self.tile_size as usize * self.tile_size as usize * 4;
        if tile.len() != expected {
            return Err(KomaError::TileSizeMismatch {
                expected,
                actual: tile.len(),
            });
        }
        Ok(tile)
    }

    /// Captures every frame in `[start, end)` into a fresh atlas.
    ///
    /// The first failing capture aborts the build and nothing is returned.
    pub fn generate_animation_preview(
        &mut self,
        asset_name: &str,
        frame_range: (i64, i64),
    ) -> Result<Atlas, KomaError> {
        let (start, end) = frame_range;
        let frame_count = end
            .checked_sub(start)
            .filter(|&n| n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(KomaError::InvalidFrameRange { start, end })?;

        let began = Instant::now();
        let mut atlas = Atlas::new(asset_name, frame_count, self.tile_size);
        let canvas = atlas.canvas_size() as f32;
        debug!(
            resource = "preview",
            entry = %asset_name,
            frames = atlas.frames_total,
            canvas = atlas.canvas_size(),
            "packing atlas"
        );

        for frame in start..end {
            let tile = self.capture_tile(frame)?;
            let (x, y) = tile_coordinates(frame - start, atlas.frames_per_row, Some(NDC_RANGE));
            let to_pixel = |ndc: f32| ((ndc - NDC_RANGE.0) * 0.5 * canvas).round() as u32;
            atlas.write_tile(to_pixel(x), to_pixel(y), &tile, self.mode);
        }

        info!(
            resource = "preview",
            entry = %asset_name,
            frames = atlas.frames_total,
            elapsed_ms = began.elapsed().as_millis() as u64,
            "atlas generated"
        );
        Ok(atlas)
    }

    /// Captures a single still preview of `frame`.
    pub fn generate_still_preview(&mut self, frame: i64) -> Result<StillPreview, KomaError> {
        let pixels = self.capture_tile(frame)?;
        Ok(StillPreview {
            size: self.tile_size,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paints every pixel of frame `n` with red = `n`, and a gradient in
    /// green/blue so tiles are not uniform.
    #[derive(Default)]
    struct GradientRenderer {
        captured: Vec<i64>,
        fail_at: Option<i64>,
    }

    impl FrameRenderer for GradientRenderer {
        fn capture(&mut self, frame: i64, tile_size: u32) -> Result<Vec<f32>, KomaError> {
            if self.fail_at == Some(frame) {
                return Err(KomaError::Capture(format!("no camera at frame {frame}")));
            }
            self.captured.push(frame);
            let size = tile_size as usize;
            let mut out = Vec::with_capacity(size * size * 4);
            for y in 0..size {
                for x in 0..size {
                    out.extend_from_slice(&[
                        frame as f32,
                        x as f32 / size as f32,
                        y as f32 / size as f32,
                        1.0,
                    ]);
                }
            }
            Ok(out)
        }
    }

    fn config(tile_size: u32) -> PreviewConfig {
        PreviewConfig {
            tile_size,
            ..Default::default()
        }
    }

    #[test]
    fn packs_each_frame_into_its_tile() {
        let mut packer = AtlasPacker::new(GradientRenderer::default(), &config(4));
        let atlas = packer
            .generate_animation_preview("walk", (10, 20))
            .expect("generate atlas");

        assert_eq!(atlas.frames_total, 10);
        assert_eq!(atlas.frames_per_row, 4);
        assert_eq!(atlas.canvas_size(), 16);
        for n in 0..10 {
            let tile = atlas.tile(n);
            assert!(tile.chunks_exact(4).all(|px| px[0] == (10 + n) as f32));
        }
        // Unused tiles stay transparent.
        assert!(atlas.tile(15).iter().all(|&v| v == 0.0));
        assert_eq!(packer.into_renderer().captured, (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn default_tile_size_for_forty_nine_frames() {
        let mut packer = AtlasPacker::new(GradientRenderer::default(), &PreviewConfig::default());
        let atlas = packer
            .generate_animation_preview("walk", (1, 50))
            .expect("generate atlas");
        assert_eq!(atlas.frames_total, 49);
        assert_eq!(atlas.frames_per_row, 7);
        assert_eq!(atlas.canvas_size(), 896);
        assert_eq!(atlas.pixel_buffer.len(), 896 * 896 * 4);
    }

    #[test]
    fn capture_failure_aborts_generation() {
        let renderer = GradientRenderer {
            fail_at: Some(3),
            ..Default::default()
        };
        let mut packer = AtlasPacker::new(renderer, &config(2));
        let result = packer.generate_animation_preview("walk", (0, 8));
        assert!(matches!(result, Err(KomaError::Capture(_))));
        assert_eq!(packer.into_renderer().captured, vec![0, 1, 2]);
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut packer = AtlasPacker::new(GradientRenderer::default(), &config(2));
        assert!(matches!(
            packer.generate_animation_preview("walk", (5, 5)),
            Err(KomaError::InvalidFrameRange { start: 5, end: 5 })
        ));
        assert!(packer.generate_animation_preview("walk", (9, 2)).is_err());
    }

    #[test]
    fn wrong_tile_size_is_rejected() {
        struct Tiny;
        impl FrameRenderer for Tiny {
            fn capture(&mut self, _frame: i64, _tile_size: u32) -> Result<Vec<f32>, KomaError> {
                Ok(vec![0.0; 4])
            }
        }

        let mut packer = AtlasPacker::new(Tiny, &config(2));
        assert!(matches!(
            packer.generate_still_preview(0),
            Err(KomaError::TileSizeMismatch {
                expected: 16,
                actual: 4
            })
        ));
    }

    #[test]
    fn still_preview_captures_one_frame() {
        let mut renderer = GradientRenderer::default();
        let mut packer = AtlasPacker::new(&mut renderer, &config(2));
        let still = packer.generate_still_preview(7).expect("still");
        assert_eq!(still.size, 2);
        assert_eq!(still.pixels[0], 7.0);
        assert_eq!(renderer.captured, vec![7]);
    }
}
