use std::path::Path;

use image::{RgbaImage, imageops::FilterType};
use serde::{Deserialize, Serialize};

use super::atlas::{CompositeMode, StillPreview, blend_pixel};
use crate::{error::KomaError, rdb::AssetKind};

/// Badge drawn over a still preview to tell asset kinds apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayKind {
    Pose,
    Animation,
}

impl OverlayKind {
    pub fn for_asset(kind: AssetKind) -> Option<Self> {
        match kind {
            AssetKind::Pose => Some(OverlayKind::Pose),
            AssetKind::Animation => Some(OverlayKind::Animation),
            AssetKind::Unknown => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            OverlayKind::Pose => "pose_overlay.png",
            OverlayKind::Animation => "animation_overlay.png",
        }
    }
}

/// Loads the badge image for `kind` from `dir`.
pub fn load_overlay(dir: impl AsRef<Path>, kind: OverlayKind) -> Result<RgbaImage, KomaError> {
    Ok(image::open(dir.as_ref().join(kind.file_name()))?.to_rgba8())
}

/// Alpha-blends `badge` over the whole still preview. The badge is resized
/// to the preview size when they differ.
pub fn composite_overlay(still: &mut StillPreview, badge: &RgbaImage) {
    let size = still.size;
    let resized;
    let badge = if badge.dimensions() == (size, size) {
        badge
    } else {
        resized = image::imageops::resize(badge, size, size, FilterType::Triangle);
        &resized
    };

    // The still is bottom-up; image rows are top-down.
    for (x, y, px) in badge.enumerate_pixels() {
        let row = (size - 1 - y) as usize;
        let start = (row * size as usize + x as usize) * 4;
        let src = px.0.map(|c| f32::from(c) / 255.0);
        blend_pixel(&mut still.pixels[start..start + 4], &src, CompositeMode::AlphaOver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn grey_still(size: u32) -> StillPreview {
        StillPreview {
            size,
            pixels: [0.5, 0.5, 0.5, 1.0]
                .into_iter()
                .cycle()
                .take((size * size * 4) as usize)
                .collect(),
        }
    }

    #[test]
    fn transparent_badge_keeps_preview() {
        let mut still = grey_still(2);
        let before = still.clone();
        composite_overlay(&mut still, &RgbaImage::new(2, 2));
        assert_eq!(still, before);
    }

    #[test]
    fn opaque_badge_pixel_lands_bottom_up() {
        let mut still = grey_still(2);
        let mut badge = RgbaImage::new(2, 2);
        // Top-left in image space.
        badge.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        composite_overlay(&mut still, &badge);

        // Top-left is the first texel of the last buffer row.
        assert_eq!(&still.pixels[8..12], &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(&still.pixels[0..4], &[0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn badge_is_resized() {
        let mut still = grey_still(4);
        let badge = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 255, 255]));
        composite_overlay(&mut still, &badge);
        assert!(still
            .pixels
            .chunks_exact(4)
            .all(|px| px[0] < 0.01 && px[2] > 0.99 && px[3] > 0.99));
    }

    #[test]
    fn loads_badge_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4]))
            .save(dir.path().join("animation_overlay.png"))
            .expect("write badge");

        let badge = load_overlay(dir.path(), OverlayKind::Animation).expect("load badge");
        assert_eq!(badge.dimensions(), (3, 3));
        assert!(load_overlay(dir.path(), OverlayKind::Pose).is_err());
        assert_eq!(OverlayKind::for_asset(AssetKind::Unknown), None);
    }
}
