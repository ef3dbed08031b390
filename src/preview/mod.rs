pub mod atlas;
pub mod codec;
pub mod indexer;
pub mod loader;
pub mod overlay;
pub mod packer;
pub mod player;
pub mod texture;

pub use atlas::*;
pub use codec::*;
pub use indexer::*;
pub use loader::*;
pub use overlay::*;
pub use packer::*;
pub use player::*;
pub use texture::*;

use image::RgbaImage;
use tracing::info;

use crate::{
    error::KomaError,
    rdb::{AssetKind, AssetRecord},
};

/// Renders and attaches every preview an asset gets when it is published:
/// the animation atlas for animation assets, a still of the first frame, and
/// the kind badge over that still.
///
/// Nothing is attached unless every capture succeeds.
pub fn generate_previews<R: FrameRenderer>(
    packer: &mut AtlasPacker<R>,
    record: &mut AssetRecord,
    frame_range: (i64, i64),
    badge: Option<&RgbaImage>,
) -> Result<(), KomaError> {
    let preview = match record.kind {
        AssetKind::Animation => {
            Some(encode(&packer.generate_animation_preview(&record.name, frame_range)?))
        }
        _ => None,
    };

    let mut still = packer.generate_still_preview(frame_range.0)?;
    if let Some(badge) = badge {
        composite_overlay(&mut still, badge);
    }

    if let Some(preview) = preview {
        record.attach_preview(preview);
    }
    record.attach_still(still);
    info!(resource = "preview", entry = %record.name, kind = ?record.kind, "previews attached");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewConfig;
    use image::Rgba;

    struct Flat(f32);

    impl FrameRenderer for Flat {
        fn capture(&mut self, frame: i64, tile_size: u32) -> Result<Vec<f32>, KomaError> {
            if frame > 100 {
                return Err(KomaError::Capture("past the end of the action".into()));
            }
            Ok(vec![self.0; (tile_size * tile_size * 4) as usize])
        }
    }

    fn packer() -> AtlasPacker<Flat> {
        let config = PreviewConfig {
            tile_size: 2,
            ..Default::default()
        };
        AtlasPacker::new(Flat(0.25), &config)
    }

    #[test]
    fn animation_assets_get_atlas_and_still() {
        let mut record = AssetRecord::new("walk", AssetKind::Animation);
        let badge = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        generate_previews(&mut packer(), &mut record, (1, 5), Some(&badge)).expect("generate");

        let preview = record.preview.as_ref().expect("atlas attached");
        assert_eq!(preview.frames_total, 4);
        assert_eq!(preview.frames_rows, 2);
        let still = record.still.as_ref().expect("still attached");
        assert!(still.pixels.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn poses_only_get_a_still() {
        let mut record = AssetRecord::new("idle", AssetKind::Pose);
        generate_previews(&mut packer(), &mut record, (1, 5), None).expect("generate");
        assert!(record.preview.is_none());
        assert!(record.still.as_ref().is_some_and(|s| s.pixels[0] == 0.25));
    }

    #[test]
    fn failed_capture_attaches_nothing() {
        let mut record = AssetRecord::new("walk", AssetKind::Animation);
        let result = generate_previews(&mut packer(), &mut record, (90, 110), None);
        assert!(matches!(result, Err(KomaError::Capture(_))));
        assert!(record.preview.is_none());
        assert!(record.still.is_none());
    }
}
