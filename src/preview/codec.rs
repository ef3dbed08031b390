use serde::{Deserialize, Serialize};

use super::{atlas::Atlas, indexer::frames_per_row};
use crate::error::KomaError;

const FLOAT_BYTES: usize = std::mem::size_of::<f32>();

/// An atlas flattened for storage inside an asset record.
///
/// `blob` holds `buffer_size` packed IEEE754 floats in native byte order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPreview {
    pub blob: Vec<u8>,
    pub buffer_size: u32,
    pub frames_total: u32,
    pub frames_rows: u32,
    pub frame_size: u32,
}

pub fn encode(atlas: &Atlas) -> PersistedPreview {
    PersistedPreview {
        blob: bytemuck::cast_slice::<f32, u8>(&atlas.pixel_buffer).to_vec(),
        buffer_size: atlas.pixel_buffer.len() as u32,
        frames_total: atlas.frames_total,
        frames_rows: atlas.frames_per_row,
        frame_size: atlas.tile_size,
    }
}

pub fn decode(preview: &PersistedPreview, asset_name: &str) -> Result<Atlas, KomaError> {
    let malformed = |reason: String| KomaError::MalformedPreview(format!("{asset_name}: {reason}"));

    if preview.frames_total == 0 || preview.frame_size == 0 {
        return Err(malformed(format!(
            "{} frames of {}px leave nothing to play",
            preview.frames_total, preview.frame_size
        )));
    }

    let floats = preview.buffer_size as usize;
    let blob_len = floats.checked_mul(FLOAT_BYTES);
    if blob_len != Some(preview.blob.len()) {
        return Err(malformed(format!(
            "blob holds {} bytes for {floats} floats",
            preview.blob.len()
        )));
    }

    if preview.frames_rows != frames_per_row(preview.frames_total) {
        return Err(malformed(format!(
            "{} frames cannot use {} tiles per row",
            preview.frames_total, preview.frames_rows
        )));
    }

    let canvas = u64::from(preview.frame_size) * u64::from(preview.frames_rows);
    match Atlas::checked_buffer_len(preview.frame_size, preview.frames_rows) {
        Some(expected) if expected == floats => {}
        Some(_) => {
            return Err(malformed(format!(
                "buffer_size {floats} does not match a {canvas}px canvas"
            )));
        }
        None => return Err(malformed(format!("{canvas}px canvas is too large"))),
    }

    let pixel_buffer = preview
        .blob
        .chunks_exact(FLOAT_BYTES)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect();

    Ok(Atlas {
        asset_name: asset_name.to_string(),
        tile_size: preview.frame_size,
        frames_total: preview.frames_total,
        frames_per_row: preview.frames_rows,
        pixel_buffer,
    })
}
