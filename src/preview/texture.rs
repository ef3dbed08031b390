use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use image::Rgba32FImage;
use tracing::debug;

use super::atlas::Atlas;
use crate::{DataCache, error::KomaError, rdb::DatabaseEntry};

/// Whatever owns the display's texture memory.
pub trait TextureHost {
    type Handle: Clone;

    fn upload(&mut self, entry: DatabaseEntry<'_>, atlas: &Atlas) -> Result<Self::Handle, KomaError>;
    fn destroy(&mut self, handle: Self::Handle);
}

/// CPU-side texture host. Handles are top-down float images, the layout most
/// UI toolkits and the `image` encoders expect.
#[derive(Debug, Default)]
pub struct ImageTextureHost {
    live: usize,
}

impl ImageTextureHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures uploaded and not yet destroyed.
    pub fn live(&self) -> usize {
        self.live
    }
}

/// Converts a bottom-up atlas into a top-down image.
pub fn atlas_to_image(atlas: &Atlas) -> Result<Rgba32FImage, KomaError> {
    let canvas = atlas.canvas_size();
    let mut image = Rgba32FImage::from_raw(canvas, canvas, atlas.pixel_buffer.clone())
        .ok_or_else(|| KomaError::Upload(format!("{}: buffer does not fill canvas", atlas.asset_name)))?;
    image::imageops::flip_vertical_in_place(&mut image);
    Ok(image)
}

impl TextureHost for ImageTextureHost {
    type Handle = Arc<Rgba32FImage>;

    fn upload(&mut self, _entry: DatabaseEntry<'_>, atlas: &Atlas) -> Result<Self::Handle, KomaError> {
        let image = atlas_to_image(atlas)?;
        self.live += 1;
        Ok(Arc::new(image))
    }

    fn destroy(&mut self, _handle: Self::Handle) {
        self.live = self.live.saturating_sub(1);
    }
}

/// FNV-1a over the atlas geometry and pixel bits, one word at a time.
fn fingerprint(atlas: &Atlas) -> u64 {
    [atlas.tile_size, atlas.frames_total, atlas.frames_per_row]
        .into_iter()
        .chain(atlas.pixel_buffer.iter().map(|v| v.to_bits()))
        .fold(0xcbf29ce484222325, |h, word| {
            (h ^ u64::from(word)).wrapping_mul(0x100000001b3)
        })
}

struct CachedTexture<T> {
    handle: T,
    fingerprint: u64,
}

/// Refcounted textures keyed by the caller's texture key. Released textures
/// linger for `unload_delay` so quickly re-selecting an asset skips the upload.
/// A lingering texture whose pixels no longer match the atlas is replaced.
pub struct TextureCache<H: TextureHost> {
    host: H,
    cache: DataCache<CachedTexture<H::Handle>>,
    unload_delay: Duration,
}

impl<H: TextureHost> TextureCache<H> {
    pub fn new(host: H, unload_delay: Duration) -> Self {
        Self {
            host,
            cache: DataCache::new(),
            unload_delay,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.cache.get(key).is_some()
    }

    /// Takes a reference on the texture for `atlas` under `key`, uploading it
    /// if nothing matching is cached.
    pub fn acquire(&mut self, key: &str, atlas: &Atlas) -> Result<H::Handle, KomaError> {
        let fingerprint = fingerprint(atlas);
        let outdated = self
            .cache
            .get(key)
            .is_some_and(|cached| cached.payload.fingerprint != fingerprint);
        if outdated {
            let Some(old) = self.cache.remove_unreferenced(key) else {
                return Err(KomaError::Upload(format!(
                    "{key}: texture is in use with different contents"
                )));
            };
            debug!(resource = "texture", entry = %key, "outdated texture replaced");
            self.host.destroy(old.handle);
        }

        let host = &mut self.host;
        let cached = self.cache.insert_or_increment(key, || {
            host.upload(&atlas.asset_name, atlas)
                .map(|handle| CachedTexture { handle, fingerprint })
        })?;
        Ok(cached.payload.handle.clone())
    }

    /// Drops a reference; the texture is destroyed by a later `unload_pulse`.
    pub fn release(&mut self, key: &str, now: Instant) -> Result<(), KomaError> {
        let unload_at = now + self.unload_delay;
        match self.cache.decrement(key, unload_at) {
            Some(_) => Ok(()),
            None => Err(KomaError::LookupFailure(key.to_string())),
        }
    }

    /// Destroys textures whose unload delay has elapsed.
    pub fn unload_pulse(&mut self, now: Instant) {
        for (key, cached) in self.cache.drain_expired(now) {
            debug!(resource = "texture", entry = %key, "texture unloaded");
            self.host.destroy(cached.handle);
        }
    }

    /// Destroys every texture, referenced or not.
    pub fn clear(&mut self) {
        for (_key, cached) in self.cache.drain_all() {
            self.host.destroy(cached.handle);
        }
    }
}
