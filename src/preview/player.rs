use std::{path::PathBuf, sync::Arc, time::Instant};

use glam::Vec2;
use tracing::{debug, info, warn};

use super::{
    atlas::Atlas,
    indexer::{UV_RANGE, tile_coordinates},
    loader::{LoadOutcome, LoadResult, PreviewLoader},
    texture::{TextureCache, TextureHost},
};
use crate::{
    config::PreviewConfig,
    error::KomaError,
    rdb::{AssetKind, PreviewSource},
};

/// Margin in pixels between the overlay and the region's edge.
const PLAYER_MARGIN: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSelection {
    pub name: String,
    pub path: PathBuf,
    pub kind: AssetKind,
}

impl AssetSelection {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: AssetKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }

    /// Texture cache key. Same-named assets in different files stay apart.
    pub fn texture_key(&self) -> String {
        format!("{}::{}", self.path.display(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
}

/// Size of the UI area the overlay is drawn in, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRegion {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    pub current_frame: u32,
    /// Corners of the visible tile in texture space, counter-clockwise from
    /// the lower-left.
    pub uv_window: [Vec2; 4],
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self {
            current_frame: 0,
            uv_window: uv_window(0, 1),
        }
    }
}

/// UV rectangle of the tile holding `frame` in a `grid` wide atlas.
pub fn uv_window(frame: u32, grid: u32) -> [Vec2; 4] {
    let (u, v) = tile_coordinates(i64::from(frame), grid, Some(UV_RANGE));
    let d = 1.0 / grid.max(1) as f32;
    [
        Vec2::new(u, v),
        Vec2::new(u + d, v),
        Vec2::new(u + d, v + d),
        Vec2::new(u, v + d),
    ]
}

struct PendingLoad {
    ticket: u64,
    started: Instant,
}

struct LoadedPreview<T> {
    key: String,
    atlas: Atlas,
    texture: T,
}

type RegionProvider = Box<dyn Fn() -> Option<DisplayRegion>>;

/// Drives the floating animation preview of the selected asset.
///
/// All methods run on the UI thread and never block: decoding happens in
/// [`PreviewLoader`] workers and results are picked up by `update`.
pub struct PlaybackEngine<H: TextureHost> {
    config: PreviewConfig,
    loader: PreviewLoader,
    textures: TextureCache<H>,
    state: PlaybackState,
    selection: Option<AssetSelection>,
    pending: Option<PendingLoad>,
    active: Option<LoadedPreview<H::Handle>>,
    cursor: PlaybackCursor,
    next_tick: Option<Instant>,
    ticks: u64,
    last_error: Option<KomaError>,
    region_provider: Option<RegionProvider>,
    player_position: Vec2,
}

impl<H: TextureHost> PlaybackEngine<H> {
    pub fn new(config: PreviewConfig, source: Arc<dyn PreviewSource>, host: H) -> Self {
        let textures = TextureCache::new(host, config.texture_unload_delay());
        Self {
            config,
            loader: PreviewLoader::new(source),
            textures,
            state: PlaybackState::Idle,
            selection: None,
            pending: None,
            active: None,
            cursor: PlaybackCursor::default(),
            next_tick: None,
            ticks: 0,
            last_error: None,
            region_provider: None,
            player_position: Vec2::splat(PLAYER_MARGIN),
        }
    }

    /// Installs the callback used to anchor the overlay every update.
    pub fn set_region_provider(&mut self, provider: impl Fn() -> Option<DisplayRegion> + 'static) {
        self.region_provider = Some(Box::new(provider));
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn selection(&self) -> Option<&AssetSelection> {
        self.selection.as_ref()
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn uv_window(&self) -> [Vec2; 4] {
        self.cursor.uv_window
    }

    /// Frame count of the preview being played, 0 when nothing plays.
    pub fn active_preview_length(&self) -> u32 {
        self.active.as_ref().map_or(0, |p| p.atlas.frames_total)
    }

    pub fn atlas(&self) -> Option<&Atlas> {
        self.active.as_ref().map(|p| &p.atlas)
    }

    pub fn texture(&self) -> Option<&H::Handle> {
        self.active.as_ref().map(|p| &p.texture)
    }

    pub fn textures(&self) -> &TextureCache<H> {
        &self.textures
    }

    /// Why the last load ended without a preview, if it failed.
    pub fn last_error(&self) -> Option<&KomaError> {
        self.last_error.as_ref()
    }

    /// Total ticks run since the engine was created.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Lower-left corner of the overlay quad in region pixels.
    pub fn player_position(&self) -> Vec2 {
        self.player_position
    }

    /// Reacts to the UI selection. Re-selecting the current asset is a no-op.
    pub fn select(&mut self, selection: Option<AssetSelection>, now: Instant) {
        if selection == self.selection {
            return;
        }

        self.release_active(now);
        self.cursor = PlaybackCursor::default();
        self.pending = None;
        self.last_error = None;
        self.selection = selection;

        match &self.selection {
            Some(sel) if sel.kind == AssetKind::Animation => {
                let ticket = self.loader.load(&sel.name, &sel.path);
                debug!(resource = "preview", entry = %sel.name, ticket, "preview requested");
                self.pending = Some(PendingLoad {
                    ticket,
                    started: now,
                });
                self.state = PlaybackState::Loading;
            }
            _ => self.state = PlaybackState::Idle,
        }
    }

    /// Runs every tick that fell due since the previous call, then retires
    /// expired textures. Returns the number of ticks run.
    pub fn update(&mut self, now: Instant) -> u32 {
        if let Some(provider) = &self.region_provider {
            if let Some(region) = provider() {
                self.player_position = self.anchor(region);
            }
        }

        let interval = self.config.tick_interval();
        let max_catch_up = self.config.frame_rate.max(1);
        let mut next = self.next_tick.unwrap_or(now);
        let mut ran = 0;
        while next <= now && ran < max_catch_up {
            self.tick(now);
            next += interval;
            ran += 1;
        }
        if next <= now {
            // Too far behind, e.g. after the host was suspended.
            next = now + interval;
        }
        self.next_tick = Some(next);

        self.textures.unload_pulse(now);
        ran
    }

    /// Releases the current preview and every cached texture.
    pub fn shutdown(&mut self) {
        self.release_active(Instant::now());
        self.textures.clear();
        self.selection = None;
        self.pending = None;
        self.state = PlaybackState::Idle;
    }

    fn anchor(&self, region: DisplayRegion) -> Vec2 {
        let size = self.config.tile_size as f32;
        Vec2::new(
            region.width / 2.0 - size / 2.0,
            region.height - size - PLAYER_MARGIN,
        )
    }

    fn release_active(&mut self, now: Instant) {
        if let Some(loaded) = self.active.take() {
            if let Err(err) = self.textures.release(&loaded.key, now) {
                warn!(resource = "texture", entry = %loaded.atlas.asset_name, error = %err);
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        self.ticks += 1;
        match self.state {
            PlaybackState::Loading => {
                if let Some(result) = self.loader.poll() {
                    self.accept(result);
                } else if self.load_timed_out(now) {
                    let entry = self.selection.as_ref().map_or("", |s| s.name.as_str());
                    warn!(resource = "preview", entry = %entry, "no preview arrived before timeout");
                    self.pending = None;
                    self.state = PlaybackState::Idle;
                }
            }
            PlaybackState::Playing => {
                self.discard_stale();
                self.advance();
            }
            PlaybackState::Idle => self.discard_stale(),
        }
    }

    fn load_timed_out(&self, now: Instant) -> bool {
        self.pending.as_ref().is_some_and(|p| {
            now.saturating_duration_since(p.started) >= self.config.load_timeout()
        })
    }

    fn is_current(&self, result: &LoadResult) -> bool {
        let ticket_matches = self.pending.as_ref().is_some_and(|p| p.ticket == result.ticket);
        let name_matches = self
            .selection
            .as_ref()
            .is_some_and(|s| s.name == result.asset_name);
        ticket_matches && name_matches
    }

    fn discard_stale(&mut self) {
        if let Some(result) = self.loader.poll() {
            debug!(resource = "preview", entry = %result.asset_name, ticket = result.ticket, "stale preview dropped");
        }
    }

    fn accept(&mut self, result: LoadResult) {
        if !self.is_current(&result) {
            debug!(resource = "preview", entry = %result.asset_name, ticket = result.ticket, "stale preview dropped");
            return;
        }
        self.pending = None;

        let atlas = match result.outcome {
            LoadOutcome::Ready(atlas) => atlas,
            LoadOutcome::Failed(err) => {
                self.last_error = Some(err);
                self.state = PlaybackState::Idle;
                return;
            }
        };

        let Some(key) = self.selection.as_ref().map(AssetSelection::texture_key) else {
            return;
        };
        match self.textures.acquire(&key, &atlas) {
            Ok(texture) => {
                info!(resource = "preview", entry = %atlas.asset_name, frames = atlas.frames_total, "playing preview");
                self.cursor = PlaybackCursor {
                    current_frame: 0,
                    uv_window: uv_window(0, atlas.frames_per_row),
                };
                self.active = Some(LoadedPreview {
                    key,
                    atlas,
                    texture,
                });
                self.state = PlaybackState::Playing;
            }
            Err(err) => {
                warn!(resource = "texture", entry = %atlas.asset_name, error = %err);
                self.last_error = Some(err);
                self.state = PlaybackState::Idle;
            }
        }
    }

    fn advance(&mut self) {
        let Some(loaded) = &self.active else {
            return;
        };
        let total = loaded.atlas.frames_total;
        let frame = if self.cursor.current_frame + 1 >= total {
            0
        } else {
            self.cursor.current_frame + 1
        };
        self.cursor = PlaybackCursor {
            current_frame: frame,
            uv_window: uv_window(frame, loaded.atlas.frames_per_row),
        };
    }
}

impl<H: TextureHost> Drop for PlaybackEngine<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
