use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
    thread,
    time::Instant,
};

use tracing::{debug, info, warn};

use super::{atlas::Atlas, codec};
use crate::{error::KomaError, rdb::PreviewSource};

/// What a finished load hands back to the UI thread.
#[derive(Debug)]
pub enum LoadOutcome {
    Ready(Atlas),
    Failed(KomaError),
}

#[derive(Debug)]
pub struct LoadResult {
    /// Ticket returned by the [`PreviewLoader::load`] call that produced this.
    pub ticket: u64,
    pub asset_name: String,
    pub outcome: LoadOutcome,
}

/// Decodes stored previews on worker threads and queues them for the UI
/// thread. Loads cannot be aborted; callers compare tickets to drop results
/// they no longer want.
pub struct PreviewLoader {
    source: Arc<dyn PreviewSource>,
    sender: Sender<LoadResult>,
    receiver: Receiver<LoadResult>,
    next_ticket: u64,
}

fn run_load(source: &dyn PreviewSource, asset_name: &str, asset_path: &Path) -> Option<LoadOutcome> {
    let began = Instant::now();
    let outcome = match source.fetch_preview(asset_name, asset_path) {
        Ok(Some(persisted)) => match codec::decode(&persisted, asset_name) {
            Ok(atlas) => LoadOutcome::Ready(atlas),
            Err(err) => LoadOutcome::Failed(err),
        },
        Ok(None) => {
            debug!(resource = "preview", entry = %asset_name, "asset has no stored preview");
            return None;
        }
        Err(err) => LoadOutcome::Failed(err),
    };

    match &outcome {
        LoadOutcome::Ready(atlas) => info!(
            resource = "preview",
            entry = %asset_name,
            frames = atlas.frames_total,
            elapsed_ms = began.elapsed().as_millis() as u64,
            "preview loaded"
        ),
        LoadOutcome::Failed(err) => {
            warn!(resource = "preview", entry = %asset_name, error = %err, "preview load failed")
        }
    }
    Some(outcome)
}

impl PreviewLoader {
    pub fn new(source: Arc<dyn PreviewSource>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            source,
            sender,
            receiver,
            next_ticket: 0,
        }
    }

    /// Starts loading the preview of `asset_name` from `asset_path` and
    /// returns the ticket its result will carry.
    ///
    /// Nothing is queued when the asset has no stored preview.
    pub fn load(&mut self, asset_name: &str, asset_path: &Path) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        let name = asset_name.to_string();
        let path: PathBuf = asset_path.to_path_buf();

        let spawned = thread::Builder::new()
            .name(format!("koma-preview-{ticket}"))
            .spawn(move || {
                if let Some(outcome) = run_load(source.as_ref(), &name, &path) {
                    // The receiver is gone when the player shut down; nothing to do.
                    let _ = sender.send(LoadResult {
                        ticket,
                        asset_name: name,
                        outcome,
                    });
                }
            });

        if let Err(err) = spawned {
            warn!(resource = "preview", entry = %asset_name, error = %err, "could not spawn loader");
            let _ = self.sender.send(LoadResult {
                ticket,
                asset_name: asset_name.to_string(),
                outcome: LoadOutcome::Failed(KomaError::IOFailure(err)),
            });
        }

        ticket
    }

    /// Takes the oldest finished load, if any. Never blocks.
    pub fn poll(&self) -> Option<LoadResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
