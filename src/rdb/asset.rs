use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::DatabaseEntry;
use crate::{
    RDBFile, RDBView,
    preview::{PersistedPreview, StillPreview},
    utils::KomaError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Pose,
    Animation,
    #[default]
    Unknown,
}

/// The stored fields of one library asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub name: String,
    pub kind: AssetKind,
    #[serde(default)]
    pub preview: Option<PersistedPreview>,
    #[serde(default)]
    pub still: Option<StillPreview>,
}

impl AssetRecord {
    pub fn new(name: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            preview: None,
            still: None,
        }
    }

    /// Attaches an animation preview, replacing any previous one.
    pub fn attach_preview(&mut self, preview: PersistedPreview) {
        self.preview = Some(preview);
    }

    pub fn attach_still(&mut self, still: StillPreview) {
        self.still = Some(still);
    }
}

/// Editable collection of asset records backed by an `.rdb` file, one entry
/// per asset name.
#[derive(Debug, Default)]
pub struct AssetLibrary {
    records: BTreeMap<String, AssetRecord>,
}

impl AssetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every record out of an existing library file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KomaError> {
        let view = RDBView::load(path)?;
        let mut records = BTreeMap::new();
        for meta in view.entries() {
            let record = view.fetch::<AssetRecord>(&meta.name)?;
            records.insert(meta.name, record);
        }
        Ok(Self { records })
    }

    pub fn insert(&mut self, record: AssetRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn get(&self, entry: DatabaseEntry<'_>) -> Option<&AssetRecord> {
        self.records.get(entry)
    }

    pub fn get_mut(&mut self, entry: DatabaseEntry<'_>) -> Option<&mut AssetRecord> {
        self.records.get_mut(entry)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn attach_preview(
        &mut self,
        entry: DatabaseEntry<'_>,
        preview: PersistedPreview,
    ) -> Result<(), KomaError> {
        self.get_mut(entry)
            .ok_or_else(|| KomaError::LookupFailure(entry.to_string()))?
            .attach_preview(preview);
        Ok(())
    }

    pub fn attach_still(
        &mut self,
        entry: DatabaseEntry<'_>,
        still: StillPreview,
    ) -> Result<(), KomaError> {
        self.get_mut(entry)
            .ok_or_else(|| KomaError::LookupFailure(entry.to_string()))?
            .attach_still(still);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), KomaError> {
        let mut file = RDBFile::new();
        for (name, record) in &self.records {
            file.add(name, record)?;
        }
        file.save(path)?;
        info!(resource = "library", assets = self.records.len(), "library saved");
        Ok(())
    }
}

/// Read access to the preview stored with an asset.
///
/// Implementations are called from loader worker threads.
pub trait PreviewSource: Send + Sync {
    /// Returns `Ok(None)` when the asset exists but carries no preview.
    fn fetch_preview(
        &self,
        entry: DatabaseEntry<'_>,
        asset_path: &Path,
    ) -> Result<Option<PersistedPreview>, KomaError>;
}

/// Opens the asset file read-only for every request and drops the mapping
/// once the preview has been copied out.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdbPreviewSource;

impl PreviewSource for RdbPreviewSource {
    fn fetch_preview(
        &self,
        entry: DatabaseEntry<'_>,
        asset_path: &Path,
    ) -> Result<Option<PersistedPreview>, KomaError> {
        let view = RDBView::load(asset_path)?;
        if !view.contains(entry) {
            return Err(KomaError::LookupFailure(entry.to_string()));
        }
        let record = view.fetch::<AssetRecord>(entry)?;
        info!(
            resource = "preview",
            entry = %entry,
            source = "rdb",
            stored = record.preview.is_some()
        );
        Ok(record.preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RdbErr, preview::{Atlas, encode}};

    fn library_with_walk() -> AssetLibrary {
        let mut library = AssetLibrary::new();
        let mut walk = AssetRecord::new("walk", AssetKind::Animation);
        walk.attach_preview(encode(&Atlas::new("walk", 4, 2)));
        library.insert(walk);
        library.insert(AssetRecord::new("idle_pose", AssetKind::Pose));
        library
    }

    #[test]
    fn save_and_reopen_library() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("library.rdb");
        library_with_walk().save(&path).expect("save");

        let library = AssetLibrary::open(&path).expect("open");
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["idle_pose", "walk"]);
        assert_eq!(library.get("walk").map(|r| r.kind), Some(AssetKind::Animation));
        assert!(library.get("idle_pose").and_then(|r| r.preview.as_ref()).is_none());
    }

    #[test]
    fn attach_preview_requires_known_asset() {
        let mut library = AssetLibrary::new();
        let preview = encode(&Atlas::new("ghost", 1, 1));
        assert!(matches!(
            library.attach_preview("ghost", preview),
            Err(KomaError::LookupFailure(_))
        ));
    }

    #[test]
    fn attach_still_and_name_limit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut library = library_with_walk();
        let still = StillPreview {
            size: 1,
            pixels: vec![0.5; 4],
        };
        library.attach_still("idle_pose", still.clone()).expect("attach");
        assert!(matches!(
            library.attach_still("ghost", still),
            Err(KomaError::LookupFailure(_))
        ));
        library.save(dir.path().join("library.rdb")).expect("save");
        let reopened = AssetLibrary::open(dir.path().join("library.rdb")).expect("open");
        assert_eq!(
            reopened.get("idle_pose").and_then(|r| r.still.as_ref()).map(|s| s.size),
            Some(1)
        );

        library.insert(AssetRecord::new("x".repeat(65), AssetKind::Pose));
        assert!(matches!(
            library.save(dir.path().join("too_long.rdb")),
            Err(KomaError::RDBFileError(RdbErr::NameTooLong(_)))
        ));
    }

    #[test]
    fn source_reads_stored_preview() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("library.rdb");
        library_with_walk().save(&path).expect("save");

        let source = RdbPreviewSource;
        let preview = source
            .fetch_preview("walk", &path)
            .expect("fetch")
            .expect("walk has a preview");
        assert_eq!(preview.frames_total, 4);

        assert!(source.fetch_preview("idle_pose", &path).expect("fetch").is_none());
        assert!(matches!(
            source.fetch_preview("run", &path),
            Err(KomaError::LookupFailure(_))
        ));
    }
}
