//! Folder registry (§3, §8 invariants): the daemon's record of which
//! folders are registered, backing each with its own Folder DB while
//! sharing one Global DB and one pair of vector indices across all of
//! them, per §4.5/§4.6's "one index spans every folder" design.
//!
//! Replaces the reference daemon's project auto-discovery (`.git`,
//! `package.json`, shell-history scanning) entirely — FindIt folders are
//! only ever added by explicit user action, never discovered.

use findit_core::{
    embed::{ApiKey, ClipEmbedder, EmbeddingProvider, EMBEDDING_DIM},
    hierarchy::{self, RegistrationPlan},
    network::{ConnectivityObserver, RateLimiter},
    vlm::VlmClient,
    FolderDb, GlobalDb, IndexLayer, IndexerConfig, Result as CoreResult, VectorIndex,
};
use findit_core::error::FindItError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Config;

/// A registered folder's path is stable across restarts, but its local
/// `videos.id` values are only unique within that one Folder DB. The
/// daemon packs a folder's registry position into the high digits of the
/// id it hands out over IPC, so a single `i64` can still address one
/// video across the whole library without a separate id-mapping table.
const VIDEO_ID_FOLDER_SHIFT: i64 = 1_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    path: PathBuf,
    volume_uuid: Option<String>,
}

pub struct FolderEntry {
    pub path: PathBuf,
    pub volume_uuid: Option<String>,
    pub db: FolderDb,
    pub watching: bool,
    /// When this folder was last swept by the periodic stale-folder
    /// rescan (§0.2's `[indexing]` `stale_folder_rescan_interval`),
    /// independent of watcher-driven events.
    pub last_rescan: Instant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FolderSummary {
    pub path: String,
    pub video_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
    pub clip_count: i64,
    pub is_watching: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LibrarySummary {
    pub folder_count: usize,
    pub video_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
    pub clip_count: i64,
    pub total_duration: f64,
}

pub struct Library {
    app_dir: PathBuf,
    folders: Vec<FolderEntry>,
    pub global: GlobalDb,
    pub image_index: VectorIndex,
    pub text_index: VectorIndex,
    pub clip_embedder: Option<EmbeddingProvider>,
    pub text_embedder: Option<EmbeddingProvider>,
    pub vlm: Option<VlmClient>,
    pub rate_limiter: RateLimiter,
    pub indexer_config: IndexerConfig,
    /// Shared across every folder's indexing task so a transient failure
    /// on one file's VLM call gates the next schedule attempt on any
    /// other file too (§4.1/§4.8).
    pub connectivity: ConnectivityObserver,
}

fn registry_path(app_dir: &Path) -> PathBuf {
    app_dir.join("folders.json")
}

fn global_db_path(app_dir: &Path) -> PathBuf {
    app_dir.join("global.db")
}

fn image_index_path(app_dir: &Path) -> PathBuf {
    app_dir.join("vectors").join("image.idx")
}

fn text_index_path(app_dir: &Path) -> PathBuf {
    app_dir.join("vectors").join("text.idx")
}

impl Library {
    /// Load the folder registry and open every store it names, creating
    /// the Global DB and vector indices fresh the first time the daemon
    /// runs against a given `app_dir`.
    pub fn load(app_dir: &Path, config: &Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(app_dir)?;
        std::fs::create_dir_all(app_dir.join("vectors"))?;

        let entries: Vec<RegistryEntry> = match std::fs::read_to_string(registry_path(app_dir)) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        let mut folders = Vec::with_capacity(entries.len());
        for entry in entries {
            let db = FolderDb::open_for_folder(&entry.path)?;
            folders.push(FolderEntry {
                path: entry.path,
                volume_uuid: entry.volume_uuid,
                db,
                watching: true,
                last_rescan: Instant::now(),
            });
        }

        let global = GlobalDb::open(&global_db_path(app_dir))?;
        let image_index = load_or_new_index(&image_index_path(app_dir))?;
        let text_index = load_or_new_index(&text_index_path(app_dir))?;

        let clip_embedder = resolve_clip_embedder();
        let text_embedder = resolve_text_embedder(config);
        let vlm = config.vlm_api_key().map(|key| {
            VlmClient::with_config(
                Some(key),
                config.vlm_model(),
                config.vlm_gateway_base_url(),
                Some(config.vlm_gateway_timeout()),
            )
        });
        let rate_limiter = RateLimiter::new(config.vlm_requests_per_second(), config.max_concurrent_vlm_calls());

        let mut indexer_config = IndexerConfig {
            vlm_model: config.vlm_model(),
            cloud: findit_core::indexer::CloudAccess {
                is_cloud_enabled: config.is_cloud_enabled(),
                monthly_budget_usd: config.monthly_budget_usd(),
            },
            ..Default::default()
        };
        if let Some(size) = config.worker_pool_size() {
            indexer_config.worker_pool_size = size;
        }
        indexer_config.skip_layers = config
            .skip_layers()
            .iter()
            .filter_map(|name| parse_layer_name(name))
            .collect::<HashSet<_>>();

        Ok(Self {
            app_dir: app_dir.to_path_buf(),
            folders,
            global,
            image_index,
            text_index,
            clip_embedder,
            text_embedder,
            vlm,
            rate_limiter,
            indexer_config,
            connectivity: ConnectivityObserver::new(),
        })
    }

    fn save_registry(&self) -> anyhow::Result<()> {
        let entries: Vec<RegistryEntry> = self
            .folders
            .iter()
            .map(|f| RegistryEntry {
                path: f.path.clone(),
                volume_uuid: f.volume_uuid.clone(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(registry_path(&self.app_dir), json)?;
        Ok(())
    }

    pub fn persist_vector_indices(&self) -> CoreResult<()> {
        self.image_index.save(&image_index_path(&self.app_dir))?;
        self.text_index.save(&text_index_path(&self.app_dir))?;
        Ok(())
    }

    fn registered_paths(&self) -> Vec<PathBuf> {
        self.folders.iter().map(|f| f.path.clone()).collect()
    }

    /// Register `path` per §8's hierarchy invariant: an exact duplicate is
    /// a no-op, a path nested inside an existing root is rejected (it must
    /// be browsed through the parent, not re-registered), and anything
    /// else becomes its own root even if it encloses existing ones.
    pub fn add_folder(&mut self, path: &Path, volume_uuid: Option<String>) -> CoreResult<&Path> {
        let plan = hierarchy::plan_registration(path, &self.registered_paths());
        match plan {
            RegistrationPlan::AlreadyRegistered { existing } => {
                return Err(FindItError::Validation(format!(
                    "{} is already registered",
                    existing.display()
                )))
            }
            RegistrationPlan::Bookmark { parent } => {
                return Err(FindItError::Validation(format!(
                    "{} is inside the already-registered folder {}; browse it through that folder instead",
                    path.display(),
                    parent.display()
                )))
            }
            RegistrationPlan::NewRoot | RegistrationPlan::EnclosesExisting { .. } => {}
        }

        let normalized = hierarchy::normalize(path);
        let db = FolderDb::open_for_folder(&normalized)?;
        db.register_folder(&normalized.to_string_lossy(), volume_uuid.as_deref())?;
        self.folders.push(FolderEntry {
            path: normalized,
            volume_uuid,
            db,
            watching: true,
            last_rescan: Instant::now(),
        });
        let _ = self.save_registry();
        Ok(self.folders.last().unwrap().path.as_path())
    }

    pub fn remove_folder(&mut self, path: &Path) -> CoreResult<bool> {
        let normalized = hierarchy::normalize(path);
        let before = self.folders.len();
        self.folders.retain(|f| f.path != normalized);
        let removed = self.folders.len() != before;
        if removed {
            let _ = self.global.remove_folder(&normalized.to_string_lossy());
            let _ = self.save_registry();
        }
        Ok(removed)
    }

    pub fn folders(&self) -> &[FolderEntry] {
        &self.folders
    }

    pub fn folders_mut(&mut self) -> &mut [FolderEntry] {
        &mut self.folders
    }

    pub fn folder_index_for_path(&self, path: &str) -> Option<usize> {
        let normalized = hierarchy::normalize(Path::new(path));
        self.folders.iter().position(|f| f.path == normalized)
    }

    pub fn folder_entry_mut(&mut self, index: usize) -> Option<&mut FolderEntry> {
        self.folders.get_mut(index)
    }

    pub fn encode_video_id(folder_index: usize, local_id: i64) -> i64 {
        (folder_index as i64) * VIDEO_ID_FOLDER_SHIFT + local_id
    }

    pub fn decode_video_id(video_id: i64) -> (usize, i64) {
        ((video_id / VIDEO_ID_FOLDER_SHIFT) as usize, video_id % VIDEO_ID_FOLDER_SHIFT)
    }

    pub fn list_folder_summaries(&self) -> CoreResult<Vec<FolderSummary>> {
        let mut out = Vec::with_capacity(self.folders.len());
        for folder in &self.folders {
            let folder_id = folder
                .db
                .register_folder(&folder.path.to_string_lossy(), folder.volume_uuid.as_deref())?;
            let stats = folder.db.stats(folder_id)?;
            out.push(FolderSummary {
                path: folder.path.to_string_lossy().to_string(),
                video_count: stats.video_count,
                completed_count: stats.completed_count,
                failed_count: stats.failed_count,
                clip_count: stats.clip_count,
                is_watching: folder.watching,
            });
        }
        Ok(out)
    }

    pub fn library_summary(&self) -> CoreResult<LibrarySummary> {
        let summaries = self.list_folder_summaries()?;
        let mut total_duration = 0.0;
        let mut video_count = 0;
        let mut completed_count = 0;
        let mut failed_count = 0;
        let mut clip_count = 0;
        for folder in &self.folders {
            let folder_id = folder
                .db
                .register_folder(&folder.path.to_string_lossy(), folder.volume_uuid.as_deref())?;
            let stats = folder.db.stats(folder_id)?;
            total_duration += stats.total_duration;
            video_count += stats.video_count;
            completed_count += stats.completed_count;
            failed_count += stats.failed_count;
            clip_count += stats.clip_count;
        }
        Ok(LibrarySummary {
            folder_count: summaries.len(),
            video_count,
            completed_count,
            failed_count,
            clip_count,
            total_duration,
        })
    }
}

/// Recursively enumerate a folder's media files for an initial scan or a
/// rescan after a watcher overflow, applying the same extension and
/// skipped-directory rules as the live event filter (§4.7) so a fresh
/// scan and incremental events never disagree about what's indexable.
pub fn scan_media_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    scan_media_files_into(root, &mut out);
    out
}

fn scan_media_files_into(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if crate::watcher::is_skipped_dir(&path) {
            continue;
        }
        if path.is_dir() {
            scan_media_files_into(&path, out);
        } else if crate::watcher::is_media_path(&path) {
            out.push(path);
        }
    }
}

fn load_or_new_index(path: &Path) -> CoreResult<VectorIndex> {
    if path.exists() {
        VectorIndex::load(path)
    } else {
        Ok(VectorIndex::new(EMBEDDING_DIM))
    }
}

fn parse_layer_name(name: &str) -> Option<IndexLayer> {
    match name {
        "metadata" => Some(IndexLayer::Metadata),
        "clip_vector" | "clipVector" => Some(IndexLayer::ClipVector),
        "stt" => Some(IndexLayer::Stt),
        "text_description" | "textDescription" => Some(IndexLayer::TextDescription),
        _ => None,
    }
}

/// CLIP model directory resolution follows the reference embedding
/// loader's convention: a fixed cache path under the user's data
/// directory, populated by `hf-hub` on first use. No env var override
/// exists yet for this daemon; see DESIGN.md.
fn resolve_clip_embedder() -> Option<EmbeddingProvider> {
    let dirs = directories::ProjectDirs::from("", "", "findit")?;
    let model_dir = dirs.data_dir().join("models").join("clip");
    let embedder = ClipEmbedder::new(model_dir);
    if embedder.is_loaded() {
        Some(EmbeddingProvider::Clip(embedder))
    } else {
        None
    }
}

fn resolve_text_embedder(config: &Config) -> Option<EmbeddingProvider> {
    if let Some(key) = config.vlm_api_key() {
        return Some(EmbeddingProvider::Gemini(findit_core::embed::GeminiEmbedder::new(Some(ApiKey::new(key)))));
    }
    let dirs = directories::ProjectDirs::from("", "", "findit")?;
    let model_dir = dirs.data_dir().join("models").join("gemma");
    let embedder = findit_core::embed::GemmaEmbedder::new(model_dir);
    if embedder.is_loaded() {
        Some(EmbeddingProvider::Gemma(embedder))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_round_trips_through_folder_and_local_id() {
        let encoded = Library::encode_video_id(3, 42);
        assert_eq!(Library::decode_video_id(encoded), (3, 42));
    }

    #[test]
    fn video_id_encoding_keeps_folders_disjoint() {
        let a = Library::encode_video_id(0, 999_999_999);
        let b = Library::encode_video_id(1, 0);
        assert!(a < b);
    }

    #[test]
    fn add_folder_rejects_nested_registration() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut library = Library::load(dir.path(), &config).unwrap();

        let parent = dir.path().join("library");
        std::fs::create_dir_all(&parent).unwrap();
        library.add_folder(&parent, None).unwrap();

        let child = parent.join("vacation");
        std::fs::create_dir_all(&child).unwrap();
        let err = library.add_folder(&child, None).unwrap_err();
        assert!(matches!(err, FindItError::Validation(_)));
    }

    #[test]
    fn add_folder_rejects_exact_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut library = Library::load(dir.path(), &config).unwrap();

        let root = dir.path().join("library");
        std::fs::create_dir_all(&root).unwrap();
        library.add_folder(&root, None).unwrap();
        let err = library.add_folder(&root, None).unwrap_err();
        assert!(matches!(err, FindItError::Validation(_)));
    }

    #[test]
    fn remove_folder_drops_registration_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut library = Library::load(dir.path(), &config).unwrap();

        let root = dir.path().join("library");
        std::fs::create_dir_all(&root).unwrap();
        library.add_folder(&root, None).unwrap();
        assert_eq!(library.folders().len(), 1);

        assert!(library.remove_folder(&root).unwrap());
        assert_eq!(library.folders().len(), 0);

        let reloaded = Library::load(dir.path(), &config).unwrap();
        assert_eq!(reloaded.folders().len(), 0);
    }
}
