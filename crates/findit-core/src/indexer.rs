//! Layered Indexer (§4.1) — the heart of the system. Turns one registered
//! media file into its full clip record set by advancing through four
//! strictly-ordered layers (metadata → clipVector → stt → textDescription),
//! persisting `(index_layer, index_status)` after each one so a crash or
//! cancellation mid-file resumes from the highest completed layer rather
//! than redoing work.
//!
//! The worker-pool / per-file task boundary follows the reference daemon's
//! bounded-queue dispatch: each file is one task, layers inside a file run
//! sequentially, and tasks for different files may interleave freely. Only
//! the textDescription layer's VLM call passes through the shared
//! [`crate::network::RateLimiter`] — everything else runs at whatever rate
//! the worker pool schedules it.

use crate::embed::EmbeddingProvider;
use crate::error::{FindItError, Result};
use crate::media::{self, MediaProbe};
use crate::network::{ConnectivityObserver, RateLimiter, RetryPolicy};
use crate::segment_clips::{segment_video, single_span};
use crate::storage::folder_db::FolderDb;
use crate::storage::global_db::GlobalDb;
use crate::storage::model::{Clip, ClipLists, IndexStatus, MediaType, Video};
use crate::storage::sync_clip;
use crate::vector_index::VectorIndex;
use crate::vlm::{describe_clip_text, ClipPromptInput, VlmClient};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One of the four ordered indexing stages (§4.1). `Ord` follows
/// declaration order so `layer as i32` / comparisons line up with the
/// `index_layer` column's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexLayer {
    Metadata = 0,
    ClipVector = 1,
    Stt = 2,
    TextDescription = 3,
}

impl IndexLayer {
    pub const ALL: [IndexLayer; 4] = [
        IndexLayer::Metadata,
        IndexLayer::ClipVector,
        IndexLayer::Stt,
        IndexLayer::TextDescription,
    ];

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    /// The layer-applicability matrix (§4.1): which layers run at all for a
    /// given media type.
    pub fn applicable(self, media_type: MediaType) -> bool {
        match (media_type, self) {
            (MediaType::Audio, IndexLayer::ClipVector) => false,
            (MediaType::Audio, IndexLayer::TextDescription) => false,
            (MediaType::Photo, IndexLayer::Stt) => false,
            _ => true,
        }
    }

    /// The `(index_status)` this layer's successful completion writes,
    /// alongside `index_layer = self.ordinal()`.
    fn completed_status(self) -> IndexStatus {
        match self {
            IndexLayer::Metadata => IndexStatus::MetadataDone,
            IndexLayer::ClipVector => IndexStatus::VectorsDone,
            IndexLayer::Stt => IndexStatus::SttDone,
            IndexLayer::TextDescription => IndexStatus::Completed,
        }
    }

    /// The transient "running" status written before the layer starts, for
    /// the two layers the data model gives one (§3 `index_status` enum).
    /// The other two layers have no dedicated running state, so callers
    /// skip the pre-write for them.
    fn running_status(self) -> Option<IndexStatus> {
        match self {
            IndexLayer::Stt => Some(IndexStatus::SttRunning),
            IndexLayer::TextDescription => Some(IndexStatus::VisionRunning),
            _ => None,
        }
    }
}

/// The subscription/auth collaborator (§1: out of scope, treated as an
/// opaque bearer-token vendor) is summarized down to the two fields the
/// core actually branches on, per §9's design note — the core never sees
/// the reactive account/subscription object the source observed, only
/// this snapshot, refreshed by the caller whenever it changes.
#[derive(Debug, Clone, Copy)]
pub struct CloudAccess {
    pub is_cloud_enabled: bool,
    pub monthly_budget_usd: Option<f64>,
}

impl Default for CloudAccess {
    fn default() -> Self {
        Self {
            is_cloud_enabled: true,
            monthly_budget_usd: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Bounded worker-pool size for the daemon's per-file dispatch; the
    /// indexer module itself processes one file at a time per call, the
    /// daemon is responsible for fanning `index_file` out across this many
    /// concurrent tasks (§4.1 concurrency: `min(cores, 4)` default).
    pub worker_pool_size: usize,
    /// Layers to never run regardless of resume state, e.g. an
    /// offline/no-cloud-budget run that should skip textDescription.
    pub skip_layers: HashSet<IndexLayer>,
    pub retry: RetryPolicy,
    pub vlm_model: String,
    /// Gates layer 3 (and the remote Gemini embedder) independent of
    /// whether a gateway key is configured — §9's subscription summary.
    pub cloud: CloudAccess,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(4),
            skip_layers: HashSet::new(),
            retry: RetryPolicy::default(),
            vlm_model: "openrouter/auto".to_string(),
            cloud: CloudAccess::default(),
        }
    }
}

/// Every collaborator `index_file` needs for one file, gathered into one
/// struct rather than threaded as individual arguments — mirrors
/// [`crate::search::SearchContext`]'s shape, since both are "the daemon's
/// long-lived handles, borrowed for one call."
pub struct Indexer<'a> {
    pub config: &'a IndexerConfig,
    pub folder_db: &'a FolderDb,
    pub folder_path: &'a Path,
    pub global: &'a mut GlobalDb,
    pub image_index: Option<&'a mut VectorIndex>,
    pub text_index: Option<&'a mut VectorIndex>,
    pub clip_embedder: Option<&'a mut EmbeddingProvider>,
    pub text_embedder: Option<&'a mut EmbeddingProvider>,
    pub vlm: Option<&'a VlmClient>,
    pub rate_limiter: Option<&'a RateLimiter>,
    /// Consulted on a transient VLM failure before retrying (§4.1: "next
    /// schedule attempt waits on the Network Resilience observer").
    pub connectivity: Option<&'a ConnectivityObserver>,
}

/// Outcome of running one file through as many layers as apply this call.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub video_id: i64,
    pub reached_layer: i32,
    pub status: IndexStatus,
    /// Per-clip VLM failures that didn't stop the file (§4.1: "never fail
    /// the whole file for one bad clip"), surfaced for logging.
    pub clip_warnings: Vec<String>,
}

/// Outcome of attempting one layer, distinguishing "actually ran" from
/// "deferred because a required collaborator (CLIP model, VLM gateway,
/// ...) isn't provisioned right now" — only the former may advance the
/// persisted `(index_layer, index_status)` watermark. Conflating the two
/// (as a plain `Ok` once did for clipVector) would let the watermark pass
/// a layer that never actually ran, hiding it from every future resume.
enum LayerRun {
    Ran(Vec<String>),
    Deferred(Vec<String>),
}

impl<'a> Indexer<'a> {
    /// Run every applicable, non-skipped layer beyond `video.index_layer`
    /// for one file, stopping at the first layer that fails with a
    /// non-transient (or retry-exhausted) error.
    ///
    /// Resume rule (§4.1): layer `L` runs iff it's applicable for the
    /// media type, `L > video.index_layer`, and `L` isn't in
    /// `config.skip_layers`. A fresh video starts at `index_layer = -1`
    /// (schema default) so every applicable layer runs on the first pass.
    ///
    /// Once a layer is deferred (its collaborator unavailable this run),
    /// later applicable layers still run best-effort — e.g. textDescription
    /// can still degrade gracefully per clip — but the watermark is frozen
    /// at the last layer that actually completed, so the deferred layer
    /// (and everything after it) is retried in full on the next run rather
    /// than being skipped forever by the resume guard above.
    pub async fn index_file(&mut self, video_id: i64) -> Result<IndexOutcome> {
        let mut video = self.folder_db.get_video(video_id)?;
        let mut clip_warnings = Vec::new();
        let mut degraded = false;

        for layer in IndexLayer::ALL {
            if !layer.applicable(video.media_type) {
                continue;
            }
            if layer.ordinal() <= video.index_layer {
                continue;
            }
            if self.config.skip_layers.contains(&layer) {
                continue;
            }

            if !degraded {
                if let Some(running) = layer.running_status() {
                    let _ = self.folder_db.set_status(video_id, running);
                }
            }

            let result = match layer {
                IndexLayer::Metadata => self.run_metadata(&video).map(LayerRun::Ran),
                IndexLayer::ClipVector => self.run_clip_vector(&video),
                IndexLayer::Stt => self.run_stt(&video).map(LayerRun::Ran),
                IndexLayer::TextDescription => self.run_text_description(&video).await.map(LayerRun::Ran),
            };

            match result {
                Ok(LayerRun::Ran(warnings)) => {
                    clip_warnings.extend(warnings);
                    if !degraded {
                        self.folder_db
                            .record_layer_progress(video_id, None, layer.ordinal(), layer.completed_status())?;
                        video = self.folder_db.get_video(video_id)?;
                    }
                }
                Ok(LayerRun::Deferred(warnings)) => {
                    clip_warnings.extend(warnings);
                    degraded = true;
                }
                Err(e) if e.is_transient() => {
                    self.folder_db.record_failure(video_id, &e.to_string())?;
                    return Ok(IndexOutcome {
                        video_id,
                        reached_layer: video.index_layer,
                        status: IndexStatus::Failed,
                        clip_warnings,
                    });
                }
                Err(e) => {
                    self.folder_db.record_failure(video_id, &e.to_string())?;
                    return Ok(IndexOutcome {
                        video_id,
                        reached_layer: video.index_layer,
                        status: IndexStatus::Failed,
                        clip_warnings,
                    });
                }
            }
        }

        Ok(IndexOutcome {
            video_id,
            reached_layer: video.index_layer,
            status: video.index_status,
            clip_warnings,
        })
    }

    fn sync_clip_to_global(&mut self, video: &Video, clip: &Clip) -> Result<i64> {
        sync_clip(self.global, self.folder_path.to_string_lossy().as_ref(), video, clip)
    }

    /// Layer 0: probe duration/geometry, segment into clips, persist.
    /// A decoder failure counts as success (§4.1 failure semantics) because
    /// [`segment_video`] already falls back to fixed-interval segmentation
    /// when no shot boundaries are available — this workspace has no shot
    /// detector wired up, so every video takes that fallback path; that is
    /// a deliberate simplification, not a bug (see DESIGN.md).
    fn run_metadata(&mut self, video: &Video) -> Result<Vec<String>> {
        let path = Path::new(&video.path);
        let probe = probe_or_degrade(path, video.media_type);

        let spans: Vec<(f64, f64)> = match video.media_type {
            MediaType::Photo => single_span(0.0).into_iter().map(|s| (s.start, s.end)).collect(),
            MediaType::Audio => single_span(probe.duration).into_iter().map(|s| (s.start, s.end)).collect(),
            MediaType::Video => segment_video(probe.duration, &[]).into_iter().map(|s| (s.start, s.end)).collect(),
        };

        self.folder_db.insert_clips(video.id, &spans)?;
        self.folder_db
            .record_layer_progress(video.id, Some(probe.duration), IndexLayer::Metadata.ordinal(), IndexStatus::MetadataDone)?;

        let mut video = video.clone();
        video.duration = probe.duration;
        for clip in self.folder_db.get_clips_for_video(video.id)? {
            self.sync_clip_to_global(&video, &clip)?;
        }
        Ok(Vec::new())
    }

    /// Layer 1: one keyframe per clip, CLIP-encoded, persisted and added to
    /// the image vector index. A missing CLIP model is not a file failure
    /// (§4.1: "skip layer 1 for this run, do not mark failed") — the layer
    /// is deferred rather than completed (see [`LayerRun::Deferred`]) so
    /// the resume watermark doesn't advance past it — the layer is retried
    /// in full on a later run once a CLIP model is provisioned.
    fn run_clip_vector(&mut self, video: &Video) -> Result<LayerRun> {
        let Some(embedder) = self.clip_embedder.as_deref_mut() else {
            return Ok(LayerRun::Deferred(vec!["clipVector unavailable: no CLIP model loaded".to_string()]));
        };
        if !embedder.is_available() {
            return Ok(LayerRun::Deferred(vec!["clipVector unavailable: no CLIP model loaded".to_string()]));
        }

        let path = Path::new(&video.path);
        let clips = self.folder_db.get_clips_for_video(video.id)?;
        let mut warnings = Vec::new();

        for clip in clips {
            let midpoint = (clip.start_time + clip.end_time) / 2.0;
            let keyframe_path = if video.media_type == MediaType::Photo {
                path.to_path_buf()
            } else {
                let thumb = FolderDb::thumbs_dir(self.folder_path, video.id).join(format!("{}.jpg", clip.id));
                if let Some(parent) = thumb.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                match media::extract_keyframe(path, midpoint, &thumb) {
                    Ok(p) => p,
                    Err(e) => {
                        warnings.push(format!("clip {}: keyframe extraction failed: {e}", clip.id));
                        continue;
                    }
                }
            };

            let embedding = match embedder.embed_image(&keyframe_path) {
                Ok(v) => v,
                Err(e) => {
                    warnings.push(format!("clip {}: CLIP embedding failed: {e}", clip.id));
                    continue;
                }
            };

            let thumb_str = keyframe_path.to_string_lossy().to_string();
            self.folder_db.update_clip_vector(
                clip.id,
                &embedding,
                embedder.name(),
                (video.media_type != MediaType::Photo).then_some(thumb_str.as_str()),
            )?;

            let updated = self.folder_db.get_clip(clip.id)?;
            let rowid = self.sync_clip_to_global(video, &updated)?;
            if let Some(index) = self.image_index.as_deref_mut() {
                index.add(rowid, &embedding)?;
            }
        }

        Ok(LayerRun::Ran(warnings))
    }

    /// Layer 2: extract the audio track, transcribe, slice per clip.
    fn run_stt(&mut self, video: &Video) -> Result<Vec<String>> {
        let path = Path::new(&video.path);
        let audio_path = FolderDb::thumbs_dir(self.folder_path, video.id).join("audio.wav");
        if let Some(parent) = audio_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let extracted = media::extract_audio_track(path, &audio_path)?;
        let segments = crate::stt::transcribe(&extracted)?;

        let clips = self.folder_db.get_clips_for_video(video.id)?;
        for clip in clips {
            let slice = crate::stt::slice_for_clip(&segments, clip.start_time, clip.end_time);
            if !slice.is_empty() {
                self.folder_db.update_clip_transcript(clip.id, &slice)?;
            }
            let updated = self.folder_db.get_clip(clip.id)?;
            self.sync_clip_to_global(video, &updated)?;
        }
        let _ = std::fs::remove_file(&audio_path);
        Ok(Vec::new())
    }

    /// Layer 3: per-clip VLM description + text embedding, with retry on
    /// transient gateway failures (§4.1: initial 1s, cap 60s, 6 attempts).
    /// A missing gateway key degrades the same way a missing CLIP model
    /// does in layer 1: recorded complete, not failed, with a warning.
    async fn run_text_description(&mut self, video: &Video) -> Result<Vec<String>> {
        if !self.config.cloud.is_cloud_enabled {
            return Ok(vec!["textDescription unavailable: cloud access disabled".to_string()]);
        }
        let Some(vlm) = self.vlm else {
            return Ok(vec!["textDescription unavailable: no VLM gateway configured".to_string()]);
        };
        if !vlm.is_available() {
            return Ok(vec!["textDescription unavailable: no VLM gateway configured".to_string()]);
        }

        let path = Path::new(&video.path);
        let clips = self.folder_db.get_clips_for_video(video.id)?;
        let mut warnings = Vec::new();

        for clip in clips {
            let keyframe_path = match clip_keyframe_path(&clip, video, path) {
                Some(p) => p,
                None => {
                    warnings.push(format!("clip {}: no keyframe available for VLM prompt", clip.id));
                    continue;
                }
            };

            let input = ClipPromptInput {
                keyframe_path: &keyframe_path,
                transcript: clip.transcript.as_deref(),
                prior_tags: &clip.lists.tags,
            };

            let description = match self.call_vlm_with_retry(vlm, &input).await {
                Ok(d) => d,
                Err(e) => {
                    warnings.push(format!("clip {}: VLM description failed: {e}", clip.id));
                    continue;
                }
            };

            let lists = ClipLists {
                subjects: description.subjects.clone(),
                actions: description.actions.clone(),
                objects: description.objects.clone(),
                colors: description.colors.clone(),
                tags: description.tags.clone(),
                user_tags: clip.lists.user_tags.clone(),
            };

            let text = describe_clip_text(&description);
            let text_embedding = if !text.trim().is_empty() {
                self.text_embedder.as_deref_mut().and_then(|e| e.embed_text(&text).ok())
            } else {
                None
            };
            let embedder_name = self.text_embedder.as_deref().map(|e| e.name());

            self.folder_db.update_clip_description(
                clip.id,
                description.description.as_deref(),
                description.scene.as_deref(),
                &lists,
                description.mood.as_deref(),
                description.shot_type.as_deref(),
                description.lighting.as_deref(),
                match (&text_embedding, embedder_name) {
                    (Some(v), Some(name)) => Some((v.as_slice(), name)),
                    _ => None,
                },
            )?;

            let updated = self.folder_db.get_clip(clip.id)?;
            let rowid = self.sync_clip_to_global(video, &updated)?;
            if let (Some(index), Some(embedding)) = (self.text_index.as_deref_mut(), text_embedding.as_ref()) {
                index.add(rowid, embedding)?;
            }
        }

        Ok(warnings)
    }

    async fn call_vlm_with_retry(
        &self,
        vlm: &VlmClient,
        input: &ClipPromptInput<'_>,
    ) -> Result<crate::vlm::ClipDescription> {
        let mut attempt = 0;
        loop {
            if let Some(observer) = self.connectivity {
                // Fails open on `Unknown`/`Connected`; blocks here only
                // while a prior call has already recorded `Disconnected`.
                let _ = observer.wait_for_connection(self.config.retry.max).await;
            }
            if let Some(limiter) = self.rate_limiter {
                limiter.acquire().await;
            }
            match vlm.describe_clip(input) {
                Ok(d) => {
                    if let Some(observer) = self.connectivity {
                        observer.mark_online();
                    }
                    return Ok(d);
                }
                Err(e) if e.is_transient() && self.config.retry.should_retry(attempt) => {
                    if let Some(observer) = self.connectivity {
                        observer.mark_offline();
                    }
                    tokio::time::sleep(self.config.retry.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Probe a file, degrading to a zero-duration, unprobed result rather than
/// propagating the error — layer 0 treats a decoder failure as success via
/// the fixed-interval segmentation fallback (§4.1).
fn probe_or_degrade(path: &Path, expected: MediaType) -> MediaProbe {
    media::probe_media(path).unwrap_or(MediaProbe {
        media_type: expected,
        duration: 0.0,
        width: None,
        height: None,
        fps: None,
        probe_succeeded: false,
    })
}

/// The keyframe a textDescription prompt should use: the clipVector
/// layer's thumbnail when it ran, the source file directly for a photo
/// (which has no separate thumbnail), or `None` when clipVector was
/// skipped for a video/audio file and no thumbnail exists to fall back on.
fn clip_keyframe_path(clip: &Clip, video: &Video, source: &Path) -> Option<PathBuf> {
    if video.media_type == MediaType::Photo {
        return Some(source.to_path_buf());
    }
    clip.thumbnail_path.as_ref().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_applicability_matches_matrix() {
        assert!(IndexLayer::Metadata.applicable(MediaType::Audio));
        assert!(!IndexLayer::ClipVector.applicable(MediaType::Audio));
        assert!(IndexLayer::Stt.applicable(MediaType::Video));
        assert!(!IndexLayer::Stt.applicable(MediaType::Photo));
        assert!(!IndexLayer::TextDescription.applicable(MediaType::Audio));
        assert!(IndexLayer::TextDescription.applicable(MediaType::Photo));
    }

    #[test]
    fn layer_ordinals_match_declaration_order() {
        assert_eq!(IndexLayer::Metadata.ordinal(), 0);
        assert_eq!(IndexLayer::ClipVector.ordinal(), 1);
        assert_eq!(IndexLayer::Stt.ordinal(), 2);
        assert_eq!(IndexLayer::TextDescription.ordinal(), 3);
    }

    #[test]
    fn completed_status_maps_each_layer() {
        assert_eq!(IndexLayer::Metadata.completed_status(), IndexStatus::MetadataDone);
        assert_eq!(IndexLayer::ClipVector.completed_status(), IndexStatus::VectorsDone);
        assert_eq!(IndexLayer::Stt.completed_status(), IndexStatus::SttDone);
        assert_eq!(IndexLayer::TextDescription.completed_status(), IndexStatus::Completed);
    }

    #[tokio::test]
    async fn index_file_runs_metadata_layer_for_a_photo() {
        let dir = tempfile::tempdir().unwrap();
        let folder_db = FolderDb::open_for_folder(dir.path()).unwrap();
        let folder_id = folder_db.register_folder(&dir.path().to_string_lossy(), None).unwrap();

        let photo_path = dir.path().join("photo.jpg");
        std::fs::write(&photo_path, b"not a real jpeg, just bytes").unwrap();
        let video_id = folder_db
            .upsert_video(
                folder_id,
                &photo_path.to_string_lossy(),
                "photo.jpg",
                MediaType::Photo,
                27,
                "deadbeef",
            )
            .unwrap();

        let config = IndexerConfig {
            skip_layers: [IndexLayer::ClipVector, IndexLayer::TextDescription].into_iter().collect(),
            ..Default::default()
        };
        let mut global = GlobalDb::in_memory().unwrap();
        let mut indexer = Indexer {
            config: &config,
            folder_db: &folder_db,
            folder_path: dir.path(),
            global: &mut global,
            image_index: None,
            text_index: None,
            clip_embedder: None,
            text_embedder: None,
            vlm: None,
            rate_limiter: None,
            connectivity: None,
        };

        let outcome = indexer.index_file(video_id).await.unwrap();
        assert_eq!(outcome.reached_layer, 0);
        assert_eq!(outcome.status, IndexStatus::MetadataDone);

        let clips = folder_db.get_clips_for_video(video_id).unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!((clips[0].start_time, clips[0].end_time), (0.0, 0.0));
    }

    #[tokio::test]
    async fn text_description_skips_with_warning_when_cloud_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let folder_db = FolderDb::open_for_folder(dir.path()).unwrap();
        let folder_id = folder_db.register_folder(&dir.path().to_string_lossy(), None).unwrap();

        let photo_path = dir.path().join("photo.jpg");
        std::fs::write(&photo_path, b"not a real jpeg, just bytes").unwrap();
        let video_id = folder_db
            .upsert_video(folder_id, &photo_path.to_string_lossy(), "photo.jpg", MediaType::Photo, 27, "deadbeef")
            .unwrap();

        let config = IndexerConfig {
            skip_layers: [IndexLayer::ClipVector].into_iter().collect(),
            cloud: CloudAccess { is_cloud_enabled: false, monthly_budget_usd: None },
            ..Default::default()
        };
        let vlm = VlmClient::new(Some("key".to_string()), "test-model");
        let mut global = GlobalDb::in_memory().unwrap();
        let mut indexer = Indexer {
            config: &config,
            folder_db: &folder_db,
            folder_path: dir.path(),
            global: &mut global,
            image_index: None,
            text_index: None,
            clip_embedder: None,
            text_embedder: None,
            vlm: Some(&vlm),
            rate_limiter: None,
            connectivity: None,
        };

        let outcome = indexer.index_file(video_id).await.unwrap();
        assert_eq!(outcome.status, IndexStatus::Completed, "disabled cloud access still completes the file");
        assert!(outcome.clip_warnings.iter().any(|w| w.contains("cloud access disabled")));
    }

    #[tokio::test]
    async fn index_file_resume_does_not_recompute_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let folder_db = FolderDb::open_for_folder(dir.path()).unwrap();
        let folder_id = folder_db.register_folder(&dir.path().to_string_lossy(), None).unwrap();

        let audio_path = dir.path().join("clip.wav");
        std::fs::write(&audio_path, b"not really audio").unwrap();
        let video_id = folder_db
            .upsert_video(folder_id, &audio_path.to_string_lossy(), "clip.wav", MediaType::Audio, 10, "cafebabe")
            .unwrap();

        let config = IndexerConfig::default();
        let mut global = GlobalDb::in_memory().unwrap();
        {
            let mut indexer = Indexer {
                config: &config,
                folder_db: &folder_db,
                folder_path: dir.path(),
                global: &mut global,
                image_index: None,
                text_index: None,
                clip_embedder: None,
                text_embedder: None,
                vlm: None,
                rate_limiter: None,
                connectivity: None,
            };
            indexer.index_file(video_id).await.unwrap();
        }

        let after_first = folder_db.get_video(video_id).unwrap();
        assert_eq!(after_first.index_layer, 2, "audio applicability skips clipVector/textDescription");

        // Re-running is a no-op: clip count and index_layer are unchanged.
        let clips_before = folder_db.get_clips_for_video(video_id).unwrap().len();
        {
            let mut indexer = Indexer {
                config: &config,
                folder_db: &folder_db,
                folder_path: dir.path(),
                global: &mut global,
                image_index: None,
                text_index: None,
                clip_embedder: None,
                text_embedder: None,
                vlm: None,
                rate_limiter: None,
                connectivity: None,
            };
            indexer.index_file(video_id).await.unwrap();
        }
        let after_second = folder_db.get_video(video_id).unwrap();
        assert_eq!(after_second.index_layer, after_first.index_layer);
        assert_eq!(folder_db.get_clips_for_video(video_id).unwrap().len(), clips_before);
    }

    #[tokio::test]
    async fn index_file_defers_clip_vector_when_model_missing() {
        let dir = tempfile::tempdir().unwrap();
        let folder_db = FolderDb::open_for_folder(dir.path()).unwrap();
        let folder_id = folder_db.register_folder(&dir.path().to_string_lossy(), None).unwrap();

        let photo_path = dir.path().join("photo.jpg");
        std::fs::write(&photo_path, b"not a real jpeg, just bytes").unwrap();
        let video_id = folder_db
            .upsert_video(folder_id, &photo_path.to_string_lossy(), "photo.jpg", MediaType::Photo, 27, "deadbeef")
            .unwrap();

        // TextDescription is skipped outright so this test isolates the
        // clipVector watermark behavior from the VLM-gateway path.
        let config = IndexerConfig {
            skip_layers: [IndexLayer::TextDescription].into_iter().collect(),
            ..Default::default()
        };
        let mut global = GlobalDb::in_memory().unwrap();

        // First run: no CLIP embedder wired up, so clipVector must defer
        // rather than complete.
        {
            let mut indexer = Indexer {
                config: &config,
                folder_db: &folder_db,
                folder_path: dir.path(),
                global: &mut global,
                image_index: None,
                text_index: None,
                clip_embedder: None,
                text_embedder: None,
                vlm: None,
                rate_limiter: None,
                connectivity: None,
            };
            let outcome = indexer.index_file(video_id).await.unwrap();
            assert_eq!(outcome.reached_layer, 0, "clipVector deferred, watermark frozen at metadata");
            assert_eq!(outcome.status, IndexStatus::MetadataDone);
            assert!(outcome.clip_warnings.iter().any(|w| w.contains("clipVector unavailable")));
        }

        let video = folder_db.get_video(video_id).unwrap();
        assert_eq!(video.index_layer, 0, "index_layer must not advance past the deferred layer");
        assert_eq!(video.index_status, IndexStatus::MetadataDone);

        // Second run, still no CLIP embedder: clipVector must be retried
        // (not silently skipped forever by the resume guard) and still
        // report itself unavailable.
        {
            let mut indexer = Indexer {
                config: &config,
                folder_db: &folder_db,
                folder_path: dir.path(),
                global: &mut global,
                image_index: None,
                text_index: None,
                clip_embedder: None,
                text_embedder: None,
                vlm: None,
                rate_limiter: None,
                connectivity: None,
            };
            let outcome = indexer.index_file(video_id).await.unwrap();
            assert_eq!(outcome.reached_layer, 0);
            assert!(outcome.clip_warnings.iter().any(|w| w.contains("clipVector unavailable")));
        }
    }
}
