//! Unix socket server for daemon IPC (§6): every CLI tool call round
//! trips through here, since the daemon is the only process holding open
//! Folder DB / Global DB connections and the shared vector indices.

use crate::config::Config;
use crate::library::{FolderEntry, Library};
use crate::protocol::{
    DaemonStatus, FilterWire, FolderStatusWire, Request, Response, SearchModeWire, SortFieldWire, ToolResult,
};
use crate::throttle::{ThrottleConfig, Throttler};
use crate::watcher::{FileEvent, FileEventKind, FileWatcher};
use anyhow::{Context, Result};
use findit_core::filter::{ClipFilter, FilterPredicate, SortField};
use findit_core::search::{HybridSearchOptions, SearchContext, SearchHit, SearchMode};
use findit_core::storage::model::{ColorLabel, MediaType};
use findit_core::storage::sync_clip;
use findit_core::{hash_file, probe_media, IndexLayer, Indexer, QueryCache};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// Everything one client connection needs, behind a single lock: the
/// Folder DB set, the shared Global DB, the vector indices, the
/// embedding providers and VLM client all live inside [`Library`]; a
/// single `Mutex` serializes access rather than fine-grained per-store
/// locking, trading indexing throughput for a far simpler daemon (noted
/// in DESIGN.md as a deliberate simplification for this workspace).
pub struct DaemonState {
    pub library: Mutex<Library>,
    pub watcher: Mutex<FileWatcher>,
    pub cache: Mutex<QueryCache>,
    pub throttler: Throttler,
    pub start_time: Instant,
    /// `[search]` config, resolved once at startup so every search
    /// request doesn't re-read the config file.
    pub search_weights: findit_core::search::FusionWeights,
    pub search_default_limit: usize,
    /// `[indexing]` `stale_folder_rescan_interval`, consulted by the
    /// watcher loop between folder events.
    pub stale_rescan_interval: Duration,
}

pub struct Server {
    listener: UnixListener,
    state: Arc<DaemonState>,
}

const WATCHER_POLL_INTERVAL: Duration = Duration::from_millis(100);
const QUERY_CACHE_CAPACITY: usize = 256;

impl Server {
    pub fn new(socket_path: &Path, app_dir: &Path, config: &Config) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind to Unix socket")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(socket_path, perms).context("failed to set socket permissions")?;
        }

        tracing::info!("listening on {:?}", socket_path);

        let library = Library::load(app_dir, config).context("failed to load folder registry")?;

        let mut watcher = FileWatcher::with_coalesce_window(Duration::from_millis(config.coalesce_window_ms()))
            .context("failed to create file watcher")?;
        for folder in library.folders() {
            if let Err(e) = watcher.watch(&folder.path) {
                tracing::warn!("failed to watch {:?}: {e}", folder.path);
            }
        }

        let throttle_config = ThrottleConfig {
            idle_threshold_secs: config.idle_threshold_secs(),
            ..ThrottleConfig::default()
        };

        let state = Arc::new(DaemonState {
            library: Mutex::new(library),
            watcher: Mutex::new(watcher),
            cache: Mutex::new(QueryCache::new(QUERY_CACHE_CAPACITY)),
            throttler: Throttler::with_config(throttle_config),
            start_time: Instant::now(),
            search_weights: config.search_weights(),
            search_default_limit: config.search_default_limit(),
            stale_rescan_interval: config.stale_folder_rescan_interval(),
        });

        Ok(Self { listener, state })
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!("server ready, accepting connections");

        let watcher_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run_watcher_loop(watcher_state).await;
        });

        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state).await {
                            tracing::error!("client handler error: {e}");
                        }
                    });
                }
                Err(e) => tracing::error!("accept error: {e}"),
            }
        }
    }
}

/// Background task: poll the watcher, run each applicable layer for
/// every video the events or a general sweep surface, at the cadence
/// the throttler currently allows. Also sweeps each registered folder on
/// `stale_rescan_interval` regardless of watcher events, to pick up
/// changes a missed or coalesced event dropped.
async fn run_watcher_loop(state: Arc<DaemonState>) {
    let mut interval = tokio::time::interval(WATCHER_POLL_INTERVAL);

    loop {
        interval.tick().await;

        rescan_stale_folders(&state).await;

        let events = {
            let mut watcher = state.watcher.lock().await;
            watcher.poll_events()
        };

        if events.is_empty() {
            continue;
        }

        let limits = state.throttler.get_limits();
        for (i, event) in events.iter().enumerate() {
            if let Err(e) = process_file_event(event, &state).await {
                tracing::warn!("failed to process event {:?}: {e}", event.path);
            }
            if (i + 1) % limits.batch_size == 0 && i + 1 < events.len() {
                tokio::time::sleep(Duration::from_millis(limits.min_delay_ms)).await;
            }
        }

        index_all_pending(&state).await;
    }
}

/// Re-walk any registered folder whose last rescan is older than
/// `state.stale_rescan_interval`, registering any file the watcher never
/// reported (a missed event, or a change that happened while the daemon
/// was down).
async fn rescan_stale_folders(state: &DaemonState) {
    let mut library = state.library.lock().await;
    let stale: Vec<(usize, PathBuf)> = library
        .folders()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.last_rescan.elapsed() >= state.stale_rescan_interval)
        .map(|(i, f)| (i, f.path.clone()))
        .collect();

    for (folder_index, root) in stale {
        for path in crate::library::scan_media_files(&root) {
            if let Err(e) = register_discovered_file(&mut library, folder_index, &path) {
                tracing::warn!("stale rescan failed for {:?}: {e}", path);
            }
        }
        if let Some(entry) = library.folders_mut().get_mut(folder_index) {
            entry.last_rescan = Instant::now();
        }
    }
}

async fn process_file_event(event: &FileEvent, state: &DaemonState) -> Result<()> {
    let mut library = state.library.lock().await;

    let folder_index = library
        .folders()
        .iter()
        .position(|f| event.path.starts_with(&f.path));
    let Some(folder_index) = folder_index else {
        return Ok(());
    };

    match event.kind {
        FileEventKind::RescanNeeded => {
            let root = library.folders()[folder_index].path.clone();
            for path in crate::library::scan_media_files(&root) {
                register_discovered_file(&mut library, folder_index, &path)?;
            }
        }
        FileEventKind::Added | FileEventKind::Modified => {
            register_discovered_file(&mut library, folder_index, &event.path)?;
        }
        FileEventKind::Removed => {
            let folder = &library.folders()[folder_index];
            let folder_id = folder.db.register_folder(&folder.path.to_string_lossy(), folder.volume_uuid.as_deref())?;
            folder.db.delete_video_by_path(folder_id, &event.path.to_string_lossy())?;
        }
    }
    Ok(())
}

fn register_discovered_file(library: &mut Library, folder_index: usize, path: &Path) -> Result<()> {
    let Some(media_type) = crate::watcher::classify_media_type(path) else {
        return Ok(());
    };
    let folder = &library.folders()[folder_index];
    let folder_id = folder.db.register_folder(&folder.path.to_string_lossy(), folder.volume_uuid.as_deref())?;

    let content_hash = hash_file(path).unwrap_or_default();
    let byte_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let probe = probe_media(path).ok();
    let duration = probe.map(|p| p.duration).unwrap_or(0.0);

    folder.db.upsert_video(
        folder_id,
        &path.to_string_lossy(),
        &path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        media_type,
        byte_size,
        &content_hash,
    )?;
    let _ = duration;
    Ok(())
}

/// Drive every registered folder's pending videos through the indexer,
/// one file at a time (§4.1's worker-pool fan-out is left to a future
/// iteration; see DESIGN.md — this loop processes sequentially under the
/// single `Library` lock).
async fn index_all_pending(state: &DaemonState) {
    let mut library = state.library.lock().await;
    let folder_count = library.folders().len();

    for folder_index in 0..folder_count {
        let pending = {
            let folder = &library.folders()[folder_index];
            let folder_id = match folder.db.register_folder(&folder.path.to_string_lossy(), folder.volume_uuid.as_deref()) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("failed to resolve folder id for {:?}: {e}", folder.path);
                    continue;
                }
            };
            match folder.db.pending_videos(folder_id) {
                Ok(videos) => videos,
                Err(e) => {
                    tracing::warn!("failed to list pending videos for {:?}: {e}", folder.path);
                    continue;
                }
            }
        };

        for video in pending {
            if let Err(e) = index_one_video(&mut library, folder_index, video.id).await {
                tracing::warn!("indexing video {} failed: {e}", video.id);
            }
        }
    }

    if let Err(e) = library.persist_vector_indices() {
        tracing::warn!("failed to persist vector indices: {e}");
    }
}

async fn index_one_video(library: &mut Library, folder_index: usize, video_id: i64) -> findit_core::Result<()> {
    let folder_path = library.folders()[folder_index].path.clone();
    let config = library.indexer_config.clone();

    let Library {
        folders,
        global,
        image_index,
        text_index,
        clip_embedder,
        text_embedder,
        vlm,
        rate_limiter,
        connectivity,
        ..
    } = library;

    let folder_db = &folders[folder_index].db;
    let mut indexer = Indexer {
        config: &config,
        folder_db,
        folder_path: &folder_path,
        global,
        image_index: Some(image_index),
        text_index: Some(text_index),
        clip_embedder: clip_embedder.as_mut(),
        text_embedder: text_embedder.as_mut(),
        vlm: vlm.as_ref(),
        rate_limiter: Some(&*rate_limiter),
        connectivity: Some(&*connectivity),
    };
    indexer.index_file(video_id).await?;
    Ok(())
}

async fn handle_client(stream: UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }

    let request: Request = match serde_json::from_str(&line) {
        Ok(req) => req,
        Err(e) => {
            let response = Response::Error(format!("invalid request: {e}"));
            let response_json = serde_json::to_string(&response)?;
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            return Ok(());
        }
    };

    let response = handle_request(request, &state).await;
    let response_json = serde_json::to_string(&response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn handle_request(request: Request, state: &DaemonState) -> Response {
    state.throttler.record_activity();

    match request {
        Request::AddFolder { path } => handle_add_folder(&path, state).await,
        Request::RemoveFolder { path } => handle_remove_folder(&path, state).await,
        Request::ListFolders => handle_list_folders(state).await,
        Request::GetLibrarySummary => handle_library_summary(state).await,
        Request::ListVideos { folder, status, limit, offset } => handle_list_videos(folder, status, limit, offset, state).await,
        Request::GetVideoDetail { video_id } => handle_get_video_detail(video_id, state).await,
        Request::GetClip { clip_id } => handle_get_clip(clip_id, state).await,
        Request::Search { query, mode, folder_scope, limit, offset, filter, sort } => {
            handle_search(&query, mode, folder_scope, limit, offset, filter, sort, state).await
        }
        Request::BrowseAllClips { folder, limit, offset, sort } => handle_browse_all_clips(folder, limit, offset, sort, state).await,
        Request::SetRating { clip_id, rating } => handle_set_rating(clip_id, rating, state).await,
        Request::SetColorLabel { clip_id, color } => handle_set_color_label(clip_id, &color, state).await,
        Request::AddTags { clip_id, tags } => handle_add_tags(clip_id, &tags, state).await,
        Request::RemoveTags { clip_id, tags } => handle_remove_tags(clip_id, &tags, state).await,
        Request::GetStats { folder } => handle_get_stats(folder, state).await,
        Request::Status => handle_status(state).await,
        Request::Shutdown => {
            tracing::info!("shutdown requested");
            Response::Result(ToolResult::ok(json!({"shutting_down": true})))
        }
    }
}

async fn handle_add_folder(path: &Path, state: &DaemonState) -> Response {
    let mut library = state.library.lock().await;
    match library.add_folder(path, None) {
        Ok(registered) => {
            let registered = registered.to_path_buf();
            let mut watcher = state.watcher.lock().await;
            if let Err(e) = watcher.watch(&registered) {
                tracing::warn!("failed to watch newly added folder {:?}: {e}", registered);
            }
            Response::Result(ToolResult::ok(json!({"path": registered.to_string_lossy()})))
        }
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

async fn handle_remove_folder(path: &Path, state: &DaemonState) -> Response {
    let mut library = state.library.lock().await;
    match library.remove_folder(path) {
        Ok(true) => {
            let mut watcher = state.watcher.lock().await;
            let _ = watcher.unwatch(path);
            Response::Result(ToolResult::ok(json!({"removed": true})))
        }
        Ok(false) => Response::Result(ToolResult::error(format!("{} is not registered", path.display()))),
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

async fn handle_list_folders(state: &DaemonState) -> Response {
    let library = state.library.lock().await;
    match library.list_folder_summaries() {
        Ok(summaries) => Response::Result(ToolResult::ok(json!(summaries))),
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

async fn handle_library_summary(state: &DaemonState) -> Response {
    let library = state.library.lock().await;
    match library.library_summary() {
        Ok(summary) => Response::Result(ToolResult::ok(json!(summary))),
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

async fn handle_list_videos(folder: Option<String>, status: Option<String>, limit: usize, offset: usize, state: &DaemonState) -> Response {
    let library = state.library.lock().await;

    let indices: Vec<usize> = match &folder {
        Some(path) => match library.folder_index_for_path(path) {
            Some(idx) => vec![idx],
            None => return Response::Result(ToolResult::error(format!("{path} is not a registered folder"))),
        },
        None => (0..library.folders().len()).collect(),
    };

    let status_filter = status.as_deref().and_then(findit_core::storage::model::IndexStatus::parse);
    if status.is_some() && status_filter.is_none() {
        return Response::Result(ToolResult::error(format!("invalid status: {}", status.unwrap())));
    }

    let mut rows = Vec::new();
    for idx in indices {
        let folder_entry = &library.folders()[idx];
        let folder_id = match folder_entry
            .db
            .register_folder(&folder_entry.path.to_string_lossy(), folder_entry.volume_uuid.as_deref())
        {
            Ok(id) => id,
            Err(e) => return Response::Result(ToolResult::error(e.to_string())),
        };
        let videos = match folder_entry.db.list_videos(folder_id) {
            Ok(v) => v,
            Err(e) => return Response::Result(ToolResult::error(e.to_string())),
        };
        for video in videos {
            if let Some(want) = status_filter {
                if video.index_status != want {
                    continue;
                }
            }
            rows.push(json!({
                "video_id": Library::encode_video_id(idx, video.id),
                "folder": folder_entry.path.to_string_lossy(),
                "path": video.path,
                "filename": video.filename,
                "duration": video.duration,
                "media_type": video.media_type.as_str(),
                "index_status": video.index_status.as_str(),
            }));
        }
    }

    let page: Vec<_> = rows.into_iter().skip(offset).take(limit).collect();
    Response::Result(ToolResult::ok(json!(page)))
}

async fn handle_get_video_detail(video_id: i64, state: &DaemonState) -> Response {
    let library = state.library.lock().await;
    let (folder_index, local_id) = Library::decode_video_id(video_id);
    let Some(folder) = library.folders().get(folder_index) else {
        return Response::Result(ToolResult::error(format!("no video with id {video_id}")));
    };

    match folder.db.get_video(local_id) {
        Ok(video) => {
            let clips = folder.db.get_clips_for_video(local_id).unwrap_or_default();
            Response::Result(ToolResult::ok(json!({
                "video_id": video_id,
                "folder": folder.path.to_string_lossy(),
                "path": video.path,
                "filename": video.filename,
                "duration": video.duration,
                "media_type": video.media_type.as_str(),
                "index_status": video.index_status.as_str(),
                "index_error": video.index_error,
                "clip_count": clips.len(),
            })))
        }
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

/// Resolve a clip-identifying Global DB rowid back to its owning folder
/// and local clip id.
async fn resolve_clip<'a>(library: &'a Library, clip_id: i64) -> findit_core::Result<(&'a FolderEntry, i64)> {
    let Some((source_folder, local_clip_id)) = library.global.resolve_rowid(clip_id)? else {
        return Err(findit_core::FindItError::NotFound(format!("clip {clip_id}")));
    };
    let Some(idx) = library.folder_index_for_path(&source_folder) else {
        return Err(findit_core::FindItError::NotFound(format!("clip {clip_id}: owning folder no longer registered")));
    };
    Ok((&library.folders()[idx], local_clip_id))
}

async fn handle_get_clip(clip_id: i64, state: &DaemonState) -> Response {
    let library = state.library.lock().await;
    let (folder, local_clip_id) = match resolve_clip(&library, clip_id).await {
        Ok(v) => v,
        Err(e) => return Response::Result(ToolResult::error(e.to_string())),
    };

    match folder.db.get_clip(local_clip_id) {
        Ok(clip) => Response::Result(ToolResult::ok(json!({
            "clip_id": clip_id,
            "video_id": clip.video_id,
            "start_time": clip.start_time,
            "end_time": clip.end_time,
            "scene": clip.scene,
            "description": clip.description,
            "subjects": clip.lists.subjects,
            "actions": clip.lists.actions,
            "objects": clip.lists.objects,
            "colors": clip.lists.colors,
            "tags": clip.lists.tags,
            "user_tags": clip.lists.user_tags,
            "transcript": clip.transcript,
            "shot_type": clip.shot_type,
            "mood": clip.mood,
            "lighting": clip.lighting,
            "rating": clip.rating,
            "color_label": clip.color_label.as_str(),
            "thumbnail_path": clip.thumbnail_path,
        }))),
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_search(
    query: &str,
    mode: Option<SearchModeWire>,
    folder_scope: Option<Vec<String>>,
    limit: Option<usize>,
    offset: usize,
    filter: Option<FilterWire>,
    sort: SortFieldWire,
    state: &DaemonState,
) -> Response {
    let mut library = state.library.lock().await;
    let mut cache = state.cache.lock().await;

    let options = HybridSearchOptions {
        mode: mode.map(wire_to_search_mode).unwrap_or(SearchMode::Auto),
        folder_scope,
        limit: limit.unwrap_or(state.search_default_limit),
        offset,
        weights: state.search_weights,
        filter: filter.as_ref().map(wire_to_filter_predicate),
        sort: wire_to_sort_field(sort),
    };

    let Library {
        global,
        image_index,
        text_index,
        clip_embedder,
        text_embedder,
        ..
    } = &mut *library;

    let ctx = SearchContext {
        global: &*global,
        image_index: Some(&*image_index),
        text_index: Some(&*text_index),
        clip_text_embedder: clip_embedder.as_mut(),
        text_embedder: text_embedder.as_mut(),
        cache: &mut cache,
    };

    match findit_core::search::search(ctx, query, &options) {
        Ok(hits) => Response::Result(ToolResult::ok(json!(hits.iter().map(hit_to_json).collect::<Vec<_>>()))),
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

async fn handle_browse_all_clips(folder: Option<String>, limit: usize, offset: usize, sort: SortFieldWire, state: &DaemonState) -> Response {
    let library = state.library.lock().await;
    let folder_scope = folder.map(|f| vec![f]);

    match library.global.facet_counts(folder_scope.as_deref()) {
        Ok(_) => {}
        Err(e) => return Response::Result(ToolResult::error(e.to_string())),
    }

    // Reuse the FTS engine's empty-query-means-everything behavior isn't
    // available; browse instead walks each folder's clips directly so it
    // works even with no lexical/vector index populated yet.
    let indices: Vec<usize> = match &folder_scope {
        Some(scope) => scope
            .iter()
            .filter_map(|path| library.folder_index_for_path(path))
            .collect(),
        None => (0..library.folders().len()).collect(),
    };

    let mut hits: Vec<SearchHit> = Vec::new();
    for idx in indices {
        let folder_entry = &library.folders()[idx];
        let folder_id = match folder_entry
            .db
            .register_folder(&folder_entry.path.to_string_lossy(), folder_entry.volume_uuid.as_deref())
        {
            Ok(id) => id,
            Err(e) => return Response::Result(ToolResult::error(e.to_string())),
        };
        let videos = match folder_entry.db.list_videos(folder_id) {
            Ok(v) => v,
            Err(e) => return Response::Result(ToolResult::error(e.to_string())),
        };
        for video in videos {
            let clips = folder_entry.db.get_clips_for_video(video.id).unwrap_or_default();
            for clip in clips {
                hits.push(SearchHit {
                    source_folder: folder_entry.path.to_string_lossy().to_string(),
                    clip_id: clip.id,
                    video_path: video.path.clone(),
                    start_time: clip.start_time,
                    end_time: clip.end_time,
                    description: clip.description,
                    scene: clip.scene,
                    shot_type: clip.shot_type,
                    mood: clip.mood,
                    rating: clip.rating,
                    color_label: clip.color_label,
                    score: 0.0,
                });
            }
        }
    }

    let filter = ClipFilter::new(FilterPredicate::default(), wire_to_sort_field(sort));
    let sorted = filter.apply(hits);
    let page: Vec<_> = sorted.into_iter().skip(offset).take(limit).collect();
    Response::Result(ToolResult::ok(json!(page.iter().map(hit_to_json).collect::<Vec<_>>())))
}

async fn handle_set_rating(clip_id: i64, rating: i32, state: &DaemonState) -> Response {
    if !(0..=5).contains(&rating) {
        return Response::Result(ToolResult::error("rating must be between 0 and 5"));
    }
    let mut library = state.library.lock().await;
    apply_clip_mutation(&mut library, clip_id, |folder, local_id| folder.db.set_rating(local_id, rating)).await
}

async fn handle_set_color_label(clip_id: i64, color: &str, state: &DaemonState) -> Response {
    let Some(label) = ColorLabel::parse(color) else {
        return Response::Result(ToolResult::error(format!("invalid color label: {color}")));
    };
    let mut library = state.library.lock().await;
    apply_clip_mutation(&mut library, clip_id, |folder, local_id| folder.db.set_color_label(local_id, label)).await
}

async fn handle_add_tags(clip_id: i64, tags: &[String], state: &DaemonState) -> Response {
    let mut library = state.library.lock().await;
    apply_clip_mutation(&mut library, clip_id, |folder, local_id| folder.db.add_tags(local_id, tags)).await
}

async fn handle_remove_tags(clip_id: i64, tags: &[String], state: &DaemonState) -> Response {
    let mut library = state.library.lock().await;
    apply_clip_mutation(&mut library, clip_id, |folder, local_id| folder.db.remove_tags(local_id, tags)).await
}

/// Apply a Folder DB mutation addressed by a global clip id, then
/// re-sync the affected clip into the Global DB so FTS and filters see
/// the edit immediately (§4.6 sync protocol applies to rating/tag/color
/// edits the same way it does to indexer writes).
async fn apply_clip_mutation(
    library: &mut Library,
    clip_id: i64,
    mutate: impl FnOnce(&FolderEntry, i64) -> findit_core::Result<()>,
) -> Response {
    let folder_index = match resolve_clip(library, clip_id).await {
        Ok((folder, _local_id)) => match library.folders().iter().position(|f| std::ptr::eq(f, folder)) {
            Some(idx) => idx,
            None => return Response::Result(ToolResult::error("internal folder resolution error")),
        },
        Err(e) => return Response::Result(ToolResult::error(e.to_string())),
    };
    let local_clip_id = match resolve_clip(library, clip_id).await {
        Ok((_folder, local_id)) => local_id,
        Err(e) => return Response::Result(ToolResult::error(e.to_string())),
    };

    if let Err(e) = mutate(&library.folders()[folder_index], local_clip_id) {
        return Response::Result(ToolResult::error(e.to_string()));
    }

    let folder_path = library.folders()[folder_index].path.to_string_lossy().to_string();
    let sync_result = (|| -> findit_core::Result<()> {
        let clip = library.folders()[folder_index].db.get_clip(local_clip_id)?;
        let video = library.folders()[folder_index].db.get_video(clip.video_id)?;
        sync_clip(&mut library.global, &folder_path, &video, &clip)?;
        Ok(())
    })();

    match sync_result {
        Ok(()) => Response::Result(ToolResult::ok(json!({"clip_id": clip_id}))),
        Err(e) => Response::Result(ToolResult::error(e.to_string())),
    }
}

async fn handle_get_stats(folder: Option<String>, state: &DaemonState) -> Response {
    let library = state.library.lock().await;
    match folder {
        Some(path) => {
            let Some(idx) = library.folder_index_for_path(&path) else {
                return Response::Result(ToolResult::error(format!("{path} is not a registered folder")));
            };
            let folder_entry = &library.folders()[idx];
            let folder_id = match folder_entry
                .db
                .register_folder(&folder_entry.path.to_string_lossy(), folder_entry.volume_uuid.as_deref())
            {
                Ok(id) => id,
                Err(e) => return Response::Result(ToolResult::error(e.to_string())),
            };
            match folder_entry.db.stats(folder_id) {
                Ok(stats) => Response::Result(ToolResult::ok(json!(stats))),
                Err(e) => Response::Result(ToolResult::error(e.to_string())),
            }
        }
        None => match library.library_summary() {
            Ok(summary) => Response::Result(ToolResult::ok(json!(summary))),
            Err(e) => Response::Result(ToolResult::error(e.to_string())),
        },
    }
}

async fn handle_status(state: &DaemonState) -> Response {
    let uptime = state.start_time.elapsed().as_secs();
    let library = state.library.lock().await;
    let watcher = state.watcher.lock().await;

    let folders = library
        .folders()
        .iter()
        .map(|folder| {
            let folder_id = folder
                .db
                .register_folder(&folder.path.to_string_lossy(), folder.volume_uuid.as_deref())
                .unwrap_or(0);
            let stats = folder.db.stats(folder_id).unwrap_or(findit_core::storage::folder_db::FolderStats {
                video_count: 0,
                completed_count: 0,
                failed_count: 0,
                clip_count: 0,
                total_duration: 0.0,
            });
            FolderStatusWire {
                path: folder.path.to_string_lossy().to_string(),
                video_count: stats.video_count,
                completed_count: stats.completed_count,
                failed_count: stats.failed_count,
                is_watching: watcher.watched_paths().contains(&folder.path),
            }
        })
        .collect();

    Response::Status(DaemonStatus {
        uptime_secs: uptime,
        folders,
        throttle_state: state.throttler.state_description().to_string(),
    })
}

fn wire_to_search_mode(mode: SearchModeWire) -> SearchMode {
    match mode {
        SearchModeWire::Fts => SearchMode::Fts,
        SearchModeWire::Vector => SearchMode::Vector,
        SearchModeWire::TextVector => SearchMode::TextVector,
        SearchModeWire::Auto => SearchMode::Auto,
    }
}

fn wire_to_sort_field(sort: SortFieldWire) -> SortField {
    match sort {
        SortFieldWire::Relevance => SortField::Relevance,
        SortFieldWire::Date => SortField::Date,
        SortFieldWire::Duration => SortField::Duration,
        SortFieldWire::Rating => SortField::Rating,
    }
}

fn wire_to_filter_predicate(filter: &FilterWire) -> FilterPredicate {
    FilterPredicate {
        min_rating: filter.min_rating,
        color_labels: filter
            .color_labels
            .as_ref()
            .map(|labels| labels.iter().filter_map(|l| ColorLabel::parse(l)).collect()),
        shot_types: filter.shot_types.clone(),
        moods: filter.moods.clone(),
    }
}

fn hit_to_json(hit: &SearchHit) -> serde_json::Value {
    json!({
        "source_folder": hit.source_folder,
        "clip_id": hit.clip_id,
        "video_path": hit.video_path,
        "start_time": hit.start_time,
        "end_time": hit.end_time,
        "description": hit.description,
        "scene": hit.scene,
        "shot_type": hit.shot_type,
        "mood": hit.mood,
        "rating": hit.rating,
        "color_label": hit.color_label.as_str(),
        "score": hit.score,
    })
}

pub fn default_socket_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "findit")
        .map(|dirs| dirs.data_dir().join("daemon.sock"))
        .unwrap_or_else(|| PathBuf::from("/tmp/findit-daemon.sock"))
}

pub fn default_app_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "findit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/findit"))
}

pub fn default_pid_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "findit")
        .map(|dirs| dirs.data_dir().join("daemon.pid"))
        .unwrap_or_else(|| PathBuf::from("/tmp/findit-daemon.pid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_poll_interval_is_reasonable() {
        assert!(WATCHER_POLL_INTERVAL.as_millis() >= 10);
        assert!(WATCHER_POLL_INTERVAL.as_millis() <= 1000);
    }

    #[test]
    fn default_paths_are_absolute_and_scoped_to_findit() {
        let socket = default_socket_path();
        let app_dir = default_app_dir();
        let pid = default_pid_path();

        assert!(socket.is_absolute());
        assert!(app_dir.is_absolute());
        assert!(pid.is_absolute());
        assert!(socket.to_string_lossy().contains("findit"));
        assert!(pid.to_string_lossy().contains("findit"));
    }

    #[test]
    fn wire_sort_field_round_trips_each_variant() {
        assert_eq!(wire_to_sort_field(SortFieldWire::Rating), SortField::Rating);
        assert_eq!(wire_to_sort_field(SortFieldWire::Date), SortField::Date);
    }
}
