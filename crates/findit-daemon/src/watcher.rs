//! File System Watcher (§4.7): debounced, coalesced `notify` events for
//! registered folders, filtered down to files the indexer cares about.

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Default coalesce window (§4.7: 1.5s).
const DEFAULT_COALESCE_MS: u64 = 1500;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];
const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "heif", "tiff", "bmp"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "aac", "m4a", "ogg"];

/// Directories never walked or watched for media (§4.7); `.clip-index` is
/// this daemon's own per-folder cache root, so events inside it would
/// otherwise cause an indexing feedback loop.
const SKIPPED_DIR_NAMES: &[&str] = &[".clip-index", ".git", "@eaDir", "$RECYCLE.BIN", "System Volume Information"];

/// Whether `path`'s extension is one of the three media families the
/// indexer recognizes (mirrors [`findit_core::media::decoder_for_extension`]'s
/// routing table).
pub fn is_media_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str()) || PHOTO_EXTENSIONS.contains(&ext.as_str()) || AUDIO_EXTENSIONS.contains(&ext.as_str())
}

pub(crate) fn is_skipped_dir(path: &Path) -> bool {
    path.components().any(|c| match c.as_os_str().to_str() {
        Some(name) => SKIPPED_DIR_NAMES.iter().any(|skip| skip.eq_ignore_ascii_case(name)),
        None => false,
    })
}

/// Classify a media path into [`findit_core::storage::model::MediaType`]
/// by extension, for the scanner and watcher, which see a raw path
/// before any content has been probed. Mirrors
/// [`findit_core::media::decoder_for_extension`]'s routing table.
pub fn classify_media_type(path: &Path) -> Option<findit_core::storage::model::MediaType> {
    use findit_core::storage::model::MediaType;
    let ext = path.extension().and_then(|e| e.to_str())?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Video)
    } else if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Photo)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Audio)
    } else {
        None
    }
}

/// Debounced, filtered watcher over a folder's registered root.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Result<Event, notify::Error>>,
    watched_paths: Vec<PathBuf>,
    pending: HashMap<PathBuf, PendingEvent>,
    coalesce: Duration,
    /// Set when `notify` reports a channel overflow; the caller should
    /// treat this as "re-scan the whole folder" rather than trust the
    /// individual events it did see (§4.7).
    rescan_needed: bool,
}

struct PendingEvent {
    kind: FileEventKind,
    last_seen: Instant,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        Self::with_coalesce_window(Duration::from_millis(DEFAULT_COALESCE_MS))
    }

    pub fn with_coalesce_window(coalesce: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(tx)?;

        Ok(Self {
            watcher,
            rx,
            watched_paths: Vec::new(),
            pending: HashMap::new(),
            coalesce,
            rescan_needed: false,
        })
    }

    pub fn watch(&mut self, path: &Path) -> Result<()> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.watched_paths.contains(&canonical) {
            return Ok(());
        }
        self.watcher.watch(&canonical, RecursiveMode::Recursive)?;
        self.watched_paths.push(canonical);
        Ok(())
    }

    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.watched_paths.contains(&canonical) {
            return Ok(());
        }
        self.watcher.unwatch(&canonical)?;
        self.watched_paths.retain(|p| p != &canonical);
        Ok(())
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched_paths
    }

    /// Drain `notify`'s channel, fold raw events into the coalescing map,
    /// and return events that have cleared the coalesce window.
    ///
    /// A `RescanNeeded` event (synthesized on channel overflow, never
    /// produced by `notify` directly) is returned immediately and clears
    /// every other pending event for the affected path, since individual
    /// events seen around an overflow can't be trusted in isolation.
    pub fn poll_events(&mut self) -> Vec<FileEvent> {
        let now = Instant::now();

        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => self.process_raw_event(event, now),
                Ok(Err(_)) => {
                    self.rescan_needed = true;
                }
                Err(_) => break,
            }
        }

        let mut ready = Vec::new();

        if self.rescan_needed {
            self.rescan_needed = false;
            self.pending.clear();
            for root in &self.watched_paths {
                ready.push(FileEvent {
                    path: root.clone(),
                    kind: FileEventKind::RescanNeeded,
                });
            }
            return ready;
        }

        let mut still_pending = HashMap::new();
        for (path, pending) in self.pending.drain() {
            if now.duration_since(pending.last_seen) >= self.coalesce {
                ready.push(FileEvent { path, kind: pending.kind });
            } else {
                still_pending.insert(path, pending);
            }
        }
        self.pending = still_pending;
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn process_raw_event(&mut self, event: Event, now: Instant) {
        // Directory-level create/modify events carry no media-file
        // classification of their own and are dropped (§4.7); a file
        // created inside a new directory still arrives as its own event.
        if matches!(event.kind, EventKind::Other | EventKind::Access(_)) {
            return;
        }

        for path in event.paths {
            if path.is_dir() {
                continue;
            }
            if !self.should_index(&path) {
                continue;
            }

            // Existence is checked at delivery time, not at the moment
            // `notify` saw the raw kernel event (§4.7): a file that no
            // longer exists when we coalesce is a deletion regardless of
            // what the raw event said, since a rapid create-then-delete
            // can otherwise surface as a phantom "modified" entry.
            let kind = if path.exists() {
                match event.kind {
                    EventKind::Remove(_) => FileEventKind::Removed,
                    EventKind::Create(_) => FileEventKind::Added,
                    _ => FileEventKind::Modified,
                }
            } else {
                FileEventKind::Removed
            };

            if let Some(existing) = self.pending.get_mut(&path) {
                existing.kind = merge_event_kinds(existing.kind, kind);
                existing.last_seen = now;
            } else {
                self.pending.insert(path, PendingEvent { kind, last_seen: now });
            }
        }
    }

    fn should_index(&self, path: &Path) -> bool {
        if is_skipped_dir(path) {
            return false;
        }
        is_media_path(path)
    }
}

/// Merge two event kinds seen for the same path within one coalesce
/// window; later supersedes earlier except the add-then-remove and
/// remove-then-add crossovers (§4.7).
fn merge_event_kinds(old: FileEventKind, new: FileEventKind) -> FileEventKind {
    match (old, new) {
        (FileEventKind::Added, FileEventKind::Removed) => FileEventKind::Removed,
        (FileEventKind::Added, FileEventKind::Modified) => FileEventKind::Added,
        (FileEventKind::Removed, FileEventKind::Added) => FileEventKind::Modified,
        (_, new) => new,
    }
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Added,
    Removed,
    Modified,
    RescanNeeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_media_path_recognizes_each_family() {
        assert!(is_media_path(Path::new("/lib/clip.mp4")));
        assert!(is_media_path(Path::new("/lib/photo.HEIC")));
        assert!(is_media_path(Path::new("/lib/track.flac")));
        assert!(!is_media_path(Path::new("/lib/notes.txt")));
        assert!(!is_media_path(Path::new("/lib/noext")));
    }

    #[test]
    fn clip_index_cache_dir_is_skipped() {
        assert!(is_skipped_dir(Path::new("/lib/.clip-index/thumbs/1.jpg")));
        assert!(!is_skipped_dir(Path::new("/lib/vacation/clip.mp4")));
    }

    #[test]
    fn merge_event_kinds_add_then_remove_is_remove() {
        assert_eq!(merge_event_kinds(FileEventKind::Added, FileEventKind::Removed), FileEventKind::Removed);
    }

    #[test]
    fn merge_event_kinds_remove_then_add_is_modified() {
        assert_eq!(merge_event_kinds(FileEventKind::Removed, FileEventKind::Added), FileEventKind::Modified);
    }

    #[test]
    fn watcher_creation_starts_with_no_watched_paths() {
        let watcher = FileWatcher::new().unwrap();
        assert!(watcher.watched_paths().is_empty());
        assert!(!watcher.has_pending());
    }

    #[test]
    fn watch_prevents_duplicate_paths() {
        let mut watcher = FileWatcher::new().unwrap();
        let temp_dir = tempfile::TempDir::new().unwrap();

        watcher.watch(temp_dir.path()).unwrap();
        watcher.watch(temp_dir.path()).unwrap();
        assert_eq!(watcher.watched_paths().len(), 1);
    }

    #[test]
    fn unwatch_removes_path() {
        let mut watcher = FileWatcher::new().unwrap();
        let temp_dir = tempfile::TempDir::new().unwrap();

        watcher.watch(temp_dir.path()).unwrap();
        watcher.unwatch(temp_dir.path()).unwrap();
        assert!(watcher.watched_paths().is_empty());
    }

    #[test]
    fn unwatch_unknown_path_is_noop() {
        let mut watcher = FileWatcher::new().unwrap();
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(watcher.unwatch(temp_dir.path()).is_ok());
    }

    #[test]
    fn should_index_skips_directories_and_system_files() {
        let watcher = FileWatcher::new().unwrap();
        assert!(!watcher.should_index(Path::new("/lib/.clip-index/db.sqlite")));
        assert!(!watcher.should_index(Path::new("/lib/readme.md")));
    }

    #[test]
    fn classify_media_type_routes_each_family() {
        use findit_core::storage::model::MediaType;
        assert_eq!(classify_media_type(Path::new("a.mp4")), Some(MediaType::Video));
        assert_eq!(classify_media_type(Path::new("a.HEIC")), Some(MediaType::Photo));
        assert_eq!(classify_media_type(Path::new("a.flac")), Some(MediaType::Audio));
        assert_eq!(classify_media_type(Path::new("a.txt")), None);
    }

    #[test]
    fn default_coalesce_window_matches_spec() {
        assert_eq!(DEFAULT_COALESCE_MS, 1500);
    }
}
