//! Authoritative per-folder store, `<folder>/.clip-index/index.sqlite`.
//!
//! One [`FolderDb`] owns exactly one folder's rows: its `watched_folders`
//! entry, its videos, and their clips. Schema follows §4.6: embeddings are
//! stored as BLOBs on `clips`, ratings/color labels live in a separate
//! `clip_labels` table, and free-form tags live in `user_tags` — mirroring
//! the source's own table split rather than folding everything into one
//! wide `clips` row.

use crate::error::{FindItError, Result};
use crate::storage::model::{
    blob_to_embedding, embedding_to_blob, tags_from_json, tags_to_json, Clip, ClipLists,
    ColorLabel, IndexStatus, MediaType, Video,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS watched_folders (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    volume_uuid TEXT
);

CREATE TABLE IF NOT EXISTS videos (
    id INTEGER PRIMARY KEY,
    folder_id INTEGER NOT NULL REFERENCES watched_folders(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    filename TEXT NOT NULL,
    duration REAL NOT NULL DEFAULT 0,
    byte_size INTEGER NOT NULL DEFAULT 0,
    media_type TEXT NOT NULL,
    content_hash TEXT NOT NULL DEFAULT '',
    index_status TEXT NOT NULL DEFAULT 'pending',
    index_layer INTEGER NOT NULL DEFAULT -1,
    index_error TEXT,
    srt_path TEXT,
    UNIQUE(folder_id, path)
);

CREATE TABLE IF NOT EXISTS clips (
    id INTEGER PRIMARY KEY,
    video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    start_time REAL NOT NULL,
    end_time REAL NOT NULL,
    scene TEXT,
    description TEXT,
    subjects TEXT NOT NULL DEFAULT '[]',
    actions TEXT NOT NULL DEFAULT '[]',
    objects TEXT NOT NULL DEFAULT '[]',
    colors TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    transcript TEXT,
    shot_type TEXT,
    mood TEXT,
    lighting TEXT,
    thumbnail_path TEXT,
    clip_embedding BLOB,
    clip_embedding_model TEXT,
    text_embedding BLOB,
    text_embedding_model TEXT
);

CREATE TABLE IF NOT EXISTS clip_labels (
    clip_id INTEGER PRIMARY KEY REFERENCES clips(id) ON DELETE CASCADE,
    rating INTEGER NOT NULL DEFAULT 0,
    color_label TEXT NOT NULL DEFAULT 'none'
);

CREATE TABLE IF NOT EXISTS user_tags (
    clip_id INTEGER NOT NULL REFERENCES clips(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    UNIQUE(clip_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_videos_folder ON videos(folder_id);
CREATE INDEX IF NOT EXISTS idx_videos_status ON videos(index_status);
CREATE INDEX IF NOT EXISTS idx_clips_video ON clips(video_id);
CREATE INDEX IF NOT EXISTS idx_user_tags_clip ON user_tags(clip_id);
";

pub struct FolderDb {
    conn: Connection,
}

impl FolderDb {
    /// Open (creating if needed) the authoritative store at
    /// `<folder>/.clip-index/index.sqlite`.
    pub fn open_for_folder(folder_path: &Path) -> Result<Self> {
        let dir = folder_path.join(".clip-index");
        std::fs::create_dir_all(&dir).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        Self::open(&dir.join("index.sqlite"))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn thumbs_dir(folder_path: &Path, video_id: i64) -> PathBuf {
        folder_path
            .join(".clip-index")
            .join("thumbs")
            .join(video_id.to_string())
    }

    // ---- watched_folders ----

    pub fn register_folder(&self, path: &str, volume_uuid: Option<&str>) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO watched_folders (path, volume_uuid) VALUES (?1, ?2)
                 ON CONFLICT(path) DO UPDATE SET volume_uuid = excluded.volume_uuid",
                params![path, volume_uuid],
            )
            .map_err(db_err)?;
        self.conn
            .query_row(
                "SELECT id FROM watched_folders WHERE path = ?1",
                params![path],
                |r| r.get(0),
            )
            .map_err(db_err)
    }

    // ---- videos ----

    /// Insert a new video row in `pending` state, or return the existing
    /// row's id unchanged if this `(folder, path)` was already scanned.
    pub fn upsert_video(
        &self,
        folder_id: i64,
        path: &str,
        filename: &str,
        media_type: MediaType,
        byte_size: u64,
        content_hash: &str,
    ) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM videos WHERE folder_id = ?1 AND path = ?2",
                params![folder_id, path],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;

        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE videos SET byte_size = ?1, content_hash = ?2 WHERE id = ?3",
                    params![byte_size as i64, content_hash, id],
                )
                .map_err(db_err)?;
            return Ok(id);
        }

        self.conn
            .execute(
                "INSERT INTO videos (folder_id, path, filename, media_type, byte_size, content_hash, index_status, index_layer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', -1)",
                params![folder_id, path, filename, media_type.as_str(), byte_size as i64, content_hash],
            )
            .map_err(db_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_video(&self, video_id: i64) -> Result<Video> {
        self.conn
            .query_row(
                "SELECT id, folder_id, path, filename, duration, byte_size, media_type,
                        content_hash, index_status, index_layer, index_error, srt_path
                 FROM videos WHERE id = ?1",
                params![video_id],
                row_to_video,
            )
            .map_err(|e| not_found_or_db(e, "video"))
    }

    pub fn list_videos(&self, folder_id: i64) -> Result<Vec<Video>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, folder_id, path, filename, duration, byte_size, media_type,
                        content_hash, index_status, index_layer, index_error, srt_path
                 FROM videos WHERE folder_id = ?1 ORDER BY path",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![folder_id], row_to_video)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Videos not yet at `index_layer = 3` (or the applicable ceiling for
    /// their media type) and not `failed` — the indexer's work queue.
    pub fn pending_videos(&self, folder_id: i64) -> Result<Vec<Video>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, folder_id, path, filename, duration, byte_size, media_type,
                        content_hash, index_status, index_layer, index_error, srt_path
                 FROM videos WHERE folder_id = ?1 AND index_status NOT IN ('completed', 'orphaned')
                 ORDER BY path",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![folder_id], row_to_video)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Persist metadata probed in layer 0 (duration) and set `index_layer`
    /// / `index_status` atomically, per the resume-logic invariant: this is
    /// the only place those two columns change together.
    pub fn record_layer_progress(
        &self,
        video_id: i64,
        duration: Option<f64>,
        layer: i32,
        status: IndexStatus,
    ) -> Result<()> {
        match duration {
            Some(d) => self.conn.execute(
                "UPDATE videos SET duration = ?1, index_layer = ?2, index_status = ?3, index_error = NULL WHERE id = ?4",
                params![d, layer, status.as_str(), video_id],
            ),
            None => self.conn.execute(
                "UPDATE videos SET index_layer = ?1, index_status = ?2, index_error = NULL WHERE id = ?3",
                params![layer, status.as_str(), video_id],
            ),
        }
        .map_err(db_err)?;
        Ok(())
    }

    /// Record a failure without moving `index_layer` — the next scheduling
    /// pass retries the same layer (§4.1 resume logic).
    pub fn record_failure(&self, video_id: i64, message: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE videos SET index_status = 'failed', index_error = ?1 WHERE id = ?2",
                params![message, video_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Record an in-progress sub-state (`stt_running`, `vision_running`)
    /// without touching `index_layer` or `index_error` — unlike
    /// [`Self::record_layer_progress`], this is a transient UI-facing
    /// marker the indexer writes before starting a layer, not a completion.
    pub fn set_status(&self, video_id: i64, status: IndexStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE videos SET index_status = ?1 WHERE id = ?2",
                params![status.as_str(), video_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn mark_orphaned(&self, video_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE videos SET index_status = 'orphaned' WHERE id = ?1",
                params![video_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_video_by_path(&self, folder_id: i64, path: &str) -> Result<Option<i64>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM videos WHERE folder_id = ?1 AND path = ?2",
                params![folder_id, path],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(id) = id {
            self.conn
                .execute("DELETE FROM videos WHERE id = ?1", params![id])
                .map_err(db_err)?;
        }
        Ok(id)
    }

    // ---- clips ----

    /// Layer 0: replace any existing clip set for `video_id` with freshly
    /// segmented spans. Safe to call on resume since layer 0 is idempotent
    /// only when it hasn't run yet — callers check `index_layer` first.
    pub fn insert_clips(&self, video_id: i64, spans: &[(f64, f64)]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            self.conn
                .execute(
                    "INSERT INTO clips (video_id, start_time, end_time) VALUES (?1, ?2, ?3)",
                    params![video_id, start, end],
                )
                .map_err(db_err)?;
            let id = self.conn.last_insert_rowid();
            self.conn
                .execute(
                    "INSERT INTO clip_labels (clip_id, rating, color_label) VALUES (?1, 0, 'none')",
                    params![id],
                )
                .map_err(db_err)?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn get_clip(&self, clip_id: i64) -> Result<Clip> {
        self.conn
            .query_row(
                "SELECT c.id, c.video_id, c.start_time, c.end_time, c.scene, c.description,
                        c.subjects, c.actions, c.objects, c.colors, c.tags, c.transcript,
                        c.shot_type, c.mood, c.lighting, l.rating, l.color_label,
                        c.thumbnail_path, c.clip_embedding, c.clip_embedding_model,
                        c.text_embedding, c.text_embedding_model
                 FROM clips c JOIN clip_labels l ON l.clip_id = c.id
                 WHERE c.id = ?1",
                params![clip_id],
                row_to_clip,
            )
            .map_err(|e| not_found_or_db(e, "clip"))
    }

    pub fn get_clips_for_video(&self, video_id: i64) -> Result<Vec<Clip>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.video_id, c.start_time, c.end_time, c.scene, c.description,
                        c.subjects, c.actions, c.objects, c.colors, c.tags, c.transcript,
                        c.shot_type, c.mood, c.lighting, l.rating, l.color_label,
                        c.thumbnail_path, c.clip_embedding, c.clip_embedding_model,
                        c.text_embedding, c.text_embedding_model
                 FROM clips c JOIN clip_labels l ON l.clip_id = c.id
                 WHERE c.video_id = ?1 ORDER BY c.start_time",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![video_id], row_to_clip)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Layer 1: persist a clip's CLIP image embedding and its thumbnail.
    pub fn update_clip_vector(
        &self,
        clip_id: i64,
        embedding: &[f32],
        model: &str,
        thumbnail_path: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE clips SET clip_embedding = ?1, clip_embedding_model = ?2, thumbnail_path = COALESCE(?3, thumbnail_path) WHERE id = ?4",
                params![embedding_to_blob(embedding), model, thumbnail_path, clip_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Layer 2: persist the transcript slice intersecting this clip's span.
    pub fn update_clip_transcript(&self, clip_id: i64, transcript: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE clips SET transcript = ?1 WHERE id = ?2",
                params![transcript, clip_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Layer 3: persist the parsed VLM description and its text embedding.
    #[allow(clippy::too_many_arguments)]
    pub fn update_clip_description(
        &self,
        clip_id: i64,
        description: Option<&str>,
        scene: Option<&str>,
        lists: &ClipLists,
        mood: Option<&str>,
        shot_type: Option<&str>,
        lighting: Option<&str>,
        text_embedding: Option<(&[f32], &str)>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE clips SET description = ?1, scene = ?2, subjects = ?3, actions = ?4,
                        objects = ?5, colors = ?6, tags = ?7, mood = ?8, shot_type = ?9, lighting = ?10
                 WHERE id = ?11",
                params![
                    description,
                    scene,
                    tags_to_json(&lists.subjects),
                    tags_to_json(&lists.actions),
                    tags_to_json(&lists.objects),
                    tags_to_json(&lists.colors),
                    tags_to_json(&lists.tags),
                    mood,
                    shot_type,
                    lighting,
                    clip_id,
                ],
            )
            .map_err(db_err)?;
        if let Some((embedding, model)) = text_embedding {
            self.conn
                .execute(
                    "UPDATE clips SET text_embedding = ?1, text_embedding_model = ?2 WHERE id = ?3",
                    params![embedding_to_blob(embedding), model, clip_id],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn set_rating(&self, clip_id: i64, rating: i32) -> Result<()> {
        if !(0..=5).contains(&rating) {
            return Err(FindItError::Validation(format!(
                "rating {rating} out of range 0..=5"
            )));
        }
        self.conn
            .execute(
                "UPDATE clip_labels SET rating = ?1 WHERE clip_id = ?2",
                params![rating, clip_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn set_color_label(&self, clip_id: i64, color: ColorLabel) -> Result<()> {
        self.conn
            .execute(
                "UPDATE clip_labels SET color_label = ?1 WHERE clip_id = ?2",
                params![color.as_str(), clip_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn add_tags(&self, clip_id: i64, tags: &[String]) -> Result<()> {
        if tags.is_empty() {
            return Err(FindItError::Validation("tag list is empty".into()));
        }
        for tag in tags {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO user_tags (clip_id, tag) VALUES (?1, ?2)",
                    params![clip_id, tag],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn remove_tags(&self, clip_id: i64, tags: &[String]) -> Result<()> {
        if tags.is_empty() {
            return Err(FindItError::Validation("tag list is empty".into()));
        }
        for tag in tags {
            self.conn
                .execute(
                    "DELETE FROM user_tags WHERE clip_id = ?1 AND tag = ?2",
                    params![clip_id, tag],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn user_tags_for_clip(&self, clip_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM user_tags WHERE clip_id = ?1 ORDER BY tag")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![clip_id], |r| r.get(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn stats(&self, folder_id: i64) -> Result<FolderStats> {
        let video_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM videos WHERE folder_id = ?1",
                params![folder_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let completed: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM videos WHERE folder_id = ?1 AND index_status = 'completed'",
                params![folder_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let failed: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM videos WHERE folder_id = ?1 AND index_status = 'failed'",
                params![folder_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let clip_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM clips c JOIN videos v ON v.id = c.video_id WHERE v.folder_id = ?1",
                params![folder_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let total_duration: f64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(duration), 0) FROM videos WHERE folder_id = ?1",
                params![folder_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(FolderStats {
            video_count,
            completed_count: completed,
            failed_count: failed,
            clip_count,
            total_duration,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FolderStats {
    pub video_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
    pub clip_count: i64,
    pub total_duration: f64,
}

fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<Video> {
    let media_type_s: String = row.get(6)?;
    let status_s: String = row.get(8)?;
    Ok(Video {
        id: row.get(0)?,
        folder_id: row.get(1)?,
        path: row.get(2)?,
        filename: row.get(3)?,
        duration: row.get(4)?,
        byte_size: row.get::<_, i64>(5)? as u64,
        media_type: MediaType::parse(&media_type_s).unwrap_or(MediaType::Video),
        content_hash: row.get(7)?,
        index_status: IndexStatus::parse(&status_s).unwrap_or(IndexStatus::Pending),
        index_layer: row.get(9)?,
        index_error: row.get(10)?,
        srt_path: row.get(11)?,
    })
}

fn row_to_clip(row: &rusqlite::Row) -> rusqlite::Result<Clip> {
    let color_s: String = row.get(16)?;
    let clip_embedding: Option<Vec<u8>> = row.get(18)?;
    let text_embedding: Option<Vec<u8>> = row.get(20)?;
    Ok(Clip {
        id: row.get(0)?,
        video_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        scene: row.get(4)?,
        description: row.get(5)?,
        lists: ClipLists {
            subjects: tags_from_json(&row.get::<_, String>(6)?),
            actions: tags_from_json(&row.get::<_, String>(7)?),
            objects: tags_from_json(&row.get::<_, String>(8)?),
            colors: tags_from_json(&row.get::<_, String>(9)?),
            tags: tags_from_json(&row.get::<_, String>(10)?),
            user_tags: Vec::new(),
        },
        transcript: row.get(11)?,
        shot_type: row.get(12)?,
        mood: row.get(13)?,
        lighting: row.get(14)?,
        rating: row.get(15)?,
        color_label: ColorLabel::parse(&color_s).unwrap_or(ColorLabel::None),
        thumbnail_path: row.get(17)?,
        clip_embedding: clip_embedding.map(|b| blob_to_embedding(&b)),
        clip_embedding_model: row.get(19)?,
        text_embedding: text_embedding.map(|b| blob_to_embedding(&b)),
        text_embedding_model: row.get(21)?,
    })
}

fn db_err(e: rusqlite::Error) -> FindItError {
    FindItError::FatalGlobal(e.into())
}

fn not_found_or_db(e: rusqlite::Error, what: &str) -> FindItError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => FindItError::NotFound(what.to_string()),
        other => db_err(other),
    }
}

/// Defensive column backfill for databases created by an older schema
/// version. Mirrors the "missing columns added with defaults" policy and
/// the `index_layer` backfill-from-legacy-status rule in §4.6: any
/// `videos` row carrying a legacy textual status but no `index_layer` gets
/// one inferred from that status.
fn run_migrations(conn: &Connection) -> Result<()> {
    let has_index_layer: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('videos') WHERE name = 'index_layer'",
            [],
            |r| r.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false);
    if !has_index_layer {
        conn.execute(
            "ALTER TABLE videos ADD COLUMN index_layer INTEGER NOT NULL DEFAULT -1",
            [],
        )
        .map_err(db_err)?;
        conn.execute_batch(
            "UPDATE videos SET index_layer = CASE index_status
                WHEN 'pending' THEN -1
                WHEN 'metadata_done' THEN 0
                WHEN 'vectors_done' THEN 1
                WHEN 'stt_running' THEN 1
                WHEN 'stt_done' THEN 2
                WHEN 'vision_running' THEN 2
                WHEN 'completed' THEN 3
                ELSE -1
             END",
        )
        .map_err(db_err)?;
    }

    let has_srt: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('videos') WHERE name = 'srt_path'",
            [],
            |r| r.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false);
    if !has_srt {
        conn.execute("ALTER TABLE videos ADD COLUMN srt_path TEXT", [])
            .map_err(db_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_folder_is_idempotent_by_path() {
        let db = FolderDb::in_memory().unwrap();
        let a = db.register_folder("/library/trip", Some("uuid-1")).unwrap();
        let b = db.register_folder("/library/trip", Some("uuid-2")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn upsert_video_returns_same_id_on_rescan() {
        let db = FolderDb::in_memory().unwrap();
        let folder = db.register_folder("/library/trip", None).unwrap();
        let a = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 100, "h1")
            .unwrap();
        let b = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 200, "h2")
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(db.get_video(a).unwrap().content_hash, "h2");
    }

    #[test]
    fn fresh_video_starts_at_layer_minus_one_pending() {
        let db = FolderDb::in_memory().unwrap();
        let folder = db.register_folder("/library/trip", None).unwrap();
        let id = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 100, "h1")
            .unwrap();
        let video = db.get_video(id).unwrap();
        assert_eq!(video.index_layer, -1);
        assert_eq!(video.index_status, IndexStatus::Pending);
    }

    #[test]
    fn record_failure_preserves_index_layer() {
        let db = FolderDb::in_memory().unwrap();
        let folder = db.register_folder("/library/trip", None).unwrap();
        let id = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 100, "h1")
            .unwrap();
        db.record_layer_progress(id, Some(12.0), 0, IndexStatus::MetadataDone)
            .unwrap();
        db.record_failure(id, "VLM timeout").unwrap();
        let video = db.get_video(id).unwrap();
        assert_eq!(video.index_layer, 0);
        assert_eq!(video.index_status, IndexStatus::Failed);
        assert_eq!(video.index_error.as_deref(), Some("VLM timeout"));
    }

    #[test]
    fn set_rating_rejects_out_of_range() {
        let db = FolderDb::in_memory().unwrap();
        let folder = db.register_folder("/library/trip", None).unwrap();
        let video = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 100, "h1")
            .unwrap();
        let clip_id = db.insert_clips(video, &[(0.0, 5.0)]).unwrap()[0];
        assert!(db.set_rating(clip_id, 6).is_err());
        assert!(db.set_rating(clip_id, 5).is_ok());
    }

    #[test]
    fn add_tags_rejects_empty_list() {
        let db = FolderDb::in_memory().unwrap();
        let folder = db.register_folder("/library/trip", None).unwrap();
        let video = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 100, "h1")
            .unwrap();
        let clip_id = db.insert_clips(video, &[(0.0, 5.0)]).unwrap()[0];
        assert!(db.add_tags(clip_id, &[]).is_err());
        db.add_tags(clip_id, &["beach".to_string()]).unwrap();
        assert_eq!(db.user_tags_for_clip(clip_id).unwrap(), vec!["beach"]);
    }

    #[test]
    fn clip_round_trips_embedding_blob() {
        let db = FolderDb::in_memory().unwrap();
        let folder = db.register_folder("/library/trip", None).unwrap();
        let video = db
            .upsert_video(folder, "clip.mp4", "clip.mp4", MediaType::Video, 100, "h1")
            .unwrap();
        let clip_id = db.insert_clips(video, &[(0.0, 5.0)]).unwrap()[0];
        let embedding = vec![0.1_f32; 768];
        db.update_clip_vector(clip_id, &embedding, "clip", Some("thumbs/1.jpg"))
            .unwrap();
        let clip = db.get_clip(clip_id).unwrap();
        assert_eq!(clip.clip_embedding.unwrap(), embedding);
        assert_eq!(clip.clip_embedding_model.as_deref(), Some("clip"));
    }
}
