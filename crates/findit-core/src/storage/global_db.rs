//! Aggregate query index: a mirror of clip rows from every registered
//! folder plus an FTS5 virtual table, kept in one file at a
//! platform-appropriate application-support path (§6).
//!
//! Every row is keyed by `(source_folder, source_clip_id)` rather than a
//! fresh autoincrement id, so the whole table is re-derivable by replaying
//! every folder's [`crate::storage::FolderDb`] — this store is a cache,
//! never the system of record (§3).

use crate::error::{FindItError, Result};
use crate::storage::model::{tags_to_space_separated, ColorLabel};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS clips (
    source_folder TEXT NOT NULL,
    source_clip_id INTEGER NOT NULL,
    video_path TEXT NOT NULL,
    start_time REAL NOT NULL,
    end_time REAL NOT NULL,
    description TEXT,
    scene TEXT,
    subjects TEXT NOT NULL DEFAULT '',
    actions TEXT NOT NULL DEFAULT '',
    objects TEXT NOT NULL DEFAULT '',
    colors TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '',
    user_tags TEXT NOT NULL DEFAULT '',
    transcript TEXT,
    shot_type TEXT,
    mood TEXT,
    rating INTEGER NOT NULL DEFAULT 0,
    color_label TEXT NOT NULL DEFAULT 'none',
    PRIMARY KEY (source_folder, source_clip_id)
);

CREATE VIRTUAL TABLE IF NOT EXISTS clips_fts USING fts5(
    description, scene, subjects, actions, objects, tags, user_tags,
    transcript, color_label, shot_type, mood,
    content='clips', content_rowid='rowid'
);

CREATE INDEX IF NOT EXISTS idx_clips_folder ON clips(source_folder);
";

pub struct GlobalDb {
    conn: Connection,
}

/// One FTS5 hit: the clip's global-db key and its BM25-style rank (lower
/// is better, per sqlite's `bm25()` convention — §4.2 step 2).
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub source_folder: String,
    pub source_clip_id: i64,
    pub rank: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FacetCounts {
    pub shot_type: Vec<(String, i64)>,
    pub mood: Vec<(String, i64)>,
    pub rating: Vec<(i64, i64)>,
    pub color_label: Vec<(String, i64)>,
}

/// The fields of a clip this store mirrors, passed in by the sync
/// protocol (§4.6) rather than reusing [`crate::storage::model::Clip`]
/// directly, since the global row also needs the owning video's path and
/// folder key that the folder-local `Clip` type doesn't carry.
#[derive(Debug, Clone)]
pub struct GlobalClipRow<'a> {
    pub source_folder: &'a str,
    pub source_clip_id: i64,
    pub video_path: &'a str,
    pub start_time: f64,
    pub end_time: f64,
    pub description: Option<&'a str>,
    pub scene: Option<&'a str>,
    pub subjects: &'a [String],
    pub actions: &'a [String],
    pub objects: &'a [String],
    pub colors: &'a [String],
    pub tags: &'a [String],
    pub user_tags: &'a [String],
    pub transcript: Option<&'a str>,
    pub shot_type: Option<&'a str>,
    pub mood: Option<&'a str>,
    pub rating: i32,
    pub color_label: ColorLabel,
}

const FACET_TOP_N: i64 = 20;

impl GlobalDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        }
        let conn = Connection::open(path).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| FindItError::FatalGlobal(e.into()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        Ok(Self { conn })
    }

    /// Upsert a mirrored clip row and replace its FTS row in one
    /// transaction, so indexed text never drifts from the metadata it was
    /// built from (§4.6 sync protocol). Returns the row's `rowid`, which
    /// doubles as the Vector Index key for this clip (§3): the global DB
    /// is the one store that already hands out a stable integer identity
    /// shared across every folder's clips.
    pub fn upsert_clip(&mut self, row: &GlobalClipRow) -> Result<i64> {
        let tx = self.conn.transaction().map_err(db_err)?;
        let rowid: Option<i64> = tx
            .query_row(
                "SELECT rowid FROM clips WHERE source_folder = ?1 AND source_clip_id = ?2",
                params![row.source_folder, row.source_clip_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let subjects = tags_to_space_separated(row.subjects);
        let actions = tags_to_space_separated(row.actions);
        let objects = tags_to_space_separated(row.objects);
        let colors = tags_to_space_separated(row.colors);
        let tags = tags_to_space_separated(row.tags);
        let user_tags = tags_to_space_separated(row.user_tags);

        if let Some(rowid) = rowid {
            tx.execute(
                "UPDATE clips SET video_path=?1, start_time=?2, end_time=?3, description=?4,
                        scene=?5, subjects=?6, actions=?7, objects=?8, colors=?9, tags=?10,
                        user_tags=?11, transcript=?12, shot_type=?13, mood=?14, rating=?15,
                        color_label=?16
                 WHERE rowid = ?17",
                params![
                    row.video_path, row.start_time, row.end_time, row.description, row.scene,
                    subjects, actions, objects, colors, tags, user_tags, row.transcript,
                    row.shot_type, row.mood, row.rating, row.color_label.as_str(), rowid,
                ],
            )
            .map_err(db_err)?;
            tx.execute("DELETE FROM clips_fts WHERE rowid = ?1", params![rowid])
                .map_err(db_err)?;
        } else {
            tx.execute(
                "INSERT INTO clips (source_folder, source_clip_id, video_path, start_time, end_time,
                        description, scene, subjects, actions, objects, colors, tags, user_tags,
                        transcript, shot_type, mood, rating, color_label)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
                params![
                    row.source_folder, row.source_clip_id, row.video_path, row.start_time,
                    row.end_time, row.description, row.scene, subjects, actions, objects, colors,
                    tags, user_tags, row.transcript, row.shot_type, row.mood, row.rating,
                    row.color_label.as_str(),
                ],
            )
            .map_err(db_err)?;
        }

        let rowid: i64 = tx
            .query_row(
                "SELECT rowid FROM clips WHERE source_folder = ?1 AND source_clip_id = ?2",
                params![row.source_folder, row.source_clip_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        tx.execute(
            "INSERT INTO clips_fts (rowid, description, scene, subjects, actions, objects, tags,
                    user_tags, transcript, color_label, shot_type, mood)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                rowid, row.description, row.scene, subjects, actions, objects, tags, user_tags,
                row.transcript, row.color_label.as_str(), row.shot_type, row.mood,
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(rowid)
    }

    /// Resolve a Vector Index key (this table's `rowid`) back to the
    /// `(source_folder, source_clip_id)` pair the search engine needs to
    /// fetch the full row and display a hit.
    pub fn resolve_rowid(&self, rowid: i64) -> Result<Option<(String, i64)>> {
        self.conn
            .query_row(
                "SELECT source_folder, source_clip_id FROM clips WHERE rowid = ?1",
                params![rowid],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(db_err)
    }

    pub fn remove_clip(&self, source_folder: &str, source_clip_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM clips WHERE source_folder = ?1 AND source_clip_id = ?2",
                params![source_folder, source_clip_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Remove every row belonging to a folder, e.g. on unregister, ahead of
    /// a fresh resync or because the folder no longer exists.
    pub fn remove_folder(&self, source_folder: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM clips WHERE source_folder = ?1",
                params![source_folder],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Run an FTS5 `MATCH` query, optionally scoped to a set of folders
    /// (§4.2 folder scoping), returning hits ranked by `bm25()` ascending.
    pub fn fts_search(
        &self,
        query: &str,
        folder_scope: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<FtsHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = match folder_scope {
            Some(folders) if !folders.is_empty() => {
                let placeholders = folders.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                format!(
                    "SELECT c.source_folder, c.source_clip_id, bm25(clips_fts) as rank
                     FROM clips_fts JOIN clips c ON c.rowid = clips_fts.rowid
                     WHERE clips_fts MATCH ?1 AND c.source_folder IN ({placeholders})
                     ORDER BY rank ASC LIMIT ?2"
                )
            }
            _ => "SELECT c.source_folder, c.source_clip_id, bm25(clips_fts) as rank
                  FROM clips_fts JOIN clips c ON c.rowid = clips_fts.rowid
                  WHERE clips_fts MATCH ?1
                  ORDER BY rank ASC LIMIT ?2"
                .to_string(),
        };

        let mut stmt = match self.conn.prepare(&sql) {
            Ok(s) => s,
            // Malformed query after FTS5 escaping: degrade to zero results
            // rather than propagating (§4.2 failure semantics).
            Err(_) => return Ok(Vec::new()),
        };

        let mut param_values: Vec<&dyn rusqlite::ToSql> = vec![&query];
        let limit_i64 = limit as i64;
        if let Some(folders) = folder_scope.filter(|f| !f.is_empty()) {
            for f in folders {
                param_values.push(f);
            }
            param_values.push(&limit_i64);
        } else {
            param_values.push(&limit_i64);
        }

        let rows = stmt.query_map(param_values.as_slice(), |r| {
            Ok(FtsHit {
                source_folder: r.get(0)?,
                source_clip_id: r.get(1)?,
                rank: r.get(2)?,
            })
        });
        match rows {
            Ok(rows) => Ok(rows.filter_map(|r| r.ok()).collect()),
            Err(_) => Ok(Vec::new()),
        }
    }

    pub fn get_row(&self, source_folder: &str, source_clip_id: i64) -> Result<Option<GlobalRow>> {
        self.conn
            .query_row(
                "SELECT source_folder, source_clip_id, video_path, start_time, end_time, rating, color_label
                 FROM clips WHERE source_folder = ?1 AND source_clip_id = ?2",
                params![source_folder, source_clip_id],
                |r| {
                    Ok(GlobalRow {
                        source_folder: r.get(0)?,
                        source_clip_id: r.get(1)?,
                        video_path: r.get(2)?,
                        start_time: r.get(3)?,
                        end_time: r.get(4)?,
                        rating: r.get(5)?,
                        color_label: r.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    /// Fetch every mirrored column for one clip, used by the search
    /// engine to materialize a fused ranking into a displayable hit.
    pub fn get_full_row(&self, source_folder: &str, source_clip_id: i64) -> Result<Option<GlobalFullRow>> {
        self.conn
            .query_row(
                "SELECT source_folder, source_clip_id, video_path, start_time, end_time,
                        description, scene, shot_type, mood, rating, color_label
                 FROM clips WHERE source_folder = ?1 AND source_clip_id = ?2",
                params![source_folder, source_clip_id],
                |r| {
                    Ok(GlobalFullRow {
                        source_folder: r.get(0)?,
                        source_clip_id: r.get(1)?,
                        video_path: r.get(2)?,
                        start_time: r.get(3)?,
                        end_time: r.get(4)?,
                        description: r.get(5)?,
                        scene: r.get(6)?,
                        shot_type: r.get(7)?,
                        mood: r.get(8)?,
                        rating: r.get(9)?,
                        color_label: r.get(10)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    /// Faceted counts (§4.4): top-N `shot_type`/`mood` values and the full
    /// distribution of `rating`/`color_label`, scoped to a folder set.
    pub fn facet_counts(&self, folder_scope: Option<&[String]>) -> Result<FacetCounts> {
        let scope_clause = folder_scope
            .filter(|f| !f.is_empty())
            .map(|folders| {
                format!(
                    "WHERE source_folder IN ({})",
                    folders.iter().map(|_| "?").collect::<Vec<_>>().join(",")
                )
            })
            .unwrap_or_default();

        let bind = |params: &mut Vec<&dyn rusqlite::ToSql>, folders: Option<&[String]>| {
            if let Some(folders) = folders.filter(|f| !f.is_empty()) {
                for f in folders {
                    params.push(f);
                }
            }
        };

        let shot_type = self.group_by_top_n("shot_type", &scope_clause, folder_scope, &bind)?;
        let mood = self.group_by_top_n("mood", &scope_clause, folder_scope, &bind)?;

        let mut rating_params: Vec<&dyn rusqlite::ToSql> = Vec::new();
        bind(&mut rating_params, folder_scope);
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT rating, COUNT(*) FROM clips {scope_clause} GROUP BY rating ORDER BY rating"
            ))
            .map_err(db_err)?;
        let rating = stmt
            .query_map(rating_params.as_slice(), |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<(i64, i64)>>>()
            .map_err(db_err)?;

        let mut color_params: Vec<&dyn rusqlite::ToSql> = Vec::new();
        bind(&mut color_params, folder_scope);
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT color_label, COUNT(*) FROM clips {scope_clause} GROUP BY color_label ORDER BY COUNT(*) DESC"
            ))
            .map_err(db_err)?;
        let color_label = stmt
            .query_map(color_params.as_slice(), |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()
            .map_err(db_err)?;

        Ok(FacetCounts {
            shot_type,
            mood,
            rating,
            color_label,
        })
    }

    fn group_by_top_n(
        &self,
        column: &str,
        scope_clause: &str,
        folder_scope: Option<&[String]>,
        bind: &dyn Fn(&mut Vec<&dyn rusqlite::ToSql>, Option<&[String]>),
    ) -> Result<Vec<(String, i64)>> {
        let where_not_null = if scope_clause.is_empty() {
            format!("WHERE {column} IS NOT NULL AND {column} != ''")
        } else {
            format!("{scope_clause} AND {column} IS NOT NULL AND {column} != ''")
        };
        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::new();
        bind(&mut params, folder_scope);
        let limit = FACET_TOP_N;
        params.push(&limit);
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {column}, COUNT(*) as n FROM clips {where_not_null}
                 GROUP BY {column} ORDER BY n DESC LIMIT ?"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params.as_slice(), |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[derive(Debug, Clone)]
pub struct GlobalRow {
    pub source_folder: String,
    pub source_clip_id: i64,
    pub video_path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub rating: i32,
    pub color_label: String,
}

/// Every column the search/filter engines need to render and filter a
/// hit, fetched in one query rather than forcing callers to re-derive
/// metadata already mirrored here.
#[derive(Debug, Clone)]
pub struct GlobalFullRow {
    pub source_folder: String,
    pub source_clip_id: i64,
    pub video_path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub description: Option<String>,
    pub scene: Option<String>,
    pub shot_type: Option<String>,
    pub mood: Option<String>,
    pub rating: i32,
    pub color_label: String,
}

/// Rebuild the whole global DB from a set of folder DBs, keyed by their
/// authoritative rows — the re-derivation path referenced in §3 and §4.6.
pub fn rebuild_from_folders(
    global: &mut GlobalDb,
    folders: &HashMap<String, Vec<GlobalClipRow>>,
) -> Result<()> {
    global.conn.execute("DELETE FROM clips", []).map_err(db_err)?;
    global
        .conn
        .execute("DELETE FROM clips_fts", [])
        .map_err(db_err)?;
    for rows in folders.values() {
        for row in rows {
            global.upsert_clip(row)?;
        }
    }
    Ok(())
}

fn db_err(e: rusqlite::Error) -> FindItError {
    FindItError::FatalGlobal(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(folder: &'static str, id: i64, tags: &'static [String]) -> GlobalClipRow<'static> {
        GlobalClipRow {
            source_folder: folder,
            source_clip_id: id,
            video_path: "beach.mp4",
            start_time: 0.0,
            end_time: 5.0,
            description: Some("a beach at sunset"),
            scene: Some("outdoor"),
            subjects: &[],
            actions: &[],
            objects: &[],
            colors: &[],
            tags,
            user_tags: &[],
            transcript: None,
            shot_type: Some("wide"),
            mood: Some("calm"),
            rating: 4,
            color_label: ColorLabel::Blue,
        }
    }

    #[test]
    fn upsert_then_fts_search_finds_clip() {
        let mut db = GlobalDb::in_memory().unwrap();
        static TAGS: &[String] = &[];
        db.upsert_clip(&sample_row("/library/a", 1, TAGS)).unwrap();
        let hits = db.fts_search("beach", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_clip_id, 1);
    }

    #[test]
    fn fts_search_respects_folder_scope() {
        let mut db = GlobalDb::in_memory().unwrap();
        static TAGS: &[String] = &[];
        db.upsert_clip(&sample_row("/library/a", 1, TAGS)).unwrap();
        db.upsert_clip(&sample_row("/library/b", 2, TAGS)).unwrap();
        let hits = db
            .fts_search("beach", Some(&["/library/a".to_string()]), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_folder, "/library/a");
    }

    #[test]
    fn malformed_fts_query_degrades_to_empty() {
        let db = GlobalDb::in_memory().unwrap();
        let hits = db.fts_search("\"unterminated", None, 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn upsert_is_idempotent_on_key() {
        let mut db = GlobalDb::in_memory().unwrap();
        static TAGS: &[String] = &[];
        db.upsert_clip(&sample_row("/library/a", 1, TAGS)).unwrap();
        db.upsert_clip(&sample_row("/library/a", 1, TAGS)).unwrap();
        let hits = db.fts_search("beach", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn facet_counts_groups_rating_and_color() {
        let mut db = GlobalDb::in_memory().unwrap();
        static TAGS: &[String] = &[];
        db.upsert_clip(&sample_row("/library/a", 1, TAGS)).unwrap();
        db.upsert_clip(&sample_row("/library/a", 2, TAGS)).unwrap();
        let facets = db.facet_counts(None).unwrap();
        assert_eq!(facets.rating, vec![(4, 2)]);
        assert_eq!(facets.color_label, vec![("blue".to_string(), 2)]);
    }
}
