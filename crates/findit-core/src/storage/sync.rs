//! One-way Folder DB → Global DB replication (§4.6 sync protocol).
//!
//! Called after every layer transition the indexer commits, and after
//! rating/color-label/tag edits, so the global query index never lags the
//! authoritative folder row by more than one write.

use crate::error::Result;
use crate::storage::global_db::{GlobalClipRow, GlobalDb};
use crate::storage::model::{Clip, Video};

/// Mirror one clip (and its owning video's path) into the global index.
/// Returns the global row's `rowid`, which the indexer uses as the Vector
/// Index key for this clip.
pub fn sync_clip(global: &mut GlobalDb, source_folder: &str, video: &Video, clip: &Clip) -> Result<i64> {
    let row = GlobalClipRow {
        source_folder,
        source_clip_id: clip.id,
        video_path: &video.path,
        start_time: clip.start_time,
        end_time: clip.end_time,
        description: clip.description.as_deref(),
        scene: clip.scene.as_deref(),
        subjects: &clip.lists.subjects,
        actions: &clip.lists.actions,
        objects: &clip.lists.objects,
        colors: &clip.lists.colors,
        tags: &clip.lists.tags,
        user_tags: &clip.lists.user_tags,
        transcript: clip.transcript.as_deref(),
        shot_type: clip.shot_type.as_deref(),
        mood: clip.mood.as_deref(),
        rating: clip.rating,
        color_label: clip.color_label,
    };
    global.upsert_clip(&row)
}

/// Mirror every clip belonging to one video, used after a full re-index or
/// when first registering a folder.
pub fn sync_video_clips(
    global: &mut GlobalDb,
    source_folder: &str,
    video: &Video,
    clips: &[Clip],
) -> Result<Vec<i64>> {
    let mut rowids = Vec::with_capacity(clips.len());
    for clip in clips {
        rowids.push(sync_clip(global, source_folder, video, clip)?);
    }
    Ok(rowids)
}

/// Drop a clip from the global index, e.g. when its video is deleted or
/// orphaned.
pub fn remove_clip(global: &GlobalDb, source_folder: &str, clip_id: i64) -> Result<()> {
    global.remove_clip(source_folder, clip_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::{ColorLabel, IndexStatus, MediaType};

    fn sample_video() -> Video {
        Video {
            id: 1,
            folder_id: 1,
            path: "/library/a/beach.mp4".to_string(),
            filename: "beach.mp4".to_string(),
            duration: 10.0,
            byte_size: 1000,
            media_type: MediaType::Video,
            content_hash: "deadbeef".to_string(),
            index_status: IndexStatus::Completed,
            index_layer: 3,
            index_error: None,
            srt_path: None,
        }
    }

    #[test]
    fn sync_clip_round_trips_into_fts() {
        let mut global = GlobalDb::in_memory().unwrap();
        let video = sample_video();
        let mut clip = Clip::new(video.id, 0.0, 5.0);
        clip.id = 1;
        clip.description = Some("a dog running on the beach".to_string());
        clip.color_label = ColorLabel::Green;

        sync_clip(&mut global, "/library/a", &video, &clip).unwrap();
        let hits = global.fts_search("dog", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_folder, "/library/a");
        assert_eq!(hits[0].source_clip_id, 1);
    }

    #[test]
    fn sync_video_clips_syncs_all() {
        let mut global = GlobalDb::in_memory().unwrap();
        let video = sample_video();
        let mut clip_a = Clip::new(video.id, 0.0, 5.0);
        clip_a.id = 1;
        clip_a.description = Some("sunrise over the hills".to_string());
        let mut clip_b = Clip::new(video.id, 5.0, 10.0);
        clip_b.id = 2;
        clip_b.description = Some("sunset over the ocean".to_string());

        sync_video_clips(&mut global, "/library/a", &video, &[clip_a, clip_b]).unwrap();
        assert_eq!(global.fts_search("sunrise", None, 10).unwrap().len(), 1);
        assert_eq!(global.fts_search("sunset", None, 10).unwrap().len(), 1);
    }

    #[test]
    fn remove_clip_drops_it_from_fts() {
        let mut global = GlobalDb::in_memory().unwrap();
        let video = sample_video();
        let mut clip = Clip::new(video.id, 0.0, 5.0);
        clip.id = 1;
        clip.description = Some("a dog running on the beach".to_string());
        sync_clip(&mut global, "/library/a", &video, &clip).unwrap();
        remove_clip(&global, "/library/a", 1).unwrap();
        assert!(global.fts_search("dog", None, 10).unwrap().is_empty());
    }
}
