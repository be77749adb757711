//! Shared row types for the Folder DB and Global DB.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Photo,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Photo => "photo",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "photo" => Some(Self::Photo),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Pending,
    MetadataDone,
    VectorsDone,
    SttRunning,
    SttDone,
    VisionRunning,
    Completed,
    Failed,
    Orphaned,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MetadataDone => "metadata_done",
            Self::VectorsDone => "vectors_done",
            Self::SttRunning => "stt_running",
            Self::SttDone => "stt_done",
            Self::VisionRunning => "vision_running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Orphaned => "orphaned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "metadata_done" => Self::MetadataDone,
            "vectors_done" => Self::VectorsDone,
            "stt_running" => Self::SttRunning,
            "stt_done" => Self::SttDone,
            "vision_running" => Self::VisionRunning,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "orphaned" => Self::Orphaned,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLabel {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Gray,
    None,
}

impl ColorLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Purple => "purple",
            Self::Gray => "gray",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "red" => Self::Red,
            "orange" => Self::Orange,
            "yellow" => Self::Yellow,
            "green" => Self::Green,
            "blue" => Self::Blue,
            "purple" => Self::Purple,
            "gray" => Self::Gray,
            "none" => Self::None,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub volume_uuid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Video {
    pub id: i64,
    pub folder_id: i64,
    pub path: String,
    pub filename: String,
    pub duration: f64,
    pub byte_size: u64,
    pub media_type: MediaType,
    pub content_hash: String,
    pub index_status: IndexStatus,
    pub index_layer: i32,
    pub index_error: Option<String>,
    pub srt_path: Option<String>,
}

/// A clip's enumerated attribute lists. JSON-serialized for the Folder DB,
/// space-joined for the Global DB — the two forms are kept deliberately
/// asymmetric (see DESIGN.md's notes on the source's tag-normalization
/// split); this type is the in-memory form shared by both encodings.
#[derive(Debug, Clone, Default)]
pub struct ClipLists {
    pub subjects: Vec<String>,
    pub actions: Vec<String>,
    pub objects: Vec<String>,
    pub colors: Vec<String>,
    pub tags: Vec<String>,
    pub user_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Clip {
    pub id: i64,
    pub video_id: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub scene: Option<String>,
    pub description: Option<String>,
    pub lists: ClipLists,
    pub transcript: Option<String>,
    pub shot_type: Option<String>,
    pub mood: Option<String>,
    pub lighting: Option<String>,
    pub rating: i32,
    pub color_label: ColorLabel,
    pub thumbnail_path: Option<String>,
    pub clip_embedding: Option<Vec<f32>>,
    pub clip_embedding_model: Option<String>,
    pub text_embedding: Option<Vec<f32>>,
    pub text_embedding_model: Option<String>,
}

impl Clip {
    pub fn new(video_id: i64, start_time: f64, end_time: f64) -> Self {
        Self {
            id: 0,
            video_id,
            start_time,
            end_time,
            scene: None,
            description: None,
            lists: ClipLists::default(),
            transcript: None,
            shot_type: None,
            mood: None,
            lighting: None,
            rating: 0,
            color_label: ColorLabel::None,
            thumbnail_path: None,
            clip_embedding: None,
            clip_embedding_model: None,
            text_embedding: None,
            text_embedding_model: None,
        }
    }
}

/// Serialize an f32 embedding to a little-endian byte blob for storage.
pub fn embedding_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Inverse of [`embedding_to_blob`].
pub fn blob_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// JSON-array tag encoding, used by the Folder DB.
pub fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a Folder-DB-style JSON tag array.
pub fn tags_from_json(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

/// Space-separated tag encoding, used by the Global DB for FTS.
pub fn tags_to_space_separated(tags: &[String]) -> String {
    tags.join(" ")
}

/// Parse tags that may be in either form: tries JSON first (Global DB
/// readers must tolerate rows written before a given sync, or written by
/// a future encoder), falls back to whitespace split. See SPEC_FULL.md
/// Open Question (a) — the asymmetry is preserved deliberately, readers
/// must handle both.
pub fn tags_from_either(s: &str) -> Vec<String> {
    if s.trim_start().starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(s) {
            return v;
        }
    }
    s.split_whitespace().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_blob_round_trips() {
        let v = vec![0.1_f32, -0.5, 1.0, 0.0];
        let blob = embedding_to_blob(&v);
        let back = blob_to_embedding(&blob);
        assert_eq!(v, back);
    }

    #[test]
    fn tags_from_either_parses_json_and_space_separated() {
        assert_eq!(tags_from_either(r#"["beach","sunset"]"#), vec!["beach", "sunset"]);
        assert_eq!(tags_from_either("beach sunset"), vec!["beach", "sunset"]);
    }

    #[test]
    fn status_and_media_type_round_trip_through_strings() {
        for s in [
            IndexStatus::Pending,
            IndexStatus::VisionRunning,
            IndexStatus::Orphaned,
        ] {
            assert_eq!(IndexStatus::parse(s.as_str()), Some(s));
        }
        for m in [MediaType::Video, MediaType::Photo, MediaType::Audio] {
            assert_eq!(MediaType::parse(m.as_str()), Some(m));
        }
    }
}
