//! IPC protocol between `findit` (CLI) and `findit-daemon`.
//!
//! One [`Request`] variant per CLI tool (§6): the daemon is the only
//! process that ever opens a Folder DB or the Global DB, so every
//! tool-level operation — including read-only ones like `get-clip` — is
//! a round trip over the Unix socket rather than a direct DB open from
//! the CLI process.
//!
//! Two error channels, matching §7's propagation policy:
//! - [`Response::Error`] is a *transport*-level failure (malformed
//!   request, daemon panic) and is never what a tool-level Validation or
//!   Not-found error produces.
//! - [`ToolResult::is_error`] carries tool-level Validation/Not-found
//!   diagnostics; the CLI still exits 0 for these (§6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModeWire {
    Fts,
    Vector,
    TextVector,
    Auto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterWire {
    pub min_rating: Option<i32>,
    pub color_labels: Option<Vec<String>>,
    pub shot_types: Option<Vec<String>>,
    pub moods: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortFieldWire {
    Relevance,
    Date,
    Duration,
    Rating,
}

impl Default for SortFieldWire {
    fn default() -> Self {
        Self::Relevance
    }
}

/// One request per CLI sub-command (§6), plus daemon lifecycle requests
/// that have no direct tool counterpart (`Status`, `Shutdown`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Request {
    AddFolder { path: PathBuf },
    RemoveFolder { path: PathBuf },
    ListFolders,
    GetLibrarySummary,
    ListVideos {
        folder: Option<String>,
        status: Option<String>,
        #[serde(default = "default_limit")]
        limit: usize,
        #[serde(default)]
        offset: usize,
    },
    GetVideoDetail { video_id: i64 },
    GetClip { clip_id: i64 },
    Search {
        query: String,
        #[serde(default)]
        mode: Option<SearchModeWire>,
        #[serde(default)]
        folder_scope: Option<Vec<String>>,
        /// `None` defers to the daemon's configured `[search]` default
        /// result limit rather than a wire-level constant.
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        offset: usize,
        #[serde(default)]
        filter: Option<FilterWire>,
        #[serde(default)]
        sort: SortFieldWire,
    },
    BrowseAllClips {
        folder: Option<String>,
        #[serde(default = "default_limit")]
        limit: usize,
        #[serde(default)]
        offset: usize,
        #[serde(default)]
        sort: SortFieldWire,
    },
    SetRating { clip_id: i64, rating: i32 },
    SetColorLabel { clip_id: i64, color: String },
    AddTags { clip_id: i64, tags: Vec<String> },
    RemoveTags { clip_id: i64, tags: Vec<String> },
    GetStats { folder: Option<String> },
    Status,
    Shutdown,
}

fn default_limit() -> usize {
    20
}

/// The envelope every tool call returns, mirroring §6: `is_error=true`
/// still exits 0 at the CLI, so the daemon never needs a parallel
/// success/failure wire type per tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub is_error: bool,
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(payload: Value) -> Self {
        Self { is_error: false, payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            payload: Value::String(message.into()),
        }
    }
}

/// Transport-level response. `Result` wraps every tool call's
/// [`ToolResult`]; `Error` is reserved for request framing failures the
/// server rejects before dispatch (§7 is not the concern here — this is
/// the IPC layer, not the error taxonomy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Result(ToolResult),
    Status(DaemonStatus),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub uptime_secs: u64,
    pub folders: Vec<FolderStatusWire>,
    pub throttle_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderStatusWire {
    pub path: String,
    pub video_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
    pub is_watching: bool,
}
