//! CMX 3600 EDL export (§6): `TITLE:`/`FCM:` header, one event line per
//! clip with accumulating record timecode, optional comment lines.
//!
//! Reuses [`crate::timecode::Timecode`] for every timecode column so the
//! drop-frame semantics the unit-level SMPTE arithmetic already proves
//! (§8's drop-frame testable properties) are exactly what shows up in an
//! exported EDL, rather than a second ad hoc implementation.

use crate::error::{FindItError, Result};
use crate::timecode::Timecode;
use std::path::Path;

/// CMX 3600 caps an EDL at 999 numbered events.
pub const MAX_EVENTS: usize = 999;

/// Transcript text in a `* COMMENT:` line is truncated to this many
/// characters (§6).
pub const COMMENT_MAX_CHARS: usize = 120;

/// How each event line's reel name column is derived (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReelNamingPolicy {
    /// First 8 characters of the source filename, sanitized to
    /// `[A-Z0-9_]`.
    FirstEightOfFilename,
    /// `REELnnnn`, a four-digit sequence number per event.
    Sequential,
    /// One fixed 8-character name reused for every event.
    Fixed,
}

#[derive(Debug, Clone)]
pub struct EdlClip {
    pub video_path: String,
    pub clip_name: String,
    /// Source in/out, seconds into the source media.
    pub src_in: f64,
    pub src_out: f64,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EdlExport {
    pub title: String,
    /// The record-timeline frame rate; record in/out timecodes accumulate
    /// at this rate regardless of each clip's own source rate.
    pub record_fps: f64,
    pub drop_frame: bool,
    pub reel_policy: ReelNamingPolicy,
    /// Required (and used) only when `reel_policy` is `Fixed`.
    pub fixed_reel_name: Option<String>,
    pub clips: Vec<EdlClip>,
}

/// Keep only `[A-Z0-9_]`, uppercased, truncated to 8 characters — the
/// reel-name column's format regardless of which policy produced the
/// candidate name.
fn sanitize_reel(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(8)
        .collect()
}

impl EdlExport {
    fn reel_name(&self, index: usize, clip: &EdlClip) -> String {
        match self.reel_policy {
            ReelNamingPolicy::FirstEightOfFilename => {
                let stem = Path::new(&clip.video_path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| clip.clip_name.clone());
                let name = sanitize_reel(&stem);
                if name.is_empty() {
                    format!("REEL{:04}", index + 1)
                } else {
                    name
                }
            }
            ReelNamingPolicy::Sequential => format!("REEL{:04}", index + 1),
            ReelNamingPolicy::Fixed => sanitize_reel(self.fixed_reel_name.as_deref().unwrap_or("REEL")),
        }
    }

    /// Render the full EDL text. Fails when the event count exceeds
    /// CMX 3600's 999-event cap (§6) rather than silently truncating.
    pub fn render(&self) -> Result<String> {
        if self.clips.len() > MAX_EVENTS {
            return Err(FindItError::Validation(format!(
                "EDL supports at most {MAX_EVENTS} events, got {}",
                self.clips.len()
            )));
        }

        let mut out = String::new();
        out.push_str(&format!("TITLE: {}\n", self.title));
        out.push_str(if self.drop_frame { "FCM: DROP FRAME\n" } else { "FCM: NON-DROP FRAME\n" });
        out.push('\n');

        let mut record_seconds = 0.0;
        for (i, clip) in self.clips.iter().enumerate() {
            let event_num = i + 1;
            let reel = self.reel_name(i, clip);
            let duration = (clip.src_out - clip.src_in).max(0.0);

            let src_in_tc = Timecode::from_seconds(clip.src_in, self.record_fps, self.drop_frame).format();
            let src_out_tc = Timecode::from_seconds(clip.src_out, self.record_fps, self.drop_frame).format();
            let rec_in_tc = Timecode::from_seconds(record_seconds, self.record_fps, self.drop_frame).format();
            let rec_out_tc = Timecode::from_seconds(record_seconds + duration, self.record_fps, self.drop_frame).format();

            out.push_str(&format!(
                "{event_num:03}  {reel:<8} V     C        {src_in_tc} {src_out_tc} {rec_in_tc} {rec_out_tc}\n"
            ));

            if !clip.clip_name.is_empty() {
                out.push_str(&format!("* FROM CLIP NAME: {}\n", clip.clip_name));
            }
            out.push_str(&format!("* SOURCE FILE: {}\n", clip.video_path));
            if let Some(transcript) = &clip.transcript {
                let truncated: String = transcript.chars().take(COMMENT_MAX_CHARS).collect();
                out.push_str(&format!("* COMMENT: {truncated}\n"));
            }
            out.push('\n');

            record_seconds += duration;
        }

        Ok(out)
    }
}
