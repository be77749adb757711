//! FCPXML 1.11 export (§6): one `<format>`/`<asset>` pair per distinct
//! source file, an ordered `<spine>` of `<asset-clip>` references.
//!
//! Timecode/frame-rate conversion reuses [`crate::timecode`]'s SMPTE
//! rational helper rather than re-deriving it — the same
//! `frameDuration` math backs both the EDL exporter's timecode column
//! and this module's `<format>` resources.

use crate::error::{FindItError, Result};
use crate::timecode::frame_duration_rational;
use std::path::Path;

/// One timeline clip sourced from a probed (or unprobed) media file.
/// `fps` is `None` when the source was never probed — §6: "unprobed
/// sources fall back to the sequence format r1".
#[derive(Debug, Clone)]
pub struct SourceClip {
    pub video_path: String,
    pub clip_name: String,
    pub fps: Option<f64>,
    pub start_time: f64,
    pub end_time: f64,
}

/// A sequence of clips to serialize into one FCPXML document.
#[derive(Debug, Clone)]
pub struct FcpxmlExport {
    pub project_name: String,
    /// The timeline's own edit rate. Every `<asset-clip>` offset/duration
    /// in the spine is expressed at this rate regardless of its source's
    /// native fps (§6: "event-clip offsets accumulate in timeline
    /// order"); only the per-source `<format>`/`<asset>` resources carry
    /// each source's own native rate.
    pub sequence_fps: f64,
    pub clips: Vec<SourceClip>,
}

struct AssetEntry {
    id: String,
    video_path: String,
    name: String,
    format_id: String,
    max_end_time: f64,
    fps: f64,
}

/// Escape `& < > " '` in an attribute value (§6).
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// `{frames*num}/{den}s`, using FCPXML's bare `"0s"` convention for a
/// zero-length duration or offset.
fn duration_rational(seconds: f64, fps: f64) -> String {
    if seconds <= 0.0 {
        return "0s".to_string();
    }
    let (num, den) = frame_duration_rational(fps);
    let frames = (seconds * fps).round() as i64;
    format!("{}/{}s", frames * num as i64, den)
}

fn file_stem_name(video_path: &str, fallback: &str) -> String {
    Path::new(video_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn is_drop_capable(fps: f64) -> bool {
    (fps - 29.97).abs() < 0.01 || (fps - 59.94).abs() < 0.01
}

impl FcpxmlExport {
    /// Render the full FCPXML document. Fails only when there is nothing
    /// to export — an empty `<spine>` isn't a format the rest of §6's
    /// rules (asset duration = max endTime, etc.) can describe.
    pub fn render(&self) -> Result<String> {
        if self.clips.is_empty() {
            return Err(FindItError::Validation("no clips to export".into()));
        }

        let mut assets: Vec<AssetEntry> = Vec::new();
        let mut next_format_id = 2u32; // r1 is reserved for the sequence format.

        for clip in &self.clips {
            if let Some(existing) = assets.iter_mut().find(|a| a.video_path == clip.video_path) {
                existing.max_end_time = existing.max_end_time.max(clip.end_time);
                continue;
            }
            let (format_id, fps) = match clip.fps {
                Some(fps) => {
                    let id = format!("r{next_format_id}");
                    next_format_id += 1;
                    (id, fps)
                }
                None => ("r1".to_string(), self.sequence_fps),
            };
            assets.push(AssetEntry {
                id: format!("a{}", assets.len() + 1),
                video_path: clip.video_path.clone(),
                name: file_stem_name(&clip.video_path, &clip.clip_name),
                format_id,
                max_end_time: clip.end_time,
                fps,
            });
        }

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<!DOCTYPE fcpxml>\n");
        xml.push_str("<fcpxml version=\"1.11\">\n");
        xml.push_str("  <resources>\n");

        let (seq_num, seq_den) = frame_duration_rational(self.sequence_fps);
        xml.push_str(&format!(
            "    <format id=\"r1\" name=\"FFVideoFormatRate\" frameDuration=\"{seq_num}/{seq_den}s\"/>\n"
        ));
        for asset in &assets {
            if asset.format_id == "r1" {
                continue;
            }
            let (num, den) = frame_duration_rational(asset.fps);
            xml.push_str(&format!(
                "    <format id=\"{}\" name=\"FFVideoFormatRate\" frameDuration=\"{num}/{den}s\"/>\n",
                asset.format_id
            ));
        }
        for asset in &assets {
            xml.push_str(&format!(
                "    <asset id=\"{}\" name=\"{}\" duration=\"{}\" format=\"{}\" hasVideo=\"1\">\n",
                asset.id,
                escape_attr(&asset.name),
                duration_rational(asset.max_end_time, asset.fps),
                asset.format_id,
            ));
            xml.push_str(&format!(
                "      <media-rep kind=\"original-media\" src=\"{}\"/>\n",
                escape_attr(&format!("file://{}", asset.video_path))
            ));
            xml.push_str("    </asset>\n");
        }
        xml.push_str("  </resources>\n");

        xml.push_str(&format!("  <project name=\"{}\">\n", escape_attr(&self.project_name)));
        let tc_format = if is_drop_capable(self.sequence_fps) { "DF" } else { "NDF" };
        xml.push_str(&format!("    <sequence format=\"r1\" tcStart=\"0s\" tcFormat=\"{tc_format}\">\n"));
        xml.push_str("      <spine>\n");

        let mut offset_seconds = 0.0;
        for clip in &self.clips {
            let asset = assets
                .iter()
                .find(|a| a.video_path == clip.video_path)
                .expect("asset registered for every clip above");
            let clip_duration = clip.end_time - clip.start_time;
            xml.push_str(&format!(
                "        <asset-clip ref=\"{}\" offset=\"{}\" duration=\"{}\" name=\"{}\"/>\n",
                asset.id,
                duration_rational(offset_seconds, self.sequence_fps),
                duration_rational(clip_duration, self.sequence_fps),
                escape_attr(&clip.clip_name),
            ));
            offset_seconds += clip_duration;
        }

        xml.push_str("      </spine>\n");
        xml.push_str("    </sequence>\n");
        xml.push_str("  </project>\n");
        xml.push_str("</fcpxml>\n");
        Ok(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_attr_covers_all_five_characters() {
        assert_eq!(escape_attr("a<b>c&d\"e'f"), "a&lt;b&gt;c&amp;d&quot;e&apos;f");
    }

    #[test]
    fn empty_export_is_a_validation_error() {
        let export = FcpxmlExport {
            project_name: "Empty".to_string(),
            sequence_fps: 24.0,
            clips: vec![],
        };
        assert!(export.render().is_err());
    }

    /// §8 scenario 6: two clips, one from a 24fps asset (5s), one from a
    /// 29.97 drop-frame asset (3s, probed).
    #[test]
    fn mixed_fps_sources_scenario() {
        let export = FcpxmlExport {
            project_name: "Mixed FPS".to_string(),
            sequence_fps: 24.0,
            clips: vec![
                SourceClip {
                    video_path: "/media/clip_a.mov".to_string(),
                    clip_name: "clip_a".to_string(),
                    fps: Some(24.0),
                    start_time: 0.0,
                    end_time: 5.0,
                },
                SourceClip {
                    video_path: "/media/clip_b.mov".to_string(),
                    clip_name: "clip_b".to_string(),
                    fps: Some(29.97),
                    start_time: 0.0,
                    end_time: 3.0,
                },
            ],
        };
        let xml = export.render().unwrap();

        assert!(xml.contains(r#"frameDuration="100/2400s""#));
        assert!(xml.contains(r#"frameDuration="1001/30000s""#));
        assert!(xml.contains(r#"tcStart="0s""#));

        // First asset's duration covers its clip's 5s endTime at 24fps.
        assert!(xml.contains(r#"duration="12000/2400s" format="r2""#));
        // Second asset's duration covers its clip's 3s endTime at 29.97fps.
        assert!(xml.contains(r#"duration="90090/30000s" format="r3""#));

        // The second spine clip's offset accumulates the first clip's
        // duration, expressed at the sequence's own (24fps) rate.
        assert!(xml.contains(r#"offset="12000/2400s""#));
    }

    #[test]
    fn unprobed_source_falls_back_to_sequence_format() {
        let export = FcpxmlExport {
            project_name: "Unprobed".to_string(),
            sequence_fps: 30.0,
            clips: vec![SourceClip {
                video_path: "/media/unknown.mov".to_string(),
                clip_name: "unknown".to_string(),
                fps: None,
                start_time: 0.0,
                end_time: 2.0,
            }],
        };
        let xml = export.render().unwrap();
        assert!(xml.contains(r#"format="r1""#));
        assert!(!xml.contains("r2"));
    }

    #[test]
    fn duration_rational_matches_apple_convention() {
        assert_eq!(duration_rational(5.0, 24.0), "12000/2400s");
        assert_eq!(duration_rational(0.0, 24.0), "0s");
    }
}
