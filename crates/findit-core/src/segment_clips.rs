//! Layer-0 clip segmentation: shot-detected boundaries with a
//! fixed-interval fallback.

const MIN_CLIP_SECS: f64 = 1.0;
const MAX_CLIP_SECS: f64 = 30.0;
const FIXED_INTERVAL_SECS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSpan {
    pub start: f64,
    pub end: f64,
}

impl ClipSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Segment a video's duration into clips. `shot_boundaries` is a sorted
/// list of detected scene-cut timestamps (seconds), or empty when shot
/// detection failed/was unavailable — in which case we fall back to fixed
/// 10s intervals, with the final segment truncated (never padded) to
/// `duration`.
pub fn segment_video(duration: f64, shot_boundaries: &[f64]) -> Vec<ClipSpan> {
    if duration <= 0.0 {
        return Vec::new();
    }
    if shot_boundaries.is_empty() {
        return fixed_interval_segments(duration);
    }
    from_shot_boundaries(duration, shot_boundaries)
}

fn fixed_interval_segments(duration: f64) -> Vec<ClipSpan> {
    let mut spans = Vec::new();
    let mut start = 0.0;
    while start < duration {
        let end = (start + FIXED_INTERVAL_SECS).min(duration);
        spans.push(ClipSpan { start, end });
        start = end;
    }
    spans
}

/// Merge boundaries that would produce a clip shorter than [`MIN_CLIP_SECS`]
/// into the following one, and split any clip longer than
/// [`MAX_CLIP_SECS`] at fixed intervals within its span.
fn from_shot_boundaries(duration: f64, shot_boundaries: &[f64]) -> Vec<ClipSpan> {
    let mut cuts: Vec<f64> = shot_boundaries
        .iter()
        .copied()
        .filter(|&t| t > 0.0 && t < duration)
        .collect();
    cuts.push(duration);

    let mut spans = Vec::new();
    let mut start = 0.0;
    for &cut in &cuts {
        if cut - start < MIN_CLIP_SECS && (cut - duration).abs() > f64::EPSILON {
            // Too short: fold into the next boundary instead of emitting it.
            continue;
        }
        let mut seg_start = start;
        while cut - seg_start > MAX_CLIP_SECS {
            let seg_end = seg_start + MAX_CLIP_SECS;
            spans.push(ClipSpan {
                start: seg_start,
                end: seg_end,
            });
            seg_start = seg_end;
        }
        spans.push(ClipSpan {
            start: seg_start,
            end: cut,
        });
        start = cut;
    }
    spans
}

/// A single clip spanning the whole file, used for photos ([0, 0]) and
/// audio ([0, duration]).
pub fn single_span(duration: f64) -> Vec<ClipSpan> {
    vec![ClipSpan {
        start: 0.0,
        end: duration,
    }]
}
