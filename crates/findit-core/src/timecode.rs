//! SMPTE timecode arithmetic: non-drop and drop-frame (29.97 / 59.94).
//!
//! Drop-frame encodes a non-integer frame rate as an integer-frame
//! timecode by skipping frame *labels* (not actual frames) at most minute
//! boundaries: two labels dropped per minute for 29.97, by analogy four
//! for 59.94 (see DESIGN.md — unverified against an independent source,
//! matching the same caveat in the product this was distilled from).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    pub fps: f64,
    pub drop: bool,
}

fn is_drop_capable(fps: f64) -> bool {
    (fps - 29.97).abs() < 0.01 || (fps - 59.94).abs() < 0.01
}

fn dropped_frames_per_minute(fps: f64) -> u32 {
    if (fps - 59.94).abs() < 0.01 {
        4
    } else {
        2
    }
}

impl Timecode {
    /// Build a timecode from an elapsed-seconds offset. `drop` is only
    /// honored when `fps` is 29.97 or 59.94; any other rate is always
    /// encoded non-drop.
    pub fn from_seconds(seconds: f64, fps: f64, drop: bool) -> Self {
        let drop = drop && is_drop_capable(fps);
        let nominal_fps = fps.round() as u64;
        let real_frames = (seconds * fps).round() as u64;

        let label_frames = if drop {
            let d = dropped_frames_per_minute(fps) as u64;
            let frames_per_min = nominal_fps * 60;
            let frames_per_10min = frames_per_min * 10 - d * 9;
            let d10 = real_frames / frames_per_10min;
            let m = real_frames % frames_per_10min;
            if m < d {
                real_frames + d * 9 * d10
            } else {
                real_frames + d * 9 * d10 + d * ((m - d) / (frames_per_min - d))
            }
        } else {
            real_frames
        };

        let frames = (label_frames % nominal_fps) as u32;
        let total_seconds = label_frames / nominal_fps;
        let seconds_part = (total_seconds % 60) as u32;
        let minutes = ((total_seconds / 60) % 60) as u32;
        let hours = (total_seconds / 3600) as u32;

        Self {
            hours,
            minutes,
            seconds: seconds_part,
            frames,
            fps,
            drop,
        }
    }

    /// Reconstruct the elapsed-seconds value this timecode represents.
    pub fn total_seconds(&self) -> f64 {
        let nominal_fps = self.fps.round() as u64;
        let label_frames = (self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64)
            * nominal_fps
            + self.frames as u64;

        let real_frames = if self.drop {
            let d = dropped_frames_per_minute(self.fps) as u64;
            let total_minutes = self.hours as u64 * 60 + self.minutes as u64;
            let d10 = total_minutes / 10;
            let m10 = total_minutes % 10;
            let dropped_so_far = d * 9 * d10 + d * m10;
            label_frames - dropped_so_far
        } else {
            label_frames
        };

        real_frames as f64 / self.fps
    }

    /// `HH:MM:SS:FF` for non-drop, `HH:MM:SS;FF` for drop-frame.
    pub fn format(&self) -> String {
        let sep = if self.drop { ';' } else { ':' };
        format!(
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }

    /// Parse `HH:MM:SS:FF` or `HH:MM:SS;FF`. The separator before the
    /// frame count determines `drop`; the caller supplies `fps` since it
    /// isn't encoded in the string.
    pub fn parse(text: &str, fps: f64) -> Option<Self> {
        let drop = text.contains(';');
        let normalized = text.replace(';', ":");
        let parts: Vec<&str> = normalized.split(':').collect();
        if parts.len() != 4 {
            return None;
        }
        let hours = parts[0].parse().ok()?;
        let minutes = parts[1].parse().ok()?;
        let seconds = parts[2].parse().ok()?;
        let frames = parts[3].parse().ok()?;
        Some(Self {
            hours,
            minutes,
            seconds,
            frames,
            fps,
            drop: drop && is_drop_capable(fps),
        })
    }
}

/// Apple/FCPXML rational `frameDuration` for a known nominal frame rate,
/// e.g. 29.97 → `1001/30000s`.
pub fn frame_duration_rational(fps: f64) -> (u32, u32) {
    if (fps - 29.97).abs() < 0.01 {
        (1001, 30000)
    } else if (fps - 59.94).abs() < 0.01 {
        (1001, 60000)
    } else if (fps - 23.976).abs() < 0.01 {
        (1001, 24000)
    } else if (fps - 24.0).abs() < 0.01 {
        (100, 2400)
    } else {
        let den = (fps * 100.0).round() as u32;
        (100, den)
    }
}
