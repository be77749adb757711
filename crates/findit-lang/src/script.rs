//! Script detection for the query pipeline.
//!
//! Distinguishes CJK (Chinese / Japanese / Korean) queries from Latin-script
//! queries so the query pipeline can choose dictionary-guided segmentation
//! vs. whitespace splitting, and so the search engine knows when to run the
//! cross-language FTS pass.

use serde::{Deserialize, Serialize};

/// Result of detecting the dominant script/language of a query string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub code: String,
    pub is_cjk: bool,
    pub confidence: f32,
}

/// Confidence assigned to the short-text codepoint-scan fallback.
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Minimum text length before the dominant-script recognizer is trusted
/// over the cheap codepoint scan.
const MIN_RECOGNIZER_LEN: usize = 3;

fn is_cjk_char(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x30FF   // Hiragana + Katakana
            | 0x3400..=0x4DBF // CJK Unified Ideographs Extension A
            | 0x4E00..=0x9FFF // CJK Unified Ideographs
            | 0xAC00..=0xD7A3 // Hangul syllables
            | 0xF900..=0xFAFF // CJK Compatibility Ideographs
            | 0x20000..=0x2A6DF // CJK Unified Ideographs Extension B
    )
}

/// Cheap scan used both as the short-text fallback and as the input to the
/// dominant-script recognizer.
pub fn has_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

fn cjk_char_ratio(text: &str) -> f32 {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let cjk = text.chars().filter(|&c| is_cjk_char(c)).count();
    cjk as f32 / total as f32
}

/// Detect the dominant script of `text` and report whether it should be
/// treated as a CJK query.
///
/// Text shorter than [`MIN_RECOGNIZER_LEN`] characters falls back to a bare
/// codepoint scan with a fixed confidence of 0.5, matching short queries
/// where a statistical recognizer has too little signal to be trustworthy.
pub fn detect_language(text: &str) -> LanguageDetection {
    let char_count = text.chars().count();

    if char_count < MIN_RECOGNIZER_LEN {
        let is_cjk = has_cjk(text);
        return LanguageDetection {
            code: if is_cjk { "zh".to_string() } else { "en".to_string() },
            is_cjk,
            confidence: FALLBACK_CONFIDENCE,
        };
    }

    let ratio = cjk_char_ratio(text);
    let is_cjk = ratio > 0.3;
    // Confidence scales with how decisively CJK or Latin the text skews;
    // a 50/50 mix is the least confident point either way.
    let confidence = if is_cjk {
        0.5 + ratio.min(1.0) * 0.5
    } else {
        0.5 + (1.0 - ratio).min(1.0) * 0.5
    };

    LanguageDetection {
        code: if is_cjk { "zh".to_string() } else { "en".to_string() },
        is_cjk,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_uses_fallback_confidence() {
        let d = detect_language("海");
        assert!(d.is_cjk);
        assert_eq!(d.confidence, FALLBACK_CONFIDENCE);

        let d = detect_language("ok");
        assert!(!d.is_cjk);
        assert_eq!(d.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn long_cjk_text_detected() {
        let d = detect_language("海滩日落的照片");
        assert!(d.is_cjk);
        assert!(d.confidence > FALLBACK_CONFIDENCE);
    }

    #[test]
    fn long_latin_text_detected() {
        let d = detect_language("a sunset over the beach");
        assert!(!d.is_cjk);
        assert_eq!(d.code, "en");
    }

    #[test]
    fn has_cjk_detects_mixed_strings() {
        assert!(has_cjk("beach 海滩"));
        assert!(!has_cjk("beach sunset"));
    }
}
