//! Embedded bidirectional EN↔ZH term dictionary.
//!
//! Used by the query pipeline to expand a query into the other script when
//! no external translator is configured. Matching on the EN side is
//! case-insensitive; multi-word EN phrases are matched greedily before
//! falling back to single words, and CJK segmentation walks the ZH side
//! the same way.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// (English, Chinese) pairs. English entries are lowercase; multi-word
/// phrases are listed before any of their constituent single words so
/// greedy longest-match prefers them.
const TERMS: &[(&str, &str)] = &[
    ("sunset", "日落"),
    ("sunrise", "日出"),
    ("beach", "海滩"),
    ("ocean", "海洋"),
    ("forest", "森林"),
    ("mountain", "山"),
    ("mountains", "山脉"),
    ("river", "河流"),
    ("lake", "湖"),
    ("city", "城市"),
    ("street", "街道"),
    ("night", "夜晚"),
    ("rain", "雨"),
    ("snow", "雪"),
    ("wedding", "婚礼"),
    ("birthday", "生日"),
    ("family", "家庭"),
    ("child", "孩子"),
    ("children", "孩子们"),
    ("dog", "狗"),
    ("cat", "猫"),
    ("car", "汽车"),
    ("flight", "航班"),
    ("airport", "机场"),
    ("concert", "音乐会"),
    ("party", "派对"),
    ("food", "食物"),
    ("restaurant", "餐厅"),
    ("park", "公园"),
    ("garden", "花园"),
    ("flower", "花"),
    ("flowers", "花朵"),
    ("portrait", "肖像"),
    ("landscape", "风景"),
    ("interview", "采访"),
    ("meeting", "会议"),
    ("office", "办公室"),
    ("home", "家"),
    ("school", "学校"),
];

static EN_TO_ZH: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| TERMS.iter().copied().collect());

static ZH_TO_EN: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| TERMS.iter().map(|&(en, zh)| (zh, en)).collect());

/// Greedy longest-match phrase length considered when walking the EN side
/// (in whitespace-separated words).
const MAX_EN_PHRASE_WORDS: usize = 2;

/// Look up a single English term (case-insensitive, exact match only).
pub fn en_to_zh(term: &str) -> Option<&'static str> {
    EN_TO_ZH.get(term.to_lowercase().as_str()).copied()
}

/// Look up a single Chinese term (exact match only).
pub fn zh_to_en(term: &str) -> Option<&'static str> {
    ZH_TO_EN.get(term).copied()
}

/// Translate a whitespace-tokenized list of EN terms into ZH, greedily
/// matching the longest known phrase first. Returns `None` if nothing in
/// `terms` has a translation, matching the "translation available" gate in
/// the query pipeline's expansion rule.
pub fn translate_en_terms(terms: &[String]) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut matched_any = false;
    let mut i = 0;
    while i < terms.len() {
        let mut matched = false;
        for span in (1..=MAX_EN_PHRASE_WORDS.min(terms.len() - i)).rev() {
            let phrase = terms[i..i + span].join(" ");
            if let Some(zh) = en_to_zh(&phrase) {
                out.push(zh.to_string());
                i += span;
                matched = true;
                matched_any = true;
                break;
            }
        }
        if !matched {
            out.push(terms[i].clone());
            i += 1;
        }
    }
    matched_any.then_some(out)
}

/// Translate ZH dictionary terms found via [`crate::segment::segment_cjk`]
/// into EN. Returns `None` if none of `terms` has a translation.
pub fn translate_zh_terms(terms: &[String]) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut matched_any = false;
    for term in terms {
        if let Some(en) = zh_to_en(term) {
            out.push(en.to_string());
            matched_any = true;
        } else {
            out.push(term.clone());
        }
    }
    matched_any.then_some(out)
}

/// All known ZH dictionary terms, longest first, for greedy segmentation.
pub fn zh_terms_by_length() -> Vec<&'static str> {
    let mut terms: Vec<&'static str> = ZH_TO_EN.keys().copied().collect();
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    terms
}
