//! Query tokenization: positive/negative terms, quoted phrases, and
//! CJK-vs-Latin segmentation.

use crate::dictionary::zh_terms_by_length;
use unicode_segmentation::UnicodeSegmentation;

/// A query split into its structural pieces. Quoted phrases bypass both
/// stemming and translation; negative terms are `-`-prefixed tokens with
/// the prefix stripped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub quoted: Vec<String>,
}

/// Extract quoted phrases, then split the remainder into positive and
/// negative (`-prefixed`) terms on whitespace.
pub fn parse_query(text: &str) -> ParsedQuery {
    let mut quoted = Vec::new();
    let mut rest = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            let phrase: String = chars.by_ref().take_while(|&c| c != '"').collect();
            if !phrase.trim().is_empty() {
                quoted.push(phrase.trim().to_string());
            }
        } else {
            rest.push(c);
        }
    }

    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for token in rest.split_whitespace() {
        if let Some(term) = token.strip_prefix('-') {
            if !term.is_empty() {
                negative.push(term.to_string());
            }
        } else {
            positive.push(token.to_string());
        }
    }

    ParsedQuery {
        positive,
        negative,
        quoted,
    }
}

/// Whitespace/unicode-word segmentation for Latin-script text.
pub fn segment_latin(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_string).collect()
}

/// Greedy longest-match segmentation for CJK text against the embedded
/// dictionary: at each position, try the longest known dictionary term
/// that matches, falling back to a single character when nothing matches.
pub fn segment_cjk(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let dict_terms = zh_terms_by_length();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let remaining: String = chars[i..].iter().collect();
        let matched = dict_terms
            .iter()
            .find(|term| remaining.starts_with(*term))
            .copied();

        match matched {
            Some(term) => {
                out.push(term.to_string());
                i += term.chars().count();
            }
            None => {
                out.push(chars[i].to_string());
                i += 1;
            }
        }
    }

    out
}

/// Segment text using the appropriate strategy for its script.
pub fn segment(text: &str, is_cjk: bool) -> Vec<String> {
    if is_cjk {
        segment_cjk(text)
    } else {
        segment_latin(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_extracts_quoted_and_negative() {
        let parsed = parse_query(r#"beach "golden hour" -rain"#);
        assert_eq!(parsed.positive, vec!["beach".to_string()]);
        assert_eq!(parsed.negative, vec!["rain".to_string()]);
        assert_eq!(parsed.quoted, vec!["golden hour".to_string()]);
    }

    #[test]
    fn parse_query_handles_no_special_tokens() {
        let parsed = parse_query("mountain lake");
        assert_eq!(parsed.positive, vec!["mountain".to_string(), "lake".to_string()]);
        assert!(parsed.negative.is_empty());
        assert!(parsed.quoted.is_empty());
    }

    #[test]
    fn segment_cjk_prefers_dictionary_terms() {
        let tokens = segment_cjk("海滩日落");
        assert_eq!(tokens, vec!["海滩".to_string(), "日落".to_string()]);
    }

    #[test]
    fn segment_cjk_falls_back_to_single_chars() {
        let tokens = segment_cjk("未知词");
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn segment_latin_splits_on_words() {
        assert_eq!(segment_latin("a sunset beach"), vec!["a", "sunset", "beach"]);
    }
}
