//! # findit-lang
//!
//! Script detection, tokenization, and EN↔ZH dictionary expansion for
//! FindIt's query pipeline. This crate owns only the language-dependent
//! parts of a query: detecting whether it's CJK or Latin, segmenting it
//! accordingly, and producing the expanded FTS/embedding forms the search
//! engine fuses across.
//!
//! ## Quick start
//!
//! ```rust
//! use findit_lang::expand_query;
//!
//! let expansion = expand_query("海滩");
//! assert!(expansion.language.is_cjk);
//! assert_eq!(expansion.translated_fts.as_deref(), Some("beach"));
//! ```

pub mod dictionary;
pub mod script;
pub mod segment;

pub use script::{detect_language, has_cjk, LanguageDetection};
pub use segment::{parse_query, segment, ParsedQuery};

/// The full expansion of a raw query string, ready for the search engine's
/// FTS and embedding stages.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpansion {
    /// FTS query string built from the original-language positive terms.
    pub original_fts: String,
    /// FTS query string built from the dictionary/translator expansion,
    /// when one is available.
    pub translated_fts: Option<String>,
    /// Text passed to the (intrinsically multilingual) embedding
    /// encoders — always the original text, never translated.
    pub embedding_text: String,
    pub language: LanguageDetection,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Join tokens into an FTS5 `MATCH` query string: quoted phrases stay
/// quoted, negative terms become `NOT` clauses.
fn build_fts(positive: &[String], negative: &[String], quoted: &[String]) -> String {
    let mut parts: Vec<String> = positive.to_vec();
    parts.extend(quoted.iter().map(|p| format!("\"{p}\"")));
    parts.extend(negative.iter().map(|n| format!("NOT {n}")));
    parts.join(" ")
}

/// Run the full query pipeline: detect language, parse positive/negative/
/// quoted terms, segment, and expand into the other script via the
/// embedded dictionary when a translation exists.
///
/// Quoted phrases are passed through unsegmented and are never translated.
pub fn expand_query(text: &str) -> QueryExpansion {
    let language = detect_language(text);
    let parsed = parse_query(text);

    // Re-segment the non-quoted positive terms using the script-appropriate
    // strategy; the whitespace split in `parse_query` already gives usable
    // Latin tokens, but CJK text needs dictionary-guided segmentation since
    // it carries no word boundaries.
    let positive = if language.is_cjk {
        let joined = parsed.positive.join("");
        segment::segment_cjk(&joined)
    } else {
        parsed.positive.clone()
    };

    let original_fts = build_fts(&positive, &parsed.negative, &parsed.quoted);

    let translated_fts = if language.is_cjk {
        dictionary::translate_zh_terms(&positive)
            .map(|terms| build_fts(&terms, &parsed.negative, &[]))
    } else {
        dictionary::translate_en_terms(&positive)
            .map(|terms| build_fts(&terms, &parsed.negative, &[]))
    };

    QueryExpansion {
        original_fts,
        translated_fts,
        embedding_text: text.to_string(),
        language,
        positive,
        negative: parsed.negative,
    }
}
