//! Embedding providers: a CLIP ONNX image+text encoder, an EmbeddingGemma
//! ONNX text encoder, and a Gemini HTTP text encoder, unified behind one
//! sum type so the indexer and search engine don't care which produced a
//! given 768-d vector as long as it's one of these three.
//!
//! All three producers share one invariant: output vectors are L2-normalized
//! to unit length before being persisted or compared — [`crate::vector_index`]
//! assumes this and only clamps the cosine score, it doesn't renormalize.

mod clip;
mod gemini;
mod gemma;

pub use clip::ClipEmbedder;
pub use gemini::GeminiEmbedder;
pub use gemma::GemmaEmbedder;

use crate::error::{FindItError, Result};
use std::path::Path;

/// Output width shared by every provider. Clips and videos store embeddings
/// tagged with the model name that produced them; search only compares
/// embeddings carrying the same tag (see [`crate::search`]).
pub const EMBEDDING_DIM: usize = 768;

/// An API key for a remote embedding provider, held in memory only —
/// never logged, never written to the Folder/Global DB.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(redacted)")
    }
}

/// One of the three embedding backends this system knows how to run.
/// Modeled as a sum type rather than `dyn Trait` because the set of
/// providers is closed and each has a distinct availability check and
/// failure mode (local model file missing vs. no network vs. no API key).
pub enum EmbeddingProvider {
    Clip(ClipEmbedder),
    Gemma(GemmaEmbedder),
    Gemini(GeminiEmbedder),
}

impl EmbeddingProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clip(_) => "clip",
            Self::Gemma(_) => "gemma",
            Self::Gemini(_) => "gemini",
        }
    }

    /// Whether this provider is currently usable: local providers check
    /// their model file exists, the remote provider holds an API key (it
    /// can't cheaply check network reachability here — that's
    /// [`crate::network`]'s job, surfaced as a transient error on call).
    pub fn is_available(&self) -> bool {
        match self {
            Self::Clip(e) => e.is_loaded(),
            Self::Gemma(e) => e.is_loaded(),
            Self::Gemini(e) => e.has_key(),
        }
    }

    pub fn embed_text(&mut self, text: &str) -> Result<Vec<f32>> {
        match self {
            Self::Clip(e) => e.embed_text(text),
            Self::Gemma(e) => e.embed_text(text),
            Self::Gemini(e) => e.embed_text(text),
        }
    }

    /// Image embedding is only meaningful for CLIP; the other two return
    /// `Validation` since they have no vision tower.
    pub fn embed_image(&mut self, path: &Path) -> Result<Vec<f32>> {
        match self {
            Self::Clip(e) => e.embed_image(path),
            other => Err(FindItError::Validation(format!(
                "{} provider has no image encoder",
                other.name()
            ))),
        }
    }
}

/// Try each provider in `candidates` in order, returning the first whose
/// [`EmbeddingProvider::is_available`] is true. Mirrors the "sequence of
/// providers tried in order" selection policy: callers build the candidate
/// list once at startup (configured preference order) and reuse the
/// selection for the run rather than re-probing per call.
pub fn select_available(candidates: &[EmbeddingProvider]) -> Option<usize> {
    candidates.iter().position(EmbeddingProvider::is_available)
}

/// Load a model's `tokenizer.json` (HuggingFace `tokenizers` format),
/// shared by every ONNX text encoder in this module — the CLIP text
/// tower, EmbeddingGemma, and (via [`crate::stt`]) Whisper all bundle one
/// alongside their `.onnx` weights.
#[cfg(feature = "onnx")]
pub(crate) fn load_tokenizer(path: &Path) -> Result<tokenizers::Tokenizer> {
    tokenizers::Tokenizer::from_file(path).map_err(|e| {
        FindItError::FatalGlobal(anyhow::anyhow!(
            "failed to load tokenizer from {}: {e}",
            path.display()
        ))
    })
}

/// Encode `text` with a loaded tokenizer and truncate to `max_len` ids,
/// the shape every ONNX text encoder in this module expects.
#[cfg(feature = "onnx")]
pub(crate) fn encode_ids(tokenizer: &tokenizers::Tokenizer, text: &str, max_len: usize) -> Result<Vec<i64>> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| FindItError::Transient(format!("tokenization failed: {e}")))?;
    let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
    ids.truncate(max_len);
    if ids.is_empty() {
        ids.push(0);
    }
    Ok(ids)
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_tolerates_zero_vector() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("super-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(redacted)");
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn load_tokenizer_missing_file_is_fatal_global() {
        let err = load_tokenizer(Path::new("/nonexistent/findit/tokenizer.json")).unwrap_err();
        assert!(matches!(err, FindItError::FatalGlobal(_)));
    }
}
