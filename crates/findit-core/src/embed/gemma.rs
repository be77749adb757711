//! EmbeddingGemma text encoder via ONNX Runtime.
//!
//! Same loading/inference shape as [`super::clip::ClipEmbedder`]'s text
//! tower, kept as a separate type because it has no vision tower and is
//! selected independently in the provider fallback order.

use crate::embed::{l2_normalize, EMBEDDING_DIM};
use crate::error::{FindItError, Result};
use std::path::PathBuf;

#[cfg(feature = "onnx")]
use ort::session::Session;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

const MAX_SEQ_LEN: usize = 256;

pub struct GemmaEmbedder {
    #[cfg(feature = "onnx")]
    session: Option<Session>,
    #[cfg(feature = "onnx")]
    tokenizer: Option<Tokenizer>,
    model_path: PathBuf,
    tokenizer_path: PathBuf,
}

impl GemmaEmbedder {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        let model_dir = model_dir.into();
        Self {
            #[cfg(feature = "onnx")]
            session: None,
            #[cfg(feature = "onnx")]
            tokenizer: None,
            model_path: model_dir.join("embeddinggemma.onnx"),
            tokenizer_path: model_dir.join("tokenizer.json"),
        }
    }

    pub fn default_model_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("findit")
            .join("models")
            .join("gemma")
    }

    pub fn is_loaded(&self) -> bool {
        self.model_path.exists() && self.tokenizer_path.exists()
    }

    #[cfg(feature = "onnx")]
    fn ensure_session(&mut self) -> Result<&mut Session> {
        if self.session.is_none() {
            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(4))
                .and_then(|b| b.commit_from_file(&self.model_path))
                .map_err(|e| {
                    FindItError::FatalGlobal(anyhow::anyhow!(
                        "failed to load EmbeddingGemma model from {}: {e}",
                        self.model_path.display()
                    ))
                })?;
            self.session = Some(session);
        }
        Ok(self.session.as_mut().unwrap())
    }

    #[cfg(feature = "onnx")]
    fn ensure_tokenizer(&mut self) -> Result<()> {
        if self.tokenizer.is_none() {
            self.tokenizer = Some(super::load_tokenizer(&self.tokenizer_path)?);
        }
        Ok(())
    }

    #[cfg(feature = "onnx")]
    pub fn embed_text(&mut self, text: &str) -> Result<Vec<f32>> {
        use ort::value::Value;

        self.ensure_tokenizer()?;
        let ids = super::encode_ids(self.tokenizer.as_ref().unwrap(), text, MAX_SEQ_LEN)?;
        let seq_len = ids.len();
        let input_ids = ndarray::Array2::from_shape_vec((1, seq_len), ids)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let attention_mask = ndarray::Array2::<i64>::ones((1, seq_len));

        let input_ids_value =
            Value::from_array(input_ids).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let mask_value =
            Value::from_array(attention_mask).map_err(|e| FindItError::FatalGlobal(e.into()))?;

        let session = self.ensure_session()?;
        let outputs = session
            .run(ort::inputs![input_ids_value, mask_value])
            .map_err(|e| FindItError::Transient(format!("Gemma inference failed: {e}")))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;

        let mut embedding: Vec<f32> = data.to_vec();
        embedding.truncate(EMBEDDING_DIM);
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    #[cfg(not(feature = "onnx"))]
    pub fn embed_text(&mut self, _text: &str) -> Result<Vec<f32>> {
        Err(FindItError::Transient("onnx feature not enabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_loaded_without_model_file() {
        let embedder = GemmaEmbedder::new("/nonexistent/findit/gemma/dir");
        assert!(!embedder.is_loaded());
    }
}
