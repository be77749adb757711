//! CLIP image+text encoder via ONNX Runtime.
//!
//! The exported graph takes either `input_ids`/`attention_mask` (text
//! tower) or `pixel_values` (vision tower) and produces a 768-d embedding
//! directly — no separate projection step is needed, unlike the XTR/T5
//! encoder this module's loading code was adapted from.

use crate::embed::{l2_normalize, EMBEDDING_DIM};
use crate::error::{FindItError, Result};
use ndarray::Array4;
use std::path::{Path, PathBuf};

#[cfg(feature = "onnx")]
use ort::session::Session;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

const IMAGE_SIZE: usize = 224;
const MAX_SEQ_LEN: usize = 77;

/// CLIP mean/std normalization (standard values the model was trained with).
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

pub struct ClipEmbedder {
    #[cfg(feature = "onnx")]
    text_session: Option<Session>,
    #[cfg(feature = "onnx")]
    vision_session: Option<Session>,
    #[cfg(feature = "onnx")]
    tokenizer: Option<Tokenizer>,
    model_dir: PathBuf,
}

impl ClipEmbedder {
    /// Construct without loading anything. The model directory is probed
    /// lazily so `is_loaded()` reflects whether the ONNX files are present
    /// without paying session-construction cost up front.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            #[cfg(feature = "onnx")]
            text_session: None,
            #[cfg(feature = "onnx")]
            vision_session: None,
            #[cfg(feature = "onnx")]
            tokenizer: None,
            model_dir: model_dir.into(),
        }
    }

    pub fn default_model_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("findit")
            .join("models")
            .join("clip")
    }

    fn text_model_path(&self) -> PathBuf {
        self.model_dir.join("clip_text.onnx")
    }

    fn vision_model_path(&self) -> PathBuf {
        self.model_dir.join("clip_vision.onnx")
    }

    fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }

    pub fn is_loaded(&self) -> bool {
        self.text_model_path().exists() && self.vision_model_path().exists() && self.tokenizer_path().exists()
    }

    #[cfg(feature = "onnx")]
    fn ensure_text_session(&mut self) -> Result<&mut Session> {
        if self.text_session.is_none() {
            let path = self.text_model_path();
            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(4))
                .and_then(|b| b.commit_from_file(&path))
                .map_err(|e| {
                    FindItError::FatalGlobal(anyhow::anyhow!(
                        "failed to load CLIP text model from {}: {e}",
                        path.display()
                    ))
                })?;
            self.text_session = Some(session);
        }
        Ok(self.text_session.as_mut().unwrap())
    }

    #[cfg(feature = "onnx")]
    fn ensure_vision_session(&mut self) -> Result<&mut Session> {
        if self.vision_session.is_none() {
            let path = self.vision_model_path();
            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(4))
                .and_then(|b| b.commit_from_file(&path))
                .map_err(|e| {
                    FindItError::FatalGlobal(anyhow::anyhow!(
                        "failed to load CLIP vision model from {}: {e}",
                        path.display()
                    ))
                })?;
            self.vision_session = Some(session);
        }
        Ok(self.vision_session.as_mut().unwrap())
    }

    #[cfg(feature = "onnx")]
    fn ensure_tokenizer(&mut self) -> Result<()> {
        if self.tokenizer.is_none() {
            self.tokenizer = Some(super::load_tokenizer(&self.tokenizer_path())?);
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

        let session = self.ensure_text_session()?;
        let outputs = session
            .run(ort::inputs![input_ids_value, mask_value])
            .map_err(|e| FindItError::Transient(format!("CLIP text inference failed: {e}")))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;

        let mut embedding: Vec<f32> = data.to_vec();
        embedding.truncate(EMBEDDING_DIM);
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    #[cfg(feature = "onnx")]
    pub fn embed_image(&mut self, path: &Path) -> Result<Vec<f32>> {
        let pixels = preprocess_image(path)?;
        let array = Array4::from_shape_vec((1, 3, IMAGE_SIZE, IMAGE_SIZE), pixels)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let value =
            ort::value::Value::from_array(array).map_err(|e| FindItError::FatalGlobal(e.into()))?;

        let session = self.ensure_vision_session()?;
        let outputs = session
            .run(ort::inputs![value])
            .map_err(|e| FindItError::Transient(format!("CLIP vision inference failed: {e}")))?;
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

    #[cfg(not(feature = "onnx"))]
    pub fn embed_image(&mut self, _path: &Path) -> Result<Vec<f32>> {
        Err(FindItError::Transient("onnx feature not enabled".into()))
    }
}

/// Resize to 224x224, convert to RGB, normalize with CLIP's mean/std, and
/// lay out channel-first (CHW) as the ONNX graph expects.
#[cfg(feature = "clip")]
fn preprocess_image(path: &Path) -> Result<Vec<f32>> {
    use image::imageops::FilterType;

    let img = image::open(path).map_err(|e| FindItError::FatalPerFile(e.to_string()))?;
    let resized = img.resize_exact(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mut data = Vec::with_capacity(3 * IMAGE_SIZE * IMAGE_SIZE);
    for c in 0..3 {
        for y in 0..IMAGE_SIZE {
            for x in 0..IMAGE_SIZE {
                let pixel = rgb.get_pixel(x as u32, y as u32);
                let value = pixel[c] as f32 / 255.0;
                data.push((value - MEAN[c]) / STD[c]);
            }
        }
    }
    Ok(data)
}

#[cfg(not(feature = "clip"))]
fn preprocess_image(_path: &Path) -> Result<Vec<f32>> {
    Err(FindItError::Transient("clip feature not enabled".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_loaded_without_model_files() {
        let embedder = ClipEmbedder::new("/nonexistent/findit/clip/dir");
        assert!(!embedder.is_loaded());
    }
}
