//! stt layer (§4.1 layer 2): extract a 16kHz mono track, run speech-to-text,
//! and expose word-level segments so the indexer can intersect them with a
//! clip's `[start_time, end_time)` span to build that clip's transcript
//! slice.
//!
//! Audio decode goes through `symphonia` (already in the workspace for the
//! other media-adjacent crates) and `rubato` resamples to the 16kHz Whisper
//! expects. The acoustic model itself is an ONNX export, loaded the same
//! lazy way as [`crate::embed::clip::ClipEmbedder`] — one `Session` per
//! process, probed for existence rather than loaded eagerly.
//!
//! Limitation worth being explicit about: the exported graph this module
//! targets emits a flat token sequence per decode window, not
//! cross-attention alignment, so per-word timestamps are approximated by
//! spreading the decoded words evenly across the window's duration rather
//! than read off the model. Good enough for clip-level transcript slicing,
//! not for subtitle-accurate word timing.

use crate::error::{FindItError, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "audio-transcription")]
use rubato::{FftFixedIn, Resampler};
#[cfg(feature = "audio-transcription")]
use rustfft::{num_complex::Complex, FftPlanner};
#[cfg(feature = "audio-transcription")]
use std::f32::consts::PI;
#[cfg(feature = "audio-transcription")]
use symphonia::core::audio::SampleBuffer;
#[cfg(feature = "audio-transcription")]
use symphonia::core::codecs::DecoderOptions;
#[cfg(feature = "audio-transcription")]
use symphonia::core::formats::FormatOptions;
#[cfg(feature = "audio-transcription")]
use symphonia::core::io::MediaSourceStream;
#[cfg(feature = "audio-transcription")]
use symphonia::core::meta::MetadataOptions;
#[cfg(feature = "audio-transcription")]
use symphonia::core::probe::Hint;

#[cfg(feature = "onnx")]
use ort::session::Session;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

const WHISPER_SAMPLE_RATE: u32 = 16_000;
/// Whisper's native decode window.
const WINDOW_SECS: f64 = 30.0;

/// One transcribed word (or short run of words, when the decoder emits them
/// together) with an approximate time range.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

pub struct Transcriber {
    #[cfg(feature = "onnx")]
    session: Option<Session>,
    #[cfg(feature = "onnx")]
    tokenizer: Option<Tokenizer>,
    #[cfg(feature = "audio-transcription")]
    mel_filters: Option<Vec<f32>>,
    model_dir: PathBuf,
}

impl Transcriber {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            #[cfg(feature = "onnx")]
            session: None,
            #[cfg(feature = "onnx")]
            tokenizer: None,
            #[cfg(feature = "audio-transcription")]
            mel_filters: None,
            model_dir: model_dir.into(),
        }
    }

    pub fn default_model_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("findit")
            .join("models")
            .join("whisper")
    }

    fn model_path(&self) -> PathBuf {
        self.model_dir.join("whisper.onnx")
    }

    fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }

    fn mel_filters_path(&self) -> PathBuf {
        self.model_dir.join("mel_filters.npz")
    }

    pub fn is_loaded(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists() && self.mel_filters_path().exists()
    }

    #[cfg(feature = "onnx")]
    fn ensure_session(&mut self) -> Result<&mut Session> {
        if self.session.is_none() {
            let path = self.model_path();
            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(4))
                .and_then(|b| b.commit_from_file(&path))
                .map_err(|e| {
                    FindItError::FatalGlobal(anyhow::anyhow!(
                        "failed to load whisper model from {}: {e}",
                        path.display()
                    ))
                })?;
            self.session = Some(session);
        }
        Ok(self.session.as_mut().unwrap())
    }

    #[cfg(feature = "onnx")]
    fn ensure_tokenizer(&mut self) -> Result<()> {
        if self.tokenizer.is_none() {
            self.tokenizer = Some(crate::embed::load_tokenizer(&self.tokenizer_path())?);
        }
        Ok(())
    }

    #[cfg(feature = "audio-transcription")]
    fn ensure_mel_filters(&mut self) -> Result<()> {
        if self.mel_filters.is_none() {
            self.mel_filters = Some(load_mel_filters(&self.mel_filters_path(), N_MELS)?);
        }
        Ok(())
    }

    /// Decode a window's token ids back to text with the real Whisper
    /// vocab (loaded once, lazily, via [`Self::ensure_tokenizer`]).
    #[cfg(all(feature = "onnx", feature = "audio-transcription"))]
    fn decode_tokens(&self, ids: &[i64]) -> Result<String> {
        let tokenizer = self.tokenizer.as_ref().expect("ensure_tokenizer called first");
        let ids: Vec<u32> = ids.iter().map(|&x| x as u32).collect();
        tokenizer
            .decode(&ids, true)
            .map_err(|e| FindItError::Transient(format!("whisper token decode failed: {e}")))
    }

    /// Transcribe one 30s window of 16kHz mono samples into a run of words
    /// spread evenly across `window_start..window_start + duration`.
    #[cfg(all(feature = "onnx", feature = "audio-transcription"))]
    fn transcribe_window(&mut self, samples: &[f32], window_start: f64) -> Result<Vec<TranscriptSegment>> {
        use ort::value::Value;

        self.ensure_mel_filters()?;
        let mel = log_mel_spectrogram(samples, self.mel_filters.as_ref().unwrap(), N_MELS);
        let n_frames = mel.len() / N_MELS;
        let array = ndarray::Array3::from_shape_vec((1, N_MELS, n_frames), mel)
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let value = Value::from_array(array).map_err(|e| FindItError::FatalGlobal(e.into()))?;

        let session = self.ensure_session()?;
        let outputs = session
            .run(ort::inputs![value])
            .map_err(|e| FindItError::Transient(format!("whisper inference failed: {e}")))?;
        let (_, token_ids) = outputs[0]
            .try_extract_tensor::<i64>()
            .map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let token_ids = token_ids.as_slice().unwrap_or(&[]).to_vec();

        self.ensure_tokenizer()?;
        let text = self.decode_tokens(&token_ids)?;
        Ok(spread_words(&text, window_start, samples.len() as f64 / WHISPER_SAMPLE_RATE as f64))
    }
}

const N_MELS: usize = 80;
/// Whisper's STFT window (25ms @ 16kHz) and hop (10ms @ 16kHz).
const N_FFT: usize = 400;
const HOP_LENGTH: usize = 160;

/// Load the mel filterbank matrix (`[N_MELS, N_FFT/2+1]`, row-major) from
/// the model's bundled `mel_filters.npz`, the same archive layout and
/// `.npy` header skip OpenAI's reference Whisper release ships.
#[cfg(feature = "audio-transcription")]
fn load_mel_filters(path: &Path, num_mel_bins: usize) -> Result<Vec<f32>> {
    let file = std::fs::File::open(path)
        .map_err(|e| FindItError::FatalGlobal(anyhow::anyhow!("opening {}: {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| FindItError::FatalGlobal(anyhow::anyhow!("reading mel filter archive: {e}")))?;

    let mel_key = if num_mel_bins == 128 { "mel_128.npy" } else { "mel_80.npy" };
    let mut npy_file = archive
        .by_name(mel_key)
        .map_err(|e| FindItError::FatalGlobal(anyhow::anyhow!("{mel_key} missing from mel filter archive: {e}")))?;

    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut npy_file, &mut data)
        .map_err(|e| FindItError::FatalGlobal(anyhow::anyhow!("reading {mel_key}: {e}")))?;

    // .npy: 6-byte magic + 2-byte version + 2-byte little-endian header
    // length, then the header string, then raw little-endian f32 data.
    let header_len = data[8] as usize + data[9] as usize * 256;
    let offset = 10 + header_len;
    let floats: Vec<f32> = data[offset..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(floats)
}

/// Hann-windowed STFT magnitude-squared spectrum, one frame per `HOP_LENGTH`
/// samples, `N_FFT/2+1` positive-frequency bins per frame.
#[cfg(feature = "audio-transcription")]
fn stft_power(samples: &[f32]) -> Vec<Vec<f32>> {
    let window: Vec<f32> = (0..N_FFT)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (N_FFT as f32 - 1.0)).cos())
        .collect();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);

    if samples.len() < N_FFT {
        return Vec::new();
    }
    let n_frames = (samples.len() - N_FFT) / HOP_LENGTH + 1;
    let mut frames = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let start = i * HOP_LENGTH;
        let mut buf: Vec<Complex<f32>> = (0..N_FFT)
            .map(|k| Complex {
                re: samples[start + k] * window[k],
                im: 0.0,
            })
            .collect();
        fft.process(&mut buf);
        frames.push(buf[..N_FFT / 2 + 1].iter().map(Complex::norm_sqr).collect());
    }
    frames
}

/// Whisper's `log_mel_spectrogram`: STFT power spectrum projected through
/// the mel filterbank, log10'd, floor-clamped to 8 dB below the window's
/// peak, then rescaled to roughly `[-1, 1]`. Output is laid out
/// `[mel_bin][frame]`, flattened row-major, matching the `(1, N_MELS,
/// n_frames)` tensor shape [`Transcriber::transcribe_window`] builds.
#[cfg(feature = "audio-transcription")]
fn log_mel_spectrogram(samples: &[f32], mel_filters: &[f32], num_mel_bins: usize) -> Vec<f32> {
    let frames = stft_power(samples);
    let n_frames = frames.len().max(1);
    let n_freq = N_FFT / 2 + 1;

    let mut mel = vec![0.0f32; num_mel_bins * n_frames];
    for (t, power) in frames.iter().enumerate() {
        for m in 0..num_mel_bins {
            let filter_row = &mel_filters[m * n_freq..(m + 1) * n_freq];
            mel[m * n_frames + t] = filter_row.iter().zip(power).map(|(f, p)| f * p).sum();
        }
    }

    for v in mel.iter_mut() {
        *v = v.max(1e-10).log10();
    }
    let max_val = mel.iter().copied().fold(f32::MIN, f32::max);
    for v in mel.iter_mut() {
        *v = v.max(max_val - 8.0);
        *v = (*v + 4.0) / 4.0;
    }
    mel
}

/// Spread a decoded window's words evenly across its duration.
#[cfg(feature = "audio-transcription")]
fn spread_words(text: &str, window_start: f64, window_duration: f64) -> Vec<TranscriptSegment> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let per_word = window_duration / words.len() as f64;
    words
        .into_iter()
        .enumerate()
        .map(|(i, w)| TranscriptSegment {
            start: window_start + i as f64 * per_word,
            end: window_start + (i + 1) as f64 * per_word,
            text: w.to_string(),
        })
        .collect()
}

/// Decode `path` to mono 16kHz f32 samples via symphonia + rubato.
#[cfg(feature = "audio-transcription")]
fn decode_to_16k_mono(path: &Path) -> Result<Vec<f32>> {
    let file = std::fs::File::open(path).map_err(|e| FindItError::FatalPerFile(format!("opening audio: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| FindItError::FatalPerFile(format!("probing audio: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| FindItError::FatalPerFile("no decodable audio track".into()))?;
    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.unwrap_or(WHISPER_SAMPLE_RATE);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FindItError::FatalPerFile(format!("no decoder for audio track: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(_)) => break,
            Err(e) => return Err(FindItError::FatalPerFile(format!("demuxing audio: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(FindItError::FatalPerFile(format!("decoding audio: {e}"))),
        };
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        let channels = spec.channels.count().max(1);
        for frame in buf.samples().chunks_exact(channels) {
            let avg = frame.iter().sum::<f32>() / channels as f32;
            mono.push(avg);
        }
    }

    if source_rate == WHISPER_SAMPLE_RATE {
        return Ok(mono);
    }

    let mut resampler = FftFixedIn::<f32>::new(source_rate as usize, WHISPER_SAMPLE_RATE as usize, mono.len().max(1), 2, 1)
        .map_err(|e| FindItError::FatalPerFile(format!("building resampler: {e}")))?;
    let resampled = resampler
        .process(&[mono], None)
        .map_err(|e| FindItError::FatalPerFile(format!("resampling audio: {e}")))?;
    Ok(resampled.into_iter().next().unwrap_or_default())
}

/// Transcribe the audio at `path` into word-level segments. Returns an
/// empty vec (not an error) when no ONNX model is installed — the
/// clipVector-missing precedent (§4.1 failure semantics) for a missing
/// local model is to degrade gracefully rather than fail the file.
#[cfg(all(feature = "onnx", feature = "audio-transcription"))]
pub fn transcribe(path: &Path) -> Result<Vec<TranscriptSegment>> {
    let mut transcriber = Transcriber::new(Transcriber::default_model_dir());
    if !transcriber.is_loaded() {
        return Ok(Vec::new());
    }
    let samples = decode_to_16k_mono(path)?;
    let window_len = (WINDOW_SECS * WHISPER_SAMPLE_RATE as f64) as usize;
    let mut segments = Vec::new();
    let mut offset = 0usize;
    let mut window_start = 0.0;
    while offset < samples.len() {
        let end = (offset + window_len).min(samples.len());
        segments.extend(transcriber.transcribe_window(&samples[offset..end], window_start)?);
        window_start += (end - offset) as f64 / WHISPER_SAMPLE_RATE as f64;
        offset = end;
    }
    Ok(segments)
}

#[cfg(not(all(feature = "onnx", feature = "audio-transcription")))]
pub fn transcribe(_path: &Path) -> Result<Vec<TranscriptSegment>> {
    Ok(Vec::new())
}

/// Join the text of every segment overlapping `[start, end)`, in time
/// order — the per-clip transcript slice §4.1 layer 2 describes.
pub fn slice_for_clip(segments: &[TranscriptSegment], start: f64, end: f64) -> String {
    segments
        .iter()
        .filter(|s| s.start < end && s.end > start)
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
