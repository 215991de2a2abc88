//! Audio capture and speech synthesis seams

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;

use super::ClientError;
use crate::{Error, Result};

/// Sample rate used for captured speech
pub const SAMPLE_RATE: u32 = 16000;

/// Language requested from the synthesizer
pub const SPEECH_LANG: &str = "de-DE";

/// Source of one recorded utterance
///
/// The source holds the microphone between `acquire` and `finish`/`release`.
#[async_trait]
pub trait AudioSource: Send {
    /// Start recording
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Permission` if microphone access is denied
    async fn acquire(&mut self) -> std::result::Result<(), ClientError>;

    /// Stop recording, release the device and return the encoded recording
    ///
    /// # Errors
    ///
    /// Returns error if nothing was recorded or encoding fails
    async fn finish(&mut self) -> std::result::Result<Vec<u8>, ClientError>;

    /// Stop recording and discard anything buffered
    fn release(&mut self);
}

/// Text to be spoken
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: &'static str,
    pub rate: f32,
    pub pitch: f32,
}

impl Utterance {
    #[must_use]
    pub fn new(text: impl Into<String>, rate: f32, pitch: f32) -> Self {
        Self {
            text: text.into(),
            lang: SPEECH_LANG,
            rate,
            pitch,
        }
    }
}

/// Speech synthesis engine
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether the engine can speak at all
    fn is_available(&self) -> bool;

    /// Speak and wait until done
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn speak(&self, utterance: &Utterance) -> std::result::Result<(), ClientError>;
}

/// Synthesizer for hosts without speech output
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeech;

#[async_trait]
impl SpeechSynthesizer for NoSpeech {
    fn is_available(&self) -> bool {
        false
    }

    async fn speak(&self, _utterance: &Utterance) -> std::result::Result<(), ClientError> {
        Err(ClientError::Audio("speech synthesis not available".to_string()))
    }
}

/// Audio source for text-only sessions; capture always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudio;

#[async_trait]
impl AudioSource for NoAudio {
    async fn acquire(&mut self) -> std::result::Result<(), ClientError> {
        Err(ClientError::Audio("no audio input configured".to_string()))
    }

    async fn finish(&mut self) -> std::result::Result<Vec<u8>, ClientError> {
        Err(ClientError::NotCapturing)
    }

    fn release(&mut self) {}
}

/// Audio source reading a prerecorded file
#[derive(Debug, Clone)]
pub struct FileAudioSource {
    path: PathBuf,
    acquired: bool,
}

impl FileAudioSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            acquired: false,
        }
    }
}

#[async_trait]
impl AudioSource for FileAudioSource {
    async fn acquire(&mut self) -> std::result::Result<(), ClientError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(ClientError::Audio(format!(
                "recording not found: {}",
                self.path.display()
            )));
        }
        self.acquired = true;
        Ok(())
    }

    async fn finish(&mut self) -> std::result::Result<Vec<u8>, ClientError> {
        if !self.acquired {
            return Err(ClientError::NotCapturing);
        }
        self.acquired = false;
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ClientError::Audio(format!("failed to read {}: {e}", self.path.display())))?;
        if bytes.is_empty() {
            return Err(ClientError::Audio("recording is empty".to_string()));
        }
        Ok(bytes)
    }

    fn release(&mut self) {
        self.acquired = false;
    }
}

/// Encode a recording as the opaque payload sent to the backend
#[must_use]
pub fn encode_payload(audio: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(audio)
}

/// Encode mono f32 samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| Error::Audio(e.to_string()))?;
    }
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_round_trips_pcm_samples() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.len(), 4);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, i16::MAX]);
    }

    #[test]
    fn payload_is_standard_base64() {
        assert_eq!(encode_payload(b"RIFF"), "UklGRg==");
    }

    #[tokio::test]
    async fn file_source_reads_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turn.wav");
        std::fs::write(&path, samples_to_wav(&[0.1; 16], SAMPLE_RATE).unwrap()).unwrap();

        let mut source = FileAudioSource::new(&path);
        assert_eq!(source.finish().await, Err(ClientError::NotCapturing));
        source.acquire().await.unwrap();
        let audio = source.finish().await.unwrap();
        assert_eq!(&audio[..4], b"RIFF");
    }

    #[tokio::test]
    async fn missing_file_fails_to_acquire() {
        let mut source = FileAudioSource::new("/nonexistent/turn.wav");
        assert!(matches!(source.acquire().await, Err(ClientError::Audio(_))));
    }

    #[tokio::test]
    async fn no_speech_is_unavailable() {
        assert!(!NoSpeech.is_available());
        assert!(NoSpeech.speak(&Utterance::new("Hallo", 1.0, 1.0)).await.is_err());
    }

    #[tokio::test]
    async fn no_audio_never_captures() {
        let mut source = NoAudio;
        assert!(matches!(source.acquire().await, Err(ClientError::Audio(_))));
        assert_eq!(source.finish().await, Err(ClientError::NotCapturing));
    }
}
