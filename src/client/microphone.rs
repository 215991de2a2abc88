//! Microphone capture through the default input device

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::audio::{samples_to_wav, AudioSource, SAMPLE_RATE};
use super::ClientError;

/// Records from the default input device until finished
///
/// The cpal stream lives on its own thread since it cannot cross threads.
#[derive(Default)]
pub struct Microphone {
    buffer: Arc<Mutex<Vec<f32>>>,
    session: Option<Session>,
}

struct Session {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl Microphone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn input_config(device: &cpal::Device) -> Result<StreamConfig, ClientError> {
        let supported = device
            .supported_input_configs()
            .map_err(|e| ClientError::Permission(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| ClientError::Audio("no mono 16 kHz input config".to_string()))?;
        Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
    }

    fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop.send(());
            if session.thread.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
            tracing::debug!("microphone released");
        }
    }
}

#[async_trait]
impl AudioSource for Microphone {
    async fn acquire(&mut self) -> Result<(), ClientError> {
        if self.session.is_some() {
            return Ok(());
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let buffer = Arc::clone(&self.buffer);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), ClientError>>();

        let thread = std::thread::spawn(move || {
            let started = (|| -> Result<cpal::Stream, ClientError> {
                let device = cpal::default_host()
                    .default_input_device()
                    .ok_or_else(|| ClientError::Permission("no input device available".to_string()))?;
                let config = Self::input_config(&device)?;
                let stream = device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.extend_from_slice(data);
                            }
                        },
                        |err| tracing::error!(error = %err, "audio capture error"),
                        None,
                    )
                    .map_err(|e| ClientError::Permission(e.to_string()))?;
                stream
                    .play()
                    .map_err(|e| ClientError::Audio(e.to_string()))?;
                Ok(stream)
            })();

            match started {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| ClientError::Audio(e.to_string()))?
            .map_err(|_| ClientError::Audio("capture thread exited".to_string()))?;

        match ready {
            Ok(()) => {
                self.session = Some(Session {
                    stop: stop_tx,
                    thread,
                });
                tracing::debug!("microphone acquired");
                Ok(())
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    async fn finish(&mut self) -> Result<Vec<u8>, ClientError> {
        if self.session.is_none() {
            return Err(ClientError::NotCapturing);
        }
        self.stop_session();

        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        if samples.is_empty() {
            return Err(ClientError::Audio("no audio recorded".to_string()));
        }
        samples_to_wav(&samples, SAMPLE_RATE).map_err(|e| ClientError::Audio(e.to_string()))
    }

    fn release(&mut self) {
        self.stop_session();
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop_session();
    }
}
