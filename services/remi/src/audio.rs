//! Audio device wiring and the orchestrator-facing control handles.
//!
//! cpal streams are not `Send`, so they live in `main` for the process
//! lifetime. The orchestrator only holds these thin controllers, which gate
//! the callbacks through shared atomics.

use crate::config::{INPUT_CHUNK_SIZE, OUTPUT_CHUNK_SIZE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, Stream, StreamConfig};
use remi_core::error::PermissionError;
use remi_core::session::{AudioCapture, AudioPlayback};
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Microphone control handle. `record`/`pause` arm and disarm the input
/// callback; an input device that failed to initialize surfaces as a
/// permission error on `begin`.
pub struct MicController {
    armed: Arc<AtomicBool>,
    denied: Option<String>,
}

impl MicController {
    pub fn ready(armed: Arc<AtomicBool>) -> Self {
        Self {
            armed,
            denied: None,
        }
    }

    pub fn denied(reason: String) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(false)),
            denied: Some(reason),
        }
    }
}

#[async_trait]
impl AudioCapture for MicController {
    async fn begin(&mut self) -> Result<(), PermissionError> {
        match &self.denied {
            Some(reason) => Err(PermissionError::MicrophoneDenied(reason.clone())),
            None => Ok(()),
        }
    }

    async fn record(&mut self) -> Result<()> {
        self.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.armed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        self.armed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Speaker control handle. Interrupt raises the purge flag; the output
/// callback drains whatever is queued and plays silence instead.
pub struct PlaybackController {
    purge: Arc<AtomicBool>,
}

impl PlaybackController {
    pub fn new(purge: Arc<AtomicBool>) -> Self {
        Self { purge }
    }
}

#[async_trait]
impl AudioPlayback for PlaybackController {
    async fn interrupt(&mut self) -> Result<()> {
        self.purge.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds the microphone input stream: downmixes to mono f32 and forwards
/// chunks to `mic_tx` whenever the controller has capture armed. Returns the
/// running stream and its sample rate.
pub fn build_input_stream(
    mic_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    armed: Arc<AtomicBool>,
) -> Result<(Stream, f32)> {
    let input = remi_native_utils::device::get_or_default_input(None)
        .context("Failed to get default audio input device")?;
    tracing::info!("Using input device: {:?}", input.name()?);

    let default_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let channel_count = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0 as f32;
    tracing::info!("Input stream config: {:?}", &stream_config);

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if !armed.load(Ordering::SeqCst) {
            return;
        }
        let mono = if channel_count > 1 {
            data.chunks(channel_count)
                .map(|c| c.iter().sum::<f32>() / channel_count as f32)
                .collect::<Vec<f32>>()
        } else {
            data.to_vec()
        };
        if let Err(e) = mic_tx.try_send(mono) {
            tracing::warn!("Failed to send audio data to buffer: {:?}", e);
        }
    };

    let stream = input.build_input_stream(
        &stream_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((stream, sample_rate))
}

/// Builds the speaker output stream fed from the playback ring buffer.
/// Returns the running stream and its sample rate.
pub fn build_output_stream(
    mut audio_out_rx: HeapCons<f32>,
    purge: Arc<AtomicBool>,
) -> Result<(Stream, f32)> {
    let output = remi_native_utils::device::get_or_default_output(None)
        .context("Failed to get default audio output device")?;
    tracing::info!("Using output device: {:?}", output.name()?);

    let default_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let channel_count = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0 as f32;
    tracing::info!("Output stream config: {:?}", &stream_config);

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        // Barge-in: dump everything queued and fall through to silence.
        if purge.swap(false, Ordering::SeqCst) {
            while audio_out_rx.try_pop().is_some() {}
        }
        let mut sample_index = 0;
        while sample_index < data.len() {
            let sample = audio_out_rx.try_pop().unwrap_or(0.0);
            // Left channel (ch 0).
            if sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // Right channel (ch 1), if it exists.
            if channel_count > 1 && sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // Remaining channels stay untouched.
            sample_index += channel_count.saturating_sub(2);
        }
    };

    let stream = output.build_output_stream(
        &stream_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((stream, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denied_mic_fails_begin_with_permission_error() {
        let mut mic = MicController::denied("no input device".to_string());
        let err = mic.begin().await.unwrap_err();
        assert!(matches!(err, PermissionError::MicrophoneDenied(_)));
    }

    #[tokio::test]
    async fn record_and_pause_toggle_the_shared_flag() {
        let armed = Arc::new(AtomicBool::new(false));
        let mut mic = MicController::ready(armed.clone());

        mic.begin().await.unwrap();
        mic.record().await.unwrap();
        assert!(armed.load(Ordering::SeqCst));

        mic.pause().await.unwrap();
        assert!(!armed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interrupt_raises_the_purge_flag() {
        let purge = Arc::new(AtomicBool::new(false));
        let mut playback = PlaybackController::new(purge.clone());

        playback.interrupt().await.unwrap();
        assert!(purge.load(Ordering::SeqCst));
    }
}
