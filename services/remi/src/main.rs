mod audio;
mod config;
mod openai_adapter;

use crate::config::{Config, INPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS};
use crate::openai_adapter::OpenAiConnector;
use anyhow::{Context, Result};
use clap::Parser;
use remi_core::auth::AuthClient;
use remi_core::kv::{self, CredentialStore};
use remi_core::memory::MemoryStore;
use remi_core::prompt;
use remi_core::session::{SessionEvent, SessionOrchestrator, SessionSettings};
use remi_core::store::JsonSummaryStore;
use remi_core::summary::{
    ChatCompletionsSummarizer, SummaryOutcome, SummaryService, PRIOR_SUMMARIES_MAX_CHARS,
};
use remi_core::theme::{Theme, ThemeClient};
use remi_native_utils::audio::REALTIME_PCM16_SAMPLE_RATE;
use ringbuf::traits::{Producer, Split};
use rubato::Resampler;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(name = "remi", about = "Realtime reminiscence-therapy voice companion")]
struct Cli {
    /// Participant id used to key session summaries
    #[arg(long)]
    user: String,

    /// Override the configured theme id
    #[arg(long)]
    theme: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    if args.list_devices {
        println!("Input devices:\n{}", remi_native_utils::device::list_inputs()?);
        println!("Output devices:\n{}", remi_native_utils::device::list_outputs()?);
        return Ok(());
    }

    // --- 3. Login ---
    // The verified grant is cached; a stored key skips the round trip.
    let mut credentials = CredentialStore::open(config.data_dir.join("credentials.json"))?;
    let cached = match (
        credentials.get(kv::KEY_AUTHENTICATED),
        credentials.get(kv::KEY_API_KEY),
        credentials.get(kv::KEY_IMG_BASE_URL),
    ) {
        (Some("true"), Some(key), Some(img)) => Some((key.to_string(), img.to_string())),
        _ => None,
    };
    let (api_key, img_base_url) = match cached {
        Some(grant) => grant,
        None => {
            let grant = AuthClient::new(&config.auth_base_url)
                .verify_token(&config.access_token)
                .await
                .context("Login failed: the access token was not accepted")?;
            credentials.set(kv::KEY_AUTHENTICATED, "true")?;
            credentials.set(kv::KEY_API_KEY, &grant.api_key)?;
            credentials.set(kv::KEY_IMG_BASE_URL, &grant.img_base_url)?;
            (grant.api_key, grant.img_base_url)
        }
    };
    tracing::info!("Login verified; topic images served from {}", img_base_url);

    // --- 4. Theme ---
    let theme_id = args.theme.as_deref().unwrap_or(&config.theme_id);
    let theme = match &config.theme_base_url {
        Some(base) => ThemeClient::new(base).fetch(theme_id).await?,
        None => Theme::builtin(theme_id)
            .ok_or_else(|| anyhow::anyhow!("unknown theme id: {}", theme_id))?,
    };
    credentials.set(kv::KEY_THEME, &serde_json::to_string(&theme)?)?;
    tracing::info!("Theme {}: {:?}", theme.id, theme.topics);

    // --- 5. Memory and summaries ---
    let memory = MemoryStore::load(credentials);
    let summaries = SummaryService::new(
        ChatCompletionsSummarizer::new(api_key.clone(), config.summary_model.clone()),
        JsonSummaryStore::new(config.data_dir.join("summaries.json")),
    );
    let prior = summaries
        .prior_summaries_context(&args.user, PRIOR_SUMMARIES_MAX_CHARS)
        .await?;
    match &prior {
        Some(_) => tracing::info!("Loaded prior session context for {}", args.user),
        None => tracing::info!("No prior sessions for {}", args.user),
    }

    // --- 6. Audio wiring ---
    let (mic_tx, mut mic_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(1024);
    let (audio_out_tx, mut audio_out_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(100);

    let armed = Arc::new(AtomicBool::new(false));
    let purge = Arc::new(AtomicBool::new(false));

    // The streams stay alive in this scope; the orchestrator holds only the
    // controllers.
    let mut _input_stream = None;
    let (mic, input_sample_rate) = match audio::build_input_stream(mic_tx, armed.clone()) {
        Ok((stream, rate)) => {
            _input_stream = Some(stream);
            (audio::MicController::ready(armed.clone()), rate)
        }
        Err(e) => {
            tracing::warn!("Microphone unavailable: {}", e);
            (
                audio::MicController::denied(e.to_string()),
                REALTIME_PCM16_SAMPLE_RATE as f32,
            )
        }
    };

    // Sized for one second of queued audio at the highest common device rate.
    let playback_buffer =
        remi_native_utils::audio::shared_buffer(48_000 * OUTPUT_LATENCY_MS / 1000 * 2);
    let (mut playback_tx, playback_rx) = playback_buffer.split();
    let mut _output_stream = None;
    let output_sample_rate = match audio::build_output_stream(playback_rx, purge.clone()) {
        Ok((stream, rate)) => {
            _output_stream = Some(stream);
            rate
        }
        Err(e) => {
            tracing::warn!("Speaker unavailable, assistant audio will be dropped: {}", e);
            REALTIME_PCM16_SAMPLE_RATE as f32
        }
    };

    // Playback feeder: decoded response audio -> resampler -> ring buffer.
    let mut out_resampler = remi_native_utils::audio::create_resampler(
        REALTIME_PCM16_SAMPLE_RATE,
        output_sample_rate as f64,
        100,
    )?;
    tokio::spawn(async move {
        while let Some(samples) = audio_out_rx.recv().await {
            let chunk_size = out_resampler.input_frames_next();
            for chunk in remi_native_utils::audio::split_for_chunks(&samples, chunk_size) {
                if let Ok(resampled) = out_resampler.process(&[chunk.as_slice()], None) {
                    if let Some(resampled) = resampled.first() {
                        for sample in resampled {
                            if playback_tx.try_push(*sample).is_err() {
                                tracing::warn!("playback buffer full, dropping samples");
                                break;
                            }
                        }
                    }
                }
            }
        }
    });

    // --- 7. Orchestrator ---
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<SessionEvent>(256);
    let connector = OpenAiConnector::new(
        api_key,
        config.realtime_model.clone(),
        event_tx,
        audio_out_tx,
    );
    let settings = SessionSettings {
        bot_name: config.bot_name.clone(),
        voice: config.voice.clone(),
        template: config.template,
    };
    let mut orchestrator = SessionOrchestrator::new(
        connector,
        mic,
        audio::PlaybackController::new(purge),
        settings,
        theme,
        memory,
    );
    orchestrator.set_prior_summaries(prior);
    orchestrator
        .connect()
        .await
        .context("Failed to start the conversation")?;
    tracing::info!("Conversation started; press Ctrl-C to end the session");

    // --- 8. Event loop ---
    let mut in_resampler = remi_native_utils::audio::create_resampler(
        input_sample_rate as f64,
        REALTIME_PCM16_SAMPLE_RATE,
        INPUT_CHUNK_SIZE,
    )?;
    let mut pending: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);

    let phase = tokio::time::sleep(std::time::Duration::from_secs(
        config.session_phase_minutes * 60,
    ));
    tokio::pin!(phase);
    let mut phase_rotated = false;

    loop {
        tokio::select! {
            Some(frame) = mic_rx.recv() => {
                pending.extend(frame);
                let mut resampled: Vec<f32> = vec![];
                while pending.len() >= INPUT_CHUNK_SIZE {
                    let chunk: Vec<f32> = pending.drain(..INPUT_CHUNK_SIZE).collect();
                    if let Ok(frames) = in_resampler.process(&[chunk.as_slice()], None) {
                        if let Some(frames) = frames.first() {
                            resampled.extend(frames.iter().cloned());
                        }
                    }
                }
                if !resampled.is_empty() {
                    if let Err(e) = orchestrator.handle_audio_frame(resampled).await {
                        tracing::error!("failed to stream audio frame: {}", e);
                    }
                }
            }
            Some(event) = event_rx.recv() => {
                let closing = matches!(event, SessionEvent::Closed { .. });
                if let Err(e) = orchestrator.apply_event(event).await {
                    tracing::error!("session error: {}", e);
                }
                if closing {
                    tracing::info!("Remote session closed");
                    break;
                }
            }
            _ = &mut phase, if !phase_rotated => {
                phase_rotated = true;
                tracing::info!("Session phase timer elapsed; switching to closing instructions");
                if let Err(e) = orchestrator
                    .update_instructions(prompt::closing_instructions())
                    .await
                {
                    tracing::error!("failed to rotate instructions: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, ending the session...");
                break;
            }
        }
    }

    // --- 9. End of session: summarize and persist ---
    let transcript = orchestrator.end().await;
    tracing::info!("Session ended with {} transcript items", transcript.len());

    let mut attempts = 0;
    loop {
        attempts += 1;
        match summaries.finish_session(&args.user, &transcript).await {
            Ok(SummaryOutcome::NothingToSummarize) => {
                tracing::info!("No conversation to summarize");
                break;
            }
            Ok(SummaryOutcome::Saved(record)) => {
                tracing::info!(
                    "Summary saved as session {} for {}",
                    record.session_number,
                    record.user_id
                );
                println!("\n--- Session {} summary ---\n{}", record.session_number, record.summary);
                break;
            }
            Err(e) if attempts < 2 => {
                tracing::warn!("Summary generation failed, retrying once: {}", e);
            }
            Err(e) => {
                // The raw transcript survives the failure for a later retry.
                let fallback = config
                    .data_dir
                    .join(format!("transcript-{}.json", unix_timestamp()));
                if let Err(io) = std::fs::write(&fallback, serde_json::to_string_pretty(&transcript)?)
                {
                    tracing::error!("could not save transcript fallback: {}", io);
                } else {
                    tracing::error!(
                        "Summary failed ({}); transcript kept at {}",
                        e,
                        fallback.display()
                    );
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    Ok(())
}

/// A filesystem-safe timestamp for the transcript fallback file.
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.to_string()
}
