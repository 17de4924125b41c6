use crate::types;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use remi_realtime_types::audio::Base64EncodedAudioBytes;
use remi_realtime_types::session::Session;
use tokio_tungstenite::tungstenite::Message;

mod config;
mod consts;
mod utils;

pub use config::Config;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

/// The surface of the realtime client the rest of the application depends on.
/// Adapters take `impl RealtimeApi` so tests can substitute a mock.
#[async_trait]
pub trait RealtimeApi: Send {
    async fn update_session(&mut self, config: Session) -> Result<()>;
    async fn append_input_audio_buffer(&mut self, audio: Base64EncodedAudioBytes) -> Result<()>;
    async fn commit_input_audio_buffer(&mut self) -> Result<()>;
    async fn clear_input_audio_buffer(&mut self) -> Result<()>;
    async fn create_conversation_item(&mut self, item: types::Item) -> Result<()>;
    async fn create_response(&mut self) -> Result<()>;
    async fn cancel_response(&mut self) -> Result<()>;
    async fn server_events(&mut self) -> Result<ServerRx>;
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket client for the realtime voice endpoint. Outbound events funnel
/// through an mpsc writer task; inbound events fan out on a broadcast channel.
pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
}

impl Client {
    fn new(capacity: usize, config: Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<types::ClientEvent>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx.clone());
        self.s_tx = Some(s_tx.clone());

        // Writer task: serialize client events onto the socket. Dropping the
        // last sender ends the loop and closes the write half.
        tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("failed to send close frame: {}", e);
            }
        });

        // Reader task: deserialize server events and broadcast them. A close
        // frame (or read error) ends the stream with a synthetic Close event.
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = s_tx.send(types::ServerEvent::Close {
                            reason: Some(e.to_string()),
                        });
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<types::ServerEvent>(&text) {
                        Ok(event) => {
                            if let Err(e) = s_tx.send(event) {
                                tracing::error!("failed to broadcast event: {}", e);
                            }
                        }
                        Err(e) => {
                            // Unmodeled event types land here; they are not
                            // part of the flows this client drives.
                            let event_type = serde_json::from_str::<serde_json::Value>(&text)
                                .ok()
                                .and_then(|v| {
                                    v.get("type").and_then(|t| t.as_str()).map(String::from)
                                });
                            match event_type {
                                Some(t) => tracing::debug!("ignoring server event: {}", t),
                                None => tracing::error!("failed to deserialize event: {}", e),
                            }
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let close_event = types::ServerEvent::Close {
                            reason: reason.map(|v| format!("{:?}", v)),
                        };
                        if let Err(e) = s_tx.send(close_event) {
                            tracing::error!("failed to send close event: {}", e);
                        }
                        break;
                    }
                    _ => {}
                }
            }
            drop(c_tx);
            drop(s_tx);
        });
        Ok(())
    }

    async fn send_client_event(&mut self, event: types::ClientEvent) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(event).await?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }
}

#[async_trait]
impl RealtimeApi for Client {
    async fn update_session(&mut self, config: Session) -> Result<()> {
        let event =
            types::ClientEvent::SessionUpdate(types::events::client::SessionUpdateEvent::new(
                config,
            ));
        self.send_client_event(event).await
    }

    async fn append_input_audio_buffer(&mut self, audio: Base64EncodedAudioBytes) -> Result<()> {
        let event = types::ClientEvent::InputAudioBufferAppend(
            types::events::client::InputAudioBufferAppendEvent::new(audio),
        );
        self.send_client_event(event).await
    }

    async fn commit_input_audio_buffer(&mut self) -> Result<()> {
        let event = types::ClientEvent::InputAudioBufferCommit(
            types::events::client::InputAudioBufferCommitEvent::default(),
        );
        self.send_client_event(event).await
    }

    async fn clear_input_audio_buffer(&mut self) -> Result<()> {
        let event = types::ClientEvent::InputAudioBufferClear(
            types::events::client::InputAudioBufferClearEvent::default(),
        );
        self.send_client_event(event).await
    }

    async fn create_conversation_item(&mut self, item: types::Item) -> Result<()> {
        let event = types::ClientEvent::ConversationItemCreate(
            types::events::client::ConversationItemCreateEvent::new(item),
        );
        self.send_client_event(event).await
    }

    async fn create_response(&mut self) -> Result<()> {
        let event =
            types::ClientEvent::ResponseCreate(types::events::client::ResponseCreateEvent::new());
        self.send_client_event(event).await
    }

    async fn cancel_response(&mut self) -> Result<()> {
        let event =
            types::ClientEvent::ResponseCancel(types::events::client::ResponseCancelEvent::new());
        self.send_client_event(event).await
    }

    async fn server_events(&mut self) -> Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    /// Tear the connection down. Dropping the client-side sender stops the
    /// writer task, which sends the close frame. Safe to call repeatedly.
    async fn close(&mut self) -> Result<()> {
        self.c_tx.take();
        self.s_tx.take();
        Ok(())
    }
}

/// Connect with an explicit config and channel capacity.
pub async fn connect_with_config(capacity: usize, config: Config) -> Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

/// Connect with defaults taken from the environment.
pub async fn connect() -> Result<Client> {
    let config = Config::new();
    connect_with_config(1024, config).await
}
