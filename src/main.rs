//! CLI for chathub
//!
//! Subcommands:
//! - `server`: run the WebSocket hub
//! - `client`: a line-based chat client (useful for smoke tests)

use std::process::ExitCode;

use chathub::config::{Settings, load_config};
use chathub::hub::{ChatMessage, Hub};
use chathub::relay::Relay;
use chathub::transport::{InboundFrame, WebSocketServer};
use chathub::utils::logging;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use tungstenite::protocol::Message as WsMessage;

#[derive(Parser)]
#[command(name = "chathub")]
enum Command {
    /// Start the WebSocket hub
    Server,
    /// Connect to a hub; each stdin line is sent as a chat message
    Client {
        /// WebSocket URL of the hub
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
        /// Channel id put on every outgoing message
        #[arg(long, default_value = "general")]
        channel: String,
        /// Sender name put on every outgoing message
        #[arg(long)]
        from: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cmd = Command::parse();

    let result = match cmd {
        Command::Server => {
            let config = load_config();
            logging::init(
                config
                    .as_ref()
                    .map(|c| c.log.level.as_str())
                    .unwrap_or("info"),
            );
            match config {
                Ok(config) => run_server(config).await,
                Err(e) => Err(format!("failed to load configuration: {e}").into()),
            }
        }
        Command::Client { url, channel, from } => {
            logging::init("warn");
            run_client(&url, channel, from).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let (hub, dispatcher) = Hub::new(&config.hub);
    let relay = Relay::new(&config.relay)?;

    match relay.client().endpoint() {
        Some(url) => info!(%url, mode = ?config.relay.mode, "relaying messages to persistence endpoint"),
        None => warn!(
            "no persistence endpoint configured (SERVER_MESSAGE_URL or CHATHUB_RELAY__URL); messages will only be broadcast"
        ),
    }

    let dispatcher = tokio::spawn(dispatcher.run());
    let server = WebSocketServer::bind(&config, hub, relay).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::select! {
        _ = &mut server_task => {
            error!("WebSocket server exited unexpectedly.");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received. Exiting gracefully.");
            let _ = shutdown_tx.send(true);
            let _ = server_task.await;
        }
    }

    let _ = dispatcher.await;
    Ok(())
}

async fn run_client(
    url: &str,
    channel: String,
    from: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let (ws_stream, _response) = connect_async(url).await?;
    let (mut sink, mut stream) = ws_stream.split();

    let printer = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<ChatMessage>(text.as_str()) {
                    Ok(msg) => println!(
                        "[{}] {}@{}: {}",
                        msg.timestamp.format("%H:%M:%S"),
                        msg.message_from,
                        msg.channel_id,
                        msg.message
                    ),
                    Err(_) => println!("{}", text.as_str()),
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("connection error: {e}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame = InboundFrame {
            channel_id: channel.clone(),
            message: line.to_string(),
            message_from: from.clone(),
        };
        sink.send(WsMessage::text(serde_json::to_string(&frame)?))
            .await?;
    }

    sink.close().await?;
    let _ = printer.await;
    Ok(())
}
