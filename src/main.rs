//! Reconnecting WebSocket Chat Client - Entry Point
//!
//! Joins a room, prints what arrives and sends each stdin line.
//!
//! Usage: `chat_client_v1 <room> [user_name] [base_url]`
//! Commands: `/typing`, `/stop`, `/quit`

use std::env;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_client_v1::{message_type, ChatClient, ClientConfig, JoinOutcome};

/// Default room when none is given
const DEFAULT_ROOM: &str = "lobby";

/// Positional arguments: `<room> [user_name] [base_url]`
#[derive(Debug, PartialEq)]
struct Args {
    room: String,
    user_name: Option<String>,
    base_url: Option<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Self {
        Self {
            room: args.next().unwrap_or_else(|| DEFAULT_ROOM.to_string()),
            user_name: args.next(),
            base_url: args.next(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_client_v1=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_client_v1=info")),
        )
        .init();

    let Args {
        room,
        user_name,
        base_url,
    } = Args::parse(env::args().skip(1));

    let mut config = ClientConfig::from_env();
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }

    let client = Arc::new(ChatClient::with_websocket(config));

    // Print incoming messages
    let mut messages = client.subscribe_messages();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            match msg.kind.as_str() {
                message_type::USER_TYPING => println!("* {} is typing", msg.user.name),
                message_type::USER_STOPPED_TYPING => {}
                message_type::IMAGE => println!(
                    "[{}] <image {}>",
                    msg.user.name,
                    msg.info("mimeType").unwrap_or("unknown")
                ),
                message_type::SYSTEM => println!("-- {}", msg.message),
                _ => println!("[{}] {}", msg.user.name, msg.message),
            }
        }
    });

    // Report identity and connection changes
    let mut users = client.subscribe_current_user();
    tokio::spawn(async move {
        while let Some(user) = users.next().await {
            if let Some(user) = user {
                info!("You are {}", user);
            }
        }
    });
    let mut states = client.subscribe_connection_state();
    tokio::spawn(async move {
        while let Some(state) = states.next().await {
            info!("Connection: {}", state);
        }
    });

    // Join in the background so stdin stays responsive while retrying
    let joiner = Arc::clone(&client);
    let join_task = tokio::spawn(async move {
        match joiner.join(room.as_str(), user_name.as_deref(), None).await {
            Ok(JoinOutcome::Connected) => info!("Joined {}", room),
            Ok(outcome) => info!("Join ended: {:?}", outcome),
            Err(e) => error!("Cannot join {}: {}", room, e),
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let sent = match line {
            "" => continue,
            "/quit" => break,
            "/typing" => client.send_typing().await,
            "/stop" => client.send_stopped_typing().await,
            text => client.send_message(text, None).await,
        };
        if !sent {
            error!("Not delivered, connection is {}", client.connection_state());
        }
    }

    client.disconnect().await;
    let _ = join_task.await;
    info!("Bye");

    Ok(())
}
