/**
 * Cheffin Chat Client Entry Point
 *
 * Headless runner for the chat core: signs in with a bearer token from the
 * environment, keeps conversations in sync and logs what it sees.
 *
 * Usage: chat_client [username [message...]]
 *
 * With a username the conversation is opened; with a message it is sent.
 * Runs until Ctrl-C.
 */

use std::sync::Arc;

use cheffin_chat::client::config::ClientConfig;
use cheffin_chat::client::session::{Credential, Session};
use cheffin_chat::client::ChatClient;
use cheffin_chat::shared::config::ConfigError;

const ENV_TOKEN: &str = "CHEFFIN_TOKEN";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = ClientConfig::load()?;
    tracing::info!("[STARTUP] server {} ({:?} mode)", config.server_url, config.sync_mode);

    let token = std::env::var(ENV_TOKEN)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or(ConfigError::MissingValue(ENV_TOKEN))?;
    let session = Arc::new(Session::with_credential(Credential::new(token)));

    let client = ChatClient::connect(&config, session)?;
    client.start()?;

    let mut args = std::env::args().skip(1);
    if let Some(username) = args.next() {
        client.open_conversation(&username).await?;
        let message = args.collect::<Vec<_>>().join(" ");
        if !message.trim().is_empty() {
            let id = client.send(&message).await?;
            tracing::info!("[SEND] sent {} to {}", id, username);
        }
    }

    let snapshot = client.snapshot().await;
    for conversation in &snapshot.conversations {
        tracing::info!(
            "[SYNC] {} - {}",
            conversation.participant_username,
            conversation.last_message
        );
    }

    let mut connectivity = client.connectivity();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connectivity.borrow();
                tracing::info!("[SYNC] connectivity: {}", state);
            }
        }
    }

    client.shutdown();
    Ok(())
}
