//! vtsctl-chat: Console chat with a local model server
//!
//! Sends each line to the configured chat completions endpoint and prints
//! the reply. `quit` exits.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use vtsctl_core::{ChatClient, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_err) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    vtsctl_core::logging::init(&config.logging, "vtsctl_chat=info,vtsctl_core=warn", "vtsctl-chat.log")?;
    if let Some(e) = config_err {
        tracing::warn!("Failed to load config: {}, using defaults", e);
    }

    let client = ChatClient::from_config(&config.chat)?;
    tracing::info!("Chat endpoint: {} ({})", config.chat.url, config.chat.model);

    println!("Chat ready. Type 'quit' to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let reply = client.reply(line).await;
        println!("Bot: {}", reply);
    }

    Ok(())
}
