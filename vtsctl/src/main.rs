//! vtsctl: Expression controller for VTube Studio
//!
//! - Authenticates as a plugin, reusing the saved token when there is one
//! - Lists the loaded model's expressions
//! - Activates expressions typed at the prompt

mod console;
mod driver;
mod input;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;

use vtsctl_core::{Config, CredentialStore, Session};

use crate::console::Console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before logging, which it configures
    let (config, config_err) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    vtsctl_core::logging::init(&config.logging, "vtsctl=info,vtsctl_core=info", "vtsctl.log")?;
    if let Some(e) = config_err {
        tracing::warn!("Failed to load config: {}, using defaults", e);
    }

    let catalog = config.catalog()?;
    let policy = config.discovery_policy(&catalog)?;

    let mut store = CredentialStore::new(config.token_path()?);
    let token = store.load()?;
    if token.is_none() {
        tracing::info!("No saved token at {}", store.path().display());
    }

    let mut session = Session::new(config.plugin_identity(), catalog, token).with_policy(policy);

    let url = config.connection.url.as_str();
    let (ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to VTube Studio at {}", url))?;
    tracing::info!("Connected to {}", url);

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let mut console = Console::new(std::io::stdout());
    console.menu(session.catalog());
    input::spawn_stdin_reader(cmd_tx);

    let end = driver::run(ws, &mut session, &mut store, cmd_rx, &mut console).await?;
    tracing::info!("Session ended: {:?}", end);

    Ok(())
}
