//! anki-mcp-server binary.
//!
//! Speaks MCP over stdin/stdout and forwards tool calls to a local
//! AnkiConnect endpoint. Run it from an MCP client configuration:
//!
//! ```json
//! { "command": "anki-mcp-server", "args": [] }
//! ```

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anki_mcp_server::{AnkiToolSource, McpServer};
use ankiconnect::AnkiClient;

#[derive(Parser, Debug)]
#[command(name = "anki-mcp-server", version)]
#[command(about = "Expose Anki deck and note management as MCP tools over stdio")]
struct Cli {
    /// AnkiConnect endpoint URL
    #[arg(long, env = "ANKI_CONNECT_URL", default_value = ankiconnect::DEFAULT_URL)]
    url: String,

    /// Request timeout for AnkiConnect calls, in seconds
    #[arg(long, env = "ANKI_CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr; stdout carries the MCP protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let client =
        AnkiClient::new(&cli.url)?.with_timeout(Duration::from_secs(cli.timeout_secs));
    tracing::info!(endpoint = %client.endpoint(), "starting anki-mcp-server");

    McpServer::new(AnkiToolSource::new(client)).run_stdio().await?;

    Ok(())
}
