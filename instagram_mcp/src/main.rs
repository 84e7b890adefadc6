use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use instagram_core::{
    auth::SessionAuthenticator,
    client::HttpInstagramClient,
    config::Config,
    connectors::instagram::InstagramConnector,
    insights,
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    ProviderRegistry,
};

/// Logs go to stderr; stdout carries the JSON-RPC stream.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Instagram insights MCP server");

    let config = Config::from_env()?;

    let authenticator = SessionAuthenticator::new(config.session_file.clone(), config.auth)?;
    let authenticated = authenticator
        .authenticate(HttpInstagramClient::new()?, &config.credentials)
        .await?;
    info!(
        attempts = authenticated.outcome.attempts,
        path = ?authenticated.outcome.path,
        "Authenticated"
    );

    let snapshot = insights::fetch_and_logout(authenticated.client, &config.media).await?;

    let mut registry = ProviderRegistry::new();
    registry.register_provider(Arc::new(
        InstagramConnector::new(Arc::new(snapshot)).with_max_medias(config.max_medias),
    ));
    for provider in registry.list_providers() {
        info!(connector = %provider.name, "{}", provider.description);
    }

    let server = McpServer::new(Arc::new(registry));
    let handler = JsonRpcHandler::new(server);
    let transport = StdioTransport::new(handler);

    info!("MCP Server ready, listening on stdio");

    transport.run().await?;
    info!("Input closed, shutting down");
    Ok(())
}
