//! Stdio tool server: one JSON request per input line, one JSON reply per
//! output line. Logs go to stderr so stdout carries only protocol lines.

use std::sync::Arc;

use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use company_analyzer::analyzer::Analyzer;
use company_analyzer::config::Config;
use company_analyzer::http::build_client;
use company_analyzer::mcp::ToolServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let analyzer = Analyzer::from_config(&config, build_client()?)?;
    let server = ToolServer::new(Arc::new(analyzer));
    tracing::info!("Tool server ready on stdio");

    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
