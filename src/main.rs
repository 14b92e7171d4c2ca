// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};
use tracing_subscriber::EnvFilter;

use triton::config::{load_config, ConfigError, ServerConfig};
use triton::dispatch::Dispatcher;
use triton::frontend;
use triton::mcp::TritonMcp;
use triton::transport;

/// Default mode serves MCP over streamable HTTP at `http://127.0.0.1:<port>/mcp`.
#[derive(Debug, Parser)]
#[command(name = "triton", version, about = "Interactive AST probe server")]
struct Cli {
    /// Serve newline-delimited JSON probe envelopes on stdin/stdout.
    #[arg(long, conflicts_with_all = ["mcp", "http_port", "tcp_port"])]
    stdio: bool,

    /// Serve MCP over stdin/stdout.
    #[arg(long, conflicts_with_all = ["http_port", "tcp_port"])]
    mcp: bool,

    /// MCP HTTP port (0 = ephemeral); overrides the config file.
    #[arg(long)]
    http_port: Option<u16>,

    /// Also serve JSON-lines probe envelopes on this TCP port.
    #[arg(long)]
    tcp_port: Option<u16>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        Ok(config)
    }
}

/// Logs go to stderr; stdout belongs to the protocol in stdio modes.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    if let Err(err) = run(cli) {
        eprintln!("triton: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = cli.server_config()?;
    let frontend = frontend::builtin(&config.frontend)
        .ok_or_else(|| ConfigError::UnknownFrontend(config.frontend.clone()))?;
    let dispatcher = Arc::new(Dispatcher::new(frontend, config.dispatch_options()));
    tracing::info!(
        frontend = %config.frontend,
        cache = %config.default_cache_strategy,
        recovery = %config.default_recovery,
        "dispatcher ready"
    );

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    if cli.stdio {
        runtime.block_on(transport::serve_stdio(dispatcher))?;
        return Ok(());
    }

    if cli.mcp {
        runtime.block_on(TritonMcp::new(dispatcher).serve_stdio())?;
        return Ok(());
    }

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.http_port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "serving MCP over streamable HTTP at /mcp");

        let http_config =
            StreamableHttpServerConfig { stateful_mode: true, ..StreamableHttpServerConfig::default() };
        let shutdown_token = http_config.cancellation_token.clone();
        let server_shutdown = shutdown_token.clone();

        let session_manager = Arc::new(LocalSessionManager::default());
        let mcp_service = {
            let mcp = TritonMcp::new(Arc::clone(&dispatcher));
            StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, http_config)
        };

        let router = Router::new().nest_service("/mcp", mcp_service);
        let server_handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                server_shutdown.cancelled().await;
            });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "MCP HTTP server failed");
            }
        });

        let lines_handle = match cli.tcp_port {
            Some(port) => {
                let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
                tracing::info!(addr = %listener.local_addr()?, "serving JSON lines over TCP");
                let dispatcher = Arc::clone(&dispatcher);
                Some(tokio::spawn(async move {
                    if let Err(err) = transport::serve_tcp(dispatcher, listener).await {
                        tracing::error!(error = %err, "JSON-lines listener failed");
                    }
                }))
            }
            None => None,
        };

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting down");
        shutdown_token.cancel();
        if let Some(handle) = lines_handle {
            handle.abort();
        }
        let _ = server_handle.await;
        Ok::<(), Box<dyn Error>>(())
    })?;

    Ok(())
}
