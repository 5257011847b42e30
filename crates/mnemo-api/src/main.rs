//! mnemo CLI and REST API entry point.
//!
//! Binary name: `mnemo`
//!
//! Parses CLI arguments, initializes storage and services, then dispatches
//! to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use mnemo_observe::{LogFormat, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    if let Err(e) = init_tracing(cli.log_filter(), format, cli.otel) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "mnemo", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;
    let (json, quiet) = (cli.json, cli.quiet);

    match cli.command {
        Commands::Chat { thread } => {
            cli::chat::chat(&state, &thread, cli.verbose > 0, quiet).await?;
        }

        Commands::Say { thread, message } => {
            cli::chat::say(&state, &thread, &message.join(" "), json, quiet).await?;
        }

        Commands::Record {
            thread,
            content,
            role,
        } => {
            cli::turns::record(&state, &thread, role, &content, json, quiet).await?;
        }

        Commands::History { thread, all, limit } => {
            cli::turns::history(&state, &thread, all, limit, json).await?;
        }

        Commands::Search { thread, query, k } => {
            cli::memory::search(&state, &thread, &query, k, json).await?;
        }

        Commands::Profile { thread } => {
            cli::memory::profile(&state, &thread, json).await?;
        }

        Commands::Summary { thread } => {
            cli::memory::summary(&state, &thread, json).await?;
        }

        Commands::Threads => {
            cli::jobs::threads(&state, json).await?;
        }

        Commands::Maintain { thread } => {
            cli::jobs::maintain(&state, &thread, json).await?;
        }

        Commands::Jobs => {
            cli::jobs::jobs(&state, json).await?;
        }

        Commands::Status { check_llm } => {
            cli::status::status(&state, check_llm, json).await?;
        }

        Commands::Serve { port, host } => {
            serve(state, &host, port, quiet).await?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn serve(state: AppState, host: &str, port: u16, quiet: bool) -> anyhow::Result<()> {
    let recovered = state.recover_jobs().await?;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if !quiet {
        println!(
            "  {} mnemo API listening on {}",
            console::style("*").cyan().bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        if recovered > 0 {
            println!(
                "  {}",
                console::style(format!("Resumed {recovered} pending maintenance job(s)")).dim()
            );
        }
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }
    tracing::info!(%addr, "server started");

    let router = http::router::build_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Unstarted jobs stay persisted and are recovered on the next start.
    state.queue().shutdown();
    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
