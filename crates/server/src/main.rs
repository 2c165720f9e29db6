use anyhow::Context;
use clap::{Parser, Subcommand};
use fe_audit_log::verify_log;
use fe_server::config::LogFormat;
use fe_server::{bootstrap, build_router, Settings};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "fe-gateway",
    version,
    about = "Electronic invoicing gateway bridge (Numrot / DIAN)",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,

    #[command(flatten)]
    serve: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve(Settings),

    /// Verify a hash-chained provider audit JSONL and print the final hash.
    VerifyAudit {
        #[arg(long)]
        audit_log: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    load_dotenv();
    if let Err(e) = run().await {
        eprintln!("ERROR: {e:#}");
        std::process::exit(1);
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("loaded env from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("ignoring .env: {e}"),
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Some(Command::VerifyAudit { audit_log }) => {
            let last = verify_log(&audit_log)
                .with_context(|| format!("verify {}", audit_log.display()))?;
            println!("{last}");
            Ok(())
        }
        Some(Command::Serve(settings)) => serve(settings).await,
        None => serve(cli.serve).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fe_server=info,info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    init_tracing(settings.log_format);

    let state = bootstrap(&settings).await?;
    let app = build_router(state, settings.request_timeout());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "fe-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("fe-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
