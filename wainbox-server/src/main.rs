use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use wainbox_core::api::{self, AppState};
use wainbox_core::ingest::{sources_from_dir, IngestionDriver};
use wainbox_core::Error;

mod context;
use context::ServerContext;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run the HTTP/websocket API and the webhook endpoint.
    Serve,
    /// Process every payload file in --payload-dir once, then exit.
    Ingest,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "wainbox")]
#[command(author, version, about = "Wainbox - WhatsApp webhook ingestion and shared inbox API")]
pub struct Args {
    #[arg(long, value_enum, env = "WAINBOX_MODE", default_value = "serve")]
    pub mode: Mode,

    /// Address the API binds to
    #[arg(long, env = "WAINBOX_SERVER_ADDR", default_value = "0.0.0.0:5000")]
    pub server_addr: String,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost:5432/wainbox")]
    pub db_url: String,

    #[arg(long, env = "WAINBOX_DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    #[arg(long, value_enum, env = "WAINBOX_STORE", default_value = "postgres")]
    pub store: StoreKind,

    /// Directory of webhook payload JSON files for `--mode ingest`
    #[arg(long, env = "WAINBOX_PAYLOAD_DIR", default_value = "./payloads")]
    pub payload_dir: PathBuf,

    /// Token expected in Meta's webhook verification handshake
    #[arg(long, env = "WHATSAPP_VERIFY_TOKEN")]
    pub verify_token: Option<String>,

    /// Origin allowed by CORS; any origin when unset
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("wainbox=info".parse().unwrap_or_default())
        .add_directive("wainbox_core=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {}", e);
    }
    let _ = tracing_log::LogTracer::init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("Wainbox starting. mode={:?}, store={:?}", args.mode, args.store);

    let ctx = ServerContext::new(&args).await?;
    let result = match args.mode {
        Mode::Serve => run_server(&args, &ctx).await,
        Mode::Ingest => run_ingest(&args, &ctx).await,
    };
    ctx.shutdown().await;

    if let Err(e) = result {
        error!("Wainbox stopped with error: {}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run_server(args: &Args, ctx: &ServerContext) -> Result<(), Error> {
    let addr: SocketAddr = args.server_addr.parse()?;
    let state = AppState::new(ctx.repo.clone(), ctx.event_bus.clone(), args.verify_token.clone());
    let app = api::router(state, args.frontend_url.as_deref());

    let event_bus = ctx.event_bus.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error waiting for ctrl_c: {}", e);
        }
        info!("Ctrl-C detected; shutting down...");
        event_bus.shutdown();
    };

    api::serve(addr, app, shutdown).await
}

async fn run_ingest(args: &Args, ctx: &ServerContext) -> Result<(), Error> {
    info!("Ingesting payloads from {}", args.payload_dir.display());
    let sources = sources_from_dir(&args.payload_dir).await?;
    if sources.is_empty() {
        info!("No payload files found in {}", args.payload_dir.display());
        return Ok(());
    }

    let driver = IngestionDriver::new(ctx.repo.clone(), ctx.event_bus.clone());
    let report = driver.run(&sources).await?;
    info!(
        "Ingestion report: {} source(s), {} failed, {} skipped",
        report.sources.len(),
        report.failed(),
        report.skipped()
    );
    Ok(())
}
