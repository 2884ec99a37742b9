use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use realtime_session::diagnostics::format_events;
use realtime_session::transcript::{to_json, to_plain_text};
use realtime_session::transport::loopback::{Loopback, LoopbackDevices, LoopbackSignaling};
use realtime_session::transport::wav::WavDevices;
use realtime_session::transport::{MediaDevices, TransportEvent};
use realtime_session::{
    create_router, AppState, Config, CredentialProvider, CredentialRequest, DisconnectOptions,
    SessionManager, SessionNegotiator, StaticCredentials, TokenClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "realtime-session", version, about = "Realtime conversational session tools")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/realtime-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the token server
    Serve,

    /// Fetch an ephemeral credential from the token endpoint
    Token,

    /// Check an API key through the validation endpoint
    ValidateKey {
        #[arg(long)]
        key: String,
    },

    /// Replay recorded control-channel events through a loopback session
    Replay {
        /// One server event JSON object per line
        events: PathBuf,

        /// Directory of <device>.wav files to use as audio input
        #[arg(long)]
        wav_dir: Option<PathBuf>,

        #[arg(long)]
        device: Option<String>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Text)]
        format: ExportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(&cfg).await,
        Command::Token => token(&cfg).await,
        Command::ValidateKey { key } => validate_key(&cfg, &key).await,
        Command::Replay {
            events,
            wav_dir,
            device,
            format,
        } => replay(&cfg, events, wav_dir, device, format).await,
    }
}

async fn serve(cfg: &Config) -> Result<()> {
    if cfg.realtime.api_key.is_none() {
        info!("No API key configured; token requests must supply one");
    }

    let state = AppState::new(cfg.realtime.clone(), cfg.session.instructions.clone())?;
    let app = create_router(state, &cfg.service.cors);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Token server listening on {}", addr);

    axum::serve(listener, app).await.context("Token server failed")
}

async fn token(cfg: &Config) -> Result<()> {
    let client = TokenClient::new(
        &cfg.realtime.token_url,
        &cfg.realtime.validate_url,
        cfg.realtime.token_timeout(),
    )?;
    let credential = client.fetch(&CredentialRequest::default()).await?;

    match credential
        .expires_at
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
    {
        Some(expiry) => println!("Ephemeral credential issued, expires {}", expiry.to_rfc3339()),
        None => println!("Ephemeral credential issued"),
    }
    Ok(())
}

async fn validate_key(cfg: &Config, key: &str) -> Result<()> {
    let client = TokenClient::new(
        &cfg.realtime.token_url,
        &cfg.realtime.validate_url,
        cfg.realtime.token_timeout(),
    )?;
    let validation = client.validate_key(key).await?;
    println!("{}", serde_json::to_string_pretty(&validation)?);
    Ok(())
}

async fn replay(
    cfg: &Config,
    events: PathBuf,
    wav_dir: Option<PathBuf>,
    device: Option<String>,
    format: ExportFormat,
) -> Result<()> {
    let lines = std::fs::read_to_string(&events)
        .with_context(|| format!("Failed to read {}", events.display()))?;

    let media: Arc<dyn MediaDevices> = match (&wav_dir, &device) {
        (Some(dir), device) => Arc::new(WavDevices::new(
            dir.clone(),
            device.clone().unwrap_or_else(|| "default".to_string()),
        )),
        (None, Some(device)) => Arc::new(LoopbackDevices::new([device.clone()])),
        (None, None) => Arc::new(LoopbackDevices::default()),
    };

    let loopback = Loopback::new();
    let negotiator = SessionNegotiator::new(
        Arc::new(StaticCredentials::new("replay")),
        media,
        Arc::new(loopback.connector()),
        Arc::new(LoopbackSignaling::new()),
    );

    let mut session_config = cfg.session_config();
    session_config.diagnostics_enabled = true;
    let manager = SessionManager::spawn(negotiator, session_config);

    let mut params = cfg.session_parameters();
    if device.is_some() {
        params.device_id = device;
    }
    manager.connect(params).await?;

    let mut diagnostics = manager.subscribe_diagnostics();
    let mut fed = 0;
    for line in lines.lines().filter(|l| !l.trim().is_empty()) {
        loopback.emit(TransportEvent::ChannelMessage(line.to_string()));
        fed += 1;
    }
    // Channel close is delivered after every message above
    loopback.emit(TransportEvent::ChannelClosed);

    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(log) = diagnostics.recv().await {
            if log.last().is_some_and(|e| e.kind == "dc.close") {
                break;
            }
        }
    })
    .await
    .context("Timed out waiting for replayed events")?;
    info!("Replayed {} events", fed);

    let transcript = manager.snapshot_transcript();
    let diagnostics = manager.diagnostics().snapshot();
    manager.disconnect(DisconnectOptions::default()).await?;

    match format {
        ExportFormat::Text => print!("{}", to_plain_text(&transcript)),
        ExportFormat::Json => println!("{}", to_json(&transcript)?),
    }
    eprintln!("{}", format_events(&diagnostics));
    Ok(())
}
