
use crate::config::{Config, ReconnectPolicyKind, get_config_path, load_config, read_config};
use crate::errors::RelayError;
use crate::gateway::{self, LivenessState};
use crate::relay::{ReconnectPolicy, RelayController, RelayHandler, ReplyDelay, RunOutcome};
use crate::session::{SessionClient, reset_session_dir};
use crate::webhook::WebhookClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(about = "Relay WhatsApp direct messages to an automation webhook", version)]
pub struct Cli {
    /// Path to the config file (default: ~/.hookrelay/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the session and relay messages until interrupted
    Run {
        /// Delete stored session credentials first, forcing a new QR pairing
        #[arg(long)]
        reset_session: bool,
    },
    /// Delete stored session credentials
    Reset,
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Validate the config and print a summary
    Check,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run { reset_session } => run_relay(config_path, reset_session).await,
        Commands::Reset => reset(config_path),
        Commands::Init { force } => init(config_path, force),
        Commands::Check => check(config_path),
    }
}

async fn run_relay(config_path: Option<&Path>, reset_session: bool) -> Result<()> {
    let config = load_config(config_path)?;
    info!("{} hookrelay v{} starting", crate::LOGO, crate::VERSION);

    let session = build_session(&config)?;
    reset_if_requested(
        session.as_ref(),
        reset_session || config.session.reset_on_start,
    )
    .await?;
    let webhook = Arc::new(WebhookClient::new(&config.webhook)?);
    info!("forwarding direct messages to {}", webhook.url());

    let handler = Arc::new(RelayHandler::new(
        session.clone(),
        webhook,
        ReplyDelay::from(&config.relay),
    ));
    let controller =
        RelayController::new(session, handler, ReconnectPolicy::from(&config.reconnect));

    let liveness = if config.liveness.enabled {
        let state = LivenessState::new(&config.liveness.body, controller.subscribe());
        let (handle, _) =
            gateway::start(&config.liveness.host, config.liveness.port, state).await?;
        Some(handle)
    } else {
        None
    };

    let outcome = controller.run_until(shutdown_signal()).await;

    if matches!(outcome, Ok(RunOutcome::LoggedOut)) && liveness.is_some() {
        // Keep answering health checks; the operator decides when to reset.
        warn!("relay stopped; liveness endpoint stays up until interrupted");
        shutdown_signal().await;
    }
    if let Some(handle) = liveness {
        handle.abort();
    }

    match outcome? {
        RunOutcome::Shutdown => Ok(()),
        RunOutcome::LoggedOut => Err(RelayError::PairingRequired(
            "session logged out; run `hookrelay reset` and pair again".into(),
        )
        .into()),
    }
}

/// Wipe stored credentials through the session backend before connecting.
async fn reset_if_requested(session: &dyn SessionClient, requested: bool) -> Result<bool> {
    if !requested {
        return Ok(false);
    }
    session.reset_credentials().await?;
    info!("{} session reset, a new pairing is required", session.name());
    Ok(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(feature = "channel-whatsapp")]
fn build_session(config: &Config) -> Result<Arc<dyn SessionClient>> {
    Ok(Arc::new(crate::session::whatsapp::WhatsAppSession::new(
        config.session.session_path(),
    )))
}

#[cfg(not(feature = "channel-whatsapp"))]
fn build_session(_config: &Config) -> Result<Arc<dyn SessionClient>> {
    Err(RelayError::Config(
        "no session backend compiled in; rebuild with `--features channel-whatsapp`".into(),
    )
    .into())
}

fn reset(config_path: Option<&Path>) -> Result<()> {
    let config = read_config(config_path)?;
    let session_path = config.session.session_path();
    if reset_session_dir(&session_path)? {
        println!("✓ Removed session at {}", session_path.display());
        println!("Run `hookrelay run` and scan the QR code to pair again.");
    } else {
        println!("No session found at {}", session_path.display());
    }
    Ok(())
}

fn init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };
    if path.exists() && !force {
        println!(
            "⚠️  Config already exists at {} (use --force to overwrite)",
            path.display()
        );
        return Ok(());
    }

    crate::config::save_config(&Config::default(), Some(path.as_path()))?;
    println!("✓ Created config at {}", path.display());
    println!("\nNext steps:");
    println!("  1. Set webhook.url in {}", path.display());
    println!("     (or export HOOKRELAY_WEBHOOK_URL)");
    println!("  2. Run: hookrelay run");
    Ok(())
}

fn check(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    print!("{}", summarize(&config));
    println!("✓ Configuration is valid");
    Ok(())
}

fn summarize(config: &Config) -> String {
    let reconnect = &config.reconnect;
    let policy = match reconnect.policy {
        ReconnectPolicyKind::Fixed => format!("fixed {}s", reconnect.base_delay_secs),
        ReconnectPolicyKind::Exponential => format!(
            "exponential {}s..{}s",
            reconnect.base_delay_secs, reconnect.max_delay_secs
        ),
    };
    let attempts = reconnect
        .max_attempts
        .map_or_else(|| "unlimited".to_string(), |n| n.to_string());
    let headers: Vec<&str> = config.webhook.headers.keys().map(String::as_str).collect();
    let liveness = if config.liveness.enabled {
        format!("{}:{}", config.liveness.host, config.liveness.port)
    } else {
        "disabled".to_string()
    };

    let mut out = String::new();
    out.push_str(&format!("Webhook:      {}\n", config.webhook.url));
    out.push_str(&format!("Timeout:      {}s\n", config.webhook.timeout_secs));
    if !headers.is_empty() {
        out.push_str(&format!("Headers:      {}\n", headers.join(", ")));
    }
    out.push_str(&format!(
        "Reply delay:  {}-{}ms\n",
        config.relay.reply_delay_min_ms, config.relay.reply_delay_max_ms
    ));
    out.push_str(&format!("Reconnect:    {} ({} attempts)\n", policy, attempts));
    out.push_str(&format!(
        "Session:      {}\n",
        config.session.session_path().display()
    ));
    out.push_str(&format!("Liveness:     {}\n", liveness));
    out
}
