use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vocalive::backends::Backends;
use vocalive::cli::{Cli, Commands, ConfigAction};
use vocalive::config::Config;
use vocalive::server::{AppState, run_server};
use vocalive::session::{SessionConfig, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    match cli.command {
        None => serve(cli.config.as_deref(), None, None).await?,
        Some(Commands::Serve { host, port }) => serve(cli.config.as_deref(), host, port).await?,
        Some(Commands::Config { action }) => handle_config_command(action, cli.config.as_deref())?,
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "vocalive", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the level comes from `-q` / `-v`.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn config_path(custom_path: Option<&Path>) -> PathBuf {
    custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Load configuration from file or use defaults.
///
/// An explicit `--config` path must exist; the default path may be missing.
/// Environment overrides apply on top of either.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

async fn serve(custom_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(custom_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!(
        version = %vocalive::version_string(),
        host = %config.server.host,
        port = config.server.port,
        "Starting vocalive"
    );
    tracing::info!(model = %config.llm.model, host = %config.llm.host, "Generation backend");
    let stt_model = config
        .stt
        .model_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());
    tracing::info!(model = %stt_model, language = %config.stt.language, "Transcription backend");
    tracing::info!(engine = %config.tts.engine, voice = %config.tts.voice_id, "Synthesis backend");
    tracing::info!(enabled = config.memory.enabled, url = %config.memory.url, "Long-term memory");

    let backends = Arc::new(Backends::from_config(&config)?);
    let registry = Arc::new(SessionRegistry::new(
        backends,
        SessionConfig::from_config(&config),
    ));
    let state = AppState {
        registry,
        config: Arc::new(config),
    };
    run_server(state).await?;
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path(custom_path).display());
        }
    }
    Ok(())
}
