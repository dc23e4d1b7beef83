//! voice-agent entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build provider, executor, orchestrator, log and voice clients
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run comms channels until they exit or shutdown is signalled

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use voice_agent::comms::{self, CommsState};
use voice_agent::config::{self, Config};
use voice_agent::conversation::Conversation;
use voice_agent::error::AppError;
use voice_agent::llm::{ResilientExecutor, providers};
use voice_agent::logger::{self, LevelSource};
use voice_agent::orchestrator::TurnOrchestrator;
use voice_agent::store::ConversationLog;
use voice_agent::voice::{SttClient, TtsClient};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let mut config = config::load(args.config_path.as_deref())?;
    if args.no_console {
        config.comms.pty.enabled = false;
    }

    let (effective_log_level, source) = match args.log_level {
        Some(level) => (level, LevelSource::Cli),
        None => (config.log_level.as_str(), LevelSource::Config),
    };
    logger::init(effective_log_level, source)?;

    info!(
        agent_name = %config.agent_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let state = Arc::new(build_state(&config)?);
    print_summary(&config, &state);

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let handle = comms::start(&config, state, shutdown.clone());
    let result = handle.join().await;
    shutdown.cancel();

    info!("voice-agent stopped");
    result
}

fn build_state(config: &Config) -> Result<CommsState, AppError> {
    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let executor = ResilientExecutor::new(provider, config.llm.retry_policy());
    let agent = TurnOrchestrator::new(executor, Conversation::seeded(config.system_prompt.as_deref()))
        .with_fallback_reply(&config.llm.fallback_reply);

    let log = ConversationLog::open(&config.store.log_file)?;

    let stt = if config.voice.stt.enabled {
        Some(SttClient::new(&config.voice.stt, config.stt_api_key.clone()).map_err(|e| AppError::Config(e.to_string()))?)
    } else {
        None
    };
    let tts = if config.voice.tts.enabled {
        Some(TtsClient::new(&config.voice.tts, config.tts_api_key.clone()).map_err(|e| AppError::Config(e.to_string()))?)
    } else {
        None
    };

    Ok(CommsState::new(agent, log, stt, tts, &config.store.audio_dir))
}

fn print_summary(config: &Config, state: &CommsState) {
    let on_off = |b: bool| if b { "on" } else { "off" };
    let policy = state.agent().executor().policy();
    println!("─────────────────────────────────");
    println!(" {}", config.agent_name);
    println!("─────────────────────────────────");
    println!("  provider : {}", state.agent().executor().transport().name());
    println!(
        "  retries  : {} (backoff x{}, unit {:?})",
        policy.max_retries, policy.backoff_factor, policy.backoff_unit
    );
    println!("  log      : {}", state.log().path().display());
    println!("  stt      : {}", on_off(config.voice.stt.enabled));
    println!("  tts      : {}", on_off(config.voice.tts.enabled));
    println!("  console  : {}", on_off(config.comms_pty_should_load()));
    if config.comms_http_should_load() {
        println!("  http     : {}", config.comms.http.bind);
    } else {
        println!("  http     : off");
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    no_console: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut no_console = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => break,
            "-h" | "--help" => {
                println!("Usage: voice-agent [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -n, --no-console           Disable the console channel (daemon mode)");
                println!("  -f, --config <PATH>        Path to configuration file (default: {})", config::DEFAULT_CONFIG_PATH);
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-n" | "--no-console" => no_console = true,
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(path),
                None => {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.len() > 1 && a.starts_with('-') && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // -v warn, -vv info, -vvv debug, -vvvv trace.
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, no_console, config_path }
}
