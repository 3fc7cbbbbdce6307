use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coderun_core::{
    config::ConfigLoader, CodeLanguage, CodeSafetyChecker, CoderunConfig, ExecutionOrchestrator,
    ExecutionRequest, LanguageRegistry, PreferredMethod, SafetyVerdict,
};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_FILE: &str = "coderun.yaml";

#[derive(Parser, Debug)]
#[clap(name = "coderun", author, version = "0.1.0", about = "Run untrusted code in a sandbox")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        short,
        help = "Configuration file (defaults to ./coderun.yaml when present)"
    )]
    config: Option<PathBuf>,

    #[clap(long, short, help = "Log level; overrides logging.level from the configuration")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a source file and print the execution record as JSON
    Run {
        #[clap(help = "Source file to execute, or '-' to read it from stdin")]
        file: PathBuf,

        #[clap(long, short = 'L', help = "Language id, e.g. python39")]
        language: String,

        #[clap(long, help = "File whose contents are passed to the program as stdin")]
        stdin_file: Option<PathBuf>,

        #[clap(long, help = "Execution method: auto, sandbox or remote")]
        method: Option<String>,

        #[clap(long, help = "Do not fall back to the remote backend")]
        no_fallback: bool,

        #[clap(long, help = "Skip the static safety pre-check")]
        skip_safety_check: bool,

        #[clap(long)]
        user_id: Option<i64>,

        #[clap(long)]
        block_id: Option<String>,
    },
    /// List the enabled languages
    Languages,
    /// Run the static safety pre-check on a source file
    Check {
        file: PathBuf,

        #[clap(long, short = 'L', help = "Language id, e.g. python39")]
        language: String,
    },
    /// Report configuration and backend reachability
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));
    let mut config = ConfigLoader::load(config_path.as_deref())
        .await
        .context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .target(env_logger::Target::Stderr)
        .init();

    if let Some(path) = &config_path {
        log::info!("Loaded configuration from {}", path.display());
    }

    match cli.command {
        Commands::Run {
            file,
            language,
            stdin_file,
            method,
            no_fallback,
            skip_safety_check,
            user_id,
            block_id,
        } => {
            if let Some(method) = method {
                config.execution.method = method.parse::<PreferredMethod>()?;
            }
            if no_fallback {
                config.execution.fallback_enabled = false;
            }
            if skip_safety_check {
                config.execution.enforce_safety_check = false;
            }

            let source = read_source(&file).await?;
            let mut request = ExecutionRequest::new(source, language);
            if let Some(stdin_file) = stdin_file {
                let stdin = tokio::fs::read_to_string(&stdin_file)
                    .await
                    .with_context(|| format!("Failed to read {}", stdin_file.display()))?;
                request = request.with_stdin(stdin);
            }
            if let Some(user_id) = user_id {
                request = request.with_user(user_id);
            }
            if let Some(block_id) = block_id {
                request = request.with_block(block_id);
            }

            run(&config, request).await
        }
        Commands::Languages => {
            let registry = LanguageRegistry::from_config(&config.languages).await?;
            println!("{}", serde_json::to_string_pretty(&registry.list_enabled())?);
            Ok(())
        }
        Commands::Check { file, language } => {
            let registry = LanguageRegistry::from_config(&config.languages).await?;
            let profile = registry.resolve(&language)?;
            let source = read_source(&file).await?;
            check(&source, profile.language)
        }
        Commands::Doctor => doctor(&config).await,
    }
}

async fn read_source(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        use tokio::io::AsyncReadExt;
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read source from stdin")?;
        return Ok(source);
    }
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

async fn run(config: &CoderunConfig, request: ExecutionRequest) -> Result<()> {
    let orchestrator = ExecutionOrchestrator::from_config(config).await?;

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling execution");
            ctrl_c_token.cancel();
        }
    });

    let record = orchestrator
        .execute_with_cancellation(&request, token)
        .await?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if !record.result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn check(source: &str, language: CodeLanguage) -> Result<()> {
    match CodeSafetyChecker::new().inspect(source, language) {
        SafetyVerdict::Safe => println!("safe"),
        verdict => {
            println!("unsafe: {}", verdict.reason().unwrap_or_default());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn doctor(config: &CoderunConfig) -> Result<()> {
    let orchestrator = ExecutionOrchestrator::from_config(config).await?;
    let stats = orchestrator.stats();
    let report = serde_json::json!({
        "stats": stats,
        "execution_root": config.sandbox.execution_root,
        "docker_reachable": orchestrator.engine_available().await,
        "remote_url": config.remote.enabled.then(|| config.remote.base_url.clone()),
        "remote_reachable": orchestrator.remote_available().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
