use std::env;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;

use embedchat::api;
use embedchat::assistant::{Assistant, OpenAiAssistant, ScriptedAssistant};
use embedchat::config::{self, APP_NAME, AppConfig, AssistantProvider};
use embedchat::db::Database;
use embedchat::embed::{CreateEmbed, EmbedRepository};
use embedchat::telemetry::{LogTelemetry, NoopTelemetry, TelemetrySink};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Embed { command } => async_embed(ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

#[tokio::main]
async fn async_embed(ctx: RuntimeContext, cmd: EmbedCommand) -> Result<()> {
    handle_embed(&ctx, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Embedchat - streaming chat backend for website widgets.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Manage embed configurations
    Embed {
        #[command(subcommand)]
        command: EmbedCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Subcommand)]
enum EmbedCommand {
    /// Create an embed and print its public id
    Create(EmbedCreateCommand),
    /// List embeds
    List,
    /// Disable an embed
    Disable {
        /// Public id of the embed
        uuid: String,
    },
}

#[derive(Debug, Clone, Args)]
struct EmbedCreateCommand {
    /// Workspace the embed answers from
    workspace: String,
    /// Default system prompt
    #[arg(long)]
    prompt: Option<String>,
    /// Default model
    #[arg(long)]
    model: Option<String>,
    /// Default temperature
    #[arg(long)]
    temperature: Option<f64>,
    /// Number of past exchanges sent as context
    #[arg(long)]
    history_window: Option<i64>,
    /// Maximum stored chats per session
    #[arg(long)]
    max_chats_per_session: Option<i64>,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    data_dir: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = match common.config.clone() {
            Some(path) => {
                let expanded = config::expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => config::default_config_dir()?.join("config.toml"),
        };
        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        let config = config::load_or_init_config(&config_file, common.dry_run)?;
        let data_dir = config::default_data_dir()?;

        Ok(Self {
            common,
            config_file,
            data_dir,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            return;
        }

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{APP_NAME}={level},tower_http={level}"))
        });

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color),
                )
                .try_init()
                .ok();
        }
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::TRACE
        } else if self.common.debug {
            LevelFilter::DEBUG
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::INFO),
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        }
    }

    async fn open_database(&self) -> Result<Database> {
        let path = self.config.database_path(&self.data_dir)?;
        info!("Database path: {}", path.display());
        Database::new(&path).await
    }
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.config_file.display()
                );
                return Ok(());
            }
            config::write_default_config(&ctx.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

async fn handle_embed(ctx: &RuntimeContext, command: EmbedCommand) -> Result<()> {
    let database = ctx.open_database().await?;
    let embeds = EmbedRepository::new(database.pool().clone());

    match command {
        EmbedCommand::Create(cmd) => {
            let embed = embeds
                .create(CreateEmbed {
                    workspace: cmd.workspace,
                    prompt: cmd.prompt,
                    model: cmd.model,
                    temperature: cmd.temperature,
                    history_window: Some(
                        cmd.history_window
                            .unwrap_or(ctx.config.chat.history_window),
                    ),
                    max_chats_per_session: cmd.max_chats_per_session,
                })
                .await?;
            if ctx.common.json {
                println!("{}", serde_json::to_string_pretty(&embed)?);
            } else {
                println!("{}", embed.uuid);
            }
        }
        EmbedCommand::List => {
            let all = embeds.list().await?;
            if ctx.common.json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                for embed in all {
                    let status = if embed.enabled { "enabled" } else { "disabled" };
                    println!("{}\t{}\t{}", embed.uuid, embed.workspace, status);
                }
            }
        }
        EmbedCommand::Disable { uuid } => {
            if !embeds.set_enabled(&uuid, false).await? {
                return Err(anyhow!("embed not found: {uuid}"));
            }
            info!("Disabled embed {}", uuid);
        }
    }

    database.close().await;
    Ok(())
}

fn build_assistant(config: &AppConfig) -> Result<Arc<dyn Assistant>> {
    let assistant: Arc<dyn Assistant> = match config.assistant.provider {
        AssistantProvider::Openai => Arc::new(OpenAiAssistant::new(
            &config.assistant.base_url,
            config.assistant.api_key.clone(),
            Duration::from_secs(config.assistant.connect_timeout_secs),
        )?),
        AssistantProvider::Echo => Arc::new(ScriptedAssistant::echo()),
    };
    Ok(assistant)
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting embed chat server...");

    let database = ctx.open_database().await?;
    let assistant = build_assistant(&ctx.config)?;
    info!(
        "Assistant: {:?} ({})",
        ctx.config.assistant.provider, ctx.config.assistant.default_model
    );

    let telemetry: Arc<dyn TelemetrySink> = if ctx.config.telemetry.enabled {
        Arc::new(LogTelemetry)
    } else {
        Arc::new(NoopTelemetry)
    };

    let state = embedchat::build_state(
        &database,
        assistant,
        telemetry,
        ctx.config.assistant.default_model.clone(),
    );
    let app = api::create_router(state);

    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    database.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
