mod config_commands;
mod history_commands;
mod vault_commands;

use {
    clap::{Parser, Subcommand},
    lockbox_metrics::{MetricsHandle, MetricsRecorderConfig},
    secrecy::SecretString,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "lockbox", about = "Lockbox: zero-knowledge credential vault", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/lockbox/).
    #[arg(long, global = true, env = "LOCKBOX_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,

    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "LOCKBOX_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Vault owner.
    #[arg(long, global = true, env = "LOCKBOX_USER", default_value = "default")]
    user: String,

    /// Master passphrase.
    #[arg(long, global = true, env = "LOCKBOX_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Print collected metrics to stderr on exit.
    #[arg(long, global = true, default_value_t = false)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault and set the master passphrase.
    Init,
    /// Show whether the vault exists.
    Status,
    /// Encrypt a value; prints the record as JSON.
    Encrypt {
        text: String,
        /// Context the record is bound to.
        #[arg(long)]
        aad: Option<String>,
    },
    /// Decrypt a JSON record produced by `encrypt`.
    Decrypt {
        record: String,
        /// Context the record was bound to.
        #[arg(long)]
        aad: Option<String>,
    },
    /// Password history and reuse detection.
    History {
        #[command(subcommand)]
        action: history_commands::HistoryAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output; logs go to stderr.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn init_metrics(
    cli: &Cli,
    config: &lockbox_config::LockboxConfig,
) -> anyhow::Result<Option<MetricsHandle>> {
    lockbox_metrics::init_metrics(MetricsRecorderConfig {
        enabled: cli.metrics || config.metrics.enabled,
        global_labels: Vec::new(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();

    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "lockbox starting");

    // Directory overrides apply before config discovery.
    if let Some(ref dir) = cli.config_dir {
        lockbox_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        lockbox_config::set_data_dir(dir.clone());
    }

    let mut config = lockbox_config::discover_and_load();
    lockbox_config::apply_env_overrides(&mut config)?;

    let metrics = init_metrics(&cli, &config)?;
    let passphrase = cli.passphrase.take().map(SecretString::new);

    let ctx = vault_commands::Context {
        config,
        user: cli.user.clone(),
        passphrase,
    };

    let result = match cli.command {
        Commands::Init => vault_commands::init(&ctx).await,
        Commands::Status => vault_commands::status(&ctx).await,
        Commands::Encrypt { text, aad } => {
            vault_commands::encrypt(&ctx, &text, aad.as_deref()).await
        },
        Commands::Decrypt { record, aad } => {
            vault_commands::decrypt(&ctx, &record, aad.as_deref()).await
        },
        Commands::History { action } => history_commands::handle_history(&ctx, action).await,
        Commands::Config { action } => config_commands::handle_config(&ctx.config, action),
    };

    if cli.metrics
        && let Some(handle) = metrics
    {
        eprint!("{}", handle.render());
    }

    result
}
