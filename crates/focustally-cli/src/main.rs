use clap::{Parser, Subcommand};
use focustally_core::Config;

mod commands;

#[derive(Parser)]
#[command(name = "focustally", version, about = "Focustally CLI")]
struct Cli {
    /// User to act as (defaults to `user.id` from the config)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Topic management
    Topic {
        #[command(subcommand)]
        action: commands::topic::TopicAction,
    },
    /// Record and list focus sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Bucket statistics and rollup
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Reconcile and show the focus streak
    Streak,
    /// Mask and unmask values, manage the shared seed
    Codec {
        #[command(subcommand)]
        action: commands::codec::CodecAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging(config: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    init_logging(&config);
    let user = cli.user.unwrap_or_else(|| config.user.id.clone());

    let result = match cli.command {
        Commands::Topic { action } => commands::topic::run(action, &config, &user),
        Commands::Session { action } => commands::session::run(action, &config, &user).await,
        Commands::Stats { action } => commands::stats::run(action, &config, &user).await,
        Commands::Streak => commands::streak::run(&config, &user).await,
        Commands::Codec { action } => commands::codec::run(action, &config),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
