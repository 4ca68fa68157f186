use clap::{Parser, Subcommand};

pub mod config;
pub mod logging;
pub mod schedule;
pub mod serve;
pub mod version;

#[derive(Parser)]
#[command(name = "chama")]
#[command(author = "Chama Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for rotating savings groups", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve JSON requests line by line on stdin/stdout
    Serve {
        /// Path to config file (default: ~/.local/share/chama/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// SQLite database file (overrides [storage] in the config)
        #[arg(long)]
        database: Option<String>,

        /// Keep all state in memory; nothing survives exit
        #[arg(long, conflicts_with = "database")]
        memory: bool,
    },

    /// Preview a payout rotation
    Schedule {
        /// Number of approved members
        #[arg(long)]
        members: u32,

        /// Contribution per member per round, in the ledger's smallest unit
        #[arg(long)]
        amount: u64,

        /// Days between rounds
        #[arg(long, default_value = "30")]
        period_days: u32,

        /// Activation time as Unix seconds (default: now)
        #[arg(long)]
        start: Option<u64>,

        /// Shuffle the order with this seed instead of using join order
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Destination (default: ~/.local/share/chama/config.toml)
        #[arg(long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Serve {
            config,
            database,
            memory,
        } => serve::execute(config, database, memory).await,
        Commands::Schedule {
            members,
            amount,
            period_days,
            start,
            seed,
        } => schedule::execute(members, amount, period_days, start, seed),
        Commands::InitConfig { path, force } => init_config(path, force),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

fn init_config(path: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    config::ChamaConfig::create_default(&path, &config::default_database_path())?;
    println!("Wrote {}", path.display());
    Ok(())
}
