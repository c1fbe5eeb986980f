use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use voltguard::cli;

#[derive(Debug, Parser)]
#[command(name = "voltguard")]
#[command(about = "VoltGuard energy dashboard client")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pull frames from the live camera feed
    Feed {
        /// Stop after N frames (default: run until disconnected)
        #[arg(long)]
        frames: Option<u64>,
        /// Write the latest frame's JPEG to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Stream live notifications with banners and desktop alerts
    Listen {
        /// Stop after N notification events
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Chat with the energy assistant
    Chat {
        /// Send a single message and exit instead of starting a session
        #[arg(long, short)]
        message: Option<String>,
    },
    /// List the tools exposed by the tool server
    Tools,
    /// Manage the backend's stored notifications
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
    /// Show streak, efficiency level, pet and achievements
    Status {
        /// Average consumption score (0-100, lower is better)
        #[arg(long, default_value = "0")]
        consumption: f64,
        /// Previous period's consumption, for the improvement figure
        #[arg(long)]
        previous: Option<f64>,
        /// Weight today's consumption as a weekend day
        #[arg(long)]
        weekend: bool,
        /// Current streak in days
        #[arg(long, default_value = "0")]
        streak: u32,
        /// Current level
        #[arg(long, default_value = "1")]
        level: u32,
        /// Energy saved so far, in kWh
        #[arg(long, default_value = "0")]
        saved_kwh: f64,
        /// Devices optimized so far
        #[arg(long, default_value = "0")]
        devices: u32,
    },
    /// Show activity statistics from the event log
    Stats {
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
        /// Only include the last N days of data
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show per-day activity trends
    Analyze {
        /// Number of days to analyze (default: 7)
        #[arg(long, default_value = "7")]
        days: u32,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Check backend, completion endpoint, tool server and config
    Health,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum NotifyAction {
    /// Show stored notifications, newest first
    History {
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Publish a notification through the backend
    Send {
        message: String,
        #[arg(long)]
        device: Option<String>,
        /// info, warning or error
        #[arg(long, default_value = "info")]
        level: String,
    },
    /// Delete every stored notification
    Clear,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default config file to ~/.voltguard/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set a dotted key, e.g. `socket.url http://host:8000`
    Set { key: String, value: String },
    /// Reset the global config file to defaults
    Reset,
}

fn main() -> Result<()> {
    let app = App::parse();

    match app.command {
        Commands::Feed { frames, save } => cli::run_feed(frames, save),
        Commands::Listen { limit } => cli::run_listen(limit),
        Commands::Chat { message } => cli::run_chat(message),
        Commands::Tools => cli::run_tools(),
        Commands::Notify { action } => match action {
            NotifyAction::History { limit, format } => {
                let fmt = cli::OutputFormat::from_str_opt(Some(&format));
                cli::run_notify_history(limit, fmt)
            }
            NotifyAction::Send {
                message,
                device,
                level,
            } => cli::run_notify_send(&message, device.as_deref(), &level),
            NotifyAction::Clear => cli::run_notify_clear(),
        },
        Commands::Status {
            consumption,
            previous,
            weekend,
            streak,
            level,
            saved_kwh,
            devices,
        } => cli::run_status(cli::StatusArgs {
            consumption,
            previous,
            weekend,
            streak,
            level,
            saved_kwh,
            devices,
        }),
        Commands::Stats { format, days } => {
            let fmt = cli::OutputFormat::from_str_opt(Some(&format));
            cli::run_stats(fmt, days)
        }
        Commands::Analyze { days, format } => {
            let fmt = cli::OutputFormat::from_str_opt(Some(&format));
            cli::run_analyze(days, fmt)
        }
        Commands::Health => cli::run_health(),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::run_config_show(),
            ConfigAction::Init { force } => cli::run_config_init(force),
            ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
            ConfigAction::Reset => cli::run_config_reset(),
        },
    }
}
