//! Command-line definitions for karma-cli

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "karma-cli", version, about = "Per-channel karma ledger")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Directory holding channel databases and dump files
    #[arg(long, global = true, env = "KARMA_DATA_DIR")]
    pub data_dir: Option<String>,

    /// TOML configuration file
    #[arg(long, short = 'c', global = true, env = "KARMA_CONFIG")]
    pub config: Option<String>,

    /// Storage backend (overrides the configuration file)
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// Channel to operate on
    #[arg(long, global = true, default_value = "#general")]
    pub channel: String,

    /// Nick acting as the sender
    #[arg(long, global = true, env = "USER", default_value = "me")]
    pub nick: String,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Suppress confirmations
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Feed a line of chat text through the tokenizer and apply its karma
    Feed {
        /// Chat text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Treat the line as addressed to the bot
        #[arg(long)]
        addressed: bool,
    },

    /// Show karma for names, or the channel summary when none are given
    Karma {
        /// Names to look up
        names: Vec<String>,
    },

    /// Highest totals
    Top {
        /// How many entries
        #[arg(default_value_t = 10)]
        limit: usize,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Lowest totals
    Bottom {
        /// How many entries
        #[arg(default_value_t = 10)]
        limit: usize,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank of a name
    Rank {
        /// Name to rank
        name: String,
    },

    /// Most increased, decreased or active names
    Most {
        /// increased, decreased or active (prefixes accepted)
        kind: String,
    },

    /// Reset a name's counters to zero
    Clear {
        /// Name to reset
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Export the channel to a CSV file
    Dump {
        /// Target file, relative names go in the data directory
        file: String,
    },

    /// Replace the channel with the rows of a CSV file
    Load {
        /// Source file, relative names are read from the data directory
        file: String,
    },

    /// Show the karma expressions found in text
    Tokenize {
        /// Text to scan
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Print the effective configuration
    Config,

    /// Interactive session acting as a chat channel
    Repl {
        /// History file
        #[arg(long)]
        history: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Sled,
    Memory,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Elvish,
    PowerShell,
}
