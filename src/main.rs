//! karma-cli entrypoint

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell as ClapShell};
use tracing_subscriber::EnvFilter;

use karma_ledger::{tokenize, BackendKind, Karma, KarmaConfig, Message, Responder};

mod cli;
use cli::*;

// ══════════════════════════════════════════════════════════════════════════════
// UTILITIES
// ══════════════════════════════════════════════════════════════════════════════

fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

fn load_config(global: &GlobalArgs) -> Result<KarmaConfig> {
    let mut config = match &global.config {
        Some(path) => KarmaConfig::load(expand_path(path))?,
        None => KarmaConfig::default(),
    };
    if let Some(dir) = &global.data_dir {
        config.data_dir = expand_path(dir).into();
    }
    if let Some(backend) = global.backend {
        config.backend = match backend {
            BackendArg::Sled => BackendKind::Sled,
            BackendArg::Memory => BackendKind::Memory,
        };
    }
    Ok(config)
}

/// Prints replies to stdout and errors to stderr.
struct ConsoleResponder {
    quiet: bool,
}

impl Responder for ConsoleResponder {
    fn reply(&mut self, text: &str) {
        println!("{text}");
    }

    fn error(&mut self, text: &str) {
        eprintln!("Error: {text}");
    }

    fn reply_success(&mut self) {
        if !self.quiet {
            println!("The operation succeeded.");
        }
    }
}

fn print_ranking(rows: &[(String, i64)], json: bool) -> Result<()> {
    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|(name, total)| serde_json::json!({ "name": name, "total": total }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for (idx, (name, total)) in rows.iter().enumerate() {
            println!("{:>3}. {name} ({total})", idx + 1);
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// MAIN
// ══════════════════════════════════════════════════════════════════════════════

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.global.log_level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.global)?;
    let channel = cli.global.channel.clone();
    let nick = cli.global.nick.clone();
    let quiet = cli.global.quiet;

    // Channel databases open lazily, so nothing touches disk before dispatch.
    let karma = Karma::from_config(config.clone());

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let shell = match shell {
                Shell::Bash => ClapShell::Bash,
                Shell::Zsh => ClapShell::Zsh,
                Shell::Fish => ClapShell::Fish,
                Shell::Elvish => ClapShell::Elvish,
                Shell::PowerShell => ClapShell::PowerShell,
            };
            generate(shell, &mut cmd, "karma-cli", &mut std::io::stdout());
            return Ok(());
        }

        Commands::Config => {
            println!("{}", config.to_toml_string()?);
            return Ok(());
        }

        // ─────────────────────────────────────────────────────────────────────
        // CHAT
        // ─────────────────────────────────────────────────────────────────────
        Commands::Feed { text, addressed } => {
            let msg = Message::new(&channel, &nick, text.join(" ")).addressed(addressed);
            let mut responder = ConsoleResponder { quiet };
            karma.handle_message(&mut responder, &msg);
        }

        Commands::Tokenize { text } => {
            for token in tokenize(&text.join(" ")) {
                println!("{token}");
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // QUERIES
        // ─────────────────────────────────────────────────────────────────────
        Commands::Karma { names } => {
            println!("{}", karma.query(&channel, &nick, &names)?);
        }

        Commands::Top { limit, json } => {
            print_ranking(&karma.store().top(&channel, limit)?, json)?;
        }

        Commands::Bottom { limit, json } => {
            print_ranking(&karma.store().bottom(&channel, limit)?, json)?;
        }

        Commands::Rank { name } => match karma.store().rank(&channel, &name)? {
            Some(rank) => println!(
                "{name} is ranked {rank} out of {}.",
                karma.store().size(&channel)?
            ),
            None => println!("{name} has neutral karma."),
        },

        Commands::Most { kind } => {
            println!("{}", karma.most(&channel, &kind)?);
        }

        // ─────────────────────────────────────────────────────────────────────
        // MAINTENANCE
        // ─────────────────────────────────────────────────────────────────────
        Commands::Clear { name } => {
            karma.clear(&channel, &name.join(" "))?;
            if !quiet {
                println!("The operation succeeded.");
            }
        }

        Commands::Dump { file } => {
            let rows = karma.dump(&channel, expand_path(&file))?;
            if !quiet {
                println!("Dumped {rows} entries from {channel}");
            }
        }

        Commands::Load { file } => {
            let rows = karma.load(&channel, expand_path(&file))?;
            if !quiet {
                println!("Loaded {rows} entries into {channel}");
            }
        }

        Commands::Repl { history } => {
            run_repl(&karma, &channel, &nick, history)?;
        }
    }

    karma.close()?;
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// REPL
// ══════════════════════════════════════════════════════════════════════════════

fn run_repl(karma: &Karma, channel: &str, nick: &str, history_file: Option<String>) -> Result<()> {
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    println!("karma-ledger REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Chat lines are fed to {channel} as {nick}. Type '/help' for commands.\n");

    let history_path = history_file.map_or_else(
        || {
            dirs::data_dir()
                .map(|p| p.join("karma-ledger").join("repl_history"))
                .unwrap_or_else(|| std::path::PathBuf::from(".karma_history"))
        },
        |p| std::path::PathBuf::from(expand_path(&p)),
    );

    let mut rl = DefaultEditor::new().map_err(|e| anyhow!("Failed to create editor: {e}"))?;
    if history_path.exists() {
        let _ = rl.load_history(&history_path);
    }

    let mut session = ReplSession {
        channel: channel.to_string(),
        nick: nick.to_string(),
    };

    loop {
        let prompt = format!("{}({})> ", session.channel, session.nick);
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match execute_repl_line(line, karma, &mut session) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!("Bye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history_path);
    Ok(())
}

struct ReplSession {
    channel: String,
    nick: String,
}

/// Lines starting with `/` are commands; anything else is chat text addressed
/// to the channel. Returns `Ok(true)` to exit.
fn execute_repl_line(line: &str, karma: &Karma, session: &mut ReplSession) -> Result<bool> {
    let Some(command) = line.strip_prefix('/') else {
        let msg = Message::new(&session.channel, &session.nick, line).addressed(true);
        let mut responder = ConsoleResponder { quiet: false };
        karma.handle_message(&mut responder, &msg);
        return Ok(false);
    };

    let parts: Vec<&str> = command.split_whitespace().collect();
    let Some(&head) = parts.first() else {
        return Ok(false);
    };
    let rest = &parts[1..];

    match head {
        "quit" | "exit" | "q" => {
            println!("Bye!");
            return Ok(true);
        }

        "help" | "?" | "h" => {
            println!(
                r#"
REPL Commands:
  <text>                         - Chat line; karma expressions are applied
  /karma [name ...]              - Karma for names, or the channel summary
  /most <increased|decreased|active>
  /top [n]  /bottom [n]          - Rankings
  /clear <name>                  - Reset a name to zero
  /dump <file>  /load <file>     - CSV export/import
  /channel <#name>               - Switch channel
  /nick <name>                   - Switch sender nick
  /tokens <text>                 - Show karma expressions in text
  /quit                          - Exit
"#
            );
        }

        "karma" | "k" => println!("{}", karma.query(&session.channel, &session.nick, rest)?),

        "most" => {
            let kind = rest.first().ok_or_else(|| anyhow!("Usage: /most <kind>"))?;
            println!("{}", karma.most(&session.channel, kind)?);
        }

        "top" | "bottom" => {
            let limit = rest.first().and_then(|s| s.parse().ok()).unwrap_or(5);
            let rows = if head == "top" {
                karma.store().top(&session.channel, limit)?
            } else {
                karma.store().bottom(&session.channel, limit)?
            };
            print_ranking(&rows, false)?;
        }

        "clear" => {
            if rest.is_empty() {
                println!("Usage: /clear <name>");
                return Ok(false);
            }
            karma.clear(&session.channel, &rest.join(" "))?;
            println!("The operation succeeded.");
        }

        "dump" | "load" => {
            let file = rest.first().ok_or_else(|| anyhow!("Usage: /{head} <file>"))?;
            let file = expand_path(file);
            let rows = if head == "dump" {
                karma.dump(&session.channel, &file)?
            } else {
                karma.load(&session.channel, &file)?
            };
            println!("{rows} entries");
        }

        "channel" | "join" => match rest.first() {
            Some(ch) if karma_ledger::host::is_channel(ch) => session.channel = (*ch).to_string(),
            _ => println!("Usage: /channel <#name>"),
        },

        "nick" => match rest.first() {
            Some(n) => session.nick = (*n).to_string(),
            None => println!("Usage: /nick <name>"),
        },

        "tokens" => {
            for token in tokenize(&rest.join(" ")) {
                println!("{token}");
            }
        }

        _ => {
            println!("Unknown command: /{head}. Type '/help' for available commands.");
        }
    }

    Ok(false)
}
