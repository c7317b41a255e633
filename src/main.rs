//! wconhost - line-oriented demo of the console host client API
//!
//! Connects one client process, feeds each stdin line through the host's
//! input queue, expands aliases and records the line in the client's
//! command history.
//!
//! # Quick Start
//!
//! ```text
//! wconhost                    # cmd.exe client, UTF-8
//! wconhost --exe pwsh.exe     # aliases and history for pwsh.exe
//! wconhost --codepage 932     # Shift-JIS 8-bit calls
//! ```
//!
//! # Commands
//!
//! | Line | Action |
//! |------|--------|
//! | `:alias src=target` | Define an alias (empty target deletes) |
//! | `:aliases` | List aliases of the client |
//! | `:history` | List the client's command history |
//! | `:clear` | Clear the client's command history |
//! | `:save` | Write the config, including aliases defined this session |
//! | `:quit` | Exit |

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wconhost::config::AliasConfig;
use wconhost::core::{InputEvent, KeyEvent, ProcessHandle};
use wconhost::{Config, Host, ReadData, ReadOutcome};

/// Command line options
#[derive(Debug)]
struct Options {
    /// Config file overriding `~/.wconhost/config.toml`
    config_path: Option<PathBuf>,
    /// Codepage for 8-bit calls
    codepage: Option<u32>,
    /// Client executable name
    exe: String,
    /// Log at debug level
    verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config_path: None,
            codepage: None,
            exe: "cmd.exe".to_string(),
            verbose: false,
        }
    }
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("wconhost {}", VERSION);
}

fn print_help() {
    eprintln!("wconhost {} - console host client API demo", VERSION);
    eprintln!();
    eprintln!("Usage: wconhost [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Configuration file");
    eprintln!("  --codepage <CP>       Codepage for 8-bit calls (default 65001)");
    eprintln!("  --exe <NAME>          Client executable name (default cmd.exe)");
    eprintln!("  --verbose             Debug logging");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Commands (one per line on stdin):");
    eprintln!("  :alias SRC=TARGET     Define an alias (empty TARGET deletes)");
    eprintln!("  :aliases              List aliases");
    eprintln!("  :history              List command history");
    eprintln!("  :clear                Clear command history");
    eprintln!("  :save                 Save the configuration with current aliases");
    eprintln!("  :quit                 Exit");
    eprintln!();
    eprintln!("Alias macros: $1-$9 arguments, $* all arguments, $L $G $B for < > |,");
    eprintln!("              $T next command, $$ for $");
    eprintln!();
    eprintln!("Configuration: ~/.wconhost/config.toml");
    eprintln!("Log file:      ~/.wconhost/wconhost.log (WCONHOST_LOG sets the filter)");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing config path".to_string());
                }
                options.config_path = Some(PathBuf::from(&args[i]));
            }
            "--codepage" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing codepage".to_string());
                }
                let cp = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid codepage: {}", args[i]))?;
                options.codepage = Some(cp);
            }
            "--exe" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing executable name".to_string());
                }
                options.exe = args[i].clone();
            }
            "--verbose" => {
                options.verbose = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn init_logging(verbose: bool) {
    let log_path = Config::config_dir()
        .map(|dir| dir.join("wconhost.log"))
        .unwrap_or_else(|| PathBuf::from("wconhost.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = match env::var("WCONHOST_LOG") {
            Ok(spec) => EnvFilter::new(spec),
            Err(_) => EnvFilter::new(if verbose { "debug" } else { "info" }),
        };
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Split `name\0name\0` records.
fn records(units: &[u16]) -> Vec<String> {
    units
        .split(|&u| u == 0)
        .filter(|r| !r.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

fn fetch_wide(query: impl Fn(&mut [u16]) -> wconhost::Result<usize>) -> wconhost::Result<Vec<String>> {
    let needed = query(&mut [0u16; 0][..])?;
    let mut buffer = vec![0u16; needed];
    if needed > 0 {
        query(&mut buffer)?;
    }
    Ok(records(&buffer))
}

/// Push `line` through the input queue and read it back as typed text.
fn type_line(host: &Host, process: ProcessHandle, line: &str) -> anyhow::Result<String> {
    let events: Vec<InputEvent> = line
        .encode_utf16()
        .map(|unit| InputEvent::Key(KeyEvent::typed(unit)))
        .collect();
    let count = events.len();
    host.write_input_w(events, false)?;

    match host.read_text(process, count, true)? {
        ReadOutcome::Ready(ReadData::Text(text)) => Ok(text),
        ReadOutcome::Ready(other) => bail!("unexpected read result {:?}", other),
        ReadOutcome::Pending(id) => {
            host.cancel_wait(id);
            Ok(String::new())
        }
    }
}

/// Mirror an alias definition into the config so `:save` keeps it.
fn remember_alias(config: &mut Config, exe: &str, source: &str, target: &str) {
    config
        .aliases
        .retain(|a| !(a.exe.eq_ignore_ascii_case(exe) && a.source.eq_ignore_ascii_case(source)));
    if !target.is_empty() {
        config.aliases.push(AliasConfig {
            exe: exe.to_string(),
            source: source.to_string(),
            target: target.to_string(),
        });
    }
}

/// Session state shared by the meta commands
struct Session<'a> {
    host: &'a Host,
    process: ProcessHandle,
    exe: &'a str,
    config: Config,
    config_path: Option<PathBuf>,
}

fn run_command(session: &mut Session<'_>, line: &str, out: &mut impl Write) -> anyhow::Result<bool> {
    let (host, process, exe) = (session.host, session.process, session.exe);
    if let Some(definition) = line.strip_prefix(":alias ") {
        let (source, target) = definition.split_once('=').unwrap_or((definition, ""));
        host.add_alias_w(source.trim(), target, exe)?;
        remember_alias(&mut session.config, exe, source.trim(), target);
        return Ok(true);
    }

    match line {
        ":quit" => return Ok(false),
        ":aliases" => {
            for record in fetch_wide(|buf| host.get_aliases_w(exe, buf))? {
                writeln!(out, "{}", record)?;
            }
        }
        ":history" => {
            for (i, command) in fetch_wide(|buf| host.get_command_history_w(exe, buf))?.iter().enumerate() {
                writeln!(out, "{:3}  {}", i + 1, command)?;
            }
        }
        ":clear" => host.expunge_command_history_w(exe)?,
        ":save" => {
            let saved = match &session.config_path {
                Some(path) => session.config.save_to(path),
                None => session.config.save(),
            };
            saved.map_err(anyhow::Error::msg)?;
            info!("configuration saved");
        }
        "" => {}
        _ => {
            let typed = type_line(host, process, line)?;
            host.add_history(process, &typed)?;
            match host.expand_alias_w(&typed, exe) {
                Ok(expansion) => write!(out, "{}", expansion.text)?,
                Err(_) => writeln!(out, "{}", typed)?,
            }
        }
    }
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging(options.verbose);
    info!("wconhost starting...");

    let mut config = match &options.config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(cp) = options.codepage {
        config.codepage = cp;
        config.output_codepage = cp;
    }

    let host = Host::from_config(&config).context("failed to start host")?;
    let process = host.connect_process(&options.exe);
    let mut session = Session {
        host: &host,
        process,
        exe: &options.exe,
        config,
        config_path: options.config_path.clone(),
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        match run_command(&mut session, line.trim_end(), &mut out) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!("command failed: {:#}", e);
                writeln!(out, "error: {:#}", e)?;
            }
        }
        out.flush()?;
    }

    host.disconnect_process(process);
    info!("wconhost exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_alias_replaces_and_deletes() {
        let mut config = Config::default();
        remember_alias(&mut config, "cmd.exe", "ll", "dir");
        remember_alias(&mut config, "CMD.EXE", "LL", "dir /w");
        assert_eq!(config.aliases.len(), 1);
        assert_eq!(config.aliases[0].target, "dir /w");

        remember_alias(&mut config, "cmd.exe", "ll", "");
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn test_records_split() {
        let units: Vec<u16> = "a=b\0c=d\0".encode_utf16().collect();
        assert_eq!(records(&units), vec!["a=b".to_string(), "c=d".to_string()]);
    }
}
