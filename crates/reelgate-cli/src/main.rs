mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reelgate=info";

/// Find something to watch and get an embeddable player URL for it.
#[derive(Debug, Parser)]
#[command(name = "reelgate", version, about)]
pub struct Cli {
    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Keep history and selection in memory; nothing is written to disk.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List playback providers; the selected one is marked with `*`.
    Providers,
    /// Remember a provider for future playback.
    Select { name: String },
    /// Print the embed URL for a title without contacting the metadata API.
    Resolve {
        id: String,
        #[arg(short, long, requires = "episode")]
        season: Option<u32>,
        #[arg(short, long, requires = "season")]
        episode: Option<u32>,
        /// Provider to use instead of the remembered one.
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Load a title from the metadata API and print its player URL.
    Watch {
        id: String,
        #[arg(short, long, requires = "episode")]
        season: Option<u32>,
        #[arg(short, long, requires = "season")]
        episode: Option<u32>,
        /// Known episode count for the season, skips one API call.
        #[arg(long)]
        me: Option<u32>,
    },
    /// Recently viewed titles, newest first.
    History,
    /// Where to resume a series.
    Continue { id: String },
    /// Search the metadata API.
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Popular movies right now.
    Popular,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default filter.
fn init_logging(
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "reelgate.log".into());
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_args() {
        let cli = Cli::parse_from(["reelgate", "watch", "1399", "-s", "2", "-e", "5", "--me", "10"]);
        match cli.command {
            Command::Watch {
                id,
                season,
                episode,
                me,
            } => {
                assert_eq!(id, "1399");
                assert_eq!((season, episode, me), (Some(2), Some(5), Some(10)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_season_requires_episode() {
        assert!(Cli::try_parse_from(["reelgate", "resolve", "1399", "-s", "2"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["reelgate", "history", "--ephemeral"]).unwrap();
        assert!(cli.ephemeral);
    }
}
