//! CLI command definitions for the `mnemo` binary.
//!
//! Uses clap derive macros for argument parsing. Every command that takes a
//! thread id validates it at parse time.

pub mod chat;
pub mod jobs;
pub mod memory;
pub mod status;
pub mod turns;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use mnemo_types::thread::ThreadId;
use mnemo_types::turn::TurnRole;

use crate::state::AppState;

/// Long-term conversational memory: history, profile, summary and recall.
#[derive(Parser)]
#[command(name = "mnemo", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (defaults to $MNEMO_DATA_DIR, then ~/.mnemo).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter for the chosen verbosity; `RUST_LOG` overrides it.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,mnemo_core=debug,mnemo_infra=debug,mnemo_api=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive conversation in a thread.
    Chat {
        /// Thread to converse in.
        thread: ThreadId,
    },

    /// Send one message and print the reply.
    Say {
        thread: ThreadId,

        /// The message text.
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Record a turn without generating a reply, then run maintenance.
    Record {
        thread: ThreadId,

        /// Turn content.
        content: String,

        /// Who authored the turn (user, assistant, system).
        #[arg(long, default_value = "user")]
        role: TurnRole,
    },

    /// Show the turns of a thread.
    #[command(alias = "log")]
    History {
        thread: ThreadId,

        /// Include turns already folded into the summary.
        #[arg(long)]
        all: bool,

        /// Maximum number of turns (newest kept).
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Find earlier turns of a thread similar to a query.
    Search {
        thread: ThreadId,

        /// Query text.
        query: String,

        /// Maximum number of results.
        #[arg(short, default_value = "3")]
        k: usize,
    },

    /// Show the user profile extracted for a thread.
    Profile { thread: ThreadId },

    /// Show the running summary of a thread.
    Summary { thread: ThreadId },

    /// List threads with turn counts and last activity.
    #[command(alias = "ls")]
    Threads,

    /// Run a maintenance pass for a thread and wait for it.
    Maintain { thread: ThreadId },

    /// List persisted maintenance jobs (pending, retrying or abandoned).
    Jobs,

    /// System status dashboard.
    Status {
        /// Also send a tiny request to the chat model.
        #[arg(long)]
        check_llm: bool,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Block until background maintenance drains, with a spinner when the
/// terminal is interactive.
pub async fn finish_maintenance(state: &AppState, quiet: bool) {
    if state.queue().in_flight() == 0 {
        return;
    }

    let spinner = if quiet || !console::user_attended_stderr() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Updating memory...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    state.queue().wait_idle().await;

    spinner.finish_and_clear();
}

/// Shorten `text` to `max` characters for table cells.
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Print a dimmed hint line (styled output only).
pub fn hint(message: &str) {
    println!();
    println!("  {} {}", style("i").blue().bold(), message);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_with_role() {
        let cli = Cli::try_parse_from(["mnemo", "record", "t-1", "hello", "--role", "assistant"])
            .unwrap();
        match cli.command {
            Commands::Record { thread, role, .. } => {
                assert_eq!(thread.as_str(), "t-1");
                assert_eq!(role, TurnRole::Assistant);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_parse_rejects_blank_thread() {
        assert!(Cli::try_parse_from(["mnemo", "profile", "  "]).is_err());
    }

    #[test]
    fn test_parse_say_joins_words() {
        let cli = Cli::try_parse_from(["mnemo", "say", "t", "I", "live", "in", "Paris"]).unwrap();
        match cli.command {
            Commands::Say { message, .. } => assert_eq!(message.join(" "), "I live in Paris"),
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn test_log_filter_levels() {
        let cli = Cli::try_parse_from(["mnemo", "--quiet", "threads"]).unwrap();
        assert_eq!(cli.log_filter(), "error");
        let cli = Cli::try_parse_from(["mnemo", "-vv", "threads"]).unwrap();
        assert_eq!(cli.log_filter(), "trace");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a\nb", 10), "a b");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
