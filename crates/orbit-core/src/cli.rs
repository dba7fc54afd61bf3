use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "orbit",
    version,
    about = "Orbit: a personal task tracker",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,

        #[arg(short = 'c', long)]
        category: Option<String>,

        #[arg(short = 'p', long)]
        priority: Option<String>,

        #[arg(short = 'd', long)]
        due: Option<String>,
    },

    /// Show tasks through the status and category filters.
    List {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Flip a task between active and completed. Numeric references are
    /// rows of the list shown with the same filters.
    Toggle {
        task: String,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Remove a task.
    Delete {
        task: String,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Change text, category, priority or due date.
    Edit {
        task: String,

        #[command(flatten)]
        view: ViewArgs,

        #[arg(short = 't', long)]
        text: Option<String>,

        #[arg(short = 'C', long = "set-category")]
        set_category: Option<String>,

        #[arg(short = 'p', long)]
        priority: Option<String>,

        #[arg(short = 'd', long, conflicts_with = "no_due")]
        due: Option<String>,

        #[arg(long = "no-due")]
        no_due: bool,
    },

    /// Move a task; positions are 1-based rows of the filtered list.
    Move {
        from: usize,
        to: usize,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Totals, completion and per-category counts.
    Stats,

    /// List the categories.
    Categories,

    /// Ask the assistant about some text.
    Ask {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    #[arg(short = 's', long, default_value = "all")]
    pub status: String,

    #[arg(short = 'c', long, default_value = "all")]
    pub category: String,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` / `rc.KEY:VALUE` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
