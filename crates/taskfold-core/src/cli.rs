use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use taskfold_shared::{TaskPriority, TaskStatus, due_date_serde};
use tracing::debug;
use tracing_subscriber::EnvFilter;

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
    name = "taskfold",
    version,
    about = "Taskfold: folders, tags and tasks kept in sync with a remote collection store",
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

    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List tasks for a folder/tag selection (default command)
    Tasks(TaskListArgs),
    /// List folders
    Folders,
    /// List tags
    Tags,
    #[command(subcommand)]
    Folder(FolderCommand),
    #[command(subcommand)]
    Tag(TagCommand),
    #[command(subcommand)]
    Task(TaskCommand),
    /// Print an aggregation report from the remote store
    Stats {
        #[arg(value_enum, default_value_t = StatsView::Summary)]
        view: StatsView,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Tasks(TaskListArgs::default())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaskListArgs {
    #[arg(long)]
    pub folder: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long)]
    pub priority: Option<TaskPriority>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FolderCommand {
    Add { name: String },
    Rename { id: String, name: String },
    Rm { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommand {
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Rm { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFieldArgs,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// Clear the due date
        #[arg(long = "no-due", conflicts_with = "due")]
        no_due: bool,
        #[command(flatten)]
        fields: TaskFieldArgs,
    },
    Rm { id: String },
    Show { id: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaskFieldArgs {
    #[arg(long = "desc")]
    pub description: Option<String>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long)]
    pub priority: Option<TaskPriority>,
    /// RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,
    /// Folder id; repeat for several. Replaces the task's folders on edit.
    #[arg(long = "folder")]
    pub folders: Vec<String>,
    /// Tag id; repeat for several. Replaces the task's tags on edit.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsView {
    Summary,
    Status,
    Folder,
    Tag,
}

fn parse_due(raw: &str) -> Result<DateTime<Utc>, String> {
    due_date_serde::parse(raw)
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
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_task_add_with_repeated_ids() {
        let cli = GlobalCli::try_parse_from([
            "taskfold",
            "--rc",
            "api.url=http://example/api",
            "task",
            "add",
            "Buy milk",
            "--priority",
            "high",
            "--due",
            "2026-04-01",
            "--folder",
            "f1",
            "--tag",
            "g1",
            "--tag",
            "g2",
        ])
        .expect("parse task add");

        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "api.url");
        match cli.command {
            Some(Command::Task(TaskCommand::Add { title, fields })) => {
                assert_eq!(title, "Buy milk");
                assert_eq!(fields.priority, Some(TaskPriority::High));
                assert_eq!(fields.folders, vec!["f1"]);
                assert_eq!(fields.tags, vec!["g1", "g2"]);
                assert!(fields.due.is_some());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_defaults_to_task_list() {
        let cli = GlobalCli::try_parse_from(["taskfold", "-vv"]).expect("parse bare");
        assert_eq!(cli.verbose, 2);
        assert!(cli.command.is_none());
        assert!(matches!(Command::default(), Command::Tasks(_)));
    }

    #[test]
    fn rejects_bad_status_and_key_val() {
        assert!(GlobalCli::try_parse_from(["taskfold", "tasks", "--status", "someday"]).is_err());
        assert!("novalue".parse::<KeyVal>().is_err());
    }
}
