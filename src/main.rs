//! Command-line entry point for the expense assistant.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use expense_assistant::commands::chat::{self, AskRequest, ChatContext};
use expense_assistant::commands::{history, open_database};
use expense_assistant::inference::config::{load_config, resolve_config};
use expense_assistant::inference::{AssistantConfig, ChatMessage};

#[derive(Debug, Parser)]
#[command(name = "expense-assistant", version, about = "Ask questions about your expenses")]
struct Cli {
    /// Config file (default: search upward for config/assistant.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask a question about your expenses.
    Ask {
        #[arg(long)]
        user: String,
        /// JSON file with earlier messages of the conversation.
        #[arg(long)]
        history: Option<PathBuf>,
        question: String,
    },
    /// Show, search, or delete saved questions.
    History {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = history::DEFAULT_HISTORY_LIMIT)]
        limit: usize,
        #[arg(long, conflicts_with = "delete")]
        search: Option<String>,
        /// Id of a saved query to delete.
        #[arg(long)]
        delete: Option<String>,
    },
    /// Report whether the assistant is configured.
    Status {
        /// Also check that the completion endpoint is reachable.
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = expense_assistant::init_tracing() {
        eprintln!("warning: file logging disabled: {e}");
    }

    let config = load(&cli)?;

    match cli.command {
        Command::Ask {
            user,
            history,
            question,
        } => {
            let conversation_history = match history {
                Some(path) => read_history(&path)?,
                None => Vec::new(),
            };
            let db = open_database(&config)?;
            let ctx = ChatContext::from_config(&config, db)?;
            let response = chat::ask(
                &ctx,
                AskRequest {
                    user_id: user,
                    message: question,
                    conversation_history,
                },
            )
            .await?;
            print_json(&response)?;
        }
        Command::History {
            user,
            limit,
            search,
            delete,
        } => {
            let db = open_database(&config)?;
            if let Some(id) = delete {
                history::delete_query(db, &user, &id).await?;
                println!("deleted {id}");
            } else if let Some(text) = search {
                print_json(&history::search_queries(db, &user, &text).await?)?;
            } else {
                print_json(&history::recent_queries(db, &user, limit).await?)?;
            }
        }
        Command::Status { check } => {
            let status = if check {
                chat::chat_status_checked(&config).await
            } else {
                chat::chat_status(&config)
            };
            print_json(&status)?;
        }
    }

    Ok(())
}

fn load(cli: &Cli) -> Result<AssistantConfig> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let cwd = std::env::current_dir().context("cannot read current directory")?;
            resolve_config(&cwd)?
        }
    };
    Ok(config)
}

fn read_history(path: &PathBuf) -> Result<Vec<ChatMessage>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} must contain a JSON array of messages", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
