use crate::commands::summarize::{ClipboardOptions, DbOptions, run_clipboard, run_db};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "catchup", version, about = "Catch up on a group chat you ignored all day")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Summarize the most recent messages of a chat from the local
    /// Messages store
    Db {
        /// Display name of the group chat (fuzzy matched)
        #[arg(long)]
        chat: String,
        /// How many most-recent messages to fetch
        #[arg(long)]
        last: Option<u32>,
        /// Model id to use instead of the configured one
        #[arg(long)]
        model: Option<String>,
        /// Path to chat.db (defaults to ~/Library/Messages/chat.db)
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Print the structured result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize conversation text copied to the clipboard
    Clipboard {
        /// Model id to use instead of the configured one
        #[arg(long)]
        model: Option<String>,
        /// Print the structured result as JSON
        #[arg(long)]
        json: bool,
        /// Skip the "press Enter after selecting" pause and read the
        /// clipboard as-is instead of copying the current selection
        #[arg(long)]
        no_wait: bool,
        /// Read the pasted conversation from stdin instead of the clipboard
        #[arg(long)]
        from_stdin: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Commands::Db {
            chat,
            last,
            model,
            db_path,
            json,
        } => run_db(&DbOptions {
            chat,
            last,
            model,
            db_path,
            json,
        })?,
        Commands::Clipboard {
            model,
            json,
            no_wait,
            from_stdin,
        } => run_clipboard(&ClipboardOptions {
            model,
            json,
            no_wait,
            from_stdin,
        })?,
    };

    for detail in &report.details {
        eprintln!("{detail}");
    }
    if !report.ok {
        for issue in &report.issues {
            eprintln!("issue: {issue}");
        }
        anyhow::bail!("{} finished with issues", report.command);
    }
    Ok(())
}
