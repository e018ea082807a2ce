//! `codenode` -- run workflow Code node snippets from the shell.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use codenode_sandbox::{ExecutionMode, Language};

mod run;

#[derive(Parser, Debug)]
#[command(name = "codenode", version, about = "Run workflow Code node snippets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a snippet over a file of input items and print the output items
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Snippet language (`javaScript` or `python`).
    #[arg(long, short, value_parser = parse_language)]
    language: Option<Language>,

    /// Execution mode (`runOnceForAllItems` or `runOnceForEachItem`).
    #[arg(long, short, value_parser = parse_mode, default_value = "runOnceForAllItems")]
    mode: ExecutionMode,

    /// JSON file with the input items, `-` for stdin. Omit for no input.
    #[arg(long, short)]
    items: Option<String>,

    /// File containing the snippet.
    #[arg(long, short)]
    code: PathBuf,

    /// Comma-separated Python modules to install before running.
    #[arg(long, default_value = "")]
    modules: String,

    /// Replace failed runs with `{ "error": ... }` items instead of failing.
    #[arg(long)]
    continue_on_fail: bool,

    /// Treat the run as started from the editor: console output goes to stderr.
    #[arg(long)]
    manual: bool,

    /// Node version. Versions below 2 always run JavaScript.
    #[arg(long, default_value_t = 2)]
    node_version: u32,

    /// JSON sandbox configuration file.
    #[arg(long, env = "CODENODE_CONFIG")]
    config: Option<PathBuf>,
}

fn parse_language(value: &str) -> Result<Language, String> {
    match value.to_lowercase().as_str() {
        "javascript" | "js" => Ok(Language::JavaScript),
        "python" | "py" => Ok(Language::Python),
        other => Err(format!("unknown language `{other}`, expected javaScript or python")),
    }
}

fn parse_mode(value: &str) -> Result<ExecutionMode, String> {
    match value.to_lowercase().as_str() {
        "runonceforallitems" | "all" => Ok(ExecutionMode::RunOnceForAllItems),
        "runonceforeachitem" | "each" => Ok(ExecutionMode::RunOnceForEachItem),
        other => Err(format!(
            "unknown mode `{other}`, expected runOnceForAllItems or runOnceForEachItem"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log = codenode_log::auto_init()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run::execute(args).await,
    }
}
